//! JSON document helpers shared by every `DocumentStore` adapter.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::StoreResult;

pub type Document = Map<String, Value>;

pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut doc = Document::new();
            doc.insert("value".to_string(), other);
            Ok(doc)
        }
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Builds a document from a `json!` object literal. Non-objects yield an empty document.
pub fn fields(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Recursively merges `patch` into `target`; nested objects merge, everything else overwrites.
pub fn merge_into(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        let Value::Object(incoming) = value else {
            target.insert(key, value);
            continue;
        };
        if let Some(Value::Object(existing)) = target.get_mut(&key) {
            merge_into(existing, incoming);
            continue;
        }
        target.insert(key, Value::Object(incoming));
    }
}

pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    segments.try_fold(doc.get(first)?, |current, segment| current.get(segment))
}

/// Writes `value` at a dotted path, replacing non-object intermediates.
pub fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

/// Adds `delta` to the integer at `path`. Missing or null counts as zero.
/// Returns `None` when the existing value is not an integer.
pub fn increment_path(doc: &mut Document, path: &str, delta: i64) -> Option<i64> {
    let current = match get_path(doc, path) {
        None | Some(Value::Null) => 0,
        Some(value) => value.as_i64()?,
    };
    let next = current.checked_add(delta)?;
    set_path(doc, path, Value::from(next));
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_is_deep() {
        let mut target = fields(json!({ "details": { "sessionId": "cs_1", "transfers": {} }, "a": 1 }));
        merge_into(&mut target, fields(json!({ "details": { "splitDistributed": true }, "a": 2 })));

        assert_eq!(
            Value::Object(target),
            json!({
                "details": { "sessionId": "cs_1", "transfers": {}, "splitDistributed": true },
                "a": 2
            })
        );
    }

    #[test]
    fn test_set_and_get_dotted_path() {
        let mut doc = Document::new();
        set_path(&mut doc, "details.transfers", json!({ "producer": "tr_1" }));

        assert_eq!(get_path(&doc, "details.transfers.producer"), Some(&json!("tr_1")));
        assert_eq!(get_path(&doc, "details.missing"), None);
    }

    #[test]
    fn test_increment_missing_field_starts_at_zero() {
        let mut doc = Document::new();
        assert_eq!(increment_path(&mut doc, "creditBalance", 100), Some(100));
        assert_eq!(increment_path(&mut doc, "creditBalance", -30), Some(70));
    }

    #[test]
    fn test_increment_rejects_non_integer() {
        let mut doc = fields(json!({ "creditBalance": "lots" }));
        assert_eq!(increment_path(&mut doc, "creditBalance", 1), None);
    }
}
