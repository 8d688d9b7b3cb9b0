pub mod in_memory_document_store;
pub mod notifier;
pub mod postgres_document_store;

pub use in_memory_document_store::InMemoryDocumentStore;
pub use notifier::{HttpNotifier, LogNotifier};
pub use postgres_document_store::PostgresDocumentStore;
