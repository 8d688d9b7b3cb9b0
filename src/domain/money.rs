//! Conversions between decimal major-unit amounts and gateway minor units.

use bigdecimal::{BigDecimal, ToPrimitive};

/// Currencies the gateway treats as having no fractional unit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];

/// Number of decimal places in one major unit of `currency`.
pub fn minor_unit_exponent(currency: &str) -> u32 {
    let lower = currency.to_ascii_lowercase();
    if ZERO_DECIMAL_CURRENCIES.contains(&lower.as_str()) {
        0
    } else {
        2
    }
}

/// Builds a major-unit amount from a minor-unit integer (e.g. cents).
pub fn from_minor_units(minor: i64, currency: &str) -> BigDecimal {
    BigDecimal::new(minor.into(), i64::from(minor_unit_exponent(currency)))
}

/// Rounds `amount` half-up to the currency's smallest unit.
///
/// Returns `None` when the result does not fit in an `i64`.
pub fn to_minor_units(amount: &BigDecimal, currency: &str) -> Option<i64> {
    let factor = BigDecimal::from(10_i64.pow(minor_unit_exponent(currency)));
    (amount * &factor).round(0).to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_two_decimal_currency_round_trip() {
        assert_eq!(from_minor_units(10050, "brl"), dec("100.50"));
        assert_eq!(to_minor_units(&dec("93.10"), "BRL"), Some(9310));
    }

    #[test]
    fn test_rounds_half_up_to_cents() {
        assert_eq!(to_minor_units(&dec("18.725"), "usd"), Some(1873));
        assert_eq!(to_minor_units(&dec("18.724"), "usd"), Some(1872));
    }

    #[test]
    fn test_zero_decimal_currency() {
        assert_eq!(minor_unit_exponent("JPY"), 0);
        assert_eq!(from_minor_units(500, "jpy"), dec("500"));
        assert_eq!(to_minor_units(&dec("499.6"), "jpy"), Some(500));
    }
}
