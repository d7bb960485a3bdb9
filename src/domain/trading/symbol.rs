//! Canonical symbol form shared by every instrument the pipeline trades.
//!
//! Brokers and data providers hand us symbols in all manner of dress —
//! `EUR/USD`, `eur-usd`, `BTC_USDT`, `xauusd` — but the database only ever
//! stores the canonical, separator-free, upper-case form. Generalizes the
//! crypto-only `normalize_crypto_symbol` helper to every asset class, since
//! the Signal Factory must reject non-canonical symbols regardless of class.

/// Normalizes a raw broker/provider symbol into its canonical form.
///
/// Canonical form strips every non-alphanumeric character and upper-cases
/// the rest, so `"eur/usd"`, `"EUR-USD"`, and `"EURUSD"` all normalize to
/// `"EURUSD"`.
pub fn normalize_symbol(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// True iff `symbol` is already in canonical form.
pub fn is_canonical(symbol: &str) -> bool {
    normalize_symbol(symbol) == symbol
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent() {
        for raw in ["EUR/USD", "eur-usd", "BTC_USDT", "XAUUSD", "  spaced "] {
            let once = normalize_symbol(raw);
            let twice = normalize_symbol(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn strips_separators_and_uppercases() {
        assert_eq!(normalize_symbol("eur/usd"), "EURUSD");
        assert_eq!(normalize_symbol("BTC-USDT"), "BTCUSDT");
        assert_eq!(normalize_symbol("xau_usd"), "XAUUSD");
    }

    #[test]
    fn already_canonical_is_unchanged() {
        assert_eq!(normalize_symbol("EURUSD"), "EURUSD");
        assert!(is_canonical("EURUSD"));
    }

    #[test]
    fn detects_non_canonical() {
        assert!(!is_canonical("EUR/USD"));
        assert!(!is_canonical("eurusd"));
    }
}
