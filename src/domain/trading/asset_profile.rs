//! `AssetProfile` — per-symbol broker-reported facts the sizer and position
//! manager depend on. Never hardcode contract size / tick size / pip size
//! for a class of instrument; always read it from the profile, which in turn
//! is populated from the broker's `get_symbol_info` at preload time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    Forex,
    Metal,
    Crypto,
    Index,
}

/// One per tradable symbol; persisted, globally readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetProfile {
    /// Canonical symbol, e.g. `EURUSD`.
    pub symbol: String,
    pub asset_class: AssetClass,
    /// Units of the base instrument per one lot/contract.
    pub contract_size: Decimal,
    /// Minimum price increment.
    pub tick_size: Decimal,
    pub digits: u32,
    /// Value of one pip move, in quote currency, per unit of volume.
    pub pip_size: Decimal,
    /// Minimum distance from current price within which stops/targets cannot be modified.
    pub freeze_level: Decimal,
    /// The symbol as the broker natively names it (may differ from canonical form).
    pub broker_native_symbol: String,
    /// Smallest volume increment the broker accepts.
    pub volume_step: Decimal,
    /// Quote currency of the pair, e.g. `USD` in `EURUSD`.
    pub quote_currency: String,
    /// Base currency of the pair, e.g. `EUR` in `EURUSD`.
    pub base_currency: String,
}

impl AssetProfile {
    pub fn new(
        symbol: impl Into<String>,
        asset_class: AssetClass,
        contract_size: Decimal,
        tick_size: Decimal,
        digits: u32,
        pip_size: Decimal,
        freeze_level: Decimal,
        broker_native_symbol: impl Into<String>,
        volume_step: Decimal,
        quote_currency: impl Into<String>,
        base_currency: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class,
            contract_size,
            tick_size,
            digits,
            pip_size,
            freeze_level,
            broker_native_symbol: broker_native_symbol.into(),
            volume_step,
            quote_currency: quote_currency.into(),
            base_currency: base_currency.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn construction_preserves_fields() {
        let p = AssetProfile::new(
            "XAUUSD",
            AssetClass::Metal,
            dec!(100),
            dec!(0.01),
            2,
            dec!(0.01),
            dec!(0.0),
            "XAUUSD",
            dec!(0.01),
            "USD",
            "XAU",
        );
        assert_eq!(p.contract_size, dec!(100));
        assert_eq!(p.asset_class, AssetClass::Metal);
    }
}
