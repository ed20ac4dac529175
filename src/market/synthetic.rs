//! Deterministic fallback quotes.
//!
//! Seeded only by the symbol's base price, so the same catalog entry always
//! produces the same quote and the range is bounded around the base price.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::source::Quote;
use crate::domain::StockInfo;

/// Maximum deviation from the base price, in basis points
pub const MAX_DRIFT_BPS: i64 = 300;
/// Maximum absolute synthetic 24h change, in basis points of percent
pub const MAX_CHANGE_BPS: i64 = 500;
pub const MIN_VOLUME_USD: u64 = 50_000;
pub const MAX_VOLUME_USD: u64 = 5_000_000;

fn rng_for(base_price: Decimal) -> StdRng {
    let cents = (base_price * Decimal::ONE_HUNDRED)
        .trunc()
        .to_u64()
        .unwrap_or(0);
    StdRng::seed_from_u64(cents ^ 0x9E37_79B9_7F4A_7C15)
}

/// Full synthetic quote for a catalog entry
pub fn synthetic_quote(stock: &StockInfo) -> Quote {
    let mut rng = rng_for(stock.base_price);

    let drift_bps = rng.gen_range(-MAX_DRIFT_BPS..=MAX_DRIFT_BPS);
    let change_bps = rng.gen_range(-MAX_CHANGE_BPS..=MAX_CHANGE_BPS);
    let volume = rng.gen_range(MIN_VOLUME_USD..=MAX_VOLUME_USD);

    let factor = Decimal::ONE + Decimal::new(drift_bps, 4);
    let price = (stock.base_price * factor).round_dp(2);

    Quote {
        price: price.max(Decimal::new(1, 2)),
        change_24h: Some(Decimal::new(change_bps, 2)),
        volume_24h: Some(Decimal::from(volume)),
    }
}

/// Fill whatever a live quote is missing with the synthetic values
pub fn complete_quote(stock: &StockInfo, live: &Quote) -> Quote {
    let synthetic = synthetic_quote(stock);
    Quote {
        price: live.price,
        change_24h: live.change_24h.or(synthetic.change_24h),
        volume_24h: live.volume_24h.or(synthetic.volume_24h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::STOCK_CATALOG;
    use rust_decimal_macros::dec;

    #[test]
    fn test_synthetic_is_deterministic() {
        for stock in STOCK_CATALOG {
            assert_eq!(synthetic_quote(stock), synthetic_quote(stock));
        }
    }

    #[test]
    fn test_synthetic_within_bounds() {
        for stock in STOCK_CATALOG {
            let q = synthetic_quote(stock);
            let lo = stock.base_price * dec!(0.97) - dec!(0.01);
            let hi = stock.base_price * dec!(1.03) + dec!(0.01);
            assert!(q.price >= lo && q.price <= hi, "{} {}", stock.symbol, q.price);

            let change = q.change_24h.unwrap();
            assert!(change >= dec!(-5) && change <= dec!(5));

            let volume = q.volume_24h.unwrap();
            assert!(volume >= Decimal::from(MIN_VOLUME_USD));
            assert!(volume <= Decimal::from(MAX_VOLUME_USD));
        }
    }

    #[test]
    fn test_complete_quote_keeps_live_fields() {
        let stock = &STOCK_CATALOG[0];
        let live = Quote {
            price: dec!(199.99),
            change_24h: Some(dec!(1.5)),
            volume_24h: None,
        };
        let q = complete_quote(stock, &live);
        assert_eq!(q.price, dec!(199.99));
        assert_eq!(q.change_24h, Some(dec!(1.5)));
        assert!(q.volume_24h.is_some());
    }
}
