//! Tick-size tables and limit-price rounding.

use rust_decimal::Decimal;

use crate::types::Market;

/// Minimum price increment for a quote on the given market.
///
/// Domestic (KRX) tiers:
///
/// | price (KRW)      | tick |
/// |------------------|------|
/// | < 2,000          | 1    |
/// | < 5,000          | 5    |
/// | < 50,000         | 10   |
/// | < 200,000        | 50   |
/// | < 500,000        | 100  |
/// | >= 500,000       | 500  |
///
/// The overseas market trades in cents.
pub fn tick_size(market: Market, price: Decimal) -> Decimal {
    match market {
        Market::Kr => {
            if price < Decimal::new(2_000, 0) {
                Decimal::ONE
            } else if price < Decimal::new(5_000, 0) {
                Decimal::new(5, 0)
            } else if price < Decimal::new(50_000, 0) {
                Decimal::new(10, 0)
            } else if price < Decimal::new(200_000, 0) {
                Decimal::new(50, 0)
            } else if price < Decimal::new(500_000, 0) {
                Decimal::new(100, 0)
            } else {
                Decimal::new(500, 0)
            }
        }
        Market::Us => Decimal::new(1, 2),
    }
}

/// Round a computed limit price down onto the market's tick grid.
pub fn round_down_to_tick(market: Market, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return price;
    }
    let tick = tick_size(market, price);
    (price / tick).floor() * tick
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domestic_mid_tier_rounds_down() {
        // 20,000-50,000 tier trades in 10 KRW ticks.
        let rounded = round_down_to_tick(Market::Kr, Decimal::new(20_037, 0));
        assert_eq!(rounded, Decimal::new(20_030, 0));
    }

    #[test]
    fn domestic_tier_boundaries() {
        assert_eq!(tick_size(Market::Kr, Decimal::new(1_999, 0)), Decimal::ONE);
        assert_eq!(tick_size(Market::Kr, Decimal::new(2_000, 0)), Decimal::new(5, 0));
        assert_eq!(tick_size(Market::Kr, Decimal::new(49_990, 0)), Decimal::new(10, 0));
        assert_eq!(tick_size(Market::Kr, Decimal::new(50_000, 0)), Decimal::new(50, 0));
        assert_eq!(tick_size(Market::Kr, Decimal::new(500_000, 0)), Decimal::new(500, 0));
    }

    #[test]
    fn aligned_price_is_unchanged() {
        let rounded = round_down_to_tick(Market::Kr, Decimal::new(20_030, 0));
        assert_eq!(rounded, Decimal::new(20_030, 0));
    }

    #[test]
    fn overseas_rounds_to_cents() {
        let rounded = round_down_to_tick(Market::Us, Decimal::new(190_137, 3)); // 190.137
        assert_eq!(rounded, Decimal::new(19013, 2)); // 190.13
    }
}
