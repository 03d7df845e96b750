use crate::entities::sizing::{PositionSizing, QuantityRule};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingDecision {
    Shares(f64),
    /// Not even one quantity step is affordable under the cap.
    Insufficient,
}

/// Turns a sizing cap into a tradable quantity. Never sizes beyond `cash`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSizer {
    sizing: PositionSizing,
    rule: QuantityRule,
}

impl PositionSizer {
    pub fn new(sizing: PositionSizing, rule: QuantityRule) -> Self {
        Self { sizing, rule }
    }

    pub fn size(&self, cash: f64, equity: f64, price: f64) -> SizingDecision {
        if !price.is_finite() || price <= 0.0 || !cash.is_finite() || cash <= 0.0 {
            return SizingDecision::Insufficient;
        }

        let budget = cash.min(self.sizing.cap(equity));
        let mut shares = self.rule.floor(budget / price);
        // float floor can land one step above what cash covers
        while shares > 0.0 && shares * price > cash {
            shares = self.rule.floor(shares - self.rule.step());
        }

        if shares > 0.0 {
            SizingDecision::Shares(shares)
        } else {
            SizingDecision::Insufficient
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PositionSizer, SizingDecision};
    use crate::entities::sizing::{PositionSizing, QuantityRule};

    #[test]
    fn fraction_caps_against_equity() {
        let sizer = PositionSizer::new(PositionSizing::Fraction(0.25), QuantityRule::WholeShares);
        assert_eq!(
            sizer.size(10_000.0, 10_000.0, 100.0),
            SizingDecision::Shares(25.0)
        );
    }

    #[test]
    fn absolute_cap_is_bounded_by_cash() {
        let sizer = PositionSizer::new(PositionSizing::Absolute(5_000.0), QuantityRule::WholeShares);
        assert_eq!(
            sizer.size(10_000.0, 10_000.0, 100.0),
            SizingDecision::Shares(50.0)
        );
        assert_eq!(
            sizer.size(1_230.0, 10_000.0, 100.0),
            SizingDecision::Shares(12.0)
        );
    }

    #[test]
    fn cash_below_price_is_insufficient() {
        let sizer = PositionSizer::new(PositionSizing::Fraction(1.0), QuantityRule::WholeShares);
        assert_eq!(sizer.size(99.0, 99.0, 100.0), SizingDecision::Insufficient);
        assert_eq!(sizer.size(0.0, 0.0, 100.0), SizingDecision::Insufficient);
        assert_eq!(sizer.size(500.0, 500.0, 0.0), SizingDecision::Insufficient);
    }

    #[test]
    fn fractional_rule_allows_sub_share_quantities() {
        let sizer = PositionSizer::new(
            PositionSizing::Fraction(1.0),
            QuantityRule::Fractional { decimals: 4 },
        );
        match sizer.size(50.0, 50.0, 100.0) {
            SizingDecision::Shares(qty) => {
                assert!((qty - 0.5).abs() < 1e-9);
                assert!(qty * 100.0 <= 50.0);
            }
            other => panic!("expected shares, got {other:?}"),
        }
    }
}
