//! Platform fee and revenue-split decomposition.
//!
//! Shares are applied sequentially: the affiliate is paid from the post-fee
//! pool, the co-producer from what remains after the affiliate, and the
//! producer keeps the rest (never below zero).

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_FEE_RATE: &str = "0.059";
pub const DEFAULT_FEE_FIXED: &str = "1.00";

/// Percentage plus fixed fee retained by the platform on every checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub rate: BigDecimal,
    pub fixed: BigDecimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            rate: parse_constant(DEFAULT_FEE_RATE),
            fixed: parse_constant(DEFAULT_FEE_FIXED),
        }
    }
}

fn parse_constant(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap_or_else(|_| BigDecimal::zero())
}

/// A requested percentage share for a secondary beneficiary.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareRequest {
    pub beneficiary_id: String,
    pub percent: BigDecimal,
}

/// Everything the fee computation depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitInput {
    pub amount: BigDecimal,
    pub operational_cost: BigDecimal,
    pub affiliate: Option<ShareRequest>,
    pub co_producer: Option<ShareRequest>,
}

impl SplitInput {
    pub fn new(amount: BigDecimal) -> Self {
        Self {
            amount,
            operational_cost: BigDecimal::zero(),
            affiliate: None,
            co_producer: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Share {
    pub beneficiary_id: String,
    pub percent: BigDecimal,
    pub amount: BigDecimal,
}

/// Result of splitting one checkout amount.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeBreakdown {
    pub amount: BigDecimal,
    pub platform_fee: BigDecimal,
    pub operational_cost: BigDecimal,
    pub net_after_fees: BigDecimal,
    pub affiliate: Option<Share>,
    pub co_producer: Option<Share>,
    pub producer_net: BigDecimal,
}

impl FeeBreakdown {
    pub fn affiliate_amount(&self) -> BigDecimal {
        self.affiliate
            .as_ref()
            .map(|s| s.amount.clone())
            .unwrap_or_else(BigDecimal::zero)
    }

    pub fn co_producer_amount(&self) -> BigDecimal {
        self.co_producer
            .as_ref()
            .map(|s| s.amount.clone())
            .unwrap_or_else(BigDecimal::zero)
    }

    /// Sum of every component. Equals `amount` unless the producer net was clamped.
    pub fn allocated_total(&self) -> BigDecimal {
        &self.platform_fee
            + &self.operational_cost
            + self.affiliate_amount()
            + self.co_producer_amount()
            + &self.producer_net
    }
}

impl FeeSchedule {
    pub fn platform_fee(&self, amount: &BigDecimal) -> BigDecimal {
        amount * &self.rate + &self.fixed
    }

    pub fn split(&self, input: &SplitInput) -> FeeBreakdown {
        let hundred = BigDecimal::from(100);
        let platform_fee = self.platform_fee(&input.amount);
        let net_after_fees = &input.amount - &platform_fee - &input.operational_cost;

        let affiliate = input.affiliate.as_ref().map(|req| Share {
            beneficiary_id: req.beneficiary_id.clone(),
            percent: req.percent.clone(),
            amount: &net_after_fees * &req.percent / hundred.clone(),
        });
        let after_affiliate = match &affiliate {
            Some(share) => &net_after_fees - &share.amount,
            None => net_after_fees.clone(),
        };

        let co_producer = input.co_producer.as_ref().map(|req| Share {
            beneficiary_id: req.beneficiary_id.clone(),
            percent: req.percent.clone(),
            amount: &after_affiliate * &req.percent / hundred.clone(),
        });
        let remainder = match &co_producer {
            Some(share) => &after_affiliate - &share.amount,
            None => after_affiliate,
        };

        let producer_net = if remainder < BigDecimal::zero() {
            BigDecimal::zero()
        } else {
            remainder
        };

        FeeBreakdown {
            amount: input.amount.clone(),
            platform_fee,
            operational_cost: input.operational_cost.clone(),
            net_after_fees,
            affiliate,
            co_producer,
            producer_net,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn share(id: &str, percent: &str) -> Option<ShareRequest> {
        Some(ShareRequest {
            beneficiary_id: id.to_string(),
            percent: dec(percent),
        })
    }

    #[test]
    fn test_no_secondary_beneficiaries() {
        let breakdown = FeeSchedule::default().split(&SplitInput::new(dec("100.00")));

        assert_eq!(breakdown.platform_fee, dec("6.90"));
        assert_eq!(breakdown.producer_net, dec("93.10"));
        assert!(breakdown.affiliate.is_none());
        assert_eq!(breakdown.allocated_total(), dec("100.00"));
    }

    #[test]
    fn test_affiliate_only() {
        let mut input = SplitInput::new(dec("200.00"));
        input.affiliate = share("aff-1", "10");

        let breakdown = FeeSchedule::default().split(&input);

        assert_eq!(breakdown.platform_fee, dec("12.80"));
        assert_eq!(breakdown.net_after_fees, dec("187.20"));
        assert_eq!(breakdown.affiliate_amount(), dec("18.72"));
        assert_eq!(breakdown.producer_net, dec("168.48"));
    }

    #[test]
    fn test_co_producer_is_paid_from_post_affiliate_remainder() {
        let mut input = SplitInput::new(dec("200.00"));
        input.affiliate = share("aff-1", "10");
        input.co_producer = share("co-1", "50");

        let breakdown = FeeSchedule::default().split(&input);

        assert_eq!(breakdown.co_producer_amount(), dec("84.24"));
        assert_eq!(breakdown.producer_net, dec("84.24"));
        assert_eq!(breakdown.allocated_total(), dec("200.00"));
    }

    #[test]
    fn test_operational_cost_exceeding_net_clamps_producer() {
        let mut input = SplitInput::new(dec("50.00"));
        input.operational_cost = dec("60.00");

        let breakdown = FeeSchedule::default().split(&input);

        assert_eq!(breakdown.platform_fee, dec("3.95"));
        assert_eq!(breakdown.producer_net, BigDecimal::zero());
    }

    #[test]
    fn test_conservation_over_a_grid() {
        let schedule = FeeSchedule::default();
        let amounts = ["10.00", "49.90", "100.00", "997.00", "1234.56"];
        let percents = ["0", "7.5", "33", "100"];

        for amount in amounts {
            for aff in percents {
                for co in percents {
                    let mut input = SplitInput::new(dec(amount));
                    input.operational_cost = dec("2.50");
                    input.affiliate = share("aff", aff);
                    input.co_producer = share("co", co);

                    let breakdown = schedule.split(&input);

                    assert!(breakdown.producer_net >= BigDecimal::zero());
                    if breakdown.net_after_fees >= BigDecimal::zero() {
                        assert_eq!(breakdown.allocated_total(), dec(amount), "{amount}/{aff}/{co}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_custom_schedule() {
        let schedule = FeeSchedule {
            rate: dec("0.10"),
            fixed: dec("0"),
        };
        assert_eq!(schedule.platform_fee(&dec("80")), dec("8"));
    }
}
