use chrono::{Duration, Months, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Year fractions or counts
pub type Years = Decimal;

/// Currency code
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    XOF,
    XAF,
    NGN,
    GHS,
    EUR,
    USD,
    GBP,
    Other(String),
}

impl Currency {
    /// Decimal places used when rounding amounts in this currency.
    /// CFA francs have no subunit in circulation.
    pub fn scale(&self) -> u32 {
        match self {
            Currency::XOF | Currency::XAF => 0,
            _ => 2,
        }
    }
}

/// How often installments fall due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentFrequency {
    Daily,
    Weekly,
    Biweekly,
    #[default]
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl PaymentFrequency {
    pub fn periods_per_year(&self) -> Decimal {
        match self {
            PaymentFrequency::Daily => Decimal::from(365),
            PaymentFrequency::Weekly => Decimal::from(52),
            PaymentFrequency::Biweekly => Decimal::from(26),
            PaymentFrequency::Monthly => Decimal::from(12),
            PaymentFrequency::Quarterly => Decimal::from(4),
            PaymentFrequency::SemiAnnual => Decimal::from(2),
            PaymentFrequency::Annual => Decimal::ONE,
        }
    }

    /// Periodic rate implied by an annual nominal rate.
    pub fn period_rate(&self, annual_rate: Rate) -> Rate {
        annual_rate / self.periods_per_year()
    }

    /// Due date of the installment `n` periods after `first_due` (n = 0 is
    /// `first_due` itself). Month-based frequencies roll by calendar months,
    /// clamping to month end; day-based frequencies roll by exact days.
    pub fn nth_due_date(&self, first_due: NaiveDate, n: u32) -> Option<NaiveDate> {
        match self {
            PaymentFrequency::Daily => first_due.checked_add_signed(Duration::days(n as i64)),
            PaymentFrequency::Weekly => {
                first_due.checked_add_signed(Duration::days(7 * n as i64))
            }
            PaymentFrequency::Biweekly => {
                first_due.checked_add_signed(Duration::days(14 * n as i64))
            }
            PaymentFrequency::Monthly => first_due.checked_add_months(Months::new(n)),
            PaymentFrequency::Quarterly => first_due.checked_add_months(Months::new(3 * n)),
            PaymentFrequency::SemiAnnual => first_due.checked_add_months(Months::new(6 * n)),
            PaymentFrequency::Annual => first_due.checked_add_months(Months::new(12 * n)),
        }
    }
}

/// Round a monetary amount to the given scale, half away from zero.
pub fn round_money(amount: Money, scale: u32) -> Money {
    amount.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cfa_scale_is_zero() {
        assert_eq!(Currency::XOF.scale(), 0);
        assert_eq!(Currency::XAF.scale(), 0);
        assert_eq!(Currency::EUR.scale(), 2);
    }

    #[test]
    fn test_monthly_due_dates_clamp_to_month_end() {
        let first = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let freq = PaymentFrequency::Monthly;
        // February clamps to the 29th (2024 is a leap year)
        assert_eq!(
            freq.nth_due_date(first, 1),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            freq.nth_due_date(first, 3),
            NaiveDate::from_ymd_opt(2024, 4, 30)
        );
    }

    #[test]
    fn test_weekly_due_dates() {
        let first = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(
            PaymentFrequency::Weekly.nth_due_date(first, 2),
            NaiveDate::from_ymd_opt(2024, 3, 18)
        );
    }

    #[test]
    fn test_period_rate() {
        assert_eq!(
            PaymentFrequency::Monthly.period_rate(dec!(0.12)),
            dec!(0.01)
        );
        assert_eq!(PaymentFrequency::Quarterly.period_rate(dec!(0.12)), dec!(0.03));
    }

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(12.345), 2), dec!(12.35));
        assert_eq!(round_money(dec!(12.5), 0), dec!(13));
        assert_eq!(round_money(dec!(-12.5), 0), dec!(-13));
    }
}
