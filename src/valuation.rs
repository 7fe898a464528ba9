use crate::record::FilingRecord;

/// Derived valuation fields. `None` wherever an input is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Valuation {
    pub valuation_low: Option<f64>,
    pub valuation_high: Option<f64>,
    pub valuation_mid: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub price_to_earnings: Option<f64>,
    pub amount_to_raise: Option<f64>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn mean(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

/// Ratio over a strictly positive denominator.
fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 => finite(n / d),
        _ => None,
    }
}

impl Valuation {
    pub fn derive(record: &FilingRecord) -> Self {
        let shares = record.shares_outstanding.map(|s| s as f64);
        let low = record.price_range_low;
        let high = record.price_range_high;

        let valuation_low = shares.zip(low).and_then(|(s, p)| finite(s * p));
        let valuation_high = shares.zip(high).and_then(|(s, p)| finite(s * p));
        let valuation_mid = valuation_low
            .zip(valuation_high)
            .map(|(l, h)| mean(l, h));

        let amount_to_raise = record
            .shares_offered
            .zip(low.zip(high))
            .and_then(|(n, (l, h))| finite(n as f64 * mean(l, h)));

        Valuation {
            valuation_low,
            valuation_high,
            valuation_mid,
            price_to_sales: ratio(valuation_mid, record.revenue_latest),
            price_to_earnings: ratio(valuation_mid, record.profit_latest),
            amount_to_raise,
        }
    }

    /// The derived figures currently stored on `record`.
    pub fn stored(record: &FilingRecord) -> Self {
        Valuation {
            valuation_low: record.valuation_low,
            valuation_high: record.valuation_high,
            valuation_mid: record.valuation_mid,
            price_to_sales: record.price_to_sales,
            price_to_earnings: record.price_to_earnings,
            amount_to_raise: record.amount_to_raise,
        }
    }

    /// Plain assignment, so a figure whose inputs went away is cleared.
    pub fn apply_to(&self, record: &mut FilingRecord) {
        record.valuation_low = self.valuation_low;
        record.valuation_high = self.valuation_high;
        record.valuation_mid = self.valuation_mid;
        record.price_to_sales = self.price_to_sales;
        record.price_to_earnings = self.price_to_earnings;
        record.amount_to_raise = self.amount_to_raise;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::report::FilingCategory;
    use crate::record::{FilingStatus, NewFiling, RegistrantId};
    use chrono::{NaiveDate, Utc};

    fn record() -> FilingRecord {
        NewFiling {
            registrant_id: RegistrantId::parse("1").unwrap(),
            category: FilingCategory::PrimaryRegistration,
            filing_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            company_name: "Acme".to_string(),
            source_url: String::new(),
            status: FilingStatus::Filed,
        }
        .into_record(1, Utc::now())
    }

    #[test]
    fn bounds_and_midpoint_from_price_range() {
        let mut r = record();
        r.shares_outstanding = Some(1_000_000);
        r.price_range_low = Some(10.0);
        r.price_range_high = Some(20.0);

        let v = Valuation::derive(&r);
        assert_eq!(v.valuation_low, Some(10_000_000.0));
        assert_eq!(v.valuation_high, Some(20_000_000.0));
        assert_eq!(v.valuation_mid, Some(15_000_000.0));
        assert_eq!(v.amount_to_raise, None);
    }

    #[test]
    fn midpoint_needs_both_bounds() {
        let mut r = record();
        r.shares_outstanding = Some(1_000);
        r.price_range_low = Some(10.0);

        let v = Valuation::derive(&r);
        assert_eq!(v.valuation_low, Some(10_000.0));
        assert_eq!(v.valuation_mid, None);
        assert_eq!(v.price_to_sales, None);
    }

    #[test]
    fn ratios_require_positive_denominators() {
        let mut r = record();
        r.shares_outstanding = Some(100);
        r.price_range_low = Some(10.0);
        r.price_range_high = Some(30.0);
        r.revenue_latest = Some(500.0);
        r.profit_latest = Some(-20.0);

        let v = Valuation::derive(&r);
        assert_eq!(v.valuation_mid, Some(2_000.0));
        assert_eq!(v.price_to_sales, Some(4.0));
        assert_eq!(v.price_to_earnings, None);

        r.revenue_latest = Some(0.0);
        assert_eq!(Valuation::derive(&r).price_to_sales, None);
    }

    #[test]
    fn amount_to_raise_uses_mean_price() {
        let mut r = record();
        r.shares_offered = Some(5_000_000);
        r.price_range_low = Some(14.0);
        r.price_range_high = Some(16.0);

        let v = Valuation::derive(&r);
        assert_eq!(v.amount_to_raise, Some(75_000_000.0));
        assert_eq!(v.valuation_low, None);
        assert_ne!(v, Valuation::default());
        assert_eq!(Valuation::derive(&record()), Valuation::default());
    }

    #[test]
    fn applying_clears_figures_whose_inputs_went_away() {
        let mut r = record();
        r.shares_outstanding = Some(1_000);
        r.price_range_low = Some(10.0);
        r.price_range_high = Some(20.0);
        r.profit_latest = Some(100.0);
        Valuation::derive(&r).apply_to(&mut r);
        assert_eq!(r.price_to_earnings, Some(150.0));

        r.profit_latest = Some(-50.0);
        let v = Valuation::derive(&r);
        assert_ne!(v, Valuation::stored(&r));
        v.apply_to(&mut r);
        assert_eq!(r.price_to_earnings, None);
        assert_eq!(r.valuation_mid, Some(15_000.0));
        assert_eq!(Valuation::stored(&r), v);
    }
}
