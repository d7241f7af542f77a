//! # Rate Aggregation Module
//!
//! ## Purpose
//! Groups raw per-market price rows by market name and computes per-market
//! average min/max/modal prices. This is the pure core of the rates path;
//! everything else is storage and transport.
//!
//! ## Input/Output Specification
//! - **Input**: Raw price rows as returned by the remote source
//! - **Output**: One aggregate per distinct market name, in insertion order
//!   of the first occurrence of each market in the input
//! - **Numeric policy**: Arithmetic mean per field, rounded half away from
//!   zero, clamped to a non-negative integer

use crate::{AggregatedRate, RawPriceRecord};
use std::collections::HashMap;

/// Running sums for one market's rows
#[derive(Debug, Default)]
struct MarketTotals {
    min_sum: f64,
    max_sum: f64,
    modal_sum: f64,
    count: u64,
}

/// Aggregate raw rows into one entry per distinct market name.
///
/// Market names are compared exactly (case- and whitespace-sensitive, no
/// normalization). Output order is the order in which each market first
/// appears in the input, so the same input list always produces the same
/// output. An empty input yields an empty output.
pub fn aggregate(records: &[RawPriceRecord]) -> Vec<AggregatedRate> {
    let mut totals: HashMap<&str, MarketTotals> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for record in records {
        let entry = totals.entry(record.market.as_str()).or_insert_with(|| {
            order.push(record.market.as_str());
            MarketTotals::default()
        });
        entry.min_sum += record.min_price;
        entry.max_sum += record.max_price;
        entry.modal_sum += record.modal_price;
        entry.count += 1;
    }

    order
        .into_iter()
        .map(|market| {
            let t = &totals[market];
            AggregatedRate {
                market: market.to_string(),
                min_price: mean_to_price(t.min_sum, t.count),
                max_price: mean_to_price(t.max_sum, t.count),
                modal_price: mean_to_price(t.modal_sum, t.count),
            }
        })
        .collect()
}

/// Mean of `sum / count`, rounded half away from zero and clamped at zero.
///
/// `count` is never zero here: a market only exists in the totals map
/// because at least one row carried it.
fn mean_to_price(sum: f64, count: u64) -> u64 {
    let mean = sum / count as f64;
    mean.round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(market: &str, min: f64, max: f64, modal: f64) -> RawPriceRecord {
        RawPriceRecord {
            market: market.to_string(),
            min_price: min,
            max_price: max,
            modal_price: modal,
        }
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn test_one_aggregate_per_distinct_market() {
        let records = vec![
            row("A", 1.0, 2.0, 1.5),
            row("B", 1.0, 2.0, 1.5),
            row("A", 3.0, 4.0, 3.5),
            row("C", 1.0, 2.0, 1.5),
            row("B", 1.0, 2.0, 1.5),
        ];
        let rates = aggregate(&records);
        assert_eq!(rates.len(), 3);
    }

    #[test]
    fn test_two_record_mean() {
        let records = vec![
            row("Sangli APMC", 10.0, 20.0, 15.0),
            row("Sangli APMC", 20.0, 30.0, 25.0),
        ];
        let rates = aggregate(&records);
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].min_price, 15);
        assert_eq!(rates[0].max_price, 25);
        assert_eq!(rates[0].modal_price, 20);
    }

    #[test]
    fn test_insertion_order_preserved() {
        // District "Sangli", commodity "Tomato": two rows for Sangli APMC,
        // one for Kavathe Mahankal, output in first-occurrence order.
        let records = vec![
            row("Sangli APMC", 380.0, 430.0, 400.0),
            row("Sangli APMC", 390.0, 450.0, 420.0),
            row("Kavathe Mahankal", 420.0, 480.0, 450.0),
        ];
        let rates = aggregate(&records);
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].market, "Sangli APMC");
        assert_eq!(rates[0].modal_price, 410);
        assert_eq!(rates[1].market, "Kavathe Mahankal");
        assert_eq!(rates[1].modal_price, 450);
    }

    #[test]
    fn test_market_names_not_normalized() {
        let records = vec![
            row("sangli apmc", 10.0, 20.0, 15.0),
            row("Sangli APMC", 10.0, 20.0, 15.0),
            row("Sangli APMC ", 10.0, 20.0, 15.0),
        ];
        let rates = aggregate(&records);
        assert_eq!(rates.len(), 3);
    }

    #[test]
    fn test_fractional_mean_rounds_half_away_from_zero() {
        let records = vec![
            row("A", 10.0, 10.0, 10.0),
            row("A", 11.0, 12.0, 13.0),
        ];
        let rates = aggregate(&records);
        // 10.5 rounds up, 11.0 and 11.5 follow the same policy
        assert_eq!(rates[0].min_price, 11);
        assert_eq!(rates[0].max_price, 11);
        assert_eq!(rates[0].modal_price, 12);
    }

    #[test]
    fn test_result_is_non_negative() {
        // Upstream occasionally reports sentinel negatives; the aggregate
        // clamps at zero rather than wrapping.
        let records = vec![row("A", -10.0, -5.0, -7.0)];
        let rates = aggregate(&records);
        assert_eq!(rates[0].min_price, 0);
        assert_eq!(rates[0].max_price, 0);
        assert_eq!(rates[0].modal_price, 0);
    }

    #[test]
    fn test_input_order_determines_output() {
        let records_a = vec![row("X", 1.0, 2.0, 1.0), row("Y", 1.0, 2.0, 1.0)];
        let records_b = vec![row("Y", 1.0, 2.0, 1.0), row("X", 1.0, 2.0, 1.0)];
        let rates_a = aggregate(&records_a);
        let rates_b = aggregate(&records_b);
        assert_eq!(rates_a[0].market, "X");
        assert_eq!(rates_b[0].market, "Y");
    }
}
