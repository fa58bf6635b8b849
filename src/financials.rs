//! The data fed into the interpreter from outside the DSL: named metric
//! observations for the current period, plus enough history to resolve
//! `TRAILING N QUARTERS OF ...` expressions.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ast::TrailingUnit;
use crate::errors::ProvisoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeriodType {
    Month,
    Quarter,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub end_date: NaiveDate,
    pub kind: PeriodType,
}

impl Period {
    pub fn new(end_date: NaiveDate, kind: PeriodType) -> Self {
        Period { end_date, kind }
    }
}

/// a single period's named metric values, e.g. {"EBITDA": 12_500_000, ...}
pub type FinancialObservation = HashMap<String, Decimal>;

/// an ordered ledger of observations used to resolve trailing-window
/// expressions. Periods are kept sorted ascending by `end_date`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialHistory {
    periods: Vec<(Period, FinancialObservation)>,
}

impl FinancialHistory {
    pub fn new() -> Self {
        FinancialHistory::default()
    }

    pub fn record(&mut self, period: Period, observation: FinancialObservation) {
        match self.periods.binary_search_by_key(&period.end_date, |(p, _)| p.end_date) {
            Ok(idx) => self.periods[idx] = (period, observation),
            Err(idx) => self.periods.insert(idx, (period, observation)),
        }
    }

    pub fn latest(&self) -> Option<&FinancialObservation> {
        self.periods.last().map(|(_, o)| o)
    }

    pub fn latest_period(&self) -> Option<Period> {
        self.periods.last().map(|(p, _)| *p)
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    /// every recorded period in chronological order, oldest first
    pub fn all_ascending(&self) -> impl Iterator<Item = (Period, &FinancialObservation)> {
        self.periods.iter().map(|(p, o)| (*p, o))
    }

    pub fn get(&self, metric: &str) -> Option<Decimal> {
        self.latest().and_then(|o| o.get(metric)).copied()
    }

    /// the `limit` most recent observations of the given period kind, most
    /// recent first
    pub fn periods_of_kind_desc(&self, kind: PeriodType, limit: usize) -> Vec<&FinancialObservation> {
        self.periods
            .iter()
            .rev()
            .filter(|(p, _)| p.kind == kind)
            .take(limit)
            .map(|(_, o)| o)
            .collect()
    }

    /// sum of `metric` across the trailing `n` periods of the given unit,
    /// counting back from the most recent recorded period (spec.md's
    /// `TRAILING N QUARTERS OF X` — flow metrics aggregate by summation;
    /// see DESIGN.md for why summation rather than averaging)
    pub fn trailing_sum(&self, metric: &str, n: u32, unit: TrailingUnit) -> Result<Decimal, ProvisoError> {
        let matching: Vec<Decimal> = self
            .periods_of_kind_desc(unit_to_period_kind(unit), n as usize)
            .into_iter()
            .filter_map(|o| o.get(metric).copied())
            .collect();

        if matching.len() < n as usize {
            return Err(ProvisoError::MissingPeriod {
                needed: n,
                available: matching.len() as u32,
            });
        }
        Ok(matching.into_iter().sum())
    }
}

fn unit_to_period_kind(unit: TrailingUnit) -> PeriodType {
    match unit {
        TrailingUnit::Months => PeriodType::Month,
        TrailingUnit::Quarters => PeriodType::Quarter,
        TrailingUnit::Years => PeriodType::Year,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn obs(ebitda: i64) -> FinancialObservation {
        let mut m = HashMap::new();
        m.insert("EBITDA".to_string(), Decimal::from(ebitda));
        m
    }

    #[test]
    fn trailing_sum_aggregates_across_periods() {
        let mut hist = FinancialHistory::new();
        for (q, v) in [(1, 10), (2, 12), (3, 11), (4, 13)] {
            let date = NaiveDate::from_ymd_opt(2026, q * 3, 1).unwrap();
            hist.record(Period::new(date, PeriodType::Quarter), obs(v));
        }
        let total = hist.trailing_sum("EBITDA", 4, TrailingUnit::Quarters).unwrap();
        assert_eq!(total, dec!(46));
    }

    #[test]
    fn trailing_sum_errors_on_insufficient_history() {
        let mut hist = FinancialHistory::new();
        hist.record(
            Period::new(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), PeriodType::Quarter),
            obs(10),
        );
        let err = hist.trailing_sum("EBITDA", 4, TrailingUnit::Quarters).unwrap_err();
        assert!(matches!(err, ProvisoError::MissingPeriod { available: 1, needed: 4 }));
    }
}
