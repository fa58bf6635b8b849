//! An append-only log of cure attempts per covenant, so the interpreter
//! can enforce `MAX_USES` within a rolling `WINDOW` and report prior
//! outcomes without re-deriving them.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ast::TrailingUnit;

/// one call to `applyCure`, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CureAttempt {
    pub date: NaiveDate,
    pub mechanism: String,
    pub amount: Decimal,
    pub successful: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CureLedger {
    attempts: HashMap<String, Vec<CureAttempt>>,
}

impl CureLedger {
    pub fn new() -> Self {
        CureLedger::default()
    }

    pub fn record_attempt(&mut self, covenant: &str, attempt: CureAttempt) {
        self.attempts.entry(covenant.to_string()).or_default().push(attempt);
    }

    pub fn attempts(&self, covenant: &str) -> &[CureAttempt] {
        self.attempts.get(covenant).map(Vec::as_slice).unwrap_or(&[])
    }

    /// whether a successful cure attempt is already on record for this
    /// exact evaluation date, so a repeated `check` at the same date keeps
    /// reporting the same cured outcome without re-applying anything
    pub fn successful_attempt_on(&self, covenant: &str, date: NaiveDate) -> bool {
        self.attempts(covenant).iter().any(|a| a.successful && a.date == date)
    }

    /// how many successful cure uses fall within `window_count`
    /// `window_unit`s before (inclusive of) `as_of`
    pub fn uses_in_window(
        &self,
        covenant: &str,
        as_of: NaiveDate,
        window_count: i64,
        window_unit: TrailingUnit,
    ) -> usize {
        let cutoff = window_start(as_of, window_count, window_unit);
        self.attempts(covenant)
            .iter()
            .filter(|a| a.successful && a.date >= cutoff && a.date <= as_of)
            .count()
    }

    pub fn can_cure(&self, covenant: &str, as_of: NaiveDate, max_uses: i64, window_count: i64, window_unit: TrailingUnit) -> bool {
        (self.uses_in_window(covenant, as_of, window_count, window_unit) as i64) < max_uses
    }
}

fn window_start(as_of: NaiveDate, count: i64, unit: TrailingUnit) -> NaiveDate {
    let months_back = match unit {
        TrailingUnit::Months => count,
        TrailingUnit::Quarters => count * 3,
        TrailingUnit::Years => count * 12,
    };
    subtract_months(as_of, months_back)
}

fn subtract_months(date: NaiveDate, months: i64) -> NaiveDate {
    let total_months = date.year() as i64 * 12 + date.month0() as i64 - months;
    let year = (total_months.div_euclid(12)) as i32;
    let month0 = total_months.rem_euclid(12) as u32;
    let last_day = last_day_of_month(year, month0 + 1);
    NaiveDate::from_ymd_opt(year, month0 + 1, date.day().min(last_day)).expect("valid date")
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid date");
    (next - chrono::Duration::days(1)).day()
}

use chrono::Datelike;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn attempt(date: NaiveDate, successful: bool) -> CureAttempt {
        CureAttempt { date, mechanism: "EquityCureRight".to_string(), amount: dec!(20), successful }
    }

    #[test]
    fn limits_cure_uses_within_rolling_window() {
        let mut ledger = CureLedger::new();
        let d = |y, m, dd| NaiveDate::from_ymd_opt(y, m, dd).unwrap();
        ledger.record_attempt("MaxLeverage", attempt(d(2025, 3, 31), true));
        ledger.record_attempt("MaxLeverage", attempt(d(2025, 9, 30), true));
        assert!(ledger.can_cure("MaxLeverage", d(2026, 3, 31), 2, 4, TrailingUnit::Quarters));
        ledger.record_attempt("MaxLeverage", attempt(d(2026, 3, 31), true));
        assert!(!ledger.can_cure("MaxLeverage", d(2026, 3, 31), 2, 4, TrailingUnit::Quarters));
    }

    #[test]
    fn old_uses_fall_out_of_window() {
        let mut ledger = CureLedger::new();
        let d = |y, m, dd| NaiveDate::from_ymd_opt(y, m, dd).unwrap();
        ledger.record_attempt("MaxLeverage", attempt(d(2023, 1, 1), true));
        assert!(ledger.can_cure("MaxLeverage", d(2026, 3, 31), 1, 4, TrailingUnit::Quarters));
    }

    #[test]
    fn failed_attempts_do_not_consume_a_use() {
        let mut ledger = CureLedger::new();
        let d = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        ledger.record_attempt("MaxLeverage", attempt(d, false));
        assert!(ledger.can_cure("MaxLeverage", d, 1, 4, TrailingUnit::Quarters));
        assert!(!ledger.successful_attempt_on("MaxLeverage", d));
    }
}
