//! Which amendments have already been applied to a program, so the
//! interpreter never re-applies the same amendment twice.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAmendment {
    pub number: i64,
    pub effective: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmendmentsLog {
    applied: Vec<AppliedAmendment>,
}

impl AmendmentsLog {
    pub fn new() -> Self {
        AmendmentsLog::default()
    }

    pub fn is_applied(&self, number: i64) -> bool {
        self.applied.iter().any(|a| a.number == number)
    }

    pub fn record(&mut self, applied: AppliedAmendment) {
        self.applied.push(applied);
    }

    pub fn applied(&self) -> &[AppliedAmendment] {
        &self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_which_amendments_are_applied() {
        let mut log = AmendmentsLog::new();
        assert!(!log.is_applied(1));
        log.record(AppliedAmendment {
            number: 1,
            effective: None,
            description: Some("waiver".to_string()),
        });
        assert!(log.is_applied(1));
        assert!(!log.is_applied(2));
    }
}
