//! Runtime achievement tracking for milestones and technical milestones.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MilestoneState {
    achieved: HashMap<String, NaiveDate>,
    missed: HashSet<String>,
    technical_progress: HashMap<String, Decimal>,
}

impl MilestoneState {
    pub fn new() -> Self {
        MilestoneState::default()
    }

    pub fn is_achieved(&self, name: &str) -> bool {
        self.achieved.contains_key(name)
    }

    pub fn is_missed(&self, name: &str) -> bool {
        self.missed.contains(name)
    }

    pub fn achieved_on(&self, name: &str) -> Option<NaiveDate> {
        self.achieved.get(name).copied()
    }

    pub fn mark_achieved(&mut self, name: &str, date: NaiveDate) {
        self.achieved.insert(name.to_string(), date);
    }

    pub fn mark_missed(&mut self, name: &str) {
        self.missed.insert(name.to_string());
    }

    pub fn progress(&self, name: &str) -> Option<Decimal> {
        self.technical_progress.get(name).copied()
    }

    pub fn update_progress(&mut self, name: &str, value: Decimal) {
        self.technical_progress.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tracks_achievement_and_progress() {
        let mut state = MilestoneState::new();
        let d = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        state.mark_achieved("NTP", d);
        state.update_progress("MechanicalCompletion", dec!(0.82));
        assert!(state.is_achieved("NTP"));
        assert_eq!(state.achieved_on("NTP"), Some(d));
        assert_eq!(state.progress("MechanicalCompletion"), Some(dec!(0.82)));
    }
}
