//! Which phase is currently active, and the history of transitions that
//! got it there.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransitionRecord {
    pub from: Option<String>,
    pub to: String,
    pub date: NaiveDate,
    pub via_transition: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseState {
    current: Option<String>,
    history: Vec<PhaseTransitionRecord>,
}

impl PhaseState {
    pub fn new() -> Self {
        PhaseState::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn history(&self) -> &[PhaseTransitionRecord] {
        &self.history
    }

    pub fn enter(&mut self, to: &str, date: NaiveDate, via_transition: Option<String>) {
        let from = self.current.take();
        self.history.push(PhaseTransitionRecord {
            from,
            to: to.to_string(),
            date,
            via_transition,
        });
        self.current = Some(to.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_transition_history() {
        let mut state = PhaseState::new();
        let d = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        state.enter("Construction", d, None);
        state.enter("Operations", d, Some("COD".to_string()));
        assert_eq!(state.current(), Some("Operations"));
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.history()[1].from, Some("Construction".to_string()));
    }
}
