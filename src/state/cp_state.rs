//! Runtime status of conditions precedent checklist items. The AST node's
//! `initial_status` is the default; anything recorded here overrides it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ast::{ConditionsPrecedentStmt, CpStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpState {
    overrides: HashMap<(String, String), CpStatus>,
}

impl CpState {
    pub fn new() -> Self {
        CpState::default()
    }

    pub fn status(&self, checklist: &ConditionsPrecedentStmt, item: &str) -> Option<CpStatus> {
        if let Some(status) = self.overrides.get(&(checklist.name.clone(), item.to_string())) {
            return Some(*status);
        }
        checklist.items.iter().find(|i| i.name == item).map(|i| i.initial_status)
    }

    pub fn set_status(&mut self, checklist: &str, item: &str, status: CpStatus) {
        self.overrides.insert((checklist.to_string(), item.to_string()), status);
    }

    pub fn all_satisfied(&self, checklist: &ConditionsPrecedentStmt) -> bool {
        checklist.items.iter().all(|item| {
            matches!(
                self.status(checklist, &item.name),
                Some(CpStatus::Satisfied) | Some(CpStatus::Waived) | Some(CpStatus::NotApplicable)
            )
        })
    }

    pub fn outstanding<'a>(&self, checklist: &'a ConditionsPrecedentStmt) -> Vec<&'a str> {
        checklist
            .items
            .iter()
            .filter(|item| matches!(self.status(checklist, &item.name), Some(CpStatus::Pending) | None))
            .map(|item| item.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CpItem;
    use crate::span::Span;

    fn checklist() -> ConditionsPrecedentStmt {
        ConditionsPrecedentStmt {
            name: "FinancingCPs".to_string(),
            section: None,
            items: vec![
                CpItem {
                    name: "TitleInsurance".to_string(),
                    description: None,
                    responsible: None,
                    initial_status: CpStatus::Pending,
                    satisfies: vec![],
                },
                CpItem {
                    name: "PermitsObtained".to_string(),
                    description: None,
                    responsible: None,
                    initial_status: CpStatus::Pending,
                    satisfies: vec![],
                },
            ],
            span: Span::default(),
        }
    }

    #[test]
    fn tracks_overrides_and_outstanding_items() {
        let checklist = checklist();
        let mut state = CpState::new();
        assert_eq!(state.outstanding(&checklist).len(), 2);
        state.set_status("FinancingCPs", "TitleInsurance", CpStatus::Satisfied);
        assert_eq!(state.outstanding(&checklist), vec!["PermitsObtained"]);
        assert!(!state.all_satisfied(&checklist));
        state.set_status("FinancingCPs", "PermitsObtained", CpStatus::Waived);
        assert!(state.all_satisfied(&checklist));
    }
}
