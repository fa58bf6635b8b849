//! Thin event-emitting wrapper over [`crate::state::cp_state::CpState`].

use crate::ast::{ConditionsPrecedentStmt, CpStatus};
use crate::errors::ProvisoError;
use crate::events::{Event, EventStore};
use crate::state::cp_state::CpState;

pub fn satisfy(
    checklist: &ConditionsPrecedentStmt,
    state: &mut CpState,
    item: &str,
    events: &mut EventStore,
) -> Result<(), ProvisoError> {
    if !checklist.items.iter().any(|i| i.name == item) {
        return Err(ProvisoError::InvariantViolation {
            message: format!("'{item}' is not an item of checklist '{}'", checklist.name),
        });
    }
    state.set_status(&checklist.name, item, CpStatus::Satisfied);
    events.emit(Event::ConditionPrecedentSatisfied {
        checklist: checklist.name.clone(),
        item: item.to_string(),
    });
    Ok(())
}

pub fn waive(
    checklist: &ConditionsPrecedentStmt,
    state: &mut CpState,
    item: &str,
    events: &mut EventStore,
) -> Result<(), ProvisoError> {
    if !checklist.items.iter().any(|i| i.name == item) {
        return Err(ProvisoError::InvariantViolation {
            message: format!("'{item}' is not an item of checklist '{}'", checklist.name),
        });
    }
    state.set_status(&checklist.name, item, CpStatus::Waived);
    events.emit(Event::ConditionPrecedentWaived {
        checklist: checklist.name.clone(),
        item: item.to_string(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CpItem;
    use crate::span::Span;

    #[test]
    fn satisfying_unknown_item_errors() {
        let checklist = ConditionsPrecedentStmt {
            name: "FinancingCPs".to_string(),
            section: None,
            items: vec![CpItem {
                name: "TitleInsurance".to_string(),
                description: None,
                responsible: None,
                initial_status: CpStatus::Pending,
                satisfies: vec![],
            }],
            span: Span::default(),
        };
        let mut state = CpState::new();
        let mut events = EventStore::new();
        assert!(satisfy(&checklist, &mut state, "DoesNotExist", &mut events).is_err());
        assert!(satisfy(&checklist, &mut state, "TitleInsurance", &mut events).is_ok());
    }
}
