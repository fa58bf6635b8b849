//! Phase transition evaluation: fires the first [`TransitionStmt`] whose
//! source phase matches the current phase and whose `WHEN` condition
//! holds.

use chrono::NaiveDate;

use crate::ast::{TransitionStmt, TransitionWhen};
use crate::errors::ProvisoError;
use crate::events::{Event, EventStore};
use crate::interpreter::environment::Environment;
use crate::state::phase_state::PhaseState;

fn when_holds(when: &TransitionWhen, env: &Environment) -> Result<bool, ProvisoError> {
    match when {
        TransitionWhen::Ref(name) => {
            if let Some(cond) = env.conditions.get(name) {
                env.eval_bool(cond)
            } else {
                Ok(env.state.is_event_triggered(name))
            }
        }
        TransitionWhen::AllOf(names) => {
            for name in names {
                if !single_ref_holds(name, env)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        TransitionWhen::AnyOf(names) => {
            for name in names {
                if single_ref_holds(name, env)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn single_ref_holds(name: &str, env: &Environment) -> Result<bool, ProvisoError> {
    if let Some(cond) = env.conditions.get(name) {
        env.eval_bool(cond)
    } else {
        Ok(env.state.is_event_triggered(name))
    }
}

/// evaluates every transition in declaration order and fires the first
/// one whose source phase is current and condition holds. Returns the
/// name of the phase entered, if any.
pub fn advance(
    transitions: &[TransitionStmt],
    state: &mut PhaseState,
    env: &Environment,
    as_of: NaiveDate,
    events: &mut EventStore,
) -> Result<Option<String>, ProvisoError> {
    let current = state.current().map(|s| s.to_string());
    for transition in transitions {
        if current.as_deref() != Some(transition.from_phase.as_str()) {
            continue;
        }
        if when_holds(&transition.when, env)? {
            if let Some(from) = &current {
                events.emit(Event::PhaseExited { name: from.clone() });
            }
            state.enter(&transition.to_phase, as_of, Some(transition.name.clone()));
            events.emit(Event::PhaseEntered {
                name: transition.to_phase.clone(),
            });
            events.emit(Event::TransitionFired {
                name: transition.name.clone(),
                from: current.unwrap_or_default(),
                to: transition.to_phase.clone(),
            });
            return Ok(Some(transition.to_phase.clone()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::financials::{FinancialHistory, FinancialObservation};
    use crate::span::Span;
    use crate::state::InterpreterState;
    use std::collections::HashMap;

    #[test]
    fn fires_transition_when_event_triggered() {
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let obs = FinancialObservation::new();
        let mut interp_state = InterpreterState::new();
        interp_state.trigger_event("COD");
        let env = Environment { defines: &defines, conditions: &conditions, history: &history, observation: &obs, state: &interp_state };

        let mut phase_state = PhaseState::new();
        phase_state.enter("Construction", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), None);

        let transition = TransitionStmt {
            name: "ToOperations".to_string(),
            from_phase: "Construction".to_string(),
            to_phase: "Operations".to_string(),
            when: TransitionWhen::Ref("COD".to_string()),
            span: Span::default(),
        };
        let mut events = EventStore::new();
        let entered = advance(&[transition], &mut phase_state, &env, NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(), &mut events).unwrap();
        assert_eq!(entered, Some("Operations".to_string()));
        assert_eq!(phase_state.current(), Some("Operations"));
    }
}
