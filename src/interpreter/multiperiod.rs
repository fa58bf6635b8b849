//! Multi-period compliance history and pro-forma simulation (spec.md
//! §4.3.10-4.3.11): neither mutates the interpreter's running state, they
//! only read the recorded [`FinancialHistory`] and an ad-hoc observation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ast::CovenantStmt;
use crate::errors::ProvisoError;
use crate::events::EventStore;
use crate::financials::{FinancialObservation, Period};
use crate::interpreter::covenant::{self, CovenantResult};
use crate::interpreter::environment::Environment;
use crate::state::cure_ledger::CureLedger;
use crate::state::InterpreterState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodCompliance {
    pub period: Period,
    pub covenants: Vec<CovenantResult>,
    pub overall_compliant: bool,
}

/// Evaluates every covenant against every recorded period in chronological
/// order. A covenant suspended by the phase active at that period is
/// excluded from `overall_compliant` but still reported.
pub fn compliance_history(
    covenants: &[CovenantStmt],
    defines: &std::collections::HashMap<String, crate::ast::Expr>,
    conditions: &std::collections::HashMap<String, crate::ast::Expr>,
    history: &crate::financials::FinancialHistory,
    suspended_at: impl Fn(Period) -> Vec<String>,
) -> Result<Vec<PeriodCompliance>, ProvisoError> {
    let mut results = Vec::new();
    let cures = CureLedger::new();
    let state = InterpreterState::new();
    let mut events = EventStore::new();

    for (period, obs) in history.all_ascending() {
        let suspended = suspended_at(period);
        let env = Environment {
            defines,
            conditions,
            history,
            observation: obs,
            state: &state,
        };
        let mut covenant_results = Vec::with_capacity(covenants.len());
        let mut overall = true;
        for c in covenants {
            let result = covenant::check(c, &env, period.end_date, &cures, &mut events)?;
            if !suspended.contains(&c.name) && !result.passed && !result.cured {
                overall = false;
            }
            covenant_results.push(result);
        }
        results.push(PeriodCompliance {
            period,
            covenants: covenant_results,
            overall_compliant: overall,
        });
    }
    Ok(results)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub covenants: Vec<CovenantResult>,
}

/// Merges `changes` into the current observation (shallow record merge)
/// and reports what covenant results *would* obtain, without mutating any
/// real state.
pub fn simulate(
    covenants: &[CovenantStmt],
    defines: &std::collections::HashMap<String, crate::ast::Expr>,
    conditions: &std::collections::HashMap<String, crate::ast::Expr>,
    history: &crate::financials::FinancialHistory,
    current: &FinancialObservation,
    changes: &std::collections::HashMap<String, Decimal>,
    as_of: chrono::NaiveDate,
) -> Result<SimulationResult, ProvisoError> {
    let mut merged = current.clone();
    for (k, v) in changes {
        merged.insert(k.clone(), *v);
    }
    let state = InterpreterState::new();
    let env = Environment {
        defines,
        conditions,
        history,
        observation: &merged,
        state: &state,
    };
    let cures = CureLedger::new();
    let mut events = EventStore::new();
    let mut results = Vec::with_capacity(covenants.len());
    for c in covenants {
        results.push(covenant::check(c, &env, as_of, &cures, &mut events)?);
    }
    Ok(SimulationResult { covenants: results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, Expr, TestFrequency};
    use crate::span::Span;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn leverage_covenant() -> CovenantStmt {
        CovenantStmt {
            name: "MaxLeverage".to_string(),
            metric: Expr::Ident("Leverage".to_string(), Span::default()),
            operator: CompareOp::Le,
            threshold: Expr::Number(dec!(5.0), Span::default()),
            tested: TestFrequency::Quarterly,
            cure: None,
            breach_event: None,
            step_downs: vec![],
            span: Span::default(),
        }
    }

    #[test]
    fn compliance_history_reports_one_entry_per_period() {
        use crate::financials::{FinancialHistory, PeriodType};

        let covenants = vec![leverage_covenant()];
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let mut history = FinancialHistory::new();
        for (month, leverage) in [(3, 4.0), (6, 7.5), (9, 3.0)] {
            let mut obs = FinancialObservation::new();
            obs.insert("Leverage".to_string(), Decimal::try_from(leverage).unwrap());
            history.record(
                crate::financials::Period::new(chrono::NaiveDate::from_ymd_opt(2025, month, 30).unwrap(), PeriodType::Quarter),
                obs,
            );
        }
        let result = compliance_history(&covenants, &defines, &conditions, &history, |_| Vec::new()).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(
            result.iter().map(|p| p.overall_compliant).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }

    #[test]
    fn simulate_does_not_mutate_current_observation() {
        let covenants = vec![leverage_covenant()];
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = crate::financials::FinancialHistory::new();
        let mut current = FinancialObservation::new();
        current.insert("Leverage".to_string(), dec!(6.0));
        let mut changes = HashMap::new();
        changes.insert("Leverage".to_string(), dec!(3.0));

        let result = simulate(
            &covenants,
            &defines,
            &conditions,
            &history,
            &current,
            &changes,
            chrono::NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
        )
        .unwrap();
        assert!(result.covenants[0].passed);
        assert_eq!(current.get("Leverage").copied(), Some(dec!(6.0)));
    }
}
