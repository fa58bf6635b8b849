//! Applies an [`AmendmentStmt`]'s directives to a program in place: ADD,
//! DELETE, REPLACE, and MODIFY (field-by-field overrides keyed by
//! statement kind).

use crate::ast::{AmendmentDirective, AmendmentStmt, Expr, ModifyField, Program, Statement};
use crate::errors::ProvisoError;
use crate::events::{Event, EventStore};
use crate::state::amendments_log::{AmendmentsLog, AppliedAmendment};

pub fn apply(
    amendment: &AmendmentStmt,
    program: &mut Program,
    log: &mut AmendmentsLog,
    events: &mut EventStore,
) -> Result<(), ProvisoError> {
    if log.is_applied(amendment.number) {
        return Ok(());
    }

    for (i, directive) in amendment.directives.iter().enumerate() {
        apply_directive(amendment, i, directive, program).map_err(|reason| ProvisoError::AmendmentTargetMissing {
            amendment: amendment.number.to_string(),
            directive_index: i,
            reason,
        })?;
    }

    log.record(AppliedAmendment {
        number: amendment.number,
        effective: amendment.effective,
        description: amendment.description.clone(),
    });
    events.emit(Event::AmendmentApplied { number: amendment.number });
    Ok(())
}

fn apply_directive(
    amendment: &AmendmentStmt,
    index: usize,
    directive: &AmendmentDirective,
    program: &mut Program,
) -> Result<(), String> {
    match directive {
        AmendmentDirective::Add(stmt) => {
            program.statements.push((**stmt).clone());
            Ok(())
        }
        AmendmentDirective::Delete { kind, name } => {
            let before = program.statements.len();
            program
                .statements
                .retain(|s| !(s.kind() == Some(*kind) && s.name() == Some(name.as_str())));
            if program.statements.len() == before {
                Err(format!("no {kind:?} named '{name}' to delete"))
            } else {
                Ok(())
            }
        }
        AmendmentDirective::Replace { kind, name, statement } => {
            let pos = program
                .statements
                .iter()
                .position(|s| s.kind() == Some(*kind) && s.name() == Some(name.as_str()))
                .ok_or_else(|| format!("no {kind:?} named '{name}' to replace"))?;
            program.statements[pos] = (**statement).clone();
            Ok(())
        }
        AmendmentDirective::Modify { kind, name, fields } => {
            let pos = program
                .statements
                .iter()
                .position(|s| s.kind() == Some(*kind) && s.name() == Some(name.as_str()))
                .ok_or_else(|| format!("no {kind:?} named '{name}' to modify"))?;
            for field in fields {
                modify_field(&mut program.statements[pos], field)
                    .map_err(|e| format!("amendment {} directive #{index}: {e}", amendment.number))?;
            }
            Ok(())
        }
    }
}

fn modify_field(stmt: &mut Statement, field: &ModifyField) -> Result<(), String> {
    let name = field.field.as_str();
    let value: Expr = field.value.clone();
    match stmt {
        Statement::Covenant(c) => match name {
            "threshold" => c.threshold = value,
            "metric" => c.metric = value,
            _ => return Err(unknown_field(name, "COVENANT")),
        },
        Statement::Basket(b) => match name {
            "capacity" => b.capacity = Some(value),
            "floor" => b.floor = Some(value),
            "maximum" => b.maximum = Some(value),
            "starting" => b.starting = Some(value),
            "builds_from" => b.builds_from = Some(value),
            _ => return Err(unknown_field(name, "BASKET")),
        },
        Statement::Reserve(r) => match name {
            "target" => r.target = value,
            "minimum" => r.minimum = Some(value),
            _ => return Err(unknown_field(name, "RESERVE")),
        },
        Statement::Condition(c) => match name {
            "expr" => c.expr = value,
            _ => return Err(unknown_field(name, "CONDITION")),
        },
        Statement::RegulatoryRequirement(r) => match name {
            "requires" => r.requires = value,
            _ => return Err(unknown_field(name, "REGULATORY_REQUIREMENT")),
        },
        Statement::Define(d) => match name {
            "expr" => d.expr = value,
            "capped_at" => d.capped_at = Some(value),
            _ => return Err(unknown_field(name, "DEFINE")),
        },
        _ => return Err("MODIFY is not supported for this statement kind".to_string()),
    }
    Ok(())
}

fn unknown_field(field: &str, kind: &str) -> String {
    format!("unknown field '{field}' for {kind}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn modify_updates_covenant_threshold() {
        let mut program = parse(
            "COVENANT MaxLeverage REQUIRES Debt / EBITDA <= 4.0x TESTED QUARTERLY\n\
             AMENDMENT 1 MODIFY COVENANT MaxLeverage SET threshold = 4.5x",
        )
        .unwrap();
        let amendment = match program.statements.last().unwrap().clone() {
            Statement::Amendment(a) => a,
            _ => panic!("expected amendment"),
        };
        let mut log = AmendmentsLog::new();
        let mut events = EventStore::new();
        apply(&amendment, &mut program, &mut log, &mut events).unwrap();
        match &program.statements[0] {
            Statement::Covenant(c) => assert_eq!(c.threshold.canonical(), "4.5x"),
            _ => panic!("expected covenant"),
        }
        assert!(log.is_applied(1));
    }

    #[test]
    fn delete_of_missing_target_errors() {
        let mut program = parse("AMENDMENT 1 DELETE BASKET DoesNotExist").unwrap();
        let amendment = match program.statements[0].clone() {
            Statement::Amendment(a) => a,
            _ => panic!("expected amendment"),
        };
        let mut log = AmendmentsLog::new();
        let mut events = EventStore::new();
        let result = apply(&amendment, &mut program, &mut log, &mut events);
        assert!(result.is_err());
    }
}
