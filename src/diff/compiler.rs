//! Compiles a [`Program`] into one name-keyed map per element kind, the
//! input the differ needs to compare two versions of an agreement.

use std::collections::HashMap;

use crate::ast::{Program, Statement, StatementKind};
use crate::parser::ParseError;

#[derive(Debug, Clone, Default)]
pub struct CompiledState {
    by_kind: HashMap<StatementKind, HashMap<String, Statement>>,
}

impl CompiledState {
    pub fn get(&self, kind: StatementKind, name: &str) -> Option<&Statement> {
        self.by_kind.get(&kind)?.get(name)
    }

    pub fn kind_map(&self, kind: StatementKind) -> Option<&HashMap<String, Statement>> {
        self.by_kind.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &StatementKind> {
        self.by_kind.keys()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    pub state: CompiledState,
    pub error: Option<String>,
}

/// compiles `source`. On parse failure the result carries the error and
/// empty maps rather than propagating it, so the differ can still report
/// `{success: false, fromError/toError}` (spec.md §4.4).
pub fn compile_source(source: &str) -> CompileResult {
    match crate::parser::parse(source) {
        Ok(program) => CompileResult {
            state: compile(&program),
            error: None,
        },
        Err(e) => CompileResult {
            state: CompiledState::default(),
            error: Some(format_parse_error(&e)),
        },
    }
}

pub fn compile(program: &Program) -> CompiledState {
    let mut by_kind: HashMap<StatementKind, HashMap<String, Statement>> = HashMap::new();
    for stmt in &program.statements {
        let (Some(kind), Some(name)) = (stmt.kind(), stmt.name()) else {
            continue;
        };
        by_kind.entry(kind).or_default().insert(name.to_string(), stmt.clone());
    }
    CompiledState { by_kind }
}

fn format_parse_error(e: &ParseError) -> String {
    e.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_comments_and_amendments() {
        let result = compile_source(
            "// a comment\nCOVENANT MaxLeverage REQUIRES Debt / EBITDA <= 4.0x TESTED QUARTERLY\n\
             AMENDMENT 1 DELETE COVENANT MaxLeverage",
        );
        assert!(result.error.is_none());
        assert!(result.state.kind_map(StatementKind::Amendment).is_none());
        assert!(result.state.get(StatementKind::Covenant, "MaxLeverage").is_some());
    }

    #[test]
    fn parse_failure_carries_error_with_empty_state() {
        let result = compile_source("COVENANT");
        assert!(result.error.is_some());
        assert!(result.state.kinds().next().is_none());
    }
}
