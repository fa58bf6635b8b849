//! Field-level diffing between two [`CompiledState`]s (spec.md §4.4).
//! Fields are compared as canonical string renderings so that
//! semantically equal expressions diff as equal even when their source
//! text differs (e.g. whitespace, or `5%` vs `5.00%`).

use serde::{Deserialize, Serialize};

use crate::ast::{Statement, StatementKind};
use crate::diff::compiler::{CompileResult, CompiledState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub from_value: String,
    pub to_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub change_type: ChangeType,
    pub element_type: StatementKind,
    pub element_name: String,
    pub from_element: Option<Statement>,
    pub to_element: Option<Statement>,
    pub field_changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub success: bool,
    pub from_error: Option<String>,
    pub to_error: Option<String>,
    pub diffs: Vec<Diff>,
    pub stats: DiffStats,
}

const ALL_KINDS: &[StatementKind] = &[
    StatementKind::Define,
    StatementKind::Covenant,
    StatementKind::Basket,
    StatementKind::Condition,
    StatementKind::Prohibit,
    StatementKind::Event,
    StatementKind::Phase,
    StatementKind::Transition,
    StatementKind::Milestone,
    StatementKind::TechnicalMilestone,
    StatementKind::RegulatoryRequirement,
    StatementKind::PerformanceGuarantee,
    StatementKind::DegradationSchedule,
    StatementKind::SeasonalAdjustment,
    StatementKind::TaxEquityStructure,
    StatementKind::TaxCredit,
    StatementKind::Depreciation,
    StatementKind::FlipEvent,
    StatementKind::Reserve,
    StatementKind::Waterfall,
    StatementKind::ConditionsPrecedent,
    StatementKind::Load,
];

pub fn diff_sources(from: &CompileResult, to: &CompileResult) -> DiffResult {
    if from.error.is_some() || to.error.is_some() {
        return DiffResult {
            success: false,
            from_error: from.error.clone(),
            to_error: to.error.clone(),
            diffs: Vec::new(),
            stats: DiffStats::default(),
        };
    }
    diff(&from.state, &to.state)
}

pub fn diff(from: &CompiledState, to: &CompiledState) -> DiffResult {
    let mut diffs = Vec::new();
    let mut stats = DiffStats::default();

    for &kind in ALL_KINDS {
        let from_map = from.kind_map(kind);
        let to_map = to.kind_map(kind);
        let from_names: Vec<&String> = from_map.map(|m| m.keys().collect()).unwrap_or_default();
        let to_names: Vec<&String> = to_map.map(|m| m.keys().collect()).unwrap_or_default();

        for name in &from_names {
            let from_el = from_map.unwrap().get(*name).unwrap();
            match to_map.and_then(|m| m.get(*name)) {
                None => {
                    diffs.push(Diff {
                        change_type: ChangeType::Removed,
                        element_type: kind,
                        element_name: (*name).clone(),
                        from_element: Some(from_el.clone()),
                        to_element: None,
                        field_changes: Vec::new(),
                    });
                    stats.removed += 1;
                }
                Some(to_el) => {
                    let field_changes = field_changes(kind, from_el, to_el);
                    if !field_changes.is_empty() {
                        diffs.push(Diff {
                            change_type: ChangeType::Modified,
                            element_type: kind,
                            element_name: (*name).clone(),
                            from_element: Some(from_el.clone()),
                            to_element: Some(to_el.clone()),
                            field_changes,
                        });
                        stats.modified += 1;
                    }
                }
            }
        }
        for name in &to_names {
            if from_map.and_then(|m| m.get(*name)).is_none() {
                let to_el = to_map.unwrap().get(*name).unwrap();
                diffs.push(Diff {
                    change_type: ChangeType::Added,
                    element_type: kind,
                    element_name: (*name).clone(),
                    from_element: None,
                    to_element: Some(to_el.clone()),
                    field_changes: Vec::new(),
                });
                stats.added += 1;
            }
        }
    }

    DiffResult {
        success: true,
        from_error: None,
        to_error: None,
        diffs,
        stats,
    }
}

fn field_changes(kind: StatementKind, from: &Statement, to: &Statement) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let mut push = |field: &str, a: String, b: String| {
        if a != b {
            changes.push(FieldChange {
                field: field.to_string(),
                from_value: a,
                to_value: b,
            });
        }
    };

    match (kind, from, to) {
        (StatementKind::Define, Statement::Define(a), Statement::Define(b)) => {
            push("expr", a.expr.canonical(), b.expr.canonical());
            push("excluding", a.excluding.join(","), b.excluding.join(","));
            push(
                "capped_at",
                a.capped_at.as_ref().map(|e| e.canonical()).unwrap_or_default(),
                b.capped_at.as_ref().map(|e| e.canonical()).unwrap_or_default(),
            );
        }
        (StatementKind::Covenant, Statement::Covenant(a), Statement::Covenant(b)) => {
            push("metric", a.metric.canonical(), b.metric.canonical());
            push("threshold", a.threshold.canonical(), b.threshold.canonical());
            push("operator", a.operator.as_str().to_string(), b.operator.as_str().to_string());
            push("tested", format!("{:?}", a.tested), format!("{:?}", b.tested));
            push(
                "cure",
                a.cure.as_ref().map(cure_summary).unwrap_or_default(),
                b.cure.as_ref().map(cure_summary).unwrap_or_default(),
            );
        }
        (StatementKind::Basket, Statement::Basket(a), Statement::Basket(b)) => {
            push("capacity", opt_canonical(&a.capacity), opt_canonical(&b.capacity));
            push("floor", opt_canonical(&a.floor), opt_canonical(&b.floor));
            push("maximum", opt_canonical(&a.maximum), opt_canonical(&b.maximum));
            push("builds_from", opt_canonical(&a.builds_from), opt_canonical(&b.builds_from));
            push("starting", opt_canonical(&a.starting), opt_canonical(&b.starting));
        }
        (StatementKind::Condition, Statement::Condition(a), Statement::Condition(b)) => {
            push("expr", a.expr.canonical(), b.expr.canonical());
        }
        (StatementKind::Phase, Statement::Phase(a), Statement::Phase(b)) => {
            push("until", a.until.clone().unwrap_or_default(), b.until.clone().unwrap_or_default());
            push("from", a.from.clone().unwrap_or_default(), b.from.clone().unwrap_or_default());
            push("covenants_suspended", a.covenants_suspended.join(","), b.covenants_suspended.join(","));
            push("covenants_active", a.covenants_active.join(","), b.covenants_active.join(","));
            push("required", a.required.join(","), b.required.join(","));
        }
        (StatementKind::Milestone, Statement::Milestone(a), Statement::Milestone(b)) => {
            push("target", a.target.to_string(), b.target.to_string());
            push("longstop", a.longstop.to_string(), b.longstop.to_string());
            push("requires", format!("{:?}", a.requires), format!("{:?}", b.requires));
        }
        (StatementKind::Reserve, Statement::Reserve(a), Statement::Reserve(b)) => {
            push("target", a.target.canonical(), b.target.canonical());
            push("minimum", opt_canonical(&a.minimum), opt_canonical(&b.minimum));
            push("funded_by", a.funded_by.join(","), b.funded_by.join(","));
            push("released_to", a.released_to.clone().unwrap_or_default(), b.released_to.clone().unwrap_or_default());
        }
        (StatementKind::Waterfall, Statement::Waterfall(a), Statement::Waterfall(b)) => {
            push("frequency", format!("{:?}", a.frequency), format!("{:?}", b.frequency));
            push("tiers", tiers_summary(a), tiers_summary(b));
        }
        _ => {
            // any other kind falls back to a whole-element equality check
            // (spec.md §4.4's fallback rule)
            let a = serde_json::to_string(from).unwrap_or_default();
            let b = serde_json::to_string(to).unwrap_or_default();
            push("element", a, b);
        }
    }
    changes
}

fn opt_canonical(e: &Option<crate::ast::Expr>) -> String {
    e.as_ref().map(|e| e.canonical()).unwrap_or_default()
}

fn cure_summary(c: &crate::ast::CureClause) -> String {
    format!("{}:{}:{:?}:{}:{}", c.mechanism, c.max_uses, c.window_unit, c.window_count, c.max_amount.canonical())
}

fn tiers_summary(w: &crate::ast::WaterfallStmt) -> String {
    w.tiers
        .iter()
        .map(|t| format!("{}:{}:{}:{:?}", t.priority, t.label, t.pay.canonical(), t.from))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compiler::compile_source;

    #[test]
    fn detects_threshold_and_capacity_changes() {
        let from = compile_source(
            "COVENANT MaxLeverage REQUIRES Leverage <= 5.00 TESTED QUARTERLY\n\
             BASKET GeneralRP CAPACITY $25,000,000\n",
        );
        let to = compile_source(
            "COVENANT MaxLeverage REQUIRES Leverage <= 5.25 TESTED QUARTERLY\n\
             BASKET GeneralRP CAPACITY $35,000,000\n",
        );
        let result = diff_sources(&from, &to);
        assert!(result.success);
        assert_eq!(result.diffs.len(), 2);
        assert_eq!(result.stats.modified, 2);
    }

    #[test]
    fn identical_programs_diff_to_empty() {
        let source = "COVENANT MaxLeverage REQUIRES Leverage <= 5.00 TESTED QUARTERLY\n";
        let a = compile_source(source);
        let b = compile_source(source);
        let result = diff_sources(&a, &b);
        assert!(result.diffs.is_empty());
    }

    #[test]
    fn added_and_removed_elements_are_reported() {
        let from = compile_source("BASKET OldBasket CAPACITY $1,000,000\n");
        let to = compile_source("BASKET NewBasket CAPACITY $2,000,000\n");
        let result = diff_sources(&from, &to);
        assert_eq!(result.stats.added, 1);
        assert_eq!(result.stats.removed, 1);
    }
}
