//! Static checks that run after parsing and before interpretation:
//! duplicate names, undefined identifiers, and DEFINE dependency cycles
//! (spec.md §4.2).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::ast::{Expr, Program, Statement, StatementKind};
use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

const BUILTIN_FUNCTIONS: &[&str] = &[
    "GreaterOf", "LesserOf", "Min", "Max", "AllOf", "AnyOf", "Abs", "Sum", "Average",
];

/// validate a program, returning every error/warning found rather than
/// stopping at the first one
pub fn validate(program: &Program) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut names: HashMap<(StatementKind, String), Span> = HashMap::new();
    let mut all_names: HashMap<String, Span> = HashMap::new();

    for stmt in &program.statements {
        let (Some(kind), Some(name)) = (stmt.kind(), stmt.name()) else {
            continue;
        };
        let key = (kind, name.to_string());
        if let Some(prev) = names.get(&key) {
            report.errors.push(Diagnostic {
                message: format!("duplicate name '{name}' (first defined at offset {})", prev.start.offset),
                span: stmt.span(),
            });
        } else {
            names.insert(key, stmt.span());
        }
        all_names.entry(name.to_string()).or_insert_with(|| stmt.span());
    }

    check_undefined_identifiers(program, &all_names, &mut report);
    check_define_cycles(program, &mut report);
    check_basket_subject_to(program, &all_names, &mut report);
    check_amendment_targets(program, &names, &mut report);

    report
}

fn walk_expr(expr: &Expr, f: &mut impl FnMut(&str, Span)) {
    match expr {
        Expr::Ident(name, span) => f(name, *span),
        Expr::Number(..) | Expr::Currency(..) | Expr::Percentage(..) | Expr::Ratio(..) | Expr::Bps(..) => {}
        Expr::Binary { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
            walk_expr(lhs, f);
            walk_expr(rhs, f);
        }
        Expr::Unary { expr, .. } => walk_expr(expr, f),
        Expr::Call { name, args, span } => {
            if !BUILTIN_FUNCTIONS.iter().any(|b| b.eq_ignore_ascii_case(name)) {
                f(name, *span);
            }
            for a in args {
                walk_expr(a, f);
            }
        }
        Expr::Trailing { expr, .. } => walk_expr(expr, f),
    }
}

fn check_undefined_identifiers(
    program: &Program,
    all_names: &HashMap<String, Span>,
    report: &mut ValidationReport,
) {
    let mut check = |name: &str, span: Span, report: &mut ValidationReport| {
        if !all_names.contains_key(name) {
            report.errors.push(Diagnostic {
                message: format!("undefined identifier '{name}'"),
                span,
            });
        }
    };

    for stmt in &program.statements {
        match stmt {
            Statement::Define(d) => {
                walk_expr(&d.expr, &mut |n, s| check(n, s, report));
                if let Some(c) = &d.capped_at {
                    walk_expr(c, &mut |n, s| check(n, s, report));
                }
                for name in &d.excluding {
                    check(name, d.span, report);
                }
            }
            Statement::Covenant(c) => {
                walk_expr(&c.metric, &mut |n, s| check(n, s, report));
                walk_expr(&c.threshold, &mut |n, s| check(n, s, report));
                for sd in &c.step_downs {
                    walk_expr(&sd.threshold, &mut |n, s| check(n, s, report));
                }
                if let Some(cure) = &c.cure {
                    walk_expr(&cure.max_amount, &mut |n, s| check(n, s, report));
                }
            }
            Statement::Basket(b) => {
                for e in [&b.capacity, &b.floor, &b.builds_from, &b.starting, &b.maximum]
                    .into_iter()
                    .flatten()
                {
                    walk_expr(e, &mut |n, s| check(n, s, report));
                }
            }
            Statement::Condition(c) => walk_expr(&c.expr, &mut |n, s| check(n, s, report)),
            Statement::Prohibit(p) => {
                if let Some(u) = &p.unless {
                    walk_expr(u, &mut |n, s| check(n, s, report));
                }
            }
            Statement::Event(e) => {
                if let Some(w) = &e.when {
                    walk_expr(w, &mut |n, s| check(n, s, report));
                }
            }
            Statement::RegulatoryRequirement(r) => walk_expr(&r.requires, &mut |n, s| check(n, s, report)),
            Statement::PerformanceGuarantee(p) => {
                walk_expr(&p.guaranteed_output, &mut |n, s| check(n, s, report));
                if let Some(sr) = &p.shortfall_remedy {
                    walk_expr(sr, &mut |n, s| check(n, s, report));
                }
            }
            Statement::DegradationSchedule(d) => {
                walk_expr(&d.base_output, &mut |n, s| check(n, s, report));
                walk_expr(&d.annual_factor, &mut |n, s| check(n, s, report));
            }
            Statement::SeasonalAdjustment(s) => walk_expr(&s.base, &mut |n, sp| check(n, sp, report)),
            Statement::TaxCredit(t) => {
                walk_expr(&t.basis, &mut |n, s| check(n, s, report));
                walk_expr(&t.rate, &mut |n, s| check(n, s, report));
            }
            Statement::Depreciation(d) => walk_expr(&d.basis, &mut |n, s| check(n, s, report)),
            Statement::FlipEvent(f) => {
                if let Some(irr) = &f.target_irr {
                    walk_expr(irr, &mut |n, s| check(n, s, report));
                }
            }
            Statement::Reserve(r) => {
                walk_expr(&r.target, &mut |n, s| check(n, s, report));
                if let Some(m) = &r.minimum {
                    walk_expr(m, &mut |n, s| check(n, s, report));
                }
                for f in &r.funded_by {
                    check(f, r.span, report);
                }
            }
            Statement::Waterfall(w) => {
                for t in &w.tiers {
                    walk_expr(&t.pay, &mut |n, s| check(n, s, report));
                    if let Some(u) = &t.until {
                        walk_expr(u, &mut |n, s| check(n, s, report));
                    }
                    if let Some(c) = &t.if_cond {
                        walk_expr(c, &mut |n, s| check(n, s, report));
                    }
                }
            }
            Statement::TechnicalMilestone(t) => walk_expr(&t.target_value, &mut |n, s| check(n, s, report)),
            Statement::Phase(_)
            | Statement::Transition(_)
            | Statement::Milestone(_)
            | Statement::TaxEquityStructure(_)
            | Statement::ConditionsPrecedent(_)
            | Statement::Load(_)
            | Statement::Comment(_)
            | Statement::Amendment(_) => {}
        }
    }
}

fn check_define_cycles(program: &Program, report: &mut ValidationReport) {
    let mut deps: HashMap<String, Vec<String>> = HashMap::new();
    let mut spans: HashMap<String, Span> = HashMap::new();
    for stmt in &program.statements {
        if let Statement::Define(d) = stmt {
            let mut refs = Vec::new();
            walk_expr(&d.expr, &mut |n, _| refs.push(n.to_string()));
            if let Some(c) = &d.capped_at {
                walk_expr(c, &mut |n, _| refs.push(n.to_string()));
            }
            deps.insert(d.name.clone(), refs);
            spans.insert(d.name.clone(), d.span);
        }
    }

    #[derive(PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut reported: HashSet<String> = HashSet::new();

    fn visit(
        name: &str,
        deps: &HashMap<String, Vec<String>>,
        marks: &mut HashMap<String, Mark>,
        stack: &mut Vec<String>,
        reported: &mut HashSet<String>,
        report: &mut ValidationReport,
        spans: &HashMap<String, Span>,
    ) {
        if let Some(Mark::Done) = marks.get(name) {
            return;
        }
        if marks.get(name) == Some(&Mark::Visiting) {
            let cycle_start = stack.iter().position(|n| n == name).unwrap_or(0);
            let cycle: Vec<String> = stack[cycle_start..].to_vec();
            let key = {
                let mut sorted = cycle.clone();
                sorted.sort();
                sorted.join(",")
            };
            if reported.insert(key) {
                report.errors.push(Diagnostic {
                    message: format!(
                        "cycle detected in DEFINE dependencies: {} -> {}",
                        cycle.join(" -> "),
                        name
                    ),
                    span: spans.get(name).copied().unwrap_or_default(),
                });
            }
            return;
        }
        let Some(refs) = deps.get(name) else {
            return;
        };
        marks.insert(name.to_string(), Mark::Visiting);
        stack.push(name.to_string());
        for dep in refs {
            if deps.contains_key(dep) {
                visit(dep, deps, marks, stack, reported, report, spans);
            }
        }
        stack.pop();
        marks.insert(name.to_string(), Mark::Done);
    }

    for name in deps.keys().cloned().collect::<Vec<_>>() {
        let mut stack = Vec::new();
        visit(&name, &deps, &mut marks, &mut stack, &mut reported, report, &spans);
    }
}

fn check_basket_subject_to(program: &Program, all_names: &HashMap<String, Span>, report: &mut ValidationReport) {
    for stmt in &program.statements {
        if let Statement::Basket(b) = stmt {
            for cond in &b.subject_to {
                if !all_names.contains_key(cond) {
                    report.errors.push(Diagnostic {
                        message: format!("basket '{}' references undefined condition '{cond}'", b.name),
                        span: b.span,
                    });
                }
            }
        }
    }
}

fn check_amendment_targets(
    program: &Program,
    names: &HashMap<(StatementKind, String), Span>,
    report: &mut ValidationReport,
) {
    use crate::ast::AmendmentDirective::*;
    for stmt in &program.statements {
        let Statement::Amendment(a) = stmt else { continue };
        for (i, directive) in a.directives.iter().enumerate() {
            let missing = match directive {
                Delete { kind, name } | Replace { kind, name, .. } | Modify { kind, name, .. } => {
                    !names.contains_key(&(*kind, name.clone()))
                }
                Add(_) => false,
            };
            if missing {
                let name = match directive {
                    Delete { name, .. } | Replace { name, .. } | Modify { name, .. } => name.clone(),
                    Add(_) => String::new(),
                };
                report.errors.push(Diagnostic {
                    message: format!(
                        "amendment {} directive #{i} targets unknown element '{name}'",
                        a.number
                    ),
                    span: a.span,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn flags_undefined_identifier() {
        let program = parse("COVENANT X REQUIRES Debt / EBITDA <= 4.0x TESTED QUARTERLY").unwrap();
        let report = validate(&program);
        assert!(!report.is_ok());
        assert!(report.errors.iter().any(|e| e.message.contains("Debt")));
    }

    #[test]
    fn flags_define_cycle() {
        let program = parse("DEFINE A = B + 1\nDEFINE B = A + 1").unwrap();
        let report = validate(&program);
        assert!(report.errors.iter().any(|e| e.message.contains("cycle")));
    }

    #[test]
    fn flags_duplicate_names() {
        let program = parse("DEFINE A = 1\nDEFINE A = 2").unwrap();
        let report = validate(&program);
        assert!(report.errors.iter().any(|e| e.message.contains("duplicate")));
    }

    #[test]
    fn accepts_well_formed_program() {
        let program = parse(
            "DEFINE EBITDA = 100\nDEFINE Debt = 300\nCOVENANT MaxLeverage REQUIRES Debt / EBITDA <= 4.0x TESTED QUARTERLY",
        )
        .unwrap();
        let report = validate(&program);
        assert!(report.is_ok(), "{:?}", report.errors);
    }
}
