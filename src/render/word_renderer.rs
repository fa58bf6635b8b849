//! Renders a [`Program`]'s statements as prose paragraphs, assembled into
//! a document with article/section routing (spec.md §4.6).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ast::{
    BasketStmt, CompareOp, ConditionStmt, ConditionsPrecedentStmt, CovenantStmt, DefineStmt, Expr, MilestoneStmt,
    PhaseStmt, Program, ReserveStmt, Statement, WaterfallStmt,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderContext {
    pub section_prefix: String,
    pub article_number: String,
    pub subsection_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub element_kind: String,
    pub element_name: String,
    pub section_reference: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedDocument {
    pub full_text: String,
    pub sections: Vec<Section>,
}

fn format_currency(d: Decimal) -> String {
    let billion = Decimal::from(1_000_000_000);
    let million = Decimal::from(1_000_000);
    let abs = d.abs();
    if abs >= billion {
        format!("${:.1} billion", d / billion)
    } else if abs >= million {
        format!("${:.1} million", d / million)
    } else {
        format!("${}", group_digits(d))
    }
}

fn group_digits(d: Decimal) -> String {
    let s = d.round_dp(2).normalize().to_string();
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s.as_str(), ""));
    let negative = int_part.starts_with('-');
    let digits = int_part.trim_start_matches('-');
    let mut grouped = String::new();
    for (i, ch) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let grouped: String = grouped.chars().rev().collect();
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

fn format_ratio(d: Decimal) -> String {
    format!("{:.2} to 1.00", d)
}

fn format_percentage(d: Decimal) -> String {
    format!("{}%", d.normalize())
}

/// renders a numeric expression using the literal suffix it was written
/// with, where that can be determined; otherwise falls back to its
/// canonical textual form (spec.md's currency/ratio/percentage display
/// helpers apply only to plain numeric literals, not compound exprs)
fn display_value(expr: &Expr) -> String {
    match expr {
        Expr::Currency(d, _) => format_currency(*d),
        Expr::Ratio(d, _) => format_ratio(*d),
        Expr::Percentage(d, _) => format_percentage(*d),
        Expr::Number(d, _) => d.normalize().to_string(),
        other => other.canonical(),
    }
}

fn operator_display(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Le => "exceed",
        CompareOp::Lt => "meet or exceed",
        CompareOp::Ge => "be less than",
        CompareOp::Gt => "be at or below",
        CompareOp::Eq => "differ from",
        CompareOp::Ne => "equal",
    }
}

fn render_covenant(c: &CovenantStmt, ctx: &RenderContext) -> String {
    let mut text = format!(
        "({}) {}. The Borrower shall not permit the {} as of the last day of any {} to {} {} to 1.00.",
        ctx.subsection_label,
        c.name,
        c.metric.canonical(),
        c.tested.as_str().to_ascii_lowercase().replace('_', "-"),
        operator_display(c.operator),
        display_value(&c.threshold),
    );
    if let Some(cure) = &c.cure {
        text.push_str(&format!(
            " The Borrower may cure a breach of this covenant by {}, not more than {} times in any {} rolling period, up to {}.",
            cure.mechanism,
            cure.max_uses,
            cure.window_count,
            display_value(&cure.max_amount),
        ));
    }
    text
}

fn render_basket(b: &BasketStmt, ctx: &RenderContext) -> String {
    let capacity = b
        .capacity
        .as_ref()
        .map(display_value)
        .unwrap_or_else(|| "an amount to be determined by the applicable formula".to_string());
    let mut text = format!(
        "({}) {}; investments made pursuant to this clause not to exceed {}.",
        ctx.subsection_label, b.name, capacity
    );
    if let Some(floor) = &b.floor {
        text.push_str(&format!(" In no event shall the capacity of this basket be less than {}.", display_value(floor)));
    }
    if !b.subject_to.is_empty() {
        text.push_str(&format!(" Availability of this basket is subject to {}.", b.subject_to.join(", ")));
    }
    text
}

fn render_define(d: &DefineStmt, _ctx: &RenderContext) -> String {
    let mut text = format!("\"{}\" means {}.", d.name, d.expr.canonical());
    if !d.excluding.is_empty() {
        text.push_str(&format!(" excluding {}", d.excluding.join(", ")));
    }
    if let Some(cap) = &d.capped_at {
        text.push_str(&format!(" provided that such amount shall not exceed {}", display_value(cap)));
    }
    text
}

fn render_condition(c: &ConditionStmt, ctx: &RenderContext) -> String {
    format!("({}) {} shall be deemed to occur upon satisfaction of: {}.", ctx.subsection_label, c.name, c.expr.canonical())
}

fn render_phase(p: &PhaseStmt, ctx: &RenderContext) -> String {
    let mut text = format!("({}) {} Phase.", ctx.subsection_label, p.name);
    if let Some(from) = &p.from {
        text.push_str(&format!(" This phase commences upon {}.", from));
    }
    if let Some(until) = &p.until {
        text.push_str(&format!(" This phase continues until {}.", until));
    }
    if !p.covenants_suspended.is_empty() {
        text.push_str(&format!(" The following covenants are suspended during this phase: {}.", p.covenants_suspended.join(", ")));
    }
    if !p.covenants_active.is_empty() {
        text.push_str(&format!(" The following covenants remain active during this phase: {}.", p.covenants_active.join(", ")));
    }
    text
}

fn render_milestone(m: &MilestoneStmt, ctx: &RenderContext) -> String {
    format!(
        "({}) {}. Target date: {}. Longstop date: {}.",
        ctx.subsection_label, m.name, m.target, m.longstop
    )
}

fn render_reserve(r: &ReserveStmt, ctx: &RenderContext) -> String {
    let mut text = format!("({}) {} Reserve. Target balance: {}.", ctx.subsection_label, r.name, display_value(&r.target));
    if let Some(min) = &r.minimum {
        text.push_str(&format!(" Minimum balance: {}.", display_value(min)));
    }
    if !r.funded_by.is_empty() {
        text.push_str(&format!(" Funded by {}.", r.funded_by.join(", ")));
    }
    text
}

fn render_waterfall(w: &WaterfallStmt, ctx: &RenderContext) -> String {
    let mut text = format!("({}) {} Waterfall. Available funds shall be applied in the following order of priority:", ctx.subsection_label, w.name);
    let mut tiers: Vec<_> = w.tiers.iter().collect();
    tiers.sort_by_key(|t| t.priority);
    for tier in tiers {
        text.push_str(&format!(" ({}) {}, in an amount equal to {};", tier.priority, tier.label, display_value(&tier.pay)));
    }
    text
}

fn render_conditions_precedent(cp: &ConditionsPrecedentStmt, ctx: &RenderContext) -> String {
    let mut text = format!("({}) {} Conditions Precedent.", ctx.subsection_label, cp.name);
    for item in &cp.items {
        text.push_str(&format!(" ({}) {};", item.name, item.description.clone().unwrap_or_default()));
    }
    text
}

fn article_for(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::Define(_) => "Article 1",
        Statement::Phase(_) | Statement::Milestone(_) | Statement::TechnicalMilestone(_) | Statement::Reserve(_) | Statement::Waterfall(_) => "Article 6",
        Statement::ConditionsPrecedent(_) => "Article 4",
        Statement::Basket(_) => "Article 7.02",
        Statement::Covenant(_) => "Article 7.11",
        Statement::Event(_) | Statement::Condition(_) => "Article 8",
        _ => "Schedule",
    }
}

/// Renders every statement that has a prose template, assembling a
/// document ordered by the article each statement kind routes to.
pub fn render(program: &Program, title: &str) -> RenderedDocument {
    let mut sections = Vec::new();
    for (i, stmt) in program.statements.iter().enumerate() {
        let Some(name) = stmt.name() else { continue };
        let ctx = RenderContext {
            section_prefix: article_for(stmt).to_string(),
            article_number: article_for(stmt).to_string(),
            subsection_label: format!("{}", i + 1),
        };
        let text = match stmt {
            Statement::Covenant(c) => render_covenant(c, &ctx),
            Statement::Basket(b) => render_basket(b, &ctx),
            Statement::Define(d) => render_define(d, &ctx),
            Statement::Condition(c) => render_condition(c, &ctx),
            Statement::Phase(p) => render_phase(p, &ctx),
            Statement::Milestone(m) => render_milestone(m, &ctx),
            Statement::Reserve(r) => render_reserve(r, &ctx),
            Statement::Waterfall(w) => render_waterfall(w, &ctx),
            Statement::ConditionsPrecedent(cp) => render_conditions_precedent(cp, &ctx),
            _ => continue,
        };
        sections.push(Section {
            element_kind: format!("{:?}", stmt.kind().unwrap()),
            element_name: name.to_string(),
            section_reference: ctx.article_number.clone(),
            text,
        });
    }

    let mut by_article: std::collections::BTreeMap<&str, Vec<&Section>> = std::collections::BTreeMap::new();
    for s in &sections {
        by_article.entry(&s.section_reference).or_default().push(s);
    }
    let mut full_text = format!("{title}\n\n");
    for (article, secs) in by_article {
        full_text.push_str(&format!("{article}\n"));
        for s in secs {
            full_text.push_str(&s.text);
            full_text.push('\n');
        }
        full_text.push('\n');
    }

    RenderedDocument { full_text, sections }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn currency_literals_reappear_unchanged_in_rendered_prose() {
        let program = parse("BASKET GeneralRP CAPACITY $5,000,000\n").unwrap();
        let doc = render(&program, "Credit Agreement");
        assert!(doc.full_text.contains("$5.0 million"));
    }

    #[test]
    fn covenant_ratio_renders_with_two_decimal_places() {
        let program = parse("COVENANT MaxLeverage REQUIRES Debt / EBITDA <= 4.0x TESTED QUARTERLY\n").unwrap();
        let doc = render(&program, "Credit Agreement");
        assert!(doc.full_text.contains("4.00 to 1.00"));
    }

    #[test]
    fn sections_are_grouped_by_routed_article() {
        let program = parse(
            "DEFINE EBITDA AS NetIncome + Interest\n\
             COVENANT MaxLeverage REQUIRES Debt / EBITDA <= 4.0x TESTED QUARTERLY\n",
        )
        .unwrap();
        let doc = render(&program, "Credit Agreement");
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].section_reference, "Article 1");
    }
}
