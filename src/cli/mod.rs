//! The `proviso` binary's command surface: one function per subcommand
//! in spec.md §6.3, sharing program/financials/amendments loading and
//! plain-text-vs-JSON output.

pub mod args;
pub mod data;
pub mod error_format;
pub mod output;

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;

use crate::ast::Statement;
use crate::financials::PeriodType;
use crate::interpreter::Interpreter;
use args::{Cli, Command, CommonArgs};

pub fn run(cli: Cli) -> i32 {
    let json = cli.json;
    match dispatch(&cli.command, json) {
        Ok(code) => code,
        Err(message) => {
            output::error_line(&message);
            1
        }
    }
}

fn dispatch(command: &Command, json: bool) -> Result<i32, String> {
    match command {
        Command::Parse { file, pretty } => cmd_parse(file, *pretty, json),
        Command::Validate { file, quiet } => cmd_validate(file, *quiet, json),
        Command::Check(common) => cmd_check(common, json),
        Command::Baskets { common, verbose } => cmd_baskets(common, *verbose, json),
        Command::Simulate { common, changes } => cmd_simulate(common, changes, json),
        Command::Status { common, show_cure } => cmd_status(common, *show_cure, json),
        Command::History { common, covenants_only } => cmd_history(common, *covenants_only, json),
        Command::Query { common, action, amount } => cmd_query(common, action, amount.as_deref(), json),
        Command::Amendments(common) => cmd_amendments(common, json),
        Command::Cure { common, covenant, amount } => cmd_cure(common, covenant, amount, json),
        Command::Ledger { common, basket, since, export } => cmd_ledger(common, basket.as_deref(), since.as_deref(), export.as_deref(), json),
        Command::Accumulate { common, basket, description, dry_run } => cmd_accumulate(common, basket.as_deref(), description.as_deref(), *dry_run, json),
        Command::Milestones(common) => cmd_milestones(common, json),
        Command::Reserves(common) => cmd_reserves(common, json),
        Command::Waterfall { common, revenue, waterfall } => cmd_waterfall(common, revenue, waterfall, json),
        Command::Draw { common, checklist } => cmd_draw(common, checklist, json),
        Command::Phase(common) => cmd_phase(common, json),
    }
}

/// Builds an interpreter from a `CommonArgs`'s file/data/amendments/as-of,
/// recording every period in the data file and applying every amendment
/// in the order given (spec.md §4.3.9's "earlier amendments stand" rule
/// means a later failure doesn't unwind a successful prior one).
fn load(common: &CommonArgs) -> Result<Interpreter, String> {
    let mut program = data::parse_program_file(&common.file)?;
    let amendment_numbers = data::load_amendments(&mut program, &common.amendments)?;

    let loaded = match &common.data {
        Some(path) => Some(data::read_financials(path)?),
        None => None,
    };
    let as_of = data::resolve_as_of(common.as_of.as_deref(), loaded.as_ref().and_then(|l| l.latest_date))?;

    let mut interp = Interpreter::new(program, as_of);
    if let Some(loaded) = loaded {
        for (period, observation) in loaded.history.all_ascending() {
            interp.record_period(period, observation.clone());
        }
        interp.set_current_date(as_of);
    }
    for number in amendment_numbers {
        interp.apply_amendment(number).map_err(|e| format!("amendment {number}: {e}"))?;
    }
    Ok(interp)
}

fn cmd_parse(file: &str, pretty: bool, json: bool) -> Result<i32, String> {
    let program = data::parse_program_file(file)?;
    let value = serde_json::to_value(&program).map_err(|e| e.to_string())?;
    if json || pretty {
        output::print_value(&value, true);
    } else {
        output::print_value(&value, false);
    }
    Ok(0)
}

fn cmd_validate(file: &str, quiet: bool, json: bool) -> Result<i32, String> {
    let program = data::parse_program_file(file)?;
    let report = crate::validator::validate(&program);
    if !quiet || !report.is_ok() {
        output::print_value(&report, json);
    }
    Ok(if report.is_ok() { 0 } else { 1 })
}

fn cmd_check(common: &CommonArgs, json: bool) -> Result<i32, String> {
    let mut interp = load(common)?;
    let results = interp.check_all_covenants().map_err(|e| e.to_string())?;
    let all_passed = results.iter().all(|r| r.passed || r.cured);
    if json {
        output::print_value(&results, true);
    } else {
        for r in &results {
            output::status_line(&format!("{} ({} {} {})", r.name, r.metric_value, r.operator.as_str(), r.threshold), r.passed || r.cured);
        }
    }
    Ok(if all_passed { 0 } else { 1 })
}

fn cmd_baskets(common: &CommonArgs, verbose: bool, json: bool) -> Result<i32, String> {
    let interp = load(common)?;
    let names: Vec<String> = interp
        .program()
        .statements
        .iter()
        .filter_map(|s| match s {
            Statement::Basket(b) => Some(b.name.clone()),
            _ => None,
        })
        .collect();
    let mut rows = Vec::new();
    for name in &names {
        let available = interp.basket_available(name).map_err(|e| e.to_string())?;
        let drawn = interp.state().baskets.drawn(name);
        if verbose {
            rows.push(json!({"name": name, "available": available, "drawn": drawn}));
        } else {
            rows.push(json!({"name": name, "available": available}));
        }
    }
    output::print_value(&rows, json);
    Ok(0)
}

fn cmd_simulate(common: &CommonArgs, changes_json: &str, json: bool) -> Result<i32, String> {
    let interp = load(common)?;
    let changes: HashMap<String, Decimal> = serde_json::from_str(changes_json).map_err(|e| format!("invalid --changes JSON: {e}"))?;
    let result = interp.simulate(&changes).map_err(|e| e.to_string())?;
    let all_passed = result.covenants.iter().all(|r| r.passed || r.cured);
    output::print_value(&result, json);
    Ok(if all_passed { 0 } else { 1 })
}

fn cmd_status(common: &CommonArgs, show_cure: bool, json: bool) -> Result<i32, String> {
    let mut interp = load(common)?;
    let covenants = interp.check_all_covenants().map_err(|e| e.to_string())?;
    let basket_names: Vec<String> = interp
        .program()
        .statements
        .iter()
        .filter_map(|s| match s {
            Statement::Basket(b) => Some(b.name.clone()),
            _ => None,
        })
        .collect();
    let mut baskets = Vec::new();
    for name in &basket_names {
        let available = interp.basket_available(name).map_err(|e| e.to_string())?;
        baskets.push(json!({"name": name, "available": available}));
    }
    let phase = interp.state().phases.current().map(String::from);
    let all_passed = covenants.iter().all(|r| r.passed || r.cured);
    let mut report = json!({
        "covenants": covenants,
        "baskets": baskets,
        "phase": phase,
        "overall_compliant": all_passed,
    });
    if show_cure {
        report["cures_available"] = json!(covenants
            .iter()
            .filter(|r| !r.passed)
            .map(|r| json!({"name": r.name, "cure_available": r.cure_available, "shortfall": r.shortfall}))
            .collect::<Vec<_>>());
    }
    output::print_value(&report, json);
    Ok(if all_passed { 0 } else { 1 })
}

fn cmd_history(common: &CommonArgs, covenants_only: bool, json: bool) -> Result<i32, String> {
    let interp = load(common)?;
    let history = interp.compliance_history().map_err(|e| e.to_string())?;
    let all_compliant = history.iter().all(|p| p.overall_compliant);
    if covenants_only {
        let flattened: Vec<_> = history.iter().flat_map(|p| p.covenants.clone()).collect();
        output::print_value(&flattened, json);
    } else {
        output::print_value(&history, json);
    }
    Ok(if all_compliant { 0 } else { 1 })
}

fn cmd_query(common: &CommonArgs, action: &str, amount: Option<&str>, json: bool) -> Result<i32, String> {
    let interp = load(common)?;
    let amount_dec: Option<Decimal> = amount.map(|a| a.parse()).transpose().map_err(|_| format!("invalid --amount '{amount:?}'"))?;
    let available = interp.basket_available(action).map_err(|e| e.to_string())?;
    let permitted = amount_dec.map(|a| a <= available).unwrap_or(available > Decimal::ZERO);
    let result = json!({"action": action, "available": available, "requested": amount_dec, "permitted": permitted});
    output::print_value(&result, json);
    Ok(if permitted { 0 } else { 1 })
}

fn cmd_amendments(common: &CommonArgs, json: bool) -> Result<i32, String> {
    let interp = load(common)?;
    output::print_value(interp.state().amendments.applied(), json);
    Ok(0)
}

fn cmd_cure(common: &CommonArgs, covenant: &str, amount: &str, json: bool) -> Result<i32, String> {
    let requested: Decimal = amount.parse().map_err(|_| format!("invalid cure amount '{amount}'"))?;
    let mut interp = load(common)?;
    let application = interp.apply_cure(covenant, requested).map_err(|e| e.to_string())?;
    let report = json!({"covenant": covenant, "requested_amount": requested, "result": application});
    output::print_value(&report, json);
    Ok(if application.success { 0 } else { 1 })
}

fn cmd_ledger(common: &CommonArgs, basket: Option<&str>, since: Option<&str>, export: Option<&str>, json: bool) -> Result<i32, String> {
    let interp = load(common)?;
    let names: Vec<String> = match basket {
        Some(name) => vec![name.to_string()],
        None => interp
            .program()
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Basket(b) => Some(b.name.clone()),
                _ => None,
            })
            .collect(),
    };
    let since_date: Option<chrono::NaiveDate> = since.map(|s| s.parse()).transpose().map_err(|_| format!("invalid --since date '{since:?}'"))?;
    let summary: Vec<_> = names
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "drawn": interp.state().baskets.drawn(name),
                "accumulated": interp.state().baskets.accumulated(name),
            })
        })
        .collect();
    let name_set: std::collections::HashSet<&str> = names.iter().map(String::as_str).collect();
    let entries: Vec<_> = interp
        .state()
        .baskets
        .entries()
        .iter()
        .filter(|e| name_set.contains(e.basket.as_str()))
        .filter(|e| since_date.map(|s| e.timestamp >= s).unwrap_or(true))
        .collect();
    if let Some(path) = export {
        let body = serde_json::to_string_pretty(&entries).map_err(|e| e.to_string())?;
        std::fs::write(path, body).map_err(|e| format!("failed to write '{path}': {e}"))?;
    }
    let report = json!({"summary": summary, "entries": entries});
    output::print_value(&report, json);
    Ok(0)
}

fn cmd_accumulate(common: &CommonArgs, basket: Option<&str>, description: Option<&str>, dry_run: bool, json: bool) -> Result<i32, String> {
    let mut interp = load(common)?;
    let names: Vec<String> = match basket {
        Some(name) => vec![name.to_string()],
        None => interp
            .program()
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Basket(b) if b.builds_from.is_some() => Some(b.name.clone()),
                _ => None,
            })
            .collect(),
    };
    let mut rows = Vec::new();
    for name in &names {
        if dry_run {
            let amount = interp.basket_available(name).map_err(|e| e.to_string())?;
            rows.push(json!({"basket": name, "description": description, "dry_run": true, "current_available": amount}));
            continue;
        }
        let amount = interp
            .accumulate_basket_from_builds_from_with_description(name, description.map(str::to_string))
            .map_err(|e| e.to_string())?;
        rows.push(json!({"basket": name, "description": description, "accumulated": amount}));
    }
    output::print_value(&rows, json);
    Ok(0)
}

fn cmd_milestones(common: &CommonArgs, json: bool) -> Result<i32, String> {
    let interp = load(common)?;
    let rows: Vec<_> = interp
        .program()
        .statements
        .iter()
        .filter_map(|s| match s {
            Statement::Milestone(m) => Some(json!({
                "name": m.name,
                "target": m.target,
                "longstop": m.longstop,
                "achieved": interp.state().milestones.is_achieved(&m.name),
                "missed": interp.state().milestones.is_missed(&m.name),
            })),
            _ => None,
        })
        .collect();
    output::print_value(&rows, json);
    Ok(0)
}

fn cmd_reserves(common: &CommonArgs, json: bool) -> Result<i32, String> {
    let interp = load(common)?;
    let rows: Vec<_> = interp
        .program()
        .statements
        .iter()
        .filter_map(|s| match s {
            Statement::Reserve(r) => Some(json!({
                "name": r.name,
                "balance": interp.state().reserve_balance(&r.name),
            })),
            _ => None,
        })
        .collect();
    output::print_value(&rows, json);
    Ok(0)
}

fn cmd_waterfall(common: &CommonArgs, revenue: &str, waterfall: &str, json: bool) -> Result<i32, String> {
    let available: Decimal = revenue.parse().map_err(|_| format!("invalid --revenue '{revenue}'"))?;
    let mut interp = load(common)?;
    let result = interp.run_waterfall(waterfall, available).map_err(|e| e.to_string())?;
    let fully_paid = result.residual >= Decimal::ZERO && result.tiers.iter().all(|t| t.shortfall == Decimal::ZERO);
    output::print_value(&result, json);
    Ok(if fully_paid { 0 } else { 1 })
}

fn cmd_draw(common: &CommonArgs, checklist: &str, json: bool) -> Result<i32, String> {
    let interp = load(common)?;
    let stmt = interp
        .program()
        .statements
        .iter()
        .find_map(|s| match s {
            Statement::ConditionsPrecedent(c) if c.name == checklist => Some(c.clone()),
            _ => None,
        })
        .ok_or_else(|| format!("no CONDITIONS_PRECEDENT named '{checklist}'"))?;
    let outstanding: Vec<&str> = interp.state().conditions_precedent.outstanding(&stmt);
    let all_satisfied = interp.state().conditions_precedent.all_satisfied(&stmt);
    let report = json!({"checklist": checklist, "outstanding": outstanding, "all_satisfied": all_satisfied});
    output::print_value(&report, json);
    Ok(if all_satisfied { 0 } else { 1 })
}

fn cmd_phase(common: &CommonArgs, json: bool) -> Result<i32, String> {
    let interp = load(common)?;
    let phase = interp.state().phases.current();
    output::print_value(&json!({"phase": phase}), json);
    Ok(0)
}

/// parses a period label as either an ISO date or an already-recorded
/// period's end date label; used by commands that accept `--as-of` in
/// period form rather than strict ISO (spec.md §6.2's free-form period
/// strings)
#[allow(dead_code)]
fn parse_period_label(label: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(label, "%Y-%m-%d").map_err(|_| format!("cannot interpret '{label}' as a date"))
}

#[allow(dead_code)]
fn period_kind_label(kind: PeriodType) -> &'static str {
    match kind {
        PeriodType::Month => "month",
        PeriodType::Quarter => "quarter",
        PeriodType::Year => "year",
    }
}
