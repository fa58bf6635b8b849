//! Reading program source, financial data, and amendment files off disk
//! for the CLI (spec.md §6.1, §6.2).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::ast::{Program, Statement};
use crate::financials::{FinancialHistory, FinancialObservation, Period, PeriodType};

pub fn read_source(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("failed to read '{path}': {e}"))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataFile {
    Flat(HashMap<String, Decimal>),
    MultiPeriod {
        periods: Vec<PeriodEntry>,
        #[serde(default)]
        trailing: HashMap<String, HashMap<String, Decimal>>,
    },
}

#[derive(Debug, Deserialize)]
struct PeriodEntry {
    period: String,
    #[serde(rename = "periodType")]
    period_type: PeriodTypeField,
    #[serde(rename = "periodEnd")]
    period_end: NaiveDate,
    data: HashMap<String, Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PeriodTypeField {
    Month,
    Quarter,
    Year,
}

impl From<PeriodTypeField> for PeriodType {
    fn from(f: PeriodTypeField) -> Self {
        match f {
            PeriodTypeField::Month => PeriodType::Month,
            PeriodTypeField::Quarter => PeriodType::Quarter,
            PeriodTypeField::Year => PeriodType::Year,
        }
    }
}

/// One loaded financial-data file: the period history the interpreter
/// should be seeded with, and the latest period's end date to drive the
/// interpreter's clock unless `--as-of` overrides it.
pub struct LoadedFinancials {
    pub history: FinancialHistory,
    pub latest_date: Option<NaiveDate>,
}

pub fn read_financials(path: &str) -> Result<LoadedFinancials, String> {
    let contents = fs::read_to_string(path).map_err(|e| format!("failed to read '{path}': {e}"))?;
    let parsed: DataFile = serde_json::from_str(&contents).map_err(|e| format!("failed to parse '{path}': {e}"))?;

    let mut history = FinancialHistory::new();
    let latest_date = match parsed {
        DataFile::Flat(observation) => {
            let today = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
            history.record(Period::new(today, PeriodType::Quarter), observation);
            None
        }
        DataFile::MultiPeriod { periods, .. } => {
            let mut latest = None;
            for entry in periods {
                let period = Period::new(entry.period_end, entry.period_type.into());
                latest = Some(latest.map_or(entry.period_end, |d: NaiveDate| d.max(entry.period_end)));
                history.record(period, entry.data);
            }
            latest
        }
    };
    Ok(LoadedFinancials { history, latest_date })
}

/// amendment files hold one or more `AMENDMENT n ...` statements; they're
/// parsed, folded into the running program, and applied in the order the
/// `-a` flags were given
pub fn load_amendments(program: &mut Program, paths: &[String]) -> Result<Vec<i64>, String> {
    let mut numbers = Vec::new();
    for path in paths {
        let source = read_source(path)?;
        let parsed = crate::parser::parse(&source).map_err(|e| format!("failed to parse amendment file '{path}': {e}"))?;
        for stmt in parsed.statements {
            if let Statement::Amendment(a) = &stmt {
                numbers.push(a.number);
            }
            program.statements.push(stmt);
        }
    }
    Ok(numbers)
}

/// resolves `--as-of <period>` against a loaded financial history: an
/// explicit ISO date is used verbatim, otherwise the latest recorded
/// period's end date is used
pub fn resolve_as_of(as_of_flag: Option<&str>, fallback: Option<NaiveDate>) -> Result<NaiveDate, String> {
    if let Some(s) = as_of_flag {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid --as-of date '{s}': {e}"));
    }
    fallback.ok_or_else(|| "no financial data recorded and no --as-of given".to_string())
}

pub fn parse_program_file(path: &str) -> Result<Program, String> {
    let source = read_source(path)?;
    crate::parser::parse(&source).map_err(|e| format!("{}", super::error_format::format_parse_error(path, &source, &e)))
}

#[allow(dead_code)]
pub fn canonicalize(path: &str) -> String {
    Path::new(path).to_string_lossy().to_string()
}
