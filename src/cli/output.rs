//! Plain-text (box-drawing table) vs `--json` output, per spec.md §6.3.

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::Table;

pub fn print_value<T: Serialize>(value: &T, json: bool) {
    let v = serde_json::to_value(value).unwrap_or(Value::Null);
    if json {
        println!("{}", serde_json::to_string_pretty(&v).unwrap_or_default());
    } else {
        print_table(&v);
    }
}

fn print_table(value: &Value) {
    match value {
        Value::Object(map) => print_object_table(map),
        Value::Array(arr) => print_array_table(arr),
        other => println!("{other}"),
    }
}

fn print_object_table(map: &serde_json::Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(none)");
        return;
    }
    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);
        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers.iter().map(|h| map.get(h).map(format_value).unwrap_or_default()).collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(a) => a.iter().map(format_value).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

pub fn status_line(label: &str, passed: bool) {
    if passed {
        println!("{} {}", label, "PASS".green().bold());
    } else {
        println!("{} {}", label, "FAIL".red().bold());
    }
}

pub fn error_line(message: &str) {
    eprintln!("{}: {}", "error".red().bold(), message);
}

pub fn warn_line(message: &str) {
    eprintln!("{}: {}", "warning".yellow().bold(), message);
}
