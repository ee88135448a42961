use colored::Colorize;
use rabbitdesk_client::{ResourceKind, TargetStatus};
use serde::Serialize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;
use time::format_description::well_known::Rfc3339;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => print_error(&format!("Cannot render output: {e}")),
    }
}

/// Prints a listing of `kind`, as JSON or as a table with the columns that
/// matter for that kind.
pub fn print_resources(kind: ResourceKind, value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => match resource_table(kind, value) {
            Some(table) => println!("{table}"),
            None => println!("No {kind} found."),
        },
    }
}

pub fn print_statuses(statuses: &[TargetStatus], format: OutputFormat) {
    if matches!(format, OutputFormat::Json) {
        print_json(&statuses);
        return;
    }
    if statuses.is_empty() {
        println!("No clusters found.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Cluster", "Status", "Response", "Checked", "Error"]);
    for status in statuses {
        builder.push_record([
            status.target_id.clone(),
            if status.is_available { "up" } else { "down" }.to_string(),
            status
                .response_time_ms
                .map(|ms| format!("{ms} ms"))
                .unwrap_or_else(|| "-".to_string()),
            status
                .last_checked
                .format(&Rfc3339)
                .unwrap_or_else(|_| "-".to_string()),
            status.error.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));

    let down = statuses.iter().filter(|s| !s.is_available).count();
    if down > 0 {
        println!("{} {down} of {} unavailable", "✗".red(), statuses.len());
    } else {
        println!("{} all {} available", "✓".green(), statuses.len());
    }
}

fn columns(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Overview => &[],
        ResourceKind::Queues => &["name", "vhost", "type", "state", "messages", "consumers"],
        ResourceKind::Exchanges => &["name", "vhost", "type", "durable", "auto_delete"],
        ResourceKind::Bindings => &[
            "source",
            "destination",
            "destination_type",
            "routing_key",
            "vhost",
        ],
        ResourceKind::Connections => &["name", "user", "vhost", "state", "channels"],
        ResourceKind::Channels => &["name", "user", "vhost", "state", "consumer_count"],
    }
}

/// Renders a listing as a table. Objects (the overview) become key/value
/// rows of their scalar fields. Returns `None` for an empty listing.
fn resource_table(kind: ResourceKind, value: &Value) -> Option<String> {
    let mut builder = Builder::default();
    match value {
        Value::Array(items) if items.is_empty() => return None,
        Value::Array(items) => {
            let mut cols: Vec<String> = columns(kind).iter().map(|c| c.to_string()).collect();
            if cols.is_empty() {
                cols = items
                    .first()
                    .and_then(Value::as_object)
                    .map(|first| first.keys().cloned().collect())
                    .unwrap_or_else(|| vec!["value".to_string()]);
            }
            builder.push_record(cols.clone());
            for item in items {
                builder.push_record(cols.iter().map(|c| match item {
                    Value::Object(_) => cell(item.get(c)),
                    scalar => cell(Some(scalar)),
                }));
            }
        }
        Value::Object(fields) => {
            builder.push_record(["Field", "Value"]);
            for (key, field) in fields {
                if !field.is_object() && !field.is_array() {
                    builder.push_record([key.clone(), cell(Some(field))]);
                }
            }
        }
        other => builder.push_record([cell(Some(other))]),
    }
    Some(builder.build().with(Style::rounded()).to_string())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) if s.is_empty() => "\"\"".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
