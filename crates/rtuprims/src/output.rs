use std::io::{IsTerminal, Write};
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Binary frame or payload bytes, where the command has any.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A single command result: one JSON object, one two-column table, or one
/// `key=value` line.
pub struct Record<'a, T> {
    pub kind: &'static str,
    pub body: &'a T,
    pub fields: Vec<(&'static str, String)>,
    pub raw: &'a [u8],
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    /// Record type, e.g. `crc` or `exchange`, so mixed streams can be split.
    record: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

pub fn print_record<T: Serialize>(record: Record<'_, T>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(record.kind, record.body),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            for (name, value) in record.fields {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = record
                .fields
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
        OutputFormat::Raw => print_raw(record.raw),
    }
}

/// Rows sharing one header. JSON prints one object per line.
pub fn print_rows<T: Serialize>(
    kind: &'static str,
    header: &[&str],
    rows: &[(T, Vec<String>)],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            for (body, _) in rows {
                print_json(kind, body);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(header.to_vec());
            for (_, cells) in rows {
                table.add_row(cells.clone());
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for (_, cells) in rows {
                let line: Vec<String> = header
                    .iter()
                    .zip(cells)
                    .map(|(name, value)| format!("{}={value}", name.to_lowercase()))
                    .collect();
                println!("{}", line.join(" "));
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Lowercase hex with no separators, the form every command accepts back.
pub fn hex_string(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Whole microseconds, saturating.
pub fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn print_json<T: Serialize>(kind: &str, body: &T) {
    let envelope = Envelope {
        record: kind,
        body,
    };
    println!(
        "{}",
        serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}
