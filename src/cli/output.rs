//! Terminal output: the `status` table and one-line claim reports

use serde::Serialize;
use std::fmt::Display;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// How `status` renders its rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Table,
    Json,
}

impl From<bool> for OutputMode {
    /// `--json` flag
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

pub fn render_rows<T: Tabled + Serialize>(rows: &[T], mode: OutputMode) -> anyhow::Result<String> {
    Ok(match mode {
        OutputMode::Json => serde_json::to_string_pretty(rows)?,
        OutputMode::Table if rows.is_empty() => "No reward pools selected".to_string(),
        OutputMode::Table => Table::new(rows).with(Style::rounded()).to_string(),
    })
}

/// Color of a one-line report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Done,
    Notice,
    Problem,
}

impl Tone {
    fn ansi(self) -> &'static str {
        match self {
            Tone::Done => "32",
            Tone::Notice => "33",
            Tone::Problem => "31",
        }
    }
}

/// Problems go to stderr, everything else to stdout.
pub fn report(tone: Tone, message: impl Display) {
    let line = format!("\x1b[{}m{}\x1b[0m", tone.ansi(), message);
    if tone == Tone::Problem {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Tabled, Serialize)]
    struct Row {
        pool: &'static str,
        eligible: bool,
    }

    #[test]
    fn test_json_flag_selects_mode() {
        assert_eq!(OutputMode::from(true), OutputMode::Json);
        assert_eq!(OutputMode::from(false), OutputMode::Table);
    }

    #[test]
    fn test_render_rows() {
        let rows = [Row {
            pool: "arbitrum",
            eligible: true,
        }];
        let table = render_rows(&rows, OutputMode::Table).unwrap();
        assert!(table.contains("pool") && table.contains("arbitrum"));

        let json: serde_json::Value =
            serde_json::from_str(&render_rows(&rows, OutputMode::Json).unwrap()).unwrap();
        assert_eq!(json[0]["pool"], "arbitrum");
        assert_eq!(json[0]["eligible"], true);

        let empty: [Row; 0] = [];
        assert_eq!(
            render_rows(&empty, OutputMode::Table).unwrap(),
            "No reward pools selected"
        );
    }
}
