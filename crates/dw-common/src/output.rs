//! CLI output formats.
//!
//! JSON formats wrap command results in a versioned envelope; `md` and
//! `summary` are for people reading a terminal.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON envelope (default)
    #[default]
    Json,

    /// Compact JSON; list commands print one record per line
    Jsonl,

    /// Markdown tables
    Md,

    /// A single line per command
    Summary,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Md => "md",
            OutputFormat::Summary => "summary",
        }
    }

    /// Machine-readable formats; errors go to stderr as JSON for these.
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Jsonl)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
