//! Output formatting for CLI results
//!
//! Table output is for people at a terminal, JSON for scripts driving a
//! test bench, quiet leaves only the exit code.

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use dotlink_core::IdentityOutcome;
use serde::Serialize;

use crate::frames::FrameSummary;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// JSON envelope shared by every command.
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    pub command: &'static str,
    pub data: T,
}

/// One identity's result, flattened for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRow {
    pub device: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_conn_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discarded_frames: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&IdentityOutcome> for OutcomeRow {
    fn from(outcome: &IdentityOutcome) -> Self {
        let device = outcome.device.to_string();
        match &outcome.result {
            Ok(report) => Self {
                device,
                success: true,
                peer_conn_id: Some(report.peer_conn_id.to_string()),
                read_attempts: Some(report.read_attempts),
                discarded_frames: Some(report.discarded_frames),
                elapsed_ms: Some(report.elapsed.as_millis() as u64),
                failed_in: None,
                failure_kind: None,
                error: None,
            },
            Err(failure) => Self {
                device,
                success: false,
                peer_conn_id: None,
                read_attempts: None,
                discarded_frames: None,
                elapsed_ms: None,
                failed_in: Some(failure.stage.to_string()),
                failure_kind: Some(format!("{:?}", failure.kind())),
                error: Some(failure.error.to_string()),
            },
        }
    }
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_outcomes(&self, outcomes: &[IdentityOutcome], command: &'static str) -> String {
        let rows: Vec<OutcomeRow> = outcomes.iter().map(OutcomeRow::from).collect();
        match self.format {
            OutputFormat::Table => outcomes_table(&rows),
            OutputFormat::Json => to_json(&JsonResponse {
                success: rows.iter().all(|row| row.success),
                command,
                data: rows,
            }),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_frame(&self, summary: &FrameSummary) -> String {
        match self.format {
            OutputFormat::Table => frame_table(summary),
            OutputFormat::Json => to_json(&JsonResponse {
                success: true,
                command: "decode",
                data: summary,
            }),
            OutputFormat::Quiet => String::new(),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        format!("{{\"success\": false, \"error\": \"serialization error: {e}\"}}")
    })
}

fn outcomes_table(rows: &[OutcomeRow]) -> String {
    if rows.is_empty() {
        return "No identities run.".to_string();
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Device", "Result", "Peer C_R", "Reads", "Elapsed", "Detail"]);

    for row in rows {
        let result = if row.success { "established" } else { "failed" };
        let detail = match (&row.failed_in, &row.error) {
            (Some(stage), Some(error)) => format!("{stage}: {error}"),
            _ => row
                .discarded_frames
                .filter(|&n| n > 0)
                .map(|n| format!("{n} foreign frames skipped"))
                .unwrap_or_default(),
        };
        table.add_row(vec![
            row.device.clone(),
            result.to_string(),
            row.peer_conn_id.clone().unwrap_or_else(|| "-".to_string()),
            row.read_attempts.map_or_else(|| "-".to_string(), |n| n.to_string()),
            row.elapsed_ms.map_or_else(|| "-".to_string(), |ms| format!("{ms} ms")),
            detail,
        ]);
    }

    table.to_string()
}

fn frame_table(summary: &FrameSummary) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Framed", if summary.framed { "yes" } else { "no" }]);
    table.add_row(vec!["Destination", &summary.destination]);
    table.add_row(vec!["Source", &summary.source]);
    table.add_row(vec!["Swarm", &format!("{:04x}", summary.swarm_id)]);
    table.add_row(vec!["Application", &summary.application]);
    table.add_row(vec!["Version", &summary.version.to_string()]);
    table.add_row(vec!["Payload", &summary.payload_type]);
    if let Some(body) = &summary.body {
        table.add_row(vec!["Body", body]);
    }
    table.to_string()
}
