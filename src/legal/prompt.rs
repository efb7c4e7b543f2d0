//! Prompt construction for the recommendation and conflict-check workflows.

use crate::config::RetrievalConfig;
use crate::legal::dataset::{
    COL_ATTORNEY, COL_CLIENT_NAME, COL_MATTER, COL_MATTER_DESCRIPTION, COL_PRACTICE_AREA,
    COL_WORK_EMAIL, MatterRecord,
};
use crate::llm::ChatMessage;

pub const RECOMMENDATION_SYSTEM_PROMPT: &str = "You are the CEO of a prestigious law firm. \
    You know every attorney's practice and track record, and you match prospective work to the \
    lawyer best placed to handle it.";

pub const CONFLICT_SYSTEM_PROMPT: &str = "You are the conflicts counsel of a law firm. \
    You review the firm's existing matters and identify every relationship that could create a \
    conflict of interest with a prospective client.";

const RECOMMENDATION_COLUMNS: &[&str] = &[
    COL_ATTORNEY,
    COL_PRACTICE_AREA,
    COL_MATTER_DESCRIPTION,
    COL_WORK_EMAIL,
    "Role",
];

const CONFLICT_COLUMNS: &[&str] = &[
    COL_CLIENT_NAME,
    COL_MATTER,
    COL_MATTER_DESCRIPTION,
    COL_ATTORNEY,
    COL_PRACTICE_AREA,
];

/// Upper bounds on the context table embedded in a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub max_rows: usize,
    pub max_field_chars: usize,
}

impl From<&RetrievalConfig> for ContextLimits {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            max_rows: config.max_context_rows,
            max_field_chars: config.max_field_chars,
        }
    }
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

fn cell(value: Option<&str>, max_chars: usize) -> String {
    let flat = value
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn render_line<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = values
        .zip(widths)
        .map(|(value, &width)| format!("{value:<width$}"))
        .collect();
    padded.join("  ").trim_end().to_string()
}

/// Render rows as a left-aligned plain-text table with a header line.
///
/// At most `limits.max_rows` rows are written; a trailing note says how many
/// were left out.
pub fn format_table(
    headers: &[&str],
    rows: &[Vec<Option<&str>>],
    limits: ContextLimits,
) -> String {
    let shown = rows.len().min(limits.max_rows);
    let cells: Vec<Vec<String>> = rows[..shown]
        .iter()
        .map(|row| {
            row.iter()
                .map(|value| cell(*value, limits.max_field_chars))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(shown + 2);
    lines.push(render_line(headers.iter().copied(), &widths));
    for row in &cells {
        lines.push(render_line(row.iter().map(String::as_str), &widths));
    }
    if rows.len() > shown {
        lines.push(format!("({} more rows omitted)", rows.len() - shown));
    }
    lines.join("\n")
}

fn recommendation_row(record: &MatterRecord) -> Vec<Option<&str>> {
    vec![
        record.attorney.as_deref(),
        record.practice_area.as_deref(),
        record.matter_description.as_deref(),
        record.work_email.as_deref(),
        record.role_detail.as_deref(),
    ]
}

fn conflict_row(record: &MatterRecord) -> Vec<Option<&str>> {
    vec![
        record.client_name.as_deref(),
        record.matter.as_deref(),
        record.matter_description.as_deref(),
        record.attorney.as_deref(),
        record.practice_area.as_deref(),
    ]
}

/// Candidate table used as recommendation context.
pub fn recommendation_context(records: &[MatterRecord], limits: ContextLimits) -> String {
    let rows: Vec<_> = records.iter().map(recommendation_row).collect();
    format_table(RECOMMENDATION_COLUMNS, &rows, limits)
}

/// Two-message payload asking the model to recommend counsel.
pub fn build_recommendation_messages(
    records: &[MatterRecord],
    limits: ContextLimits,
) -> Vec<ChatMessage> {
    let context = recommendation_context(records, limits);
    vec![
        ChatMessage::system(RECOMMENDATION_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Based on the following information, please make a recommendation:\n\n{context}\n\nRecommendation:"
        )),
    ]
}

/// Two-message payload asking the model for structured conflict findings.
pub fn build_conflict_messages(
    client_name: &str,
    records: &[&MatterRecord],
    limits: ContextLimits,
) -> Vec<ChatMessage> {
    let rows: Vec<_> = records.iter().map(|r| conflict_row(r)).collect();
    let context = format_table(CONFLICT_COLUMNS, &rows, limits);
    vec![
        ChatMessage::system(CONFLICT_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Prospective client: {client}\n\n\
             Existing matters that mention this client:\n\n{context}\n\n\
             List each potential conflict using exactly these three lines per conflict:\n\
             Client: <client name>\n\
             Conflict Type: <Prior Work | Potential Opponent | Business Owner>\n\
             Details: <one-line explanation>",
            client = client_name.trim(),
        )),
    ]
}
