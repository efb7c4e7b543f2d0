//! HTML and plain-text rendering of advisor results.

use tera::Context;

use crate::error::RenderError;
use crate::legal::dataset::MatterRecord;
use crate::legal::prompt::{ContextLimits, format_table};
use crate::legal::retrieval::Retrieval;
use crate::pipeline::{AttorneyMatters, ConflictReport, Recommendation};

const TABLE_TEMPLATE: &str = r#"<section>
  <h3>{{ title }}</h3>
  <table>
    <thead><tr>{% for header in headers %}<th>{{ header }}</th>{% endfor %}</tr></thead>
    <tbody>
{%- for row in rows %}
      <tr>{% for value in row %}<td>{{ value }}</td>{% endfor %}</tr>
{%- endfor %}
    </tbody>
  </table>
{%- if rows | length == 0 and empty_note %}
  <p>{{ empty_note }}</p>
{%- endif %}
</section>
"#;

const NO_RESULTS: &str = "No results.";

/// A titled table of display strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTable {
    pub title: String,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
    pub empty_note: Option<&'static str>,
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn candidate_table(candidates: &[MatterRecord]) -> ResultTable {
    ResultTable {
        title: "All Potential Lawyers with Recommended Skillset".to_string(),
        headers: vec![
            "Attorney",
            "Practice Area",
            "Matter Description",
            "Work Email",
            "Role",
        ],
        rows: candidates
            .iter()
            .map(|r| {
                vec![
                    text(r.attorney.as_deref()),
                    text(r.practice_area.as_deref()),
                    text(r.matter_description.as_deref()),
                    text(r.work_email.as_deref()),
                    text(r.role_detail.as_deref()),
                ]
            })
            .collect(),
        empty_note: None,
    }
}

fn reasoning_table(lines: &[String]) -> ResultTable {
    ResultTable {
        title: "Recommendation Reasoning".to_string(),
        headers: vec!["Recommendation Reasoning"],
        rows: lines.iter().map(|line| vec![line.clone()]).collect(),
        empty_note: Some(NO_RESULTS),
    }
}

fn attorney_matters_table(attorney: &str, matters: &[MatterRecord]) -> ResultTable {
    ResultTable {
        title: format!("{attorney}'s Matters"),
        headers: vec!["Practice Area", "Matter Description"],
        rows: matters
            .iter()
            .map(|r| {
                vec![
                    text(r.practice_area.as_deref()),
                    text(r.matter_description.as_deref()),
                ]
            })
            .collect(),
        empty_note: None,
    }
}

fn client_matches_table(client_name: &str, matches: &[MatterRecord]) -> ResultTable {
    ResultTable {
        title: format!("Matters mentioning {client_name}"),
        headers: vec![
            "Client Name",
            "Matter",
            "Matter Description",
            "Attorney",
            "Practice Area",
        ],
        rows: matches
            .iter()
            .map(|r| {
                vec![
                    text(r.client_name.as_deref()),
                    text(r.matter.as_deref()),
                    text(r.matter_description.as_deref()),
                    text(r.attorney.as_deref()),
                    text(r.practice_area.as_deref()),
                ]
            })
            .collect(),
        empty_note: Some(NO_RESULTS),
    }
}

fn conflicts_table(report: &ConflictReport) -> ResultTable {
    ResultTable {
        title: "Potential Conflicts".to_string(),
        headers: vec!["Client", "Conflict Type", "Details"],
        rows: report
            .conflicts
            .iter()
            .map(|c| vec![c.client.clone(), c.conflict_type.clone(), c.details.clone()])
            .collect(),
        empty_note: Some(NO_RESULTS),
    }
}

/// Tables shown for a recommendation, in display order.
pub fn recommendation_tables(recommendation: &Recommendation) -> Vec<ResultTable> {
    let mut tables = vec![
        candidate_table(&recommendation.candidates),
        reasoning_table(&recommendation.reasoning),
    ];
    tables.extend(
        recommendation
            .attorney_matters
            .iter()
            .map(|listing| attorney_matters_table(&listing.attorney, &listing.matters)),
    );
    tables
}

/// Candidate table for a retrieval dry run.
pub fn retrieval_tables(retrieval: &Retrieval) -> Vec<ResultTable> {
    let mut table = candidate_table(&retrieval.records);
    if retrieval.used_fallback {
        table.title.push_str(" (no similar matters; default row)");
    }
    vec![table]
}

pub fn attorney_matters_tables(listing: &AttorneyMatters) -> Vec<ResultTable> {
    let mut table = attorney_matters_table(&listing.attorney, &listing.matters);
    table.empty_note = Some(NO_RESULTS);
    vec![table]
}

/// Tables shown for a conflict check. The conflicts table is omitted when no
/// matter mentions the client, since the model was never asked.
pub fn conflict_report_tables(report: &ConflictReport) -> Vec<ResultTable> {
    let mut tables = vec![client_matches_table(&report.client_name, &report.matches)];
    if !report.matches.is_empty() {
        tables.push(conflicts_table(report));
    }
    tables
}

pub fn render_table_html(table: &ResultTable) -> Result<String, RenderError> {
    let mut context = Context::new();
    context.insert("title", &table.title);
    context.insert("headers", &table.headers);
    context.insert("rows", &table.rows);
    context.insert("empty_note", &table.empty_note);

    tera::Tera::one_off(TABLE_TEMPLATE, &context, true).map_err(|err| RenderError {
        template: "result_table",
        reason: err.to_string(),
    })
}

pub fn render_tables_html(tables: &[ResultTable]) -> Result<String, RenderError> {
    let mut out = String::new();
    for table in tables {
        out.push_str(&render_table_html(table)?);
    }
    Ok(out)
}

/// Plain-text rendering for terminals. Nothing is truncated.
pub fn render_tables_text(tables: &[ResultTable]) -> String {
    let unbounded = ContextLimits {
        max_rows: usize::MAX,
        max_field_chars: usize::MAX,
    };
    let mut sections = Vec::with_capacity(tables.len());
    for table in tables {
        let rows: Vec<Vec<Option<&str>>> = table
            .rows
            .iter()
            .map(|row| row.iter().map(|v| Some(v.as_str())).collect())
            .collect();
        let mut section = format!(
            "{}:\n{}",
            table.title,
            format_table(&table.headers, &rows, unbounded)
        );
        if rows.is_empty()
            && let Some(note) = table.empty_note
        {
            section.push('\n');
            section.push_str(note);
        }
        sections.push(section);
    }
    sections.join("\n\n")
}
