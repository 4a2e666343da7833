//! JSON rendering of a drain report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::report::DrainReport;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    context: &'a str,
    #[serde(flatten)]
    report: &'a DrainReport,
}

/// Render `report` as pretty-printed JSON stamped with `generated_at`.
pub fn render(
    report: &DrainReport,
    context: &str,
    generated_at: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonReport {
        generated_at,
        context,
        report,
    })
}
