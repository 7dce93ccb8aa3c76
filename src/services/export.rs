//! CSV export of a time study

use std::io::Write;

use csv::{QuoteStyle, WriterBuilder};

use crate::{error::TimerError, state::TimeStudy, utils::format_hms};

const BOM: &[u8] = b"\xEF\xBB\xBF";

fn csv_error(e: impl std::fmt::Display) -> TimerError {
    TimerError::Internal(format!("failed to write csv export: {}", e))
}

fn optional_hms(seconds: Option<u64>) -> String {
    seconds.map(format_hms).unwrap_or_else(|| "N/A".to_string())
}

/// Render a study as CSV: a summary section, a blank line, then one row per
/// step in step order.
pub fn study_to_csv(study: &TimeStudy) -> Result<Vec<u8>, TimerError> {
    let mut out = BOM.to_vec();

    out.write_all(b"Time Study Summary\n").map_err(csv_error)?;
    {
        let mut summary = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(&mut out);
        let rows = [
            ("Study ID", study.id.to_string()),
            ("Study Name", study.name.clone()),
            ("Status", study.status.to_string()),
            ("Estimated Total Time (HH:MM:SS)", optional_hms(study.estimated_total_seconds)),
            ("Actual Total Time (HH:MM:SS)", optional_hms(study.actual_total_seconds)),
            ("Number of Steps", study.steps.len().to_string()),
            ("Overall Notes", study.notes.clone().unwrap_or_default()),
        ];
        for (label, value) in rows {
            summary.write_record([label, value.as_str()]).map_err(csv_error)?;
        }
        summary.flush().map_err(csv_error)?;
    }
    out.write_all(b"\n").map_err(csv_error)?;

    if study.steps.is_empty() {
        out.write_all(b"No step data available.\n").map_err(csv_error)?;
        return Ok(out);
    }

    let mut steps = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(&mut out);
    steps
        .write_record([
            "Step Order",
            "Step Name",
            "Step Estimated Time (HH:MM:SS)",
            "Step Actual Time (HH:MM:SS)",
            "Step Notes",
        ])
        .map_err(csv_error)?;
    for step in study.ordered_steps() {
        steps
            .write_record([
                step.order.to_string(),
                step.name.clone(),
                optional_hms(step.estimated_seconds),
                optional_hms(step.actual_seconds),
                step.notes.clone().unwrap_or_default(),
            ])
            .map_err(csv_error)?;
    }
    steps.flush().map_err(csv_error)?;
    drop(steps);

    Ok(out)
}
