use crate::models::{BatchOutcome, BatchReport, FileOutcome};

/// Convert a linear volume to dB.
fn volume_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        -f64::INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Display name of a source URI: its last path segment.
pub fn source_name(uri: &str) -> &str {
    uri.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(uri)
}

fn format_row(file: &FileOutcome) -> String {
    match (file.gain, file.peak, file.volume) {
        (Some(gain), Some(peak), Some(volume)) => format!(
            "{:>+8.2} dB {:>8.4} {:>8.4} {:>+8.2} dB  {} ({})\n",
            gain,
            peak,
            volume,
            volume_db(volume),
            source_name(&file.source),
            file.entries.join(", "),
        ),
        _ => format!(
            "{:>11} {:>8} {:>8} {:>11}  {} ({})\n",
            "failed",
            "--",
            "--",
            "--",
            source_name(&file.source),
            file.entries.join(", "),
        ),
    }
}

/// Format a batch report as a table, one row per analyzed file.
pub fn format_table(report: &BatchReport) -> String {
    let separator = "\u{2500}".repeat(64);
    let mut output = String::new();

    // Header
    output.push_str(&format!(
        "{:>11} {:>8} {:>8} {:>11}  {}\n",
        "Gain", "Peak", "Volume", "Volume", "File (entries)"
    ));
    output.push_str(&separator);
    output.push('\n');

    let mut files: Vec<&FileOutcome> = report.files.iter().collect();
    files.sort_by(|a, b| a.source.cmp(&b.source));
    for file in files {
        output.push_str(&format_row(file));
    }

    output.push_str(&separator);
    output.push('\n');

    // Footer
    output.push_str(&format!(
        "Files analyzed:   {}\n\
         Failed:           {}\n\
         Entries adjusted: {}",
        report.files.len(),
        report.failed_count(),
        report.adjusted_entries,
    ));

    output
}

/// Format a batch report as pretty-printed JSON.
pub fn format_json(report: &BatchReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

/// One-line summary of how a batch ended.
pub fn format_summary(outcome: &BatchOutcome) -> String {
    let report = outcome.report();
    match outcome {
        BatchOutcome::Completed(_) => format!(
            "Done: {} adjusted, {} failed (out of {} files), {} entries updated",
            report.succeeded_count(),
            report.failed_count(),
            report.files.len(),
            report.adjusted_entries,
        ),
        BatchOutcome::Aborted(_) => "Stopped: no volumes were changed".to_string(),
    }
}
