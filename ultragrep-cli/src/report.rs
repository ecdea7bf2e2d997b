//! Human-facing status lines. They go to stderr; stdout only carries log data.

use colored::*;
use ultragrep_engine::{LogFile, SearchStats};
use ultragrep_index::{BuildReport, Compression, IndexStatus};

pub fn print_build_report(report: &BuildReport) {
    let resumed = match report.resumed_from {
        Some(offset) => format!(" (resumed at byte {offset})"),
        None => String::new(),
    };
    eprintln!(
        "{} {}{}",
        "✔ index built:".green().bold(),
        report.log.display(),
        resumed
    );
    eprintln!("  Requests: {}", report.requests);
    eprintln!("  Timestamp entries: {}", report.timestamp_entries);
    match report.compression {
        Compression::Gzip => eprintln!("  Gzip access points: {}", report.access_points),
        Compression::Bzip2 => eprintln!("  Input: bzip2, read from the start on every query"),
        Compression::Plain => {}
    }
    if !report.diagnostics.is_clean() {
        eprintln!(
            "  {} {} invalid UTF-8, {} unparsable time, {} malformed payload",
            "Skipped lines:".yellow(),
            report.diagnostics.invalid_utf8,
            report.diagnostics.unparsable_time,
            report.diagnostics.malformed_payload
        );
    }
}

pub fn print_up_to_date(log: &std::path::Path) {
    eprintln!("{} {}", "✔ index fresh:".green(), log.display());
}

fn status_label(status: &IndexStatus) -> ColoredString {
    match status {
        IndexStatus::Fresh => status.to_string().green(),
        IndexStatus::Missing => status.to_string().red(),
        IndexStatus::Unfinished | IndexStatus::Stale { .. } => status.to_string().yellow(),
    }
}

pub fn print_status(status: &IndexStatus) {
    eprintln!("  Status: {}", status_label(status));
}

pub fn print_plan(groups: &[Vec<LogFile>]) {
    eprintln!("{}", "Searching:".bold());
    for group in groups {
        let names: Vec<String> = group
            .iter()
            .map(|file| file.path.display().to_string())
            .collect();
        eprintln!("  {}", names.join(" "));
    }
}

pub fn print_search_summary(stats: &SearchStats) {
    let matched: u64 = stats.per_file.iter().map(|(_, file)| file.matched).sum();
    let scanned: u64 = stats.per_file.iter().map(|(_, file)| file.requests).sum();
    eprintln!(
        "{} {} matching of {} scanned requests in {} files",
        "✔".green().bold(),
        matched,
        scanned,
        stats.files
    );
}
