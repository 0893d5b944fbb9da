//! Terminal feedback for long-running indexing commands.
//!
//! A spinner tracks the current orchestrator phase while a run is in
//! flight; --quiet suppresses all of it by returning `None` up front so
//! call sites never need their own quiet checks.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

enum FinishStatus {
    Ok,
    Warn,
    Err,
}

impl FinishStatus {
    fn glyph(&self) -> &'static str {
        match self {
            FinishStatus::Ok => "✓",
            FinishStatus::Warn => "!",
            FinishStatus::Err => "✗",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            FinishStatus::Ok => "green",
            FinishStatus::Warn => "yellow",
            FinishStatus::Err => "red",
        }
    }
}

/// Starts a spinner for a run that's about to begin. Returns `None` under
/// `--quiet`, so callers can thread the `Option` straight into `finish_*`
/// without branching on quietness themselves.
pub fn spinner(message: &str, quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("◐◓◑◒")
            .template("{spinner:.cyan} {msg} ({elapsed})")
            .expect("invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

/// Bar with a known item count, used for repo-by-repo progress.
#[allow(dead_code)]
pub fn progress_bar(total: u64, message: &str, quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} repo(s)")
            .expect("invalid progress bar template")
            .progress_chars("█▓░"),
    );
    pb.set_message(message.to_string());
    Some(pb)
}

/// Bar for byte-counted work (model weight downloads under the `candle`
/// embedder feature).
#[allow(dead_code)]
pub fn bytes_bar(total: u64, message: &str, quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
            .expect("invalid bytes bar template")
            .progress_chars("█▓░"),
    );
    pb.set_message(message.to_string());
    Some(pb)
}

fn finish(pb: Option<ProgressBar>, status: FinishStatus, message: &str) {
    if let Some(pb) = pb {
        pb.set_style(
            ProgressStyle::default_spinner()
                .template(&format!("{{prefix:.{}}} {{msg}}", status.color()))
                .expect("invalid finish template"),
        );
        pb.set_prefix(status.glyph());
        pb.finish_with_message(message.to_string());
    }
}

/// Finishes a spinner after a run completed cleanly.
pub fn finish_spinner(pb: Option<ProgressBar>, message: &str) {
    finish(pb, FinishStatus::Ok, message);
}

/// Finishes a spinner for a run that completed but with something the
/// caller should know about (queued behind a lock, docs skipped, etc).
pub fn finish_spinner_warn(pb: Option<ProgressBar>, message: &str) {
    finish(pb, FinishStatus::Warn, message);
}

/// Finishes a spinner for a run that failed outright.
#[allow(dead_code)]
pub fn finish_spinner_error(pb: Option<ProgressBar>, message: &str) {
    finish(pb, FinishStatus::Err, message);
}

/// Clears a progress bar without leaving a finished line behind.
#[allow(dead_code)]
pub fn finish_progress(pb: Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_suppresses_every_widget() {
        assert!(spinner("indexing", true).is_none());
        assert!(progress_bar(3, "repos", true).is_none());
        assert!(bytes_bar(1024, "weights", true).is_none());
    }

    #[test]
    fn spinner_runs_when_not_quiet() {
        let pb = spinner("indexing", false);
        assert!(pb.is_some());
        pb.unwrap().finish();
    }

    #[test]
    fn finish_variants_tolerate_a_suppressed_spinner() {
        finish_spinner(None, "done");
        finish_spinner_warn(None, "queued");
        finish_spinner_error(None, "failed");
        finish_progress(None);
    }
}
