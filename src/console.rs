//! Console output formatting with ANSI color support.
//!
//! Provides styled terminal output with automatic TTY detection
//! and respect for the NO_COLOR environment variable.

use crate::record::ErrorKind;
use crate::storage::BatchStats;
use crate::utils::truncate_chars;
use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};
use std::time::Duration;

/// ANSI style codes for terminal formatting.
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Bold,
    Dim,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Gray,
}

impl Style {
    /// Returns the ANSI escape code for this style.
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::Dim => "2",
            Style::Red => "31",
            Style::Green => "32",
            Style::Yellow => "33",
            Style::Blue => "34",
            Style::Magenta => "35",
            Style::Cyan => "36",
            Style::Gray => "90",
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Cells in the chapter progress bar.
const BAR_WIDTH: usize = 40;

/// Characters of the chapter title shown after the bar.
const TITLE_WIDTH: usize = 25;

/// Chapter titles listed per error kind.
const LISTED_FAILURES: usize = 5;

/// Console output handler with color support detection.
#[derive(Debug)]
pub struct Console {
    colors_enabled: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// Creates a new Console instance, detecting color support.
    ///
    /// Colors are disabled if:
    /// - The `NO_COLOR` environment variable is set
    /// - stdout is not a terminal (TTY)
    pub fn new() -> Self {
        let colors_enabled = std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();

        Self { colors_enabled }
    }

    /// Creates a Console with colors explicitly enabled or disabled.
    pub fn with_colors(enabled: bool) -> Self {
        Self {
            colors_enabled: enabled,
        }
    }

    /// Applies ANSI styles to text if colors are enabled.
    pub fn style(&self, text: &str, styles: &[Style]) -> String {
        if !self.colors_enabled || styles.is_empty() {
            return text.to_string();
        }

        let codes: Vec<&str> = styles.iter().map(|s| s.code()).collect();
        format!("\x1b[{}m{}{}", codes.join(";"), text, RESET)
    }

    /// Creates a colored label like `[INFO]`.
    pub fn label(&self, label: &str, color: Style) -> String {
        let styled = self.style(label, &[color, Style::Bold]);
        format!("[{}]", styled)
    }

    /// Prints an info message with blue `[INFO]` label.
    pub fn info(&self, message: &str) {
        println!("{} {}", self.label("INFO", Style::Blue), message);
    }

    /// Prints a success message with green `[OK]` label.
    pub fn success(&self, message: &str) {
        println!("{} {}", self.label("OK", Style::Green), message);
    }

    /// Prints a warning message with yellow `[WARN]` label.
    pub fn warning(&self, message: &str) {
        println!("{} {}", self.label("WARN", Style::Yellow), message);
    }

    /// Prints an error message with red `[ERROR]` label.
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.label("ERROR", Style::Red), message);
    }

    /// Prints a step message with cyan `[STEP]` label.
    pub fn step(&self, message: &str) {
        println!("{} {}", self.label("STEP", Style::Cyan), message);
    }

    /// Prints a section header in magenta bold.
    pub fn section(&self, message: &str) {
        println!();
        println!("{}", self.style(message, &[Style::Magenta, Style::Bold]));
    }

    /// Returns text styled as muted (dim gray).
    pub fn muted(&self, text: &str) -> String {
        self.style(text, &[Style::Gray, Style::Dim])
    }

    /// Clears the current line (for progress updates).
    pub fn clear_line(&self) {
        if self.colors_enabled {
            print!("\r\x1b[2K");
        } else {
            print!("\r");
        }
        let _ = io::stdout().flush();
    }

    /// Prints a progress update on the same line.
    pub fn progress_update(&self, message: &str) {
        self.clear_line();
        print!("{} {}", self.label("..", Style::Cyan), message);
        let _ = io::stdout().flush();
    }

    /// Redraws the chapter progress line.
    pub fn chapter_progress(&self, done: usize, total: usize, eta: Option<Duration>, title: &str) {
        self.progress_update(&format_chapter_progress(done, total, eta, title));
    }

    /// Ends the progress line.
    pub fn finish_progress(&self) {
        println!();
    }

    /// Formats a count with styling (e.g., for character counts).
    pub fn count(&self, n: usize) -> String {
        self.style(&n.to_string(), &[Style::Green, Style::Bold])
    }

    /// Prints failed chapters grouped by error kind.
    pub fn failure_breakdown(&self, groups: &BTreeMap<ErrorKind, Vec<&str>>) {
        for (kind, titles) in groups {
            let shown: Vec<&str> = titles.iter().take(LISTED_FAILURES).copied().collect();
            let more = titles.len().saturating_sub(LISTED_FAILURES);
            let mut line = format!("{}: {} ({})", kind, titles.len(), shown.join(", "));
            if more > 0 {
                line.push_str(&format!(" +{} more", more));
            }
            self.warning(&line);
        }
    }

    /// Prints the end-of-batch statistics.
    pub fn batch_summary(&self, stats: &BatchStats) {
        self.section("Batch summary");
        self.info(&format!(
            "Novels: {} total, {} persisted, {} failed",
            stats.total,
            self.count(stats.success),
            stats.failed
        ));
        self.info(&format!(
            "Valid chapters: {}, characters: {}",
            self.count(stats.total_chapters),
            self.count(stats.total_chars)
        ));
        if stats.skipped > 0 {
            self.warning(&format!("{} novels skipped after the interrupt", stats.skipped));
        }
        for (site, site_stats) in &stats.sites {
            self.info(&format!(
                "{} {}",
                site,
                self.muted(&format!(
                    "success {}, failed {}",
                    site_stats.success, site_stats.failed
                ))
            ));
        }
        for line in failure_lines(stats) {
            self.warning(&line);
        }
    }
}

/// One line per failure kind: novel outcomes first, then chapter errors.
pub fn failure_lines(stats: &BatchStats) -> Vec<String> {
    let novels = stats
        .failures
        .iter()
        .map(|(kind, n)| format!("Novels {}: {}", kind, n));
    let chapters = stats
        .chapter_failures
        .iter()
        .map(|(kind, n)| format!("Chapters {}: {}", kind, n));
    novels.chain(chapters).collect()
}

/// Renders `[====----] i/N (p%) | ETA mm:ss | title`.
pub fn format_chapter_progress(
    done: usize,
    total: usize,
    eta: Option<Duration>,
    title: &str,
) -> String {
    let percent = if total == 0 { 100 } else { done * 100 / total };
    let eta = eta.map(format_clock).unwrap_or_else(|| "--:--".to_string());
    format!(
        "{} {}/{} ({}%) | ETA {} | {}",
        progress_bar(done, total, BAR_WIDTH),
        done,
        total,
        percent,
        eta,
        truncate_chars(title, TITLE_WIDTH)
    )
}

/// `[====------]` with `width` cells.
pub fn progress_bar(done: usize, total: usize, width: usize) -> String {
    let filled = if total == 0 {
        width
    } else {
        (done.min(total) * width) / total
    };
    format!("[{}{}]", "=".repeat(filled), "-".repeat(width - filled))
}

/// `mm:ss`, or `h:mm:ss` past an hour.
fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_disabled() {
        let console = Console::with_colors(false);
        assert_eq!(console.style("hello", &[Style::Red]), "hello");
    }

    #[test]
    fn test_style_enabled() {
        let console = Console::with_colors(true);
        let styled = console.style("hello", &[Style::Red]);
        assert!(styled.contains("\x1b[31m"));
        assert!(styled.contains("hello"));
        assert!(styled.contains(RESET));
    }

    #[test]
    fn test_multiple_styles() {
        let console = Console::with_colors(true);
        let styled = console.style("hello", &[Style::Bold, Style::Red]);
        assert!(styled.contains("1;31"));
    }

    #[test]
    fn test_label() {
        let console = Console::with_colors(false);
        assert_eq!(console.label("INFO", Style::Blue), "[INFO]");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 4, 8), "[--------]");
        assert_eq!(progress_bar(1, 4, 8), "[==------]");
        assert_eq!(progress_bar(4, 4, 8), "[========]");
        assert_eq!(progress_bar(0, 0, 4), "[====]");
    }

    #[test]
    fn test_chapter_progress_line() {
        let line = format_chapter_progress(
            3,
            12,
            Some(Duration::from_secs(125)),
            &format!("第三章 {}长的标题", "非常".repeat(15)),
        );
        assert!(line.starts_with(&format!("[{}{}]", "=".repeat(10), "-".repeat(30))));
        assert!(line.contains(" 3/12 (25%) | ETA 02:05 | "));
        assert!(line.ends_with("..."));

        let line = format_chapter_progress(0, 10, None, "第一章");
        assert!(line.contains("ETA --:--"));
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(Duration::from_secs(59)), "00:59");
        assert_eq!(format_clock(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_failure_lines() {
        use crate::storage::FailureKind;

        let mut stats = BatchStats::default();
        stats.record_failure("m.shuhaige.net", FailureKind::Rejected);
        stats.record_failure("m.shuhaige.net", FailureKind::Rejected);
        stats.record_failure("m.shuhaige.net", FailureKind::Interrupted);
        stats.record_chapter_failures(&BTreeMap::from([(ErrorKind::NoContent, 4)]));

        assert_eq!(
            failure_lines(&stats),
            vec![
                "Novels rejected: 2",
                "Novels interrupted: 1",
                "Chapters no content block: 4",
            ]
        );
    }
}
