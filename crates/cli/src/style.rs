//! Shared styling utilities for terminal output.

use console::Style;

use modelrepo_core::conflict::ConflictStatus;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

pub fn status(status: ConflictStatus) -> String {
    let style = match status {
        ConflictStatus::DeletedByUs | ConflictStatus::DeletedByThem => Style::new().red(),
        ConflictStatus::Modified => Style::new().yellow(),
        ConflictStatus::Identical => Style::new().dim(),
    };
    style.apply_to(status.to_string()).to_string()
}
