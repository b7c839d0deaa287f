//! Append-only audit log for authority operations.
//!
//! Every enrollment and certificate issuance is logged with a timestamp
//! and metadata. The log is human-readable and append-only.

use std::path::{Path, PathBuf};

use chrono::Utc;

const AUDIT_FILENAME: &str = "authority-audit.log";

/// Path to the audit log file.
pub fn audit_log_path() -> PathBuf {
    tally_common::paths::log_dir().join(AUDIT_FILENAME)
}

/// Append an audit entry with the given event name and key=value fields.
///
/// Format: `2026-08-07T10:30:00Z | node_enrolled | id=validator | fingerprint=ab12…`
pub fn append_entry(event: &str, fields: &[(&str, &str)]) -> Result<(), std::io::Error> {
    let path = audit_log_path();
    append_entry_to(&path, event, fields)
}

/// Append an audit entry to a specific path (for testing).
pub fn append_entry_to(
    path: &Path,
    event: &str,
    fields: &[(&str, &str)],
) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let mut line = format!("{timestamp} | {event}");

    for (key, value) in fields {
        line.push_str(&format!(" | {key}={value}"));
    }
    line.push('\n');

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())?;

    tracing::debug!(event, "Audit log entry written");
    Ok(())
}
