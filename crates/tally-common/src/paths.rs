use std::path::PathBuf;

/// Root data directory for Tally.
///
/// All peer data is machine-local (enrollment certificates, encrypted
/// keys, audit logs). `TALLY_DATA_DIR` overrides the default location —
/// tests and multi-node harnesses point it at a scratch directory.
///
/// - Linux: `~/.tally/`
/// - macOS: `~/Library/Application Support/tally/`
/// - Windows: `%LOCALAPPDATA%\tally\`
pub fn tally_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("TALLY_DATA_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("tally");
        }
    }

    #[cfg(windows)]
    {
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            return PathBuf::from(local).join("tally");
        }
    }

    #[cfg(not(any(target_os = "macos", windows)))]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".tally");
        }
    }

    // Fallback
    PathBuf::from(".tally")
}

/// Per-node certificate/key storage (used by the certificate store).
pub fn peers_dir() -> PathBuf {
    tally_data_dir().join("peers")
}

/// Log directory (authority audit log).
pub fn log_dir() -> PathBuf {
    tally_data_dir().join("logs")
}
