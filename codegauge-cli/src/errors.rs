//! Error taxonomy.
//!
//! Two tiers: `FatalError` propagates to the driver and aborts the scan;
//! everything else is swallowed locally with a structured `warn!` carrying a
//! stable code (see the `codes` module). Every fatal variant renders with a
//! one-sentence remediation line and no failure path prints a stack trace.

use std::path::PathBuf;
use thiserror::Error;

/// Stable codes for recoverable failures, logged rather than raised.
pub mod codes {
    pub const TOOL_MISSING: &str = "E_TOOL_MISSING";
    pub const PHASE_FAILED: &str = "E_PHASE_FAILED";
    pub const PHASE_TIMEOUT: &str = "E_PHASE_TIMEOUT";
    pub const BAD_FINDING: &str = "E_BAD_FINDING";
}

/// Failures that abort a scan before any state is written.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("config file {path} is unparseable: {detail}\n  fix the syntax error or delete the file to fall back to defaults")]
    ConfigParse { path: PathBuf, detail: String },

    #[error("state file {path} is corrupt and was left untouched: {detail}\n  restore from {backup} or delete the state file to start fresh")]
    StateCorrupt {
        path: PathBuf,
        backup: PathBuf,
        detail: String,
    },

    #[error("state file was written by a newer codegauge (schema v{found}, this binary supports v{supported})\n  upgrade codegauge to read this state")]
    StateVersionTooNew { found: u32, supported: u32 },

    #[error("another scan holds the lock on {path}\n  wait for it to finish or remove the lock if the process is dead")]
    ScanInProgress { path: PathBuf },

    #[error("atomic state replace failed; previous state is intact: {detail}\n  inspect the temp file at {temp_path} for diagnosis")]
    AtomicWrite { temp_path: PathBuf, detail: String },

    #[error("scan cancelled; previous state retained unchanged")]
    Cancelled,
}
