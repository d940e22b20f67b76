//! Execution-log error codes
//!
//! Error codes follow the pattern: XLOG-{CATEGORY}-{3-digit number}
//!
//! Categories:
//! - USE: API misuse (writing to a completed scope)
//! - STO: Persistent store failures
//! - TSK: Background task failures
//!
//! Each error code is stable and should not be reused.

/// Scope already completed (message or child scope rejected)
pub const XLOG_USE_001_SCOPE_COMPLETED: &str = "XLOG-USE-001";

/// Store operation failed (write, completion, or read)
pub const XLOG_STO_001_STORE_FAILED: &str = "XLOG-STO-001";

/// Background log task panicked or was cancelled by runtime shutdown
pub const XLOG_TSK_001_TASK_FAILED: &str = "XLOG-TSK-001";

/// Logger constructed outside of a Tokio runtime
pub const XLOG_TSK_002_NO_RUNTIME: &str = "XLOG-TSK-002";

/// Error code documentation
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | XLOG-USE-001 | Scope already completed | Create child scopes and write messages before completing the scope |
/// | XLOG-STO-001 | Store operation failed | Check the data file path, permissions and disk space; logs written after the failure may be incomplete |
/// | XLOG-TSK-001 | Background task failed | Keep the Tokio runtime alive until the root scope completion has been awaited |
/// | XLOG-TSK-002 | No Tokio runtime | Construct the logger inside a runtime or pass a runtime handle explicitly |
pub const ERROR_CODE_DOCUMENTATION: &str = "Error code documentation available in source";
