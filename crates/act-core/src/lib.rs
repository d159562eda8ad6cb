//! Data model, artifact store, and write boundary for the act verification
//! core.
//!
//! Pure and synchronous — no async runtime dependency. `actd` builds the
//! container-sandboxed, async pieces (C4–C6, C9, C10) on top of this crate.

pub mod boundary;
pub mod config;
pub mod context_dir;
pub mod logs;
pub mod manifest;
pub mod response;
pub mod retention;
pub mod run_id;
pub mod types;

pub use boundary::{WriteBoundaryEnforcer, WriteBoundaryError};
pub use config::Config;
pub use context_dir::{ContextDirError, AGENT_DIR_NAME};
pub use manifest::{Manifest, ManifestError, PlatformInfo, VerifierStatus};
pub use response::{InfraErrorType, VerifierResponse};
pub use retention::RunInfo;
pub use run_id::{RunDir, RunId, RunIdError};
pub use types::{CommandResult, LoopState, Task, TaskState, VerificationStep};
