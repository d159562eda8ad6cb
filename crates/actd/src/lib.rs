//! actd - async runtime for the container-sandboxed verification daemon.
//!
//! Builds the async pieces (container bring-up, pipeline execution, the
//! Verifier Facade, Scout Runtime, editing boundary, and the Debug Loop)
//! on top of the synchronous `act_core` data model and artifact store.

pub mod container;
pub mod debug_loop;
pub mod editor;
pub mod pipeline;
pub mod scout;
pub mod verifier;

pub use container::{ContainerConfig, ContainerError, DockerContainerHandle};
pub use debug_loop::{DebugLoop, InfraErrorSource, LoopOutcome};
pub use editor::{EditOutcome, EditRequest, Editor, EditorError};
pub use scout::{LlmDriver, LlmError, LlmRequest, LlmResponse, RetryPolicy, ScoutError};
pub use verifier::{verify, RealVerifier, VerifierRunner, VerifyRequest};
