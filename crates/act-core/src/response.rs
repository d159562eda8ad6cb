//! `VerifierResponse`: the Verifier Facade's single return type.
//!
//! Grounded on `examples/original_source/src/act/verifier/response.py`.
//! Modeled as a tagged enum over `{PASS, FAIL, INFRA_ERROR}` (design note in
//! the spec: no class hierarchy; optional fields carry their own presence
//! marker so JSON serialization is stable) rather than one flat struct with
//! a status field and a pile of `Option`s.

use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification of an infrastructure failure, mapped from the container
/// manager's bring-up errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraErrorType {
    DockerUnavailable,
    ImagePull,
    ContainerCreation,
    ResourceExhaustion,
    Unknown,
}

/// Fields shared by `PASS` and `FAIL` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub run_id: String,
    pub tail_log: String,
    pub artifact_paths: Vec<PathBuf>,
    pub manifest: Manifest,
}

/// Fields carried by an `INFRA_ERROR` response: the required classifier and
/// message, plus whatever subset of the normal outcome fields were produced
/// before the failure (a run dir may exist with no manifest, for instance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfraErrorOutcome {
    pub error_type: InfraErrorType,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_paths: Option<Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum VerifierResponse {
    #[serde(rename = "PASS")]
    Pass(VerificationOutcome),
    #[serde(rename = "FAIL")]
    Fail(VerificationOutcome),
    #[serde(rename = "INFRA_ERROR")]
    InfraError(InfraErrorOutcome),
}

impl VerifierResponse {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }

    pub fn is_infra_error(&self) -> bool {
        matches!(self, Self::InfraError(_))
    }

    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::Pass(o) | Self::Fail(o) => Some(&o.run_id),
            Self::InfraError(o) => o.run_id.as_deref(),
        }
    }

    pub fn tail_log(&self) -> Option<&str> {
        match self {
            Self::Pass(o) | Self::Fail(o) => Some(&o.tail_log),
            Self::InfraError(o) => o.tail_log.as_deref(),
        }
    }
}

pub fn create_pass_response(
    run_id: String,
    tail_log: String,
    artifact_paths: Vec<PathBuf>,
    manifest: Manifest,
) -> VerifierResponse {
    VerifierResponse::Pass(VerificationOutcome {
        run_id,
        tail_log,
        artifact_paths,
        manifest,
    })
}

pub fn create_fail_response(
    run_id: String,
    tail_log: String,
    artifact_paths: Vec<PathBuf>,
    manifest: Manifest,
) -> VerifierResponse {
    VerifierResponse::Fail(VerificationOutcome {
        run_id,
        tail_log,
        artifact_paths,
        manifest,
    })
}

pub fn create_infra_error_response(
    error_type: InfraErrorType,
    error_message: impl Into<String>,
    run_id: Option<String>,
    tail_log: Option<String>,
    artifact_paths: Option<Vec<PathBuf>>,
    manifest: Option<Manifest>,
) -> VerifierResponse {
    VerifierResponse::InfraError(InfraErrorOutcome {
        error_type,
        error_message: error_message.into(),
        run_id,
        tail_log,
        artifact_paths,
        manifest,
    })
}
