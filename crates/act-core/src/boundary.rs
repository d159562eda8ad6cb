//! Write Boundary Enforcer (component C8): reject any write outside the
//! repo tree or into the artifact store.
//!
//! Grounded on `examples/original_source/src/act/editor/boundaries.py`.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteBoundaryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("path {0:?} is outside the repo root")]
    OutsideRepo(PathBuf),
    #[error("path {0:?} is inside the artifact store")]
    InsideArtifactRoot(PathBuf),
}

pub type Result<T> = std::result::Result<T, WriteBoundaryError>;

/// Canonicalizes the existing ancestors of `path` and joins whatever
/// components don't exist yet, since a write target commonly doesn't exist
/// at validation time. Equivalent to Python's `Path.resolve()` with
/// `strict=False`.
fn resolve_soft(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut trailing = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(canon) => {
                let mut result = canon;
                for component in trailing.into_iter().rev() {
                    result.push(component);
                }
                return Ok(result);
            }
            Err(_) => {
                let Some(parent) = existing.parent() else {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "no existing ancestor to canonicalize",
                    ));
                };
                if let Some(name) = existing.file_name() {
                    trailing.push(name.to_owned());
                }
                existing = parent;
            }
        }
    }
}

/// Enforces that writes land inside `repo_root` and never inside
/// `artifact_root` (the verifier's own artifact store).
#[derive(Debug, Clone)]
pub struct WriteBoundaryEnforcer {
    repo_root: PathBuf,
    agent_dir_name: String,
    artifact_root: Option<PathBuf>,
}

impl WriteBoundaryEnforcer {
    pub fn new(repo_root: &Path, artifact_root: Option<&Path>) -> std::io::Result<Self> {
        Ok(Self {
            repo_root: repo_root.canonicalize()?,
            agent_dir_name: crate::context_dir::AGENT_DIR_NAME.to_string(),
            artifact_root: artifact_root
                .map(Path::canonicalize)
                .transpose()?,
        })
    }

    pub fn with_agent_dir_name(mut self, name: impl Into<String>) -> Self {
        self.agent_dir_name = name.into();
        self
    }

    /// Resolve `path` against `repo_root` if relative, canonicalize it, and
    /// enforce that it is a descendant of `repo_root` and not of
    /// `artifact_root`.
    pub fn validate(&self, path: &Path) -> Result<PathBuf> {
        let absolute = if path.is_relative() {
            self.repo_root.join(path)
        } else {
            path.to_path_buf()
        };
        let resolved = resolve_soft(&absolute)?;

        if resolved.strip_prefix(&self.repo_root).is_err() {
            return Err(WriteBoundaryError::OutsideRepo(resolved));
        }
        if let Some(artifact_root) = &self.artifact_root {
            if resolved.strip_prefix(artifact_root).is_ok() {
                return Err(WriteBoundaryError::InsideArtifactRoot(resolved));
            }
        }
        Ok(resolved)
    }

    /// Membership in `repo_root` alone, independent of `artifact_root` — a
    /// path can be `is_in_repo` and still rejected by `validate` for also
    /// being inside the artifact store.
    pub fn is_in_repo(&self, path: &Path) -> bool {
        let absolute = if path.is_relative() {
            self.repo_root.join(path)
        } else {
            path.to_path_buf()
        };
        resolve_soft(&absolute)
            .map(|resolved| resolved.strip_prefix(&self.repo_root).is_ok())
            .unwrap_or(false)
    }

    pub fn is_in_agent_dir(&self, path: &Path) -> bool {
        let agent_dir = self.repo_root.join(&self.agent_dir_name);
        match resolve_soft(&if path.is_relative() {
            self.repo_root.join(path)
        } else {
            path.to_path_buf()
        }) {
            Ok(resolved) => resolved.strip_prefix(&agent_dir).is_ok(),
            Err(_) => false,
        }
    }

    pub fn relative_path(&self, path: &Path) -> Result<PathBuf> {
        let resolved = self.validate(path)?;
        Ok(resolved
            .strip_prefix(&self.repo_root)
            .expect("validate already confirmed descendance")
            .to_path_buf())
    }
}

pub fn create_boundary_enforcer(
    repo_root: &Path,
    artifact_root: Option<&Path>,
) -> std::io::Result<WriteBoundaryEnforcer> {
    WriteBoundaryEnforcer::new(repo_root, artifact_root)
}
