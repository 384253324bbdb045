use thiserror::Error;

use crate::models::{PairKey, ProjectKey, SeekerKey};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    NotFound,
    GenerationUnavailable,
    Conflict,
    Consistency,
    InvalidInput,
    StorageFailure,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub seeker: Option<SeekerKey>,
    pub project: Option<ProjectKey>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            seeker: None,
            project: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_pair(pair: PairKey, kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            seeker: Some(pair.seeker),
            project: Some(pair.project),
            kind,
            message: message.into(),
        }
    }

    /// Fills in the pair attribution without overwriting what the error already carries.
    pub fn attributed_to(self, pair: PairKey) -> Self {
        Self {
            seeker: self.seeker.or(Some(pair.seeker)),
            project: self.project.or(Some(pair.project)),
            kind: self.kind,
            message: self.message,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == CoreErrorKind::Conflict
    }
}
