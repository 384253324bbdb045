use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeekerKey(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectKey(pub u64);

impl Display for SeekerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "seeker {}", self.0)
    }
}

impl Display for ProjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "project {}", self.0)
    }
}

/// Composite key of a cached explanation. Unique across the cache store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PairKey {
    pub seeker: SeekerKey,
    pub project: ProjectKey,
}

impl PairKey {
    pub fn new(seeker: SeekerKey, project: ProjectKey) -> Self {
        Self { seeker, project }
    }
}

impl Display for PairKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.seeker, self.project)
    }
}

/// Which side of the match an explanation is written for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    /// Explains the project to the seeker.
    Seeker,
    /// Explains the seeker to the project owner.
    Owner,
}

impl Perspective {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seeker => "seeker",
            Self::Owner => "owner",
        }
    }
}

impl std::str::FromStr for Perspective {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "seeker" => Ok(Self::Seeker),
            "owner" => Ok(Self::Owner),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheEntry {
    pub pair: PairKey,
    pub explanation_for_seeker: Option<String>,
    pub explanation_for_owner: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl CacheEntry {
    pub fn explanation(&self, perspective: Perspective) -> Option<&str> {
        match perspective {
            Perspective::Seeker => self.explanation_for_seeker.as_deref(),
            Perspective::Owner => self.explanation_for_owner.as_deref(),
        }
    }
}

/// Row contents for a first insert; the store stamps both timestamps.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewCacheEntry {
    pub pair: PairKey,
    pub explanation_for_seeker: Option<String>,
    pub explanation_for_owner: Option<String>,
}

impl NewCacheEntry {
    pub fn with_explanation(pair: PairKey, perspective: Perspective, text: impl Into<String>) -> Self {
        let text = text.into();
        let (explanation_for_seeker, explanation_for_owner) = match perspective {
            Perspective::Seeker => (Some(text), None),
            Perspective::Owner => (None, Some(text)),
        };
        Self {
            pair,
            explanation_for_seeker,
            explanation_for_owner,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ExplanationSource {
    /// Read back from the cache store.
    Cached,
    /// Generated by this call and persisted by it.
    Generated,
    /// Configured fallback text. Never persisted.
    Fallback,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Explanation {
    pub pair: PairKey,
    pub perspective: Perspective,
    pub text: String,
    pub source: ExplanationSource,
}

impl Explanation {
    pub fn is_durable(&self) -> bool {
        self.source != ExplanationSource::Fallback
    }
}
