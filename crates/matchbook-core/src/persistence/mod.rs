pub mod in_memory;

pub use in_memory::{InMemoryExplanationStore, InMemoryProfileStore};

use crate::models::{
    CacheEntry, CoreError, NewCacheEntry, PairKey, Perspective, ProjectKey, ProjectProfile,
    SeekerKey, SeekerProfile,
};

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Durable storage of match explanations keyed by `(seeker, project)`.
///
/// Implementations must enforce pair uniqueness themselves: two concurrent
/// `insert_explanation` calls for the same pair never both succeed, and the
/// loser fails with `CoreErrorKind::Conflict`.
pub trait ExplanationCacheStore: Send + Sync {
    fn find_explanation(&self, pair: PairKey) -> PersistenceResult<Option<CacheEntry>>;

    fn insert_explanation(&self, entry: &NewCacheEntry) -> PersistenceResult<CacheEntry>;

    /// Sets the perspective's text only when the row exists and the field is
    /// still empty. Returns `true` when this call wrote the value.
    fn fill_explanation(
        &self,
        pair: PairKey,
        perspective: Perspective,
        text: &str,
    ) -> PersistenceResult<bool>;

    fn list_by_seeker(&self, seeker: SeekerKey) -> PersistenceResult<Vec<CacheEntry>>;
}

pub trait ProfileStore: Send + Sync {
    fn resolve_seeker(&self, seeker: SeekerKey) -> PersistenceResult<Option<SeekerProfile>>;

    fn resolve_project(&self, project: ProjectKey) -> PersistenceResult<Option<ProjectProfile>>;
}

pub trait ProfileCatalogStore: ProfileStore {
    fn upsert_seeker_profile(&self, profile: &SeekerProfile) -> PersistenceResult<()>;

    fn upsert_project_profile(&self, profile: &ProjectProfile) -> PersistenceResult<()>;
}
