use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use crate::models::{
    CacheEntry, CoreError, CoreErrorKind, NewCacheEntry, PairKey, Perspective, ProjectKey,
    ProjectProfile, SeekerKey, SeekerProfile,
};
use crate::persistence::{
    ExplanationCacheStore, PersistenceResult, ProfileCatalogStore, ProfileStore,
};

#[derive(Default)]
pub struct InMemoryExplanationStore {
    entries: Mutex<BTreeMap<PairKey, CacheEntry>>,
}

impl InMemoryExplanationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> PersistenceResult<usize> {
        Ok(self.lock_entries()?.len())
    }

    pub fn is_empty(&self) -> PersistenceResult<bool> {
        Ok(self.lock_entries()?.is_empty())
    }

    fn lock_entries(&self) -> PersistenceResult<MutexGuard<'_, BTreeMap<PairKey, CacheEntry>>> {
        self.entries.lock().map_err(|_| {
            CoreError::new(
                CoreErrorKind::Internal,
                "explanation store mutex poisoned",
            )
        })
    }
}

impl ExplanationCacheStore for InMemoryExplanationStore {
    fn find_explanation(&self, pair: PairKey) -> PersistenceResult<Option<CacheEntry>> {
        Ok(self.lock_entries()?.get(&pair).cloned())
    }

    fn insert_explanation(&self, entry: &NewCacheEntry) -> PersistenceResult<CacheEntry> {
        let mut entries = self.lock_entries()?;
        if entries.contains_key(&entry.pair) {
            return Err(CoreError::for_pair(
                entry.pair,
                CoreErrorKind::Conflict,
                format!("explanation for {} already exists", entry.pair),
            ));
        }

        let now = SystemTime::now();
        let stored = CacheEntry {
            pair: entry.pair,
            explanation_for_seeker: entry.explanation_for_seeker.clone(),
            explanation_for_owner: entry.explanation_for_owner.clone(),
            created_at: now,
            updated_at: now,
        };
        entries.insert(entry.pair, stored.clone());
        Ok(stored)
    }

    fn fill_explanation(
        &self,
        pair: PairKey,
        perspective: Perspective,
        text: &str,
    ) -> PersistenceResult<bool> {
        let mut entries = self.lock_entries()?;
        let Some(entry) = entries.get_mut(&pair) else {
            return Ok(false);
        };

        let slot = match perspective {
            Perspective::Seeker => &mut entry.explanation_for_seeker,
            Perspective::Owner => &mut entry.explanation_for_owner,
        };
        if slot.is_some() {
            return Ok(false);
        }

        *slot = Some(text.to_string());
        entry.updated_at = SystemTime::now();
        Ok(true)
    }

    fn list_by_seeker(&self, seeker: SeekerKey) -> PersistenceResult<Vec<CacheEntry>> {
        let entries = self.lock_entries()?;
        let mut matching: Vec<CacheEntry> = entries
            .values()
            .filter(|entry| entry.pair.seeker == seeker)
            .cloned()
            .collect();
        matching.sort_by_key(|entry| (entry.created_at, entry.pair.project));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    state: Mutex<ProfileState>,
}

#[derive(Default)]
struct ProfileState {
    seekers: HashMap<SeekerKey, SeekerProfile>,
    projects: HashMap<ProjectKey, ProjectProfile>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> PersistenceResult<MutexGuard<'_, ProfileState>> {
        self.state
            .lock()
            .map_err(|_| CoreError::new(CoreErrorKind::Internal, "profile store mutex poisoned"))
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn resolve_seeker(&self, seeker: SeekerKey) -> PersistenceResult<Option<SeekerProfile>> {
        Ok(self.lock_state()?.seekers.get(&seeker).cloned())
    }

    fn resolve_project(&self, project: ProjectKey) -> PersistenceResult<Option<ProjectProfile>> {
        Ok(self.lock_state()?.projects.get(&project).cloned())
    }
}

impl ProfileCatalogStore for InMemoryProfileStore {
    fn upsert_seeker_profile(&self, profile: &SeekerProfile) -> PersistenceResult<()> {
        self.lock_state()?
            .seekers
            .insert(profile.key, profile.clone());
        Ok(())
    }

    fn upsert_project_profile(&self, profile: &ProjectProfile) -> PersistenceResult<()> {
        self.lock_state()?
            .projects
            .insert(profile.key, profile.clone());
        Ok(())
    }
}
