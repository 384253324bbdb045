use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use matchbook_core::generation::{ExplanationGenerator, GenerationError, GenerationResult};
use matchbook_core::models::{
    CacheEntry, CoreError, CoreErrorKind, ExplanationSource, NewCacheEntry, PairKey, Perspective,
    ProjectKey, ProjectProfile, SeekerKey, SeekerProfile,
};
use matchbook_core::orchestration::{ExplanationCache, ExplanationCacheConfig};
use matchbook_core::persistence::{
    ExplanationCacheStore, InMemoryExplanationStore, InMemoryProfileStore, PersistenceResult,
    ProfileCatalogStore,
};

struct StubGenerator {
    reply: Result<&'static str, &'static str>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubGenerator {
    fn replying(text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(text: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExplanationGenerator for StubGenerator {
    fn backend_name(&self) -> &str {
        "stub"
    }

    fn generate(&self, prompt: &str) -> GenerationResult<String> {
        assert!(prompt.contains("Collaborator"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match self.reply {
            Ok(text) => Ok(text.to_string()),
            Err(message) => Err(GenerationError::new("stub", message)),
        }
    }
}

struct Fixture {
    store: Arc<InMemoryExplanationStore>,
    profiles: Arc<InMemoryProfileStore>,
}

impl Fixture {
    fn new() -> Self {
        let profiles = Arc::new(InMemoryProfileStore::new());
        profiles
            .upsert_seeker_profile(&SeekerProfile {
                key: SeekerKey(42),
                display_name: "Mina".to_string(),
                skills: vec!["Rust".to_string(), "SQL".to_string()],
                intro: "Backend engineer".to_string(),
                work_style: Some("async".to_string()),
            })
            .unwrap();
        for (project, title) in [(7, "Tiny KV"), (8, "Log shipper"), (9, "Chess bot")] {
            profiles
                .upsert_project_profile(&ProjectProfile {
                    key: ProjectKey(project),
                    title: title.to_string(),
                    intro: "Looking for contributors".to_string(),
                    tags: vec!["rust".to_string()],
                    wanted_roles: Vec::new(),
                })
                .unwrap();
        }

        Self {
            store: Arc::new(InMemoryExplanationStore::new()),
            profiles,
        }
    }

    fn cache(&self, generator: Arc<StubGenerator>) -> ExplanationCache {
        self.cache_with_config(generator, ExplanationCacheConfig::default())
    }

    fn cache_with_config(
        &self,
        generator: Arc<StubGenerator>,
        config: ExplanationCacheConfig,
    ) -> ExplanationCache {
        ExplanationCache::new(self.store.clone(), self.profiles.clone(), generator, config)
            .unwrap()
    }
}

fn pair(seeker: u64, project: u64) -> PairKey {
    PairKey::new(SeekerKey(seeker), ProjectKey(project))
}

#[tokio::test]
async fn prepopulated_pair_is_served_without_generating() {
    let fixture = Fixture::new();
    fixture
        .store
        .insert_explanation(&NewCacheEntry::with_explanation(
            pair(42, 7),
            Perspective::Seeker,
            "Existing reason",
        ))
        .unwrap();
    let generator = StubGenerator::replying("should never be used");
    let cache = fixture.cache(generator.clone());

    let text = cache
        .get_explanation(SeekerKey(42), ProjectKey(7))
        .await
        .unwrap();

    assert_eq!(text, "Existing reason");
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn first_call_generates_and_later_calls_hit_the_cache() {
    let fixture = Fixture::new();
    let generator = StubGenerator::replying("Good fit: skills overlap.");
    let cache = fixture.cache(generator.clone());

    let first = cache
        .get_explanation_for(pair(42, 7), Perspective::Seeker)
        .await
        .unwrap();
    assert_eq!(first.text, "Good fit: skills overlap.");
    assert_eq!(first.source, ExplanationSource::Generated);
    assert_eq!(fixture.store.len().unwrap(), 1);

    for _ in 0..3 {
        let again = cache
            .get_explanation_for(pair(42, 7), Perspective::Seeker)
            .await
            .unwrap();
        assert_eq!(again.text, "Good fit: skills overlap.");
        assert_eq!(again.source, ExplanationSource::Cached);
    }

    assert_eq!(generator.calls(), 1);
    assert_eq!(fixture.store.len().unwrap(), 1);
}

#[tokio::test]
async fn generated_text_is_trimmed_before_storing() {
    let fixture = Fixture::new();
    let cache = fixture.cache(StubGenerator::replying("  Padded reason.\n"));

    let text = cache
        .get_explanation(SeekerKey(42), ProjectKey(7))
        .await
        .unwrap();

    assert_eq!(text, "Padded reason.");
    let stored = fixture.store.find_explanation(pair(42, 7)).unwrap().unwrap();
    assert_eq!(stored.explanation(Perspective::Seeker), Some("Padded reason."));
}

#[tokio::test]
async fn missing_seeker_fails_with_not_found_and_creates_no_row() {
    let fixture = Fixture::new();
    let generator = StubGenerator::replying("unused");
    let cache = fixture.cache(generator.clone());

    let error = cache
        .get_explanation(SeekerKey(404), ProjectKey(7))
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::NotFound);
    assert!(error.message.contains("seeker 404"));
    assert_eq!(error.seeker, Some(SeekerKey(404)));
    assert_eq!(generator.calls(), 0);
    assert!(fixture.store.is_empty().unwrap());
}

#[tokio::test]
async fn missing_project_is_named_in_not_found() {
    let fixture = Fixture::new();
    let cache = fixture.cache(StubGenerator::replying("unused"));

    let error = cache
        .get_explanation(SeekerKey(42), ProjectKey(404))
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::NotFound);
    assert!(error.message.contains("project 404"));
    assert!(fixture.store.is_empty().unwrap());
}

#[tokio::test]
async fn generator_failure_leaves_no_trace() {
    let fixture = Fixture::new();
    let generator = StubGenerator::failing("quota exceeded");
    let cache = fixture.cache(generator.clone());

    let error = cache
        .get_explanation(SeekerKey(42), ProjectKey(7))
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::GenerationUnavailable);
    assert!(error.message.contains("quota exceeded"));
    assert_eq!(generator.calls(), 1);
    assert!(fixture.store.is_empty().unwrap());
}

#[tokio::test]
async fn blank_generator_output_is_not_cached() {
    let fixture = Fixture::new();
    let cache = fixture.cache(StubGenerator::replying("   "));

    let error = cache
        .get_explanation(SeekerKey(42), ProjectKey(7))
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::GenerationUnavailable);
    assert!(fixture.store.is_empty().unwrap());
}

#[tokio::test]
async fn generator_timeout_is_reported_as_unavailable() {
    let fixture = Fixture::new();
    let generator = StubGenerator::slow("too late", Duration::from_millis(300));
    let cache = fixture.cache_with_config(
        generator.clone(),
        ExplanationCacheConfig {
            generator_timeout: Duration::from_millis(20),
            ..ExplanationCacheConfig::default()
        },
    );

    let error = cache
        .get_explanation(SeekerKey(42), ProjectKey(7))
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::GenerationUnavailable);
    assert!(error.message.contains("did not respond"));
    assert!(fixture.store.is_empty().unwrap());
}

#[tokio::test]
async fn fallback_is_served_but_never_stored() {
    let fixture = Fixture::new();
    let failing = fixture.cache_with_config(
        StubGenerator::failing("backend down"),
        ExplanationCacheConfig {
            fallback_text: "A generic reason.".to_string(),
            ..ExplanationCacheConfig::default()
        },
    );

    let fallback = failing
        .get_explanation_or_fallback(pair(42, 7), Perspective::Seeker)
        .await
        .unwrap();
    assert_eq!(fallback.text, "A generic reason.");
    assert_eq!(fallback.source, ExplanationSource::Fallback);
    assert!(!fallback.is_durable());
    assert!(fixture.store.is_empty().unwrap());

    let recovered = fixture.cache(StubGenerator::replying("Real reason."));
    let explanation = recovered
        .get_explanation_or_fallback(pair(42, 7), Perspective::Seeker)
        .await
        .unwrap();
    assert_eq!(explanation.text, "Real reason.");
    assert_eq!(explanation.source, ExplanationSource::Generated);
    assert!(explanation.is_durable());
}

#[tokio::test]
async fn fallback_does_not_mask_not_found() {
    let fixture = Fixture::new();
    let cache = fixture.cache(StubGenerator::failing("backend down"));

    let error = cache
        .get_explanation_or_fallback(pair(404, 7), Perspective::Seeker)
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::NotFound);
}

struct PanickingGenerator;

impl ExplanationGenerator for PanickingGenerator {
    fn backend_name(&self) -> &str {
        "panicking-stub"
    }

    fn generate(&self, _prompt: &str) -> GenerationResult<String> {
        panic!("generator backend crashed");
    }
}

#[tokio::test]
async fn generator_panic_is_internal_and_not_masked_by_fallback() {
    let fixture = Fixture::new();
    let cache = ExplanationCache::new(
        fixture.store.clone(),
        fixture.profiles.clone(),
        Arc::new(PanickingGenerator),
        ExplanationCacheConfig::default(),
    )
    .unwrap();

    let error = cache
        .get_explanation(SeekerKey(42), ProjectKey(7))
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Internal);
    assert_eq!(error.seeker, Some(SeekerKey(42)));
    assert_eq!(error.project, Some(ProjectKey(7)));

    let error = cache
        .get_explanation_or_fallback(pair(42, 7), Perspective::Seeker)
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Internal);
    assert!(fixture.store.is_empty().unwrap());
}

#[tokio::test]
async fn owner_perspective_fills_existing_row_without_touching_seeker_text() {
    let fixture = Fixture::new();
    fixture
        .store
        .insert_explanation(&NewCacheEntry::with_explanation(
            pair(42, 7),
            Perspective::Seeker,
            "Existing reason",
        ))
        .unwrap();
    let generator = StubGenerator::replying("Mina knows the storage layer.");
    let cache = fixture.cache(generator.clone());

    let owner = cache
        .get_explanation_for(pair(42, 7), Perspective::Owner)
        .await
        .unwrap();
    assert_eq!(owner.text, "Mina knows the storage layer.");
    assert_eq!(owner.source, ExplanationSource::Generated);

    let cached = cache
        .get_explanation_for(pair(42, 7), Perspective::Owner)
        .await
        .unwrap();
    assert_eq!(cached.source, ExplanationSource::Cached);

    let stored = fixture.store.find_explanation(pair(42, 7)).unwrap().unwrap();
    assert_eq!(stored.explanation(Perspective::Seeker), Some("Existing reason"));
    assert_eq!(
        stored.explanation(Perspective::Owner),
        Some("Mina knows the storage layer.")
    );
    assert_eq!(generator.calls(), 1);
    assert_eq!(fixture.store.len().unwrap(), 1);
}

#[tokio::test]
async fn listing_only_includes_projects_with_seeker_explanations() {
    let fixture = Fixture::new();
    let cache = fixture.cache(StubGenerator::replying("Some reason."));

    cache
        .get_explanation(SeekerKey(42), ProjectKey(8))
        .await
        .unwrap();
    cache
        .get_explanation(SeekerKey(42), ProjectKey(7))
        .await
        .unwrap();
    cache
        .get_explanation_for(pair(42, 9), Perspective::Owner)
        .await
        .unwrap();

    let mut projects = cache
        .list_cached_projects_for_seeker(SeekerKey(42))
        .await
        .unwrap();
    projects.sort();
    assert_eq!(projects, vec![ProjectKey(7), ProjectKey(8)]);
    assert!(
        cache
            .list_cached_projects_for_seeker(SeekerKey(1))
            .await
            .unwrap()
            .is_empty()
    );
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let fixture = Fixture::new();
    let result = ExplanationCache::new(
        fixture.store.clone(),
        fixture.profiles.clone(),
        StubGenerator::replying("unused"),
        ExplanationCacheConfig {
            generator_timeout: Duration::ZERO,
            ..ExplanationCacheConfig::default()
        },
    );

    assert_eq!(result.err().map(|error| error.kind), Some(CoreErrorKind::InvalidInput));
}

/// Reports a conflict on every insert but never shows the row that caused it.
struct PhantomConflictStore {
    finds: AtomicUsize,
}

impl ExplanationCacheStore for PhantomConflictStore {
    fn find_explanation(&self, _pair: PairKey) -> PersistenceResult<Option<CacheEntry>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn insert_explanation(&self, entry: &NewCacheEntry) -> PersistenceResult<CacheEntry> {
        Err(CoreError::for_pair(
            entry.pair,
            CoreErrorKind::Conflict,
            "simulated uniqueness violation",
        ))
    }

    fn fill_explanation(
        &self,
        _pair: PairKey,
        _perspective: Perspective,
        _text: &str,
    ) -> PersistenceResult<bool> {
        Ok(false)
    }

    fn list_by_seeker(&self, _seeker: SeekerKey) -> PersistenceResult<Vec<CacheEntry>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn conflict_without_visible_row_is_a_consistency_error() {
    let fixture = Fixture::new();
    let store = Arc::new(PhantomConflictStore {
        finds: AtomicUsize::new(0),
    });
    let generator = StubGenerator::replying("Good fit: skills overlap.");
    let cache = ExplanationCache::new(
        store.clone(),
        fixture.profiles.clone(),
        generator.clone(),
        ExplanationCacheConfig::default(),
    )
    .unwrap();

    let error = cache
        .get_explanation(SeekerKey(42), ProjectKey(7))
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Consistency);
    assert_eq!(generator.calls(), 1);
    assert_eq!(store.finds.load(Ordering::SeqCst), 2);
}

/// Shows a row whose requested field stays empty and refuses every fill.
struct StuckFieldStore;

impl ExplanationCacheStore for StuckFieldStore {
    fn find_explanation(&self, pair: PairKey) -> PersistenceResult<Option<CacheEntry>> {
        Ok(Some(CacheEntry {
            pair,
            explanation_for_seeker: None,
            explanation_for_owner: Some("owner side only".to_string()),
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: SystemTime::UNIX_EPOCH,
        }))
    }

    fn insert_explanation(&self, entry: &NewCacheEntry) -> PersistenceResult<CacheEntry> {
        Err(CoreError::for_pair(
            entry.pair,
            CoreErrorKind::Conflict,
            "row already exists",
        ))
    }

    fn fill_explanation(
        &self,
        _pair: PairKey,
        _perspective: Perspective,
        _text: &str,
    ) -> PersistenceResult<bool> {
        Ok(false)
    }

    fn list_by_seeker(&self, _seeker: SeekerKey) -> PersistenceResult<Vec<CacheEntry>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn rejected_fill_without_visible_text_is_a_consistency_error() {
    let fixture = Fixture::new();
    let generator = StubGenerator::replying("Seeker side.");
    let cache = ExplanationCache::new(
        Arc::new(StuckFieldStore),
        fixture.profiles.clone(),
        generator.clone(),
        ExplanationCacheConfig::default(),
    )
    .unwrap();

    let error = cache
        .get_explanation(SeekerKey(42), ProjectKey(7))
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Consistency);
    assert_eq!(generator.calls(), 1);
}
