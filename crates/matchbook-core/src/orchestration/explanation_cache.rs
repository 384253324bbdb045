use std::sync::Arc;

use crate::generation::{ExplanationGenerator, build_prompt};
use crate::models::{
    CacheEntry, CoreError, CoreErrorKind, Explanation, ExplanationSource, NewCacheEntry, PairKey,
    Perspective, ProjectKey, ProjectProfile, SeekerKey, SeekerProfile,
};
use crate::orchestration::{ExplanationCacheConfig, OrchestrationResult};
use crate::persistence::{ExplanationCacheStore, ProfileStore};

/// Read-through, write-once coordinator for match explanations.
///
/// No lock is taken around a pair. Racing first-time callers may each call the
/// generator, but the cache store's uniqueness constraint lets exactly one
/// write win and every loser returns the winner's stored text. A lost write is
/// followed by one fresh read; if that read cannot see the winner the call
/// fails with `CoreErrorKind::Consistency` instead of trying again.
#[derive(Clone)]
pub struct ExplanationCache {
    cache_store: Arc<dyn ExplanationCacheStore>,
    profiles: Arc<dyn ProfileStore>,
    generator: Arc<dyn ExplanationGenerator>,
    config: ExplanationCacheConfig,
}

impl ExplanationCache {
    pub fn new(
        cache_store: Arc<dyn ExplanationCacheStore>,
        profiles: Arc<dyn ProfileStore>,
        generator: Arc<dyn ExplanationGenerator>,
        config: ExplanationCacheConfig,
    ) -> OrchestrationResult<Self> {
        config.validate()?;
        Ok(Self {
            cache_store,
            profiles,
            generator,
            config,
        })
    }

    pub fn config(&self) -> &ExplanationCacheConfig {
        &self.config
    }

    /// Explanation of `project` written for `seeker`.
    pub async fn get_explanation(
        &self,
        seeker: SeekerKey,
        project: ProjectKey,
    ) -> OrchestrationResult<String> {
        self.get_explanation_for(PairKey::new(seeker, project), Perspective::Seeker)
            .await
            .map(|explanation| explanation.text)
    }

    pub async fn get_explanation_for(
        &self,
        pair: PairKey,
        perspective: Perspective,
    ) -> OrchestrationResult<Explanation> {
        let existing = self.find(pair).await?;
        if let Some(text) = existing
            .as_ref()
            .and_then(|entry| entry.explanation(perspective))
        {
            tracing::debug!(
                seeker = pair.seeker.0,
                project = pair.project.0,
                perspective = perspective.as_str(),
                "explanation cache hit"
            );
            return Ok(explanation(
                pair,
                perspective,
                text.to_string(),
                ExplanationSource::Cached,
            ));
        }

        let (seeker, project) = self.load_context(pair).await?;
        let prompt = build_prompt(&seeker, &project, perspective);
        let text = self.generate(pair, perspective, prompt).await?;

        match existing {
            None => self.insert_generated(pair, perspective, text).await,
            Some(_) => self.fill_generated(pair, perspective, text).await,
        }
    }

    /// Like `get_explanation_for`, but serves the configured fallback text when
    /// the generator is unavailable. The fallback is never written to the store.
    pub async fn get_explanation_or_fallback(
        &self,
        pair: PairKey,
        perspective: Perspective,
    ) -> OrchestrationResult<Explanation> {
        match self.get_explanation_for(pair, perspective).await {
            Err(error) if error.kind == CoreErrorKind::GenerationUnavailable => {
                tracing::warn!(
                    seeker = pair.seeker.0,
                    project = pair.project.0,
                    perspective = perspective.as_str(),
                    reason = %error.message,
                    "serving fallback explanation"
                );
                Ok(explanation(
                    pair,
                    perspective,
                    self.config.fallback_text.clone(),
                    ExplanationSource::Fallback,
                ))
            }
            other => other,
        }
    }

    /// Projects for which `seeker` already has a stored explanation.
    pub async fn list_cached_projects_for_seeker(
        &self,
        seeker: SeekerKey,
    ) -> OrchestrationResult<Vec<ProjectKey>> {
        let store = self.cache_store.clone();
        let entries = join_blocking("list_by_seeker", move || store.list_by_seeker(seeker))
            .await
            .map_err(|error| CoreError {
                seeker: error.seeker.or(Some(seeker)),
                ..error
            })?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.explanation_for_seeker.is_some())
            .map(|entry| entry.pair.project)
            .collect())
    }

    async fn find(&self, pair: PairKey) -> OrchestrationResult<Option<CacheEntry>> {
        let store = self.cache_store.clone();
        join_blocking("find_explanation", move || store.find_explanation(pair))
            .await
            .map_err(|error| error.attributed_to(pair))
    }

    async fn load_context(
        &self,
        pair: PairKey,
    ) -> OrchestrationResult<(SeekerProfile, ProjectProfile)> {
        let seeker_profiles = self.profiles.clone();
        let project_profiles = self.profiles.clone();
        let seeker_lookup =
            join_blocking("resolve_seeker", move || seeker_profiles.resolve_seeker(pair.seeker));
        let project_lookup = join_blocking("resolve_project", move || {
            project_profiles.resolve_project(pair.project)
        });
        let (seeker, project) = tokio::join!(seeker_lookup, project_lookup);

        let seeker = seeker.map_err(|error| error.attributed_to(pair))?;
        let project = project.map_err(|error| error.attributed_to(pair))?;

        let seeker = seeker.ok_or_else(|| {
            CoreError::for_pair(
                pair,
                CoreErrorKind::NotFound,
                format!("{} not found", pair.seeker),
            )
        })?;
        let project = project.ok_or_else(|| {
            CoreError::for_pair(
                pair,
                CoreErrorKind::NotFound,
                format!("{} not found", pair.project),
            )
        })?;

        Ok((seeker, project))
    }

    async fn generate(
        &self,
        pair: PairKey,
        perspective: Perspective,
        prompt: String,
    ) -> OrchestrationResult<String> {
        let generator = self.generator.clone();
        let backend = generator.backend_name().to_string();
        let timeout = self.config.generator_timeout;

        let handle = tokio::task::spawn_blocking(move || generator.generate(&prompt));
        let outcome = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => {
                return Err(CoreError::for_pair(
                    pair,
                    CoreErrorKind::Internal,
                    format!("generator join failure: {join_error}"),
                ));
            }
            Err(_) => {
                return Err(generation_unavailable(
                    pair,
                    perspective,
                    format!("generator '{backend}' did not respond within {timeout:?}"),
                ));
            }
        };

        let text = outcome
            .map_err(|error| generation_unavailable(pair, perspective, error.to_string()))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(generation_unavailable(
                pair,
                perspective,
                format!("generator '{backend}' returned an empty explanation"),
            ));
        }
        Ok(text.to_string())
    }

    async fn insert_generated(
        &self,
        pair: PairKey,
        perspective: Perspective,
        text: String,
    ) -> OrchestrationResult<Explanation> {
        let store = self.cache_store.clone();
        let new_entry = NewCacheEntry::with_explanation(pair, perspective, text.clone());
        let inserted = join_blocking("insert_explanation", move || {
            store.insert_explanation(&new_entry)
        })
        .await;

        match inserted {
            Ok(_) => {
                tracing::info!(
                    seeker = pair.seeker.0,
                    project = pair.project.0,
                    perspective = perspective.as_str(),
                    "stored generated explanation"
                );
                Ok(explanation(
                    pair,
                    perspective,
                    text,
                    ExplanationSource::Generated,
                ))
            }
            Err(error) if error.is_conflict() => {
                tracing::warn!(
                    seeker = pair.seeker.0,
                    project = pair.project.0,
                    perspective = perspective.as_str(),
                    "lost explanation insert race; reading stored row"
                );
                let winner = self.find(pair).await?.ok_or_else(|| {
                    consistency_error(
                        pair,
                        perspective,
                        "insert conflicted but no stored row is visible",
                    )
                })?;

                match winner.explanation(perspective) {
                    Some(stored) => Ok(explanation(
                        pair,
                        perspective,
                        stored.to_string(),
                        ExplanationSource::Cached,
                    )),
                    // The winning insert was for the other perspective.
                    None => self.fill_generated(pair, perspective, text).await,
                }
            }
            Err(error) => Err(error.attributed_to(pair)),
        }
    }

    async fn fill_generated(
        &self,
        pair: PairKey,
        perspective: Perspective,
        text: String,
    ) -> OrchestrationResult<Explanation> {
        let store = self.cache_store.clone();
        let fill_text = text.clone();
        let wrote = join_blocking("fill_explanation", move || {
            store.fill_explanation(pair, perspective, &fill_text)
        })
        .await
        .map_err(|error| error.attributed_to(pair))?;

        if wrote {
            tracing::info!(
                seeker = pair.seeker.0,
                project = pair.project.0,
                perspective = perspective.as_str(),
                "stored generated explanation on existing row"
            );
            return Ok(explanation(
                pair,
                perspective,
                text,
                ExplanationSource::Generated,
            ));
        }

        let winner = self.find(pair).await?;
        match winner
            .as_ref()
            .and_then(|entry| entry.explanation(perspective))
        {
            Some(stored) => Ok(explanation(
                pair,
                perspective,
                stored.to_string(),
                ExplanationSource::Cached,
            )),
            None => Err(consistency_error(
                pair,
                perspective,
                "explanation fill was rejected but no stored explanation is visible",
            )),
        }
    }
}

async fn join_blocking<T, F>(operation: &'static str, work: F) -> OrchestrationResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> OrchestrationResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|join_error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("{operation} join failure: {join_error}"),
            )
        })?
}

fn explanation(
    pair: PairKey,
    perspective: Perspective,
    text: String,
    source: ExplanationSource,
) -> Explanation {
    Explanation {
        pair,
        perspective,
        text,
        source,
    }
}

fn generation_unavailable(
    pair: PairKey,
    perspective: Perspective,
    message: impl Into<String>,
) -> CoreError {
    let error = CoreError::for_pair(pair, CoreErrorKind::GenerationUnavailable, message);
    tracing::warn!(
        seeker = pair.seeker.0,
        project = pair.project.0,
        perspective = perspective.as_str(),
        reason = %error.message,
        "explanation generation unavailable"
    );
    error
}

fn consistency_error(pair: PairKey, perspective: Perspective, message: &str) -> CoreError {
    tracing::error!(
        seeker = pair.seeker.0,
        project = pair.project.0,
        perspective = perspective.as_str(),
        detail = message,
        "explanation cache consistency violated"
    );
    CoreError::for_pair(
        pair,
        CoreErrorKind::Consistency,
        format!("{message} for {pair}"),
    )
}
