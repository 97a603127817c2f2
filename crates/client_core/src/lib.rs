use std::{future::Future, sync::Arc};

use rand::{seq::SliceRandom, Rng};
use shared::{
    domain::{Candidate, Entity, EntityId, Event},
    error::PipelineError,
    ResultState,
};
use storage::CacheStore;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

pub mod mapper;
pub mod wire;

pub use mapper::{EntityMapper, PokeApiMapper};
pub use wire::{HttpWireClient, WireClient};

pub const DEFAULT_LISTING_LIMIT: u32 = 100;
pub const DEFAULT_LISTING_OFFSET: u32 = 0;
const RESULT_CHANNEL_CAPACITY: usize = 4;

/// Finite stream of progress reports: optionally `Pending`, then exactly one
/// terminal state.
pub type ResultStream<T> = ReceiverStream<ResultState<T>>;

/// Pagination window used for the candidate listing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingWindow {
    pub limit: u32,
    pub offset: u32,
}

impl Default for ListingWindow {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LISTING_LIMIT,
            offset: DEFAULT_LISTING_OFFSET,
        }
    }
}

/// Picks one candidate uniformly at random and resolves its id.
pub fn select_candidate<R: Rng + ?Sized>(
    candidates: &[Candidate],
    rng: &mut R,
) -> Result<EntityId, PipelineError> {
    let candidate = candidates.choose(rng).ok_or(PipelineError::NoCandidates)?;
    candidate.entity_id().ok_or_else(|| {
        PipelineError::transport(format!(
            "malformed candidate url '{}'",
            candidate.identifier_url
        ))
    })
}

/// Fetch-select-cache pipeline over a wire client, a mapper and the local
/// cache store.
///
/// Concurrent refreshes are not coalesced: each runs independently and the
/// last replace to commit wins.
pub struct CacheOrchestrator {
    wire: Arc<dyn WireClient>,
    mapper: Arc<dyn EntityMapper>,
    store: Arc<dyn CacheStore>,
    window: ListingWindow,
}

impl CacheOrchestrator {
    pub fn new(
        wire: Arc<dyn WireClient>,
        mapper: Arc<dyn EntityMapper>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            wire,
            mapper,
            store,
            window: ListingWindow::default(),
        }
    }

    pub fn with_listing_window(mut self, window: ListingWindow) -> Self {
        self.window = window;
        self
    }

    /// Runs a refresh on its own task. Dropping the returned stream abandons
    /// the in-flight pipeline; an interrupted cache replace rolls back.
    pub fn refresh(self: &Arc<Self>) -> ResultStream<Entity> {
        self.spawn_pipeline(true, |this| async move { this.refresh_once().await })
    }

    pub fn load_cached(self: &Arc<Self>) -> ResultStream<Entity> {
        self.spawn_pipeline(false, |this| async move { this.load_cached_once().await })
    }

    pub fn load_cached_events(self: &Arc<Self>) -> ResultStream<Vec<Event>> {
        self.spawn_pipeline(true, |this| async move { this.load_cached_events_once().await })
    }

    /// Runs a refresh inline and returns only its terminal state.
    pub async fn refresh_once(&self) -> ResultState<Entity> {
        let outcome = self.fetch_select_cache().await;
        match &outcome {
            Ok(entity) => info!(
                name = %entity.name,
                attributes = entity.attributes.len(),
                events = entity.events.len(),
                "refresh: cache replaced"
            ),
            Err(err) => warn!(kind = ?err.kind(), error = %err, "refresh: failed"),
        }
        outcome.into()
    }

    /// An empty cache is reported as success with `Entity::default()`.
    pub async fn load_cached_once(&self) -> ResultState<Entity> {
        match self.store.read_all().await {
            Ok(Some(rows)) => ResultState::Succeeded(self.mapper.rows_to_entity(&rows)),
            Ok(None) => {
                debug!("load_cached: cache slot empty");
                ResultState::Succeeded(Entity::default())
            }
            Err(err) => {
                warn!(error = %err, "load_cached: storage read failed");
                ResultState::from_error(PipelineError::storage_with(
                    "failed to read cached entity",
                    err,
                ))
            }
        }
    }

    /// Unlike `load_cached_once`, having no cached events is a failure.
    pub async fn load_cached_events_once(&self) -> ResultState<Vec<Event>> {
        match self.store.read_events().await {
            Ok(rows) if rows.is_empty() => {
                let err = PipelineError::EmptyCache("no cached events".to_string());
                ResultState::from_error(err)
            }
            Ok(rows) => ResultState::Succeeded(self.mapper.events_from_rows(&rows)),
            Err(err) => {
                warn!(error = %err, "load_cached_events: storage read failed");
                ResultState::from_error(PipelineError::storage_with(
                    "failed to read cached events",
                    err,
                ))
            }
        }
    }

    async fn fetch_select_cache(&self) -> Result<Entity, PipelineError> {
        let listing = self
            .wire
            .list_entities(self.window.limit, self.window.offset)
            .await?;
        let candidates = self.mapper.listing_to_candidates(&listing);
        // ThreadRng is !Send; keep it out of the await points.
        let entity_id = {
            let mut rng = rand::thread_rng();
            select_candidate(&candidates, &mut rng)?
        };
        info!(
            entity_id = entity_id.0,
            candidates = candidates.len(),
            "refresh: candidate selected"
        );

        let detail = self.wire.fetch_entity_detail(entity_id).await?;
        let entity = self.mapper.detail_to_entity(&detail);
        if entity.name.is_empty() {
            return Err(PipelineError::transport(format!(
                "detail payload for entity {entity_id} has no name"
            )));
        }

        let rows = self.mapper.entity_to_row_set(&entity);
        self.store
            .replace_all(&rows)
            .await
            .map_err(|err| PipelineError::storage_with("failed to replace cached entity", err))?;
        Ok(entity)
    }

    fn spawn_pipeline<T, F, Fut>(self: &Arc<Self>, emit_pending: bool, op: F) -> ResultStream<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ResultState<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if emit_pending && tx.send(ResultState::Pending).await.is_err() {
                return;
            }
            tokio::select! {
                _ = tx.closed() => debug!("pipeline abandoned by consumer"),
                terminal = op(this) => {
                    let _ = tx.send(terminal).await;
                }
            }
        });
        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
