use super::*;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use futures::StreamExt;
use rand::{rngs::StdRng, SeedableRng};
use shared::{
    error::FailureKind,
    protocol::{DetailResponse, ListingResponse, MovePayload, NamedResource, StatPayload},
};
use storage::{Storage, StoredEvent, StoredRowSet};
use tokio::sync::Mutex;

fn listing_of(urls: &[&str]) -> ListingResponse {
    ListingResponse {
        results: urls
            .iter()
            .map(|url| NamedResource {
                name: None,
                url: Some(url.to_string()),
            })
            .collect(),
        ..ListingResponse::default()
    }
}

fn named(name: &str) -> Option<NamedResource> {
    Some(NamedResource {
        name: Some(name.to_string()),
        url: None,
    })
}

fn detail(name: &str, stats: &[(&str, i64)], moves: &[&str]) -> DetailResponse {
    DetailResponse {
        name: Some(name.to_string()),
        sprites: None,
        stats: stats
            .iter()
            .map(|(kind, value)| StatPayload {
                base_stat: Some(*value),
                effort: None,
                stat: named(kind),
            })
            .collect(),
        moves: moves
            .iter()
            .map(|kind| MovePayload { move_: named(kind) })
            .collect(),
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct FakeWire {
    listing: std::result::Result<ListingResponse, String>,
    details: HashMap<i64, DetailResponse>,
    detail_failure: Option<String>,
    hang_on_detail: Option<Arc<AtomicBool>>,
    list_calls: Arc<Mutex<Vec<(u32, u32)>>>,
    detail_calls: Arc<Mutex<Vec<EntityId>>>,
}

impl FakeWire {
    fn new(listing: ListingResponse) -> Self {
        Self {
            listing: Ok(listing),
            details: HashMap::new(),
            detail_failure: None,
            hang_on_detail: None,
            list_calls: Arc::new(Mutex::new(Vec::new())),
            detail_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing_listing(err: impl Into<String>) -> Self {
        let mut wire = Self::new(ListingResponse::default());
        wire.listing = Err(err.into());
        wire
    }

    fn with_detail(mut self, id: i64, detail: DetailResponse) -> Self {
        self.details.insert(id, detail);
        self
    }

    fn with_detail_failure(mut self, err: impl Into<String>) -> Self {
        self.detail_failure = Some(err.into());
        self
    }

    fn hanging_on_detail(mut self, dropped: Arc<AtomicBool>) -> Self {
        self.hang_on_detail = Some(dropped);
        self
    }
}

#[async_trait]
impl WireClient for FakeWire {
    async fn list_entities(
        &self,
        limit: u32,
        offset: u32,
    ) -> std::result::Result<ListingResponse, PipelineError> {
        self.list_calls.lock().await.push((limit, offset));
        self.listing.clone().map_err(PipelineError::transport)
    }

    async fn fetch_entity_detail(
        &self,
        id: EntityId,
    ) -> std::result::Result<DetailResponse, PipelineError> {
        self.detail_calls.lock().await.push(id);
        if let Some(dropped) = &self.hang_on_detail {
            let _guard = DropFlag(Arc::clone(dropped));
            std::future::pending::<()>().await;
        }
        if let Some(err) = &self.detail_failure {
            return Err(PipelineError::transport(err.clone()));
        }
        self.details
            .get(&id.0)
            .cloned()
            .ok_or_else(|| {
                PipelineError::transport(format!("request failed with status 404 for {id}"))
            })
    }
}

/// Reads go to a real store; replaces always fail.
struct ReplaceFailingStore {
    inner: Storage,
}

#[async_trait]
impl CacheStore for ReplaceFailingStore {
    async fn replace_all(&self, _rows: &StoredRowSet) -> anyhow::Result<()> {
        Err(anyhow!("database is locked"))
    }

    async fn read_all(&self) -> anyhow::Result<Option<StoredRowSet>> {
        self.inner.read_all().await
    }

    async fn read_events(&self) -> anyhow::Result<Vec<StoredEvent>> {
        self.inner.read_events().await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.inner.clear().await
    }
}

fn orchestrator(wire: FakeWire, store: Arc<dyn CacheStore>) -> Arc<CacheOrchestrator> {
    Arc::new(CacheOrchestrator::new(
        Arc::new(wire),
        Arc::new(PokeApiMapper),
        store,
    ))
}

async fn seeded_storage() -> (Storage, Entity) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let wire_detail = detail("previous", &[("hp", 1)], &["growl"]);
    let previous = PokeApiMapper.detail_to_entity(&wire_detail);
    storage
        .replace_all(&PokeApiMapper.entity_to_row_set(&previous))
        .await
        .expect("seed cache");
    (storage, previous)
}

#[tokio::test]
async fn refresh_end_to_end_replaces_cache_and_reports_success() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let wire = FakeWire::new(listing_of(&["https://pokeapi.co/api/v2/pokemon/7/"]))
        .with_detail(7, detail("x", &[("hp", 5)], &["tackle"]));
    let detail_calls = Arc::clone(&wire.detail_calls);
    let orchestrator = orchestrator(wire, Arc::new(storage.clone()));

    let states: Vec<ResultState<Entity>> = orchestrator.refresh().collect().await;

    assert_eq!(states.len(), 2);
    assert!(states[0].is_pending());
    let expected = Entity {
        name: "x".into(),
        sprites: Default::default(),
        attributes: vec![shared::domain::Attribute {
            kind: "hp".into(),
            value: 5,
        }],
        events: vec![Event {
            kind: "tackle".into(),
            extra: String::new(),
        }],
    };
    assert_eq!(states[1].succeeded(), Some(&expected));
    assert_eq!(*detail_calls.lock().await, vec![EntityId(7)]);

    let cached: Vec<ResultState<Entity>> = orchestrator.load_cached().collect().await;
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].succeeded(), Some(&expected));
}

#[tokio::test]
async fn refresh_uses_default_listing_window() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let wire = FakeWire::new(listing_of(&["https://pokeapi.co/api/v2/pokemon/1/"]))
        .with_detail(1, detail("bulbasaur", &[], &[]));
    let list_calls = Arc::clone(&wire.list_calls);
    let orchestrator = orchestrator(wire, Arc::new(storage));

    let terminal = orchestrator.refresh_once().await;

    assert!(terminal.succeeded().is_some());
    assert_eq!(*list_calls.lock().await, vec![(100, 0)]);
}

#[tokio::test]
async fn refresh_honours_custom_listing_window() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let wire = FakeWire::new(listing_of(&["https://pokeapi.co/api/v2/pokemon/151/"]))
        .with_detail(151, detail("mew", &[], &[]));
    let list_calls = Arc::clone(&wire.list_calls);
    let orchestrator = Arc::new(
        CacheOrchestrator::new(Arc::new(wire), Arc::new(PokeApiMapper), Arc::new(storage))
            .with_listing_window(ListingWindow {
                limit: 20,
                offset: 140,
            }),
    );

    assert!(orchestrator.refresh_once().await.succeeded().is_some());
    assert_eq!(*list_calls.lock().await, vec![(20, 140)]);
}

#[tokio::test]
async fn empty_listing_fails_with_no_candidates_and_keeps_cache() {
    let (storage, previous) = seeded_storage().await;
    let wire = FakeWire::new(listing_of(&[]));
    let detail_calls = Arc::clone(&wire.detail_calls);
    let orchestrator = orchestrator(wire, Arc::new(storage));

    let states: Vec<ResultState<Entity>> = orchestrator.refresh().collect().await;

    assert_eq!(states.len(), 2);
    assert!(states[0].is_pending());
    assert_eq!(states[1].failure_kind(), Some(FailureKind::NoCandidates));
    assert!(states[1]
        .failure_message()
        .expect("message")
        .contains("no candidates"));
    assert!(detail_calls.lock().await.is_empty());
    assert_eq!(
        orchestrator.load_cached_once().await.into_succeeded(),
        Some(previous)
    );
}

#[tokio::test]
async fn listing_transport_failure_stops_before_detail_fetch() {
    let (storage, previous) = seeded_storage().await;
    let wire = FakeWire::failing_listing("connection refused");
    let detail_calls = Arc::clone(&wire.detail_calls);
    let orchestrator = orchestrator(wire, Arc::new(storage));

    let states: Vec<ResultState<Entity>> = orchestrator.refresh().collect().await;

    assert_eq!(states.len(), 2);
    assert_eq!(states[1].failure_kind(), Some(FailureKind::Transport));
    assert!(detail_calls.lock().await.is_empty());
    assert_eq!(
        orchestrator.load_cached_once().await.into_succeeded(),
        Some(previous)
    );
}

#[tokio::test]
async fn detail_transport_failure_leaves_cache_untouched() {
    let (storage, previous) = seeded_storage().await;
    let wire = FakeWire::new(listing_of(&["https://pokeapi.co/api/v2/pokemon/7/"]))
        .with_detail_failure("request timed out");
    let orchestrator = orchestrator(wire, Arc::new(storage));

    let states: Vec<ResultState<Entity>> = orchestrator.refresh().collect().await;

    assert_eq!(states.len(), 2);
    assert!(states[0].is_pending());
    assert_eq!(states[1].failure_kind(), Some(FailureKind::Transport));
    assert!(states[1]
        .failure_message()
        .expect("message")
        .contains("timed out"));
    assert_eq!(
        orchestrator.load_cached_once().await.into_succeeded(),
        Some(previous)
    );
}

#[tokio::test]
async fn malformed_candidate_url_fails_without_detail_fetch() {
    let (storage, previous) = seeded_storage().await;
    let wire = FakeWire::new(listing_of(&["https://pokeapi.co/api/v2/pokemon/pikachu/"]));
    let detail_calls = Arc::clone(&wire.detail_calls);
    let orchestrator = orchestrator(wire, Arc::new(storage));

    let terminal = orchestrator.refresh_once().await;

    assert_eq!(terminal.failure_kind(), Some(FailureKind::Transport));
    assert!(terminal
        .failure_message()
        .expect("message")
        .contains("malformed candidate url"));
    assert!(detail_calls.lock().await.is_empty());
    assert_eq!(
        orchestrator.load_cached_once().await.into_succeeded(),
        Some(previous)
    );
}

#[tokio::test]
async fn detail_without_name_is_rejected_before_replace() {
    let (storage, previous) = seeded_storage().await;
    let wire = FakeWire::new(listing_of(&["https://pokeapi.co/api/v2/pokemon/3/"]))
        .with_detail(3, DetailResponse::default());
    let orchestrator = orchestrator(wire, Arc::new(storage));

    let terminal = orchestrator.refresh_once().await;

    assert_eq!(terminal.failure_kind(), Some(FailureKind::Transport));
    assert_eq!(
        orchestrator.load_cached_once().await.into_succeeded(),
        Some(previous)
    );
}

#[tokio::test]
async fn store_failure_is_reported_as_storage_failure() {
    let (storage, _previous) = seeded_storage().await;
    let wire = FakeWire::new(listing_of(&["https://pokeapi.co/api/v2/pokemon/7/"]))
        .with_detail(7, detail("x", &[("hp", 5)], &[]));
    let orchestrator = orchestrator(wire, Arc::new(ReplaceFailingStore { inner: storage }));

    let states: Vec<ResultState<Entity>> = orchestrator.refresh().collect().await;

    assert_eq!(states.len(), 2);
    assert_eq!(states[1].failure_kind(), Some(FailureKind::Storage));
    assert!(states[1]
        .failure_message()
        .expect("message")
        .contains("failed to replace cached entity"));
}

#[tokio::test]
async fn load_cached_on_empty_store_succeeds_with_empty_entity() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let orchestrator = orchestrator(FakeWire::new(listing_of(&[])), Arc::new(storage));

    let states: Vec<ResultState<Entity>> = orchestrator.load_cached().collect().await;

    assert_eq!(states.len(), 1);
    let entity = states[0].succeeded().expect("empty success");
    assert!(entity.attributes.is_empty());
    assert!(entity.events.is_empty());
    assert!(entity.is_empty());
}

#[tokio::test]
async fn cached_attribute_order_survives_refresh_and_read_back() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let pikachu = detail(
        "pikachu",
        &[("speed", 90), ("hp", 35), ("attack", 55)],
        &["thunder-shock", "growl", "quick-attack"],
    );
    let listing = listing_of(&["https://pokeapi.co/api/v2/pokemon/25/"]);
    let wire = FakeWire::new(listing).with_detail(25, pikachu);
    let orchestrator = orchestrator(wire, Arc::new(storage));

    let refreshed = orchestrator
        .refresh_once()
        .await
        .into_succeeded()
        .expect("refresh");
    let cached = orchestrator
        .load_cached_once()
        .await
        .into_succeeded()
        .expect("cached");

    let kinds: Vec<&str> = cached.attributes.iter().map(|a| a.kind.as_str()).collect();
    assert_eq!(kinds, vec!["speed", "hp", "attack"]);
    assert_eq!(cached, refreshed);
}

#[tokio::test]
async fn load_cached_events_fails_when_nothing_cached() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let orchestrator = orchestrator(FakeWire::new(listing_of(&[])), Arc::new(storage));

    let states: Vec<ResultState<Vec<Event>>> = orchestrator.load_cached_events().collect().await;

    assert_eq!(states.len(), 2);
    assert!(states[0].is_pending());
    assert_eq!(states[1].failure_kind(), Some(FailureKind::EmptyCache));
}

#[tokio::test]
async fn load_cached_events_returns_events_after_refresh() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let wire = FakeWire::new(listing_of(&["https://pokeapi.co/api/v2/pokemon/7/"]))
        .with_detail(7, detail("squirtle", &[], &["tackle", "tail-whip"]));
    let orchestrator = orchestrator(wire, Arc::new(storage));
    assert!(orchestrator.refresh_once().await.succeeded().is_some());

    let states: Vec<ResultState<Vec<Event>>> = orchestrator.load_cached_events().collect().await;

    let kinds: Vec<String> = states[1]
        .succeeded()
        .expect("events")
        .iter()
        .map(|e| e.kind.clone())
        .collect();
    assert_eq!(kinds, vec!["tackle", "tail-whip"]);
}

#[tokio::test]
async fn dropping_the_stream_abandons_the_in_flight_fetch() {
    let (storage, previous) = seeded_storage().await;
    let dropped = Arc::new(AtomicBool::new(false));
    let wire = FakeWire::new(listing_of(&["https://pokeapi.co/api/v2/pokemon/7/"]))
        .hanging_on_detail(Arc::clone(&dropped));
    let detail_calls = Arc::clone(&wire.detail_calls);
    let orchestrator = orchestrator(wire, Arc::new(storage));

    let mut stream = orchestrator.refresh();
    assert!(stream.next().await.expect("pending").is_pending());

    // Wait until the pipeline is parked inside the detail call.
    tokio::time::timeout(Duration::from_secs(5), async {
        while detail_calls.lock().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("detail call started");

    drop(stream);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("in-flight detail fetch dropped");

    assert_eq!(
        orchestrator.load_cached_once().await.into_succeeded(),
        Some(previous)
    );
}

#[test]
fn select_candidate_on_empty_listing_is_no_candidates() {
    let mut rng = StdRng::seed_from_u64(1);
    let err = select_candidate(&[], &mut rng).expect_err("must fail");
    assert_eq!(err.kind(), FailureKind::NoCandidates);
}

#[test]
fn select_candidate_reaches_every_item() {
    let candidates: Vec<Candidate> = (1..=3)
        .map(|id| Candidate::new(format!("https://pokeapi.co/api/v2/pokemon/{id}/")))
        .collect();
    let mut rng = StdRng::seed_from_u64(7);

    let mut seen = std::collections::HashSet::new();
    for _ in 0..300 {
        seen.insert(select_candidate(&candidates, &mut rng).expect("id"));
    }

    assert_eq!(
        seen,
        [EntityId(1), EntityId(2), EntityId(3)].into_iter().collect()
    );
}
