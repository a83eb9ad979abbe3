//! Generation coordinator: cache lookup plus single-flight de-duplication
//!
//! For any cache key at most one inference call is in flight per process.
//! The first caller with no cached or in-flight result becomes the leader:
//! it registers a handle in the in-flight registry, runs the model call on
//! its own task, persists exactly one summary row, and publishes the
//! outcome to every waiter attached to the handle. Concurrent callers for
//! the same key attach to that handle instead of issuing their own call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use discharge_core::{CacheKey, GenerationError, GenerationRequest, Summary};

use super::client::InferenceBackend;
use crate::db::SummaryStore;

type Outcome = Result<Summary, GenerationError>;

/// Handle shared by every caller waiting on one in-flight generation.
#[derive(Clone)]
struct InFlight {
    /// Distinguishes this handle from a successor for the same key, so a
    /// timed-out waiter never evicts a newer leader's registry entry.
    epoch: u64,
    rx: watch::Receiver<Option<Outcome>>,
}

pub struct Coordinator<B, S> {
    inner: Arc<Inner<B, S>>,
}

impl<B, S> Clone for Coordinator<B, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<B, S> {
    backend: B,
    store: S,
    wait_bound: Duration,
    epochs: AtomicU64,
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,
}

impl<B, S> Coordinator<B, S>
where
    B: InferenceBackend,
    S: SummaryStore,
{
    pub fn new(backend: B, store: S, wait_bound: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                wait_bound,
                epochs: AtomicU64::new(0),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Return a cached summary or coordinate a fresh generation.
    ///
    /// `force_refresh` skips the cache-hit check but still participates in
    /// de-duplication: concurrent refreshes for one key share one call.
    pub async fn get_or_create(
        &self,
        request: GenerationRequest,
        force_refresh: bool,
    ) -> Result<Summary, GenerationError> {
        let key = request.cache_key();

        if !force_refresh {
            if let Some(existing) = self.inner.store.find_completed(&key).await? {
                metrics::counter!("summary_cache_hits_total").increment(1);
                tracing::debug!(hadm_id = request.hadm_id, cache_key = %key, "Summary cache hit");
                return Ok(existing);
            }
        }

        let entry = self.join_or_lead(&key, request);
        self.wait(&key, entry).await
    }

    /// Atomically attach to an existing in-flight handle, or register a new
    /// one and start leading the generation for this key. Insertion is the
    /// only way a handle appears in the registry, and it happens under the
    /// same lock as the lookup, so two leaders can never be elected.
    fn join_or_lead(&self, key: &CacheKey, request: GenerationRequest) -> InFlight {
        let (tx, entry) = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .expect("in-flight registry lock poisoned");

            if let Some(existing) = in_flight.get(key) {
                metrics::counter!("summary_generation_waiters_total").increment(1);
                return existing.clone();
            }

            let (tx, rx) = watch::channel(None);
            let entry = InFlight {
                epoch: self.inner.epochs.fetch_add(1, Ordering::Relaxed),
                rx,
            };
            in_flight.insert(key.clone(), entry.clone());
            (tx, entry)
        };

        metrics::counter!("summary_generations_total").increment(1);

        // The leader's work runs on its own task: cancelling the HTTP
        // request that started it must not abort a model call that is
        // already being paid for, and followers keep a live handle.
        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        let epoch = entry.epoch;
        tokio::spawn(async move {
            let outcome = run_generation(&inner, &request).await;
            clear_entry(&inner, &key, epoch);
            // Send fails only when no receiver is left, which is fine.
            let _ = tx.send(Some(outcome));
        });

        entry
    }

    /// Wait on an in-flight handle, bounded by the configured wait budget.
    /// On expiry the registry entry is cleared so the next request for the
    /// key can elect a fresh leader.
    async fn wait(&self, key: &CacheKey, mut entry: InFlight) -> Outcome {
        let epoch = entry.epoch;
        match tokio::time::timeout(self.inner.wait_bound, entry.rx.wait_for(|v| v.is_some())).await
        {
            Ok(Ok(published)) => match (*published).clone() {
                Some(outcome) => outcome,
                None => Err(GenerationError::Timeout),
            },
            Ok(Err(_sender_dropped)) => {
                // The leader task went away without publishing.
                clear_entry(&self.inner, key, epoch);
                metrics::counter!("summary_generation_timeouts_total").increment(1);
                Err(GenerationError::Timeout)
            }
            Err(_elapsed) => {
                clear_entry(&self.inner, key, epoch);
                metrics::counter!("summary_generation_timeouts_total").increment(1);
                tracing::warn!(cache_key = %key, "Timed out waiting on in-flight generation");
                Err(GenerationError::Timeout)
            }
        }
    }
}

/// Run the model call and persist exactly one summary row for it,
/// `completed` on success or `failed` with the upstream detail.
async fn run_generation<B, S>(inner: &Inner<B, S>, request: &GenerationRequest) -> Outcome
where
    B: InferenceBackend,
    S: SummaryStore,
{
    let started = Instant::now();

    match inner.backend.generate(request).await {
        Ok(output) => {
            let summary = Summary::completed(request, output.text, started.elapsed().as_secs_f64());
            tracing::info!(
                hadm_id = request.hadm_id,
                summary_id = %summary.id,
                attempts = output.attempts,
                "Summary generated"
            );
            match inner.store.insert(&summary).await {
                Ok(()) => Ok(summary),
                Err(err) => {
                    tracing::error!(
                        hadm_id = request.hadm_id,
                        error = %err,
                        "Failed to persist generated summary"
                    );
                    Err(GenerationError::from(err))
                }
            }
        }
        Err(err) => {
            metrics::counter!("summary_generation_failures_total").increment(1);
            tracing::warn!(
                hadm_id = request.hadm_id,
                attempts = err.attempts,
                error = %err,
                "Inference failed"
            );
            let summary = Summary::failed(request, err.message.clone(), started.elapsed().as_secs_f64());
            // The failed row is an audit record, never served as a cache
            // hit; losing the write only loses that record.
            if let Err(store_err) = inner.store.insert(&summary).await {
                tracing::warn!(error = %store_err, "Failed to persist failed-generation row");
            }
            Err(GenerationError::Inference {
                transient: err.is_transient(),
                message: err.message,
                attempts: err.attempts,
            })
        }
    }
}

/// Remove the registry entry for `key` if it still belongs to `epoch`.
fn clear_entry<B, S>(inner: &Inner<B, S>, key: &CacheKey, epoch: u64) {
    let mut in_flight = inner
        .in_flight
        .lock()
        .expect("in-flight registry lock poisoned");
    if in_flight.get(key).is_some_and(|e| e.epoch == epoch) {
        in_flight.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::{InferenceError, InferenceOutput};
    use discharge_core::{GenerationParams, StoreError, SummaryStatus};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    /// Scripted inference backend: pops one response per call, falling
    /// back to a canned success once the script is exhausted.
    #[derive(Clone, Default)]
    struct MockBackend {
        calls: Arc<AtomicU32>,
        script: Arc<Mutex<VecDeque<MockResponse>>>,
        delay: Duration,
    }

    enum MockResponse {
        Text(String),
        Terminal(String),
        Hang,
    }

    impl MockBackend {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn push(&self, response: MockResponse) {
            self.script.lock().unwrap().push_back(response);
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl InferenceBackend for MockBackend {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<InferenceOutput, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            match next {
                None => Ok(InferenceOutput {
                    text: "generated summary".to_string(),
                    attempts: 1,
                }),
                Some(MockResponse::Text(text)) => Ok(InferenceOutput { text, attempts: 1 }),
                Some(MockResponse::Terminal(message)) => {
                    Err(InferenceError::terminal(message, Some(400)).with_attempts(1))
                }
                Some(MockResponse::Hang) => std::future::pending().await,
            }
        }
    }

    /// In-memory summary store.
    #[derive(Clone, Default)]
    struct MemoryStore {
        rows: Arc<Mutex<Vec<Summary>>>,
    }

    impl MemoryStore {
        fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        fn push(&self, summary: Summary) {
            self.rows.lock().unwrap().push(summary);
        }
    }

    impl SummaryStore for MemoryStore {
        async fn find_completed(&self, key: &CacheKey) -> Result<Option<Summary>, StoreError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|s| s.status == SummaryStatus::Completed && &s.cache_key == key)
                .cloned())
        }

        async fn insert(&self, summary: &Summary) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|s| s.id == summary.id) {
                return Err(StoreError::Duplicate(summary.id.to_string()));
            }
            rows.push(summary.clone());
            Ok(())
        }
    }

    fn request(hadm_id: i64) -> GenerationRequest {
        GenerationRequest {
            hadm_id,
            source_text: "Patient presented with chest pain, discharged stable.".to_string(),
            original_length: 53,
            model: "m42-health/Llama3-Med42-8B".to_string(),
            params: GenerationParams::default(),
        }
    }

    fn coordinator(
        backend: MockBackend,
        store: MemoryStore,
        wait_bound: Duration,
    ) -> Coordinator<MockBackend, MemoryStore> {
        Coordinator::new(backend, store, wait_bound)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_call() {
        let backend = MockBackend::with_delay(Duration::from_millis(50));
        let store = MemoryStore::default();
        let coord = coordinator(backend.clone(), store.clone(), Duration::from_secs(5));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coord = coord.clone();
            handles.push(tokio::spawn(async move {
                coord.get_or_create(request(1), false).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            let summary = handle.await.unwrap().unwrap();
            ids.push(summary.id);
        }

        assert_eq!(backend.calls(), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]), "all callers got the same row");
        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn cache_hit_never_calls_backend() {
        let backend = MockBackend::default();
        let store = MemoryStore::default();

        let req = request(2);
        let cached = Summary::completed(&req, "existing summary".to_string(), 0.8);
        store.push(cached.clone());

        let coord = coordinator(backend.clone(), store, Duration::from_secs(5));
        let result = coord.get_or_create(req, false).await.unwrap();

        assert_eq!(result.id, cached.id);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn force_refresh_creates_a_new_row() {
        let backend = MockBackend::default();
        let store = MemoryStore::default();

        let req = request(3);
        let old = Summary::completed(&req, "stale summary".to_string(), 0.8);
        store.push(old.clone());

        let coord = coordinator(backend.clone(), store.clone(), Duration::from_secs(5));
        let fresh = coord.get_or_create(req.clone(), true).await.unwrap();

        assert_ne!(fresh.id, old.id);
        assert_eq!(backend.calls(), 1);
        assert_eq!(store.row_count(), 2, "old row is retained as history");

        // A plain lookup now serves the newest completed row.
        let hit = coord.get_or_create(req, false).await.unwrap();
        assert_eq!(hit.id, fresh.id);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_force_refresh_deduplicates() {
        let backend = MockBackend::with_delay(Duration::from_millis(50));
        let store = MemoryStore::default();

        let req = request(4);
        store.push(Summary::completed(&req, "stale".to_string(), 0.1));

        let coord = coordinator(backend.clone(), store.clone(), Duration::from_secs(5));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let coord = coord.clone();
            let req = req.clone();
            handles.push(tokio::spawn(
                async move { coord.get_or_create(req, true).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(backend.calls(), 1);
        assert_eq!(store.row_count(), 2);
    }

    #[tokio::test]
    async fn hung_leader_times_out_waiters_and_clears_the_slot() {
        let backend = MockBackend::default();
        backend.push(MockResponse::Hang);
        backend.push(MockResponse::Text("second attempt".to_string()));
        let store = MemoryStore::default();

        let coord = coordinator(backend.clone(), store, Duration::from_millis(50));

        let err = coord.get_or_create(request(5), false).await.unwrap_err();
        assert_eq!(err, GenerationError::Timeout);

        // The registry entry was cleared, so this caller leads a fresh run.
        let summary = coord.get_or_create(request(5), false).await.unwrap();
        assert_eq!(summary.text.as_deref(), Some("second attempt"));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn terminal_failure_is_recorded_and_not_cached() {
        let backend = MockBackend::default();
        backend.push(MockResponse::Terminal("401 unauthorized".to_string()));
        let store = MemoryStore::default();

        let coord = coordinator(backend.clone(), store.clone(), Duration::from_secs(5));
        let err = coord.get_or_create(request(6), false).await.unwrap_err();

        match err {
            GenerationError::Inference {
                attempts,
                transient,
                ..
            } => {
                assert_eq!(attempts, 1);
                assert!(!transient);
            }
            other => panic!("expected inference error, got {:?}", other),
        }

        // A failed row was written for the audit trail...
        assert_eq!(store.row_count(), 1);
        assert_eq!(
            store.rows.lock().unwrap()[0].status,
            SummaryStatus::Failed
        );

        // ...but it is not a cache hit: the next request runs again.
        coord.get_or_create(request(6), false).await.unwrap();
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn distinct_keys_generate_in_parallel() {
        let backend = MockBackend::with_delay(Duration::from_millis(50));
        let store = MemoryStore::default();
        let coord = coordinator(backend.clone(), store.clone(), Duration::from_secs(5));

        let a = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.get_or_create(request(7), false).await })
        };
        let b = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.get_or_create(request(8), false).await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(backend.calls(), 2);
        assert_eq!(store.row_count(), 2);
    }
}
