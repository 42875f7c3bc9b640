//! Server-owned runs, de-duplicated by run key.

use super::{run_key, RunLog, RunSubscriber};
use crate::core::{RunInput, RunStatus, StreamEvent};
use crate::events::{EventSink, FanoutEventSink};
use crate::pipeline::Pipeline;
use crate::utils::generate_run_id;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A reference to a run in flight (or just finished).
#[derive(Debug, Clone)]
pub struct RunHandle {
    key: String,
    run_id: Uuid,
    log: Arc<RunLog>,
    joined: bool,
}

impl RunHandle {
    /// Returns the run key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns true if this handle joined a run started by someone else.
    #[must_use]
    pub fn joined(&self) -> bool {
        self.joined
    }

    /// Returns the run's event log.
    #[must_use]
    pub fn log(&self) -> &Arc<RunLog> {
        &self.log
    }

    /// Subscribes to the run from its first event.
    #[must_use]
    pub fn subscribe(&self) -> RunSubscriber {
        self.log.subscribe()
    }

    /// Waits for the run to finish and returns its status.
    pub async fn wait(&self) -> RunStatus {
        let mut subscriber = self.subscribe();
        while subscriber.next().await.is_some() {}
        self.log.status()
    }
}

/// Owns every run of one pipeline in this process.
///
/// Runs execute on detached tasks: a client going away stops delivery, not
/// generation or persistence.
#[derive(Clone)]
pub struct RunRegistry {
    pipeline: Arc<Pipeline>,
    runs: Arc<DashMap<String, RunHandle>>,
    mirror: Option<Arc<dyn EventSink>>,
}

impl RunRegistry {
    /// Creates a registry for a pipeline.
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            runs: Arc::new(DashMap::new()),
            mirror: None,
        }
    }

    /// Also forwards every event of every run to `sink`.
    #[must_use]
    pub fn with_mirror(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.mirror = Some(sink);
        self
    }

    /// Joins the in-flight run for `input`, or starts a new one.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start_or_join(&self, input: RunInput) -> RunHandle {
        let key = run_key(&input);
        let handle = match self.runs.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let mut handle = entry.get().clone();
                handle.joined = true;
                info!(run_id = %handle.run_id, key = %key, "Joined in-flight run");
                return handle;
            }
            Entry::Vacant(entry) => {
                let handle = RunHandle {
                    key: key.clone(),
                    run_id: generate_run_id(),
                    log: Arc::new(RunLog::new()),
                    joined: false,
                };
                entry.insert(handle.clone());
                handle
            }
        };

        self.spawn(handle.clone(), input);
        handle
    }

    /// Returns the in-flight run with this key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<RunHandle> {
        self.runs.get(key).map(|entry| entry.value().clone())
    }

    /// Returns the number of runs in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if no run is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    fn spawn(&self, handle: RunHandle, input: RunInput) {
        let pipeline = Arc::clone(&self.pipeline);
        let runs = Arc::clone(&self.runs);
        let mut sink = FanoutEventSink::new().with(handle.log.clone());
        if let Some(mirror) = &self.mirror {
            sink = sink.with(Arc::clone(mirror));
        }
        let sink = Arc::new(sink);

        info!(run_id = %handle.run_id, key = %handle.key, "Starting run");
        tokio::spawn(async move {
            let run_id = handle.run_id;
            let run_sink = Arc::clone(&sink);
            let task = tokio::spawn(async move {
                pipeline.run_with_id(run_id, input, run_sink.as_ref()).await
            });

            match task.await {
                Ok(Ok(run)) => {
                    debug!(run_id = %run.run_id, persisted = run.persisted, "Run task finished");
                }
                Ok(Err(e)) => warn!(run_id = %run_id, error = %e, "Run task failed"),
                Err(e) => {
                    error!(run_id = %run_id, error = %e, "Run task aborted");
                    sink.emit(StreamEvent::error(format!("Run aborted: {e}"), None))
                        .await;
                }
            }

            // Always release the key and wake subscribers, even after a panic.
            runs.remove_if(&handle.key, |_, current| current.run_id == run_id);
            handle.log.finish();
        });
    }
}

impl std::fmt::Debug for RunRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRegistry")
            .field("pipeline", &self.pipeline.name())
            .field("runs", &self.runs.len())
            .finish_non_exhaustive()
    }
}
