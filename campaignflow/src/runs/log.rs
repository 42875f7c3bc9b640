//! Append-only event log of one run.

use crate::core::{RunStatus, StreamEvent};
use crate::events::EventSink;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LogState {
    len: usize,
    finished: bool,
}

/// The event sink a run reports to.
///
/// Subscribers replay from the first event and then follow live events, so
/// a late or reconnecting subscriber sees the whole run.
#[derive(Debug)]
pub struct RunLog {
    events: RwLock<Vec<StreamEvent>>,
    state: watch::Sender<LogState>,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(LogState::default());
        Self {
            events: RwLock::new(Vec::new()),
            state,
        }
    }

    /// Returns the number of events so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was logged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns a copy of every event so far.
    #[must_use]
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.read().clone()
    }

    /// Returns true once the run stopped producing events.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.borrow().finished
    }

    /// Returns the run status as seen through its events.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        let events = self.events.read();
        match events.iter().rev().find(|e| e.is_terminal()) {
            Some(StreamEvent::Complete(_)) => RunStatus::Complete,
            Some(_) => RunStatus::Failed,
            None if self.is_finished() => RunStatus::Failed,
            None => RunStatus::Running,
        }
    }

    /// Marks the run finished and wakes every subscriber.
    pub fn finish(&self) {
        self.state.send_modify(|state| state.finished = true);
    }

    /// Subscribes from the first event.
    #[must_use]
    pub fn subscribe(self: &Arc<Self>) -> RunSubscriber {
        RunSubscriber {
            log: Arc::clone(self),
            state: self.state.subscribe(),
            cursor: 0,
        }
    }

    fn event_at(&self, index: usize) -> Option<StreamEvent> {
        self.events.read().get(index).cloned()
    }

    fn push(&self, event: StreamEvent) {
        let len = {
            let mut events = self.events.write();
            events.push(event);
            events.len()
        };
        self.state.send_modify(|state| state.len = len);
    }
}

#[async_trait]
impl EventSink for RunLog {
    async fn emit(&self, event: StreamEvent) {
        self.push(event);
    }
}

/// A cursor over a run's events.
#[derive(Debug)]
pub struct RunSubscriber {
    log: Arc<RunLog>,
    state: watch::Receiver<LogState>,
    cursor: usize,
}

impl RunSubscriber {
    /// Returns the next event, waiting for it if needed.
    ///
    /// Returns `None` once every event was seen and the run finished.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        loop {
            // Read the flag first: events pushed before `finish` are then
            // guaranteed visible to the lookup below.
            let finished = self.log.is_finished();
            if let Some(event) = self.log.event_at(self.cursor) {
                self.cursor += 1;
                return Some(event);
            }
            if finished {
                return None;
            }
            if self.state.changed().await.is_err() {
                let event = self.log.event_at(self.cursor)?;
                self.cursor += 1;
                return Some(event);
            }
        }
    }

    /// Returns how many events were consumed.
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor
    }
}
