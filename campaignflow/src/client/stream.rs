//! Client-side subscription to a streamed run.

use super::{ClientStatus, FieldSnapshot, FieldStore, FrameDecoder, RunView};
use crate::cancellation::CancellationToken;
use crate::config::ClientConfig;
use crate::core::StreamEvent;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, warn};

/// A live subscription to one run.
///
/// Clones observe the same run. The primary [`RunView`] changes only on
/// rare events; partial fields go to the shared [`FieldStore`].
#[derive(Debug, Clone)]
pub struct RunSubscription {
    key: String,
    view: watch::Receiver<RunView>,
    token: CancellationToken,
    fields: FieldStore,
}

impl RunSubscription {
    /// Returns the run key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns a copy of the current render state.
    #[must_use]
    pub fn view(&self) -> RunView {
        self.view.borrow().clone()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        self.view.borrow().status
    }

    /// Returns true once the subscription reached a terminal status.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Returns the field store this subscription writes to.
    #[must_use]
    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    /// Returns a receiver notified on every render state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<RunView> {
        self.view.clone()
    }

    /// Stops reading. The run itself is not affected.
    pub fn cancel(&self) -> bool {
        self.token.cancel("cancelled by user")
    }

    /// Waits for a terminal status and returns the final render state.
    pub async fn wait(&self) -> RunView {
        let mut view = self.view.clone();
        if let Ok(state) = view.wait_for(|v| v.status.is_terminal()).await {
            return state.clone();
        }
        let last = view.borrow().clone();
        last
    }
}

/// Owns at most one active subscription.
///
/// Starting a different run cancels the previous one and clears the field
/// store; starting the same unfinished run again returns the existing
/// subscription.
#[derive(Debug)]
pub struct StreamClient {
    config: ClientConfig,
    fields: FieldStore,
    active: Mutex<Option<RunSubscription>>,
}

impl StreamClient {
    /// Creates a client.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let fields = FieldStore::new(config.frame_budget());
        Self {
            config,
            fields,
            active: Mutex::new(None),
        }
    }

    /// Returns the field store shared by every subscription of this client.
    #[must_use]
    pub fn field_store(&self) -> &FieldStore {
        &self.fields
    }

    /// Returns the key of the active subscription.
    #[must_use]
    pub fn active_key(&self) -> Option<String> {
        self.active.lock().as_ref().map(|s| s.key.clone())
    }

    /// Subscribes to the run behind `reader`.
    ///
    /// Must be called within a tokio runtime.
    pub fn start<R>(&self, key: impl Into<String>, reader: R) -> RunSubscription
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let key = key.into();
        let mut active = self.active.lock();

        if let Some(existing) = active.as_ref() {
            if existing.key == key && !existing.is_finished() {
                debug!(key = %key, "Reusing active subscription");
                return existing.clone();
            }
            existing.cancel();
        }

        self.fields.clear();
        let epoch = self.fields.epoch();
        let (sender, receiver) = watch::channel(RunView::default());
        let subscription = RunSubscription {
            key: key.clone(),
            view: receiver,
            token: CancellationToken::new(),
            fields: self.fields.clone(),
        };

        tokio::spawn(read_loop(
            reader,
            sender,
            FieldWriter {
                fields: self.fields.clone(),
                epoch,
            },
            subscription.token.clone(),
            self.config.read_buffer_bytes.max(1),
        ));

        debug!(key = %key, "Subscription started");
        *active = Some(subscription.clone());
        subscription
    }

    /// Cancels the active subscription. Returns false if there was none.
    pub fn cancel(&self) -> bool {
        self.active
            .lock()
            .take()
            .map_or(false, |subscription| subscription.cancel())
    }
}

impl Default for StreamClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

/// The field store as seen by one subscription: writes stop landing once
/// the store is cleared for another run.
#[derive(Debug, Clone)]
struct FieldWriter {
    fields: FieldStore,
    epoch: u64,
}

async fn read_loop<R>(
    mut reader: R,
    view: watch::Sender<RunView>,
    writer: FieldWriter,
    token: CancellationToken,
    buffer_bytes: usize,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut decoder = FrameDecoder::new();
    let mut buffer = vec![0u8; buffer_bytes];

    'read: loop {
        let read = tokio::select! {
            biased;
            () = token.cancelled() => {
                view.send_modify(|v| v.status = ClientStatus::Cancelled);
                break;
            }
            read = reader.read(&mut buffer) => read,
        };

        let n = match read {
            Ok(0) => {
                view.send_modify(|v| {
                    v.status = ClientStatus::Failed;
                    v.error = Some("Stream ended before the run finished".to_string());
                });
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Stream read failed");
                view.send_modify(|v| {
                    v.status = ClientStatus::Failed;
                    v.error = Some(format!("Connection lost: {e}"));
                });
                break;
            }
        };

        for frame in decoder.feed(&buffer[..n]) {
            if token.is_cancelled() {
                view.send_modify(|v| v.status = ClientStatus::Cancelled);
                break 'read;
            }
            let event = match StreamEvent::from_frame(&frame.event, &frame.data) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(event = %frame.event, "Skipping unknown event");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable frame");
                    continue;
                }
            };

            let terminal = event.is_terminal();
            match event {
                StreamEvent::AgentToken(payload) => {
                    let stage = payload.agent.clone();
                    writer.fields.update_in(writer.epoch, stage, FieldSnapshot::from(payload));
                }
                StreamEvent::AgentStart(ref payload) => {
                    writer.fields.reset_in(writer.epoch, &payload.agent);
                    view.send_modify(|v| {
                        v.apply(&event);
                    });
                }
                other => {
                    view.send_modify(|v| {
                        v.apply(&other);
                    });
                }
            }

            if terminal {
                break 'read;
            }
        }
    }

    writer.fields.flush();
}
