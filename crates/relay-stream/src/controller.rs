//! Controller facade.
//!
//! [`StreamingController`] is the caller-facing handle of one streaming
//! session. It forwards commands over a channel to a dedicated session task
//! that owns the state record, the throttle timer, and the mutation queue,
//! so all session state is touched from a single serialized context.
//!
//! ```text
//! queue_partial_update ──┐
//! finalize / wait / ...  ├─► session task ─► MutationQueue worker ─► EntityTransport
//! throttle deadline ─────┘        │
//!                                 └─► stats (watch) / on_segment_finalized
//! ```

use std::sync::Arc;

use futures::FutureExt;
use relay_core::SessionId;
use relay_settings::{RenderSurface, StreamingSettings};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, debug, info_span};

use crate::clock::{Clock, TokioClock};
use crate::lifecycle::SessionWorker;
use crate::transport::{DeliveryTarget, EntityTransport};
use crate::types::{FinalizeOutcome, SegmentCallback, SegmentFinalized, StreamStats};

/// Requests handled by the session task.
enum Command {
    Partial(String),
    EnsurePlaceholder(oneshot::Sender<()>),
    Finalize {
        text: String,
        reply: oneshot::Sender<FinalizeOutcome>,
    },
    WaitIdle(oneshot::Sender<()>),
    CleanupAbandoned(oneshot::Sender<()>),
    CloseIfNeeded(oneshot::Sender<()>),
}

/// Builder for [`StreamingController`].
pub struct ControllerBuilder {
    transport: Arc<dyn EntityTransport>,
    target: DeliveryTarget,
    settings: StreamingSettings,
    clock: Arc<dyn Clock>,
    on_segment_finalized: Option<SegmentCallback>,
}

impl ControllerBuilder {
    /// Use `settings` instead of the defaults.
    #[must_use]
    pub fn settings(mut self, settings: StreamingSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use a custom time source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register the segment-finalized callback.
    #[must_use]
    pub fn on_segment_finalized(
        mut self,
        callback: impl Fn(SegmentFinalized) + Send + Sync + 'static,
    ) -> Self {
        self.on_segment_finalized = Some(Arc::new(callback));
        self
    }

    /// Spawn the session task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> StreamingController {
        let session_id = SessionId::new();
        let span = info_span!(
            "stream_session",
            session_id = %session_id,
            conversation_id = %self.target.conversation_id,
            surface = ?self.settings.render_surface,
        );
        let enabled = self.settings.enabled;
        let disable_block_streaming = self.settings.disable_block_streaming;
        let surface = self.settings.render_surface;

        let worker = span.in_scope(|| {
            SessionWorker::new(
                self.transport,
                Arc::clone(&self.clock),
                self.settings,
                self.target,
                self.on_segment_finalized,
            )
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(worker.stats());
        let _ = tokio::spawn(run_session(worker, rx, stats_tx, self.clock).instrument(span));

        StreamingController {
            session_id,
            tx,
            stats: stats_rx,
            enabled,
            disable_block_streaming,
            surface,
        }
    }
}

/// Handle to one streaming session.
///
/// Dropping the handle stops the session task once queued commands drain;
/// in-flight retries still run to completion or exhaustion.
pub struct StreamingController {
    session_id: SessionId,
    tx: mpsc::UnboundedSender<Command>,
    stats: watch::Receiver<StreamStats>,
    enabled: bool,
    disable_block_streaming: bool,
    surface: RenderSurface,
}

impl StreamingController {
    /// Start building a controller delivering into `target`.
    pub fn builder(transport: Arc<dyn EntityTransport>, target: DeliveryTarget) -> ControllerBuilder {
        ControllerBuilder {
            transport,
            target,
            settings: StreamingSettings::default(),
            clock: Arc::new(TokioClock),
            on_segment_finalized: None,
        }
    }

    /// Offer the latest full snapshot of the generated text. Never blocks.
    pub fn queue_partial_update(&self, text: impl Into<String>) {
        if !self.enabled {
            return;
        }
        if self.tx.send(Command::Partial(text.into())).is_err() {
            debug!("partial update dropped: session stopped");
        }
    }

    /// Create the entity with placeholder content when configured to.
    pub async fn ensure_placeholder_if_configured(&self) {
        let _ = self.request(Command::EnsurePlaceholder).await;
    }

    /// Deliver the final text.
    ///
    /// `handled == false` means nothing was streamed successfully and the
    /// caller must deliver `text` itself.
    pub async fn finalize(&self, text: impl Into<String>) -> FinalizeOutcome {
        if !self.enabled {
            return FinalizeOutcome::not_handled();
        }
        let text = text.into();
        self.request(|reply| Command::Finalize { text, reply })
            .await
            .unwrap_or_else(FinalizeOutcome::not_handled)
    }

    /// Wait until the throttle is drained and no mutation is in flight.
    pub async fn wait_for_idle(&self) {
        let _ = self.request(Command::WaitIdle).await;
    }

    /// Clear or delete an entity that never received real content.
    pub async fn cleanup_abandoned_placeholder(&self) {
        let _ = self.request(Command::CleanupAbandoned).await;
    }

    /// Close a live entity that was neither finalized nor closed.
    pub async fn close_if_needed(&self) {
        let _ = self.request(Command::CloseIfNeeded).await;
    }

    /// Whether callers should turn off block-mode delivery while this streams.
    pub fn disables_block_streaming(&self) -> bool {
        self.enabled && self.disable_block_streaming
    }

    /// Identifier carried by this session's log span.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Surface this session renders into.
    pub fn render_surface(&self) -> RenderSurface {
        self.surface
    }

    /// Latest observability snapshot.
    pub fn stats(&self) -> StreamStats {
        self.stats.borrow().clone()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(command(reply)).is_err() {
            debug!("request dropped: session stopped");
            return None;
        }
        rx.await.ok()
    }
}

/// Session task: serializes commands and throttle firings.
async fn run_session(
    mut worker: SessionWorker,
    mut rx: mpsc::UnboundedReceiver<Command>,
    stats: watch::Sender<StreamStats>,
    clock: Arc<dyn Clock>,
) {
    loop {
        let timer = match worker.deadline() {
            Some(deadline) => clock.sleep_until(deadline),
            None => futures::future::pending().boxed(),
        };
        tokio::select! {
            biased;
            () = timer => worker.on_timer().await,
            command = rx.recv() => {
                let Some(command) = command else { break };
                dispatch(&mut worker, &stats, command).await;
            }
        }
        publish(&worker, &stats);
    }
    debug!("stream session stopped");
}

fn publish(worker: &SessionWorker, stats: &watch::Sender<StreamStats>) {
    let _ = stats.send_replace(worker.stats());
}

/// Run one command. Stats are published before the caller is answered.
async fn dispatch(worker: &mut SessionWorker, stats: &watch::Sender<StreamStats>, command: Command) {
    match command {
        Command::Partial(text) => worker.offer(&text),
        Command::EnsurePlaceholder(reply) => {
            worker.ensure_placeholder().await;
            publish(worker, stats);
            let _ = reply.send(());
        }
        Command::Finalize { text, reply } => {
            let outcome = worker.finalize(&text).await;
            publish(worker, stats);
            let _ = reply.send(outcome);
        }
        Command::WaitIdle(reply) => {
            worker.wait_idle().await;
            publish(worker, stats);
            let _ = reply.send(());
        }
        Command::CleanupAbandoned(reply) => {
            worker.cleanup_abandoned_placeholder().await;
            publish(worker, stats);
            let _ = reply.send(());
        }
        Command::CloseIfNeeded(reply) => {
            worker.close_if_needed().await;
            publish(worker, stats);
            let _ = reply.send(());
        }
    }
}
