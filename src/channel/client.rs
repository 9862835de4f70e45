use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info, warn};

use super::{
    Backoff, BackoffPolicy, ChatMessage, ConsoleApi, Identity, InboundStream, OutboundMessage,
    TransportError,
};
use crate::bridge::{BridgeStatus, Reply};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// What the reader thread hands to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Message(ChatMessage),
    Shutdown,
}

/// How one subscription ended.
enum Ended {
    ServerClosed,
    Failed(TransportError),
    ReceiverGone,
    Shutdown,
}

/// Live connection to the Console.
///
/// Owns the reader thread, the reconnect schedule and all connection-state
/// writes to [`BridgeStatus`]. Cheap to clone; clones share the shutdown flag.
#[derive(Clone)]
pub struct ChannelClient {
    api: Arc<dyn ConsoleApi>,
    identity: Identity,
    mention: String,
    status: Arc<BridgeStatus>,
    policy: BackoffPolicy,
    send_attempts: u32,
    retry_delay: Duration,
    shutdown: Arc<AtomicBool>,
    handler: Option<Sender<BridgeEvent>>,
}

impl ChannelClient {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        identity: Identity,
        mention: &str,
        status: Arc<BridgeStatus>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            api,
            identity,
            mention: mention.to_string(),
            status,
            policy,
            send_attempts: 3,
            retry_delay: DEFAULT_RETRY_DELAY,
            shutdown: Arc::new(AtomicBool::new(false)),
            handler: None,
        }
    }

    /// Outbound attempts per reply and the pause between them.
    pub fn with_send_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.send_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Register where inbound messages go. Messages are forwarded in the
    /// order the Console emitted them.
    pub fn on_message(&mut self, handler: Sender<BridgeEvent>) {
        self.handler = Some(handler);
    }

    /// Start the reader thread. It keeps reconnecting until [`disconnect`]
    /// or [`request_shutdown`] is called, or the handler is dropped.
    ///
    /// [`disconnect`]: Self::disconnect
    /// [`request_shutdown`]: Self::request_shutdown
    pub fn connect(&self) -> anyhow::Result<JoinHandle<()>> {
        let handler = self
            .handler
            .clone()
            .context("no message handler registered before connect")?;
        let client = self.clone();
        thread::Builder::new()
            .name("channel-reader".into())
            .spawn(move || client.read_loop(&handler))
            .context("spawning channel reader thread")
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Post a reply, retrying on failure. A reply that still fails is
    /// dropped and recorded as the last error.
    pub fn send(&self, reply: &Reply) -> Result<(), TransportError> {
        let message = OutboundMessage::response(&reply.sender, &reply.text);
        self.post_with_retry(&message)
    }

    /// Scripted online message, sent after every successful connect.
    pub fn announce_presence(&self) -> bool {
        let text = format!(
            "{} online. Type `{} help` for commands.",
            self.identity.name, self.mention
        );
        match self.api.post(&OutboundMessage::status(&self.identity, &text)) {
            Ok(()) => {
                info!(agent = %self.identity.id, "presence announced");
                true
            }
            Err(e) => {
                warn!(agent = %self.identity.id, error = %e, "presence announcement failed");
                self.status.record_error(format!("presence announcement failed: {e}"));
                false
            }
        }
    }

    /// Best-effort offline announcement; stops the reader from reconnecting.
    pub fn disconnect(&self) {
        self.request_shutdown();
        let text = format!("{} going offline.", self.identity.name);
        if let Err(e) = self.api.post(&OutboundMessage::status(&self.identity, &text)) {
            warn!(error = %e, "offline announcement failed");
        }
        self.status.set_disconnected(None);
        info!(agent = %self.identity.id, "disconnected");
    }

    fn post_with_retry(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let mut attempt = 1;
        loop {
            match self.api.post(message) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.send_attempts => {
                    warn!(attempt, error = %e, "reply post failed, retrying");
                    attempt += 1;
                    thread::sleep(self.retry_delay);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reply dropped");
                    self.status.record_error(format!("reply dropped: {e}"));
                    return Err(e);
                }
            }
        }
    }

    fn read_loop(&self, handler: &Sender<BridgeEvent>) {
        let mut backoff = Backoff::new(self.policy);
        while !self.is_shutting_down() {
            self.status.set_connecting();
            let ended = match self.api.open_stream() {
                Ok(stream) => {
                    self.status.set_connected();
                    backoff.reset();
                    info!(agent = %self.identity.id, "connected to console");
                    self.announce_presence();
                    self.pump(stream, handler)
                }
                Err(e) => Ended::Failed(e),
            };

            match ended {
                Ended::ReceiverGone | Ended::Shutdown => break,
                Ended::ServerClosed => {
                    warn!("console closed the stream");
                    self.status
                        .set_disconnected(Some("stream closed by console".into()));
                }
                Ended::Failed(e) => {
                    warn!(error = %e, "console connection failed");
                    self.status.set_disconnected(Some(e.to_string()));
                }
            }
            if self.is_shutting_down() {
                break;
            }

            let delay = backoff.next_delay();
            info!(
                attempt = backoff.attempt(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "reconnecting"
            );
            self.sleep_unless_shutdown(delay);
        }
        debug!("channel reader stopped");
    }

    fn pump(&self, stream: InboundStream, handler: &Sender<BridgeEvent>) -> Ended {
        for item in stream {
            if self.is_shutting_down() {
                return Ended::Shutdown;
            }
            match item {
                Ok(message) => {
                    debug!(message_id = %message.id, "inbound message");
                    if handler.send(BridgeEvent::Message(message)).is_err() {
                        return Ended::ReceiverGone;
                    }
                }
                Err(e) => return Ended::Failed(e),
            }
        }
        Ended::ServerClosed
    }

    fn sleep_unless_shutdown(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.is_shutting_down() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
