//! The Connection: one logical client session, independent of the wire
//! transport currently carrying it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use sockrs_protocol::CloseReason;

use crate::channel::ChannelHandle;
use crate::config::ServerConfig;
use crate::error::{TransportError, TransportResult};
use crate::listener::ListenerRegistry;
use crate::registry::SessionRegistry;
use crate::transports::Transport;

/// Observable lifecycle state of a Connection. Transitions are forward-only:
/// `NoChannel → Open → Closing → Closed`, with `Open → NoChannel` allowed
/// for polling/streaming detach-reattach cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No channel attached; the client is between requests.
    NoChannel,
    /// A channel is attached and no close is pending.
    Open,
    /// A close reason is set but the close frame has not been flushed yet.
    Closing,
    /// Terminal. The close frame has been flushed.
    Closed,
}

struct Inner {
    state: SessionState,
    channel: Option<ChannelHandle>,
    transport: Option<Arc<dyn Transport>>,
    close_reason: Option<CloseReason>,
}

/// One logical client connection, addressed by session id and reused across
/// transport handoffs.
///
/// The pending-outbound buffer is the single point of truth for undelivered
/// messages: anything enqueued while no channel is attached is flushed, in
/// order, the moment one reattaches.
pub struct Connection {
    session_id: String,
    base_url: String,
    config: Arc<ServerConfig>,
    listeners: Arc<ListenerRegistry>,
    registry: Weak<SessionRegistry>,

    pending: Mutex<VecDeque<String>>,
    inner: Mutex<Inner>,
    jsonp_callback: Mutex<Option<String>>,

    sent_bytes: AtomicUsize,
    keep_heartbeat: AtomicBool,
    heartbeat_running: AtomicBool,
    opened: AtomicBool,
    close_notified: AtomicBool,
}

impl Connection {
    pub(crate) fn new(
        base_url: impl Into<String>,
        session_id: impl Into<String>,
        config: Arc<ServerConfig>,
        listeners: Arc<ListenerRegistry>,
        registry: Weak<SessionRegistry>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            base_url: base_url.into(),
            config,
            listeners,
            registry,
            pending: Mutex::new(VecDeque::new()),
            inner: Mutex::new(Inner {
                state: SessionState::NoChannel,
                channel: None,
                transport: None,
                close_reason: None,
            }),
            jsonp_callback: Mutex::new(None),
            sent_bytes: AtomicUsize::new(0),
            keep_heartbeat: AtomicBool::new(false),
            heartbeat_running: AtomicBool::new(false),
            opened: AtomicBool::new(false),
            close_notified: AtomicBool::new(false),
        }
    }

    /// The opaque session identifier, immutable for this Connection's life.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The application endpoint this session belongs to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Server configuration this session was created under.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// The close reason, once set.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.lock().close_reason
    }

    // ------------------------------------------------------------------
    // Channel attachment
    // ------------------------------------------------------------------

    /// Bind a channel and the transport that will drive it.
    ///
    /// A session admits at most one live channel: if the current channel is
    /// still writable the attach is rejected with
    /// [`TransportError::AlreadyOpened`] and the original channel is left
    /// untouched. The newcomer is expected to receive the `2010` close frame
    /// on its own channel.
    pub fn attach(
        &self,
        channel: ChannelHandle,
        transport: Arc<dyn Transport>,
    ) -> TransportResult<()> {
        let mut inner = self.inner.lock();
        if matches!(inner.state, SessionState::Closed) {
            return Err(TransportError::ChannelClosed);
        }
        if let Some(existing) = &inner.channel
            && existing.is_writable()
        {
            debug!(
                session = %self.session_id,
                channel = channel.id(),
                "rejecting second channel for open session"
            );
            return Err(TransportError::AlreadyOpened);
        }
        debug!(
            session = %self.session_id,
            channel = channel.id(),
            transport = %transport.kind(),
            "channel attached"
        );
        inner.channel = Some(channel);
        inner.transport = Some(transport);
        if matches!(inner.state, SessionState::NoChannel) {
            inner.state = SessionState::Open;
        }
        Ok(())
    }

    /// The currently attached (channel, transport) pair, if the channel is
    /// still writable.
    pub fn attached(&self) -> Option<(ChannelHandle, Arc<dyn Transport>)> {
        let inner = self.inner.lock();
        match (&inner.channel, &inner.transport) {
            (Some(channel), Some(transport)) if channel.is_writable() => {
                Some((channel.clone(), Arc::clone(transport)))
            }
            _ => None,
        }
    }

    /// Whether a writable channel is currently attached.
    pub fn is_channel_writable(&self) -> bool {
        self.attached().is_some()
    }

    /// Terminate the current response cleanly and detach, leaving the
    /// Connection and its buffer intact. Used for stream recycling and for
    /// one-shot polling responses.
    pub fn recycle_channel(&self) {
        let channel = {
            let mut inner = self.inner.lock();
            if matches!(inner.state, SessionState::Open) {
                inner.state = SessionState::NoChannel;
            }
            inner.channel.take()
        };
        if let Some(channel) = channel {
            debug!(session = %self.session_id, channel = channel.id(), "channel recycled");
            channel.finish();
        }
    }

    /// Write a chunk to the attached channel. Does not touch the sent-byte
    /// counter; data-carrying transports account separately.
    pub fn write(&self, chunk: Bytes) -> TransportResult<usize> {
        let channel = {
            let inner = self.inner.lock();
            inner.channel.clone().ok_or(TransportError::ChannelClosed)?
        };
        channel.write(chunk)
    }

    // ------------------------------------------------------------------
    // Outbound buffering
    // ------------------------------------------------------------------

    /// Append a message to the pending-outbound buffer. Never blocks.
    pub fn enqueue(&self, message: impl Into<String>) {
        self.pending.lock().push_back(message.into());
    }

    /// Atomically remove and return every buffered message, in enqueue order.
    pub fn drain_all(&self) -> Vec<String> {
        self.pending.lock().drain(..).collect()
    }

    /// Enqueue a message and deliver it (plus anything already buffered) if
    /// a writable channel is attached.
    pub fn send(&self, message: impl Into<String>) -> TransportResult<()> {
        self.enqueue(message);
        self.flush()
    }

    /// Deliver buffered messages, or the pending close frame, through the
    /// attached transport. A no-op when no writable channel is attached;
    /// the next reattach will flush.
    pub fn flush(&self) -> TransportResult<()> {
        let Some((_, transport)) = self.attached() else {
            return Ok(());
        };
        if let Some(reason) = self.close_reason() {
            return transport.send_close(self, reason);
        }
        let messages = self.drain_all();
        if messages.is_empty() {
            return Ok(());
        }
        transport.send_messages(self, &messages)
    }

    // ------------------------------------------------------------------
    // Closing
    // ------------------------------------------------------------------

    /// Enter the closing phase. The first reason sticks; later calls with a
    /// different reason are ignored. If a channel is attached the close
    /// frame is flushed immediately, otherwise at the next poll.
    pub fn request_close(&self, reason: CloseReason) -> TransportResult<()> {
        self.set_close_reason(reason);
        self.flush()
    }

    /// Record the close reason without flushing. Used by one-shot transports
    /// whose current response has already been spent; the close frame goes
    /// out on the next poll.
    pub fn set_close_reason(&self, reason: CloseReason) {
        let mut inner = self.inner.lock();
        if inner.close_reason.is_none() {
            debug!(session = %self.session_id, %reason, "close requested");
            inner.close_reason = Some(reason);
            if !matches!(inner.state, SessionState::Closed) {
                inner.state = SessionState::Closing;
            }
        }
    }

    /// Transition to `Closed` after the close frame has been flushed:
    /// finish the channel, notify listeners once, stop heartbeats, and
    /// evict this session from the registry.
    pub fn mark_closed(&self) {
        let channel = {
            let mut inner = self.inner.lock();
            inner.state = SessionState::Closed;
            if inner.close_reason.is_none() {
                inner.close_reason = Some(CloseReason::Normal);
            }
            inner.transport = None;
            inner.channel.take()
        };
        if let Some(channel) = channel {
            channel.finish();
        }
        self.set_keep_heartbeat(false);
        self.notify_close();
        if let Some(registry) = self.registry.upgrade() {
            registry.evict(&self.session_id);
        }
    }

    // ------------------------------------------------------------------
    // Byte accounting (stream recycling policy)
    // ------------------------------------------------------------------

    /// Bytes written on the current channel lifetime.
    pub fn sent_bytes(&self) -> usize {
        self.sent_bytes.load(Ordering::Relaxed)
    }

    /// Add to the sent-byte counter, returning the new running total.
    pub fn add_sent_bytes(&self, n: usize) -> usize {
        self.sent_bytes.fetch_add(n, Ordering::Relaxed) + n
    }

    /// Reset the counter; done only alongside a stream recycle.
    pub fn reset_sent_bytes(&self) {
        self.sent_bytes.store(0, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------
    // Heartbeat bookkeeping
    // ------------------------------------------------------------------

    /// Whether the heartbeat task should keep re-arming itself.
    pub fn keep_heartbeat(&self) -> bool {
        self.keep_heartbeat.load(Ordering::Relaxed)
    }

    /// Gate the heartbeat task's re-arming.
    pub fn set_keep_heartbeat(&self, keep: bool) {
        self.keep_heartbeat.store(keep, Ordering::Relaxed);
    }

    /// Interval between heartbeat frames for this session.
    pub fn heartbeat_interval(&self) -> Duration {
        self.config.heartbeat_interval
    }

    pub(crate) fn try_claim_heartbeat_task(&self) -> bool {
        self.heartbeat_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_heartbeat_task(&self) {
        self.heartbeat_running.store(false, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // JSONP / htmlfile callback name
    // ------------------------------------------------------------------

    /// The callback name captured from the first script-tag request.
    pub fn jsonp_callback(&self) -> Option<String> {
        self.jsonp_callback.lock().clone()
    }

    /// Remember the script-tag callback name for later frames.
    pub fn set_jsonp_callback(&self, callback: impl Into<String>) {
        *self.jsonp_callback.lock() = Some(callback.into());
    }

    // ------------------------------------------------------------------
    // Listener fan-out
    // ------------------------------------------------------------------

    /// Notify listeners the session is open. Fires at most once per
    /// Connection, however many times the transport resends open frames on
    /// reattached streams.
    pub fn notify_open(&self) {
        if !self.opened.swap(true, Ordering::AcqRel) {
            self.listeners.notify_open(self);
        }
    }

    /// Forward one decoded inbound message to the listeners.
    pub fn notify_message(&self, message: &str) {
        self.listeners.notify_message(self, message);
    }

    /// Notify listeners the session reached `Closed`. Fires at most once.
    pub fn notify_close(&self) {
        if self.opened.load(Ordering::Acquire) && !self.close_notified.swap(true, Ordering::AcqRel)
        {
            self.listeners.notify_close(self);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Connection")
            .field("session_id", &self.session_id)
            .field("base_url", &self.base_url)
            .field("state", &inner.state)
            .field("close_reason", &inner.close_reason)
            .field("pending", &self.pending.lock().len())
            .field("sent_bytes", &self.sent_bytes())
            .finish()
    }
}
