//! The channel handle: a Connection's weak back-reference to the network
//! channel currently carrying its bytes.
//!
//! A channel is an unbounded pipe of byte chunks plus a liveness flag. The
//! I/O layer owns the receiving half (usually as a streaming HTTP response
//! body or a WebSocket writer task) and controls its lifetime; the
//! Connection only ever holds the sending half and checks liveness before
//! writing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

enum ChunkEvent {
    Data(Bytes),
    /// Clean end of the response; the receiver stops after draining.
    End,
}

/// The sending half of a channel. Cheap to clone; all clones share the
/// liveness flag.
#[derive(Clone)]
pub struct ChannelHandle {
    id: u64,
    tx: mpsc::UnboundedSender<ChunkEvent>,
    open: Arc<AtomicBool>,
}

impl ChannelHandle {
    /// Create a connected (sender, receiver) pair.
    pub fn pair() -> (Self, ChannelReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let handle = Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            tx,
            open: Arc::clone(&open),
        };
        (handle, ChannelReceiver { rx, open })
    }

    /// Opaque identity of this channel, distinct across all channels in the
    /// process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether a write would currently be accepted. False once [`finish`]
    /// has been called or the receiving half has been dropped.
    ///
    /// [`finish`]: Self::finish
    pub fn is_writable(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Queue a chunk for delivery. Returns the number of bytes accepted.
    pub fn write(&self, chunk: Bytes) -> TransportResult<usize> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::ChannelClosed);
        }
        let len = chunk.len();
        self.tx
            .send(ChunkEvent::Data(chunk))
            .map_err(|_| TransportError::ChannelClosed)?;
        Ok(len)
    }

    /// Terminate the response cleanly. Already-queued chunks are still
    /// delivered; subsequent writes fail.
    pub fn finish(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.tx.send(ChunkEvent::End);
        }
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("id", &self.id)
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// The receiving half of a channel, owned by the I/O layer.
pub struct ChannelReceiver {
    rx: mpsc::UnboundedReceiver<ChunkEvent>,
    open: Arc<AtomicBool>,
}

impl ChannelReceiver {
    /// Receive the next chunk. Returns `None` once the channel has been
    /// finished (after draining queued chunks) or every sender is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        match self.rx.recv().await {
            Some(ChunkEvent::Data(bytes)) => Some(bytes),
            Some(ChunkEvent::End) | None => None,
        }
    }
}

impl Drop for ChannelReceiver {
    fn drop(&mut self) {
        // Receiver gone means the client went away; flip liveness so the
        // Connection observes an unwritable channel immediately.
        self.open.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ChannelReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelReceiver").finish_non_exhaustive()
    }
}
