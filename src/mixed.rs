//! Demultiplexing of streams that interleave HDLC frames with
//! unstructured data, as with a device logging plain text on the same
//! transport it speaks RPC over.
//!
//! Every byte is fed to the inner [`FrameDecoder`] and buffered raw.
//! Valid frames come back from [`FrameAndNonFrameDecoder::process`];
//! everything else reaches the non-frame handler, with non-frame bytes
//! preceding a frame always delivered before the frame itself. Buffered
//! non-frame data is bounded by an optional MTU and flushed by an
//! optional background timeout task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::consts;
use crate::decoder::FrameDecoder;
use crate::frame::Frame;

/// Handler receiving bytes that are not part of a valid frame.
pub type NonFrameDataHandler = Box<dyn FnMut(Bytes) + Send>;

/// Tuning for [`FrameAndNonFrameDecoder`].
#[derive(Debug, Clone)]
pub struct MixedDecoderConfig {
    /// Maximum buffered non-frame bytes before a forced flush.
    pub mtu: Option<usize>,
    /// How long non-frame data may sit unflushed with no new bytes
    /// arriving.
    pub timeout: Option<Duration>,
    /// Whether two adjacent frames may share a single flag byte. When
    /// false, buffered data is flushed as soon as no frame is in progress
    /// instead of waiting for a possible shared-flag frame.
    pub handle_shared_flags: bool,
}

impl Default for MixedDecoderConfig {
    fn default() -> Self {
        Self {
            mtu: None,
            timeout: None,
            handle_shared_flags: true,
        }
    }
}

/// State shared between [`FrameAndNonFrameDecoder::process`] and the
/// timeout task, behind one lock.
struct Shared {
    raw: BytesMut,
    last_data: Instant,
    handler: NonFrameDataHandler,
}

impl Shared {
    /// Hands `raw[..upto]` to the non-frame handler.
    fn flush(&mut self, upto: usize) {
        if upto > 0 {
            let chunk = self.raw.split_to(upto).freeze();
            (self.handler)(chunk);
        }
    }

    fn flush_all(&mut self) {
        let len = self.raw.len();
        self.flush(len);
    }
}

/// Decoder for byte streams that interleave frames with unstructured
/// data.
pub struct FrameAndNonFrameDecoder {
    decoder: FrameDecoder,
    shared: Arc<Mutex<Shared>>,
    mtu: Option<usize>,
    handle_shared_flags: bool,
    cancel: CancellationToken,
    ticker: Option<JoinHandle<()>>,
}

impl FrameAndNonFrameDecoder {
    /// Creates a mixed decoder handing non-frame bytes to `handler`.
    ///
    /// When `config.timeout` is set, this must be called inside a Tokio
    /// runtime: the timeout flush runs as a background task whose
    /// lifetime is tied to this decoder, stopped by
    /// [`shutdown`](Self::shutdown) or on drop.
    pub fn new(config: MixedDecoderConfig, handler: impl FnMut(Bytes) + Send + 'static) -> Self {
        let shared = Arc::new(Mutex::new(Shared {
            raw: BytesMut::new(),
            last_data: Instant::now(),
            handler: Box::new(handler),
        }));

        let cancel = CancellationToken::new();
        let ticker = config.timeout.map(|timeout| {
            tokio::spawn(flush_periodically(shared.clone(), timeout, cancel.clone()))
        });

        Self {
            decoder: FrameDecoder::new(),
            shared,
            mtu: config.mtu,
            handle_shared_flags: config.handle_shared_flags,
            cancel,
            ticker,
        }
    }

    /// Processes a chunk of stream data, returning the valid frames it
    /// completed.
    ///
    /// Non-frame bytes preceding each frame are handed to the non-frame
    /// handler before the frame is returned, preserving stream order.
    /// Briefly blocks on the lock shared with the timeout task.
    pub fn process(&mut self, data: &[u8]) -> Vec<Frame> {
        let mut shared = lock(&self.shared);
        shared.last_data = Instant::now();

        let mut frames = Vec::new();

        for &byte in data {
            shared.raw.put_u8(byte);

            let Some(frame) = self.decoder.process_byte(byte) else {
                if self.mtu.is_some_and(|mtu| shared.raw.len() > mtu) {
                    shared.flush_all();
                }
                continue;
            };

            if frame.ok() {
                // Strip the frame's bytes off the buffer tail, then
                // deliver whatever preceded it.
                strip_frame_tail(&mut shared.raw, frame.raw_encoded());
                shared.flush_all();
                frames.push(frame);
            } else {
                // A corrupt frame in a mixed stream is raw data that
                // happened to contain flag bytes. Its bytes go to the
                // non-frame handler, minus a trailing flag that may open
                // the next frame.
                debug!(
                    status = %frame.status(),
                    len = frame.raw_encoded().len(),
                    "corrupt frame treated as non-frame data",
                );
                let keep = (shared.raw.last() == Some(&consts::FLAG)) as usize;
                let upto = shared.raw.len() - keep;
                shared.flush(upto);
            }
        }

        if !self.handle_shared_flags && !self.decoder.frame_in_progress() {
            shared.flush_all();
        }

        frames
    }

    /// Flushes any buffered bytes to the non-frame handler, e.g. at
    /// stream end.
    pub fn flush_non_frame_data(&self) {
        lock(&self.shared).flush_all();
    }

    /// Stops the timeout task and waits for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.await;
        }
    }
}

impl Drop for FrameAndNonFrameDecoder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock(shared: &Arc<Mutex<Shared>>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn flush_periodically(
    shared: Arc<Mutex<Shared>>,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(timeout);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let mut shared = lock(&shared);
        if shared.last_data.elapsed() >= timeout {
            shared.flush_all();
        }
    }
}

/// Removes a completed frame's bytes from the end of the raw buffer.
///
/// Trailing bytes are matched one at a time: the head of the frame may
/// have been flushed already, or its leading flag shared with (and
/// stripped alongside) the previous frame.
fn strip_frame_tail(raw: &mut BytesMut, frame: &[u8]) {
    for &byte in frame.iter().rev() {
        if raw.last() == Some(&byte) {
            raw.truncate(raw.len() - 1);
        } else {
            break;
        }
    }
}
