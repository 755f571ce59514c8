//! Byte-at-a-time HDLC frame decoder.
//!
//! Converts an arbitrary incoming byte stream into a sequence of [`Frame`]
//! values, re-synchronizing on corruption. Malformed input is emitted as
//! frames with a non-OK status rather than raised as errors; after a bad
//! frame, decoding resumes at the next byte.

use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};

use crate::consts;
use crate::frame::{Frame, FrameStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a flag byte to open a frame.
    Interframe,
    /// Accumulating the frame body.
    Frame,
    /// An escape byte was just consumed; a valid escaped byte must follow.
    FrameEscape,
}

/// Streaming frame decoder.
///
/// One instance per connection, fed bytes for the connection's lifetime. A
/// decoder must not be driven by more than one thread at a time; it holds
/// no I/O handles and never blocks.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Bytes as seen on the wire since the last frame boundary.
    raw: BytesMut,
    /// Frame body with escape sequences resolved.
    decoded: BytesMut,
    state: State,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            raw: BytesMut::new(),
            decoded: BytesMut::new(),
            state: State::Interframe,
        }
    }

    /// Feeds one byte, returning a completed frame when this byte closes
    /// one.
    ///
    /// Never fails: every byte is accepted, and corrupt input surfaces as
    /// frames with a non-OK status.
    pub fn process_byte(&mut self, byte: u8) -> Option<Frame> {
        self.raw.put_u8(byte);

        match self.state {
            State::Interframe => {
                if byte != consts::FLAG {
                    return None;
                }

                // Garbage buffered ahead of the flag is surfaced before the
                // new frame starts.
                let frame = (self.raw.len() != 1)
                    .then(|| self.take_frame(FrameStatus::FramingError, false));
                self.state = State::Frame;
                frame
            }
            State::Frame => match byte {
                consts::FLAG => {
                    if self.decoded.is_empty() {
                        // A lone leading flag, or idle flags between frames.
                        return None;
                    }

                    // Stay in the frame state: the next frame may share
                    // this flag byte.
                    let status = self.check_body();
                    Some(self.take_frame(status, true))
                }
                consts::ESCAPE => {
                    self.state = State::FrameEscape;
                    None
                }
                byte => {
                    self.decoded.put_u8(byte);
                    None
                }
            },
            State::FrameEscape => match byte {
                consts::FLAG => {
                    // An escape immediately followed by a frame boundary.
                    self.state = State::Frame;
                    Some(self.take_frame(FrameStatus::FramingError, true))
                }
                byte if consts::is_valid_escaped(byte) => {
                    self.decoded.put_u8(consts::escape(byte));
                    self.state = State::Frame;
                    None
                }
                byte => {
                    // Invalid escape sequence; the partial frame is
                    // abandoned and its bytes surface in the next
                    // inter-frame framing error.
                    debug!(byte, "invalid escaped byte, abandoning frame");
                    self.state = State::Interframe;
                    None
                }
            },
        }
    }

    /// Decodes a buffer, lazily yielding completed frames in arrival
    /// order.
    ///
    /// Decoder state carries over between calls; each call iterates the
    /// given buffer from its start.
    pub fn process<'a>(&'a mut self, data: &'a [u8]) -> Frames<'a> {
        Frames {
            decoder: self,
            data,
            pos: 0,
        }
    }

    /// Decodes a buffer, yielding valid frames only.
    ///
    /// Corrupt frames are logged with their status and discarded byte
    /// count, then dropped.
    pub fn process_valid_frames<'a>(
        &'a mut self,
        data: &'a [u8],
    ) -> impl Iterator<Item = Frame> + 'a {
        self.process(data).filter(|frame| {
            if frame.ok() {
                return true;
            }

            warn!(
                status = %frame.status(),
                discarded = frame.raw_encoded().len(),
                "dropping undecodable frame",
            );
            false
        })
    }

    /// Whether bytes that may belong to a frame are pending.
    pub fn frame_in_progress(&self) -> bool {
        self.state != State::Interframe && !self.raw.is_empty()
    }

    fn check_body(&self) -> FrameStatus {
        if self.decoded.len() < consts::MIN_FRAME_SIZE {
            return FrameStatus::FramingError;
        }

        let (body, fcs) = self.decoded.split_at(self.decoded.len() - 4);
        let expected = u32::from_le_bytes(fcs.try_into().unwrap());

        if crc32fast::hash(body) != expected {
            return FrameStatus::FcsMismatch;
        }

        FrameStatus::Ok
    }

    /// Takes the buffered bytes as a frame and resets for the next one.
    ///
    /// `in_frame` marks frames cut at a frame boundary, whose leading flag
    /// is reconstructed when it was shared with the previous frame;
    /// inter-frame garbage is taken as seen.
    fn take_frame(&mut self, status: FrameStatus, in_frame: bool) -> Frame {
        let raw = self.raw.split().freeze();
        let decoded = self.decoded.split().freeze();

        let raw = if in_frame && raw.first() != Some(&consts::FLAG) {
            let mut rebuilt = BytesMut::with_capacity(raw.len() + 1);
            rebuilt.put_u8(consts::FLAG);
            rebuilt.extend_from_slice(&raw);
            rebuilt.freeze()
        } else {
            raw
        };

        Frame::from_decoded(raw, decoded, status)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator returned by [`FrameDecoder::process`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    data: &'a [u8],
    pos: usize,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        while self.pos < self.data.len() {
            let byte = self.data[self.pos];
            self.pos += 1;

            if let Some(frame) = self.decoder.process_byte(byte) {
                return Some(frame);
            }
        }

        None
    }
}
