//! HDLC framing layer for carrying RPC traffic over an unreliable byte
//! stream (serial port, socket, or subprocess pipe).
//!
//! The wire format delimits frames with a flag byte, escapes reserved byte
//! values, and protects each frame with a CRC-32 frame check sequence. The
//! decoder is a byte-at-a-time state machine that re-synchronizes on
//! corruption without losing subsequent frames: malformed input surfaces as
//! [`Frame`] values with a non-OK [`FrameStatus`], never as errors.
//!
//! For streams that interleave frames with unstructured data (a device
//! logging plain text on the same UART it speaks RPC over), the
//! [`mixed::FrameAndNonFrameDecoder`] routes non-frame bytes to a separate
//! consumer while preserving stream order.

pub mod codec;
pub mod consts;
pub mod decoder;
pub mod dispatch;
pub mod encoder;
mod frame;
pub mod mixed;
pub mod varint;

pub use decoder::FrameDecoder;
pub use encoder::{encode_frame, encode_ui_frame};
pub use frame::{Frame, FrameStatus, FrameType};
pub use mixed::{FrameAndNonFrameDecoder, MixedDecoderConfig};
