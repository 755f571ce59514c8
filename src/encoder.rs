//! HDLC frame encoding.
//!
//! Encoding always produces a well-formed frame: every reserved byte in
//! the body is escaped, and the frame check sequence is computed over the
//! unescaped address, control and payload bytes.

use bytes::{BufMut, BytesMut};

use crate::consts;
use crate::frame::FrameType;
use crate::varint;

/// Writes bytes into a buffer with reserved values escaped.
struct EscapingWriter<'a> {
    buf: &'a mut BytesMut,
}

impl EscapingWriter<'_> {
    fn put_u8(&mut self, byte: u8) {
        if consts::needs_escape(byte) {
            self.buf.put_slice(&[consts::ESCAPE, consts::escape(byte)]);
        } else {
            self.buf.put_u8(byte);
        }
    }
}

/// Escapes frame-body bytes into the output while accumulating the FCS
/// over the unescaped bytes.
struct FrameWriter<'a> {
    out: EscapingWriter<'a>,
    fcs: crc32fast::Hasher,
}

impl<'a> FrameWriter<'a> {
    fn new(buf: &'a mut BytesMut) -> Self {
        Self {
            out: EscapingWriter { buf },
            fcs: crc32fast::Hasher::new(),
        }
    }

    fn put_u8(&mut self, byte: u8) -> &mut Self {
        self.fcs.update(&[byte]);
        self.out.put_u8(byte);
        self
    }

    fn put_bytes(&mut self, bytes: impl IntoIterator<Item = u8>) -> &mut Self {
        for byte in bytes {
            self.put_u8(byte);
        }
        self
    }

    /// Appends the escaped FCS and the closing flag.
    fn finish(mut self) {
        let fcs = self.fcs.clone().finalize();
        self.put_bytes(fcs.to_le_bytes());
        self.out.buf.put_u8(consts::FLAG);
    }
}

/// Encodes a frame for `address` with the given control byte and payload
/// into `dst`. Infallible for any input.
pub fn encode_frame(address: u32, control: u8, payload: &[u8], dst: &mut BytesMut) {
    // Body plus delimiters, address, control and FCS; escaping may grow
    // this further.
    dst.reserve(payload.len() + consts::MIN_FRAME_SIZE + 2 + varint::MAX_ENCODED_LEN);
    dst.put_u8(consts::FLAG);

    let mut writer = FrameWriter::new(dst);
    writer
        .put_bytes(varint::encode(address))
        .put_u8(control)
        .put_bytes(payload.iter().copied());
    writer.finish();
}

/// Encodes an unnumbered-information frame, the framing used for RPC
/// payloads. Returns the wire bytes ready to hand to the transport.
pub fn encode_ui_frame(address: u32, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    encode_frame(
        address,
        FrameType::UnnumberedInformation.into(),
        payload,
        &mut buf,
    );
    buf
}
