//! Adapters for running the framing layer on top of Tokio byte streams.

use std::collections::VecDeque;
use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::warn;

use crate::decoder::FrameDecoder;
use crate::encoder;
use crate::frame::Frame;

/// Outbound payload plus destination address, framed as an
/// unnumbered-information frame on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiFrame {
    pub address: u32,
    pub data: Bytes,
}

/// Frame codec for `tokio_util::codec::Framed` transports.
///
/// Decoding yields valid frames only; corrupt frames are logged with
/// their status and discarded byte count, then dropped.
#[derive(Debug, Default)]
pub struct Codec {
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
}

impl Codec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrap<T>(self, io: T) -> Framed<T, Codec>
    where
        T: AsyncRead + AsyncWrite,
    {
        Framed::with_capacity(io, self, 4096)
    }
}

impl tokio_util::codec::Decoder for Codec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        // One read may complete several frames; drain the buffer in one
        // pass and queue whatever completed.
        let Self { decoder, ready } = self;

        for frame in decoder.process(src) {
            if frame.ok() {
                ready.push_back(frame);
            } else {
                warn!(
                    status = %frame.status(),
                    discarded = frame.raw_encoded().len(),
                    "dropping undecodable frame",
                );
            }
        }

        src.clear();
        Ok(ready.pop_front())
    }
}

impl tokio_util::codec::Encoder<&UiFrame> for Codec {
    type Error = io::Error;

    fn encode(&mut self, frame: &UiFrame, dst: &mut BytesMut) -> Result<(), io::Error> {
        encoder::encode_frame(
            frame.address,
            crate::frame::FrameType::UnnumberedInformation.into(),
            &frame.data,
            dst,
        );
        Ok(())
    }
}

impl tokio_util::codec::Encoder<UiFrame> for Codec {
    type Error = io::Error;

    fn encode(&mut self, frame: UiFrame, dst: &mut BytesMut) -> Result<(), io::Error> {
        tokio_util::codec::Encoder::<&UiFrame>::encode(self, &frame, dst)
    }
}
