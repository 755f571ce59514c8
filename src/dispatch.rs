//! Boundary plumbing: per-address frame dispatch, the read loop, and the
//! channel output sink.

use std::collections::HashMap;
use std::io;

use bytes::Bytes;
use tracing::warn;

use crate::decoder::FrameDecoder;
use crate::encoder;
use crate::frame::Frame;

/// Handler invoked for every valid frame sent to one address.
pub type FrameHandler = Box<dyn FnMut(Frame) + Send>;

/// Typed dispatch table mapping frame addresses to handlers.
#[derive(Default)]
pub struct FrameHandlers {
    handlers: HashMap<u32, FrameHandler>,
}

impl FrameHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for frames addressed to `address`, replacing
    /// any previous registration.
    pub fn on_address(mut self, address: u32, handler: impl FnMut(Frame) + Send + 'static) -> Self {
        self.handlers.insert(address, Box::new(handler));
        self
    }

    /// Routes one valid frame to its handler. Frames for unregistered
    /// addresses are logged and dropped.
    pub fn dispatch(&mut self, frame: Frame) {
        let Some(address) = frame.address() else {
            return;
        };

        match self.handlers.get_mut(&address) {
            Some(handler) => handler(frame),
            None => warn!(
                address,
                len = frame.data().len(),
                "discarding frame for unregistered address",
            ),
        }
    }
}

/// Continuously reads bytes and dispatches decoded frames.
///
/// `read` is the caller-owned byte source (serial port, socket, or
/// subprocess pipe); an empty successful read means end of stream and
/// ends the loop. Read errors are reported to `on_read_error` and the
/// loop keeps reading; any backoff is the caller's to add. Valid frames
/// dispatch through `handlers`; frames with any other status go to
/// `error_handler`.
pub fn read_and_process_data(
    mut read: impl FnMut() -> io::Result<Bytes>,
    mut on_read_error: impl FnMut(io::Error),
    handlers: &mut FrameHandlers,
    mut error_handler: impl FnMut(Frame),
) {
    let mut decoder = FrameDecoder::new();

    loop {
        let data = match read() {
            Ok(data) if data.is_empty() => return,
            Ok(data) => data,
            Err(err) => {
                on_read_error(err);
                continue;
            }
        };

        for frame in decoder.process(&data) {
            if frame.ok() {
                handlers.dispatch(frame);
            } else {
                error_handler(frame);
            }
        }
    }
}

/// Returns a write adapter that frames payloads for `address` before
/// handing them to `write`, usable as the output half of a higher-level
/// RPC channel.
pub fn channel_output(
    mut write: impl FnMut(&[u8]) -> io::Result<()>,
    address: u32,
) -> impl FnMut(&[u8]) -> io::Result<()> {
    move |payload| write(&encoder::encode_ui_frame(address, payload))
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::encoder::encode_ui_frame;
    use crate::frame::FrameStatus;

    /// A scripted byte source: pops one entry per read call.
    fn scripted(
        reads: Vec<io::Result<Bytes>>,
    ) -> impl FnMut() -> io::Result<Bytes> {
        let mut reads: VecDeque<io::Result<Bytes>> = reads.into();
        move || reads.pop_front().unwrap_or_else(|| Ok(Bytes::new()))
    }

    #[test]
    fn test_dispatch_by_address() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log_a = seen.clone();
        let log_b = seen.clone();
        let mut handlers = FrameHandlers::new()
            .on_address(1, move |frame: Frame| {
                log_a.lock().unwrap().push((1u32, frame.data().to_vec()));
            })
            .on_address(2, move |frame: Frame| {
                log_b.lock().unwrap().push((2u32, frame.data().to_vec()));
            });

        let mut stream = encode_ui_frame(2, b"to-two").to_vec();
        stream.extend_from_slice(&encode_ui_frame(1, b"to-one"));
        stream.extend_from_slice(&encode_ui_frame(9, b"nobody"));

        read_and_process_data(
            scripted(vec![Ok(Bytes::from(stream))]),
            |_| panic!("no read errors expected"),
            &mut handlers,
            |_| panic!("no corrupt frames expected"),
        );

        assert_eq!(
            *seen.lock().unwrap(),
            [(2, b"to-two".to_vec()), (1, b"to-one".to_vec())],
        );
    }

    #[test]
    fn test_corrupt_frames_reach_error_handler() {
        let mut corrupt = encode_ui_frame(1, b"x").to_vec();
        corrupt[1] ^= 0x02;

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let seen = statuses.clone();

        let mut handlers = FrameHandlers::new();
        read_and_process_data(
            scripted(vec![Ok(Bytes::from(corrupt))]),
            |_| panic!("no read errors expected"),
            &mut handlers,
            move |frame| seen.lock().unwrap().push(frame.status()),
        );

        assert_eq!(*statuses.lock().unwrap(), [FrameStatus::FcsMismatch]);
    }

    #[test]
    fn test_read_errors_do_not_stop_the_loop() {
        let errors = Arc::new(Mutex::new(0));
        let count = errors.clone();

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let mut handlers = FrameHandlers::new().on_address(5, move |frame: Frame| {
            sink.lock().unwrap().push(frame.data().to_vec());
        });

        read_and_process_data(
            scripted(vec![
                Err(io::Error::from(io::ErrorKind::TimedOut)),
                Ok(Bytes::from(encode_ui_frame(5, b"after").to_vec())),
            ]),
            move |_| *count.lock().unwrap() += 1,
            &mut handlers,
            |_| panic!("no corrupt frames expected"),
        );

        assert_eq!(*errors.lock().unwrap(), 1);
        assert_eq!(*delivered.lock().unwrap(), [b"after".to_vec()]);
    }

    #[test]
    fn test_decoder_state_spans_reads() {
        let encoded = encode_ui_frame(1, b"split").to_vec();
        let (head, tail) = encoded.split_at(4);

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let mut handlers = FrameHandlers::new().on_address(1, move |frame: Frame| {
            sink.lock().unwrap().push(frame.data().to_vec());
        });

        read_and_process_data(
            scripted(vec![
                Ok(Bytes::copy_from_slice(head)),
                Ok(Bytes::copy_from_slice(tail)),
            ]),
            |_| panic!("no read errors expected"),
            &mut handlers,
            |_| panic!("no corrupt frames expected"),
        );

        assert_eq!(*delivered.lock().unwrap(), [b"split".to_vec()]);
    }

    #[test]
    fn test_channel_output_frames_payloads() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = written.clone();

        let mut output = channel_output(
            move |bytes| {
                sink.lock().unwrap().push(bytes.to_vec());
                Ok(())
            },
            5,
        );

        output(b"A").unwrap();

        assert_eq!(*written.lock().unwrap(), [encode_ui_frame(5, b"A").to_vec()]);
    }
}
