//! Demultiplexes a stream that interleaves HDLC frames with log text,
//! printing both sides. The trailing log line is flushed by the timeout
//! task rather than by more input arriving.

use std::time::Duration;

use hdlc::{FrameAndNonFrameDecoder, MixedDecoderConfig, encode_ui_frame};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = MixedDecoderConfig {
        timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };

    let mut decoder = FrameAndNonFrameDecoder::new(config, |data| {
        print!("log: {}", String::from_utf8_lossy(&data));
    });

    let mut stream = b"boot: radio up\n".to_vec();
    stream.extend_from_slice(&encode_ui_frame(5, b"hello"));
    stream.extend_from_slice(b"boot: link ready\n");

    for frame in decoder.process(&stream) {
        println!(
            "frame: address={:?} data={:02x?}",
            frame.address(),
            frame.data(),
        );
    }

    tokio::time::sleep(Duration::from_millis(250)).await;
    decoder.shutdown().await;

    Ok(())
}
