//! Decodes HDLC frames from stdin and prints one line per frame.
//!
//! Try: `cargo run --example decode-stream < capture.bin`

use std::io::Read;

use hdlc::FrameDecoder;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    let mut stdin = std::io::stdin().lock();

    loop {
        let n = stdin.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }

        for frame in decoder.process(&buf[..n]) {
            match frame.address() {
                Some(address) => println!(
                    "{} address={address} control={:#04x} data={:02x?}",
                    frame.status(),
                    frame.control().unwrap_or_default(),
                    frame.data(),
                ),
                None => println!(
                    "{} ({} raw bytes discarded)",
                    frame.status(),
                    frame.raw_encoded().len(),
                ),
            }
        }
    }
}
