//! Decoded frame representation.

use bytes::Bytes;
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::varint;

/// Outcome of decoding one frame from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was delimited, unescaped and checksummed correctly.
    Ok,
    /// The frame is structurally sound but its checksum does not match.
    FcsMismatch,
    /// Structural corruption: a short frame, a bad escape sequence, or
    /// garbage between frames.
    FramingError,
    /// The address field could not be decoded.
    BadAddress,
}

impl FrameStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, FrameStatus::Ok)
    }
}

impl std::fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FrameStatus::Ok => "OK",
            FrameStatus::FcsMismatch => "FCS_MISMATCH",
            FrameStatus::FramingError => "FRAMING_ERROR",
            FrameStatus::BadAddress => "BAD_ADDRESS",
        })
    }
}

/// Meaning of the control byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
pub enum FrameType {
    /// Unnumbered information, the framing used for RPC payloads.
    UnnumberedInformation = 0x03,

    #[num_enum(catch_all)]
    Unrecognized(u8) = 0xFF,
}

/// One HDLC frame extracted from a stream, valid or corrupt.
///
/// A frame is immutable once constructed. [`FrameStatus::Ok`] implies the
/// address, control and information fields are populated and the checksum
/// validated; for any other status [`data`](Self::data) is empty and
/// [`raw_decoded`](Self::raw_decoded) holds whatever was assembled, for
/// diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    raw_encoded: Bytes,
    raw_decoded: Bytes,
    status: FrameStatus,
    address: Option<u32>,
    control: Option<u8>,
    data: Bytes,
}

impl Frame {
    /// Builds a frame from its wire bytes and unescaped body.
    ///
    /// With [`FrameStatus::Ok`], the address, control and information
    /// fields are parsed out of `raw_decoded`; a parse failure downgrades
    /// the status instead of erroring.
    pub(crate) fn from_decoded(raw_encoded: Bytes, raw_decoded: Bytes, status: FrameStatus) -> Self {
        let mut frame = Frame {
            raw_encoded,
            raw_decoded,
            status,
            address: None,
            control: None,
            data: Bytes::new(),
        };

        if status.is_ok() {
            frame.parse_fields();
        }

        frame
    }

    fn parse_fields(&mut self) {
        let (address, addr_len) = match varint::decode(&self.raw_decoded) {
            Ok(decoded) => decoded,
            Err(_) => {
                self.status = FrameStatus::BadAddress;
                return;
            }
        };

        // The control byte must sit before the frame check sequence.
        if self.raw_decoded.len() < addr_len + 5 {
            self.status = FrameStatus::FramingError;
            return;
        }

        self.address = Some(address);
        self.control = Some(self.raw_decoded[addr_len]);
        self.data = self
            .raw_decoded
            .slice(addr_len + 1..self.raw_decoded.len() - 4);
    }

    pub fn status(&self) -> FrameStatus {
        self.status
    }

    pub fn ok(&self) -> bool {
        self.status.is_ok()
    }

    /// The bytes as seen on the wire, with the leading flag reconstructed
    /// when it was shared with the previous frame.
    pub fn raw_encoded(&self) -> &[u8] {
        &self.raw_encoded
    }

    /// The unescaped frame body: address, control, information and FCS.
    pub fn raw_decoded(&self) -> &[u8] {
        &self.raw_decoded
    }

    /// The decoded address, or `None` when parsing failed before the
    /// address could be read.
    pub fn address(&self) -> Option<u32> {
        self.address
    }

    /// The control byte; present only for valid frames.
    pub fn control(&self) -> Option<u8> {
        self.control
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        self.control.map(FrameType::from_primitive)
    }

    /// The information field. Empty unless the frame is valid.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame(decoded: &[u8], status: FrameStatus) -> Frame {
        Frame::from_decoded(Bytes::new(), Bytes::copy_from_slice(decoded), status)
    }

    #[test]
    fn test_parse_ok() {
        // address 5, control 0x03, data "hi", valid FCS appended by the
        // encoder test vectors.
        let parsed = frame(
            &[0x0B, 0x03, 0x68, 0x69, 0x17, 0xDE, 0x49, 0x6D],
            FrameStatus::Ok,
        );

        assert!(parsed.ok());
        assert_eq!(parsed.address(), Some(5));
        assert_eq!(parsed.control(), Some(0x03));
        assert_eq!(parsed.frame_type(), Some(FrameType::UnnumberedInformation));
        assert_eq!(parsed.data(), b"hi");
    }

    #[test]
    fn test_parse_empty_information_field() {
        // address 0, control 0x03, no data.
        let parsed = frame(&[0x01, 0x03, 0x04, 0x72, 0xCB, 0xC1], FrameStatus::Ok);

        assert!(parsed.ok());
        assert_eq!(parsed.address(), Some(0));
        assert_eq!(parsed.control(), Some(0x03));
        assert_eq!(parsed.data(), b"");
    }

    #[test]
    fn test_parse_bad_address() {
        // Five continuation bytes push the address past the 32-bit range.
        let parsed = frame(
            &[0xFE, 0xFE, 0xFE, 0xFE, 0xFF, 0xD1, 0x05, 0xF8, 0x4F],
            FrameStatus::Ok,
        );

        assert_eq!(parsed.status(), FrameStatus::BadAddress);
        assert_eq!(parsed.address(), None);
        assert_eq!(parsed.control(), None);
        assert_eq!(parsed.data(), b"");
    }

    #[test]
    fn test_parse_address_terminator_inside_fcs() {
        // The varint terminator lands inside the checksum bytes, leaving no
        // room for a control byte.
        let parsed = frame(
            &[0x00, 0x00, 0x00, 0x00, 0x03, 0xA7, 0xA6, 0x2B, 0x5F],
            FrameStatus::Ok,
        );

        assert_eq!(parsed.status(), FrameStatus::FramingError);
        assert_eq!(parsed.address(), None);
    }

    #[test]
    fn test_invalid_status_keeps_diagnostics_only() {
        let parsed = frame(&[0x0B, 0x03, 0x68], FrameStatus::FcsMismatch);

        assert!(!parsed.ok());
        assert_eq!(parsed.address(), None);
        assert_eq!(parsed.control(), None);
        assert_eq!(parsed.data(), b"");
        assert_eq!(parsed.raw_decoded(), [0x0B, 0x03, 0x68]);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(FrameStatus::Ok.to_string(), "OK");
        assert_eq!(FrameStatus::FcsMismatch.to_string(), "FCS_MISMATCH");
        assert_eq!(FrameStatus::FramingError.to_string(), "FRAMING_ERROR");
        assert_eq!(FrameStatus::BadAddress.to_string(), "BAD_ADDRESS");
    }

    #[test]
    fn test_frame_type_catch_all() {
        assert_eq!(FrameType::from_primitive(0x03), FrameType::UnnumberedInformation);
        assert_eq!(FrameType::from_primitive(0x13), FrameType::Unrecognized(0x13));

        let control: u8 = FrameType::UnnumberedInformation.into();
        assert_eq!(control, 0x03);
    }
}
