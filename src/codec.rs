// SPDX-FileCopyrightText: Copyright (c) 2017-2026 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus ASCII wire codec.
//!
//! The hex/LRC logic is modeled as an exchangeable capability so that the
//! server core can be tested against a reference or fault-injecting
//! implementation. [`LrcCodec`] is the reference implementation used by
//! default.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{error::FrameError, slave::SlaveId};

/// The canonical Modbus ASCII start character.
pub(crate) const ASCII_START: u8 = b':';

/// Start character used on the wire by the devices this server talks to.
// must use > as start character
pub(crate) const ASCII_START_SLAVE: u8 = b'>';

/// Line terminator of an ASCII ADU.
pub(crate) const CRLF: &[u8] = b"\r\n";

/// Smallest possible ADU: start marker, address, function code, LRC, CR LF.
const MIN_ADU_LEN: usize = 1 + 2 + 2 + 2 + 2;

/// Maximum payload of a single ASCII ADU.
const MAX_DATA_LEN: usize = 252;

/// En-/decoding of ASCII application data units.
///
/// `verify` and `decode_unit` never mutate shared state and are safe to
/// call concurrently from multiple port workers.
pub trait AsciiCodec {
    /// Structural verification of a raw line: start marker, even number of
    /// hex characters and trailing CR LF.
    fn verify(&self, adu: &[u8]) -> Result<(), FrameError>;

    /// Decode the protocol data unit of a verified line into its function
    /// code and payload.
    ///
    /// The slave address is consumed for the checksum but intentionally not
    /// part of the returned unit; callers parse it from the line themselves.
    fn decode_unit(&self, adu: &[u8]) -> Result<(u8, Bytes), FrameError>;

    /// Encode a protocol data unit addressed to `slave` into a raw line
    /// with the canonical start marker.
    fn encode_unit(
        &self,
        slave: SlaveId,
        function: u8,
        data: &[u8],
    ) -> Result<BytesMut, FrameError>;
}

impl<D> AsciiCodec for D
where
    D: std::ops::Deref + ?Sized,
    D::Target: AsciiCodec,
{
    fn verify(&self, adu: &[u8]) -> Result<(), FrameError> {
        self.deref().verify(adu)
    }

    fn decode_unit(&self, adu: &[u8]) -> Result<(u8, Bytes), FrameError> {
        self.deref().decode_unit(adu)
    }

    fn encode_unit(
        &self,
        slave: SlaveId,
        function: u8,
        data: &[u8],
    ) -> Result<BytesMut, FrameError> {
        self.deref().encode_unit(slave, function, data)
    }
}

/// Reference codec implementing the standard ASCII framing with an LRC
/// checksum.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LrcCodec;

impl AsciiCodec for LrcCodec {
    fn verify(&self, adu: &[u8]) -> Result<(), FrameError> {
        if adu.len() < MIN_ADU_LEN {
            return Err(FrameError::TooShort { len: adu.len() });
        }
        // Hex characters between the start marker and CR LF come in pairs.
        if (adu.len() - 3) % 2 != 0 {
            return Err(FrameError::UnevenLength { len: adu.len() - 3 });
        }
        let marker = adu[0];
        if marker != ASCII_START && marker != ASCII_START_SLAVE {
            return Err(FrameError::StartMarker { marker });
        }
        if &adu[adu.len() - 2..] != CRLF {
            return Err(FrameError::MissingTerminator);
        }
        Ok(())
    }

    fn decode_unit(&self, adu: &[u8]) -> Result<(u8, Bytes), FrameError> {
        if adu.len() < MIN_ADU_LEN {
            return Err(FrameError::TooShort { len: adu.len() });
        }
        let address = decode_hex_byte(&adu[1..3])?;
        let function = decode_hex_byte(&adu[3..5])?;

        let data_end = adu.len() - 4;
        let hex_data = &adu[5..data_end];
        let mut data = BytesMut::with_capacity(hex_data.len() / 2);
        let mut pairs = hex_data.chunks_exact(2);
        for pair in &mut pairs {
            data.put_u8(decode_hex_byte(pair)?);
        }
        if !pairs.remainder().is_empty() {
            return Err(FrameError::UnevenLength { len: adu.len() - 3 });
        }

        let actual = decode_hex_byte(&adu[data_end..data_end + 2])?;
        let expected = calc_lrc([address, function].iter().chain(data.iter()));
        if actual != expected {
            return Err(FrameError::ChecksumMismatch { expected, actual });
        }

        Ok((function, data.freeze()))
    }

    fn encode_unit(
        &self,
        slave: SlaveId,
        function: u8,
        data: &[u8],
    ) -> Result<BytesMut, FrameError> {
        if data.len() > MAX_DATA_LEN {
            return Err(FrameError::PayloadTooLarge { len: data.len() });
        }
        let mut adu = BytesMut::with_capacity(MIN_ADU_LEN + 2 * data.len());
        adu.put_u8(ASCII_START);
        put_hex_byte(&mut adu, slave);
        put_hex_byte(&mut adu, function);
        for byte in data {
            put_hex_byte(&mut adu, *byte);
        }
        let lrc = calc_lrc([slave, function].iter().chain(data.iter()));
        put_hex_byte(&mut adu, lrc);
        adu.put_slice(CRLF);
        Ok(adu)
    }
}

/// LRC over the decoded ADU bytes: two's complement of the byte sum.
fn calc_lrc<'a, I>(bytes: I) -> u8
where
    I: IntoIterator<Item = &'a u8>,
{
    bytes
        .into_iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
        .wrapping_neg()
}

fn hex_value(digit: u8) -> Result<u8, FrameError> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        _ => Err(FrameError::InvalidHexDigit { digit }),
    }
}

/// Decode one hex character pair into a byte, e.g. `"8C"` => `0x8C`.
pub(crate) fn decode_hex_byte(pair: &[u8]) -> Result<u8, FrameError> {
    Ok(hex_value(pair[0])? << 4 | hex_value(pair[1])?)
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn put_hex_byte(buf: &mut BytesMut, value: u8) {
    buf.put_u8(HEX_DIGITS[usize::from(value >> 4)]);
    buf.put_u8(HEX_DIGITS[usize::from(value & 0x0F)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_lrc() {
        let msg = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(calc_lrc(msg.iter()), 0xFB);

        let msg = [0x02, 0x07];
        assert_eq!(calc_lrc(msg.iter()), 0xF7);

        // Sum overflow wraps before complementing.
        let msg = [0xFF, 0xFF, 0x03];
        assert_eq!(calc_lrc(msg.iter()), 0xFF);
    }

    #[test]
    fn test_decode_hex_byte() {
        assert_eq!(decode_hex_byte(b"8C").unwrap(), 0x8C);
        assert_eq!(decode_hex_byte(b"8c").unwrap(), 0x8C);
        assert_eq!(decode_hex_byte(b"00").unwrap(), 0x00);
        assert!(matches!(
            decode_hex_byte(b"G0"),
            Err(FrameError::InvalidHexDigit { digit: b'G' })
        ));
    }

    #[test]
    fn verify_rejects_short_line() {
        let codec = LrcCodec;
        assert!(matches!(
            codec.verify(b":0103\r\n"),
            Err(FrameError::TooShort { len: 7 })
        ));
    }

    #[test]
    fn verify_rejects_uneven_length() {
        let codec = LrcCodec;
        assert!(matches!(
            codec.verify(b":010300000001FB0\r\n"),
            Err(FrameError::UnevenLength { .. })
        ));
    }

    #[test]
    fn verify_rejects_unknown_start_marker() {
        let codec = LrcCodec;
        assert!(matches!(
            codec.verify(b"#010300000001FB\r\n"),
            Err(FrameError::StartMarker { marker: b'#' })
        ));
    }

    #[test]
    fn verify_rejects_missing_terminator() {
        let codec = LrcCodec;
        assert!(matches!(
            codec.verify(b":010300000001FB\r-"),
            Err(FrameError::MissingTerminator)
        ));
    }

    #[test]
    fn verify_accepts_both_start_markers() {
        let codec = LrcCodec;
        assert!(codec.verify(b":010300000001FB\r\n").is_ok());
        assert!(codec.verify(b">010300000001FB\r\n").is_ok());
    }

    #[test]
    fn decode_read_holding_registers_request() {
        let codec = LrcCodec;
        let (function, data) = codec.decode_unit(b">010300000001FB\r\n").unwrap();
        assert_eq!(function, 0x03);
        assert_eq!(&data[..], &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn decode_accepts_lowercase_hex() {
        let codec = LrcCodec;
        let (function, data) = codec.decode_unit(b":0103000000fffd\r\n").unwrap();
        assert_eq!(function, 0x03);
        assert_eq!(&data[..], &[0x00, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn decode_empty_payload() {
        // Function 0x07 (Read Exception Status) carries no data.
        let codec = LrcCodec;
        let (function, data) = codec.decode_unit(b":0207F7\r\n").unwrap();
        assert_eq!(function, 0x07);
        assert!(data.is_empty());
    }

    #[test]
    fn decode_rejects_corrupted_payload() {
        // A single mutated payload byte with the original LRC must fail.
        let codec = LrcCodec;
        assert!(codec.decode_unit(b">010300000001FB\r\n").is_ok());
        assert!(matches!(
            codec.decode_unit(b">010300000002FB\r\n"),
            Err(FrameError::ChecksumMismatch {
                expected: 0xFA,
                actual: 0xFB,
            })
        ));
    }

    #[test]
    fn decode_rejects_invalid_hex() {
        let codec = LrcCodec;
        assert!(matches!(
            codec.decode_unit(b":0103000000ZZFB\r\n"),
            Err(FrameError::InvalidHexDigit { digit: b'Z' })
        ));
    }

    #[test]
    fn encode_read_holding_registers_request() {
        let codec = LrcCodec;
        let adu = codec
            .encode_unit(0x01, 0x03, &[0x00, 0x00, 0x00, 0x01])
            .unwrap();
        assert_eq!(&adu[..], b":010300000001FB\r\n");
    }

    #[test]
    fn encode_uses_uppercase_hex() {
        let codec = LrcCodec;
        let adu = codec.encode_unit(0xAB, 0x83, &[0x02]).unwrap();
        assert_eq!(&adu[..], b":AB8302D0\r\n");
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let codec = LrcCodec;
        let data = vec![0u8; MAX_DATA_LEN + 1];
        assert!(matches!(
            codec.encode_unit(0x01, 0x03, &data),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn round_trip() {
        let codec = LrcCodec;
        let adu = codec
            .encode_unit(0x11, 0x10, &[0x01, 0xFE, 0x00, 0x42])
            .unwrap();
        let (function, data) = codec.decode_unit(&adu).unwrap();
        assert_eq!(function, 0x10);
        assert_eq!(&data[..], &[0x01, 0xFE, 0x00, 0x42]);
    }
}
