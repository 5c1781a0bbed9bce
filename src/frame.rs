// SPDX-FileCopyrightText: Copyright (c) 2017-2026 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ASCII frame and exception types.

use std::{error, fmt};

use bytes::Bytes;
use log::error;

use crate::{
    codec::{decode_hex_byte, AsciiCodec, ASCII_START_SLAVE},
    error::FrameError,
    slave::{Slave, SlaveId},
};

/// A decoded ASCII protocol data unit together with the slave address it
/// was sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiFrame {
    slave: Slave,
    function: u8,
    data: Bytes,
}

impl AsciiFrame {
    /// Create a new frame addressed to `slave`.
    pub fn new(slave: Slave, function: u8, data: impl Into<Bytes>) -> Self {
        Self {
            slave,
            function,
            data: data.into(),
        }
    }

    /// Decode a raw line received from the wire.
    ///
    /// The codec verifies the framing (start marker, hex characters, LRC,
    /// CR LF terminator) and decodes the protocol data unit. The slave
    /// address is the first hex character pair after the start marker; it
    /// is parsed here because it is not part of the decoded unit.
    ///
    /// Pure and free of shared state; safe to call from multiple port
    /// workers concurrently.
    pub fn decode<C: AsciiCodec + ?Sized>(codec: &C, adu: &[u8]) -> Result<Self, FrameError> {
        codec.verify(adu)?;
        let slave = Slave(decode_hex_byte(&adu[1..3])?);
        let (function, data) = codec.decode_unit(adu)?;
        Ok(Self {
            slave,
            function,
            data,
        })
    }

    /// Encode this frame into a raw line for the wire.
    ///
    /// The first byte of the encoded line is forced to `>`; the devices on
    /// this bus expect it instead of the standard `:` marker.
    ///
    /// An encode failure is not propagated: it is logged and an empty byte
    /// sequence is returned. Callers must treat a zero-length result as
    /// "nothing to send".
    pub fn encode<C: AsciiCodec + ?Sized>(&self, codec: &C) -> Bytes {
        match codec.encode_unit(self.slave.into(), self.function, &self.data) {
            Ok(mut adu) => {
                adu[0] = ASCII_START_SLAVE;
                adu.freeze()
            }
            Err(err) => {
                error!("error encoding ASCII frame: {err}");
                Bytes::new()
            }
        }
    }

    /// The slave address parsed from resp. written to the wire.
    pub fn slave(&self) -> Slave {
        self.slave
    }

    /// The function code of the protocol data unit.
    pub fn function(&self) -> u8 {
        self.function
    }

    /// The payload of the protocol data unit.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the payload.
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
    }

    /// Turn this frame into an exception response: the high bit of the
    /// function code is set and the payload is the single exception byte.
    pub fn set_exception(&mut self, exception: ExceptionCode) {
        self.function |= 0x80;
        self.data = Bytes::copy_from_slice(&[exception.into()]);
    }
}

/// A request for a slave as received by a server.
///
/// Created per inbound line and consumed synchronously by the service; the
/// serial port itself stays with the worker that read the line.
#[derive(Debug, Clone)]
pub struct SlaveRequest {
    /// Slave address of the frame, identical to its configured listener.
    pub slave: SlaveId,
    /// The decoded frame.
    pub frame: AsciiFrame,
}

impl From<AsciiFrame> for SlaveRequest {
    fn from(frame: AsciiFrame) -> Self {
        Self {
            slave: frame.slave().into(),
            frame,
        }
    }
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    /// 0x01
    IllegalFunction,
    /// 0x02
    IllegalDataAddress,
    /// 0x03
    IllegalDataValue,
    /// 0x04
    ServerDeviceFailure,
    /// 0x05
    Acknowledge,
    /// 0x06
    ServerDeviceBusy,
    /// 0x08
    MemoryParityError,
    /// 0x0A
    GatewayPathUnavailable,
    /// 0x0B
    GatewayTargetDevice,
    /// None of the above.
    ///
    /// Although encoding one of the predefined values as this is possible, it is not recommended.
    /// Instead, prefer to use [`Self::new()`] to prevent such ambiguities.
    Custom(u8),
}

impl From<ExceptionCode> for u8 {
    fn from(from: ExceptionCode) -> Self {
        use ExceptionCode::*;
        match from {
            IllegalFunction => 0x01,
            IllegalDataAddress => 0x02,
            IllegalDataValue => 0x03,
            ServerDeviceFailure => 0x04,
            Acknowledge => 0x05,
            ServerDeviceBusy => 0x06,
            MemoryParityError => 0x08,
            GatewayPathUnavailable => 0x0A,
            GatewayTargetDevice => 0x0B,
            Custom(code) => code,
        }
    }
}

impl ExceptionCode {
    /// Create a new [`ExceptionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        use ExceptionCode::*;
        match value {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            other => Custom(other),
        }
    }

    pub(crate) fn description(&self) -> &str {
        use ExceptionCode::*;
        match *self {
            IllegalFunction => "Illegal function",
            IllegalDataAddress => "Illegal data address",
            IllegalDataValue => "Illegal data value",
            ServerDeviceFailure => "Server device failure",
            Acknowledge => "Acknowledge",
            ServerDeviceBusy => "Server device busy",
            MemoryParityError => "Memory parity error",
            GatewayPathUnavailable => "Gateway path unavailable",
            GatewayTargetDevice => "Gateway target device failed to respond",
            Custom(_) => "Custom",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl error::Error for ExceptionCode {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LrcCodec;

    #[test]
    fn decode_request_line() {
        let frame = AsciiFrame::decode(&LrcCodec, b">010300000001FB\r\n").unwrap();
        assert_eq!(frame.slave(), Slave(0x01));
        assert_eq!(frame.function(), 0x03);
        assert_eq!(frame.data(), &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn encode_starts_with_overridden_marker() {
        let frame = AsciiFrame::new(Slave(0x01), 0x03, vec![0x00, 0x00, 0x00, 0x01]);
        let line = frame.encode(&LrcCodec);
        assert_eq!(&line[..], b">010300000001FB\r\n");
    }

    #[test]
    fn decode_encode_round_trip() {
        let line = b">010300000001FB\r\n";
        let frame = AsciiFrame::decode(&LrcCodec, line).unwrap();
        assert_eq!(&frame.encode(&LrcCodec)[..], line);
    }

    #[test]
    fn encode_decode_round_trip() {
        let frame = AsciiFrame::new(Slave(0x42), 0x10, vec![0x12, 0x34]);
        let decoded = AsciiFrame::decode(&LrcCodec, &frame.encode(&LrcCodec)).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn encode_failure_yields_empty_line() {
        let frame = AsciiFrame::new(Slave(0x01), 0x03, vec![0u8; 300]);
        assert!(frame.encode(&LrcCodec).is_empty());
    }

    #[test]
    fn set_exception_marks_function_code() {
        let mut frame = AsciiFrame::new(Slave(0x01), 0x03, vec![0x00, 0x00, 0x00, 0x01]);
        frame.set_exception(ExceptionCode::IllegalDataAddress);
        assert_eq!(frame.function(), 0x83);
        assert_eq!(frame.data(), &[0x02]);
    }

    #[test]
    fn cloned_frame_is_independent() {
        let request = AsciiFrame::new(Slave(0x01), 0x03, vec![0x00, 0x00, 0x00, 0x01]);
        let mut response = request.clone();
        response.set_exception(ExceptionCode::IllegalFunction);
        assert_eq!(request.function(), 0x03);
        assert_eq!(request.data(), &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(response.function(), 0x83);
    }

    #[test]
    fn exception_code_values() {
        for value in 0x01..=0x0B {
            assert_eq!(u8::from(ExceptionCode::new(value)), value);
        }
    }
}
