// SPDX-FileCopyrightText: Copyright (c) 2017-2026 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::io;

use thiserror::Error;

/// A structural error in a single received or outgoing ASCII frame.
///
/// All variants are recoverable from the server's point of view: the
/// offending frame is dropped and the port keeps being served.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The line is shorter than the smallest possible ADU
    /// (start marker, address, function code, LRC and terminator).
    #[error("frame too short: {len} bytes")]
    TooShort { len: usize },

    /// The hex-encoded part of the line has an odd number of characters.
    #[error("uneven frame length: {len} hex characters")]
    UnevenLength { len: usize },

    /// The line does not begin with a recognized start marker.
    #[error("invalid start marker: 0x{marker:02X}")]
    StartMarker { marker: u8 },

    /// The line does not end with CR LF.
    #[error("missing CR LF terminator")]
    MissingTerminator,

    /// A character outside `[0-9A-Fa-f]` where a hex digit was expected.
    #[error("invalid hex digit: 0x{digit:02X}")]
    InvalidHexDigit { digit: u8 },

    /// The transmitted LRC does not match the one computed over the
    /// decoded address, function code and payload.
    #[error("LRC mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The payload exceeds what a single ASCII ADU can carry.
    #[error("payload too large: {len} bytes")]
    PayloadTooLarge { len: usize },
}

/// Error type of this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening, reading from or writing to the serial transport failed.
    #[error("serial transport error: {0}")]
    Transport(#[from] io::Error),

    /// A malformed ASCII frame.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Result type of this crate.
pub type Result<T> = std::result::Result<T, Error>;
