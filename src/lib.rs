// SPDX-FileCopyrightText: Copyright (c) 2017-2026 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [Modbus](https://en.wikipedia.org/wiki/Modbus) ASCII server (slave)
//! library based on [tokio](https://tokio.rs).
//!
//! The server reads raw lines from one or more serial ports, decodes them
//! into protocol data units, filters them by the configured slave address
//! and hands matching requests to a generic [`server::Service`]. The
//! service's response is serialized back into the ASCII wire framing and
//! written synchronously on the same port.
//!
//! Each port is served by its own worker task. Frames on one port are
//! processed strictly in arrival order and a response is fully written
//! before the next read begins, as required by shared serial lines.
//!
//! Malformed frames and frames addressed to other slaves are discarded
//! without terminating the worker, matching how real Modbus devices ignore
//! such traffic.

pub mod codec;
pub mod prelude;
pub mod server;

mod error;
mod frame;
mod slave;

pub use crate::{
    error::{Error, FrameError, Result},
    frame::{AsciiFrame, ExceptionCode, SlaveRequest},
    slave::{Slave, SlaveId},
};
