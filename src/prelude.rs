// SPDX-FileCopyrightText: Copyright (c) 2017-2026 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types and traits

///////////////////////////////////////////////////////////////////
/// Types
///////////////////////////////////////////////////////////////////
pub use crate::{AsciiFrame, ExceptionCode, SlaveRequest};
pub use crate::{Slave, SlaveId};

pub use crate::codec::LrcCodec;
pub use crate::server::Server;

///////////////////////////////////////////////////////////////////
/// Traits
///////////////////////////////////////////////////////////////////
pub use crate::codec::AsciiCodec;
pub use crate::server::Service;
