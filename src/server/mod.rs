// SPDX-FileCopyrightText: Copyright (c) 2017-2026 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server (slave) implementation

mod ascii;
mod service;

pub use self::{ascii::Server, service::Service};
