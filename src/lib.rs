// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `zcmd`: a TLS-framed, length-prefixed request/reply and streaming
//! bus for remote command execution, authentication and telemetry.

/// Zero-copy I/O buffers and wire framing.
pub mod buf;
/// Configuration, CLI parsing and logging.
pub mod cfg;
/// Client-side link: request/reply correlation and telemetry subscription.
pub mod client;
/// Permission-gated named command registry.
pub mod cmd;
/// Series compression codecs (integer and float).
pub mod codec;
/// The crate's error type and `Result` alias.
pub mod error;
/// Wire payload types and the frame-type dispatch gate.
pub mod proto;
/// Named worker slots and timers.
pub mod reactor;
/// Server-side link handling: state machine and user-DB dispatcher.
pub mod server;
/// Block-indexed compressed time series.
pub mod series;
/// In-process telemetry producer/consumer model.
pub mod telemetry;
/// TLS transport.
pub mod tls;
/// Server-side user database: users, roles, permissions, API keys.
pub mod userdb;

pub use error::{Error, Result};
