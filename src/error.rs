// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Crate-wide error taxonomy.
//!
//! Mirrors the kinds enumerated for the core boundary: transport, framing,
//! protocol, auth, authorization, storage and resource exhaustion. Library
//! code returns [`Result`]; application glue (binaries, command handlers)
//! is free to wrap these in `anyhow::Error` with additional context.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport: {0}")]
    Transport(String),

    #[error("framing: {0}")]
    Framing(String),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("authorization: permission denied ({0})")]
    Authorization(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("resource: {0}")]
    Resource(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }
}
