//! Zero-copy I/O buffers and wire framing.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Fixed frame header encode/decode.
pub mod framing;
/// Relocatable reference-counted buffer.
pub mod iobuf;
