//! In-process telemetry producer/consumer model: structured records
//! with RAG status and series-aware field metadata.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Per-field series/delta/key metadata.
pub mod field;
/// Snapshot-then-subscribe multicast from observers to links.
pub mod hub;
/// Record types and their RAG formulas.
pub mod record;
/// Telemetry requests and acks.
pub mod request;
/// Red/Amber/Green status.
pub mod rag;

pub use field::FieldMeta;
pub use hub::Hub;
pub use rag::Rag;
pub use record::Record;
pub use request::{ReqAck, ReqType, TelReq};
