// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Block metadata and the pluggable persistence seam a series writes
//! sealed blocks through and readers fetch them back from.

use dashmap::DashMap;

use crate::error::{Error, Result};

/// Header carried alongside every sealed block's compressed bytes.
#[derive(Debug, Clone, Copy)]
pub struct BlockMeta<T> {
    /// Sample offset of this block's first sample within the series.
    pub offset: u64,
    pub count: u32,
    pub last_value: T,
    pub ndp: u8,
}

/// External persistence for sealed block bytes, addressed by series ID
/// and block ordinal (not byte offset). The codec only defines the
/// block-internal byte layout; how blocks are stored is up to the
/// implementation.
pub trait BlockStore: Send + Sync {
    fn load_blk(&self, series_id: &str, blk_ordinal: u64) -> Result<Vec<u8>>;
    fn save_blk(&self, series_id: &str, blk_ordinal: u64, data: &[u8]) -> Result<()>;
}

/// An in-memory [`BlockStore`], sufficient for a single-process series
/// store or for tests.
#[derive(Debug, Default)]
pub struct MemStore {
    blocks: DashMap<(String, u64), Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemStore {
    fn load_blk(&self, series_id: &str, blk_ordinal: u64) -> Result<Vec<u8>> {
        self.blocks
            .get(&(series_id.to_string(), blk_ordinal))
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                Error::storage(format!(
                    "NotAvailable: block {blk_ordinal} of series {series_id} not found"
                ))
            })
    }

    fn save_blk(&self, series_id: &str, blk_ordinal: u64, data: &[u8]) -> Result<()> {
        self.blocks
            .insert((series_id.to_string(), blk_ordinal), data.to_vec());
        Ok(())
    }
}
