// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Block-indexed, seekable, searchable series with a single writer and
//! any number of readers sharing the same cursor-free read API (each
//! caller keeps its own cursor state by holding its own [`Series`]
//! handle over a shared [`BlockStore`]).
//!
//! A series is split into blocks of approximately `blk_cap` compressed
//! bytes; the active (unsealed) tail block is mirrored in
//! `active_samples` so reads against it don't need a round trip through
//! the codec. Sealed blocks are decoded on demand and cached for the
//! lifetime of the cursor's visit.

use std::sync::Arc;

use super::{
    block::{BlockMeta, BlockStore},
    codec::SeriesCodec,
};
use crate::error::{Error, Result};

pub struct Series<C: SeriesCodec> {
    id: String,
    store: Arc<dyn BlockStore>,
    blk_cap: usize,
    ndp: u8,

    /// Sealed block headers, ordered by ordinal; `index[i]` has ordinal
    /// `head_ordinal + i`. Invariant: offsets are strictly contiguous.
    index: Vec<BlockMeta<C::Sample>>,
    head_ordinal: u64,

    active: Option<C::Encoder>,
    active_samples: Vec<C::Sample>,

    /// Total samples ever written, absolute and unaffected by `purge`.
    total_written: u64,

    /// Read cursor, an absolute sample offset from series creation.
    cursor: u64,
}

impl<C: SeriesCodec> Series<C> {
    pub fn new(id: impl Into<String>, store: Arc<dyn BlockStore>, blk_cap: usize, ndp: u8) -> Self {
        Self {
            id: id.into(),
            store,
            blk_cap,
            ndp,
            index: Vec::new(),
            head_ordinal: 0,
            active: None,
            active_samples: Vec::new(),
            total_written: 0,
            cursor: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Absolute offset of the oldest sample still reachable by a reader
    /// (advances when `purge` drops sealed blocks).
    pub fn available_from(&self) -> u64 {
        self.index
            .first()
            .map(|b| b.offset)
            .unwrap_or(self.total_written - self.active_samples.len() as u64)
    }

    /// Total samples ever written to this series, regardless of `purge`.
    pub fn len(&self) -> u64 {
        self.total_written
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_blk_ordinal(&self) -> u64 {
        self.head_ordinal + self.index.len() as u64
    }

    /// Append a sample, sealing and persisting the active block first if
    /// it has no room left.
    pub fn write(&mut self, value: C::Sample) -> Result<()> {
        if self.active.is_none() {
            self.active = Some(C::new_encoder(self.blk_cap));
        }
        let fits = C::write(self.active.as_mut().expect("just set"), value);
        if !fits {
            self.seal()?;
            self.active = Some(C::new_encoder(self.blk_cap));
            if !C::write(self.active.as_mut().expect("just set"), value) {
                return Err(Error::resource("sample does not fit in an empty block"));
            }
        }
        self.active_samples.push(value);
        self.total_written += 1;
        Ok(())
    }

    /// Seal the active block (if any samples were written to it) and
    /// persist it via the backing [`BlockStore`].
    pub fn seal(&mut self) -> Result<()> {
        let Some(enc) = self.active.take() else {
            return Ok(());
        };
        if self.active_samples.is_empty() {
            return Ok(());
        }
        let bytes = C::finish(enc);
        let ordinal = self.next_blk_ordinal();
        self.store.save_blk(&self.id, ordinal, &bytes)?;
        let meta = BlockMeta {
            offset: self.total_written - self.active_samples.len() as u64,
            count: self.active_samples.len() as u32,
            last_value: *self.active_samples.last().expect("checked non-empty"),
            ndp: self.ndp,
        };
        self.index.push(meta);
        self.active_samples.clear();
        Ok(())
    }

    fn load_block(&self, rel_idx: usize) -> Result<Vec<C::Sample>> {
        let ordinal = self.head_ordinal + rel_idx as u64;
        let bytes = self.store.load_blk(&self.id, ordinal)?;
        C::decode_all(&bytes)
    }

    /// Advance the cursor to an absolute sample offset. Fails if the
    /// offset has already been dropped by `purge` or is past the end.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.total_written {
            return Err(Error::storage("NotFound: seek past end of series"));
        }
        if offset < self.available_from() {
            return Err(Error::storage("NotFound: seek into a purged range"));
        }
        self.cursor = offset;
        Ok(())
    }

    /// Read the sample at the cursor, advancing it by one. Rolls across
    /// sealed block boundaries transparently.
    pub fn read(&mut self) -> Result<Option<C::Sample>> {
        if self.cursor >= self.total_written {
            return Ok(None);
        }
        let sealed = self.total_written - self.active_samples.len() as u64;
        let value = if self.cursor < sealed {
            let rel_idx = self
                .index
                .binary_search_by(|b| {
                    if self.cursor < b.offset {
                        std::cmp::Ordering::Greater
                    } else if self.cursor >= b.offset + b.count as u64 {
                        std::cmp::Ordering::Less
                    } else {
                        std::cmp::Ordering::Equal
                    }
                })
                .map_err(|_| Error::storage("NotAvailable: block index corrupt"))?;
            let block = self.load_block(rel_idx)?;
            let within = (self.cursor - self.index[rel_idx].offset) as usize;
            *block
                .get(within)
                .ok_or_else(|| Error::storage("NotAvailable: short block"))?
        } else {
            let within = (self.cursor - sealed) as usize;
            self.active_samples[within]
        };
        self.cursor += 1;
        Ok(Some(value))
    }

    /// Purge the index head up to but not including `blk_ordinal`,
    /// permanently dropping older samples from the readable range.
    pub fn purge(&mut self, blk_ordinal: u64) -> Result<()> {
        if blk_ordinal < self.head_ordinal || blk_ordinal > self.next_blk_ordinal() {
            return Err(Error::storage("NotFound: purge ordinal out of range"));
        }
        let drop = (blk_ordinal - self.head_ordinal) as usize;
        self.index.drain(0..drop);
        self.head_ordinal = blk_ordinal;
        Ok(())
    }
}

impl<C> Series<C>
where
    C: SeriesCodec,
    C::Sample: PartialOrd,
{
    /// Binary-search by block-end value (valid only for a
    /// monotonically non-decreasing series), then position the cursor
    /// at the first sample `>= value`. Misuse on a non-monotonic series
    /// is a programmer error and surfaces as a storage `NotFound`.
    pub fn find(&mut self, value: C::Sample) -> Result<()> {
        let blk_idx = self.index.partition_point(|b| b.last_value < value);
        if blk_idx == self.index.len() {
            // not found among sealed blocks; scan the active tail.
            let pos = self
                .active_samples
                .iter()
                .position(|v| *v >= value)
                .unwrap_or(self.active_samples.len());
            self.cursor = self.sealed_sample_count() + pos as u64;
            return Ok(());
        }
        let ordinal = self.head_ordinal + blk_idx as u64;
        let bytes = self.store.load_blk(&self.id, ordinal)?;
        let within = C::find_at_least(&bytes, value)
            .ok_or_else(|| Error::storage("NotFound: value not present in monotone series"))?;
        self.cursor = self.index[blk_idx].offset + within as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{block::MemStore, codec::IntCodec};

    #[test]
    fn write_seek_read_round_trip() {
        let store = Arc::new(MemStore::new());
        let mut series: Series<IntCodec> = Series::new("s1", store, 8, 0);
        let values: Vec<i64> = (0..40).collect();
        for &v in &values {
            series.write(v).unwrap();
        }
        series.seal().unwrap();

        series.seek(10).unwrap();
        let read_from_10: Vec<i64> = (0..30)
            .map(|_| series.read().unwrap().unwrap())
            .collect();
        assert_eq!(read_from_10, values[10..]);
    }

    #[test]
    fn find_positions_at_least_value_in_monotone_series() {
        let store = Arc::new(MemStore::new());
        let mut series: Series<IntCodec> = Series::new("s2", store, 8, 0);
        for v in [0i64, 0, 0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233] {
            series.write(v).unwrap();
        }
        series.seal().unwrap();
        series.find(10).unwrap();
        assert_eq!(series.read().unwrap(), Some(13));
    }

    #[test]
    fn purge_drops_older_blocks_from_read_range() {
        let store = Arc::new(MemStore::new());
        let mut series: Series<IntCodec> = Series::new("s3", store, 8, 0);
        for v in 0..64i64 {
            series.write(v).unwrap();
        }
        series.seal().unwrap();
        assert!(series.index.len() > 1, "expected more than one sealed block");
        let purge_to = series.head_ordinal + 1;
        series.purge(purge_to).unwrap();
        assert_eq!(series.len(), 64);
        assert!(series.available_from() > 0);
        assert!(series.seek(0).is_err());
        assert!(series.seek(series.available_from()).is_ok());
    }
}
