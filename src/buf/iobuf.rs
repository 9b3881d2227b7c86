// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Reference-counted, relocatable I/O buffer.
//!
//! `IOBuf` is the building block handed between the framing layer and the
//! TLS send queue. It tracks `skip` (head offset), `length` (payload) and
//! `size` (capacity) independently so that a header can be prepended into
//! existing head room without reallocating the payload that follows it —
//! the same shape as the teacher's `RawPdu` (`header: Bytes, payload:
//! Bytes` in `client/common.rs`), generalized to a single growable buffer.

use bytes::{Bytes, BytesMut};

/// Minimum growth factor applied whenever `reserve` must reallocate.
const GROWTH_NUM: usize = 9;
const GROWTH_DEN: usize = 8; // 12.5%

#[derive(Debug, Clone)]
pub struct IOBuf {
    data: BytesMut,
    skip: usize,
    length: usize,
}

impl IOBuf {
    /// Allocate a new buffer with at least `n` bytes of capacity.
    pub fn alloc(n: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(n),
            skip: 0,
            length: 0,
        }
    }

    #[inline]
    pub fn skip(&self) -> usize {
        self.skip
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.capacity()
    }

    /// Invariant check: `skip + length <= size`.
    #[inline]
    pub fn check_invariant(&self) -> bool {
        self.skip.saturating_add(self.length) <= self.size()
    }

    /// The readable payload, `[skip, skip+length)`.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.skip..self.skip + self.length]
    }

    /// Ensure at least `n` bytes of trailing capacity beyond the current
    /// payload, growing geometrically (>= 12.5%) when a reallocation is
    /// unavoidable.
    pub fn reserve(&mut self, n: usize) {
        let have = self.data.capacity() - (self.skip + self.length);
        if have >= n {
            return;
        }
        let needed = self.skip + self.length + n;
        let grown = self.data.capacity() + self.data.capacity() / GROWTH_DEN * GROWTH_NUM
            / GROWTH_DEN.max(1)
            + 1;
        let target = needed.max(grown);
        let mut fresh = BytesMut::with_capacity(target);
        fresh.extend_from_slice(self.as_slice());
        self.data = fresh;
        self.skip = 0;
    }

    /// Append bytes to the tail of the payload, growing if necessary.
    pub fn append(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.data.resize(self.skip + self.length + bytes.len(), 0);
        self.data[self.skip + self.length..self.skip + self.length + bytes.len()]
            .copy_from_slice(bytes);
        self.length += bytes.len();
    }

    /// Grow head room by `n` bytes so a caller can write a header in front
    /// of the existing payload without copying the payload itself.
    pub fn prepend(&mut self, n: usize) {
        if self.skip >= n {
            return;
        }
        let mut fresh = BytesMut::with_capacity(n + self.length);
        fresh.resize(n, 0);
        fresh.extend_from_slice(self.as_slice());
        self.data = fresh;
        self.skip = n;
    }

    /// Write `bytes` into the head room immediately before the payload.
    /// Panics if `prepend(bytes.len())` was not called first.
    pub fn write_head(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.skip, "insufficient head room");
        let start = self.skip - bytes.len();
        self.data[start..self.skip].copy_from_slice(bytes);
        self.skip = start;
        self.length += bytes.len();
    }

    /// Hand off the payload as an owned, ref-counted `Bytes`, detaching it
    /// from this buffer. The buffer is left empty.
    pub fn detach(&mut self) -> Bytes {
        let out = Bytes::copy_from_slice(self.as_slice());
        self.skip = 0;
        self.length = 0;
        out
    }
}

impl Default for IOBuf {
    fn default() -> Self {
        Self::alloc(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_prepend_preserve_payload() {
        let mut buf = IOBuf::alloc(4);
        buf.append(b"world");
        assert_eq!(buf.as_slice(), b"world");
        buf.prepend(6);
        buf.write_head(b"hello ");
        assert_eq!(buf.as_slice(), b"hello world");
        assert!(buf.check_invariant());
    }

    #[test]
    fn detach_empties_buffer() {
        let mut buf = IOBuf::alloc(8);
        buf.append(b"abc");
        let out = buf.detach();
        assert_eq!(&out[..], b"abc");
        assert_eq!(buf.length(), 0);
    }

    #[test]
    fn reserve_grows_geometrically() {
        let mut buf = IOBuf::alloc(4);
        let before = buf.size();
        buf.append(&vec![0u8; 64]);
        assert!(buf.size() >= before + 64);
    }
}
