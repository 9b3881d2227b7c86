// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bridges the concrete integer/float codecs behind one interface so
//! the block-indexed series store in [`super::series`] can stay generic
//! over sample type.

use crate::{
    codec::{float_series, int_series},
    error::Result,
};

pub trait SeriesCodec {
    type Sample: Copy + PartialEq + PartialOrd;
    type Encoder;

    fn new_encoder(cap_bytes: usize) -> Self::Encoder;
    fn write(enc: &mut Self::Encoder, value: Self::Sample) -> bool;
    fn finish(enc: Self::Encoder) -> Vec<u8>;
    fn decode_all(buf: &[u8]) -> Result<Vec<Self::Sample>>;

    /// Positions a fresh decoder over `buf` at the first sample `>=
    /// value` using the codec reader's `search`, returning that
    /// sample's index within the block. `None` if every sample in the
    /// block is less than `value`.
    fn find_at_least(buf: &[u8], value: Self::Sample) -> Option<u32>;
}

/// Absolute (non-delta) integer series.
pub struct IntCodec;

impl SeriesCodec for IntCodec {
    type Encoder = int_series::Encoder;
    type Sample = i64;

    fn new_encoder(cap_bytes: usize) -> Self::Encoder {
        int_series::Encoder::new(cap_bytes)
    }

    fn write(enc: &mut Self::Encoder, value: i64) -> bool {
        enc.write(value)
    }

    fn finish(enc: Self::Encoder) -> Vec<u8> {
        enc.finish()
    }

    fn decode_all(buf: &[u8]) -> Result<Vec<i64>> {
        int_series::decode_all(buf)
    }

    fn find_at_least(buf: &[u8], value: i64) -> Option<u32> {
        let mut dec = int_series::Decoder::new(buf);
        dec.search(|v, run| if v >= value { 0 } else { run })
            .then(|| dec.offset())
    }
}

/// First-differenced integer series, selected for fields marked `delta`.
pub struct DeltaIntCodec;

impl SeriesCodec for DeltaIntCodec {
    type Encoder = int_series::DeltaEncoder;
    type Sample = i64;

    fn new_encoder(cap_bytes: usize) -> Self::Encoder {
        int_series::DeltaEncoder::new(cap_bytes)
    }

    fn write(enc: &mut Self::Encoder, value: i64) -> bool {
        enc.write(value)
    }

    fn finish(enc: Self::Encoder) -> Vec<u8> {
        enc.finish()
    }

    fn decode_all(buf: &[u8]) -> Result<Vec<i64>> {
        let mut dec = int_series::DeltaDecoder::new(buf);
        let mut out = Vec::new();
        while let Some(v) = dec.read() {
            out.push(v);
        }
        Ok(out)
    }

    fn find_at_least(buf: &[u8], value: i64) -> Option<u32> {
        let mut dec = int_series::DeltaDecoder::new(buf);
        dec.search(|v, run| if v >= value { 0 } else { run })
            .then(|| dec.offset())
    }
}

/// Chimp-compressed float series.
pub struct FloatCodec;

impl SeriesCodec for FloatCodec {
    type Encoder = float_series::Encoder;
    type Sample = f64;

    fn new_encoder(cap_bytes: usize) -> Self::Encoder {
        float_series::Encoder::new(cap_bytes)
    }

    fn write(enc: &mut Self::Encoder, value: f64) -> bool {
        enc.write(value)
    }

    fn finish(enc: Self::Encoder) -> Vec<u8> {
        enc.finish()
    }

    fn decode_all(buf: &[u8]) -> Result<Vec<f64>> {
        float_series::decode_all(buf)
    }

    fn find_at_least(buf: &[u8], value: f64) -> Option<u32> {
        let mut dec = float_series::Decoder::new(buf);
        dec.search(|v, run| if v >= value { 0 } else { run })
            .then(|| dec.offset())
    }
}
