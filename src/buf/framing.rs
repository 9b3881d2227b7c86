// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire framing: a fixed 14-byte little-endian header in front of every
//! message, following the same zero-copy BHS idiom as the teacher's
//! `models/opcode.rs` / `models/login/request.rs` (a `#[repr(C)]` struct
//! deriving `zerocopy::{FromBytes, IntoBytes}`), generalized from a
//! big-endian 48-byte iSCSI BHS to a little-endian 14-byte frame header.

use bytes::{Bytes, BytesMut};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, U16, U32, U64};

use crate::{
    buf::iobuf::IOBuf,
    error::{Error, Result},
};

pub const HEADER_LEN: usize = 14;

/// `{ length: u32, type: u16, seqNo: u64 }`, little-endian, `length`
/// excludes the header itself.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    pub length: U32<LittleEndian>,
    pub ty: U16<LittleEndian>,
    pub seq_no: U64<LittleEndian>,
}

impl FrameHeader {
    pub fn new(length: u32, ty: u16, seq_no: u64) -> Self {
        Self {
            length: U32::new(length),
            ty: U16::new(ty),
            seq_no: U64::new(seq_no),
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(self.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::framing("truncated frame header"));
        }
        FrameHeader::read_from_bytes(&bytes[..HEADER_LEN])
            .map_err(|_| Error::framing("malformed frame header"))
    }
}

/// A decoded frame: its header plus a zero-copy view of the body.
#[derive(Debug, Clone)]
pub struct Frame {
    pub ty: u16,
    pub seq_no: u64,
    pub body: Bytes,
}

/// Encode `payload` behind a frame header, reusing `buf`'s head room the
/// way `PDUWithData::build` reuses `header_buf` (§4.1: `prepend` grows
/// head room so the header never forces a copy of the payload).
pub fn encode(buf: &mut IOBuf, ty: u16, seq_no: u64, payload: &[u8]) -> Bytes {
    buf.prepend(HEADER_LEN);
    buf.append(payload);
    let hdr = FrameHeader::new(payload.len() as u32, ty, seq_no);
    buf.write_head(&hdr.to_bytes());
    Bytes::copy_from_slice(buf.as_slice())
}

/// Decode one frame from the front of `rx`, if a complete frame is
/// present. Returns `Ok(None)` when more bytes are needed. `max_message`
/// enforces the configurable cap on `length` (default 1 MiB).
pub fn decode(rx: &mut BytesMut, max_message: u32) -> Result<Option<Frame>> {
    if rx.len() < HEADER_LEN {
        return Ok(None);
    }
    let hdr = FrameHeader::from_bytes(&rx[..HEADER_LEN])?;
    let length = hdr.length.get();
    if length > max_message {
        return Err(Error::framing(format!(
            "oversize frame: {length} > {max_message}"
        )));
    }
    let total = HEADER_LEN + length as usize;
    if rx.len() < total {
        return Ok(None);
    }
    let mut frame_bytes = rx.split_to(total);
    let body = frame_bytes.split_off(HEADER_LEN).freeze();
    Ok(Some(Frame {
        ty: hdr.ty.get(),
        seq_no: hdr.seq_no.get(),
        body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut buf = IOBuf::alloc(64);
        let wire = encode(&mut buf, 3, 42, b"hello");
        let mut rx = BytesMut::from(&wire[..]);
        let frame = decode(&mut rx, 1 << 20).unwrap().unwrap();
        assert_eq!(frame.ty, 3);
        assert_eq!(frame.seq_no, 42);
        assert_eq!(&frame.body[..], b"hello");
        assert!(rx.is_empty());
    }

    #[test]
    fn partial_frame_returns_none() {
        let mut buf = IOBuf::alloc(64);
        let wire = encode(&mut buf, 1, 1, b"0123456789");
        let mut rx = BytesMut::from(&wire[..wire.len() - 2]);
        assert!(decode(&mut rx, 1 << 20).unwrap().is_none());
    }

    #[test]
    fn oversize_is_rejected() {
        let mut rx = BytesMut::new();
        let hdr = FrameHeader::new(100, 1, 0);
        rx.extend_from_slice(&hdr.to_bytes());
        rx.extend_from_slice(&[0u8; 100]);
        assert!(decode(&mut rx, 16).is_err());
    }

    #[test]
    fn corrupted_length_field_is_seen_as_incomplete() {
        let mut buf = IOBuf::alloc(64);
        let wire = encode(&mut buf, 7, 99, b"payload");
        let mut corrupted = BytesMut::from(&wire[..]);
        corrupted[0] ^= 0xff;
        assert!(decode(&mut corrupted, 1 << 20).unwrap().is_none());
    }
}
