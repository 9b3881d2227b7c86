// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Payload (de)serialization plus the frame-type gate. Per Design Notes
//! §9 ("adding a new type is an explicit, compile-checked operation"),
//! there is no runtime `type -> handler` map here: `FrameType` is a
//! closed enum and `server::fsm`/`client::fsm` each hold one exhaustive
//! `match` over it. This module supplies only the shared, type-generic
//! pieces: decoding a frame body against the schema serde already
//! derives, and encoding a reply body behind a fresh frame header.

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    buf::{framing, iobuf::IOBuf},
    error::{Error, Result},
};

/// Deserialize a frame body as `T`; a structurally invalid payload is
/// exactly spec.md §4.1's "schema check of the serialized payload"
/// failing, which tears the link down the same way a truncated or
/// oversize frame does.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::framing(format!("schema verify failed: {e}")))
}

/// Encode `payload` behind a fresh frame header of the given type and
/// sequence number.
pub fn encode_reply<T: Serialize>(ty: impl Into<u16>, seq_no: u64, payload: &T) -> Result<bytes::Bytes> {
    let body = serde_json::to_vec(payload).map_err(|e| Error::framing(format!("encode failed: {e}")))?;
    let mut buf = IOBuf::alloc(framing::HEADER_LEN + body.len());
    Ok(framing::encode(&mut buf, ty.into(), seq_no, &body))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Example {
        a: u32,
        b: String,
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let payload = Example { a: 7, b: "hi".into() };
        let wire = encode_reply(1u16, 42, &payload).unwrap();
        let mut rx = bytes::BytesMut::from(&wire[..]);
        let frame = framing::decode(&mut rx, 1 << 20).unwrap().unwrap();
        let decoded: Example = decode_body(&frame.body).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn malformed_body_is_a_framing_error() {
        let result: Result<Example> = decode_body(b"not json");
        assert!(result.is_err());
    }
}
