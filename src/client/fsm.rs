// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The client side of a `zcmd` link (spec.md §4.10): send a framed
//! request, correlate its reply by sequence number, and demux
//! unsolicited `Telemetry` pushes onto a broadcast channel a caller can
//! subscribe to independently of any in-flight request.
//!
//! Grounded on the teacher's `ClientConnection` (`client/client.rs`):
//! the same split of "one task owns the socket read loop, callers wait
//! on a per-request channel" — here keyed by the frame header's
//! `seqNo` in place of the iSCSI ITT, and a oneshot per request instead
//! of a bounded mpsc since every zcmd reply is exactly one frame
//! (telemetry deltas ride the separate broadcast channel instead).

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bytes::Bytes;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    buf::framing::Frame,
    error::{Error, Result},
    proto::{
        dispatch,
        types::{Credentials, FrameType, LoginAck, LoginReq},
    },
    telemetry::Record,
    tls::{FrameReassembler, TlsLink},
};

/// A connected, not-yet-logged-in-or-logged-in client link. Reading is
/// driven by a single background task spawned from [`ClientLink::connect`];
/// every public method here only ever writes, then waits on a per-request
/// channel the read loop completes.
pub struct ClientLink {
    link: Mutex<tokio::io::WriteHalf<TlsLink>>,
    next_seq: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<Frame>>,
    telemetry_tx: broadcast::Sender<Record>,
    cancel: CancellationToken,
}

impl ClientLink {
    /// Take ownership of an already ALPN-verified [`TlsLink`] and start
    /// its read loop. `max_message` mirrors `ServerConfig::max_message`
    /// (spec.md §4.1's configurable frame-length cap).
    pub fn spawn(link: TlsLink, max_message: u32) -> Arc<Self> {
        let (read_half, write_half) = tokio::io::split(link);
        let (telemetry_tx, _rx) = broadcast::channel(1024);
        let this = Arc::new(Self {
            link: Mutex::new(write_half),
            next_seq: AtomicU64::new(1),
            pending: DashMap::new(),
            telemetry_tx,
            cancel: CancellationToken::new(),
        });
        let reader = this.clone();
        tokio::spawn(async move {
            if let Err(e) = reader.read_loop(read_half, max_message).await {
                warn!("client read loop exited: {e}");
            }
        });
        this
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<Record> {
        self.telemetry_tx.subscribe()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    async fn read_loop(self: Arc<Self>, mut read_half: tokio::io::ReadHalf<TlsLink>, max_message: u32) -> Result<()> {
        use tokio::io::AsyncReadExt;

        let mut reasm = FrameReassembler::new(max_message);
        let mut scratch = [0u8; 64 * 1024];
        loop {
            let n = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                n = read_half.read(&mut scratch) => n.map_err(|e| Error::transport(format!("read failed: {e}")))?,
            };
            if n == 0 {
                return Err(Error::transport("connection closed by peer"));
            }
            for frame in reasm.process(&scratch[..n])? {
                self.dispatch_inbound(frame);
            }
        }
    }

    fn dispatch_inbound(&self, frame: Frame) {
        if frame.ty == u16::from(FrameType::Telemetry) {
            if let Ok(record) = dispatch::decode_body::<Record>(&frame.body) {
                let _ = self.telemetry_tx.send(record);
            }
            return;
        }
        if let Some((_, tx)) = self.pending.remove(&frame.seq_no) {
            let _ = tx.send(frame);
        }
    }

    /// Send `payload` framed as `ty` and wait for the one reply frame
    /// sharing its sequence number.
    async fn call_raw(&self, ty: FrameType, payload: &[u8]) -> Result<Frame> {
        let seq_no = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq_no, tx);

        let mut buf = crate::buf::iobuf::IOBuf::alloc(crate::buf::framing::HEADER_LEN + payload.len());
        let wire = crate::buf::framing::encode(&mut buf, ty.into(), seq_no, payload);
        if let Err(e) = self.write_all(&wire).await {
            self.pending.remove(&seq_no);
            return Err(e);
        }

        rx.await.map_err(|_| Error::transport("connection closed before a reply arrived"))
    }

    async fn write_all(&self, wire: &Bytes) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut w = self.link.lock().await;
        w.write_all(wire)
            .await
            .map_err(|e| Error::transport(format!("write failed: {e}")))
    }

    async fn call<Req: Serialize, Ack: DeserializeOwned>(&self, ty: FrameType, req: &Req) -> Result<Ack> {
        let body = serde_json::to_vec(req).map_err(|e| Error::framing(format!("encode failed: {e}")))?;
        let frame = self.call_raw(ty, &body).await?;
        dispatch::decode_body(&frame.body)
    }

    /// Interactive username/password/TOTP login (spec.md §4.10).
    pub async fn login(&self, user: &str, passwd: &str, totp: u32) -> Result<LoginAck> {
        let req = LoginReq {
            creds: Credentials::Interactive {
                user: user.to_string(),
                passwd: passwd.to_string(),
                totp,
            },
        };
        self.call(FrameType::Login, &req).await
    }

    /// API-key challenge-response login (spec.md §4.10/§4.11): the
    /// caller computes `token`/`stamp`/`hmac` itself since only it
    /// holds the key secret.
    pub async fn login_api(&self, key_id: &str, token: [u8; 32], stamp: i64, hmac: [u8; 32]) -> Result<LoginAck> {
        let req = LoginReq {
            creds: Credentials::Api {
                key_id: key_id.to_string(),
                token,
                stamp,
                hmac,
            },
        };
        self.call(FrameType::Login, &req).await
    }

    pub async fn user_db(&self, req: &crate::proto::types::UserDbReq) -> Result<crate::proto::types::UserDbReqAck> {
        self.call(FrameType::UserDb, req).await
    }

    pub async fn cmd(&self, argv: Vec<String>) -> Result<crate::proto::types::CmdReqAck> {
        let req = crate::proto::types::CmdReq { argv };
        self.call(FrameType::Cmd, &req).await
    }

    /// Request a telemetry snapshot-plus-subscribe; the ack confirms
    /// the request was accepted, after which matching records arrive
    /// on [`ClientLink::subscribe_telemetry`] rather than through this
    /// call (spec.md §4.5).
    pub async fn telemetry_request(&self, types: crate::telemetry::ReqType) -> Result<crate::telemetry::ReqAck> {
        let req = crate::telemetry::TelReq { seq_no: 0, types };
        self.call(FrameType::TelReq, &req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `call_raw` must fail fast rather than hang forever when the
    /// read loop has already torn the pending entry down (e.g. a
    /// connection drop racing a fresh request).
    #[tokio::test]
    async fn awaiting_a_dropped_pending_slot_errors_instead_of_hanging() {
        let (tx, rx) = oneshot::channel::<Frame>();
        drop(tx);
        let result = rx.await;
        assert!(result.is_err());
    }
}
