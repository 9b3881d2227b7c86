// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A TCP connection wrapped in TLS 1.2+, with ALPN pinned to `zcmd` and
//! a rolling receive buffer the framing layer (A) reads full frames out
//! of as bytes arrive.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use super::certs::{self, ALPN_PROTOCOL};
use crate::{
    buf::framing::{self, Frame},
    error::{Error, Result},
};

/// Either side of a TLS connection, read/write behind one type so the
/// server and client FSMs share a single link type.
pub enum TlsLink {
    Server(tokio_rustls::server::TlsStream<TcpStream>),
    Client(tokio_rustls::client::TlsStream<TcpStream>),
}

impl TlsLink {
    pub async fn accept(stream: TcpStream, config: Arc<rustls::ServerConfig>) -> Result<Self> {
        let acceptor = TlsAcceptor::from(config);
        let tls = acceptor
            .accept(stream)
            .await
            .map_err(|e| Error::transport(format!("TLS accept failed: {e}")))?;
        let link = TlsLink::Server(tls);
        link.verify_alpn()?;
        Ok(link)
    }

    pub async fn connect(
        stream: TcpStream,
        config: Arc<rustls::ClientConfig>,
        server_name: rustls::pki_types::ServerName<'static>,
    ) -> Result<Self> {
        let connector = TlsConnector::from(config);
        let tls = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| Error::transport(format!("TLS connect failed: {e}")))?;
        let link = TlsLink::Client(tls);
        link.verify_alpn()?;
        Ok(link)
    }

    fn alpn_protocol(&self) -> Option<Vec<u8>> {
        match self {
            TlsLink::Server(s) => s.get_ref().1.alpn_protocol().map(<[u8]>::to_vec),
            TlsLink::Client(s) => s.get_ref().1.alpn_protocol().map(<[u8]>::to_vec),
        }
    }

    fn verify_alpn(&self) -> Result<()> {
        match self.alpn_protocol() {
            Some(proto) if proto == ALPN_PROTOCOL => Ok(()),
            _ => Err(Error::transport("ALPN mismatch: peer did not negotiate zcmd")),
        }
    }
}

impl tokio::io::AsyncRead for TlsLink {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            TlsLink::Server(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            TlsLink::Client(s) => std::pin::Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl tokio::io::AsyncWrite for TlsLink {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            TlsLink::Server(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            TlsLink::Client(s) => std::pin::Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            TlsLink::Server(s) => std::pin::Pin::new(s).poll_flush(cx),
            TlsLink::Client(s) => std::pin::Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            TlsLink::Server(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            TlsLink::Client(s) => std::pin::Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Owns the rolling receive buffer across `process` callbacks, handing
/// back every complete frame a chunk of bytes completes.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    rx: bytes::BytesMut,
    max_message: u32,
}

impl FrameReassembler {
    pub fn new(max_message: u32) -> Self {
        Self {
            rx: bytes::BytesMut::new(),
            max_message,
        }
    }

    /// Feed newly-read bytes in; returns every frame that is now
    /// complete, in arrival order.
    pub fn process(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.rx.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(frame) = framing::decode(&mut self.rx, self.max_message)? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembler_splits_partial_writes_into_frames() {
        let mut buf = crate::buf::iobuf::IOBuf::alloc(64);
        let wire1 = framing::encode(&mut buf, 1, 1, b"hello");
        let mut buf2 = crate::buf::iobuf::IOBuf::alloc(64);
        let wire2 = framing::encode(&mut buf2, 2, 2, b"world");

        let mut reasm = FrameReassembler::new(1 << 20);
        let mut first_chunk = wire1[..wire1.len() - 2].to_vec();
        let frames = reasm.process(&first_chunk).unwrap();
        assert!(frames.is_empty());

        first_chunk.clear();
        first_chunk.extend_from_slice(&wire1[wire1.len() - 2..]);
        first_chunk.extend_from_slice(&wire2);
        let frames = reasm.process(&first_chunk).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].body[..], b"hello");
        assert_eq!(&frames[1].body[..], b"world");
    }
}
