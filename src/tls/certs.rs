// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! TLS certificate loading and self-signed generation, adapted from the
//! pack's QUIC transport (`load_tls_config`/`generate_self_signed_config`
//! in `lockframe-server::transport`) onto plain TCP via `tokio-rustls`.

use std::{fs, sync::Arc};

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::{Error, Result};

pub const ALPN_PROTOCOL: &[u8] = b"zcmd";

pub fn server_config(cert_path: Option<&str>, key_path: Option<&str>) -> Result<rustls::ServerConfig> {
    let (certs, key) = match (cert_path, key_path) {
        (Some(cert), Some(key)) => load_cert_and_key(cert, key)?,
        _ => self_signed()?,
    };

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::transport(format!("invalid TLS server config: {e}")))?;
    config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];
    Ok(config)
}

/// Build a client config trusting only the CA certificate at `ca_path`
/// — the expected case for a private trading/telemetry bus, which has
/// no business trusting the public Web PKI.
pub fn client_config(ca_path: &str) -> Result<rustls::ClientConfig> {
    let ca_pem = fs::read(ca_path)
        .map_err(|e| Error::transport(format!("failed to read CA cert '{ca_path}': {e}")))?;
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut &ca_pem[..]) {
        let cert = cert.map_err(|e| Error::transport(format!("failed to parse CA cert: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| Error::transport(format!("invalid CA cert: {e}")))?;
    }
    let mut config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];
    Ok(config)
}

/// A client config that accepts any server certificate, for talking to
/// a self-signed development server. Never used unless the caller
/// explicitly opts in — see the server/client binaries' `--insecure`
/// flag.
pub fn insecure_client_config() -> rustls::ClientConfig {
    let mut config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(danger::AcceptAny))
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];
    config
}

fn load_cert_and_key(
    cert_path: &str,
    key_path: &str,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_pem = fs::read(cert_path)
        .map_err(|e| Error::transport(format!("failed to read cert '{cert_path}': {e}")))?;
    let key_pem = fs::read(key_path)
        .map_err(|e| Error::transport(format!("failed to read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::transport(format!("failed to parse certificate chain: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| Error::transport(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| Error::transport("no private key found in key file"))?;

    Ok((certs, key))
}

fn self_signed() -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| Error::transport(format!("failed to generate self-signed cert: {e}")))?;
    let cert_der = cert.cert.der().clone();
    let key_der = cert.signing_key.serialize_der();
    tracing::warn!("using a generated self-signed certificate; not for production use");
    Ok((
        vec![cert_der],
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der)),
    ))
}

mod danger {
    use rustls::{
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
        DigitallySignedStruct, SignatureScheme,
    };

    #[derive(Debug)]
    pub struct AcceptAny;

    impl ServerCertVerifier for AcceptAny {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::ED25519,
                SignatureScheme::RSA_PSS_SHA256,
            ]
        }
    }
}
