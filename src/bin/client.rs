// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The `zcmd-client` binary: logs into a `zcmd-server` and either runs
//! one command non-interactively or streams telemetry to stdout
//! (spec.md §4.10).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tracing::info;
use zcmd::{
    client::ClientLink,
    tls::{certs, TlsLink},
};

#[derive(Parser, Debug)]
#[command(name = "zcmd-client", about = "zcmd command-line client")]
struct Args {
    /// host:port of the zcmd-server to connect to.
    #[arg(long)]
    target: String,

    /// CA certificate used to verify the server (skip with --insecure).
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Trust any server certificate (development only).
    #[arg(long)]
    insecure: bool,

    /// Login username.
    #[arg(long)]
    user: String,

    /// Login password.
    #[arg(long)]
    passwd: String,

    /// Current TOTP code.
    #[arg(long)]
    totp: u32,

    /// Maximum accepted frame length in bytes.
    #[arg(long, default_value_t = 1 << 20)]
    max_message: u32,

    /// Command and arguments to run; if empty, the client logs in and exits.
    #[arg(trailing_var_arg = true)]
    argv: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let host = args
        .target
        .split(':')
        .next()
        .context("--target must be host:port")?
        .to_string();

    let tls_config = if args.insecure {
        certs::insecure_client_config()
    } else {
        let ca = args.ca_cert.context("--ca-cert is required unless --insecure")?;
        certs::client_config(ca.to_str().context("non-utf8 --ca-cert path")?)?
    };

    let stream = TcpStream::connect(&args.target)
        .await
        .with_context(|| format!("failed to connect to {}", args.target))?;
    let server_name = ServerName::try_from(host).context("invalid --target hostname")?;
    let link = TlsLink::connect(stream, std::sync::Arc::new(tls_config), server_name).await?;
    let client = ClientLink::spawn(link, args.max_message);

    let ack = client.login(&args.user, &args.passwd, args.totp).await?;
    if !ack.ok {
        bail!("login denied");
    }
    info!("logged in as {} (id {})", ack.name, ack.id);

    if args.argv.is_empty() {
        return Ok(());
    }

    let outcome = client.cmd(args.argv).await?;
    print!("{}", outcome.out);
    std::process::exit(outcome.code);
}
