// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The `zcmd-server` binary: accepts TLS connections, runs one
//! [`ServerLink`] per connection, and checkpoints the user database on
//! a timer (spec.md §4.9/§4.11).

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use tracing::{info, warn};
use zcmd::{
    cfg::config::Config,
    cmd::{CommandHost, CommandOutcome},
    proto::types::REQ_KINDS,
    server::{Outbound, ServerLink},
    telemetry::Hub,
    tls::{certs, FrameReassembler, TlsLink},
    userdb::{Mgr, Policy},
};

#[derive(Parser, Debug)]
#[command(name = "zcmd-server", about = "TLS-framed remote command/auth/telemetry server")]
struct Args {
    /// Path to the YAML server/client/userdb/telemetry config file.
    #[arg(long, default_value = "zcmd.yaml")]
    config: PathBuf,

    /// Accept any client certificate (development only).
    #[arg(long)]
    insecure: bool,

    /// Bootstrap a fresh, empty user database with one all-permissions
    /// user in one all-permissions role, print the one-time password
    /// and TOTP secret, then exit without serving.
    #[arg(long)]
    bootstrap: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let cfg = Config::load_from_file(&args.config).unwrap_or_else(|e| {
        warn!("failed to load {}: {e}; using defaults", args.config.display());
        Config {
            server: Default::default(),
            client: Default::default(),
            userdb: Default::default(),
            telemetry: Default::default(),
        }
    });

    let policy = Policy {
        pass_len: cfg.userdb.pass_len,
        totp_range: cfg.userdb.totp_range,
        key_interval_secs: cfg.userdb.key_interval_secs,
        max_failures: cfg.userdb.max_failures,
    };

    let checkpoint_path = PathBuf::from(&cfg.server.checkpoint_path);
    let userdb = if checkpoint_path.exists() {
        Arc::new(Mgr::load(policy, REQ_KINDS, &checkpoint_path).await.context("failed to load user database checkpoint")?)
    } else {
        Arc::new(Mgr::new(policy, REQ_KINDS))
    };

    if let Some(admin_name) = args.bootstrap {
        let (passwd, totp_secret) = userdb.bootstrap(&admin_name, "admin").await.context("bootstrap failed")?;
        userdb.save(&checkpoint_path, cfg.server.checkpoint_max_age).await?;
        println!("user: {admin_name}");
        println!("password: {passwd}");
        println!("totp secret (base32-less, raw base64): {totp_secret}");
        return Ok(());
    }

    let cmd_perm = userdb.perm_add("ZCmd").await;
    let chpass_perm = userdb.perm_id("ChPass").await.expect("ChPass is always registered");
    let commands = Arc::new(CommandHost::new(userdb.clone(), cmd_perm, chpass_perm));
    register_builtin_commands(&commands).await;

    let hub = Arc::new(Hub::new(cfg.telemetry.high_water.max(16)));

    if cfg.server.checkpoint_interval_secs > 0 {
        spawn_checkpoint_ticker(userdb.clone(), checkpoint_path.clone(), cfg.server.checkpoint_max_age, cfg.server.checkpoint_interval_secs);
    }

    if args.insecure {
        warn!("--insecure has no effect on the server; it accepts any client cert already (no mTLS configured)");
    }
    let tls_config = Arc::new(certs::server_config(cfg.server.cert_path.as_deref(), cfg.server.key_path.as_deref())?);

    let listener = TcpListener::bind(&cfg.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.bind_address))?;
    info!("zcmd-server listening on {}", cfg.server.bind_address);

    loop {
        let (stream, peer) = listener.accept().await?;
        let tls_config = tls_config.clone();
        let userdb = userdb.clone();
        let commands = commands.clone();
        let hub = hub.clone();
        let max_message = cfg.server.max_message;
        let (cmd_perm, chpass_perm, max_failures) = (cmd_perm, chpass_perm, cfg.userdb.max_failures);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, tls_config, userdb, commands, hub, cmd_perm, chpass_perm, max_failures, max_message).await {
                warn!("connection from {peer} exited: {e}");
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_connection(
    stream: tokio::net::TcpStream,
    tls_config: Arc<rustls::ServerConfig>,
    userdb: Arc<Mgr>,
    commands: Arc<CommandHost>,
    hub: Arc<Hub>,
    cmd_perm: u8,
    chpass_perm: u8,
    max_failures: u32,
    max_message: u32,
) -> Result<()> {
    let link = TlsLink::accept(stream, tls_config).await?;
    let (mut read_half, mut write_half) = tokio::io::split(link);

    let mut fsm = ServerLink::new(userdb, commands, hub, cmd_perm, chpass_perm, max_failures);
    fsm.on_connected();

    let mut reasm = FrameReassembler::new(max_message);
    let mut scratch = [0u8; 64 * 1024];
    // Set once the link accepts a `TelReq`; polled alongside inbound
    // reads so this link's telemetry deltas reach the wire without
    // waiting on the peer to send anything else (spec.md §4.5).
    let mut tel_rx: Option<tokio::sync::broadcast::Receiver<zcmd::telemetry::Record>> = None;
    loop {
        let n = tokio::select! {
            biased;
            delta = recv_telemetry(&mut tel_rx) => {
                if let Some(record) = delta {
                    if let Ok(wire) = zcmd::proto::dispatch::encode_reply(zcmd::proto::types::FrameType::Telemetry, 0, &record) {
                        write_half.write_all(&wire).await?;
                    }
                }
                continue;
            }
            n = read_half.read(&mut scratch) => n?,
        };
        if n == 0 {
            return Ok(());
        }
        let frames = reasm.process(&scratch[..n])?;
        let now = chrono::Utc::now().timestamp();
        for frame in frames {
            let outbound = fsm.on_frame(frame, now).await;
            let mut should_close = false;
            for action in outbound {
                match action {
                    Outbound::Frame(wire) => write_half.write_all(&wire).await?,
                    Outbound::Disconnect => should_close = true,
                    Outbound::Subscribe(rx) => tel_rx = Some(rx),
                    Outbound::DisconnectAfterDrain => {
                        // keep reading (and discarding) until EOF, then close.
                        let mut sink = [0u8; 4096];
                        while read_half.read(&mut sink).await.unwrap_or(0) > 0 {}
                        should_close = true;
                    }
                }
            }
            if should_close {
                write_half.shutdown().await.ok();
                return Ok(());
            }
        }
    }
}

/// Awaits the next telemetry delta if a `TelReq` has subscribed this
/// link, else never resolves — letting `tokio::select!` treat "no
/// subscription yet" as "this branch doesn't fire". A lagged
/// subscriber (spec.md §5 backpressure) just skips to the newest
/// record rather than tearing the link down.
async fn recv_telemetry(
    rx: &mut Option<tokio::sync::broadcast::Receiver<zcmd::telemetry::Record>>,
) -> Option<zcmd::telemetry::Record> {
    match rx {
        None => std::future::pending().await,
        Some(rx) => loop {
            match rx.recv().await {
                Ok(record) => return Some(record),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        },
    }
}

async fn register_builtin_commands(commands: &CommandHost) {
    commands
        .register(
            "help",
            Arc::new(|_ctx, _argv| Box::pin(async { CommandOutcome::ok("available commands: help, whoami\n") })),
        )
        .await;
    commands
        .register(
            "whoami",
            Arc::new(|ctx, _argv| Box::pin(async move { CommandOutcome::ok(format!("{}\n", ctx.user.name)) })),
        )
        .await;
}

fn spawn_checkpoint_ticker(userdb: Arc<Mgr>, path: PathBuf, max_age: u32, interval_secs: u64) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            tick.tick().await;
            if userdb.modified().await {
                if let Err(e) = userdb.save(&path, max_age).await {
                    warn!("checkpoint save failed: {e}");
                }
            }
        }
    });
}
