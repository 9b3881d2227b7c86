// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The server-side per-link state machine (spec.md §4.9): `Down ->
//! Login -> Up`, with a terminal `LoginFailed` that drains then
//! disconnects. Implemented as a concrete struct holding the FSM's own
//! state plus `Arc` handles to the shared user DB, command host and
//! telemetry hub — composition in place of the original's CRTP mixins
//! (Design Notes §9) — with pure, `Vec<Outbound>`-returning transition
//! functions so the I/O loop in `bin/server.rs` stays a thin adapter
//! that can be exercised without a socket in tests.

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::{
    buf::framing::Frame,
    cmd::CommandHost,
    proto::{
        dispatch,
        types::{CmdReq, CmdReqAck, Credentials, FrameType, LoginAck, LoginReq, UserDbReq},
    },
    telemetry::{hub::Hub, record::Record, request::{ReqAck, TelReq}},
    userdb::{mgr::Mgr, User},
};

use std::sync::Arc;

use super::userdb_handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Down,
    Login,
    Up,
    LoginFailed,
}

/// What a transition asks the I/O loop to do; multiple frames can come
/// back from a single inbound frame (a `TelReq` ack plus its snapshot).
pub enum Outbound {
    Frame(Bytes),
    Disconnect,
    /// Keep reading (and discarding) until the peer closes, then
    /// disconnect — the `LoginFailed` drain (spec.md §4.9, §9 Open
    /// Questions).
    DisconnectAfterDrain,
    /// Start forwarding this link's telemetry deltas to the wire,
    /// emitted once per accepted `TelReq` (spec.md §4.5: "pushing
    /// current snapshots, then subscribing the link to incremental
    /// deltas"). The I/O loop owns encoding each delta as a `Telemetry`
    /// frame as it arrives.
    Subscribe(broadcast::Receiver<Record>),
}

pub struct ServerLink {
    state: LinkState,
    user: Option<User>,
    interactive: bool,
    userdb: Arc<Mgr>,
    commands: Arc<CommandHost>,
    hub: Arc<Hub>,
    cmd_perm: u8,
    chpass_perm: u8,
    max_failures: u32,
}

impl ServerLink {
    pub fn new(userdb: Arc<Mgr>, commands: Arc<CommandHost>, hub: Arc<Hub>, cmd_perm: u8, chpass_perm: u8, max_failures: u32) -> Self {
        Self {
            state: LinkState::Down,
            user: None,
            interactive: false,
            userdb,
            commands,
            hub,
            cmd_perm,
            chpass_perm,
            max_failures,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// TLS handshake completed with ALPN already verified by the
    /// caller (`TlsLink::accept` already tears down on ALPN mismatch,
    /// so by the time a `ServerLink` exists the only path is "connected
    /// with zcmd negotiated" — spec.md §4.9's `LoginFailed` branch of
    /// `connected(alpn)` is unreachable at this layer and is therefore
    /// not modeled here).
    pub fn on_connected(&mut self) {
        self.state = LinkState::Login;
    }

    /// Process one inbound frame, returning zero or more outbound
    /// actions for the I/O loop to perform in order.
    pub async fn on_frame(&mut self, frame: Frame, now: i64) -> Vec<Outbound> {
        match self.state {
            LinkState::Down => vec![Outbound::Disconnect],
            LinkState::LoginFailed => vec![Outbound::DisconnectAfterDrain],
            LinkState::Login => self.on_frame_login(frame, now).await,
            LinkState::Up => self.on_frame_up(frame).await,
        }
    }

    async fn on_frame_login(&mut self, frame: Frame, now: i64) -> Vec<Outbound> {
        let Ok(FrameType::Login) = FrameType::try_from(frame.ty) else {
            return vec![Outbound::Disconnect];
        };
        let Ok(req) = dispatch::decode_body::<LoginReq>(&frame.body) else {
            return vec![Outbound::Disconnect];
        };

        let outcome = match req.creds {
            Credentials::Interactive { user, passwd, totp } => {
                let result = self.userdb.login(&user, &passwd, totp, now).await;
                (result, true)
            }
            Credentials::Api { key_id, token, stamp, hmac } => {
                let result = self.userdb.access(&key_id, &token, stamp, &hmac, now).await;
                (result, false)
            }
        };

        match outcome {
            (Ok(user), interactive) => {
                self.user = Some(user.clone());
                self.interactive = interactive;
                self.state = LinkState::Up;
                let ack = LoginAck::from_user(&user);
                match dispatch::encode_reply(FrameType::Login, frame.seq_no, &ack) {
                    Ok(wire) => vec![Outbound::Frame(wire)],
                    Err(_) => vec![Outbound::Disconnect],
                }
            }
            (Err(failure), _) if failure.failures <= self.max_failures => vec![Outbound::Disconnect],
            (Err(_), _) => {
                self.state = LinkState::LoginFailed;
                vec![Outbound::DisconnectAfterDrain]
            }
        }
    }

    async fn on_frame_up(&mut self, frame: Frame) -> Vec<Outbound> {
        let Ok(ty) = FrameType::try_from(frame.ty) else {
            return vec![Outbound::Disconnect];
        };
        // `self.user` is always `Some` once `Up` (set on the Login->Up
        // transition and never cleared before teardown).
        let user = self.user.clone().expect("Up implies a logged-in user");

        match ty {
            FrameType::Login => vec![Outbound::Disconnect],
            FrameType::Telemetry => vec![Outbound::Disconnect],
            FrameType::UserDb => self.handle_userdb(frame, &user).await,
            FrameType::Cmd => self.handle_cmd(frame, &user).await,
            FrameType::TelReq => self.handle_telreq(frame, &user).await,
        }
    }

    async fn handle_userdb(&mut self, frame: Frame, user: &User) -> Vec<Outbound> {
        let Ok(req) = dispatch::decode_body::<UserDbReq>(&frame.body) else {
            return vec![Outbound::Disconnect];
        };
        let Some(perm_id) = self.userdb.perm_id(req.kind()).await else {
            return vec![Outbound::Disconnect];
        };
        if !Mgr::ok(user, self.interactive, perm_id, self.chpass_perm) {
            return self.denied_ack(frame.seq_no, "permission denied");
        }
        let ack = userdb_handler::handle(&self.userdb, user, req).await;
        match dispatch::encode_reply(FrameType::UserDb, frame.seq_no, &ack) {
            Ok(wire) => vec![Outbound::Frame(wire)],
            Err(_) => vec![Outbound::Disconnect],
        }
    }

    async fn handle_cmd(&mut self, frame: Frame, user: &User) -> Vec<Outbound> {
        let Ok(req) = dispatch::decode_body::<CmdReq>(&frame.body) else {
            return vec![Outbound::Disconnect];
        };
        let outcome = self.commands.dispatch(user, self.interactive, req.argv).await;
        let ack = CmdReqAck {
            code: outcome.code,
            out: outcome.out,
        };
        match dispatch::encode_reply(FrameType::Cmd, frame.seq_no, &ack) {
            Ok(wire) => vec![Outbound::Frame(wire)],
            Err(_) => vec![Outbound::Disconnect],
        }
    }

    async fn handle_telreq(&mut self, frame: Frame, _user: &User) -> Vec<Outbound> {
        let Ok(req) = dispatch::decode_body::<TelReq>(&frame.body) else {
            return vec![Outbound::Disconnect];
        };
        let (snapshot, rx) = self.hub.service_request(req.types);
        let mut out = Vec::with_capacity(snapshot.len() + 2);
        let ack = ReqAck { seq_no: req.seq_no, ok: true };
        match dispatch::encode_reply(FrameType::TelReq, frame.seq_no, &ack) {
            Ok(wire) => out.push(Outbound::Frame(wire)),
            Err(_) => return vec![Outbound::Disconnect],
        }
        for record in snapshot {
            if let Ok(wire) = dispatch::encode_reply(FrameType::Telemetry, frame.seq_no, &record) {
                out.push(Outbound::Frame(wire));
            }
        }
        out.push(Outbound::Subscribe(rx));
        out
    }

    fn denied_ack(&self, seq_no: u64, reason: &str) -> Vec<Outbound> {
        use crate::proto::types::UserDbReqAck;
        let ack = UserDbReqAck::Denied { reason: reason.to_string() };
        match dispatch::encode_reply(FrameType::UserDb, seq_no, &ack) {
            Ok(wire) => vec![Outbound::Frame(wire)],
            Err(_) => vec![Outbound::Disconnect],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buf::{framing, iobuf::IOBuf},
        proto::types::REQ_KINDS,
        userdb::mgr::Policy,
    };

    fn policy() -> Policy {
        Policy {
            pass_len: 16,
            totp_range: 1,
            key_interval_secs: 30,
            max_failures: 3,
        }
    }

    async fn bootstrap_link() -> (ServerLink, String, u32, Arc<Mgr>) {
        let userdb = Arc::new(Mgr::new(policy(), REQ_KINDS));
        let (passwd, secret_b64) = userdb.bootstrap("admin", "admin").await.unwrap();
        let totp_secret = {
            use base64::{engine::general_purpose::STANDARD, Engine as _};
            STANDARD.decode(secret_b64).unwrap()
        };
        let now = 1_700_000_000;
        let code = crate::userdb::totp::generate(&totp_secret, now);
        let chpass_perm = userdb.perm_id("ChPass").await.unwrap();
        let cmd_perm = userdb.perm_add("ZCmd").await;
        userdb.role_grant("admin", cmd_perm, false).await.unwrap();
        let hub = Arc::new(Hub::new(16));
        let commands = Arc::new(CommandHost::new(userdb.clone(), cmd_perm, chpass_perm));
        let mut link = ServerLink::new(userdb.clone(), commands, hub, cmd_perm, chpass_perm, policy().max_failures);
        link.on_connected();
        assert_eq!(link.state(), LinkState::Login);
        (link, passwd, code, userdb)
    }

    fn login_frame(seq_no: u64, creds: Credentials) -> Frame {
        let req = LoginReq { creds };
        let body = serde_json::to_vec(&req).unwrap();
        let mut buf = IOBuf::alloc(64 + body.len());
        let wire = framing::encode(&mut buf, FrameType::Login.into(), seq_no, &body);
        let mut rx = bytes::BytesMut::from(&wire[..]);
        framing::decode(&mut rx, 1 << 20).unwrap().unwrap()
    }

    #[tokio::test]
    async fn successful_login_transitions_to_up_and_acks_ok() {
        let (mut link, passwd, code, _userdb) = bootstrap_link().await;
        let frame = login_frame(
            1,
            Credentials::Interactive {
                user: "admin".into(),
                passwd,
                totp: code,
            },
        );
        let out = link.on_frame(frame, 1_700_000_000).await;
        assert_eq!(link.state(), LinkState::Up);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Outbound::Frame(_)));
    }

    #[tokio::test]
    async fn three_failed_logins_disconnect_the_fourth_goes_to_login_failed() {
        let (mut link, _passwd, _code, _userdb) = bootstrap_link().await;
        for _ in 0..3 {
            let frame = login_frame(
                1,
                Credentials::Interactive {
                    user: "admin".into(),
                    passwd: "wrong".into(),
                    totp: 0,
                },
            );
            let out = link.on_frame(frame, 1_700_000_000).await;
            assert!(matches!(out[0], Outbound::Disconnect));
            assert_eq!(link.state(), LinkState::Login);
        }
        let frame = login_frame(
            1,
            Credentials::Interactive {
                user: "admin".into(),
                passwd: "wrong".into(),
                totp: 0,
            },
        );
        let out = link.on_frame(frame, 1_700_000_000).await;
        assert!(matches!(out[0], Outbound::DisconnectAfterDrain));
        assert_eq!(link.state(), LinkState::LoginFailed);
    }

    #[tokio::test]
    async fn chpass_gate_blocks_cmd_until_password_changed() {
        let (mut link, passwd, code, userdb) = bootstrap_link().await;
        let frame = login_frame(
            1,
            Credentials::Interactive {
                user: "admin".into(),
                passwd: passwd.clone(),
                totp: code,
            },
        );
        link.on_frame(frame, 1_700_000_000).await;

        let cmd_req = CmdReq { argv: vec!["help".into()] };
        let body = serde_json::to_vec(&cmd_req).unwrap();
        let mut buf = IOBuf::alloc(64 + body.len());
        let wire = framing::encode(&mut buf, FrameType::Cmd.into(), 2, &body);
        let mut rx = bytes::BytesMut::from(&wire[..]);
        let frame = framing::decode(&mut rx, 1 << 20).unwrap().unwrap();

        let out = link.on_frame(frame, 1_700_000_000).await;
        let Outbound::Frame(wire) = &out[0] else { panic!("expected a frame") };
        let mut rx = bytes::BytesMut::from(&wire[..]);
        let decoded = framing::decode(&mut rx, 1 << 20).unwrap().unwrap();
        let ack: CmdReqAck = dispatch::decode_body(&decoded.body).unwrap();
        assert_ne!(ack.code, 0);

        let admin_id = userdb.users_list().await[0].id;
        userdb
            .ch_pass(admin_id, &passwd, "a-new-password-123")
            .await
            .unwrap();
    }
}
