// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration shared by the bundled server and client binaries.
///
/// Loaded from YAML the way the teacher's iSCSI config is, with the same
/// `#[serde(rename = "...")]` key-naming discipline.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub userdb: UserDbConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }
}

/// Server-side listen/transport/checkpoint parameters.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(rename = "BindAddress", default = "default_bind")]
    pub bind_address: String,
    #[serde(rename = "CertPath", default)]
    pub cert_path: Option<String>,
    #[serde(rename = "KeyPath", default)]
    pub key_path: Option<String>,
    /// Maximum framed message length in bytes (`length` header field cap).
    #[serde(rename = "MaxMessage", default = "default_max_message")]
    pub max_message: u32,
    /// Seconds allowed for a new link to complete login before disconnect.
    #[serde(rename = "LoginTimeoutSecs", default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    /// Seconds of inactivity on an established link before disconnect.
    #[serde(rename = "LinkTimeoutSecs", default = "default_link_timeout")]
    pub link_timeout_secs: u64,
    /// Seconds between automatic user-DB checkpoints (0 = disabled).
    #[serde(rename = "CheckpointIntervalSecs", default)]
    pub checkpoint_interval_secs: u64,
    #[serde(rename = "CheckpointPath", default = "default_checkpoint_path")]
    pub checkpoint_path: String,
    #[serde(rename = "CheckpointMaxAge", default = "default_checkpoint_max_age")]
    pub checkpoint_max_age: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind(),
            cert_path: None,
            key_path: None,
            max_message: default_max_message(),
            login_timeout_secs: default_login_timeout(),
            link_timeout_secs: default_link_timeout(),
            checkpoint_interval_secs: 0,
            checkpoint_path: default_checkpoint_path(),
            checkpoint_max_age: default_checkpoint_max_age(),
        }
    }
}

/// Client-side connect/reconnect parameters.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ClientConfig {
    #[serde(rename = "TargetAddress", default = "default_bind")]
    pub target_address: String,
    /// Seconds between reconnect attempts; 0 disables automatic reconnect.
    #[serde(rename = "ReconnFreqSecs", default)]
    pub reconn_freq_secs: u64,
    #[serde(rename = "LoginTimeoutSecs", default = "default_login_timeout")]
    pub login_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target_address: default_bind(),
            reconn_freq_secs: 0,
            login_timeout_secs: default_login_timeout(),
        }
    }
}

/// User database policy knobs.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UserDbConfig {
    #[serde(rename = "TotpRange", default = "default_totp_range")]
    pub totp_range: u32,
    #[serde(rename = "KeyIntervalSecs", default = "default_key_interval")]
    pub key_interval_secs: i64,
    #[serde(rename = "PasswordLength", default = "default_pass_len")]
    pub pass_len: usize,
    #[serde(rename = "MaxFailures", default = "default_max_failures")]
    pub max_failures: u32,
}

impl Default for UserDbConfig {
    fn default() -> Self {
        Self {
            totp_range: default_totp_range(),
            key_interval_secs: default_key_interval(),
            pass_len: default_pass_len(),
            max_failures: default_max_failures(),
        }
    }
}

/// Telemetry push backpressure thresholds.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TelemetryConfig {
    #[serde(rename = "HighWaterMark", default = "default_high_water")]
    pub high_water: usize,
    #[serde(rename = "LowWaterMark", default = "default_low_water")]
    pub low_water: usize,
    #[serde(rename = "TickIntervalMillis", default = "default_tick_millis")]
    pub tick_interval_millis: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            high_water: default_high_water(),
            low_water: default_low_water(),
            tick_interval_millis: default_tick_millis(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:9943".to_string()
}
fn default_max_message() -> u32 {
    1 << 20
}
fn default_login_timeout() -> u64 {
    10
}
fn default_link_timeout() -> u64 {
    60
}
fn default_checkpoint_path() -> String {
    "zcmd_userdb.json".to_string()
}
fn default_checkpoint_max_age() -> u32 {
    8
}
fn default_totp_range() -> u32 {
    1
}
fn default_key_interval() -> i64 {
    30
}
fn default_pass_len() -> usize {
    16
}
fn default_max_failures() -> u32 {
    3
}
fn default_high_water() -> usize {
    1024
}
fn default_low_water() -> usize {
    256
}
fn default_tick_millis() -> u64 {
    1000
}
