// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Checkpoint file format and atomic-rewrite-with-rotation, standing in
//! for `ZumUserDB.hh`'s FlatBuffer `fbs::UserDB` the way `serde_json`
//! stands in for FlatBuffers crate-wide for non-wire payloads (see
//! `proto` module docs and this crate's design notes on why the
//! checkpoint file doesn't need the flatbuffer codegen toolchain this
//! workspace deliberately omits).

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::model::{Role, User};
use crate::error::{Error, Result};

/// Self-describing file header; `version` lets a future format change
/// be detected on load instead of silently misparsed.
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbSchema {
    pub version: u32,
    pub next_user_id: u64,
    pub perm_names: Vec<String>,
    pub roles: Vec<Role>,
    pub users: Vec<User>,
}

impl DbSchema {
    pub fn new(next_user_id: u64, perm_names: Vec<String>, roles: Vec<Role>, users: Vec<User>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            next_user_id,
            perm_names,
            roles,
            users,
        }
    }
}

/// Atomically rewrite `path` with `schema`'s contents, first rotating
/// up to `max_age` numbered backups: `path` -> `path.1`, `path.1` ->
/// `path.2`, ..., `path.(max_age-1)` -> `path.max_age`; any prior
/// `path.max_age` is dropped (spec.md §6/§4.11).
pub fn save(path: &Path, schema: &DbSchema, max_age: u32) -> Result<()> {
    rotate(path, max_age)?;

    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_vec_pretty(schema)
        .map_err(|e| Error::storage(format!("failed to serialize user DB: {e}")))?;
    std::fs::write(&tmp_path, &json)
        .map_err(|e| Error::storage(format!("failed to write checkpoint temp file: {e}")))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| Error::storage(format!("failed to install checkpoint file: {e}")))?;
    Ok(())
}

fn rotate(path: &Path, max_age: u32) -> Result<()> {
    if max_age == 0 {
        return Ok(());
    }
    let numbered = |n: u32| path.with_extension(format!("{n}"));
    let oldest = numbered(max_age);
    if oldest.exists() {
        std::fs::remove_file(&oldest)
            .map_err(|e| Error::storage(format!("failed to drop oldest checkpoint backup: {e}")))?;
    }
    for n in (1..max_age).rev() {
        let from = numbered(n);
        if from.exists() {
            std::fs::rename(&from, numbered(n + 1))
                .map_err(|e| Error::storage(format!("failed to rotate checkpoint backup: {e}")))?;
        }
    }
    if path.exists() {
        std::fs::rename(path, numbered(1))
            .map_err(|e| Error::storage(format!("failed to rotate current checkpoint: {e}")))?;
    }
    Ok(())
}

/// Load `path`, falling back to `path.1` if `path` is missing or
/// unreadable (spec.md §6: "load(path) attempts path then path.1").
pub fn load(path: &Path) -> Result<DbSchema> {
    match load_one(path) {
        Ok(schema) => Ok(schema),
        Err(primary_err) => {
            let backup = path.with_extension("1");
            load_one(&backup).map_err(|_| primary_err)
        }
    }
}

fn load_one(path: &Path) -> Result<DbSchema> {
    let content = std::fs::read(path)
        .map_err(|e| Error::storage(format!("failed to read checkpoint '{}': {e}", path.display())))?;
    let schema: DbSchema = serde_json::from_slice(&content)
        .map_err(|e| Error::storage(format!("malformed checkpoint '{}': {e}", path.display())))?;
    if schema.version != SCHEMA_VERSION {
        return Err(Error::storage(format!(
            "unsupported checkpoint version {} (expected {SCHEMA_VERSION})",
            schema.version
        )));
    }
    Ok(schema)
}
