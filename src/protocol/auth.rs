// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Greeting parsing and the chap-sha1 challenge-response handshake.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::{
    error::{Error, Result},
    protocol::{
        codec::{begin_frame, finish_frame},
        constants::{CommandCode, TUPLE, USER_NAME},
    },
};

/// The server opens every connection with exactly 128 bytes: a 64-byte
/// version banner line and a 64-byte salt line, both newline-terminated.
pub const GREETING_LEN: usize = 128;

/// Length of the retained base64 salt payload on the second greeting line.
const SALT_B64_LEN: usize = 44;

pub const SCRAMBLE_LEN: usize = 20;

/// Parsed greeting: the human-readable banner and the decoded salt.
#[derive(Debug, Clone)]
pub struct Greeting {
    pub version: String,
    salt: Vec<u8>,
}

impl Greeting {
    pub fn parse(raw: &[u8; GREETING_LEN]) -> Result<Self> {
        if raw[63] != b'\n' || raw[127] != b'\n' {
            return Err(Error::Protocol("malformed greeting".into()));
        }

        let version = String::from_utf8_lossy(&raw[..63]).trim_end().to_string();

        let salt = BASE64
            .decode(&raw[64..64 + SALT_B64_LEN])
            .map_err(|e| Error::Protocol(format!("bad greeting salt: {e}")))?;
        if salt.len() < SCRAMBLE_LEN {
            return Err(Error::Protocol(format!(
                "greeting salt too short: {} bytes",
                salt.len()
            )));
        }

        Ok(Self { version, salt })
    }

    pub fn scramble(&self, password: &str) -> [u8; SCRAMBLE_LEN] {
        scramble(&self.salt, password)
    }
}

/// chap-sha1 client proof:
///
/// ```text
/// step_1   = sha1(password)
/// step_2   = sha1(step_1)
/// step_3   = sha1(salt[0..20] || step_2)
/// scramble = step_1 xor step_3
/// ```
///
/// Callers guarantee `salt.len() >= SCRAMBLE_LEN` (checked at greeting parse).
pub fn scramble(salt: &[u8], password: &str) -> [u8; SCRAMBLE_LEN] {
    let step_1 = Sha1::digest(password.as_bytes());
    let step_2 = Sha1::digest(step_1);

    let mut hasher = Sha1::new();
    hasher.update(&salt[..SCRAMBLE_LEN]);
    hasher.update(step_2);
    let step_3 = hasher.finalize();

    let mut out = [0u8; SCRAMBLE_LEN];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = step_1[i] ^ step_3[i];
    }
    out
}

/// AUTH body: `{ Username: user, Tuple: ["chap-sha1", scramble] }`.
pub fn encode_auth(
    buf: &mut Vec<u8>,
    sync: u64,
    user: &str,
    scramble: &[u8; SCRAMBLE_LEN],
) -> Result<()> {
    begin_frame(buf, CommandCode::Auth, sync)?;
    rmp::encode::write_map_len(buf, 2)?;
    rmp::encode::write_pfix(buf, USER_NAME)?;
    rmp::encode::write_str(buf, user)?;
    rmp::encode::write_pfix(buf, TUPLE)?;
    rmp::encode::write_array_len(buf, 2)?;
    rmp::encode::write_str(buf, "chap-sha1")?;
    rmp::encode::write_str_len(buf, SCRAMBLE_LEN as u32)?;
    buf.extend_from_slice(scramble);
    finish_frame(buf)
}
