// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Minimal in-process server speaking just enough of the wire protocol for
//! hermetic connection tests: greeting, framed request parsing, canned
//! responses.

use anyhow::{Context, Result, bail};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rmpv::Value;
use sha1::{Digest, Sha1};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

pub const SALT: [u8; 32] = [7u8; 32];

pub const AUTH: u64 = 0x07;
pub const PING: u64 = 0x40;

const USER_NAME_KEY: u64 = 0x23;
const TUPLE_KEY: u64 = 0x21;

/// One parsed request frame.
#[derive(Debug)]
pub struct Request {
    pub code: u64,
    pub sync: u64,
    pub body: Option<Value>,
}

pub async fn bind() -> Result<(TcpListener, String)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    Ok((listener, format!("127.0.0.1:{}", addr.port())))
}

/// Accepts one client and sends the 128-byte greeting.
pub async fn accept_with_greeting(listener: &TcpListener) -> Result<TcpStream> {
    let (mut stream, _) = listener.accept().await?;
    stream.write_all(&greeting()).await?;
    Ok(stream)
}

pub fn greeting() -> [u8; 128] {
    let mut raw = [b' '; 128];
    let banner = b"Tarantool 2.11.0 (Binary) 0a8e1afe-27b3-46f8-b1e8-cd2cdb2b4b3f";
    raw[..banner.len()].copy_from_slice(banner);
    raw[63] = b'\n';
    let encoded = BASE64.encode(SALT);
    raw[64..64 + encoded.len()].copy_from_slice(encoded.as_bytes());
    raw[127] = b'\n';
    raw
}

/// Reads one framed request off the socket.
pub async fn read_request(stream: &mut TcpStream) -> Result<Request> {
    let mut prefix = [0u8; 5];
    stream.read_exact(&mut prefix).await?;
    if prefix[0] != 0xce {
        bail!("client sent a bad frame prefix: 0x{:02x}", prefix[0]);
    }
    let mut len = [0u8; 4];
    len.copy_from_slice(&prefix[1..5]);
    let mut frame = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut frame).await?;

    let mut cur = std::io::Cursor::new(frame.as_slice());
    let header = rmpv::decode::read_value(&mut cur)?;
    let (code, sync) = parse_header(&header)?;
    let body = if (cur.position() as usize) < frame.len() {
        match rmpv::decode::read_value(&mut cur)? {
            Value::Nil => None,
            body => Some(body),
        }
    } else {
        None
    };
    Ok(Request { code, sync, body })
}

fn parse_header(header: &Value) -> Result<(u64, u64)> {
    let entries = header.as_map().context("request header is not a map")?;
    let mut code = None;
    let mut sync = None;
    for (key, value) in entries {
        match key.as_u64() {
            Some(0x00) => code = value.as_u64(),
            Some(0x01) => sync = value.as_u64(),
            _ => {},
        }
    }
    Ok((
        code.context("request header without code")?,
        sync.context("request header without sync")?,
    ))
}

pub fn body_field(body: &Value, key: u64) -> Option<&Value> {
    body.as_map()?
        .iter()
        .find(|(k, _)| k.as_u64() == Some(key))
        .map(|(_, v)| v)
}

/// OK response carrying the given rows.
pub fn ok_response(sync: u64, data: &[Value]) -> Vec<u8> {
    let mut payload = Vec::new();
    rmp::encode::write_map_len(&mut payload, 3).expect("map header");
    rmp::encode::write_pfix(&mut payload, 0x00).expect("code key");
    rmp::encode::write_uint(&mut payload, 0).expect("code");
    rmp::encode::write_pfix(&mut payload, 0x01).expect("sync key");
    rmp::encode::write_uint(&mut payload, sync).expect("sync");
    rmp::encode::write_pfix(&mut payload, 0x05).expect("schema key");
    rmp::encode::write_uint(&mut payload, 0x53).expect("schema");
    rmp::encode::write_map_len(&mut payload, 1).expect("body header");
    rmp::encode::write_pfix(&mut payload, 0x30).expect("data key");
    rmp::encode::write_array_len(&mut payload, data.len() as u32).expect("data header");
    for row in data {
        rmpv::encode::write_value(&mut payload, row).expect("data row");
    }
    frame(payload)
}

/// Error response with the given non-zero code and message.
pub fn error_response(sync: u64, code: u64, message: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    rmp::encode::write_map_len(&mut payload, 3).expect("map header");
    rmp::encode::write_pfix(&mut payload, 0x00).expect("code key");
    rmp::encode::write_uint(&mut payload, code).expect("code");
    rmp::encode::write_pfix(&mut payload, 0x01).expect("sync key");
    rmp::encode::write_uint(&mut payload, sync).expect("sync");
    rmp::encode::write_pfix(&mut payload, 0x05).expect("schema key");
    rmp::encode::write_uint(&mut payload, 0x53).expect("schema");
    rmp::encode::write_map_len(&mut payload, 1).expect("body header");
    rmp::encode::write_pfix(&mut payload, 0x31).expect("error key");
    rmp::encode::write_str(&mut payload, message).expect("error message");
    frame(payload)
}

fn frame(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + payload.len());
    out.push(0xce);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

/// The scramble the client is expected to prove for `password` against
/// [`SALT`].
pub fn expected_scramble(password: &str) -> [u8; 20] {
    let step_1 = Sha1::digest(password.as_bytes());
    let step_2 = Sha1::digest(step_1);
    let mut hasher = Sha1::new();
    hasher.update(&SALT[..20]);
    hasher.update(step_2);
    let step_3 = hasher.finalize();
    let mut out = [0u8; 20];
    for i in 0..20 {
        out[i] = step_1[i] ^ step_3[i];
    }
    out
}

/// Checks an AUTH request body: user name plus `["chap-sha1", scramble]`.
pub fn verify_auth(body: &Value, user: &str, password: &str) -> bool {
    let Some(got_user) = body_field(body, USER_NAME_KEY).and_then(Value::as_str) else {
        return false;
    };
    let Some(tuple) = body_field(body, TUPLE_KEY).and_then(Value::as_array) else {
        return false;
    };
    if got_user != user || tuple.len() != 2 {
        return false;
    }
    if tuple[0].as_str() != Some("chap-sha1") {
        return false;
    }
    let scramble = match &tuple[1] {
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Binary(b) => b.clone(),
        _ => return false,
    };
    scramble == expected_scramble(password)
}

/// Answers every request in arrival order: AUTH is verified against the
/// credentials, PING gets an empty row set, everything else echoes its
/// Tuple/args back as a single data row per element.
pub async fn serve_echo(mut stream: TcpStream, user: &str, password: &str) -> Result<()> {
    loop {
        let request = match read_request(&mut stream).await {
            Ok(request) => request,
            // Client went away; that is how every test ends.
            Err(_) => return Ok(()),
        };
        let reply = match request.code {
            AUTH => {
                let authed = request
                    .body
                    .as_ref()
                    .is_some_and(|body| verify_auth(body, user, password));
                if authed {
                    ok_response(request.sync, &[])
                } else {
                    error_response(request.sync, 0x8047, "User not found or supplied credentials are invalid")
                }
            },
            PING => ok_response(request.sync, &[]),
            _ => {
                let args = request
                    .body
                    .as_ref()
                    .and_then(|body| body_field(body, TUPLE_KEY))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                ok_response(request.sync, &args)
            },
        };
        stream.write_all(&reply).await?;
    }
}
