// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Parsed representation of a server response and its streaming decoder.

use std::io::Cursor;

use rmpv::Value;

use crate::{
    error::{Error, Result},
    protocol::constants::{CODE, DATA, ERROR, ResponseCode, SCHEMA_ID, SYNC},
};

/// Response header: code, sync tag, schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub code: u32,
    pub sync: u64,
    pub schema_id: u32,
}

impl Header {
    #[inline]
    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::classify(self.code)
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.response_code() == ResponseCode::Ok
    }
}

/// A decoded response. Invariant: `error` is present iff the header code is
/// not OK.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub header: Header,
    pub data: Option<Vec<Value>>,
    pub error: Option<String>,
}

impl Response {
    /// Rows of the Data body section; empty when the body was absent.
    pub fn data(&self) -> &[Value] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn into_data(self) -> Vec<Value> {
        self.data.unwrap_or_default()
    }
}

/// Decodes one frame payload (everything after the 5-byte prefix).
pub fn decode_response(frame: &[u8]) -> Result<Response> {
    let mut cur = Cursor::new(frame);
    let header = decode_header(&mut cur)?;

    let mut response = Response {
        header,
        data: None,
        error: None,
    };
    if (cur.position() as usize) < frame.len() {
        decode_body(&mut cur, &mut response)?;
    }

    match (response.header.is_ok(), &response.error) {
        (true, Some(_)) => Err(Error::Protocol(
            "success response carries an error message".into(),
        )),
        (false, None) => Err(Error::Protocol(format!(
            "error response 0x{:04x} without a message",
            response.header.code
        ))),
        _ => Ok(response),
    }
}

fn decode_header(cur: &mut Cursor<&[u8]>) -> Result<Header> {
    let mut code: Option<u32> = None;
    let mut sync: Option<u64> = None;
    let mut schema_id: u32 = 0;

    let map_len = rmp::decode::read_map_len(cur)?;
    for _ in 0..map_len {
        let key = rmp::decode::read_pfix(cur)?;
        match key {
            CODE => code = Some(rmp::decode::read_int(cur)?),
            SYNC => sync = Some(rmp::decode::read_int(cur)?),
            SCHEMA_ID => schema_id = rmp::decode::read_int(cur)?,
            other => {
                return Err(Error::Protocol(format!(
                    "unknown response header key 0x{other:02x}"
                )));
            },
        }
    }

    let code = code.ok_or_else(|| Error::Protocol("response header without code".into()))?;
    let sync = sync.ok_or_else(|| Error::Protocol("response header without sync".into()))?;
    Ok(Header {
        code,
        sync,
        schema_id,
    })
}

/// The body is either nil, or a map carrying Data (success) / Error (failure).
/// An empty map counts as an absent body. Unknown body keys are skipped.
fn decode_body(cur: &mut Cursor<&[u8]>, response: &mut Response) -> Result<()> {
    let body = rmpv::decode::read_value(cur)?;
    let entries = match body {
        Value::Nil => return Ok(()),
        Value::Map(entries) => entries,
        other => {
            return Err(Error::Protocol(format!(
                "response body is not a map: {other}"
            )));
        },
    };
    if entries.is_empty() {
        return Ok(());
    }

    for (key, value) in entries {
        let Some(key) = key.as_u64() else {
            continue;
        };
        match u8::try_from(key) {
            Ok(DATA) => match value {
                Value::Array(rows) => response.data = Some(rows),
                other => {
                    return Err(Error::Protocol(format!(
                        "response data is not a sequence: {other}"
                    )));
                },
            },
            Ok(ERROR) => match value {
                Value::String(message) => {
                    let message = message
                        .into_str()
                        .ok_or_else(|| Error::Protocol("error message is not UTF-8".into()))?;
                    response.error = Some(message);
                },
                other => {
                    return Err(Error::Protocol(format!(
                        "error message is not a string: {other}"
                    )));
                },
            },
            _ => {},
        }
    }

    if response.header.is_ok() && response.data.is_none() {
        return Err(Error::Protocol(
            "success body without the data section".into(),
        ));
    }
    Ok(())
}
