// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request frame encoding.
//!
//! Wire layout of every request:
//!
//! ```text
//! +------+-------------------+----------------+----------------+
//! | 0xCE | payload len (BE4) | header fixmap  | body map / nil |
//! +------+-------------------+----------------+----------------+
//! ```
//!
//! The prefix is itself a MessagePack `u32`: the encoder writes a placeholder
//! value, serializes header and body behind it, then patches bytes 1..5 with
//! the measured payload length.

use rmp::Marker;
use rmpv::Value;

use crate::{
    error::{Error, Result},
    protocol::{
        constants::{
            CODE, CommandCode, EXPRESSION, FUNCTION_NAME, INDEX_ID, ITERATOR, KEY, LIMIT,
            OFFSET, OPS, SPACE_ID, SYNC, TUPLE,
        },
        iterator::IteratorType,
    },
};

/// Reserved bytes in front of every frame: the `u32` marker plus the
/// big-endian payload length.
pub const FRAME_PREFIX_LEN: usize = 5;

/// Parses the 5-byte frame prefix and yields the payload length.
pub fn read_frame_len(prefix: &[u8; FRAME_PREFIX_LEN]) -> Result<usize> {
    if prefix[0] != Marker::U32.to_u8() {
        return Err(Error::Protocol(format!(
            "bad frame prefix marker 0x{:02x}",
            prefix[0]
        )));
    }
    let mut len = [0u8; 4];
    len.copy_from_slice(&prefix[1..FRAME_PREFIX_LEN]);
    Ok(u32::from_be_bytes(len) as usize)
}

/// Writes the placeholder prefix and the request header map.
pub(crate) fn begin_frame(buf: &mut Vec<u8>, code: CommandCode, sync: u64) -> Result<()> {
    rmp::encode::write_u32(buf, 0)?;
    rmp::encode::write_map_len(buf, 2)?;
    rmp::encode::write_pfix(buf, CODE)?;
    rmp::encode::write_pfix(buf, code as u8)?;
    rmp::encode::write_pfix(buf, SYNC)?;
    rmp::encode::write_uint(buf, sync)?;
    Ok(())
}

/// Patches the measured payload length back into the prefix.
pub(crate) fn finish_frame(buf: &mut [u8]) -> Result<()> {
    let payload = buf.len() - FRAME_PREFIX_LEN;
    let len = u32::try_from(payload)
        .map_err(|_| Error::BadArgument(format!("request payload too large: {payload} bytes")))?;
    buf[1..FRAME_PREFIX_LEN].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

fn write_values(buf: &mut Vec<u8>, items: &[Value]) -> Result<()> {
    rmp::encode::write_array_len(buf, items.len() as u32)?;
    for item in items {
        rmpv::encode::write_value(buf, item)?;
    }
    Ok(())
}

pub fn encode_ping(buf: &mut Vec<u8>, sync: u64) -> Result<()> {
    begin_frame(buf, CommandCode::Ping, sync)?;
    rmp::encode::write_nil(buf)?;
    finish_frame(buf)
}

#[allow(clippy::too_many_arguments)]
pub fn encode_select(
    buf: &mut Vec<u8>,
    sync: u64,
    space_id: u16,
    index_id: u8,
    limit: u32,
    offset: u32,
    iterator: IteratorType,
    key: &[Value],
) -> Result<()> {
    begin_frame(buf, CommandCode::Select, sync)?;
    rmp::encode::write_map_len(buf, 6)?;
    rmp::encode::write_pfix(buf, SPACE_ID)?;
    rmp::encode::write_u32(buf, space_id.into())?;
    rmp::encode::write_pfix(buf, INDEX_ID)?;
    rmp::encode::write_u32(buf, index_id.into())?;
    rmp::encode::write_pfix(buf, LIMIT)?;
    rmp::encode::write_u32(buf, limit)?;
    rmp::encode::write_pfix(buf, OFFSET)?;
    rmp::encode::write_u32(buf, offset)?;
    rmp::encode::write_pfix(buf, ITERATOR)?;
    rmp::encode::write_u32(buf, iterator as u32)?;
    rmp::encode::write_pfix(buf, KEY)?;
    write_values(buf, key)?;
    finish_frame(buf)
}

pub fn encode_insert(buf: &mut Vec<u8>, sync: u64, space_id: u16, tuple: &[Value]) -> Result<()> {
    encode_store(buf, CommandCode::Insert, sync, space_id, tuple)
}

pub fn encode_replace(buf: &mut Vec<u8>, sync: u64, space_id: u16, tuple: &[Value]) -> Result<()> {
    encode_store(buf, CommandCode::Replace, sync, space_id, tuple)
}

// INSERT and REPLACE share the body shape and differ only in command code.
fn encode_store(
    buf: &mut Vec<u8>,
    code: CommandCode,
    sync: u64,
    space_id: u16,
    tuple: &[Value],
) -> Result<()> {
    begin_frame(buf, code, sync)?;
    rmp::encode::write_map_len(buf, 2)?;
    rmp::encode::write_pfix(buf, SPACE_ID)?;
    rmp::encode::write_u32(buf, space_id.into())?;
    rmp::encode::write_pfix(buf, TUPLE)?;
    write_values(buf, tuple)?;
    finish_frame(buf)
}

/// UPDATE ops ride under the Tuple body key; each op is a small array such as
/// `["+", 2, 25]` or `[":", 1, 3, 0, "esh"]`.
pub fn encode_update(
    buf: &mut Vec<u8>,
    sync: u64,
    space_id: u16,
    index_id: u8,
    key: &[Value],
    ops: &[Value],
) -> Result<()> {
    begin_frame(buf, CommandCode::Update, sync)?;
    rmp::encode::write_map_len(buf, 4)?;
    rmp::encode::write_pfix(buf, SPACE_ID)?;
    rmp::encode::write_u32(buf, space_id.into())?;
    rmp::encode::write_pfix(buf, INDEX_ID)?;
    rmp::encode::write_u32(buf, index_id.into())?;
    rmp::encode::write_pfix(buf, KEY)?;
    write_values(buf, key)?;
    rmp::encode::write_pfix(buf, TUPLE)?;
    write_values(buf, ops)?;
    finish_frame(buf)
}

pub fn encode_delete(
    buf: &mut Vec<u8>,
    sync: u64,
    space_id: u16,
    index_id: u8,
    key: &[Value],
) -> Result<()> {
    begin_frame(buf, CommandCode::Delete, sync)?;
    rmp::encode::write_map_len(buf, 3)?;
    rmp::encode::write_pfix(buf, SPACE_ID)?;
    rmp::encode::write_u32(buf, space_id.into())?;
    rmp::encode::write_pfix(buf, INDEX_ID)?;
    rmp::encode::write_u32(buf, index_id.into())?;
    rmp::encode::write_pfix(buf, KEY)?;
    write_values(buf, key)?;
    finish_frame(buf)
}

/// UPSERT targets the primary index implicitly; ops use their own body key.
pub fn encode_upsert(
    buf: &mut Vec<u8>,
    sync: u64,
    space_id: u16,
    tuple: &[Value],
    ops: &[Value],
) -> Result<()> {
    begin_frame(buf, CommandCode::Upsert, sync)?;
    rmp::encode::write_map_len(buf, 3)?;
    rmp::encode::write_pfix(buf, SPACE_ID)?;
    rmp::encode::write_u32(buf, space_id.into())?;
    rmp::encode::write_pfix(buf, TUPLE)?;
    write_values(buf, tuple)?;
    rmp::encode::write_pfix(buf, OPS)?;
    write_values(buf, ops)?;
    finish_frame(buf)
}

pub fn encode_call(
    buf: &mut Vec<u8>,
    sync: u64,
    function: &str,
    args: &[Value],
) -> Result<()> {
    begin_frame(buf, CommandCode::Call, sync)?;
    rmp::encode::write_map_len(buf, 2)?;
    rmp::encode::write_pfix(buf, FUNCTION_NAME)?;
    rmp::encode::write_str(buf, function)?;
    rmp::encode::write_pfix(buf, TUPLE)?;
    write_values(buf, args)?;
    finish_frame(buf)
}

pub fn encode_eval(
    buf: &mut Vec<u8>,
    sync: u64,
    expression: &str,
    args: &[Value],
) -> Result<()> {
    begin_frame(buf, CommandCode::Eval, sync)?;
    rmp::encode::write_map_len(buf, 2)?;
    rmp::encode::write_pfix(buf, EXPRESSION)?;
    rmp::encode::write_str(buf, expression)?;
    rmp::encode::write_pfix(buf, TUPLE)?;
    write_values(buf, args)?;
    finish_frame(buf)
}
