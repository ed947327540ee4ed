// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Client-side schema cache: space/index names resolved to numeric ids.
//!
//! The cache is populated exclusively by [`Connection::parse_schema`] and is
//! never touched by request traffic; request builders only read it.

use std::collections::HashMap;

use rmpv::Value;

use crate::{
    client::connection::Connection,
    error::{Error, Result},
};

/// A space given either by numeric id or by cached name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceRef {
    Id(u16),
    Name(String),
}

impl From<u16> for SpaceRef {
    fn from(id: u16) -> Self {
        SpaceRef::Id(id)
    }
}

impl From<&str> for SpaceRef {
    fn from(name: &str) -> Self {
        SpaceRef::Name(name.to_string())
    }
}

impl From<String> for SpaceRef {
    fn from(name: String) -> Self {
        SpaceRef::Name(name)
    }
}

/// An index within a space, by id or by cached name. The primary index is 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRef {
    Id(u8),
    Name(String),
}

impl From<u8> for IndexRef {
    fn from(id: u8) -> Self {
        IndexRef::Id(id)
    }
}

impl From<&str> for IndexRef {
    fn from(name: &str) -> Self {
        IndexRef::Name(name.to_string())
    }
}

impl From<String> for IndexRef {
    fn from(name: String) -> Self {
        IndexRef::Name(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceMeta {
    pub id: u16,
    pub indexes: HashMap<String, u8>,
}

/// Snapshot of the server schema as of the last [`Connection::parse_schema`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub spaces: HashMap<String, SpaceMeta>,
}

impl Schema {
    pub fn resolve_space(&self, space: &SpaceRef) -> Result<u16> {
        match space {
            SpaceRef::Id(id) => Ok(*id),
            SpaceRef::Name(name) => self
                .spaces
                .get(name)
                .map(|meta| meta.id)
                .ok_or_else(|| Error::NotResolved(name.clone())),
        }
    }

    /// Index ids pass through; index names are looked up in whichever cached
    /// space carries `space_id`.
    pub fn resolve_index(&self, space_id: u16, index: &IndexRef) -> Result<u8> {
        match index {
            IndexRef::Id(id) => Ok(*id),
            IndexRef::Name(name) => self
                .spaces
                .values()
                .find(|meta| meta.id == space_id)
                .and_then(|meta| meta.indexes.get(name).copied())
                .ok_or_else(|| Error::NotResolved(name.clone())),
        }
    }
}

impl Connection {
    /// Refreshes the schema cache from the server.
    ///
    /// Lists space names with `return box.space`, then fetches each space's
    /// index map and id. Requires execute access to the universe; permission
    /// failures surface as the server's error.
    pub async fn parse_schema(&self) -> Result<Schema> {
        let spaces = self.eval("return box.space", &[]).await?;
        let names = space_names(spaces.data())?;

        let mut schema = Schema::default();
        for name in names {
            let indexes = self
                .eval(&format!("return box.space.{name}.index"), &[])
                .await?;
            let id = self.eval(&format!("return box.space.{name}.id"), &[]).await?;
            schema.spaces.insert(
                name,
                SpaceMeta {
                    id: space_id(id.data())?,
                    indexes: index_ids(indexes.data())?,
                },
            );
        }

        self.replace_schema(schema.clone()).await;
        Ok(schema)
    }
}

/// `return box.space` yields one row: a map whose string keys are space names.
/// Numeric keys are server-internal id aliases and are skipped.
fn space_names(rows: &[Value]) -> Result<Vec<String>> {
    let entries = single_map_row(rows, "box.space")?;
    Ok(entries
        .iter()
        .filter_map(|(key, _)| key.as_str().map(str::to_string))
        .collect())
}

/// `return box.space.<name>.index` yields a map from index name to an index
/// object carrying an `id` field; non-string keys are skipped.
fn index_ids(rows: &[Value]) -> Result<HashMap<String, u8>> {
    let entries = single_map_row(rows, "space index map")?;
    let mut indexes = HashMap::new();
    for (key, value) in entries {
        let Some(name) = key.as_str() else {
            continue;
        };
        let id = value
            .as_map()
            .and_then(|fields| {
                fields
                    .iter()
                    .find(|(field, _)| field.as_str() == Some("id"))
            })
            .and_then(|(_, id)| id.as_u64())
            .and_then(|id| u8::try_from(id).ok())
            .ok_or_else(|| {
                Error::Protocol(format!("index {name:?} carries no usable id"))
            })?;
        indexes.insert(name.to_string(), id);
    }
    Ok(indexes)
}

/// `return box.space.<name>.id` yields a single integer row.
fn space_id(rows: &[Value]) -> Result<u16> {
    rows.first()
        .and_then(Value::as_u64)
        .and_then(|id| u16::try_from(id).ok())
        .ok_or_else(|| Error::Protocol("space id is not a small integer".into()))
}

fn single_map_row<'a>(rows: &'a [Value], what: &str) -> Result<&'a [(Value, Value)]> {
    rows.first()
        .and_then(Value::as_map)
        .map(Vec::as_slice)
        .ok_or_else(|| Error::Protocol(format!("{what} did not return a map")))
}
