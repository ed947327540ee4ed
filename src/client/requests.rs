// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed request surface: thin operations that resolve names, build request
//! bodies and delegate to the connection core.

use std::time::Duration;

use rmpv::Value;
use tokio::time::Instant;

use crate::{
    client::{
        connection::Connection,
        schema::{IndexRef, SpaceRef},
    },
    error::{Error, Result},
    protocol::{codec, iterator::IteratorType, response::Response},
};

/// Default SELECT result cap.
pub const DEFAULT_LIMIT: u32 = 1 << 30;

/// Id of the primary index in every space.
pub const PRIMARY_INDEX: u8 = 0;

impl Connection {
    /// Health probe; returns the wall time between dispatch and response.
    pub async fn ping(&self) -> Result<Duration> {
        let started = Instant::now();
        self.send(codec::encode_ping).await?;
        Ok(started.elapsed())
    }

    /// Looks tuples up by key.
    ///
    /// `iterator` accepts the typed kind or one of its fixed string aliases
    /// (`"eq"`, `">="`, `"&&"`, ...). Spaces and indexes may be given by name
    /// once the schema cache is populated.
    pub async fn select<I>(
        &self,
        space: impl Into<SpaceRef>,
        index: impl Into<IndexRef>,
        iterator: I,
        key: &[Value],
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Value>>
    where
        I: TryInto<IteratorType>,
        Error: From<I::Error>,
    {
        let iterator: IteratorType = iterator.try_into().map_err(Error::from)?;
        let (space_id, index_id) = self.resolve_pair(&space.into(), &index.into()).await?;
        let response = self
            .send(|buf, sync| {
                codec::encode_select(buf, sync, space_id, index_id, limit, offset, iterator, key)
            })
            .await?;
        Ok(response.into_data())
    }

    /// Single-tuple lookup by primary index.
    pub async fn get(
        &self,
        space: impl Into<SpaceRef>,
        key: &[Value],
    ) -> Result<Option<Value>> {
        let rows = self
            .select(space, PRIMARY_INDEX, IteratorType::Equal, key, 0, 1)
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert(
        &self,
        space: impl Into<SpaceRef>,
        tuple: &[Value],
    ) -> Result<Response> {
        let space_id = self.resolve_space(&space.into()).await?;
        self.send(|buf, sync| codec::encode_insert(buf, sync, space_id, tuple))
            .await
    }

    pub async fn replace(
        &self,
        space: impl Into<SpaceRef>,
        tuple: &[Value],
    ) -> Result<Response> {
        let space_id = self.resolve_space(&space.into()).await?;
        self.send(|buf, sync| codec::encode_replace(buf, sync, space_id, tuple))
            .await
    }

    /// Applies `ops` to the tuple matched by `key`; each op is a small array
    /// such as `["+", 2, 25]`.
    pub async fn update(
        &self,
        space: impl Into<SpaceRef>,
        index: impl Into<IndexRef>,
        key: &[Value],
        ops: &[Value],
    ) -> Result<Response> {
        let (space_id, index_id) = self.resolve_pair(&space.into(), &index.into()).await?;
        self.send(|buf, sync| codec::encode_update(buf, sync, space_id, index_id, key, ops))
            .await
    }

    pub async fn delete(
        &self,
        space: impl Into<SpaceRef>,
        index: impl Into<IndexRef>,
        key: &[Value],
    ) -> Result<Response> {
        let (space_id, index_id) = self.resolve_pair(&space.into(), &index.into()).await?;
        self.send(|buf, sync| codec::encode_delete(buf, sync, space_id, index_id, key))
            .await
    }

    /// Insert-or-update against the primary index.
    pub async fn upsert(
        &self,
        space: impl Into<SpaceRef>,
        tuple: &[Value],
        ops: &[Value],
    ) -> Result<Response> {
        let space_id = self.resolve_space(&space.into()).await?;
        self.send(|buf, sync| codec::encode_upsert(buf, sync, space_id, tuple, ops))
            .await
    }

    /// Calls a server-side stored procedure.
    pub async fn call(&self, function: &str, args: &[Value]) -> Result<Response> {
        self.send(|buf, sync| codec::encode_call(buf, sync, function, args))
            .await
    }

    /// Evaluates a server-side expression.
    pub async fn eval(&self, expression: &str, args: &[Value]) -> Result<Response> {
        self.send(|buf, sync| codec::encode_eval(buf, sync, expression, args))
            .await
    }

    async fn resolve_space(&self, space: &SpaceRef) -> Result<u16> {
        self.with_schema(|schema| schema.resolve_space(space)).await
    }

    async fn resolve_pair(&self, space: &SpaceRef, index: &IndexRef) -> Result<(u16, u8)> {
        self.with_schema(|schema| {
            let space_id = schema.resolve_space(space)?;
            let index_id = schema.resolve_index(space_id, index)?;
            Ok((space_id, index_id))
        })
        .await
    }
}
