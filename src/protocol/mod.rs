// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod auth;
pub mod codec;
pub mod constants;
pub mod iterator;
pub mod response;

/// Dynamic payload value: server responses carry heterogeneous MessagePack
/// values, so callers pattern-match instead of fitting a static schema.
pub use rmpv::Value;
