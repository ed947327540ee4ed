// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{convert::Infallible, io};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the client.
///
/// `Server` is a per-request failure and leaves the connection usable; every
/// other variant either precedes the request or ends the connection.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O step exceeded its configured deadline, or the deadline was zero.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// The connection is closed; `cause` carries the terminal failure that
    /// closed it, if it died rather than being closed explicitly.
    #[error("connection closed{}", .cause.as_deref().map(|c| format!(": {c}")).unwrap_or_default())]
    Closed { cause: Option<String> },

    /// Malformed greeting, frame, or response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error response; the message is verbatim.
    #[error("server error: {0}")]
    Server(String),

    /// Invalid caller-supplied input (iterator alias, URI, ...).
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// A space or index name is absent from the schema cache.
    #[error("name not resolved: {0}")]
    NotResolved(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<rmp::encode::ValueWriteError> for Error {
    fn from(err: rmp::encode::ValueWriteError) -> Self {
        match err {
            rmp::encode::ValueWriteError::InvalidMarkerWrite(e)
            | rmp::encode::ValueWriteError::InvalidDataWrite(e) => Error::Io(e),
        }
    }
}

impl From<rmp::decode::ValueReadError> for Error {
    fn from(err: rmp::decode::ValueReadError) -> Self {
        Error::Protocol(err.to_string())
    }
}

impl From<rmp::decode::NumValueReadError> for Error {
    fn from(err: rmp::decode::NumValueReadError) -> Self {
        Error::Protocol(err.to_string())
    }
}

impl From<rmpv::decode::Error> for Error {
    fn from(err: rmpv::decode::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

impl From<Infallible> for Error {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}
