// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{io, time::Duration};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Races an I/O future against its deadline and the connection kill switch.
///
/// `deadline` of `None` disables the timer; a zero deadline fails before the
/// future is polled at all.
pub(super) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    deadline: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    let Some(deadline) = deadline else {
        return tokio::select! {
            _ = cancel.cancelled() => Err(Error::Closed { cause: None }),
            res = fut => res.map_err(Error::from),
        };
    };
    if deadline.is_zero() {
        return Err(Error::Timeout(label));
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Closed { cause: None }),
        res = timeout(deadline, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(Error::Timeout(label)),
            }
        }
    }
}
