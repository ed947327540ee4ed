// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    io,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::BytesMut;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, lookup_host, tcp::{OwnedReadHalf, OwnedWriteHalf}},
    sync::{Mutex, RwLock, oneshot},
    time::{Instant, MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cfg::config::Config,
    client::{common::io_with_timeout, schema::Schema},
    error::{Error, Result},
    protocol::{
        auth::{self, GREETING_LEN, Greeting},
        codec::{self, FRAME_PREFIX_LEN},
        response::{Response, decode_response},
    },
};

/// A single-socket rendezvous expecting exactly one response.
struct Pending {
    tx: oneshot::Sender<Response>,
    sent_at: Instant,
}

/// A pipelined connection to one server.
///
/// Many callers may share one instance: requests are tagged with
/// monotonically increasing sync values, writes are serialized, and a
/// background reader routes each arriving response back to its caller. A
/// caller awaiting a response blocks only itself.
///
/// Tear the connection down with [`Connection::close`]; the reader task holds
/// its own handle, so dropping the last caller handle alone does not stop it.
pub struct Connection {
    /// TCP write half; the lock also serializes sync allocation so wire order
    /// matches sync order. The read half is owned by the reader task alone.
    writer: Mutex<OwnedWriteHalf>,
    pub cfg: Config,
    greeting: Greeting,
    next_sync: AtomicU64,
    /// In-flight requests by sync tag.
    pending: DashMap<u64, Pending>,
    schema: RwLock<Schema>,
    /// Kill switch: once cancelled the connection is dead for good.
    cancel: CancellationToken,
    /// Terminal failure that killed the connection, if any.
    fail_cause: OnceCell<String>,
}

impl Connection {
    /// Establishes a connection: resolve, connect, consume the 128-byte
    /// greeting, start the reader and keepalive tasks, authenticate when the
    /// configured credentials are not the anonymous pair.
    pub async fn connect(cfg: Config) -> Result<Arc<Self>> {
        let endpoint = cfg.endpoint()?;
        let cancel = CancellationToken::new();

        let addr = io_with_timeout(
            "resolve host",
            lookup_host((endpoint.host.as_str(), endpoint.port)),
            cfg.timeouts.dns,
            &cancel,
        )
        .await?
        .next()
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address for {}", endpoint.host),
            ))
        })?;

        let mut stream = io_with_timeout(
            "connect",
            TcpStream::connect(addr),
            cfg.timeouts.connect,
            &cancel,
        )
        .await?;
        stream.set_nodelay(true)?;

        let mut raw = [0u8; GREETING_LEN];
        io_with_timeout(
            "read greeting",
            stream.read_exact(&mut raw),
            cfg.timeouts.read,
            &cancel,
        )
        .await?;
        let greeting = Greeting::parse(&raw)?;
        info!(version = %greeting.version, "connected");

        let (r, w) = stream.into_split();
        let conn = Arc::new(Self {
            writer: Mutex::new(w),
            cfg,
            greeting,
            next_sync: AtomicU64::new(1),
            pending: DashMap::new(),
            schema: RwLock::new(Schema::default()),
            cancel,
            fail_cause: OnceCell::new(),
        });

        let reader = Arc::clone(&conn);
        tokio::spawn(async move {
            if let Err(e) = reader.read_loop(r).await {
                if reader.cancel.is_cancelled() {
                    debug!(error = %e, "read loop stopped");
                } else {
                    warn!(error = %e, "read loop exited");
                    reader.fail(&e);
                }
            }
        });

        if let Some(period) = conn.cfg.timeouts.read.map(|t| t / 3)
            && !period.is_zero()
        {
            let keepalive = Arc::downgrade(&conn);
            let cancel = conn.cancel.clone();
            tokio::spawn(keepalive_loop(keepalive, period, cancel));
        }

        if let Some((user, password)) = endpoint.credentials() {
            if let Err(e) = conn.authenticate(user, password).await {
                conn.close().await;
                return Err(e);
            }
        }

        Ok(conn)
    }

    /// Proves the configured password against the greeting salt.
    pub async fn authenticate(&self, user: &str, password: &str) -> Result<()> {
        let scramble = self.greeting.scramble(password);
        debug!(user, "authenticating");
        self.send(|buf, sync| auth::encode_auth(buf, sync, user, &scramble))
            .await?;
        Ok(())
    }

    /// Dispatches one request frame and awaits its response.
    ///
    /// The closure receives the output buffer and the allocated sync tag and
    /// must leave a complete frame behind. An error-coded response surfaces
    /// as [`Error::Server`] and leaves the connection usable.
    pub(crate) async fn send<F>(&self, encode: F) -> Result<Response>
    where
        F: FnOnce(&mut Vec<u8>, u64) -> Result<()>,
    {
        if self.cancel.is_cancelled() {
            return Err(self.closed_error());
        }

        let (sync, rx) = {
            // One critical section covers "allocate sync, register pending,
            // write frame": frames cannot interleave and the pending entry
            // exists before the response can possibly arrive.
            let mut writer = self.writer.lock().await;
            let sync = self.next_sync.fetch_add(1, Ordering::Relaxed);

            let mut buf = Vec::with_capacity(64);
            encode(&mut buf, sync)?;

            let (tx, rx) = oneshot::channel();
            self.pending.insert(
                sync,
                Pending {
                    tx,
                    sent_at: Instant::now(),
                },
            );
            debug!(sync, bytes = buf.len(), "request dispatched");

            if let Err(e) = io_with_timeout(
                "write request",
                writer.write_all(&buf),
                self.cfg.timeouts.write,
                &self.cancel,
            )
            .await
            {
                self.pending.remove(&sync);
                return Err(e);
            }
            (sync, rx)
        };

        let response = tokio::select! {
            _ = self.cancel.cancelled() => {
                self.pending.remove(&sync);
                return Err(self.closed_error());
            },
            delivered = rx => match delivered {
                Ok(response) => response,
                Err(_) => return Err(self.closed_error()),
            },
        };

        if response.header.is_ok() {
            Ok(response)
        } else {
            Err(Error::Server(response.error.unwrap_or_else(|| {
                format!("code 0x{:04x}", response.header.code)
            })))
        }
    }

    async fn read_loop(&self, mut socket: OwnedReadHalf) -> Result<()> {
        let mut scratch = BytesMut::with_capacity(4096);

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.closed_error());
            }

            let mut prefix = [0u8; FRAME_PREFIX_LEN];
            io_with_timeout(
                "read frame prefix",
                socket.read_exact(&mut prefix),
                self.cfg.timeouts.read,
                &self.cancel,
            )
            .await?;
            let frame_len = codec::read_frame_len(&prefix)?;

            scratch.clear();
            scratch.resize(frame_len, 0);
            io_with_timeout(
                "read frame payload",
                socket.read_exact(&mut scratch[..]),
                self.cfg.timeouts.read,
                &self.cancel,
            )
            .await?;

            let response = decode_response(&scratch)?;
            let sync = response.header.sync;
            match self.pending.remove(&sync) {
                Some((_, pending)) => {
                    debug!(sync, elapsed = ?pending.sent_at.elapsed(), "response delivered");
                    // A send failure means the caller gave up; drop silently.
                    let _ = pending.tx.send(response);
                },
                None => debug!(sync, "dropping response for an unknown sync"),
            }
        }
    }

    /// Publishes the terminal failure and wakes every waiter.
    fn fail(&self, err: &Error) {
        let _ = self.fail_cause.set(err.to_string());
        self.cancel.cancel();
        self.abort_pending();
    }

    fn abort_pending(&self) {
        // Dropping a rendezvous sender wakes its waiter with `Closed`.
        self.pending.retain(|_, _| false);
    }

    /// Closes the connection and fails every pending waiter. Idempotent.
    pub async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!("closing connection");
        self.cancel.cancel();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        drop(writer);
        self.abort_pending();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn greeting(&self) -> &Greeting {
        &self.greeting
    }

    fn closed_error(&self) -> Error {
        Error::Closed {
            cause: self.fail_cause.get().cloned(),
        }
    }

    /// Snapshot of the cached schema.
    pub async fn cached_schema(&self) -> Schema {
        self.schema.read().await.clone()
    }

    pub(crate) async fn replace_schema(&self, schema: Schema) {
        *self.schema.write().await = schema;
    }

    pub(crate) async fn with_schema<T>(&self, resolve: impl FnOnce(&Schema) -> Result<T>) -> Result<T> {
        resolve(&*self.schema.read().await)
    }
}

/// Periodic PING doubling as a liveness probe; it also keeps an otherwise
/// idle connection inside the reader's deadline.
async fn keepalive_loop(conn: Weak<Connection>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so pings start one
    // period after connect.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {},
        }
        let Some(conn) = conn.upgrade() else { return };
        match conn.ping().await {
            Ok(elapsed) => debug!(elapsed = ?elapsed, "keepalive ping"),
            Err(Error::Server(e)) => warn!(error = %e, "keepalive ping rejected"),
            Err(e) => {
                warn!(error = %e, "keepalive ping failed");
                return;
            },
        }
    }
}
