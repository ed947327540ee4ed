// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Port the server listens on when the URI names none.
pub const DEFAULT_PORT: u16 = 3301;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Where and as whom to connect.
    pub connection: ConnectionConfig,
    /// Per-step I/O deadlines.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConnectionConfig {
    #[serde(rename = "URI")]
    /// `tarantool://[user[:password]@]host[:port]`.
    pub uri: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
/// Deadlines in milliseconds; `null` disables the deadline, zero fails the
/// step immediately.
pub struct TimeoutConfig {
    #[serde(
        rename = "ConnectTimeoutMillis",
        default = "default_io_timeout",
        with = "serde_opt_millis"
    )]
    /// Upper bound on TCP establishment.
    pub connect: Option<Duration>,

    #[serde(
        rename = "DnsTimeoutMillis",
        default = "default_io_timeout",
        with = "serde_opt_millis"
    )]
    /// Upper bound on name resolution.
    pub dns: Option<Duration>,

    #[serde(
        rename = "ReadTimeoutMillis",
        default = "default_io_timeout",
        with = "serde_opt_millis"
    )]
    /// Per-read deadline; also drives the keepalive period.
    pub read: Option<Duration>,

    #[serde(
        rename = "WriteTimeoutMillis",
        default = "default_io_timeout",
        with = "serde_opt_millis"
    )]
    /// Per-write deadline.
    pub write: Option<Duration>,
}

fn default_io_timeout() -> Option<Duration> {
    Some(Duration::from_millis(1_000))
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: default_io_timeout(),
            dns: default_io_timeout(),
            read: default_io_timeout(),
            write: default_io_timeout(),
        }
    }
}

impl Config {
    /// Loads the configuration from YAML and validates it.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Programmatic construction from a URI with default timeouts.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            connection: ConnectionConfig { uri: uri.into() },
            timeouts: TimeoutConfig::default(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.endpoint().context("invalid connection URI")?;
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        self.connection.uri.parse()
    }
}

/// Parsed connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Endpoint {
    /// No user, or the well-known (`guest`, empty password) pair.
    pub fn is_anonymous(&self) -> bool {
        self.credentials().is_none()
    }

    /// Credentials to authenticate with, unless anonymous.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let user = self.user.as_deref()?;
        let password = self.password.as_deref().unwrap_or("");
        if user == "guest" && password.is_empty() {
            None
        } else {
            Some((user, password))
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(uri: &str) -> Result<Self> {
        let rest = uri.strip_prefix("tarantool://").unwrap_or(uri);

        let (userinfo, authority) = match rest.rsplit_once('@') {
            Some((userinfo, authority)) => (Some(userinfo), authority),
            None => (None, rest),
        };

        let (user, password) = match userinfo {
            None | Some("") => (None, None),
            Some(userinfo) => match userinfo.split_once(':') {
                Some((user, password)) => (Some(user.to_string()), Some(password.to_string())),
                None => (Some(userinfo.to_string()), None),
            },
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::BadArgument(format!("invalid port in URI {uri:?}"))
                })?;
                (host, port)
            },
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(Error::BadArgument(format!("missing host in URI {uri:?}")));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            user,
            password,
        })
    }
}

/// Serde helpers representing `Option<Duration>` as milliseconds.
mod serde_opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<u64>::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}
