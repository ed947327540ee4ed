// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! YAML-driven JSON logger.
//!
//! Connection code records the wire `sync` tag as a structured field; the
//! formatter lifts it (and the event message) out of the field map so log
//! lines can be correlated with pipelined requests without parsing text.

use std::{fmt::Debug, fs, path::Path, sync::Arc};

use anyhow::Context;
use chrono::Utc;
use fastrace::collector::{Config, ConsoleReporter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{Event, Subscriber};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{
        self, FmtContext, FormatEvent, FormatFields,
        format::Writer,
        writer::BoxMakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
};

/// The `logger:` section of the config file.
#[derive(Debug, Deserialize, Clone)]
struct LoggerSection {
    logger: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
enum LogSink {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
enum Rotate {
    Minutely,
    Hourly,
    Daily,
    Never,
}

#[derive(Debug, Deserialize, Clone)]
struct LogFile {
    path: String,
    #[serde(default)]
    rotation_frequency: Option<Rotate>,
}

impl LogFile {
    fn rotation(&self) -> Rotation {
        match self.rotation_frequency.clone().unwrap_or(Rotate::Never) {
            Rotate::Minutely => Rotation::MINUTELY,
            Rotate::Hourly => Rotation::HOURLY,
            Rotate::Daily => Rotation::DAILY,
            Rotate::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
struct LogSettings {
    level: String,
    output: LogSink,
    #[serde(default)]
    is_show_line: bool,
    #[serde(default)]
    is_show_module_path: bool,
    #[serde(default)]
    is_show_target: bool,
    file: Option<LogFile>,
}

impl LogSettings {
    fn writer(&self) -> anyhow::Result<(BoxMakeWriter, WorkerGuard)> {
        Ok(match self.output {
            LogSink::Stdout => {
                let (w, guard) = tracing_appender::non_blocking(std::io::stdout());
                (BoxMakeWriter::new(w), guard)
            },
            LogSink::Stderr => {
                let (w, guard) = tracing_appender::non_blocking(std::io::stderr());
                (BoxMakeWriter::new(w), guard)
            },
            LogSink::File => {
                let file = self
                    .file
                    .as_ref()
                    .context("logger.file is required for output=file")?;
                let path = Path::new(&file.path);
                let appender = RollingFileAppender::new(
                    file.rotation(),
                    path.parent().unwrap_or_else(|| Path::new(".")),
                    path.file_name().unwrap_or_default(),
                );
                let (w, guard) = tracing_appender::non_blocking(appender);
                (BoxMakeWriter::new(w), guard)
            },
        })
    }
}

/// One emitted line. `sync` is the request tag a connection event belongs to;
/// everything else the event recorded lands in `fields`.
#[derive(Serialize)]
struct WireLogLine<'a> {
    ts: String,
    level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync: Option<u64>,
    message: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    fields: serde_json::Map<String, serde_json::Value>,
}

/// Splits an event's fields into message, sync tag, and the rest.
#[derive(Default)]
struct FieldSplitter {
    message: String,
    sync: Option<u64>,
    rest: serde_json::Map<String, serde_json::Value>,
}

impl tracing::field::Visit for FieldSplitter {
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        if field.name() == "sync" {
            self.sync = Some(value);
        } else {
            self.rest.insert(field.name().to_string(), json!(value));
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.rest.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.rest.insert(field.name().to_string(), json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.rest.insert(field.name().to_string(), json!(value));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.rest
                .insert(field.name().to_string(), json!(format!("{value:?}")));
        }
    }
}

struct WireFormat {
    settings: Arc<LogSettings>,
}

impl<S, N> FormatEvent<S, N> for WireFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut split = FieldSplitter::default();
        event.record(&mut split);

        let meta = event.metadata();
        let line = WireLogLine {
            ts: Utc::now().to_rfc3339(),
            level: meta.level().to_string(),
            target: self.settings.is_show_target.then(|| meta.target()),
            module: if self.settings.is_show_module_path {
                meta.module_path()
            } else {
                None
            },
            line: if self.settings.is_show_line {
                meta.line()
            } else {
                None
            },
            sync: split.sync,
            message: split.message,
            fields: split.rest,
        };

        writeln!(
            writer,
            "{}",
            serde_json::to_string(&line).map_err(|_| std::fmt::Error)?
        )
    }
}

/// Installs the global subscriber from the `logger:` section of the given
/// config file. The returned guard must outlive all logging.
pub fn init_logger(config_path: &str) -> anyhow::Result<WorkerGuard> {
    let raw = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read config file: {config_path}"))?;
    let section: LoggerSection = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config file: {config_path}"))?;
    let settings = Arc::new(section.logger);

    let (writer, guard) = settings.writer()?;

    fastrace::set_reporter(ConsoleReporter, Config::default());

    let filter = EnvFilter::try_new(&settings.level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse log level from config or env")?;

    let subscriber = Registry::default()
        .with(filter)
        .with(fastrace_tracing::FastraceCompatLayer::new())
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .event_format(WireFormat { settings }),
        );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global default subscriber")?;

    Ok(guard)
}
