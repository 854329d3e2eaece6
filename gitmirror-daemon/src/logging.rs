//! `tracing` subscriber built from the `logging` config section.
//!
//! Format, output and timestamp are fixed at startup. The level sits behind a
//! `reload` layer so a config reload can change it in place. A `RUST_LOG`
//! environment filter wins over the configured level for the whole run.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer, Registry};

use gitmirror_core::{LogFormat, LogLevel, LogOutput, LogSettings};

use crate::error::{io_err, DaemonError};

/// Handle for changing the log level after startup.
#[derive(Clone)]
pub struct LogHandle {
    filter: Option<reload::Handle<EnvFilter, Registry>>,
    env_override: bool,
}

impl LogHandle {
    /// A handle that ignores level changes; used when no subscriber was installed here.
    pub fn disabled() -> Self {
        Self {
            filter: None,
            env_override: false,
        }
    }

    pub fn set_level(&self, level: LogLevel) -> Result<(), DaemonError> {
        let Some(filter) = &self.filter else {
            return Ok(());
        };
        if self.env_override {
            tracing::debug!(level = %level, "RUST_LOG is set; ignoring configured level");
            return Ok(());
        }
        filter
            .reload(EnvFilter::new(level.as_directive()))
            .map_err(|err| DaemonError::Logging(err.to_string()))
    }
}

/// Install the global subscriber.
pub fn init(settings: &LogSettings) -> Result<LogHandle, DaemonError> {
    let (env_filter, env_override) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(settings.level.as_directive()), false),
    };
    let (filter, handle) = reload::Layer::new(env_filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(settings)?)
        .try_init()
        .map_err(|err| DaemonError::Logging(err.to_string()))?;

    Ok(LogHandle {
        filter: Some(handle),
        env_override,
    })
}

fn fmt_layer<S>(settings: &LogSettings) -> Result<Box<dyn Layer<S> + Send + Sync>, DaemonError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let writer = match &settings.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| io_err(path, e))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    };

    let layer = fmt::layer().with_target(false).with_writer(writer);
    let layer = match (settings.format, settings.timestamp) {
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
        (LogFormat::Text, true) => layer.boxed(),
        (LogFormat::Text, false) => layer.without_time().boxed(),
    };
    Ok(layer)
}
