use crate::config::*;

use tracing::Subscriber;
use tracing_core::LevelFilter;
use tracing_subscriber::{filter::filter_fn, prelude::*, registry::LookupSpan, Layer};

use std::{io::Error as IoError, path::Path};

/// One output for engine logs. File targets roll daily under `dir`, with
/// colour codes turned off. Events pass if they are at or above the target's
/// level and, when the target lists modules, come from one of them.
fn build_target<S>(
    conf: LogEntry,
    dir: impl AsRef<Path>,
) -> Result<Box<dyn Layer<S> + Send + Sync + 'static>, IoError>
where
    S: Subscriber + Send + Sync,
    for<'span> S: LookupSpan<'span>,
{
    let layer = match &conf.target {
        LogTarget::File { filename } => {
            std::fs::create_dir_all(dir.as_ref())?;
            tracing_subscriber::fmt::layer()
                .with_writer(tracing_appender::rolling::daily(dir, filename))
                .with_ansi(false)
                .boxed()
        }
        LogTarget::Builtin(BuiltinLogTarget::Stdout) => {
            tracing_subscriber::fmt::layer().with_writer(std::io::stdout).boxed()
        }
        LogTarget::Builtin(BuiltinLogTarget::Stderr) => {
            tracing_subscriber::fmt::layer().with_writer(std::io::stderr).boxed()
        }
    };

    let level: LevelFilter = conf.level.map(Into::into).unwrap_or(LevelFilter::TRACE);
    let modules = conf.modules;

    let filter = filter_fn(move |metadata| {
        metadata.level() <= &level
            && (modules.is_empty()
                || metadata
                    .module_path()
                    .map_or(true, |module| modules.iter().any(|m| module.starts_with(m))))
    });

    Ok(layer.with_filter(filter).boxed())
}

/// Build the global subscriber described by `conf`: one formatting layer per
/// configured target, beneath a permissive per-module level filter.
pub fn build_subscriber(conf: LoggingConfig) -> Result<impl Subscriber + Send + Sync, IoError> {
    let mut layers = Vec::new();

    for target in conf.targets {
        layers.push(build_target(target, &conf.dir)?);
    }

    // The global filter only trims noisy dependencies; individual targets do
    // their own filtering, so its default has to stay permissive
    let filter = tracing_subscriber::filter::Targets::new()
        .with_default(conf.default_level.unwrap_or(LogLevel::Trace))
        .with_targets(conf.module_levels);

    Ok(tracing_subscriber::registry().with(filter).with(layers))
}
