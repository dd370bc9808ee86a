// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Global `tracing` subscriber set-up.
//!
//! `RUST_LOG`, when set, replaces the `--log-level` flag entirely.

use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::cli::LogFormat;

/// Chatty dependencies kept at a lower level whatever the flag says.
const QUIET_TARGETS: [&str; 4] = ["hyper=warn", "tower_http=info", "axum=info", "tokio_serial=warn"];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the subscriber. A second call is ignored.
///
/// ```ignore
/// azimuth_bin::init_logging("debug", LogFormat::Json);
/// ```
pub fn init_logging(level: &str, format: LogFormat) {
    let _ = tracing_subscriber::registry()
        .with(output_layer(format))
        .with(filter_for(level))
        .try_init();
}

fn output_layer(format: LogFormat) -> BoxedLayer {
    let ansi = std::io::stdout().is_terminal();
    match format {
        LogFormat::Text => fmt::layer().with_target(true).with_ansi(ansi).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).with_ansi(ansi).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_current_span(true)
            .boxed(),
    }
}

fn filter_for(level: &str) -> EnvFilter {
    let base = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).as_str().to_lowercase()));

    QUIET_TARGETS
        .iter()
        .filter_map(|target| target.parse::<Directive>().ok())
        .fold(base, |filter, directive| filter.add_directive(directive))
}

/// Maps a level name to a [`Level`]. Unknown names mean `INFO`.
pub fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
