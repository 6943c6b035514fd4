//! Tracing and logging infrastructure.
//!
//! The query tools only emit `tracing` events: dropped sort fields and
//! directions at `debug`, backend round trips of the readers at `debug`.
//! Applications embedding the crate either install their own subscriber or
//! call [`setup_tracing`] once at startup:
//!
//! ```rust,ignore
//! fn main() {
//!     sansho::logging::setup_tracing();
//!     // ... rest of application
//! }
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RUST_LOG` | Console log filter (e.g., `info`, `sansho=debug`) | `info` |
//!
//! # Output Modes
//!
//! Without `pretty_logs`, output is plain text suitable for log aggregation:
//! ```text
//! DEBUG sansho::query::sort: Dropping unknown sort field 'nope' [find_orders{tenant=acme}]
//! ```
//!
//! With `pretty_logs`, output is colorized with timestamps and span nesting:
//! ```text
//! 14:32:01.234 DEBUG | sansho::query::sort: Dropping unknown sort field 'nope'
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[cfg(feature = "pretty_logs")]
use tracing_subscriber::fmt::format::FmtSpan;

mod production;

#[cfg(feature = "pretty_logs")]
mod pretty;

pub use production::ProductionLogFormat;

/// Installs a console subscriber filtered by `RUST_LOG`.
///
/// Does nothing but log a warning if a global subscriber is already set,
/// so a host application keeps its own.
pub fn setup_tracing() {
    match Registry::default().with(setup_console_layer()).try_init() {
        Ok(()) => tracing::info!("Tracing initialized successfully [reporting to console]"),
        Err(err) => tracing::warn!("Keeping the existing tracing subscriber: {}", err),
    }
}

fn console_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Colorful console output with timestamps and span nesting.
#[cfg(feature = "pretty_logs")]
fn setup_console_layer() -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW)
        .event_format(pretty::PrettyLogFormat)
        .with_filter(console_filter())
        .boxed()
}

/// Plain console output with span context, no ANSI.
#[cfg(not(feature = "pretty_logs"))]
fn setup_console_layer() -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(ProductionLogFormat)
        .with_filter(console_filter())
        .boxed()
}
