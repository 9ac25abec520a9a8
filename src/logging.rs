//! Tracing and panic logging setup for applications embedding eddy.
//!
//! The reconciler logs through `tracing` and never installs a subscriber itself.
//! Call [`install_tracing`] once at startup to print those events to stderr.

use std::io::{self, Write};
use std::panic::{self, PanicHookInfo};
use std::sync::Once;
use std::thread;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::fmt::{self, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const PREFIX: &str = "[eddy]";
const DEFAULT_DIRECTIVE: &str = "info";
const ENV_VAR: &str = "EDDY_LOG";

// ============================================================================
// Global State
// ============================================================================

static TRACING_INSTALLED: Once = Once::new();
static PANIC_HOOK_INSTALLED: Once = Once::new();

// ============================================================================
// Installation
// ============================================================================

/// Installs a stderr subscriber filtered by `EDDY_LOG`, falling back to `RUST_LOG`
/// and then to `info`. Later calls do nothing.
pub fn install_tracing() {
    install_tracing_with(DEFAULT_DIRECTIVE);
}

/// Like [`install_tracing`], with an explicit fallback filter such as
/// `"eddy_core=debug"`.
pub fn install_tracing_with(default_directive: &str) {
    TRACING_INSTALLED.call_once(|| {
        let filter = EnvFilter::try_from_env(ENV_VAR)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        let console = fmt::layer()
            .event_format(PrefixedFormatter)
            .with_writer(StderrWriter)
            .with_ansi(false)
            .with_filter(filter);

        if tracing_subscriber::registry().with(console).try_init().is_err() {
            eprintln!("{PREFIX} a global tracing subscriber is already installed");
        }
    });
}

/// Routes panics through `tracing` before the previous hook runs. Later calls do
/// nothing.
pub fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            log_panic(info);
            previous(info);
        }));
    });
}

fn log_panic(info: &PanicHookInfo<'_>) {
    let message = panic_message(info);
    let thread = thread::current().name().unwrap_or("unnamed").to_owned();
    let location = info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));
    tracing::error!(
        target: "eddy::panic",
        message = %message,
        thread = %thread,
        location = location.as_deref().unwrap_or("unknown"),
    );
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

// ============================================================================
// Console Output
// ============================================================================

#[derive(Clone, Copy, Default)]
struct StderrWriter;

impl<'a> MakeWriter<'a> for StderrWriter {
    type Writer = io::Stderr;

    fn make_writer(&'a self) -> Self::Writer {
        io::stderr()
    }
}

#[derive(Clone, Copy, Default)]
struct PrefixedFormatter;

impl<S, N> FormatEvent<S, N> for PrefixedFormatter
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        write!(writer, "{PREFIX} {} {}: ", metadata.level(), metadata.target())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Flushes stderr; useful before exiting after an error was logged.
pub fn flush() {
    let _ = io::stderr().flush();
}
