//! Trace hook for console reports.
//!
//! `ConsoleReporter` mirrors each snapshot's population counts as `trace`
//! events inside a span named after the snapshot, so
//! `RUST_LOG=heapwatch_exec=trace` puts them on stderr next to the stdout report.

pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::trace_span!("heapwatch", event);
    let _entered = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}
