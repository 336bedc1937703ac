// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

/// Severity of a message coming out of a driver or validation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Verbose => "verbose",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// Receiver for diagnostic messages. Backends hold one of these instead of
/// writing to a process-wide logger, so callers decide where messages end up.
pub trait DiagnosticSink: Send + Sync {
    /// `category` is a short free-form tag such as "validation" or "performance".
    fn report(&self, severity: Severity, category: &str, message: &str);
}

/// Forwards diagnostics to `tracing` at a matching level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, severity: Severity, category: &str, message: &str) {
        match severity {
            Severity::Error => tracing::error!(category, "{message}"),
            Severity::Warning => tracing::warn!(category, "{message}"),
            Severity::Info => tracing::debug!(category, "{message}"),
            Severity::Verbose => tracing::trace!(category, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Collect(Mutex<Vec<(Severity, String, String)>>);

    impl DiagnosticSink for Collect {
        fn report(&self, severity: Severity, category: &str, message: &str) {
            self.0
                .lock()
                .unwrap()
                .push((severity, category.to_owned(), message.to_owned()));
        }
    }

    #[test]
    fn sinks_are_usable_as_shared_trait_objects() {
        let collect = Arc::new(Collect::default());
        let sink: Arc<dyn DiagnosticSink> = collect.clone();
        sink.report(Severity::Warning, "validation", "descriptor never written");
        sink.report(Severity::Error, "general", "device lost");

        let seen = collect.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, Severity::Warning);
        assert_eq!(seen[1].2, "device lost");
    }

    #[test]
    fn severity_orders_by_importance() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Verbose);
        assert_eq!(Severity::Warning.to_string(), "warning");
    }

    #[test]
    fn tracing_sink_accepts_every_level() {
        crate::init_tracing();
        for s in [
            Severity::Verbose,
            Severity::Info,
            Severity::Warning,
            Severity::Error,
        ] {
            TracingSink.report(s, "test", "message");
        }
    }
}
