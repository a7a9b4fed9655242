//! Module: obs
//! Responsibility: the metrics sink boundary for hydration/cache events.
//! Does not own: any engine behavior; recording is strictly fire-and-forget.
//! Boundary: the session scopes a sink; engine paths call `record`.

use std::cell::Cell;

///
/// MetricsEvent
///
/// Operation deltas emitted at the points where the engine talks to the
/// identity cache or the persistence layer. Sinks aggregate; the engine
/// never does.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    /// An identity-cache lookup returned an existing instance.
    CacheHit { composite_key: String },

    /// A proxy was reinitialized in place from a fetched record.
    ProxyUpgrade { composite_key: String },

    /// A single-record fetch was issued for a model touch.
    RecordFetch { type_key: String },

    /// One batched fetch was issued for a collection's unloaded subset.
    BatchFetch { type_key: String, ids: usize },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: &MetricsEvent);
}

thread_local! {
    static SINK: Cell<Option<&'static dyn MetricsSink>> = const { Cell::new(None) };
}

/// Run `f` with `sink` installed as the thread's metrics sink, restoring the
/// previous sink afterwards (panics included).
pub fn with_metrics_sink<T>(sink: &'static dyn MetricsSink, f: impl FnOnce() -> T) -> T {
    struct Restore(Option<&'static dyn MetricsSink>);

    impl Drop for Restore {
        fn drop(&mut self) {
            SINK.with(|cell| cell.set(self.0));
        }
    }

    let _restore = Restore(SINK.with(|cell| cell.replace(Some(sink))));
    f()
}

/// Emit one event to the installed sink, if any.
pub(crate) fn record(event: MetricsEvent) {
    SINK.with(|cell| {
        if let Some(sink) = cell.get() {
            sink.record(&event);
        }
    });
}
