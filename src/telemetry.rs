use std::{fmt, sync::Arc, time::Duration};

use crate::errors::ErrorKind;

/// User-provided callbacks for emitting metrics without taking on a tracing dependency.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub ask_request: Option<Arc<dyn Fn(AskRequestMetrics) + Send + Sync>>,
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field(
                "ask_request",
                &self.ask_request.as_ref().map(|_| "callback"),
            )
            .finish()
    }
}

/// Latency and outcome of one ask call, measured until the stream handle is
/// returned or the call fails.
#[derive(Clone, Debug)]
pub struct AskRequestMetrics {
    pub latency: Duration,
    pub status: Option<u16>,
    /// `None` when the call produced a stream.
    pub error: Option<ErrorKind>,
    pub request_id: Option<String>,
}

/// Internal helper that owns the registered callbacks (if any).
#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    callbacks: MetricsCallbacks,
}

impl Telemetry {
    pub fn new(callbacks: Option<MetricsCallbacks>) -> Self {
        Self {
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.callbacks.ask_request.is_some()
    }

    pub fn record(&self, metrics: AskRequestMetrics) {
        if let Some(cb) = &self.callbacks.ask_request {
            cb(metrics);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn records_only_when_registered() {
        let disabled = Telemetry::new(None);
        assert!(!disabled.enabled());
        disabled.record(AskRequestMetrics {
            latency: Duration::ZERO,
            status: None,
            error: None,
            request_id: None,
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let telemetry = Telemetry::new(Some(MetricsCallbacks {
            ask_request: Some(Arc::new(move |m: AskRequestMetrics| {
                sink.lock().expect("lock").push(m);
            })),
        }));
        assert!(telemetry.enabled());
        telemetry.record(AskRequestMetrics {
            latency: Duration::from_millis(5),
            status: Some(503),
            error: Some(ErrorKind::Http),
            request_id: Some("req-1".into()),
        });

        let seen = seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].status, Some(503));
        assert_eq!(seen[0].error, Some(ErrorKind::Http));
    }
}
