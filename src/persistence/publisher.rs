//! Round fan-out: cache synchronously, then hand off to durable sinks.

use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::round_cache::RoundCache;
use super::RoundSink;
use crate::domain::RoundReport;

pub struct RoundPublisher {
    cache: Arc<RoundCache>,
    sinks: Vec<Arc<dyn RoundSink>>,
    events: broadcast::Sender<Arc<RoundReport>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl RoundPublisher {
    pub fn new(cache: Arc<RoundCache>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            cache,
            sinks: Vec::new(),
            events,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn RoundSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn cache(&self) -> &Arc<RoundCache> {
        &self.cache
    }

    /// Live feed of published rounds
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RoundReport>> {
        self.events.subscribe()
    }

    /// Publish a finished round.
    ///
    /// The cache write happens before this returns. Each sink runs on its own
    /// task; a failing sink is logged and never affects the round or the
    /// other sinks.
    pub fn publish(&self, report: Arc<RoundReport>) {
        self.cache.push(report.clone());
        // No subscribers is not an error
        let _ = self.events.send(report.clone());

        let mut handles = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let sink = sink.clone();
            let report = report.clone();
            handles.push(tokio::spawn(async move {
                match sink.publish(&report).await {
                    Ok(()) => debug!(sink = sink.name(), round_id = %report.round_id, "Round delivered"),
                    Err(e) => warn!(
                        sink = sink.name(),
                        round_id = %report.round_id,
                        error = %e,
                        "Round sink failed"
                    ),
                }
            }));
        }

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.extend(handles);
    }

    /// Wait for in-flight sink deliveries (used before process exit)
    pub async fn flush(&self) {
        let handles: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Round sink task aborted");
            }
        }
    }
}
