//! Categorization events for audit and analytics.
//!
//! Wire payload: `{"event": ..., "timestamp": RFC 3339, "ticket_id": ..., "data": {...}}`.
//! Emission never fails the caller: sinks log their own errors. Call
//! [`EventSink::flush`] before exiting to let queued deliveries finish.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

pub const WEBHOOK_URL_ENV: &str = "CATEGORIZATION_WEBHOOK_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "ticket.categorized")]
    TicketCategorized,
    #[serde(rename = "llm.invoked")]
    LlmInvoked,
    #[serde(rename = "rule.low_confidence")]
    RuleLowConfidence,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TicketCategorized => "ticket.categorized",
            EventKind::LlmInvoked => "llm.invoked",
            EventKind::RuleLowConfidence => "rule.low_confidence",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEvent {
    pub event: EventKind,
    pub timestamp: String,
    pub ticket_id: String,
    pub data: serde_json::Value,
}

impl ClassificationEvent {
    pub fn new(event: EventKind, ticket_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            ticket_id: ticket_id.into(),
            data,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ClassificationEvent);

    /// Block until events handed to `emit` have been delivered. Sinks that
    /// deliver synchronously have nothing to do.
    fn flush(&self) {}
}

/// Writes each event as one `info` log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &ClassificationEvent) {
        log::info!(
            "[event] {} ticket={} data={}",
            event.event,
            event.ticket_id,
            event.data
        );
    }
}

/// Count of queued deliveries, with a signal when it drops to zero.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn add(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count += 1;
        }
    }

    fn done(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.idle.notify_all();
            }
        }
    }

    /// `true` if the queue drained within `timeout`.
    fn wait_idle(&self, timeout: Duration) -> bool {
        let Ok(count) = self.count.lock() else {
            return false;
        };
        match self.idle.wait_timeout_while(count, timeout, |count| *count > 0) {
            Ok((count, _)) => *count == 0,
            Err(_) => false,
        }
    }
}

/// JSON POST of every event from a single background worker.
///
/// `emit` only queues. Events are delivered in emission order, each request
/// bounded by the client timeout; failures are logged and dropped. `flush`
/// and `Drop` wait, at most one timeout, for the queue to drain.
pub struct WebhookSink {
    url: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
    queue: Mutex<Option<mpsc::Sender<ClassificationEvent>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    pending: Arc<Pending>,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        let pending = Arc::new(Pending::default());
        let (tx, rx) = mpsc::channel::<ClassificationEvent>();

        let worker = {
            let client = client.clone();
            let url = url.clone();
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name("triage-webhook".to_owned())
                .spawn(move || {
                    for event in rx {
                        if let Err(e) = post_event(&client, &url, &event) {
                            log::error!("[WebhookSink] Failed to deliver {}: {e}", event.event);
                        }
                        pending.done();
                    }
                })
        };
        let (queue, worker) = match worker {
            Ok(handle) => (Some(tx), Some(handle)),
            Err(e) => {
                log::error!("[WebhookSink::new] Could not start delivery worker: {e}");
                (None, None)
            }
        };

        Ok(Self {
            url,
            timeout,
            client,
            queue: Mutex::new(queue),
            worker: Mutex::new(worker),
            pending,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver one event on the calling thread.
    pub fn post(&self, event: &ClassificationEvent) -> Result<(), reqwest::Error> {
        post_event(&self.client, &self.url, event)
    }
}

fn post_event(
    client: &reqwest::blocking::Client,
    url: &str,
    event: &ClassificationEvent,
) -> Result<(), reqwest::Error> {
    client.post(url).json(event).send()?.error_for_status()?;
    Ok(())
}

impl EventSink for WebhookSink {
    fn emit(&self, event: &ClassificationEvent) {
        log::debug!(
            "[WebhookSink::emit] Queueing {} for ticket {}",
            event.event,
            event.ticket_id
        );
        let Ok(queue) = self.queue.lock() else {
            log::error!("[WebhookSink::emit] Queue lock poisoned, dropping {}", event.event);
            return;
        };
        let Some(tx) = queue.as_ref() else {
            log::warn!("[WebhookSink::emit] No delivery worker, dropping {}", event.event);
            return;
        };
        self.pending.add();
        if tx.send(event.clone()).is_err() {
            self.pending.done();
            log::error!("[WebhookSink::emit] Delivery worker stopped, dropping {}", event.event);
        }
    }

    fn flush(&self) {
        if !self.pending.wait_idle(self.timeout) {
            log::warn!(
                "[WebhookSink::flush] Deliveries still pending after {} ms",
                self.timeout.as_millis()
            );
        }
    }
}

impl Drop for WebhookSink {
    fn drop(&mut self) {
        // Closing the channel ends the worker once the queue is drained.
        if let Ok(mut queue) = self.queue.lock() {
            queue.take();
        }
        let drained = self.pending.wait_idle(self.timeout);
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        match worker {
            Some(handle) if drained => {
                let _ = handle.join();
            }
            Some(_) => log::warn!("[WebhookSink::drop] Abandoning undelivered events"),
            None => {}
        }
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &ClassificationEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{ClassificationEvent, EventKind, EventSink};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Keeps every emitted event in memory.
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<ClassificationEvent>>,
        flushes: AtomicUsize,
    }

    impl RecordingSink {
        pub fn flushes(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }

        pub fn events(&self) -> Vec<ClassificationEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn kinds(&self) -> Vec<EventKind> {
            self.events().iter().map(|e| e.event).collect()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &ClassificationEvent) {
            self.events.lock().unwrap().push(event.clone());
        }

        fn flush(&self) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
