//! The mail sink: filters records, renders them into messages and
//! dispatches them through the configured backend.
//!
//! Every call to [`MailSink::log`] is an independent dispatch running on
//! its own tokio task. The completion callback fires exactly once and never
//! inside `log()` itself, whether the record was filtered out, delivered, or
//! failed. Without a live runtime it fires from a helper thread instead. Outcomes are published as
//! [`SinkEvent`]s to every subscriber over an unbounded channel, so a burst
//! of dispatches never drops an event for a slow reader.
//!
//! There is no queue and no limit on in-flight dispatches, and the sink adds
//! no timeout of its own: a backend that never completes leaves its
//! dispatch (and callback) pending.

use crate::backend::{create_backend, DeliveryInfo};
use crate::config::{MailerConfig, MailerOptions};
use crate::error::{panic_message, ConfigResult, DispatchError};
use crate::filter;
use crate::message::OutgoingMessage;
use crate::record::Record;
use futures::FutureExt;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, instrument, warn};

/// Outcome notification for one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// The backend accepted the message
    Logged(DeliveryInfo),
    /// The dispatch failed; it is not retried
    Error(DispatchError),
}

/// Result of [`MailSink::deliver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The filter rejected the record; nothing was sent
    Filtered,
    Logged(DeliveryInfo),
    Failed(DispatchError),
}

impl Delivery {
    pub fn is_logged(&self) -> bool {
        matches!(self, Self::Logged(_))
    }

    fn to_event(&self) -> Option<SinkEvent> {
        match self {
            Self::Filtered => None,
            Self::Logged(info) => Some(SinkEvent::Logged(info.clone())),
            Self::Failed(err) => Some(SinkEvent::Error(err.clone())),
        }
    }
}

/// Logging sink that forwards records as email.
///
/// Cheap to clone; clones share configuration and subscribers.
#[derive(Clone)]
pub struct MailSink {
    inner: Arc<Inner>,
}

struct Inner {
    config: MailerConfig,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SinkEvent>>>,
    runtime: Option<Handle>,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when a dispatch finishes (or is dropped)
struct InFlight(Arc<Inner>);

impl InFlight {
    fn start(inner: &Arc<Inner>) -> Self {
        inner.in_flight.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(inner))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Publishes the outcome and runs the completion callback exactly once.
///
/// Dropped unfinished (no runtime, or the runtime shut down before the
/// dispatch ran), it reports `NoRuntime` and runs the callback on a helper
/// thread instead.
struct Completion {
    sink: MailSink,
    done: Option<Box<dyn FnOnce() + Send>>,
    in_flight: Option<InFlight>,
}

impl Completion {
    fn new<F>(sink: &MailSink, done: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            sink: sink.clone(),
            done: Some(Box::new(done)),
            in_flight: Some(InFlight::start(&sink.inner)),
        }
    }

    fn finish(mut self, delivery: &Delivery) {
        self.sink.publish(delivery);
        if let Some(done) = self.done.take() {
            done();
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let Some(done) = self.done.take() else {
            return;
        };
        let sink = self.sink.clone();
        let in_flight = self.in_flight.take();
        std::thread::spawn(move || {
            sink.emit(SinkEvent::Error(DispatchError::NoRuntime));
            done();
            drop(in_flight);
        });
    }
}

impl MailSink {
    /// Validate `options` and create the sink.
    ///
    /// Fails only when there is no recipient.
    pub fn new(options: MailerOptions) -> ConfigResult<Self> {
        let runtime = options
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok());
        let config = MailerConfig::validate(options)?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                subscribers: Mutex::new(Vec::new()),
                runtime,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        })
    }

    pub fn config(&self) -> &MailerConfig {
        &self.inner.config
    }

    /// Receive every `logged` / `error` event published after this call.
    ///
    /// The channel is unbounded; dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SinkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers().push(tx);
        rx
    }

    /// Number of dispatches that have not completed yet
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Hand a record to the sink.
    ///
    /// Returns immediately. `done` runs exactly once on a runtime task after
    /// the record was filtered out or its dispatch finished (and its event
    /// was published). Without a live runtime the dispatch fails with
    /// `NoRuntime` and `done` runs on a helper thread.
    pub fn log<F>(&self, record: Record, done: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let completion = Completion::new(self, done);
        let Some(runtime) = self.runtime() else {
            return;
        };

        let prepared = self.prepare(&record);
        let sink = self.clone();

        // A shut-down runtime drops the task unpolled; `Completion` covers that.
        runtime.spawn(async move {
            let delivery = sink.complete(prepared).await;
            completion.finish(&delivery);
        });
    }

    /// Run the same pipeline as [`log`](Self::log) and await its outcome.
    ///
    /// The matching event is still published.
    pub async fn deliver(&self, record: Record) -> Delivery {
        let _guard = InFlight::start(&self.inner);
        let prepared = self.prepare(&record);
        let delivery = self.complete(prepared).await;
        self.publish(&delivery);
        delivery
    }

    /// Wait until every dispatch started so far has completed
    pub async fn flush(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Apply the filter and build the message; `None` when filtered out.
    pub fn prepare(&self, record: &Record) -> Result<Option<OutgoingMessage>, DispatchError> {
        let accepted = filter::evaluate(self.inner.config.filter(), record)
            .map_err(DispatchError::filter)?;

        if !accepted {
            debug!(level = %record.level, "Record rejected by filter");
            return Ok(None);
        }

        Ok(Some(self.render(record)))
    }

    /// Build a fresh message for `record`. The configured template is only read.
    pub fn render(&self, record: &Record) -> OutgoingMessage {
        let config = &self.inner.config;
        OutgoingMessage::new(
            config.to().to_vec(),
            config.from(),
            config.subject().render(&record.level, record.first_line()),
            record.display_text(),
        )
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<SinkEvent>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn runtime(&self) -> Option<Handle> {
        self.inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    async fn complete(
        &self,
        prepared: Result<Option<OutgoingMessage>, DispatchError>,
    ) -> Delivery {
        match prepared {
            Ok(Some(message)) => self.dispatch(message).await,
            Ok(None) => Delivery::Filtered,
            Err(err) => Delivery::Failed(err),
        }
    }

    #[instrument(
        skip_all,
        fields(message_id = %message.id, backend = self.inner.config.backend().kind())
    )]
    async fn dispatch(&self, message: OutgoingMessage) -> Delivery {
        let created = catch_unwind(AssertUnwindSafe(|| {
            create_backend(self.inner.config.backend())
        }));
        let backend = match created {
            Ok(Ok(backend)) => backend,
            Ok(Err(report)) => return Delivery::Failed(DispatchError::backend_setup(report)),
            Err(payload) => {
                return Delivery::Failed(DispatchError::BackendSetup(format!(
                    "backend construction panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
        };

        let sent = AssertUnwindSafe(backend.send(&message)).catch_unwind().await;
        match sent {
            Ok(Ok(info)) => {
                debug!(delivered_id = %info.message_id, "Record mailed");
                Delivery::Logged(info)
            }
            Ok(Err(report)) => {
                debug!(error = %report, "Backend send failed");
                Delivery::Failed(DispatchError::send(report))
            }
            Err(payload) => Delivery::Failed(DispatchError::Send(format!(
                "backend panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    fn publish(&self, delivery: &Delivery) {
        if let Some(event) = delivery.to_event() {
            self.emit(event);
        }
    }

    fn emit(&self, event: SinkEvent) {
        let delivered = {
            let mut subscribers = self.subscribers();
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
            !subscribers.is_empty()
        };

        if let (false, SinkEvent::Error(err)) = (delivered, &event) {
            warn!(error = %err, "Mail dispatch failed and nobody is subscribed to sink events");
        }
    }
}

impl fmt::Debug for MailSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSink")
            .field("config", &self.inner.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOptions, MockBackend};
    use crate::config::MessageOptions;

    fn sink_with(message: MessageOptions, backend: MockBackend) -> MailSink {
        MailSink::new(
            MailerOptions::new(message).backend(BackendOptions::shared(Arc::new(backend))),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_render_uses_first_line_and_display_text() {
        let sink = sink_with(
            MessageOptions::new("test@example.com").subject("{{ level }} {{ message }}"),
            MockBackend::new(),
        );
        let record = Record::new("info", "Line 1\nLine 2").with_display_text("formatted body");

        let message = sink.render(&record);
        assert_eq!(message.subject, "info Line 1");
        assert_eq!(message.text, "formatted body");
        assert_eq!(message.to, vec!["test@example.com"]);
        assert_eq!(sink.config().subject().source(), "{{ level }} {{ message }}");
    }

    #[tokio::test]
    async fn test_prepare_filtered() {
        let sink = sink_with(
            MessageOptions::new("test@example.com").filter(|r| r.level == "error"),
            MockBackend::new(),
        );
        assert_eq!(sink.prepare(&Record::new("info", "x")), Ok(None));
        assert!(sink.prepare(&Record::new("error", "x")).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deliver_reports_backend_failure() {
        let sink = sink_with(
            MessageOptions::new("test@example.com"),
            MockBackend::failing("mailbox unavailable"),
        );
        let mut events = sink.subscribe();

        let delivery = sink.deliver(Record::new("error", "boom")).await;
        let Delivery::Failed(DispatchError::Send(reason)) = &delivery else {
            panic!("expected send failure, got {delivery:?}");
        };
        assert!(reason.contains("mailbox unavailable"));
        assert_eq!(
            events.recv().await.unwrap(),
            SinkEvent::Error(DispatchError::Send(reason.clone()))
        );
    }

    #[tokio::test]
    async fn test_flush_waits_for_in_flight_dispatches() {
        let backend = MockBackend::new().delayed(std::time::Duration::from_millis(20));
        let sink = sink_with(MessageOptions::new("test@example.com"), backend.clone());

        for i in 0..3 {
            sink.log(Record::new("error", format!("record {i}")), || {});
        }
        assert_eq!(sink.in_flight(), 3);

        sink.flush().await;
        assert_eq!(sink.in_flight(), 0);
        assert_eq!(backend.sent_count().await, 3);
    }

    #[test]
    fn test_log_without_runtime_still_completes() {
        let sink = MailSink::new(MailerOptions::new(MessageOptions::new("test@example.com")))
            .unwrap();
        let mut events = sink.subscribe();
        let (tx, rx) = std::sync::mpsc::channel();

        sink.log(Record::new("error", "no runtime"), move || {
            tx.send(()).unwrap();
        });

        rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            SinkEvent::Error(DispatchError::NoRuntime)
        );
    }

    #[test]
    fn test_log_after_runtime_shutdown_still_completes() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let sink = runtime.block_on(async {
            MailSink::new(MailerOptions::new(MessageOptions::new("test@example.com"))).unwrap()
        });
        drop(runtime);

        let mut events = sink.subscribe();
        let (tx, rx) = std::sync::mpsc::channel();
        sink.log(Record::new("error", "runtime gone"), move || {
            tx.send(()).unwrap();
        });

        rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            SinkEvent::Error(DispatchError::NoRuntime)
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_burst_of_dispatches_loses_no_events() {
        let sink = MailSink::new(MailerOptions::new(MessageOptions::new("test@example.com")))
            .unwrap();
        let mut events = sink.subscribe();

        for i in 0..500 {
            sink.log(Record::new("error", format!("record {i}")), || {});
        }
        sink.flush().await;

        let mut logged = 0;
        while let Ok(event) = events.try_recv() {
            assert!(matches!(event, SinkEvent::Logged(_)), "unexpected {event:?}");
            logged += 1;
        }
        assert_eq!(logged, 500);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let sink = sink_with(MessageOptions::new("test@example.com"), MockBackend::new());
        let dropped = sink.subscribe();
        let mut kept = sink.subscribe();
        drop(dropped);

        assert!(sink.deliver(Record::new("error", "x")).await.is_logged());
        assert!(matches!(kept.recv().await, Some(SinkEvent::Logged(_))));
        assert_eq!(sink.subscribers().len(), 1);
    }
}
