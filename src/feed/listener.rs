//! Owned event subscription feeding the orchestrator.

use futures_util::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::{EventFeed, FeedEvent, Signal};
use crate::errors::FeedError;
use crate::jobs::JobSignals;

/// Subscription to the event feed, scoped to a set of bound sessions.
///
/// A subscription exists only while the listener is enabled and at least
/// one session is bound. Changing either tears the current subscription
/// down and opens a new one. Dropping the listener tears it down too.
pub struct EventListener {
    feed: Arc<dyn EventFeed>,
    signals: Arc<dyn JobSignals>,
    sessions: BTreeSet<String>,
    enabled: bool,
    active: Option<Subscription>,
}

struct Subscription {
    /// Shutdown signal sender
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Flips to true once the feed has accepted the subscription
    live: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl Subscription {
    fn cancel(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.task.abort();
    }
}

impl EventListener {
    /// Create an enabled listener with no bound sessions.
    pub fn new(feed: Arc<dyn EventFeed>, signals: Arc<dyn JobSignals>) -> Self {
        Self {
            feed,
            signals,
            sessions: BTreeSet::new(),
            enabled: true,
            active: None,
        }
    }

    /// Bind sessions and subscribe if possible.
    ///
    /// Must be called within a tokio runtime.
    pub fn start<I, S>(&mut self, sessions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sessions = collect_sessions(sessions);
        self.restart();
    }

    /// Replace the bound session set. No-op when the set is unchanged.
    pub fn rebind<I, S>(&mut self, sessions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sessions = collect_sessions(sessions);
        if sessions == self.sessions {
            return;
        }
        tracing::debug!(sessions = ?sessions, "Rebinding event listener");
        self.sessions = sessions;
        self.restart();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        self.restart();
    }

    /// Tear down the subscription. Bound sessions are kept.
    pub fn stop(&mut self) {
        if let Some(sub) = self.active.take() {
            tracing::debug!("Event listener stopped");
            sub.cancel();
        }
    }

    /// Whether a subscription task is currently running.
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|sub| !sub.task.is_finished())
    }

    /// Wait until the current subscription is live.
    ///
    /// Returns false when there is no subscription or it failed before
    /// going live. Events sent before this returns true may be missed.
    pub async fn ready(&self) -> bool {
        let Some(mut live) = self.active.as_ref().map(|sub| sub.live.clone()) else {
            return false;
        };
        live.wait_for(|live| *live).await.is_ok()
    }

    /// Resolves once the current subscription task has ended. Resolves at
    /// once when there is no subscription.
    pub async fn closed(&self) {
        let Some(mut live) = self.active.as_ref().map(|sub| sub.live.clone()) else {
            return;
        };
        while live.changed().await.is_ok() {}
    }

    pub fn sessions(&self) -> impl Iterator<Item = &str> {
        self.sessions.iter().map(String::as_str)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn restart(&mut self) {
        self.stop();
        if !self.enabled || self.sessions.is_empty() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (live_tx, live) = watch::channel(false);
        let task = tokio::spawn(run(
            self.feed.clone(),
            self.signals.clone(),
            self.sessions.clone(),
            live_tx,
            shutdown_rx,
        ));
        self.active = Some(Subscription {
            shutdown_tx: Some(shutdown_tx),
            live,
            task,
        });
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn collect_sessions<I, S>(sessions: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    sessions
        .into_iter()
        .map(Into::into)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Teardown wins the `select!`, so the stream is dropped before any error
/// it might raise is seen. Only failures of a live subscription reach
/// `on_feed_error`.
async fn run(
    feed: Arc<dyn EventFeed>,
    signals: Arc<dyn JobSignals>,
    sessions: BTreeSet<String>,
    live: watch::Sender<bool>,
    shutdown_rx: oneshot::Receiver<()>,
) {
    tokio::select! {
        _ = shutdown_rx => {}
        result = pump(feed.as_ref(), signals.as_ref(), &sessions, &live) => {
            match result {
                Ok(()) => tracing::debug!("Event stream ended"),
                Err(e) => {
                    tracing::warn!(error = %e, "Event subscription failed");
                    signals.on_feed_error(&e.to_string());
                }
            }
        }
    }
}

async fn pump(
    feed: &dyn EventFeed,
    signals: &dyn JobSignals,
    sessions: &BTreeSet<String>,
    live: &watch::Sender<bool>,
) -> Result<(), FeedError> {
    let mut stream = feed.subscribe().await?;
    live.send_replace(true);
    while let Some(item) = stream.next().await {
        forward(&item?, signals, sessions);
    }
    Ok(())
}

fn forward(event: &FeedEvent, signals: &dyn JobSignals, sessions: &BTreeSet<String>) {
    let Some(signal) = event.signal() else {
        return;
    };
    // Errors that name no session still concern whatever is running.
    let unattributed_error =
        matches!(signal, Signal::Error { .. }) && signal.session_id().is_empty();
    if !unattributed_error && !sessions.contains(signal.session_id()) {
        return;
    }
    tracing::debug!(signal = %signal, "Feed signal");

    match signal {
        Signal::Idle { session_id } => signals.on_idle(&session_id),
        Signal::Output { session_id, delta } => signals.on_output(&session_id, &delta),
        Signal::Error {
            session_id,
            message,
        } => signals.on_error(&session_id, &message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::EventStream;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    type Item = Result<FeedEvent, FeedError>;

    /// Hands out queued channel-backed streams, then streams that never yield.
    #[derive(Default)]
    struct ChannelFeed {
        queued: Mutex<VecDeque<Result<mpsc::UnboundedReceiver<Item>, FeedError>>>,
        subscribes: AtomicUsize,
    }

    impl ChannelFeed {
        fn push_stream(&self) -> mpsc::UnboundedSender<Item> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.queued.lock().unwrap().push_back(Ok(rx));
            tx
        }

        fn push_failure(&self, err: FeedError) {
            self.queued.lock().unwrap().push_back(Err(err));
        }

        fn subscribes(&self) -> usize {
            self.subscribes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventFeed for ChannelFeed {
        async fn subscribe(&self) -> Result<EventStream, FeedError> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let next = self.queued.lock().unwrap().pop_front();
            match next {
                Some(Ok(rx)) => Ok(futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed()),
                Some(Err(e)) => Err(e),
                None => Ok(futures::stream::pending().boxed()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSignals {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingSignals {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl JobSignals for RecordingSignals {
        fn on_idle(&self, session_id: &str) {
            self.calls.lock().unwrap().push(format!("idle:{}", session_id));
        }
        fn on_output(&self, session_id: &str, delta: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("output:{}:{}", session_id, delta));
        }
        fn on_error(&self, session_id: &str, message: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("error:{}:{}", session_id, message));
        }
        fn on_feed_error(&self, message: &str) {
            self.calls.lock().unwrap().push(format!("feed:{}", message));
        }
    }

    fn idle(session: &str) -> Item {
        Ok(FeedEvent::parse(&format!(
            r#"{{"type":"session.idle","properties":{{"sessionID":"{}"}}}}"#,
            session
        ))
        .unwrap())
    }

    fn delta(session: &str, text: &str) -> Item {
        Ok(FeedEvent::parse(&format!(
            r#"{{"type":"message.part.updated","properties":{{"part":{{"sessionID":"{}"}},"delta":"{}"}}}}"#,
            session, text
        ))
        .unwrap())
    }

    fn session_error(json: &str) -> Item {
        Ok(FeedEvent::parse(json).unwrap())
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn setup() -> (Arc<ChannelFeed>, Arc<RecordingSignals>, EventListener) {
        let feed = Arc::new(ChannelFeed::default());
        let signals = Arc::new(RecordingSignals::default());
        let listener = EventListener::new(feed.clone(), signals.clone());
        (feed, signals, listener)
    }

    #[tokio::test]
    async fn test_no_subscription_without_sessions() {
        let (feed, _signals, mut listener) = setup();
        listener.start(Vec::<String>::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!listener.is_active());
        assert_eq!(feed.subscribes(), 0);
    }

    #[tokio::test]
    async fn test_forwards_only_bound_sessions() {
        let (feed, signals, mut listener) = setup();
        let tx = feed.push_stream();
        listener.start(["s1"]);

        tx.send(delta("s1", "hello")).unwrap();
        tx.send(delta("other", "nope")).unwrap();
        tx.send(idle("other")).unwrap();
        tx.send(idle("s1")).unwrap();

        eventually(|| signals.calls().len() == 2).await;
        assert_eq!(signals.calls(), vec!["output:s1:hello", "idle:s1"]);
    }

    #[tokio::test]
    async fn test_rebind_same_set_keeps_subscription() {
        let (feed, _signals, mut listener) = setup();
        let _tx = feed.push_stream();
        listener.start(["s1", "s2"]);
        eventually(|| feed.subscribes() == 1).await;

        listener.rebind(["s2", "s1"]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(feed.subscribes(), 1);
    }

    #[tokio::test]
    async fn test_rebind_new_set_resubscribes_and_cancels_old() {
        let (feed, signals, mut listener) = setup();
        let first = feed.push_stream();
        let second = feed.push_stream();
        listener.start(["s1"]);
        eventually(|| feed.subscribes() == 1).await;

        listener.rebind(["s2"]);
        eventually(|| feed.subscribes() == 2).await;
        eventually(|| first.is_closed()).await;

        second.send(idle("s1")).unwrap();
        second.send(idle("s2")).unwrap();
        eventually(|| !signals.calls().is_empty()).await;
        assert_eq!(signals.calls(), vec!["idle:s2"]);
    }

    #[tokio::test]
    async fn test_disable_tears_down_and_enable_resubscribes() {
        let (feed, _signals, mut listener) = setup();
        let tx = feed.push_stream();
        listener.start(["s1"]);
        eventually(|| feed.subscribes() == 1).await;

        listener.set_enabled(false);
        assert!(!listener.is_active());
        eventually(|| tx.is_closed()).await;

        listener.set_enabled(true);
        eventually(|| feed.subscribes() == 2).await;
        assert!(listener.is_active());
    }

    #[tokio::test]
    async fn test_drop_cancels_subscription() {
        let (feed, _signals, mut listener) = setup();
        let tx = feed.push_stream();
        listener.start(["s1"]);
        eventually(|| feed.subscribes() == 1).await;

        drop(listener);
        eventually(|| tx.is_closed()).await;
    }

    #[tokio::test]
    async fn test_stream_failure_reported_without_session() {
        let (feed, signals, mut listener) = setup();
        let tx = feed.push_stream();
        listener.start(["s1"]);

        tx.send(Err(FeedError::Closed)).unwrap();
        eventually(|| !signals.calls().is_empty()).await;
        assert_eq!(
            signals.calls(),
            vec!["feed:Event stream closed by server".to_string()]
        );
    }

    #[tokio::test]
    async fn test_subscribe_failure_reported() {
        let (feed, signals, mut listener) = setup();
        feed.push_failure(FeedError::Status {
            url: "http://x/event".to_string(),
            status: 503,
        });
        listener.start(["s1"]);

        eventually(|| !signals.calls().is_empty()).await;
        assert!(signals.calls()[0].starts_with("feed:"));
        assert!(signals.calls()[0].contains("503"));
    }

    #[tokio::test]
    async fn test_teardown_reports_nothing() {
        let (feed, signals, mut listener) = setup();
        let tx = feed.push_stream();
        listener.start(["s1"]);
        assert!(listener.ready().await);

        listener.stop();
        eventually(|| tx.is_closed()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(signals.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ready_after_subscribe() {
        let (feed, _signals, mut listener) = setup();
        assert!(!listener.ready().await);

        let _tx = feed.push_stream();
        listener.start(["s1"]);
        assert!(listener.ready().await);
        assert_eq!(feed.subscribes(), 1);
    }

    #[tokio::test]
    async fn test_ready_false_when_subscribe_fails() {
        let (feed, signals, mut listener) = setup();
        feed.push_failure(FeedError::Status {
            url: "http://x/event".to_string(),
            status: 502,
        });
        listener.start(["s1"]);

        assert!(!listener.ready().await);
        eventually(|| !signals.calls().is_empty()).await;
    }

    #[tokio::test]
    async fn test_forwards_session_errors() {
        let (feed, signals, mut listener) = setup();
        let tx = feed.push_stream();
        listener.start(["s1"]);

        tx.send(session_error(
            r#"{"type":"session.error","properties":{"sessionID":"other","error":{"name":"E","message":"not ours"}}}"#,
        ))
        .unwrap();
        tx.send(session_error(
            r#"{"type":"session.error","properties":{"sessionID":"s1","error":{"name":"E","message":"quota exceeded"}}}"#,
        ))
        .unwrap();
        tx.send(session_error(
            r#"{"type":"session.error","properties":{"error":{"name":"ProviderAuthError","data":{"message":"Invalid API key"}}}}"#,
        ))
        .unwrap();

        eventually(|| signals.calls().len() == 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            signals.calls(),
            vec!["error:s1:quota exceeded", "error::Invalid API key"]
        );
    }
}
