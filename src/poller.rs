//! Waiting-room poller.
//!
//! Before both sides have committed their prompt there is nothing to stream,
//! so [`WaitingRoomPoller`] fetches the lightweight prompt status on a fixed
//! interval until both are present. Fetch failures are logged and retried
//! on the next tick; the poll never aborts on its own except by finishing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::SessionApi;
use crate::model::PromptStatus;
use crate::protocol::SessionId;

/// Default delay between status fetches.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// How long `cancel` waits for the loop before aborting it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default capacity of the waiting-room event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 16;

/// Configuration for a [`WaitingRoomPoller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub session_id: SessionId,
    /// Delay between fetches. The first fetch is immediate.
    ///
    /// Defaults to **2 seconds**. Values below 1 ms are clamped to 1 ms.
    pub interval: Duration,
    /// Defaults to **16**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
}

impl PollerConfig {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            interval: DEFAULT_POLL_INTERVAL,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }
}

/// Progress of the waiting room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitingRoomEvent {
    /// The observed status differs from the previous observation.
    StatusChanged(PromptStatus),
    /// Both prompts are in. Emitted once; polling has stopped.
    BothSubmitted,
}

/// Handle to a running waiting-room poll.
pub struct WaitingRoomPoller {
    session_id: SessionId,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    finished: Arc<AtomicBool>,
    requests: Arc<AtomicU64>,
}

impl WaitingRoomPoller {
    /// Start polling `config.session_id`.
    ///
    /// The event receiver closes once polling has stopped, either because
    /// both prompts were observed or because the poller was cancelled.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        api: Arc<dyn SessionApi>,
        config: PollerConfig,
    ) -> (Self, mpsc::Receiver<WaitingRoomEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let requests = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(poll_loop(
            config.session_id.clone(),
            api,
            config.interval.max(Duration::from_millis(1)),
            event_tx,
            Arc::clone(&finished),
            Arc::clone(&requests),
            shutdown_rx,
        ));

        let poller = Self {
            session_id: config.session_id,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            finished,
            requests,
        };
        (poller, event_rx)
    }

    /// Stop polling. Idempotent, and safe after polling already finished.
    pub async fn cancel(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // A consumer that stopped reading can leave the loop parked on a full
        // channel; abort it if it does not exit in time.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    debug!("poll loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("poll loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("poll loop aborted: {join_err}");
                    }
                }
            }
        }
        self.finished.store(true, Ordering::Release);
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the poll has stopped, for any reason.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Number of status fetches issued so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for WaitingRoomPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitingRoomPoller")
            .field("session_id", &self.session_id)
            .field("finished", &self.is_finished())
            .field("requests", &self.requests())
            .finish()
    }
}

impl Drop for WaitingRoomPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_loop(
    session_id: SessionId,
    api: Arc<dyn SessionApi>,
    period: Duration,
    event_tx: mpsc::Sender<WaitingRoomEvent>,
    finished: Arc<AtomicBool>,
    requests: Arc<AtomicU64>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(session = %session_id, ?period, "waiting-room poll started");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<PromptStatus> = None;

    loop {
        let fetched = tokio::select! {
            _ = &mut shutdown_rx => {
                debug!(session = %session_id, "waiting-room poll cancelled");
                break;
            }
            () = event_tx.closed() => {
                debug!(session = %session_id, "event receiver dropped; stopping poll");
                break;
            }
            fetched = async {
                ticker.tick().await;
                requests.fetch_add(1, Ordering::Relaxed);
                api.fetch_status(&session_id).await
            } => fetched,
        };

        let status = match fetched {
            Ok(status) => status,
            Err(e) => {
                warn!(session = %session_id, "status fetch failed, retrying next tick: {e}");
                continue;
            }
        };

        if last != Some(status) {
            last = Some(status);
            if event_tx
                .send(WaitingRoomEvent::StatusChanged(status))
                .await
                .is_err()
            {
                debug!(session = %session_id, "event receiver dropped; stopping poll");
                break;
            }
        }

        if status.both_submitted() {
            info!(session = %session_id, "both prompts submitted");
            if event_tx.send(WaitingRoomEvent::BothSubmitted).await.is_err() {
                debug!(session = %session_id, "event receiver dropped before completion");
            }
            break;
        }
    }

    finished.store(true, Ordering::Release);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::{ClientError, Result};
    use crate::model::GameState;
    use crate::protocol::{Color, SubmitPromptResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Replays scripted statuses; repeats the last one once exhausted.
    struct ScriptedApi {
        script: Mutex<VecDeque<Result<PromptStatus>>>,
        fallback: PromptStatus,
        calls: AtomicUsize,
    }

    impl ScriptedApi {
        fn new(script: Vec<Result<PromptStatus>>, fallback: PromptStatus) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::from(script)),
                fallback,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionApi for ScriptedApi {
        async fn fetch_snapshot(&self, _session_id: &str) -> Result<GameState> {
            unimplemented!()
        }

        async fn fetch_status(&self, session_id: &str) -> Result<PromptStatus> {
            assert_eq!(session_id, "ROOM01");
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or(Ok(self.fallback))
        }

        async fn create_session(&self) -> Result<SessionId> {
            unimplemented!()
        }

        async fn submit_prompt(
            &self,
            _session_id: &str,
            _color: Color,
            _prompt: &str,
        ) -> Result<SubmitPromptResponse> {
            unimplemented!()
        }
    }

    const NONE: PromptStatus = PromptStatus {
        white_submitted: false,
        black_submitted: false,
    };
    const WHITE: PromptStatus = PromptStatus {
        white_submitted: true,
        black_submitted: false,
    };
    const BOTH: PromptStatus = PromptStatus {
        white_submitted: true,
        black_submitted: true,
    };

    #[tokio::test(start_paused = true)]
    async fn polls_until_both_submitted_then_stops() {
        let api = ScriptedApi::new(
            vec![Ok(NONE), Ok(NONE), Ok(WHITE), Ok(BOTH)],
            BOTH,
        );
        let (poller, mut events) =
            WaitingRoomPoller::start(api.clone(), PollerConfig::new("ROOM01"));

        assert_eq!(
            events.recv().await,
            Some(WaitingRoomEvent::StatusChanged(NONE))
        );
        assert_eq!(
            events.recv().await,
            Some(WaitingRoomEvent::StatusChanged(WHITE))
        );
        assert_eq!(
            events.recv().await,
            Some(WaitingRoomEvent::StatusChanged(BOTH))
        );
        assert_eq!(events.recv().await, Some(WaitingRoomEvent::BothSubmitted));
        assert_eq!(events.recv().await, None);

        assert_eq!(api.calls(), 4);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.calls(), 4);
        assert!(poller.is_finished());
        assert_eq!(poller.requests(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn one_request_per_interval_while_waiting() {
        let api = ScriptedApi::new(vec![], NONE);
        let (mut poller, _events) =
            WaitingRoomPoller::start(api.clone(), PollerConfig::new("ROOM01"));

        // Ticks at 0, 2, 4 and 6 seconds.
        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(api.calls(), 4);
        assert!(!poller.is_finished());

        poller.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_retries_on_next_tick() {
        let api = ScriptedApi::new(
            vec![
                Err(ClientError::Transport("connection refused".into())),
                Err(ClientError::HttpStatus {
                    status: 502,
                    url: "mock".into(),
                }),
            ],
            BOTH,
        );
        let (_poller, mut events) = WaitingRoomPoller::start(
            api.clone(),
            PollerConfig::new("ROOM01").with_interval(Duration::from_millis(500)),
        );

        assert_eq!(
            events.recv().await,
            Some(WaitingRoomEvent::StatusChanged(BOTH))
        );
        assert_eq!(events.recv().await, Some(WaitingRoomEvent::BothSubmitted));
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling_and_is_idempotent() {
        let api = ScriptedApi::new(vec![], NONE);
        let (mut poller, mut events) =
            WaitingRoomPoller::start(api.clone(), PollerConfig::new("ROOM01"));

        assert_eq!(
            events.recv().await,
            Some(WaitingRoomEvent::StatusChanged(NONE))
        );
        poller.cancel().await;
        poller.cancel().await;
        let calls = api.calls();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(api.calls(), calls);
        assert!(poller.is_finished());
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_status_is_not_re_emitted() {
        let api = ScriptedApi::new(vec![Ok(WHITE), Ok(WHITE), Ok(WHITE)], BOTH);
        let (_poller, mut events) =
            WaitingRoomPoller::start(api.clone(), PollerConfig::new("ROOM01"));

        assert_eq!(
            events.recv().await,
            Some(WaitingRoomEvent::StatusChanged(WHITE))
        );
        assert_eq!(
            events.recv().await,
            Some(WaitingRoomEvent::StatusChanged(BOTH))
        );
        assert_eq!(api.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_receiver_stops_polling() {
        let api = ScriptedApi::new(vec![], NONE);
        let (poller, mut events) =
            WaitingRoomPoller::start(api.clone(), PollerConfig::new("ROOM01"));

        assert_eq!(
            events.recv().await,
            Some(WaitingRoomEvent::StatusChanged(NONE))
        );
        drop(events);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(api.calls(), 1);
        assert!(poller.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_receiver_stops_polling_before_first_event() {
        let api = ScriptedApi::new(vec![], NONE);
        let (poller, events) = WaitingRoomPoller::start(api.clone(), PollerConfig::new("ROOM01"));
        drop(events);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(api.calls() <= 1);
        assert!(poller.is_finished());
    }

    /// Never answers, so the loop can only end by being aborted.
    struct HangingApi;

    #[async_trait]
    impl SessionApi for HangingApi {
        async fn fetch_snapshot(&self, _session_id: &str) -> Result<GameState> {
            unimplemented!()
        }

        async fn fetch_status(&self, _session_id: &str) -> Result<PromptStatus> {
            std::future::pending().await
        }

        async fn create_session(&self) -> Result<SessionId> {
            unimplemented!()
        }

        async fn submit_prompt(
            &self,
            _session_id: &str,
            _color: Color,
            _prompt: &str,
        ) -> Result<SubmitPromptResponse> {
            unimplemented!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_waits_for_loop_to_end() {
        // Capacity 1 and a consumer that never reads: the loop parks on a
        // full channel and ignores the shutdown signal until aborted.
        let api = ScriptedApi::new(vec![Ok(NONE), Ok(WHITE), Ok(NONE)], WHITE);
        let (mut poller, events) = WaitingRoomPoller::start(
            api.clone(),
            PollerConfig::new("ROOM01")
                .with_interval(Duration::from_millis(10))
                .with_event_channel_capacity(1),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        poller.cancel().await;
        assert!(poller.is_finished());
        let calls = api.calls();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.calls(), calls);
        drop(events);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pending_fetch() {
        let (mut poller, _events) =
            WaitingRoomPoller::start(Arc::new(HangingApi), PollerConfig::new("ROOM01"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        poller.cancel().await;
        assert!(poller.is_finished());
        assert_eq!(poller.requests(), 1);
    }

    #[test]
    fn config_defaults_and_clamping() {
        let config = PollerConfig::new("ROOM01");
        assert_eq!(config.interval, Duration::from_millis(2000));
        assert_eq!(config.event_channel_capacity, 16);

        let config = PollerConfig::new("ROOM01")
            .with_interval(Duration::ZERO)
            .with_event_channel_capacity(0);
        assert_eq!(config.interval, Duration::from_millis(1));
        assert_eq!(config.event_channel_capacity, 1);
    }
}
