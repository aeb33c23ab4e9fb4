mod api;
mod state;

use std::sync::Arc;

use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::LoginConfig;

pub use api::{HttpPairingApi, PairingApi, PairingError, QrPayload};
pub use state::LoginState;

/// Transitions surfaced to the dialog that owns the attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginEvent {
    StateChanged(LoginState),
    /// A fresh pairing code to render.
    QrUpdated(String),
    /// The handshake finished; emitted exactly once per attempt.
    Completed,
    /// The absolute time budget elapsed; a manual restart is required.
    TimedOut,
}

/// Drives at most one bounded-time polling handshake at a time.
///
/// Dropping the controller (the owning dialog closed) aborts the active
/// poll loop: teardown is a mandatory release path, not best-effort
/// cleanup.
pub struct LoginController {
    api: Arc<dyn PairingApi>,
    config: LoginConfig,
    events: mpsc::UnboundedSender<LoginEvent>,
    poll_task: Option<JoinHandle<()>>,
}

impl LoginController {
    pub fn new(
        api: Arc<dyn PairingApi>,
        config: LoginConfig,
        events: mpsc::UnboundedSender<LoginEvent>,
    ) -> Self {
        Self {
            api,
            config,
            events,
            poll_task: None,
        }
    }

    /// Begin (or restart) a login attempt. An active poll loop is always
    /// cancelled first, so there is never more than one.
    pub fn start(&mut self) {
        self.cancel();
        let actor = PollLoop {
            api: Arc::clone(&self.api),
            poll_interval: self.config.poll_every(),
            budget: self.config.budget(),
            events: self.events.clone(),
            state: LoginState::Uninitialized,
            last_qr: None,
        };
        self.poll_task = Some(tokio::spawn(run_poll_loop(actor)));
    }

    /// Stop polling without reaching a terminal state.
    pub fn cancel(&mut self) {
        if let Some(task) = self.poll_task.take() {
            debug!("cancelling active login poll loop");
            task.abort();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for LoginController {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct PollLoop {
    api: Arc<dyn PairingApi>,
    poll_interval: Duration,
    budget: Duration,
    events: mpsc::UnboundedSender<LoginEvent>,
    state: LoginState,
    last_qr: Option<String>,
}

impl PollLoop {
    fn emit(&self, event: LoginEvent) {
        let _ = self.events.send(event);
    }

    fn transition(&mut self, next: LoginState) {
        if self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, "login state changed");
        self.state = next;
        self.emit(LoginEvent::StateChanged(next));
    }

    /// Apply one poll result. Steps through intermediate states so the
    /// observable sequence never jumps straight to `Online`. Returns `true`
    /// once the attempt is finished.
    fn apply(&mut self, payload: QrPayload) -> bool {
        if let Some(qr) = payload.qr {
            if self.last_qr.as_deref() != Some(qr.as_str()) {
                self.emit(LoginEvent::QrUpdated(qr.clone()));
                self.last_qr = Some(qr);
            }
        }

        match payload.state {
            LoginState::Connecting => {
                if self.state == LoginState::NeedQr {
                    self.transition(LoginState::Connecting);
                }
                false
            }
            LoginState::Online => {
                if self.state == LoginState::NeedQr {
                    self.transition(LoginState::Connecting);
                }
                self.transition(LoginState::Online);
                self.emit(LoginEvent::Completed);
                true
            }
            // The backend gave up on the attempt.
            LoginState::Offline => {
                warn!(status = %payload.status, "backend reported the attempt offline");
                self.transition(LoginState::Offline);
                true
            }
            LoginState::NeedQr | LoginState::Uninitialized => false,
        }
    }
}

async fn run_poll_loop(mut actor: PollLoop) {
    actor.transition(LoginState::NeedQr);
    if let Err(err) = actor.api.begin_login().await {
        // The status poll below is the retry mechanism.
        warn!(%err, "begin-login request failed");
    }

    let deadline = sleep(actor.budget);
    tokio::pin!(deadline);
    let mut poll_tick = interval(actor.poll_interval);
    poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            // Checked first: once the budget is gone, no further poll is
            // issued even if a tick is already due.
            biased;

            () = &mut deadline => {
                warn!("login attempt timed out");
                actor.transition(LoginState::Offline);
                actor.emit(LoginEvent::TimedOut);
                break;
            }
            _ = poll_tick.tick() => {
                match actor.api.poll_status().await {
                    Ok(payload) => {
                        if actor.apply(payload) {
                            break;
                        }
                    }
                    // Swallowed: the next tick is the retry.
                    Err(err) => debug!(%err, "status poll failed"),
                }
            }
        }
    }

    debug!("login poll loop is shutting down");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::time::{self, Duration};

    use crate::config::LoginConfig;
    use crate::login::{
        LoginController, LoginEvent, LoginState, PairingApi, PairingError, QrPayload,
    };

    struct FakePairingApi {
        responses: Mutex<VecDeque<Result<QrPayload, PairingError>>>,
        fallback: QrPayload,
        polls: AtomicU32,
        begins: AtomicU32,
    }

    impl FakePairingApi {
        fn scripted(responses: Vec<Result<QrPayload, PairingError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                fallback: payload(LoginState::NeedQr, None),
                polls: AtomicU32::new(0),
                begins: AtomicU32::new(0),
            })
        }

        fn stuck() -> Arc<Self> {
            Self::scripted(vec![])
        }

        fn polls(&self) -> u32 {
            self.polls.load(Ordering::SeqCst)
        }

        fn begins(&self) -> u32 {
            self.begins.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PairingApi for FakePairingApi {
        async fn begin_login(&self) -> Result<(), PairingError> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn poll_status(&self) -> Result<QrPayload, PairingError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            responses.pop_front().unwrap_or(Ok(self.fallback.clone()))
        }
    }

    fn payload(state: LoginState, qr: Option<&str>) -> QrPayload {
        QrPayload {
            qr: qr.map(str::to_string),
            state,
            status: "scripted".to_string(),
        }
    }

    fn controller(
        api: &Arc<FakePairingApi>,
    ) -> (LoginController, mpsc::UnboundedReceiver<LoginEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let config = LoginConfig {
            poll_interval: 2,
            timeout: 600,
        };
        let controller =
            LoginController::new(Arc::clone(api) as Arc<dyn PairingApi>, config, events_tx);
        (controller, events_rx)
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<LoginEvent>) -> Vec<LoginEvent> {
        let mut drained = vec![];
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_walks_every_state() {
        let api = FakePairingApi::scripted(vec![
            Ok(payload(LoginState::NeedQr, None)),
            Ok(payload(LoginState::NeedQr, Some("qr-token-1"))),
            Ok(payload(LoginState::Connecting, None)),
            Ok(payload(LoginState::Online, None)),
        ]);
        let (mut controller, mut events) = controller(&api);

        controller.start();
        time::sleep(Duration::from_secs(7)).await;

        assert_eq!(
            drain(&mut events),
            vec![
                LoginEvent::StateChanged(LoginState::NeedQr),
                LoginEvent::QrUpdated("qr-token-1".to_string()),
                LoginEvent::StateChanged(LoginState::Connecting),
                LoginEvent::StateChanged(LoginState::Online),
                LoginEvent::Completed,
            ]
        );
        assert_eq!(api.begins(), 1);
        assert!(!controller.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_never_skips_connecting() {
        let api = FakePairingApi::scripted(vec![Ok(payload(LoginState::Online, None))]);
        let (mut controller, mut events) = controller(&api);

        controller.start();
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            drain(&mut events),
            vec![
                LoginEvent::StateChanged(LoginState::NeedQr),
                LoginEvent::StateChanged(LoginState::Connecting),
                LoginEvent::StateChanged(LoginState::Online),
                LoginEvent::Completed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_qr_is_surfaced_once() {
        let api = FakePairingApi::scripted(vec![
            Ok(payload(LoginState::NeedQr, Some("qr-token-1"))),
            Ok(payload(LoginState::NeedQr, Some("qr-token-1"))),
            Ok(payload(LoginState::NeedQr, Some("qr-token-2"))),
        ]);
        let (mut controller, mut events) = controller(&api);

        controller.start();
        time::sleep(Duration::from_secs(5)).await;

        let qr_updates: Vec<_> = drain(&mut events)
            .into_iter()
            .filter(|event| matches!(event, LoginEvent::QrUpdated(_)))
            .collect();
        assert_eq!(
            qr_updates,
            vec![
                LoginEvent::QrUpdated("qr-token-1".to_string()),
                LoginEvent::QrUpdated("qr-token-2".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_failures_are_retried_by_the_next_tick() {
        let api = FakePairingApi::scripted(vec![
            Err(PairingError::Request("connection refused".to_string())),
            Err(PairingError::Http {
                status: 502,
                body: "bad gateway".to_string(),
            }),
            Ok(payload(LoginState::Online, None)),
        ]);
        let (mut controller, mut events) = controller(&api);

        controller.start();
        time::sleep(Duration::from_secs(5)).await;

        let events = drain(&mut events);
        assert!(events.contains(&LoginEvent::Completed));
        assert!(!events.contains(&LoginEvent::TimedOut));
        assert_eq!(api.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_cancels_the_first_loop() {
        let api = FakePairingApi::stuck();
        let (mut controller, _events) = controller(&api);

        controller.start();
        controller.start();
        time::sleep(Duration::from_secs(9)).await;

        // One loop polling at t = 0, 2, 4, 6, 8 — not two loops' worth.
        assert_eq!(api.polls(), 5);
        assert!(controller.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_forces_offline_and_halts_polling() {
        let api = FakePairingApi::stuck();
        let (mut controller, mut events) = controller(&api);

        controller.start();
        time::sleep(Duration::from_secs(601)).await;

        let drained = drain(&mut events);
        assert!(drained.contains(&LoginEvent::StateChanged(LoginState::Offline)));
        assert!(drained.contains(&LoginEvent::TimedOut));
        assert!(!controller.is_polling());

        let polls_at_timeout = api.polls();
        time::sleep(Duration::from_secs(100)).await;
        assert_eq!(api.polls(), polls_at_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_the_poll_loop() {
        let api = FakePairingApi::stuck();
        let (mut controller, _events) = controller(&api);

        controller.start();
        time::sleep(Duration::from_secs(4)).await;
        let polls_before = api.polls();
        assert!(polls_before > 0);

        controller.cancel();
        time::sleep(Duration::from_secs(60)).await;

        assert_eq!(api.polls(), polls_before);
        assert!(!controller.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_the_controller_aborts_polling() {
        let api = FakePairingApi::stuck();
        let (mut controller, _events) = controller(&api);

        controller.start();
        time::sleep(Duration::from_secs(4)).await;
        let polls_before = api.polls();

        drop(controller);
        time::sleep(Duration::from_secs(60)).await;

        assert_eq!(api.polls(), polls_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_offline_is_terminal_for_the_attempt() {
        let api = FakePairingApi::scripted(vec![Ok(payload(LoginState::Offline, None))]);
        let (mut controller, mut events) = controller(&api);

        controller.start();
        time::sleep(Duration::from_secs(5)).await;

        let drained = drain(&mut events);
        assert!(drained.contains(&LoginEvent::StateChanged(LoginState::Offline)));
        assert_eq!(api.polls(), 1);
    }
}
