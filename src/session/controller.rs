use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::analysis::{poll_once, AttentivenessSource};
use crate::config::SessionConfig;
use crate::error::Result;

use super::capture::{CaptureSource, CaptureStream};
use super::history::EngagementHistory;
use super::settings::{SettingsPatch, SettingsView};
use super::simulator::TelemetrySource;
use super::state::{Action, SessionState};
use super::student::generate_roster;
use super::view::SessionView;

/// State and collaborators shared with the background tasks
struct Shared {
    state: RwLock<SessionState>,
    revision: watch::Sender<u64>,
    telemetry: Arc<dyn TelemetrySource>,
    analysis: Arc<dyn AttentivenessSource>,
}

impl Shared {
    async fn apply(&self, action: Action) -> Result<()> {
        let name = action.name();
        let result = self.state.write().await.apply(action);
        if let Err(e) = &result {
            tracing::debug!(action = name, error = %e, "Action rejected");
        }
        self.publish();
        result
    }

    fn publish(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    async fn tick(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let deltas = state
            .students()
            .iter()
            .map(|s| (s.id, self.telemetry.sample(s)))
            .collect();
        let result = state.apply(Action::Tick(deltas));
        drop(state);
        self.publish();
        result
    }

    async fn complete_analysis(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let boosts = state
            .students()
            .iter()
            .map(|s| (s.id, self.telemetry.analysis_boost(s)))
            .collect();
        let result = state.apply(Action::AnalysisCompleted(boosts));
        drop(state);
        self.publish();
        result
    }
}

/// Tasks and resources that live for one connection.
///
/// Shutting it down signals every task, aborts any that are mid-request,
/// and releases the capture stream.
#[derive(Default)]
struct Lifecycle {
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
    stream: Option<Arc<dyn CaptureStream>>,
    /// Simulator and poller are spawned
    running: bool,
}

impl Lifecycle {
    fn token(&mut self) -> watch::Receiver<bool> {
        self.shutdown
            .get_or_insert_with(|| watch::channel(false).0)
            .subscribe()
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|handle| !handle.is_finished());
        self.tasks.push(tokio::spawn(task));
    }

    fn shutdown(&mut self) {
        self.running = false;
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        for handle in self.tasks.drain(..) {
            handle.abort();
        }
        if let Some(stream) = self.stream.take() {
            stream.release();
        }
    }
}

/// Owns a monitoring session: its state, its timers and its capture stream
pub struct SessionController {
    shared: Arc<Shared>,
    capture: Arc<dyn CaptureSource>,
    config: SessionConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        telemetry: Arc<dyn TelemetrySource>,
        analysis: Arc<dyn AttentivenessSource>,
        capture: Arc<dyn CaptureSource>,
    ) -> Self {
        let (roster, history) = {
            let mut rng = rand::thread_rng();
            (
                generate_roster(config.cohort_size, &mut rng),
                EngagementHistory::seeded(&mut rng),
            )
        };
        let (revision, _) = watch::channel(0);

        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(SessionState::new(roster, history)),
                revision,
                telemetry,
                analysis,
            }),
            capture,
            config,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Receiver that changes whenever the session state does
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    pub async fn snapshot(&self, search: &str) -> SessionView {
        SessionView::build(&*self.shared.state.read().await, search)
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.state.read().await.connected()
    }

    pub async fn settings(&self) -> SettingsView {
        self.shared.state.read().await.settings().view()
    }

    /// Connects the session, acquires the capture and starts the timers.
    /// Connecting an already connected session does nothing.
    ///
    /// Nothing is awaited once the state lock is held, so a dropped call
    /// either changes nothing or completes the whole transition.
    pub async fn connect(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let mut state = self.shared.state.write().await;
        if state.connected() && lifecycle.running {
            return Ok(());
        }
        lifecycle.shutdown();

        let result = self.start(&mut lifecycle, &mut state);
        drop(state);
        self.shared.publish();
        result?;

        tracing::info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "Session connected"
        );
        Ok(())
    }

    fn start(&self, lifecycle: &mut Lifecycle, state: &mut SessionState) -> Result<()> {
        state.apply(Action::Connect)?;

        match self.capture.acquire() {
            Ok(stream) => lifecycle.stream = Some(stream),
            Err(e) => {
                tracing::warn!(error = %e, "Screen capture unavailable");
                state.apply(Action::CaptureDenied)?;
            }
        }

        let shutdown = lifecycle.token();
        let stream = lifecycle.stream.clone();
        lifecycle.spawn(run_simulator(self.shared.clone(), self.config.clone(), shutdown.clone()));
        lifecycle.spawn(run_poller(self.shared.clone(), self.config.clone(), stream, shutdown));
        lifecycle.running = true;
        Ok(())
    }

    /// Stops every task, releases the capture and regenerates the roster.
    /// Tasks are stopped while the state lock is held, so none of them can
    /// apply an action after the reset.
    pub async fn disconnect(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let roster = {
            let mut rng = rand::thread_rng();
            generate_roster(self.config.cohort_size, &mut rng)
        };

        let mut state = self.shared.state.write().await;
        lifecycle.shutdown();
        let result = state.apply(Action::Disconnect { roster });
        drop(state);
        self.shared.publish();
        result?;

        tracing::info!(cohort_size = self.config.cohort_size, "Session disconnected");
        Ok(())
    }

    pub async fn toggle_selection(&self, student_id: u32) -> Result<()> {
        self.shared.apply(Action::ToggleSelection(student_id)).await
    }

    pub async fn create_peer_node(&self, name: &str) -> Result<()> {
        self.shared
            .apply(Action::CreatePeerNode { name: name.to_string() })
            .await
    }

    pub async fn send_coach_message(&self, message: &str) -> Result<()> {
        self.shared
            .apply(Action::SendCoachMessage(message.to_string()))
            .await
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<SettingsView> {
        self.shared.apply(Action::UpdateSettings(patch)).await?;
        Ok(self.settings().await)
    }

    /// Announces the analysis now and applies its results after the
    /// configured delay, unless the session changes connection first
    pub async fn run_analysis(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.shared.apply(Action::AnalysisStarted).await?;

        let shared = self.shared.clone();
        let delay = self.config.analysis_delay;
        let mut shutdown = lifecycle.token();
        lifecycle.spawn(async move {
            tokio::select! {
                _ = sleep(delay) => {
                    if let Err(e) = shared.complete_analysis().await {
                        tracing::error!(error = %e, "Failed to apply analysis results");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::debug!("Analysis cancelled");
                }
            }
        });
        Ok(())
    }

    #[cfg(test)]
    async fn apply(&self, action: Action) -> Result<()> {
        self.shared.apply(action).await
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.lifecycle.get_mut().shutdown();
    }
}

async fn run_simulator(shared: Arc<Shared>, config: SessionConfig, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; the first nudge waits one period
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = shared.tick().await {
                    tracing::error!(error = %e, "Simulator tick failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Simulator stopped");
}

async fn run_poller(
    shared: Arc<Shared>,
    config: SessionConfig,
    stream: Option<Arc<dyn CaptureStream>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let frame = stream
            .as_ref()
            .and_then(|s| s.snapshot())
            .unwrap_or_default();

        tokio::select! {
            reading = poll_once(shared.analysis.as_ref(), &frame) => {
                if let Err(e) = shared.apply(Action::RecordAttentiveness(reading)).await {
                    tracing::error!(error = %e, "Failed to record attentiveness");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Attentiveness poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Attentiveness;
    use crate::error::HiveError;
    use crate::session::capture::PushedFrameCapture;
    use crate::session::notification::Severity;
    use crate::session::simulator::{RandomTelemetry, TelemetryDelta};
    use crate::session::student::Student;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Records every frame it sees and answers with a fixed score
    #[derive(Default)]
    struct RecordingSource {
        frames: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl AttentivenessSource for RecordingSource {
        async fn measure(&self, frame: &str) -> Result<f64> {
            self.frames.lock().unwrap().push(frame.to_string());
            Ok(81.5)
        }
    }

    /// Never answers, counting how many requests were started
    #[derive(Default)]
    struct HangingSource {
        started: AtomicUsize,
    }

    #[async_trait]
    impl AttentivenessSource for HangingSource {
        async fn measure(&self, _frame: &str) -> Result<f64> {
            self.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Err(HiveError::internal("unreachable"))
        }
    }

    /// Pushes confusion up by a fixed amount every tick
    struct RisingConfusion(i32);

    impl TelemetrySource for RisingConfusion {
        fn sample(&self, _student: &Student) -> TelemetryDelta {
            TelemetryDelta {
                confusion: self.0,
                ..Default::default()
            }
        }

        fn analysis_boost(&self, _student: &Student) -> i32 {
            15
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            cohort_size: 6,
            tick_interval: Duration::from_millis(20),
            poll_interval: Duration::from_millis(30),
            analysis_delay: Duration::from_millis(40),
            capture_enabled: true,
        }
    }

    fn controller_with(
        telemetry: Arc<dyn TelemetrySource>,
        analysis: Arc<dyn AttentivenessSource>,
        capture: Arc<dyn CaptureSource>,
    ) -> SessionController {
        SessionController::new(fast_config(), telemetry, analysis, capture)
    }

    #[tokio::test]
    async fn test_simulator_keeps_scores_in_range() {
        let controller = controller_with(
            Arc::new(RandomTelemetry),
            Arc::new(RecordingSource::default()),
            Arc::new(PushedFrameCapture::new(true)),
        );
        controller.connect().await.unwrap();
        sleep(Duration::from_millis(200)).await;

        let view = controller.snapshot("").await;
        assert!(view.connected);
        for card in &view.students {
            assert!(card.student.attention <= 100);
            assert!(card.student.confusion <= 100);
        }
        assert!(view.history.last().unwrap().time >= 30);
    }

    #[tokio::test]
    async fn test_poller_sends_captured_frames() {
        let capture = PushedFrameCapture::new(true);
        let source = Arc::new(RecordingSource::default());
        let controller = controller_with(
            Arc::new(RandomTelemetry),
            source.clone(),
            Arc::new(capture.clone()),
        );

        controller.connect().await.unwrap();
        assert!(capture.push_frame("data:image/jpeg;base64,QUJD".to_string()));
        sleep(Duration::from_millis(120)).await;

        let frames = source.frames.lock().unwrap().clone();
        assert!(frames.len() >= 2);
        assert!(frames.iter().any(|f| f == "data:image/jpeg;base64,QUJD"));
        assert_eq!(
            controller.snapshot("").await.attentiveness,
            Attentiveness::Value(81.5)
        );
    }

    #[tokio::test]
    async fn test_denied_capture_notifies_and_still_polls() {
        let source = Arc::new(RecordingSource::default());
        let controller = controller_with(
            Arc::new(RandomTelemetry),
            source.clone(),
            Arc::new(PushedFrameCapture::new(false)),
        );

        controller.connect().await.unwrap();
        sleep(Duration::from_millis(60)).await;

        let view = controller.snapshot("").await;
        assert!(view.connected);
        assert!(view
            .notifications
            .iter()
            .any(|n| n.severity == Severity::Error
                && n.message == "Screen recording permission denied or cancelled"));
        let frames = source.frames.lock().unwrap().clone();
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| f.is_empty()));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_in_flight_poll() {
        let source = Arc::new(HangingSource::default());
        let controller = controller_with(
            Arc::new(RandomTelemetry),
            source.clone(),
            Arc::new(PushedFrameCapture::new(true)),
        );

        controller.connect().await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(source.started.load(Ordering::SeqCst), 1);

        controller.disconnect().await.unwrap();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(source.started.load(Ordering::SeqCst), 1);
        let view = controller.snapshot("").await;
        assert!(!view.connected);
        assert_eq!(view.attentiveness, Attentiveness::Unknown);
    }

    #[tokio::test]
    async fn test_disconnect_resets_roster() {
        let controller = controller_with(
            Arc::new(RisingConfusion(50)),
            Arc::new(RecordingSource::default()),
            Arc::new(PushedFrameCapture::new(true)),
        );
        controller.connect().await.unwrap();
        controller.toggle_selection(1).await.unwrap();
        sleep(Duration::from_millis(60)).await;

        controller.disconnect().await.unwrap();
        let ticks_after = controller.snapshot("").await;
        sleep(Duration::from_millis(60)).await;
        let later = controller.snapshot("").await;

        assert_eq!(later.students.len(), 6);
        assert!(later.selected.is_empty());
        for card in &later.students {
            assert!((40..=95).contains(&card.student.attention));
            assert!(card.student.confusion <= 40);
            assert!(card.student.peer_node.is_none());
        }
        // No ticks once disconnected
        let confusion = |v: &SessionView| v.students.iter().map(|c| c.student.confusion).collect::<Vec<_>>();
        assert_eq!(confusion(&ticks_after), confusion(&later));
    }

    #[tokio::test]
    async fn test_rising_confusion_alerts_once_per_student() {
        let controller = controller_with(
            Arc::new(RisingConfusion(50)),
            Arc::new(RecordingSource::default()),
            Arc::new(PushedFrameCapture::new(true)),
        );
        controller.connect().await.unwrap();
        sleep(Duration::from_millis(150)).await;

        let view = controller.snapshot("").await;
        let alerts: Vec<_> = view
            .notifications
            .iter()
            .filter(|n| n.severity == Severity::Alert)
            .collect();
        let reported: usize = alerts
            .iter()
            .map(|n| n.message.split(' ').next().unwrap().parse::<usize>().unwrap())
            .sum();
        assert!(reported <= 6);
        assert!(!alerts.is_empty());
    }

    fn latest_sample(view: &SessionView) -> u32 {
        view.history.last().map(|s| s.time).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_abandoned_disconnect_keeps_session_running() {
        let source = Arc::new(RecordingSource::default());
        let controller = controller_with(
            Arc::new(RandomTelemetry),
            source.clone(),
            Arc::new(PushedFrameCapture::new(true)),
        );
        controller.connect().await.unwrap();
        sleep(Duration::from_millis(50)).await;

        // The caller gives up while a reader holds the state
        let reader = controller.shared.state.read().await;
        assert!(timeout(Duration::from_millis(30), controller.disconnect())
            .await
            .is_err());
        drop(reader);

        controller.connect().await.unwrap();
        let polls_before = source.frames.lock().unwrap().len();
        let sample_before = latest_sample(&controller.snapshot("").await);
        sleep(Duration::from_millis(150)).await;

        let view = controller.snapshot("").await;
        assert!(view.connected);
        assert!(source.frames.lock().unwrap().len() > polls_before);
        assert!(latest_sample(&view) > sample_before);
    }

    #[tokio::test]
    async fn test_abandoned_connect_changes_nothing() {
        let source = Arc::new(RecordingSource::default());
        let controller = controller_with(
            Arc::new(RandomTelemetry),
            source.clone(),
            Arc::new(PushedFrameCapture::new(true)),
        );

        let reader = controller.shared.state.read().await;
        assert!(timeout(Duration::from_millis(30), controller.connect())
            .await
            .is_err());
        drop(reader);

        assert!(!controller.is_connected().await);
        sleep(Duration::from_millis(60)).await;
        assert!(source.frames.lock().unwrap().is_empty());

        controller.connect().await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(controller.is_connected().await);
        assert!(!source.frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analysis_applies_after_delay() {
        let controller = controller_with(
            Arc::new(RisingConfusion(0)),
            Arc::new(RecordingSource::default()),
            Arc::new(PushedFrameCapture::new(true)),
        );
        let before: Vec<u8> = controller
            .snapshot("")
            .await
            .students
            .iter()
            .map(|c| c.student.confusion)
            .collect();

        controller.run_analysis().await.unwrap();
        let pending = controller.snapshot("").await;
        assert_eq!(
            pending.notifications.last().unwrap().message,
            "Running AI analysis..."
        );

        sleep(Duration::from_millis(120)).await;
        let done = controller.snapshot("").await;
        let after: Vec<u8> = done.students.iter().map(|c| c.student.confusion).collect();
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(*a, (*b + 15).min(100));
        }
        assert_eq!(
            done.notifications.last().unwrap().message,
            "AI analysis completed - flagged struggling students"
        );
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pending_analysis() {
        let controller = controller_with(
            Arc::new(RisingConfusion(0)),
            Arc::new(RecordingSource::default()),
            Arc::new(PushedFrameCapture::new(true)),
        );
        controller.run_analysis().await.unwrap();
        controller.disconnect().await.unwrap();
        sleep(Duration::from_millis(120)).await;

        let view = controller.snapshot("").await;
        assert!(view
            .notifications
            .iter()
            .all(|n| n.message != "AI analysis completed - flagged struggling students"));
    }

    #[tokio::test]
    async fn test_invalid_peer_node_via_controller() {
        let controller = controller_with(
            Arc::new(RandomTelemetry),
            Arc::new(RecordingSource::default()),
            Arc::new(PushedFrameCapture::new(true)),
        );
        let mut revisions = controller.subscribe();
        let result = controller.create_peer_node("Study Group").await;
        assert!(matches!(result, Err(HiveError::InvalidPeerNode)));
        assert!(revisions.has_changed().unwrap());

        controller.apply(Action::ToggleSelection(3)).await.unwrap();
        controller.create_peer_node("Study Group").await.unwrap();
        let view = controller.snapshot("").await;
        assert_eq!(view.peer_nodes.len(), 1);
        assert_eq!(view.peer_nodes[0].members[0].id, 3);
    }
}
