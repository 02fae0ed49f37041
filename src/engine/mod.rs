//! The engine loop and its handle. [Engine] owns the monitors, the analyzer
//! and the feedback selector; `start` spawns one background task that ticks
//! once per second and pushes [FeedbackRecord]s to the receiver handed out
//! at construction.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    analysis::BehaviorAnalyzer,
    feedback::{FeedbackEngine, FeedbackRecord, FeedbackStats},
    monitors::{
        input::{InputMonitor, InputPatterns},
        process::ProcessMonitor,
        screen::{ScreenGrabber, ScreenMonitor, XcapGrabber},
    },
    utils::clock::{Clock, DefaultClock},
    window_api::{GenericWindowManager, WindowManager},
};

pub mod config;
mod worker;

pub use config::EngineConfig;

/// User-entered task. The list is an append-only log, tasks are never
/// removed in the current design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub text: String,
}

/// Snapshot of the engine's externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub running: bool,
    /// True once screen capture has failed often enough in a row that the
    /// engine runs without screen samples.
    pub screen_degraded: bool,
}

struct WorkerState {
    shutdown: Option<CancellationToken>,
    handle: Option<JoinHandle<Result<()>>>,
}

/// Main handle of the focus assistant. A GUI shell keeps one of these,
/// calls [Engine::start]/[Engine::stop] and drains the feedback receiver on
/// its own thread; widgets must never be touched from the worker side.
pub struct Engine {
    config: EngineConfig,
    monitors: Arc<Mutex<worker::Monitors>>,
    input: InputMonitor,
    analyzer: BehaviorAnalyzer,
    feedback: Arc<Mutex<FeedbackEngine>>,
    sender: mpsc::Sender<FeedbackRecord>,
    tasks: Mutex<Vec<Task>>,
    clock: Arc<dyn Clock>,
    state: Mutex<WorkerState>,
    screen_degraded: Arc<AtomicBool>,
}

impl Engine {
    /// Creates an engine wired to the real OS backends.
    pub fn new(config: EngineConfig) -> Result<(Self, mpsc::Receiver<FeedbackRecord>)> {
        let manager = GenericWindowManager::new()?;
        Ok(Self::with_deps(
            config,
            Box::new(manager),
            Box::new(XcapGrabber::new()),
            Arc::new(DefaultClock),
        ))
    }

    /// Creates an engine with injected OS boundaries, used by tests and by
    /// shells that bring their own capture backends.
    pub fn with_deps(
        config: EngineConfig,
        window_manager: Box<dyn WindowManager>,
        grabber: Box<dyn ScreenGrabber>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Receiver<FeedbackRecord>) {
        let (sender, receiver) = mpsc::channel(config.feedback_channel_capacity);

        let monitors = Arc::new(Mutex::new(worker::Monitors {
            screen: ScreenMonitor::new(grabber, config.screen_history_depth),
            process: ProcessMonitor::new(window_manager),
        }));

        let engine = Self {
            input: InputMonitor::new(config.input_buffer_capacity),
            feedback: Arc::new(Mutex::new(FeedbackEngine::new(
                config.feedback_history_capacity,
            ))),
            monitors,
            analyzer: BehaviorAnalyzer::new(),
            sender,
            tasks: Mutex::new(Vec::new()),
            clock,
            state: Mutex::new(WorkerState {
                shutdown: None,
                handle: None,
            }),
            screen_degraded: Arc::new(AtomicBool::new(false)),
            config,
        };

        (engine, receiver)
    }

    /// Starts monitoring. No-op while already running. Must be called from
    /// within a tokio runtime, the worker is spawned onto it.
    pub fn start(&self) {
        let mut state = self.state.lock().expect("engine state lock poisoned");
        if state.shutdown.is_some() {
            debug!("Engine is already running");
            return;
        }

        self.input.start();

        let token = CancellationToken::new();
        let worker = worker::TickWorker {
            monitors: self.monitors.clone(),
            input: self.input.clone(),
            analyzer: self.analyzer.clone(),
            feedback: self.feedback.clone(),
            sender: self.sender.clone(),
            shutdown: token.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            screen_degraded: self.screen_degraded.clone(),
            capture_failures: 0,
        };
        state.handle = Some(tokio::spawn(worker.run()));
        state.shutdown = Some(token);
    }

    /// Requests shutdown and returns immediately. Cancellation is
    /// cooperative: a tick that is already in flight still completes, so
    /// monitoring may continue for up to one tick after this returns. Use
    /// [Engine::stop_and_wait] for a synchronous guarantee.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("engine state lock poisoned");
        let Some(token) = state.shutdown.take() else {
            return;
        };
        token.cancel();
        self.input.stop();
    }

    /// Like [Engine::stop] but waits until the worker has fully exited.
    pub async fn stop_and_wait(&self) -> Result<()> {
        let handle = {
            let mut state = self.state.lock().expect("engine state lock poisoned");
            if let Some(token) = state.shutdown.take() {
                token.cancel();
            }
            state.handle.take()
        };
        self.input.stop();

        if let Some(handle) = handle {
            handle.await??;
        }
        Ok(())
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.state.lock().expect("engine state lock poisoned");
        EngineStatus {
            running: state.shutdown.is_some(),
            screen_degraded: self.screen_degraded.load(Ordering::SeqCst),
        }
    }

    pub fn add_task(&self, text: impl Into<String>) {
        self.tasks
            .lock()
            .expect("task list lock poisoned")
            .push(Task { text: text.into() });
    }

    pub fn tasks(&self) -> Vec<String> {
        self.tasks
            .lock()
            .expect("task list lock poisoned")
            .iter()
            .map(|task| task.text.clone())
            .collect()
    }

    /// Aggregate counts over the feedback surfaced so far.
    pub fn feedback_stats(&self) -> FeedbackStats {
        self.feedback
            .lock()
            .expect("feedback lock poisoned")
            .stats()
    }

    /// Most recent feedback records, oldest first.
    pub fn feedback_history(&self, limit: usize) -> Vec<FeedbackRecord> {
        self.feedback
            .lock()
            .expect("feedback lock poisoned")
            .history(limit)
    }

    /// Event-rate statistics over the last minute of input.
    pub fn input_patterns(&self) -> InputPatterns {
        self.input.patterns()
    }
}

#[cfg(test)]
mod engine_tests {
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::{sync::mpsc::error::TryRecvError, time::Instant};

    use crate::{
        feedback::{FeedbackKind, Priority},
        monitors::screen::{Frame, MockScreenGrabber},
        utils::logging::TEST_LOGGING,
        window_api::{MockWindowManager, WindowInfo, WindowRect},
    };

    use super::*;

    /// Runs against tokio's paused test clock, so `start_paused` tests
    /// cover whole minutes of engine time without waiting in real time.
    struct TestClock {
        start_time: DateTime<Utc>,
        reference: Instant,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                start_time: Utc::now(),
                reference: Instant::now(),
            }
        }
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }

        async fn sleep_until(&self, instant: tokio::time::Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    fn distracting_window() -> WindowInfo {
        WindowInfo {
            handle: 42,
            title: "Vibing in YouTube - Chrome".into(),
            pid: 1234,
            process_name: "chrome".into(),
            rect: WindowRect {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            },
            timestamp: Utc::now(),
        }
    }

    fn test_engine(
        config: EngineConfig,
        manager: MockWindowManager,
        grabber: MockScreenGrabber,
    ) -> (Engine, mpsc::Receiver<FeedbackRecord>) {
        Engine::with_deps(
            config,
            Box::new(manager),
            Box::new(grabber),
            Arc::new(TestClock::new()),
        )
    }

    #[test]
    fn tasks_round_trip() {
        let (engine, _receiver) = test_engine(
            EngineConfig::default(),
            MockWindowManager::new(),
            MockScreenGrabber::new(),
        );

        engine.add_task("x");
        assert_eq!(engine.tasks(), vec!["x".to_string()]);
        // Tasks persist across reads without mutation.
        assert_eq!(engine.tasks(), vec!["x".to_string()]);

        engine.add_task("y");
        assert_eq!(engine.tasks(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let (engine, _receiver) = test_engine(
            EngineConfig::default(),
            MockWindowManager::new(),
            MockScreenGrabber::new(),
        );
        engine.stop();
        assert!(!engine.status().running);
    }

    /// Smoke test for the whole loop: a permanently distracting foreground
    /// window must produce distraction alerts on the feedback channel. Runs
    /// at the real one-second cadence on the paused test clock.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_engine() -> Result<()> {
        *TEST_LOGGING;

        let mut manager = MockWindowManager::new();
        manager
            .expect_foreground_window()
            .returning(|| Ok(distracting_window()));

        let mut grabber = MockScreenGrabber::new();
        grabber.expect_grab().returning(|| {
            Ok(Frame {
                gray: vec![128; 16],
                width: 4,
                height: 4,
                channels: 4,
            })
        });

        let (engine, mut receiver) = test_engine(EngineConfig::default(), manager, grabber);

        engine.start();
        assert!(engine.status().running);
        // Repeated start while running is a no-op.
        engine.start();

        let record = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await?
            .expect("feedback channel closed unexpectedly");
        assert_eq!(record.kind, FeedbackKind::DistractionAlert);
        assert_eq!(record.priority, Priority::High);
        assert!(record.analysis.distraction_detected);

        engine.stop_and_wait().await?;
        assert!(!engine.status().running);
        assert!(engine.feedback_stats().total >= 1);
        assert_eq!(
            engine.feedback_history(1)[0].kind,
            FeedbackKind::DistractionAlert
        );

        Ok(())
    }

    /// A grabber that always fails must flip the degraded flag instead of
    /// failing any tick.
    #[tokio::test(start_paused = true)]
    async fn persistent_capture_failure_degrades_visibly() -> Result<()> {
        *TEST_LOGGING;

        let mut manager = MockWindowManager::new();
        manager
            .expect_foreground_window()
            .returning(|| Ok(distracting_window()));

        let mut grabber = MockScreenGrabber::new();
        grabber
            .expect_grab()
            .returning(|| Err(anyhow::anyhow!("backend gone")));

        let mut config = EngineConfig::default();
        config.degraded_capture_threshold = 3;
        let (engine, mut receiver) = test_engine(config, manager, grabber);

        engine.start();

        // Feedback keeps flowing on partial data while capture is broken.
        for _ in 0..4 {
            tokio::time::timeout(Duration::from_secs(5), receiver.recv())
                .await?
                .expect("feedback channel closed unexpectedly");
        }
        assert!(engine.status().screen_degraded);

        engine.stop_and_wait().await?;
        Ok(())
    }

    /// A failing tick must back off instead of killing the loop: the worker
    /// stays alive across several backoff windows and still honors stop.
    #[tokio::test(start_paused = true)]
    async fn tick_errors_back_off_and_keep_the_loop_alive() -> Result<()> {
        *TEST_LOGGING;

        let (engine, mut receiver) = test_engine(
            EngineConfig::default(),
            MockWindowManager::new(),
            MockScreenGrabber::new(),
        );

        // Poison the monitor lock so every tick takes the error path.
        let monitors = engine.monitors.clone();
        let _ = std::thread::spawn(move || {
            let _guard = monitors.lock().unwrap();
            panic!("poisoning the monitor lock");
        })
        .join();

        engine.start();

        // Three five-second backoff windows pass on the warped clock.
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(engine.status().running);
        assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));

        engine.stop_and_wait().await?;
        assert!(!engine.status().running);
        Ok(())
    }
}
