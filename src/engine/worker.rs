use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, Result};
use chrono::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    analysis::BehaviorAnalyzer,
    feedback::{FeedbackEngine, FeedbackRecord},
    monitors::{
        input::InputMonitor, process::ProcessMonitor, screen::ScreenMonitor, SampleBundle,
    },
    utils::clock::Clock,
};

use super::config::EngineConfig;

/// Samplers that need exclusive access during a tick. Kept behind one lock
/// so a stopped engine can be restarted without rebuilding them.
pub(crate) struct Monitors {
    pub screen: ScreenMonitor,
    pub process: ProcessMonitor,
}

/// The background task behind a running engine. Once per tick it pulls
/// fresh samples, scores them and hands feedback to the presentation layer.
pub(crate) struct TickWorker {
    pub monitors: Arc<Mutex<Monitors>>,
    pub input: InputMonitor,
    pub analyzer: BehaviorAnalyzer,
    pub feedback: Arc<Mutex<FeedbackEngine>>,
    pub sender: mpsc::Sender<FeedbackRecord>,
    pub shutdown: CancellationToken,
    pub clock: Arc<dyn Clock>,
    pub config: EngineConfig,
    pub screen_degraded: Arc<AtomicBool>,
    pub capture_failures: u32,
}

impl TickWorker {
    fn collect(&mut self) -> Result<SampleBundle> {
        let mut monitors = self
            .monitors
            .lock()
            .map_err(|_| anyhow!("monitor lock poisoned"))?;

        let screen = monitors.screen.capture();
        let processes = monitors.process.list_processes();
        let changes = monitors.process.diff(&processes);
        if !changes.new.is_empty() || !changes.terminated.is_empty() {
            debug!(
                new = changes.new.len(),
                terminated = changes.terminated.len(),
                "Process set changed"
            );
        }
        let window = monitors.process.foreground_window();
        drop(monitors);

        let input = self
            .input
            .recent(Duration::seconds(self.config.input_lookback_seconds));

        Ok(SampleBundle {
            screen,
            processes,
            window,
            input,
            timestamp: self.clock.time(),
        })
    }

    /// Tracks consecutive capture failures so a persistently broken backend
    /// becomes visible through [super::Engine::status] instead of retrying
    /// in silence forever.
    fn note_screen_result(&mut self, captured: bool) {
        if captured {
            self.capture_failures = 0;
            if self.screen_degraded.swap(false, Ordering::SeqCst) {
                info!("Screen capture recovered");
            }
            return;
        }

        self.capture_failures = self.capture_failures.saturating_add(1);
        if self.capture_failures == self.config.degraded_capture_threshold {
            warn!(
                failures = self.capture_failures,
                "Screen capture keeps failing, continuing without screen samples"
            );
            self.screen_degraded.store(true, Ordering::SeqCst);
        }
    }

    fn tick(&mut self) -> Result<()> {
        let bundle = self.collect()?;
        self.note_screen_result(bundle.screen.is_some());

        let analysis = self.analyzer.analyze(&bundle);
        debug!(
            score = analysis.focus_score,
            needs_feedback = analysis.needs_feedback,
            "Analyzed tick"
        );

        if analysis.needs_feedback {
            let record = self
                .feedback
                .lock()
                .map_err(|_| anyhow!("feedback lock poisoned"))?
                .select(analysis);
            match self.sender.try_send(record) {
                Ok(()) => debug!("Delivered feedback"),
                Err(TrySendError::Full(record)) => {
                    warn!("Feedback channel is full, dropping {:?}", record.kind)
                }
                Err(TrySendError::Closed(_)) => debug!("Feedback receiver is gone"),
            }
        }

        Ok(())
    }

    /// Executes the engine event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut tick_point = self.clock.instant();
        loop {
            tick_point += self.config.tick_interval;

            if let Err(e) = self.tick() {
                error!("Encountered an error during the tick {e:?}");
                tokio::select! {
                    _ = self.shutdown.cancelled() => return Ok(()),
                    _ = self.clock.sleep(self.config.error_backoff) => (),
                }
                // The backoff shifted the schedule, restart it from now.
                tick_point = self.clock.instant();
                continue;
            }

            tokio::select! {
                // Cancelation stops the event loop. The tick that was in
                // flight has already completed at this point.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(tick_point) => ()
            }
        }
    }
}
