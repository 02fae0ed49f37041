use std::time::Duration;

/// Fixed operating parameters of the engine loop. The analysis thresholds
/// themselves are constants in [crate::analysis] and are deliberately not
/// configurable at runtime.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cadence of the polling loop.
    pub tick_interval: Duration,
    /// Pause after a failed tick before the next one is attempted.
    pub error_backoff: Duration,
    /// How far back the tick looks when pulling recent input events.
    pub input_lookback_seconds: i64,
    /// Capacity of the rolling input event buffer.
    pub input_buffer_capacity: usize,
    /// Number of captured frames retained for change detection.
    pub screen_history_depth: usize,
    /// Number of feedback records retained for history and stats.
    pub feedback_history_capacity: usize,
    /// Capacity of the channel feedback is delivered over.
    pub feedback_channel_capacity: usize,
    /// Consecutive failed screen captures before the engine reports itself
    /// as running degraded.
    pub degraded_capture_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            input_lookback_seconds: 10,
            input_buffer_capacity: 1000,
            screen_history_depth: 10,
            feedback_history_capacity: 100,
            feedback_channel_capacity: 32,
            degraded_capture_threshold: 10,
        }
    }
}
