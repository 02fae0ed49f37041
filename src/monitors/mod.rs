//! Samplers that feed the engine loop. Each monitor wraps one OS boundary
//! (screen capture, process enumeration, input hooks) and degrades to an
//! absent sample instead of failing the tick.

pub mod input;
pub mod process;
pub mod screen;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::window_api::WindowInfo;

use input::InputEvent;
use process::ProcessInfo;
use screen::ScreenSample;

/// One tick's merged snapshot of everything the monitors produced. Built
/// once per tick, read-only afterward and discarded after analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleBundle {
    pub screen: Option<ScreenSample>,
    pub processes: Vec<ProcessInfo>,
    pub window: Option<WindowInfo>,
    pub input: Vec<InputEvent>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}
