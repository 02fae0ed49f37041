//! Rule-based behavior analysis. [BehaviorAnalyzer::analyze] is a pure
//! function of one tick's [SampleBundle]: it merges the monitor outputs
//! into a flat scored record using fixed keyword lists and thresholds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitors::{input::InputEvent, process::ProcessInfo, SampleBundle};
use crate::window_api::WindowInfo;

/// Substrings that mark a process or window as a likely distraction.
const DISTRACTION_KEYWORDS: &[&str] = &[
    "youtube",
    "facebook",
    "twitter",
    "instagram",
    "tiktok",
    "reddit",
    "netflix",
    "gaming",
    "game",
    "entertainment",
];

/// Substrings that mark a process or window as likely productive work.
const PRODUCTIVITY_KEYWORDS: &[&str] = &[
    "code",
    "programming",
    "work",
    "document",
    "email",
    "meeting",
    "project",
    "task",
    "development",
];

/// Screens darker than this mean brightness count as dark (display asleep
/// or dimmed). Equality is not dark.
const DARK_BRIGHTNESS_THRESHOLD: f64 = 50.0;

/// Key events per second above which typing counts as rapid.
const RAPID_TYPING_THRESHOLD: f64 = 5.0;

/// Focus scores below this always warrant feedback.
pub const LOW_FOCUS_THRESHOLD: f64 = 0.3;

/// One tick's scored analysis. Created fresh each tick, never mutated after
/// creation. Every field has an explicit default for the absent-sample case:
/// flags false, counts zero, brightness unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,

    pub screen_static: bool,
    pub screen_dark: bool,
    pub screen_brightness: Option<f64>,

    pub distraction_processes: usize,
    pub productivity_processes: usize,
    pub total_processes: usize,

    pub distraction_detected: bool,
    pub productivity_detected: bool,
    pub active_window: Option<String>,
    pub active_process: Option<String>,

    pub input_active: bool,
    /// Key events per second over the bundle's input slice.
    pub typing_rate: f64,
    pub rapid_typing: bool,
    pub total_input_events: usize,

    /// Heuristic attentiveness estimate in [0, 1].
    pub focus_score: f64,
    pub needs_feedback: bool,
}

impl AnalysisRecord {
    fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            screen_static: false,
            screen_dark: false,
            screen_brightness: None,
            distraction_processes: 0,
            productivity_processes: 0,
            total_processes: 0,
            distraction_detected: false,
            productivity_detected: false,
            active_window: None,
            active_process: None,
            input_active: false,
            typing_rate: 0.0,
            rapid_typing: false,
            total_input_events: 0,
            focus_score: 0.5,
            needs_feedback: false,
        }
    }
}

/// Analyzes user behavior from the merged monitor samples.
#[derive(Clone)]
pub struct BehaviorAnalyzer {
    distraction_keywords: &'static [&'static str],
    productivity_keywords: &'static [&'static str],
}

impl Default for BehaviorAnalyzer {
    fn default() -> Self {
        Self {
            distraction_keywords: DISTRACTION_KEYWORDS,
            productivity_keywords: PRODUCTIVITY_KEYWORDS,
        }
    }
}

impl BehaviorAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores one bundle. Absent sub-samples leave their fields at the
    /// documented defaults and never fail the analysis.
    pub fn analyze(&self, bundle: &SampleBundle) -> AnalysisRecord {
        let mut record = AnalysisRecord::empty(bundle.timestamp);

        if let Some(screen) = &bundle.screen {
            record.screen_static = !screen.change_detected;
            record.screen_dark = screen.brightness < DARK_BRIGHTNESS_THRESHOLD;
            record.screen_brightness = Some(screen.brightness);
        }

        self.apply_processes(&bundle.processes, &mut record);

        if let Some(window) = &bundle.window {
            self.apply_window(window, &mut record);
        }

        apply_input(&bundle.input, &mut record);

        record.focus_score = focus_score(&record);
        record.needs_feedback = needs_feedback(&record);

        record
    }

    fn apply_processes(&self, processes: &[ProcessInfo], record: &mut AnalysisRecord) {
        let names: Vec<String> = processes.iter().map(|p| p.name.to_lowercase()).collect();

        record.distraction_processes = names
            .iter()
            .filter(|name| matches_any(name, self.distraction_keywords))
            .count();
        record.productivity_processes = names
            .iter()
            .filter(|name| matches_any(name, self.productivity_keywords))
            .count();
        record.total_processes = processes.len();
    }

    fn apply_window(&self, window: &WindowInfo, record: &mut AnalysisRecord) {
        let title = window.title.to_lowercase();
        let process_name = window.process_name.to_lowercase();

        record.distraction_detected = matches_any(&title, self.distraction_keywords)
            || matches_any(&process_name, self.distraction_keywords);
        record.productivity_detected = matches_any(&title, self.productivity_keywords)
            || matches_any(&process_name, self.productivity_keywords);
        record.active_window = Some(title);
        record.active_process = Some(process_name);
    }
}

fn matches_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| haystack.contains(keyword))
}

fn apply_input(input: &[InputEvent], record: &mut AnalysisRecord) {
    if input.is_empty() {
        return;
    }

    let key_events = input.iter().filter(|e| e.kind.is_key()).count();
    let span_seconds = if input.len() > 1 {
        let span = input[input.len() - 1].timestamp - input[0].timestamp;
        span.num_milliseconds() as f64 / 1000.0
    } else {
        1.0
    };
    let typing_rate = key_events as f64 / span_seconds.max(1.0);

    record.input_active = true;
    record.typing_rate = typing_rate;
    record.rapid_typing = typing_rate > RAPID_TYPING_THRESHOLD;
    record.total_input_events = input.len();
}

/// Composite focus score: starts neutral at 0.5 and applies the fixed
/// adjustments in a set order, then clamps to [0, 1]. The order does not
/// affect the sum but is kept stable for score reproducibility.
pub fn focus_score(record: &AnalysisRecord) -> f64 {
    let mut score: f64 = 0.5;

    if record.productivity_detected {
        score += 0.3;
    }
    if record.input_active {
        score += 0.2;
    }
    if !record.screen_static {
        score += 0.1;
    }

    if record.distraction_detected {
        score -= 0.4;
    }
    if record.screen_dark {
        score -= 0.2;
    }
    if record.screen_static {
        score -= 0.1;
    }

    score.clamp(0.0, 1.0)
}

/// Feedback is warranted on a low score, an active distraction, or a static
/// screen without any input.
pub fn needs_feedback(record: &AnalysisRecord) -> bool {
    record.focus_score < LOW_FOCUS_THRESHOLD
        || record.distraction_detected
        || (record.screen_static && !record.input_active)
}
