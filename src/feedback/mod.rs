//! Maps a scored analysis record onto one of five canned feedback
//! categories and keeps a bounded history of everything surfaced so far.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisRecord, LOW_FOCUS_THRESHOLD};

/// Scores below this bump the priority to high even without a distraction.
const HIGH_PRIORITY_SCORE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    DistractionAlert,
    FocusReminder,
    InactivityReminder,
    StressAlert,
    GeneralEncouragement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// One piece of feedback handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub kind: FeedbackKind,
    pub message: String,
    pub priority: Priority,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub analysis: AnalysisRecord,
}

/// Aggregate counts over the retained feedback history.
#[derive(Debug, Clone, Default)]
pub struct FeedbackStats {
    pub total: usize,
    pub by_kind: HashMap<FeedbackKind, usize>,
    pub by_priority: HashMap<Priority, usize>,
    pub last: Option<FeedbackRecord>,
}

/// Selects feedback for analysis records that asked for it. Owns the
/// bounded history; the random source is seedable so tests can pin the
/// chosen message.
pub struct FeedbackEngine {
    history: VecDeque<FeedbackRecord>,
    capacity: usize,
    rng: StdRng,
}

impl FeedbackEngine {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Picks the feedback category by the first matching rule, a random
    /// message for that category and a priority, then records everything in
    /// the history.
    pub fn select(&mut self, analysis: AnalysisRecord) -> FeedbackRecord {
        let kind = kind_for(&analysis);
        let options = messages_for(kind);
        let message = options[self.rng.gen_range(0..options.len())].to_string();
        let priority = priority_for(&analysis);

        let record = FeedbackRecord {
            kind,
            message,
            priority,
            timestamp: analysis.timestamp,
            analysis,
        };

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());

        record
    }

    /// Returns up to `limit` most recent feedback records, oldest first.
    pub fn history(&self, limit: usize) -> Vec<FeedbackRecord> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self) -> FeedbackStats {
        let mut by_kind: HashMap<FeedbackKind, usize> = HashMap::new();
        let mut by_priority: HashMap<Priority, usize> = HashMap::new();
        for record in &self.history {
            *by_kind.entry(record.kind).or_default() += 1;
            *by_priority.entry(record.priority).or_default() += 1;
        }

        FeedbackStats {
            total: self.history.len(),
            by_kind,
            by_priority,
            last: self.history.back().cloned(),
        }
    }
}

/// Strict priority chain: an active distraction always wins, then a low
/// score, then inactivity, then rapid typing.
fn kind_for(analysis: &AnalysisRecord) -> FeedbackKind {
    if analysis.distraction_detected {
        FeedbackKind::DistractionAlert
    } else if analysis.focus_score < LOW_FOCUS_THRESHOLD {
        FeedbackKind::FocusReminder
    } else if analysis.screen_static && !analysis.input_active {
        FeedbackKind::InactivityReminder
    } else if analysis.rapid_typing {
        FeedbackKind::StressAlert
    } else {
        FeedbackKind::GeneralEncouragement
    }
}

fn priority_for(analysis: &AnalysisRecord) -> Priority {
    if analysis.distraction_detected || analysis.focus_score < HIGH_PRIORITY_SCORE {
        Priority::High
    } else if analysis.rapid_typing {
        Priority::Medium
    } else {
        Priority::Low
    }
}

fn messages_for(kind: FeedbackKind) -> &'static [&'static str; 4] {
    match kind {
        FeedbackKind::DistractionAlert => &[
            "Focus alert! That looks like a distracting site.",
            "Time to get back to work. You've got important tasks to complete.",
            "Stay focused! Your productivity goals are waiting for you.",
            "Let's refocus on your tasks. You've got this!",
        ],
        FeedbackKind::FocusReminder => &[
            "Your focus score is low. Let's get back on track!",
            "Time to dive deep into your work. Focus mode activated!",
            "Remember your goals. Every moment counts!",
            "Take a deep breath and refocus on what matters most.",
        ],
        FeedbackKind::InactivityReminder => &[
            "Looks like you haven't been active. Are you still working?",
            "Taking a break? That's fine, just remember to come back!",
            "Lost in thought? Don't forget about your tasks!",
            "Ready to get back to work? Your tasks are waiting.",
        ],
        FeedbackKind::StressAlert => &[
            "Slow down a bit. Rapid typing might indicate stress.",
            "Take a moment to breathe. You're doing great!",
            "Pace yourself. Quality over speed!",
            "Remember to take breaks. Your well-being matters.",
        ],
        FeedbackKind::GeneralEncouragement => &[
            "Great job staying focused! Keep it up!",
            "You're doing well! Stay on track!",
            "Excellent work! You're making progress!",
            "Keep the momentum going! You're on fire!",
        ],
    }
}
