use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use chrono::{DateTime, Duration, Utc};
use rdev::EventType;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Mouse moves are only recorded once the cursor travelled further than this
/// on either axis since the last recorded move, to bound event volume.
const MOVE_THRESHOLD_PX: f64 = 10.0;

/// Trailing window the pattern statistics are computed over.
const PATTERN_WINDOW_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEventKind {
    KeyPress,
    KeyRelease,
    MousePress,
    MouseRelease,
    MouseScroll,
    MouseMove,
}

impl InputEventKind {
    pub fn is_key(self) -> bool {
        matches!(self, InputEventKind::KeyPress | InputEventKind::KeyRelease)
    }

    pub fn is_mouse(self) -> bool {
        matches!(
            self,
            InputEventKind::MousePress
                | InputEventKind::MouseRelease
                | InputEventKind::MouseScroll
                | InputEventKind::MouseMove
        )
    }
}

/// One keyboard or mouse event as recorded by the OS-level listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub kind: InputEventKind,
    pub description: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub position: Option<(f64, f64)>,
}

/// Rate statistics over the trailing pattern window.
#[derive(Debug, Clone, Default)]
pub struct InputPatterns {
    pub event_counts: HashMap<InputEventKind, usize>,
    /// Key events per second.
    pub typing_rate: f64,
    /// Mouse events per second.
    pub mouse_activity: f64,
    pub total_events: usize,
    pub is_active: bool,
}

struct BufferInner {
    events: VecDeque<InputEvent>,
    last_move: Option<(f64, f64)>,
}

struct Shared {
    recording: AtomicBool,
    listener_spawned: AtomicBool,
    capacity: usize,
    inner: Mutex<BufferInner>,
}

impl Shared {
    /// Invoked from the listener callback thread. The bounded deque behind
    /// the mutex is the only state shared between the listener and the
    /// polling side.
    fn handle(&self, event_type: &EventType, now: DateTime<Utc>) {
        if !self.recording.load(Ordering::Relaxed) {
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        let event = match event_type {
            EventType::KeyPress(key) => InputEvent {
                kind: InputEventKind::KeyPress,
                description: format!("{key:?}"),
                timestamp: now,
                position: None,
            },
            EventType::KeyRelease(key) => InputEvent {
                kind: InputEventKind::KeyRelease,
                description: format!("{key:?}"),
                timestamp: now,
                position: None,
            },
            EventType::ButtonPress(button) => InputEvent {
                kind: InputEventKind::MousePress,
                description: format!("{button:?}"),
                timestamp: now,
                position: inner.last_move,
            },
            EventType::ButtonRelease(button) => InputEvent {
                kind: InputEventKind::MouseRelease,
                description: format!("{button:?}"),
                timestamp: now,
                position: inner.last_move,
            },
            EventType::Wheel { delta_y, .. } => InputEvent {
                kind: InputEventKind::MouseScroll,
                description: if *delta_y > 0 { "up".into() } else { "down".into() },
                timestamp: now,
                position: inner.last_move,
            },
            EventType::MouseMove { x, y } => {
                let moved_enough = match inner.last_move {
                    None => true,
                    Some((lx, ly)) => {
                        (x - lx).abs() > MOVE_THRESHOLD_PX || (y - ly).abs() > MOVE_THRESHOLD_PX
                    }
                };
                if !moved_enough {
                    return;
                }
                inner.last_move = Some((*x, *y));
                InputEvent {
                    kind: InputEventKind::MouseMove,
                    description: format!("to ({x}, {y})"),
                    timestamp: now,
                    position: Some((*x, *y)),
                }
            }
        };

        if inner.events.len() == self.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(event);
    }
}

/// Passively records keyboard and mouse events into a bounded rolling
/// buffer. Cloning yields another handle onto the same buffer.
#[derive(Clone)]
pub struct InputMonitor {
    shared: Arc<Shared>,
}

impl InputMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                recording: AtomicBool::new(false),
                listener_spawned: AtomicBool::new(false),
                capacity,
                inner: Mutex::new(BufferInner {
                    events: VecDeque::with_capacity(capacity),
                    last_move: None,
                }),
            }),
        }
    }

    /// Attaches the OS-level listeners. Repeated calls while active are
    /// no-ops. The hook thread is spawned once and lives until process exit:
    /// rdev offers no unhook, so `stop` gates recording instead.
    pub fn start(&self) {
        if self.shared.recording.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.shared.listener_spawned.swap(true, Ordering::SeqCst) {
            return;
        }

        let shared = self.shared.clone();
        std::thread::spawn(move || {
            debug!("Input listener thread starting");
            if let Err(e) = rdev::listen(move |event| shared.handle(&event.event_type, Utc::now()))
            {
                error!("Input listener failed {e:?}");
            }
        });
    }

    pub fn stop(&self) {
        self.shared.recording.store(false, Ordering::SeqCst);
    }

    /// Returns events recorded within the trailing window. Linear scan,
    /// acceptable for the bounded buffer.
    pub fn recent(&self, window: Duration) -> Vec<InputEvent> {
        self.recent_at(Utc::now(), window)
    }

    fn recent_at(&self, now: DateTime<Utc>, window: Duration) -> Vec<InputEvent> {
        let cutoff = now - window;
        let Ok(inner) = self.shared.inner.lock() else {
            return Vec::new();
        };
        inner
            .events
            .iter()
            .filter(|event| event.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Computes event-rate statistics over the last minute.
    pub fn patterns(&self) -> InputPatterns {
        self.patterns_at(Utc::now())
    }

    fn patterns_at(&self, now: DateTime<Utc>) -> InputPatterns {
        let recent = self.recent_at(now, Duration::seconds(PATTERN_WINDOW_SECONDS));

        let mut event_counts: HashMap<InputEventKind, usize> = HashMap::new();
        for event in &recent {
            *event_counts.entry(event.kind).or_default() += 1;
        }

        let key_events = recent.iter().filter(|e| e.kind.is_key()).count();
        let mouse_events = recent.iter().filter(|e| e.kind.is_mouse()).count();
        let typing_rate = key_events as f64 / PATTERN_WINDOW_SECONDS as f64;
        let mouse_activity = mouse_events as f64 / PATTERN_WINDOW_SECONDS as f64;

        InputPatterns {
            event_counts,
            typing_rate,
            mouse_activity,
            total_events: recent.len(),
            is_active: typing_rate > 0.5 || mouse_activity > 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use rdev::Key;

    use super::*;

    fn recording_monitor(capacity: usize) -> InputMonitor {
        let monitor = InputMonitor::new(capacity);
        monitor.shared.recording.store(true, Ordering::SeqCst);
        monitor
    }

    #[test]
    fn buffer_never_exceeds_capacity() {
        let monitor = recording_monitor(1000);
        let start = Utc::now();
        for i in 0..1001 {
            let now = start + Duration::milliseconds(i);
            monitor
                .shared
                .handle(&EventType::KeyPress(Key::KeyA), now);
        }

        let inner = monitor.shared.inner.lock().unwrap();
        assert_eq!(inner.events.len(), 1000);
        // The 1001st append evicted the oldest event.
        assert_eq!(inner.events.front().unwrap().timestamp, start + Duration::milliseconds(1));
    }

    #[test]
    fn recent_filters_by_timestamp() {
        let monitor = recording_monitor(1000);
        let now = Utc::now();
        monitor
            .shared
            .handle(&EventType::KeyPress(Key::KeyA), now - Duration::seconds(5));
        monitor
            .shared
            .handle(&EventType::KeyPress(Key::KeyB), now - Duration::seconds(20));

        let recent = monitor.recent_at(now, Duration::seconds(10));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].timestamp, now - Duration::seconds(5));
    }

    #[test]
    fn small_mouse_moves_are_throttled() {
        let monitor = recording_monitor(1000);
        let now = Utc::now();
        monitor.shared.handle(&EventType::MouseMove { x: 0.0, y: 0.0 }, now);
        monitor.shared.handle(&EventType::MouseMove { x: 5.0, y: 5.0 }, now);
        monitor.shared.handle(&EventType::MouseMove { x: 25.0, y: 5.0 }, now);

        let inner = monitor.shared.inner.lock().unwrap();
        assert_eq!(inner.events.len(), 2);
        assert_eq!(inner.last_move, Some((25.0, 5.0)));
    }

    #[test]
    fn stop_gates_recording() {
        let monitor = recording_monitor(1000);
        monitor.stop();
        monitor
            .shared
            .handle(&EventType::KeyPress(Key::KeyA), Utc::now());
        assert!(monitor.shared.inner.lock().unwrap().events.is_empty());
    }

    #[test]
    fn patterns_detect_typing_activity() {
        let monitor = recording_monitor(1000);
        let now = Utc::now();
        for i in 0..40 {
            monitor.shared.handle(
                &EventType::KeyPress(Key::KeyA),
                now - Duration::seconds(i),
            );
        }

        let patterns = monitor.patterns_at(now);
        assert_eq!(patterns.total_events, 40);
        assert!(patterns.typing_rate > 0.5);
        assert!(patterns.is_active);
        assert_eq!(
            patterns.event_counts.get(&InputEventKind::KeyPress),
            Some(&40)
        );
    }

    #[test]
    fn idle_buffer_is_inactive() {
        let monitor = recording_monitor(1000);
        let patterns = monitor.patterns_at(Utc::now());
        assert_eq!(patterns.total_events, 0);
        assert!(!patterns.is_active);
    }
}
