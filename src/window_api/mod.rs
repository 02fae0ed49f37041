//! Contains logic for looking up the foreground window in different
//! environments. [GenericWindowManager] is the main artifact of this module
//! and picks the backend for the current platform.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Screen-space bounds of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Snapshot of the window the user currently has focused. At most one of
/// these exists per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    /// Native window handle, widened to fit both HWNDs and X window ids.
    pub handle: u64,
    /// Title of the window. For example 'bash in hello' or 'Vibing in
    /// YouTube - Chrome'.
    pub title: String,
    pub pid: u32,
    /// Name of the owning executable.
    pub process_name: String,
    pub rect: WindowRect,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager: Send {
    fn foreground_window(&mut self) -> Result<WindowInfo>;
}

/// Serves as a cross-compatible WindowManager implementation. On platforms
/// without a compiled backend every lookup fails, which callers degrade to
/// "no window" rather than treating as fatal.
pub struct GenericWindowManager {
    inner: Box<dyn WindowManager>,
}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsWindowManager;
                Ok(Self {
                    inner: Box::new(WindowsWindowManager::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxWindowManager;
                Ok(Self {
                    inner: Box::new(LinuxWindowManager::new()?),
                })
            }
            else {
                Ok(Self {
                    inner: Box::new(UnsupportedWindowManager),
                })
            }
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn foreground_window(&mut self) -> Result<WindowInfo> {
        self.inner.foreground_window()
    }
}

#[allow(dead_code)]
struct UnsupportedWindowManager;

impl WindowManager for UnsupportedWindowManager {
    fn foreground_window(&mut self) -> Result<WindowInfo> {
        Err(anyhow!("no window backend was compiled for this platform"))
    }
}
