//! Single-slot debounce timer.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Default quiet period before a change is sent.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(80);

/// Why a packet is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendReason {
    ColorUpdated,
    IntensityChanged,
    Manual,
}

impl fmt::Display for SendReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SendReason::ColorUpdated => "Color updated",
            SendReason::IntensityChanged => "Intensity changed",
            SendReason::Manual => "Manual send",
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    deadline: Instant,
    reason: SendReason,
}

/// Coalesces bursts of changes into one send per quiet period.
///
/// There is at most one armed deadline. Notifying while armed replaces it.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: Option<Pending>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Debouncer {
        Debouncer {
            window,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arm the timer, cancelling any deadline already armed.
    pub fn notify(&mut self, now: Instant, reason: SendReason) {
        self.pending = Some(Pending {
            deadline: now + self.window,
            reason,
        });
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    /// Disarm and return the reason if the deadline has passed.
    pub fn fire(&mut self, now: Instant) -> Option<SendReason> {
        match self.pending {
            Some(p) if p.deadline <= now => {
                self.pending = None;
                Some(p.reason)
            }
            _ => None,
        }
    }
}

impl Default for Debouncer {
    fn default() -> Debouncer {
        Debouncer::new(DEFAULT_WINDOW)
    }
}
