// Fixed-window request limiter keyed by client address.
//
// The store is owned and injectable (no globals) and checks take the current
// instant from the caller, so tests drive time directly. Stale windows are
// pruned lazily on each check rather than on a timer.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        FixedWindowLimiter {
            window,
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request from `client` at time `now`.
    pub fn check(&self, client: &str, now: Instant) -> Result<(), AppError> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        windows.retain(|_, w| now.duration_since(w.started) < self.window);

        let w = windows.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if w.count >= self.max_requests {
            return Err(AppError::RateLimited);
        }
        w.count += 1;
        Ok(())
    }
}
