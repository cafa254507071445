//! The graduated idle-spin ladder shared by every hot-path stage: CPU pause,
//! then batched pause, then thread yield, then a 1ms sleep. Each stage keeps
//! its own `Backoff` and calls [`Backoff::spin`] once per empty iteration,
//! resetting it the moment it finds work.

use std::time::Duration;

pub struct Backoff {
    idle: u64,
}

impl Backoff {
    pub fn new() -> Self {
        Self { idle: 0 }
    }

    pub fn reset(&mut self) {
        self.idle = 0;
    }

    pub fn spin(&mut self) {
        if self.idle < 1_000 {
            std::hint::spin_loop();
        } else if self.idle < 50_000 {
            for _ in 0..10 {
                std::hint::spin_loop();
            }
        } else if self.idle < 100_000 {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.idle = self.idle.saturating_add(1);
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
