use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct CommandRateLimit {
    last_mode_cmd: Option<Instant>,
    min_interval: Duration,
}

impl CommandRateLimit {
    pub fn new(min_interval: Duration) -> Self {
        Self { last_mode_cmd: None, min_interval }
    }

    pub fn allow_mode_cmd(&mut self) -> bool {
        let now = Instant::now();
        if let Some(t) = self.last_mode_cmd {
            if now.duration_since(t) < self.min_interval { return false; }
        }
        self.last_mode_cmd = Some(now);
        true
    }
}
