//! Reset-on-signal debounce timer (§4.5): every new signal pushes the
//! deadline `duration` further out; the timer only fires once no signal has
//! arrived for the full `duration`.

use std::time::Duration;

use tokio::time::Instant;

pub struct Damper {
    duration: Duration,
    deadline: Option<Instant>,
}

impl Damper {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
        }
    }

    pub fn signal(&mut self) {
        self.deadline = Some(Instant::now() + self.duration);
    }

    pub fn armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Resolves once `duration` has elapsed since the last `signal`. Pending
    /// forever while unarmed so it composes cleanly inside `tokio::select!`.
    pub async fn wait(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
