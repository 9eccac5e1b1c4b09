use std::{fmt, time::Duration};

use log::{error, info, warn};
use web_time::Instant;

/// How often restoring a lost graphics context is attempted before giving up.
pub const MAX_RESTORE_ATTEMPTS: u32 = 5;

/// The delay before the first restore attempt, doubled after every failed attempt.
pub const RESTORE_BACKOFF: Duration = Duration::from_millis(250);

/// The status of a viewer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// The viewer is being set up.
    Initializing,
    /// Frames are being rendered.
    Running,
    /// The graphics context was lost, rendering is paused until it is restored.
    Lost,
    /// The viewer gave up, the host has to initialize a new one.
    Failed(String),
    /// The viewer was disposed.
    Disposed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Initializing => write!(f, "initializing"),
            Status::Running => write!(f, "running"),
            Status::Lost => write!(f, "graphics context lost"),
            Status::Failed(reason) => write!(f, "failed: {reason}"),
            Status::Disposed => write!(f, "disposed"),
        }
    }
}

type Observer = Box<dyn FnMut(&Status)>;

/// The status machine of a viewer with bounded restore attempts.
pub struct Lifecycle {
    status: Status,
    failed_attempts: u32,
    next_attempt: Option<Instant>,
    observers: Vec<Observer>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Creates a lifecycle in the initializing state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: Status::Initializing,
            failed_attempts: 0,
            next_attempt: None,
            observers: Vec::new(),
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Returns true if frames should be rendered.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    /// Registers an observer called on every status transition.
    pub fn observe(&mut self, observer: impl FnMut(&Status) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Marks the initialization as finished.
    pub fn start(&mut self) {
        if self.status == Status::Initializing {
            self.transition(Status::Running);
        }
    }

    /// Marks the graphics context as lost, scheduling the first restore attempt.
    pub fn lose(&mut self, now: Instant) {
        if self.status == Status::Running {
            warn!("Graphics context lost, pausing rendering");
            self.failed_attempts = 0;
            self.next_attempt = Some(now + RESTORE_BACKOFF);
            self.transition(Status::Lost);
        }
    }

    /// Returns true if a restore attempt is due.
    #[must_use]
    pub fn restore_due(&self, now: Instant) -> bool {
        self.status == Status::Lost && self.next_attempt.is_some_and(|attempt| now >= attempt)
    }

    /// Marks a restore attempt as successful.
    pub fn restored(&mut self) {
        if self.status == Status::Lost {
            info!("Graphics context restored");
            self.failed_attempts = 0;
            self.next_attempt = None;
            self.transition(Status::Running);
        }
    }

    /// Marks a restore attempt as failed, giving up after [`MAX_RESTORE_ATTEMPTS`] attempts.
    pub fn restore_failed(&mut self, now: Instant, reason: &str) {
        if self.status != Status::Lost {
            return;
        }

        self.failed_attempts += 1;
        if self.failed_attempts >= MAX_RESTORE_ATTEMPTS {
            self.next_attempt = None;
            self.fail(format!(
                "giving up after {} restore attempts: {reason}",
                self.failed_attempts
            ));
        } else {
            let delay = backoff(self.failed_attempts);
            warn!("Restoring graphics context failed, retrying in {delay:?}: {reason}");
            self.next_attempt = Some(now + delay);
        }
    }

    /// Marks the viewer as terminally failed.
    pub fn fail(&mut self, reason: String) {
        if !matches!(self.status, Status::Failed(_) | Status::Disposed) {
            error!("Viewer failed: {reason}");
            self.transition(Status::Failed(reason));
        }
    }

    /// Marks the viewer as disposed, returning false if it already was.
    pub fn dispose(&mut self) -> bool {
        if self.status == Status::Disposed {
            return false;
        }

        self.next_attempt = None;
        self.transition(Status::Disposed);
        true
    }

    fn transition(&mut self, status: Status) {
        self.status = status;
        for observer in &mut self.observers {
            observer(&self.status);
        }
    }
}

/// Returns the delay after the given number of failed restore attempts.
fn backoff(failed_attempts: u32) -> Duration {
    RESTORE_BACKOFF * 2u32.saturating_pow(failed_attempts)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    fn running() -> Lifecycle {
        let mut lifecycle = Lifecycle::new();
        lifecycle.start();
        lifecycle
    }

    #[test]
    fn starts_running() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.status(), &Status::Initializing);

        lifecycle.start();
        assert!(lifecycle.is_running());
    }

    #[test]
    fn restore_waits_for_backoff() {
        let mut lifecycle = running();
        let now = Instant::now();

        lifecycle.lose(now);
        assert_eq!(lifecycle.status(), &Status::Lost);
        assert!(!lifecycle.restore_due(now));
        assert!(lifecycle.restore_due(now + RESTORE_BACKOFF));

        lifecycle.restored();
        assert!(lifecycle.is_running());
        assert!(!lifecycle.restore_due(now + RESTORE_BACKOFF));
    }

    #[test]
    fn backoff_doubles() {
        let mut lifecycle = running();
        let now = Instant::now();
        lifecycle.lose(now);

        lifecycle.restore_failed(now, "no context");
        assert!(!lifecycle.restore_due(now + RESTORE_BACKOFF));
        assert!(lifecycle.restore_due(now + 2 * RESTORE_BACKOFF));

        lifecycle.restore_failed(now, "no context");
        assert!(!lifecycle.restore_due(now + 2 * RESTORE_BACKOFF));
        assert!(lifecycle.restore_due(now + 4 * RESTORE_BACKOFF));
    }

    #[test]
    fn gives_up_after_bounded_attempts() {
        let mut lifecycle = running();
        let now = Instant::now();
        lifecycle.lose(now);

        for _ in 1..MAX_RESTORE_ATTEMPTS {
            lifecycle.restore_failed(now, "no context");
            assert_eq!(lifecycle.status(), &Status::Lost);
        }
        lifecycle.restore_failed(now, "no context");

        assert!(matches!(lifecycle.status(), Status::Failed(_)));
        assert!(!lifecycle.restore_due(now + Duration::from_secs(3600)));
        lifecycle.restored();
        assert!(matches!(lifecycle.status(), Status::Failed(_)));
    }

    #[test]
    fn observers_see_every_transition() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut lifecycle = Lifecycle::new();
        lifecycle.observe({
            let seen = Rc::clone(&seen);
            move |status| seen.borrow_mut().push(status.clone())
        });

        lifecycle.start();
        lifecycle.lose(Instant::now());
        lifecycle.restored();
        lifecycle.dispose();

        assert_eq!(
            *seen.borrow(),
            [
                Status::Running,
                Status::Lost,
                Status::Running,
                Status::Disposed
            ]
        );
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut lifecycle = running();

        assert!(lifecycle.dispose());
        assert!(!lifecycle.dispose());
        lifecycle.lose(Instant::now());
        lifecycle.fail("late failure".to_owned());
        assert_eq!(lifecycle.status(), &Status::Disposed);
    }
}
