//! Live capture sessions: device acquisition, per-frame sampling and ordered teardown.
//!
//! A manager ([`AudioCapture`], [`VideoCapture`]) owns at most one session at a time and
//! walks it through [`CaptureState`]:
//!
//! ```text
//! Idle -> Acquiring -> Active -> Stopping -> Idle
//!             \__________ (acquisition failed) __/
//! ```
//!
//! Devices come from an injected [`DeviceProvider`]; ticks come from a [`FrameClock`].

mod audio;
mod device;
#[cfg(feature = "microphone")]
mod microphone;
mod sampling;
#[cfg(test)]
pub(crate) mod testing;
mod video;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

pub use audio::{AudioCapture, AudioUpdate};
pub use device::{
    AudioAnalyser, DeviceProvider, FrameSource, MediaStream, SpeechSession, TranscriptSink,
};
#[cfg(feature = "microphone")]
pub use microphone::CpalDeviceProvider;
pub use sampling::{CancelToken, FrameClock, IntervalFrameClock, SamplingLoop};
pub use video::{VideoCapture, VideoUpdate};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Acquiring,
    Active,
    Stopping,
}

impl CaptureState {
    pub fn is_active(&self) -> bool {
        matches!(self, CaptureState::Active)
    }

    pub fn can_transition_to(&self, next: CaptureState) -> bool {
        use CaptureState::*;
        matches!(
            (self, next),
            (Idle, Acquiring) | (Acquiring, Active) | (Acquiring, Idle) | (Active, Stopping) | (Stopping, Idle)
        )
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaptureState::Idle => "idle",
            CaptureState::Acquiring => "acquiring",
            CaptureState::Active => "active",
            CaptureState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Handle returned by a successful start; stop requests must present it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEvent<U> {
    StateChanged(CaptureState),
    Update(U),
    StartFailed { reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SessionId),
    /// A session was already running; nothing new was acquired.
    AlreadyRunning(SessionId),
    Failed,
}

impl StartOutcome {
    pub fn session(&self) -> Option<SessionId> {
        match self {
            StartOutcome::Started(id) | StartOutcome::AlreadyRunning(id) => Some(*id),
            StartOutcome::Failed => None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("device permission denied")]
    Denied,

    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("capability unsupported on this host: {0}")]
    Unsupported(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to release {resource}: {details}")]
pub struct TeardownError {
    pub resource: &'static str,
    pub details: String,
}

impl TeardownError {
    pub fn new<S: Into<String>>(resource: &'static str, details: S) -> Self {
        Self {
            resource,
            details: details.into(),
        }
    }
}

/// State plus the broadcast channel observers subscribe to.
struct Lifecycle<U> {
    kind: &'static str,
    state: CaptureState,
    events: broadcast::Sender<CaptureEvent<U>>,
}

impl<U: Clone> Lifecycle<U> {
    fn new(kind: &'static str, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            kind,
            state: CaptureState::Idle,
            events,
        }
    }

    fn state(&self) -> CaptureState {
        self.state
    }

    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent<U>> {
        self.events.subscribe()
    }

    fn sender(&self) -> broadcast::Sender<CaptureEvent<U>> {
        self.events.clone()
    }

    fn transition(&mut self, next: CaptureState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "{} capture: illegal transition {} -> {}",
            self.kind,
            self.state,
            next
        );
        tracing::debug!(kind = self.kind, from = %self.state, to = %next, "capture state transition");
        self.state = next;
        // No subscribers is fine.
        let _ = self.events.send(CaptureEvent::StateChanged(next));
    }

    fn fail(&mut self, err: &AcquisitionError) {
        tracing::warn!(kind = self.kind, error = %err, "capture failed to start");
        let _ = self.events.send(CaptureEvent::StartFailed {
            reason: err.to_string(),
        });
        self.transition(CaptureState::Idle);
    }
}

/// Holds a lifecycle in `Acquiring` for the duration of a start.
///
/// Dropped while still armed (the start future was abandoned mid-acquisition), it puts the
/// lifecycle back to `Idle` so a later start can proceed.
struct AcquireGuard<'a, U: Clone> {
    lifecycle: &'a mut Lifecycle<U>,
    armed: bool,
}

impl<'a, U: Clone> AcquireGuard<'a, U> {
    fn begin(lifecycle: &'a mut Lifecycle<U>) -> Self {
        lifecycle.transition(CaptureState::Acquiring);
        Self {
            lifecycle,
            armed: true,
        }
    }

    fn activate(mut self) {
        self.armed = false;
        self.lifecycle.transition(CaptureState::Active);
    }

    fn fail(mut self, err: &AcquisitionError) {
        self.armed = false;
        self.lifecycle.fail(err);
    }
}

impl<U: Clone> Drop for AcquireGuard<'_, U> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(kind = self.lifecycle.kind, "capture start abandoned during acquisition");
            self.lifecycle.transition(CaptureState::Idle);
        }
    }
}

/// Locks a handle shared with a sampling loop, recovering from a poisoned lock.
fn lock_shared<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("capture handle lock was poisoned; recovering and continuing");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_follow_the_lifecycle() {
        use CaptureState::*;
        assert!(Idle.can_transition_to(Acquiring));
        assert!(Acquiring.can_transition_to(Active));
        assert!(Acquiring.can_transition_to(Idle));
        assert!(Active.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Active));
        assert!(!Active.can_transition_to(Acquiring));
        assert!(!Active.can_transition_to(Idle));
        assert!(!Stopping.can_transition_to(Active));
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn start_outcome_exposes_session() {
        let id = SessionId::next();
        assert_eq!(StartOutcome::Started(id).session(), Some(id));
        assert_eq!(StartOutcome::AlreadyRunning(id).session(), Some(id));
        assert_eq!(StartOutcome::Failed.session(), None);
    }

    #[test]
    fn failed_start_is_reported_to_subscribers() {
        let mut lifecycle: Lifecycle<()> = Lifecycle::new("test", 8);
        let mut rx = lifecycle.subscribe();
        lifecycle.transition(CaptureState::Acquiring);
        lifecycle.fail(&AcquisitionError::Denied);

        assert_eq!(
            rx.try_recv().ok(),
            Some(CaptureEvent::StateChanged(CaptureState::Acquiring))
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(CaptureEvent::StartFailed {
                reason: "device permission denied".to_owned()
            })
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(CaptureEvent::StateChanged(CaptureState::Idle))
        );
        assert_eq!(lifecycle.state(), CaptureState::Idle);
    }

    #[test]
    fn dropped_acquire_guard_returns_to_idle() {
        let mut lifecycle: Lifecycle<()> = Lifecycle::new("test", 8);
        let mut rx = lifecycle.subscribe();
        drop(AcquireGuard::begin(&mut lifecycle));
        assert_eq!(lifecycle.state(), CaptureState::Idle);

        AcquireGuard::begin(&mut lifecycle).activate();
        assert_eq!(lifecycle.state(), CaptureState::Active);

        let seen: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            seen,
            vec![
                CaptureEvent::StateChanged(CaptureState::Acquiring),
                CaptureEvent::StateChanged(CaptureState::Idle),
                CaptureEvent::StateChanged(CaptureState::Acquiring),
                CaptureEvent::StateChanged(CaptureState::Active),
            ]
        );
    }
}
