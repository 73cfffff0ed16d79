//! Build progress events and the sink capability that receives them.
//!
//! The build core never talks to a global bus. Whoever drives a build hands
//! the engine an [`EventSink`]; the engine and step runner post to it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Mutex, PoisonError};
use std::time::Duration;

use crate::target::BuildTarget;

/// Identity shared by a started event and its matching finished event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EventId(u64);

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

impl EventId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifying data carried by both halves of a step event pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepEventInfo {
    /// Pairs a start event with its finish event.
    pub id: EventId,
    /// Short step name, e.g. `javac` or `mkdir`.
    pub short_name: String,
    /// Human-readable description of what the step does.
    pub description: String,
    /// The rule the step runs for, if any.
    pub target: Option<BuildTarget>,
}

/// Progress events emitted during a build.
#[derive(Clone, Debug, PartialEq)]
pub enum BuildEvent {
    /// A build of the originally requested targets began.
    BuildStarted {
        /// Target arguments as the user requested them.
        targets: Vec<String>,
    },
    /// The build finished.
    BuildFinished {
        /// Target arguments as the user requested them.
        targets: Vec<String>,
        /// Aggregate exit code (0 = success).
        exit_code: i32,
        /// Wall-clock time of the build.
        elapsed: Duration,
    },
    /// A rule was admitted for execution.
    RuleStarted {
        /// The rule.
        target: BuildTarget,
    },
    /// A rule reached a terminal state.
    RuleFinished {
        /// The rule.
        target: BuildTarget,
        /// Whether it ended in a success state.
        success: bool,
        /// Short outcome label, e.g. `BUILT_LOCALLY` or `FAILED`.
        status: String,
    },
    /// A step is about to execute.
    StepStarted(StepEventInfo),
    /// A step finished executing (successfully or not).
    StepFinished {
        /// Same info as the matching [`BuildEvent::StepStarted`].
        step: StepEventInfo,
        /// The step's exit code; `-1` when it failed without one.
        exit_code: i32,
    },
}

impl BuildEvent {
    /// Returns `true` if both events are halves of the same step execution.
    pub fn is_related_to(&self, other: &BuildEvent) -> bool {
        match (self.step_id(), other.step_id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn step_id(&self) -> Option<EventId> {
        match self {
            BuildEvent::StepStarted(info) => Some(info.id),
            BuildEvent::StepFinished { step, .. } => Some(step.id),
            _ => None,
        }
    }
}

/// Receives build events. Implementations must tolerate calls from many
/// worker threads at once.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn post(&self, event: BuildEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn post(&self, _event: BuildEvent) {}
}

/// Accumulates events in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<BuildEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all events received so far.
    pub fn events(&self) -> Vec<BuildEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.clone()
    }

    /// Takes all accumulated events, leaving the sink empty.
    pub fn take_all(&self) -> Vec<BuildEvent> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *events)
    }
}

impl EventSink for CollectingEventSink {
    fn post(&self, event: BuildEvent) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.push(event);
    }
}

/// Forwards events over a channel. A disconnected receiver is ignored.
impl EventSink for mpsc::Sender<BuildEvent> {
    fn post(&self, event: BuildEvent) {
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: EventId) -> StepEventInfo {
        StepEventInfo {
            id,
            short_name: "step1".to_string(),
            description: "fake step 1".to_string(),
            target: None,
        }
    }

    #[test]
    fn event_ids_are_unique() {
        let a = EventId::next();
        let b = EventId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn started_and_finished_are_related() {
        let info = step(EventId::next());
        let started = BuildEvent::StepStarted(info.clone());
        let finished = BuildEvent::StepFinished {
            step: info,
            exit_code: 0,
        };
        assert!(started.is_related_to(&finished));
        assert!(finished.is_related_to(&started));
    }

    #[test]
    fn different_steps_are_unrelated() {
        let a = BuildEvent::StepStarted(step(EventId::next()));
        let b = BuildEvent::StepStarted(step(EventId::next()));
        assert!(!a.is_related_to(&b));
    }

    #[test]
    fn build_events_are_never_related() {
        let a = BuildEvent::BuildStarted { targets: vec![] };
        let b = BuildEvent::BuildStarted { targets: vec![] };
        assert!(!a.is_related_to(&b));
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let sink = CollectingEventSink::new();
        sink.post(BuildEvent::BuildStarted {
            targets: vec!["//:a".to_string()],
        });
        sink.post(BuildEvent::BuildFinished {
            targets: vec!["//:a".to_string()],
            exit_code: 0,
            elapsed: Duration::from_millis(5),
        });
        let events = sink.take_all();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], BuildEvent::BuildStarted { .. }));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn channel_sink_forwards() {
        let (tx, rx) = mpsc::channel();
        tx.post(BuildEvent::BuildStarted { targets: vec![] });
        assert!(matches!(rx.recv().unwrap(), BuildEvent::BuildStarted { .. }));
    }
}
