use crate::task::Task;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;

/// Names a callback can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TaskStart,
    TaskComplete,
    TaskFail,
    TaskSkip,
    Pause,
    Resume,
    Stop,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::TaskStart,
        EventKind::TaskComplete,
        EventKind::TaskFail,
        EventKind::TaskSkip,
        EventKind::Pause,
        EventKind::Resume,
        EventKind::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskStart => "on_task_start",
            EventKind::TaskComplete => "on_task_complete",
            EventKind::TaskFail => "on_task_fail",
            EventKind::TaskSkip => "on_task_skip",
            EventKind::Pause => "on_pause",
            EventKind::Resume => "on_resume",
            EventKind::Stop => "on_stop",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown event: {}", s))
    }
}

/// Payload handed to subscribers. Task events carry a snapshot taken
/// right after the transition.
#[derive(Debug, Clone)]
pub enum Event {
    TaskStart(Task),
    TaskComplete(Task),
    TaskFail(Task, String),
    TaskSkip(Task),
    Pause,
    Resume,
    Stop,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TaskStart(_) => EventKind::TaskStart,
            Event::TaskComplete(_) => EventKind::TaskComplete,
            Event::TaskFail(..) => EventKind::TaskFail,
            Event::TaskSkip(_) => EventKind::TaskSkip,
            Event::Pause => EventKind::Pause,
            Event::Resume => EventKind::Resume,
            Event::Stop => EventKind::Stop,
        }
    }

    pub fn task(&self) -> Option<&Task> {
        match self {
            Event::TaskStart(task)
            | Event::TaskComplete(task)
            | Event::TaskFail(task, _)
            | Event::TaskSkip(task) => Some(task),
            _ => None,
        }
    }
}

pub type Callback = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Ordered subscriber lists per event.
#[derive(Default)]
pub struct Callbacks {
    subscribers: RwLock<HashMap<EventKind, Vec<Callback>>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.subscribers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Call every subscriber of the event in registration order. Errors and
    /// panics are logged and swallowed.
    pub fn fire(&self, event: &Event) {
        let kind = event.kind();
        let subscribers = match self.subscribers.read().get(&kind) {
            Some(list) => list.clone(),
            None => return,
        };

        for callback in subscribers {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Error in callback {}: {:#}", kind, e),
                Err(_) => error!("Callback {} panicked", kind),
            }
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self.subscribers.read();
        let mut map = f.debug_map();
        for (kind, list) in subscribers.iter() {
            map.entry(&kind.as_str(), &list.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("on_finish".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let callbacks = Callbacks::new();
        let hits = Arc::new(AtomicUsize::new(0));

        callbacks.register(EventKind::Pause, |_| anyhow::bail!("boom"));
        callbacks.register(EventKind::Pause, |_| panic!("worse"));
        let counter = hits.clone();
        callbacks.register(EventKind::Pause, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        callbacks.fire(&Event::Pause);
        callbacks.fire(&Event::Resume);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(callbacks.count(EventKind::Pause), 3);
    }
}
