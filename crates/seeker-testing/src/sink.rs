use std::sync::{Arc, Mutex};

use seeker_types::{EventKind, EventSink, ResearchEvent};

/// Sink that records every event for later assertions.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ResearchEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ResearchEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind()).collect()
    }

    pub fn count_of(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn has(&self, kind: EventKind) -> bool {
        self.count_of(kind) > 0
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: ResearchEvent) {
        self.events.lock().unwrap().push(event);
    }
}
