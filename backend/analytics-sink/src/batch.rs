use event_schema::Event;

use crate::source::{OffsetTracker, SourceMessage};

/// Events consumed since the last successful flush, with the offsets to
/// commit once they are stored.
#[derive(Debug)]
pub struct Batch {
    events: Vec<Event>,
    offsets: OffsetTracker,
    last_position: Option<(String, i32, i64)>,
    capacity: usize,
}

impl Batch {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Vec::with_capacity(capacity),
            offsets: OffsetTracker::default(),
            last_position: None,
            capacity,
        }
    }

    pub fn push(&mut self, event: Event, message: &SourceMessage) {
        self.offsets
            .record(&message.topic, message.partition, message.offset);
        self.last_position = Some((message.topic.clone(), message.partition, message.offset));
        self.events.push(event);
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn offsets(&self) -> &OffsetTracker {
        &self.offsets
    }

    /// (topic, partition, offset) of the most recent message accepted
    pub fn last_position(&self) -> Option<&(String, i32, i64)> {
        self.last_position.as_ref()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.offsets.clear();
        self.last_position = None;
    }
}
