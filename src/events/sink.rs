//! Event sinks.

use std::sync::{Arc, Mutex};

use super::{CourseEvent, EventRecord};

/// Destination for course events.
///
/// Emission happens after the triggering write is durable; a sink never
/// influences the outcome of the operation that emitted.
pub trait EventSink: Send + Sync {
    fn emit(&self, record: &EventRecord);
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _record: &EventRecord) {}
}

/// Sink that forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, record: &EventRecord) {
        tracing::info!(
            event_id = %record.id,
            event = record.event.name(),
            payload = %record.to_json(),
            "course event"
        );
    }
}

/// In-memory sink for testing
#[derive(Debug, Default, Clone)]
pub struct MemoryEventSink {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Recorded events without their envelopes
    pub fn events(&self) -> Vec<CourseEvent> {
        self.records().into_iter().map(|r| r.event).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, record: &EventRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemoryEventSink::new();
        sink.emit(&EventRecord::new(CourseEvent::LessonCreated { lesson: 1, course: 2 }));
        sink.emit(&EventRecord::new(CourseEvent::QuizCreated { quiz: 3, lesson: 1 }));

        assert_eq!(
            sink.events(),
            vec![
                CourseEvent::LessonCreated { lesson: 1, course: 2 },
                CourseEvent::QuizCreated { quiz: 3, lesson: 1 },
            ]
        );

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_cloned_sink_shares_records() {
        let sink = MemoryEventSink::new();
        let handle = sink.clone();
        handle.emit(&EventRecord::new(CourseEvent::LessonCreated { lesson: 1, course: 2 }));
        assert_eq!(sink.len(), 1);
    }
}
