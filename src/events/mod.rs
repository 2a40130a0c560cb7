//! # Course Events
//!
//! Notifications emitted after a state transition so collaborators
//! (progress tracking, emails) can react:
//! - lesson and quiz creation by the course structure reconciler
//! - enrolment changes detected by the enrolment manager

mod sink;

pub use sink::{EventSink, MemoryEventSink, NullEventSink, TracingEventSink};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::store::{EntityId, UserId};

/// A course-level notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CourseEvent {
    /// A lesson was created under a course
    LessonCreated { lesson: EntityId, course: EntityId },

    /// A quiz was created for a lesson
    QuizCreated { quiz: EntityId, lesson: EntityId },

    /// A learner's enrolment decision for a course changed
    EnrolmentChanged {
        learner: UserId,
        course: EntityId,
        is_enrolled: bool,
    },
}

impl CourseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CourseEvent::LessonCreated { .. } => "LESSON_CREATED",
            CourseEvent::QuizCreated { .. } => "QUIZ_CREATED",
            CourseEvent::EnrolmentChanged { .. } => "ENROLMENT_CHANGED",
        }
    }
}

impl fmt::Display for CourseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An emitted event with its identity and time
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: CourseEvent,
}

impl EventRecord {
    pub fn new(event: CourseEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            emitted_at: Utc::now(),
            event,
        }
    }

    /// Serialize to a JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_is_flat() {
        let record = EventRecord::new(CourseEvent::EnrolmentChanged {
            learner: 3,
            course: 9,
            is_enrolled: true,
        });
        let value: serde_json::Value = serde_json::from_str(&record.to_json()).unwrap();

        assert_eq!(value["event"], "enrolment_changed");
        assert_eq!(value["learner"], 3);
        assert_eq!(value["course"], 9);
        assert_eq!(value["is_enrolled"], true);
        assert!(value["id"].is_string());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(
            CourseEvent::LessonCreated { lesson: 1, course: 2 }.to_string(),
            "LESSON_CREATED"
        );
        assert_eq!(CourseEvent::QuizCreated { quiz: 1, lesson: 2 }.name(), "QUIZ_CREATED");
    }
}
