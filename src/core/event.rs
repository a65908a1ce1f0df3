/// Structured progress events for a backup task
///
/// Every stage reports start/success/failure through an [`EventLogger`] so
/// operators can follow a task even when some versions fail.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Starting,
    Success,
    Failure,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Starting => "starting",
            EventStatus::Success => "success",
            EventStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait EventLogger: Send + Sync {
    fn info(&self, message: &str, step: &str, status: EventStatus);
    fn error(&self, message: &str, step: &str, status: EventStatus);
}

/// Event logger backed by `tracing`, tagged with the task's event id
#[derive(Debug, Clone)]
pub struct TracingEventLogger {
    event_id: String,
}

impl TracingEventLogger {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
        }
    }
}

impl EventLogger for TracingEventLogger {
    fn info(&self, message: &str, step: &str, status: EventStatus) {
        tracing::info!(event_id = %self.event_id, step, status = %status, "{}", message);
    }

    fn error(&self, message: &str, step: &str, status: EventStatus) {
        tracing::error!(event_id = %self.event_id, step, status = %status, "{}", message);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingLogger;
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(EventStatus::Starting.to_string(), "starting");
        assert_eq!(EventStatus::Failure.as_str(), "failure");
    }

    #[test]
    fn test_recording_logger() {
        let logger = RecordingLogger::default();
        logger.info("Start backup plugin", "backup_builder", EventStatus::Starting);
        logger.error("plugin pull failed", "backup_builder", EventStatus::Failure);

        let events = logger.events();
        assert_eq!(events.len(), 2);
        assert!(!events[0].error);
        assert!(events[1].error);
        assert!(logger.contains("pull failed"));
    }
}
