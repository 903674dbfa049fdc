use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders instants in the configured zone, or the host's local zone when
/// none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock {
    tz: Option<Tz>,
}

impl LocalClock {
    pub fn new(tz: Option<Tz>) -> Self {
        Self { tz }
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub fn format(&self, at: DateTime<Utc>, fmt: &str) -> String {
        match self.tz {
            Some(tz) => at.with_timezone(&tz).format(fmt).to_string(),
            None => at.with_timezone(&Local).format(fmt).to_string(),
        }
    }

    pub fn timestamp(&self, at: DateTime<Utc>) -> String {
        self.format(at, TIMESTAMP_FORMAT)
    }
}
