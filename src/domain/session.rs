//! Forex trading sessions.

use std::fmt;

use chrono::{DateTime, Duration, Timelike, Utc};

/// Broker clock offset from UTC used to classify sessions when none is given.
pub const DEFAULT_SESSION_OFFSET_HOURS: i64 = 5;

/// Session an entry falls in, judged on the broker clock:
/// Tokyo 05:00-15:00, London 15:00-20:00, New York 20:00-05:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Session {
    Tokyo,
    London,
    NewYork,
}

impl Session {
    pub const ALL: [Session; 3] = [Session::Tokyo, Session::London, Session::NewYork];

    pub fn classify(ts: DateTime<Utc>, offset_hours: i64) -> Self {
        let hour = (ts + Duration::hours(offset_hours)).hour();
        match hour {
            5..=14 => Session::Tokyo,
            15..=19 => Session::London,
            _ => Session::NewYork,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Session::Tokyo => 0,
            Session::London => 1,
            Session::NewYork => 2,
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Tokyo => write!(f, "Tokyo"),
            Session::London => write!(f, "London"),
            Session::NewYork => write!(f, "New York"),
        }
    }
}
