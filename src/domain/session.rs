//! Taiwan market session status.
//!
//! Taipei is UTC+8 all year. Regular trading runs 09:00 to 13:30 on
//! weekdays; exchange holidays are not modelled.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Timelike, Utc, Weekday};
use std::fmt;

const TAIPEI_OFFSET_SECS: i64 = 8 * 3600;
const OPEN_SECS: u32 = 9 * 3600;
const CLOSE_SECS: u32 = 13 * 3600 + 30 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketSession {
    Weekend,
    PreOpen,
    Open,
    Closed,
}

impl MarketSession {
    /// Whether the latest available daily bar belongs to a previous session.
    pub fn serves_previous_session(self) -> bool {
        matches!(self, MarketSession::Weekend | MarketSession::PreOpen)
    }
}

impl fmt::Display for MarketSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketSession::Weekend => write!(f, "closed (weekend)"),
            MarketSession::PreOpen => write!(f, "pre-open"),
            MarketSession::Open => write!(f, "open"),
            MarketSession::Closed => write!(f, "closed for the day"),
        }
    }
}

/// Wall-clock time in Taipei for `instant`.
pub fn taipei_local<Tz: TimeZone>(instant: &DateTime<Tz>) -> NaiveDateTime {
    instant.naive_utc() + Duration::seconds(TAIPEI_OFFSET_SECS)
}

pub fn session_at<Tz: TimeZone>(instant: &DateTime<Tz>) -> MarketSession {
    let local = taipei_local(instant);
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return MarketSession::Weekend;
    }
    let secs = local.num_seconds_from_midnight();
    if secs < OPEN_SECS {
        MarketSession::PreOpen
    } else if secs < CLOSE_SECS {
        MarketSession::Open
    } else {
        MarketSession::Closed
    }
}

pub fn current_session() -> MarketSession {
    session_at(&Utc::now())
}
