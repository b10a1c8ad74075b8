//! Store-assigned timestamps.
//!
//! Callers never supply `created_at`. Every row gets a value from [`Clock`],
//! which hands out strictly increasing millisecond timestamps so that
//! ordering rows by `created_at` reproduces arrival order across tables.

use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, Utc};
use xferlog_shared::constants::TIMESTAMP_FORMAT;

use crate::error::{Result, StoreError};

// Accepts both the stored layout and a bare `%S` without fraction.
const PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) struct Clock {
    last_ms: Mutex<i64>,
}

impl Clock {
    /// Start a clock that never hands out a value at or before `latest`.
    pub(crate) fn resume_from(latest: Option<NaiveDateTime>) -> Self {
        let last_ms = latest
            .map(|ts| ts.and_utc().timestamp_millis())
            .unwrap_or(i64::MIN);
        Self {
            last_ms: Mutex::new(last_ms),
        }
    }

    pub(crate) fn now(&self) -> Result<NaiveDateTime> {
        let wall = Utc::now().timestamp_millis();
        let mut last = self
            .last_ms
            .lock()
            .map_err(|_| StoreError::LockPoisoned("clock"))?;

        // wall clock may stand still or step backwards
        let next = wall.max(last.saturating_add(1));
        *last = next;

        DateTime::from_timestamp_millis(next)
            .map(|dt| dt.naive_utc())
            .ok_or(StoreError::ClockOutOfRange(next))
    }
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s.trim(), PARSE_FORMAT)
}

/// Read a timestamp column, mapping parse failures to a conversion error.
pub(crate) fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let s: String = row.get(idx)?;
    parse_timestamp(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
