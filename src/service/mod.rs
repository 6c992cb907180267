use std::backtrace::Backtrace;

use chrono::{NaiveDateTime, Utc};

pub mod evidence_service;
pub mod folder_metadata_service;
pub mod move_service;
pub mod node_service;
pub mod search_service;

#[cfg(test)]
mod tests;

/// the timestamp recorded for every change. Stored without a timezone, always utc
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// logs an unexpected database failure with a backtrace. `action` finishes the sentence "Failed to ..."
pub(crate) fn log_db_error(action: &str, e: &rusqlite::Error) {
    log::error!(
        "Failed to {action}. Exception is {e:?}\n{}",
        Backtrace::force_capture()
    );
}
