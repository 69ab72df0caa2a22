//! Fixed templates for augmented messages
//!
//! Clients and golden tests depend on these strings byte for byte; only the
//! interpolated query, payload and timestamp vary between requests.

use chrono::{DateTime, TimeZone};
use std::fmt::Display;

/// Separator between the user's query and the retrieved document text
pub const DOCUMENT_SEPARATOR: &str = "\n Document: ";

/// Build the message content for a document reference lookup
pub fn reference_message(query: &str, document: &str) -> String {
    format!("{query}{DOCUMENT_SEPARATOR}{document}")
}

/// Build the message content for a realtime search
///
/// `results` is the serialized search payload and `current_date` the
/// formatted wall-clock time (see [`format_current_date`]).
pub fn realtime_message(query: &str, results: &str, current_date: &str) -> String {
    format!(
        "Web search results:\n\n {results}\nCurrent date:{current_date}\n\n\
         Instructions:Using the provided web search results, write a comprehensive reply to the given query: {query}. \
         Make sure to cite results using [[number](URL)] notation after the reference. \
         If the provided search results refer to multiple subjects with the same name, \
         write separate answers for each subject.\nQuery:{query} "
    )
}

/// Human-readable timestamp, e.g. `Mon Oct 19 2026 14:03:00 GMT+0000`
pub fn format_current_date<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    now.format("%a %b %d %Y %H:%M:%S GMT%z").to_string()
}
