//! Calendar-day grouping and sender clustering for display.
//!
//! Pure functions over an already-loaded page: no I/O, no hidden
//! clock — "today" and the timezone come in as parameters so callers
//! (and tests) control both.

use chrono::{NaiveDate, TimeZone};
use uuid::Uuid;

use parley_types::models::{DayGroup, Message};

/// Bucket messages by the calendar day of `created_at` in `tz`.
///
/// One group per distinct date, in the order the date first appears.
/// The caller must pass `messages` sorted ascending by (created_at,
/// id) — the chronological group order falls out of the input order;
/// nothing is sorted here.
pub fn group_by_day<Tz: TimeZone>(
    messages: &[Message],
    tz: &Tz,
    today: NaiveDate,
) -> Vec<DayGroup> {
    let mut dated: Vec<(NaiveDate, DayGroup)> = Vec::new();
    for message in messages {
        let date = message.created_at.with_timezone(tz).date_naive();
        match dated.iter_mut().find(|(d, _)| *d == date) {
            Some((_, group)) => group.messages.push(message.clone()),
            None => dated.push((
                date,
                DayGroup {
                    label: day_label(date, today),
                    messages: vec![message.clone()],
                },
            )),
        }
    }
    dated.into_iter().map(|(_, group)| group).collect()
}

/// "Today", "Yesterday", or an absolute date like "Jan 20, 2024".
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if Some(date) == today.pred_opt() {
        "Yesterday".to_string()
    } else {
        date.format("%b %-d, %Y").to_string()
    }
}

/// A run of consecutive messages from one sender.
///
/// Display layers render the sender identity on the first message of a
/// run only. This sits on top of day grouping, not inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct SenderRun {
    pub sender_id: Uuid,
    pub messages: Vec<Message>,
}

pub fn sender_runs(messages: &[Message]) -> Vec<SenderRun> {
    let mut runs: Vec<SenderRun> = Vec::new();
    for message in messages {
        match runs.last_mut() {
            Some(run) if run.sender_id == message.sender_id => {
                run.messages.push(message.clone());
            }
            _ => runs.push(SenderRun {
                sender_id: message.sender_id,
                messages: vec![message.clone()],
            }),
        }
    }
    runs
}
