//! Domain entities

mod calendar_event;
mod credential;
mod record_dates;
mod reminder;

pub use calendar_event::{CalendarEvent, EventType};
pub use credential::Credential;
pub use record_dates::{DateSlot, RecordDates};
pub use reminder::Reminder;
