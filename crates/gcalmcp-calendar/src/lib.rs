//! Google Calendar operations for gcalmcp.
//!
//! [`CalendarAdapter`] makes single REST calls with a given credential;
//! [`CalendarService`] adds credential resolution and the one-shot retry on a
//! rejected token.

pub mod adapter;
pub mod error;
pub mod service;
pub mod types;

pub use adapter::{CALENDAR_API_BASE, CalendarAdapter};
pub use error::{CalendarError, CalendarErrorCode, CalendarResult};
pub use service::{CalendarService, DEFAULT_CALENDAR_ID};
pub use types::{Attendee, DEFAULT_TIME_ZONE, Event, EventDraft, EventPatch, EventTime};
