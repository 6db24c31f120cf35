//! Calendar event types.
//!
//! [`EventDraft`] and [`EventPatch`] are what callers send; [`Event`] is what
//! the provider returns. Provider fields this crate does not model are kept
//! in [`Event::extra`] so nothing is lost when an event is passed through.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CalendarError, CalendarResult};

/// Time zone used when a draft does not name one.
pub const DEFAULT_TIME_ZONE: &str = "UTC";

/// A new event to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_time_zone")]
    pub timezone: String,
    /// Attendee email addresses.
    #[serde(default)]
    pub attendees: Vec<String>,
}

fn default_time_zone() -> String {
    DEFAULT_TIME_ZONE.to_string()
}

impl EventDraft {
    pub fn new(summary: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            summary: summary.into(),
            description: None,
            location: None,
            start,
            end,
            timezone: default_time_zone(),
            attendees: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_attendees(mut self, attendees: Vec<String>) -> Self {
        self.attendees = attendees;
        self
    }

    pub fn validate(&self) -> CalendarResult<()> {
        if self.summary.trim().is_empty() {
            return Err(CalendarError::invalid_request("summary is required"));
        }
        if self.end <= self.start {
            return Err(CalendarError::invalid_request(
                "event end must be after its start",
            ));
        }
        validate_time_zone(&self.timezone)?;
        validate_attendees(&self.attendees)
    }

    /// Builds the events.insert request body.
    pub(crate) fn to_api_body(&self) -> ApiEventWrite {
        ApiEventWrite {
            summary: Some(self.summary.clone()),
            description: self.description.clone(),
            location: self.location.clone(),
            start: Some(ApiTimeWrite::new(self.start, &self.timezone)),
            end: Some(ApiTimeWrite::new(self.end, &self.timezone)),
            attendees: attendee_list(&self.attendees),
        }
    }
}

/// A partial update. Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Time zone applied to `start`/`end` when either is set.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.attendees.is_none()
    }

    pub fn validate(&self) -> CalendarResult<()> {
        if self.is_empty() {
            return Err(CalendarError::invalid_request("update has no fields to change"));
        }
        if self.summary.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(CalendarError::invalid_request("summary cannot be blank"));
        }
        if let (Some(start), Some(end)) = (self.start, self.end)
            && end <= start
        {
            return Err(CalendarError::invalid_request(
                "event end must be after its start",
            ));
        }
        if let Some(tz) = &self.timezone {
            validate_time_zone(tz)?;
        }
        if let Some(attendees) = &self.attendees {
            validate_attendees(attendees)?;
        }
        Ok(())
    }

    /// Builds the events.patch request body.
    pub(crate) fn to_api_body(&self) -> ApiEventWrite {
        let tz = self.timezone.as_deref().unwrap_or(DEFAULT_TIME_ZONE);
        ApiEventWrite {
            summary: self.summary.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            start: self.start.map(|start| ApiTimeWrite::new(start, tz)),
            end: self.end.map(|end| ApiTimeWrite::new(end, tz)),
            // An empty list clears the attendees, so it is sent as is.
            attendees: self.attendees.as_ref().map(|emails| {
                emails
                    .iter()
                    .map(|email| ApiAttendeeWrite {
                        email: email.clone(),
                    })
                    .collect()
            }),
        }
    }
}

fn validate_time_zone(tz: &str) -> CalendarResult<()> {
    if tz.trim().is_empty() || tz.contains(char::is_whitespace) {
        return Err(CalendarError::invalid_request(
            "timezone must be an IANA zone name such as UTC or Europe/Paris",
        ));
    }
    Ok(())
}

fn validate_attendees(attendees: &[String]) -> CalendarResult<()> {
    match attendees.iter().find(|email| !looks_like_email(email)) {
        Some(bad) => Err(CalendarError::invalid_request(format!(
            "attendee '{}' is not an email address",
            bad
        ))),
        None => Ok(()),
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn attendee_list(emails: &[String]) -> Option<Vec<ApiAttendeeWrite>> {
    if emails.is_empty() {
        return None;
    }
    Some(
        emails
            .iter()
            .map(|email| ApiAttendeeWrite {
                email: email.clone(),
            })
            .collect(),
    )
}

/// Request body for insert and patch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiEventWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<ApiTimeWrite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<ApiTimeWrite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attendees: Option<Vec<ApiAttendeeWrite>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTimeWrite {
    date_time: String,
    time_zone: String,
}

impl ApiTimeWrite {
    fn new(at: DateTime<Utc>, tz: &str) -> Self {
        Self {
            date_time: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            time_zone: tz.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiAttendeeWrite {
    email: String,
}

/// An event as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    /// Provider fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Start as a UTC instant. All-day events start at midnight UTC.
    pub fn start_utc(&self) -> Option<DateTime<Utc>> {
        self.start.as_ref().and_then(EventTime::to_utc)
    }

    pub fn is_all_day(&self) -> bool {
        self.start.as_ref().is_some_and(|t| t.date.is_some())
    }
}

/// Start or end of an event: a timed instant or an all-day date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match (self.date_time, self.date) {
            (Some(dt), _) => Some(dt.with_timezone(&Utc)),
            (None, Some(date)) => date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventListResponse {
    #[serde(default)]
    pub items: Vec<Event>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}
