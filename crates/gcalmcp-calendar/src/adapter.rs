//! Google Calendar v3 REST adapter.
//!
//! Each method makes exactly one logical provider call with the credential it
//! is given and maps the outcome onto [`CalendarErrorCode`]. Retrying is the
//! caller's business.

use std::time::Duration;

use chrono::SecondsFormat;
use gcalmcp_auth::Credential;
use gcalmcp_core::EventWindow;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::error::{CalendarError, CalendarErrorCode, CalendarResult};
use crate::types::{Event, EventDraft, EventListResponse, EventPatch};

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Reasons Google attaches to a 403 when the caller is throttled rather than
/// forbidden.
const RATE_LIMIT_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "quotaExceeded",
    "dailyLimitExceeded",
];

/// Stateless Google Calendar client.
#[derive(Debug, Clone)]
pub struct CalendarAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl CalendarAdapter {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new(timeout: Duration) -> CalendarResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gcalmcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CalendarError::unknown("failed to create HTTP client").with_source(e))?;
        Ok(Self {
            http,
            base_url: CALENDAR_API_BASE.to_string(),
        })
    }

    /// Points the adapter at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    /// Lists single (expanded) events in `window`, ordered by start time.
    #[instrument(skip(self, credential), level = "debug")]
    pub async fn list_events(
        &self,
        credential: &Credential,
        calendar_id: &str,
        window: &EventWindow,
    ) -> CalendarResult<Vec<Event>> {
        require_id("calendar id", calendar_id)?;
        window.validate()?;

        let max_results = window.max_results();
        let url = self.events_url(calendar_id);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = max_results - events.len();
            let mut query = vec![
                (
                    "timeMin",
                    window.time_min().to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                ("maxResults", remaining.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ];
            if let Some(time_max) = window.time_max() {
                query.push(("timeMax", time_max.to_rfc3339_opts(SecondsFormat::Secs, true)));
            }
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let request = self
                .http
                .get(&url)
                .bearer_auth(&credential.access_token)
                .query(&query);
            let page: EventListResponse = self.send_json(request).await?;
            events.extend(page.items);

            match page.next_page_token {
                Some(token) if events.len() < max_results => page_token = Some(token),
                _ => break,
            }
        }

        events.truncate(max_results);
        debug!("fetched {} events from calendar {}", events.len(), calendar_id);
        Ok(events)
    }

    #[instrument(skip(self, credential, draft), level = "debug")]
    pub async fn insert_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> CalendarResult<Event> {
        require_id("calendar id", calendar_id)?;
        draft.validate()?;

        let request = self
            .http
            .post(self.events_url(calendar_id))
            .bearer_auth(&credential.access_token)
            .json(&draft.to_api_body());
        let event: Event = self.send_json(request).await?;
        debug!("created event {}", event.id);
        Ok(event)
    }

    #[instrument(skip(self, credential), level = "debug")]
    pub async fn get_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        event_id: &str,
    ) -> CalendarResult<Event> {
        require_id("calendar id", calendar_id)?;
        require_id("event id", event_id)?;

        let request = self
            .http
            .get(self.event_url(calendar_id, event_id))
            .bearer_auth(&credential.access_token);
        self.send_json(request).await
    }

    /// Applies a partial update (events.patch).
    #[instrument(skip(self, credential, patch), level = "debug")]
    pub async fn update_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> CalendarResult<Event> {
        require_id("calendar id", calendar_id)?;
        require_id("event id", event_id)?;
        patch.validate()?;

        let request = self
            .http
            .patch(self.event_url(calendar_id, event_id))
            .bearer_auth(&credential.access_token)
            .json(&patch.to_api_body());
        self.send_json(request).await
    }

    #[instrument(skip(self, credential), level = "debug")]
    pub async fn delete_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        event_id: &str,
    ) -> CalendarResult<()> {
        require_id("calendar id", calendar_id)?;
        require_id("event id", event_id)?;

        let request = self
            .http
            .delete(self.event_url(calendar_id, event_id))
            .bearer_auth(&credential.access_token);
        let response = self.send(request).await?;
        debug!("deleted event {} ({})", event_id, response.status());
        Ok(())
    }

    /// Sends a request and returns the response if its status is a success.
    async fn send(&self, request: reqwest::RequestBuilder) -> CalendarResult<reqwest::Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_failure(status.as_u16(), &body);
        if err.code() == CalendarErrorCode::Unknown {
            warn!(status = status.as_u16(), body = %body, "unexpected calendar API response");
        } else {
            debug!(status = status.as_u16(), body = %body, "calendar API error");
        }
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> CalendarResult<T> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "calendar API returned an unparsable body");
            CalendarError::unknown("calendar API returned an unparsable response").with_source(e)
        })
    }
}

fn require_id(what: &str, id: &str) -> CalendarResult<()> {
    if id.trim().is_empty() {
        return Err(CalendarError::invalid_request(format!("{} is required", what)));
    }
    Ok(())
}

fn transport_error(e: reqwest::Error) -> CalendarError {
    let message = if e.is_timeout() {
        "calendar API request timed out"
    } else if e.is_connect() {
        "could not connect to calendar API"
    } else {
        "calendar API request failed"
    };
    CalendarError::provider_unavailable(message).with_source(e)
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

fn is_rate_limited(body: &str) -> bool {
    serde_json::from_str::<ApiErrorEnvelope>(body).is_ok_and(|envelope| {
        envelope
            .error
            .errors
            .iter()
            .filter_map(|item| item.reason.as_deref())
            .any(|reason| RATE_LIMIT_REASONS.contains(&reason))
    })
}

/// Maps a non-success status onto the error taxonomy.
fn classify_failure(status: u16, body: &str) -> CalendarError {
    let err = match status {
        401 => CalendarError::unauthenticated("calendar API rejected the credential"),
        404 | 410 => CalendarError::not_found("event or calendar not found"),
        400 | 422 => CalendarError::invalid_request("calendar API rejected the request"),
        429 => CalendarError::provider_unavailable("calendar API rate limit exceeded"),
        403 if is_rate_limited(body) => {
            CalendarError::provider_unavailable("calendar API rate limit exceeded")
        }
        500..=599 => CalendarError::provider_unavailable("calendar API is unavailable"),
        _ => CalendarError::unknown("calendar API returned an unexpected status"),
    };
    err.with_status(status)
}
