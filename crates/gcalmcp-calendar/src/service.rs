//! Credential-aware calendar operations.
//!
//! [`CalendarService`] pairs a [`CredentialResolver`] with a
//! [`CalendarAdapter`]. Every operation resolves a credential, makes the call,
//! and on a provider 401 re-resolves once in forced mode before retrying. A
//! second 401 is returned to the caller as `unauthenticated`.

use std::future::Future;

use gcalmcp_auth::{Credential, CredentialResolver, ScopeSet};
use gcalmcp_core::EventWindow;
use tracing::{debug, warn};

use crate::adapter::CalendarAdapter;
use crate::error::{CalendarErrorCode, CalendarResult};
use crate::types::{Event, EventDraft, EventPatch};

/// Calendar used when none is configured.
pub const DEFAULT_CALENDAR_ID: &str = "primary";

#[derive(Clone)]
pub struct CalendarService {
    resolver: CredentialResolver,
    adapter: CalendarAdapter,
    calendar_id: String,
    scopes: ScopeSet,
}

impl CalendarService {
    /// Creates a service for the primary calendar using the resolver's
    /// default scopes.
    pub fn new(resolver: CredentialResolver, adapter: CalendarAdapter) -> Self {
        Self {
            resolver,
            adapter,
            calendar_id: DEFAULT_CALENDAR_ID.to_string(),
            scopes: ScopeSet::default(),
        }
    }

    pub fn with_calendar_id(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = calendar_id.into();
        self
    }

    pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    pub async fn list_events(&self, window: &EventWindow) -> CalendarResult<Vec<Event>> {
        window.validate()?;
        self.with_credential("list_events", |credential| async move {
            self.adapter
                .list_events(&credential, &self.calendar_id, window)
                .await
        })
        .await
    }

    pub async fn create_event(&self, draft: &EventDraft) -> CalendarResult<Event> {
        // Reject bad input before any credential work.
        draft.validate()?;
        self.with_credential("create_event", |credential| async move {
            self.adapter
                .insert_event(&credential, &self.calendar_id, draft)
                .await
        })
        .await
    }

    pub async fn get_event(&self, event_id: &str) -> CalendarResult<Event> {
        self.with_credential("get_event", |credential| async move {
            self.adapter
                .get_event(&credential, &self.calendar_id, event_id)
                .await
        })
        .await
    }

    pub async fn update_event(&self, event_id: &str, patch: &EventPatch) -> CalendarResult<Event> {
        patch.validate()?;
        self.with_credential("update_event", |credential| async move {
            self.adapter
                .update_event(&credential, &self.calendar_id, event_id, patch)
                .await
        })
        .await
    }

    pub async fn delete_event(&self, event_id: &str) -> CalendarResult<()> {
        self.with_credential("delete_event", |credential| async move {
            self.adapter
                .delete_event(&credential, &self.calendar_id, event_id)
                .await
        })
        .await
    }

    /// Runs `call` with a resolved credential, re-resolving and retrying
    /// exactly once if the provider rejects it.
    async fn with_credential<T, F, Fut>(&self, operation: &'static str, call: F) -> CalendarResult<T>
    where
        F: Fn(Credential) -> Fut,
        Fut: Future<Output = CalendarResult<T>>,
    {
        let credential = self.resolver.resolve(&self.scopes).await?;
        debug!(operation, source = %credential.source, "calling calendar API");
        let sent = credential.access_token.clone();

        match call(credential).await {
            Err(err) if err.code() == CalendarErrorCode::Unauthenticated => {
                warn!(operation, "calendar API rejected the credential, re-resolving once");
                let credential = self
                    .resolver
                    .resolve_forced(&self.scopes, Some(&sent))
                    .await?;
                call(credential).await
            }
            result => result,
        }
    }
}
