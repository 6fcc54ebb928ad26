//! Supabase (PostgREST) remote store client.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::entity::EntityKind;
use super::error::{SyncError, SyncResult};
use super::remote::{parse_verdicts, RemoteStore, UpsertVerdict};
use crate::auth::AuthSession;
use crate::config::RemoteConfig;
use crate::models::{SyncCursor, UserId};
use crate::util::compact_text;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct SupabaseRemote {
    rest_url: String,
    anon_key: String,
    client: Client,
}

impl std::fmt::Debug for SupabaseRemote {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupabaseRemote")
            .field("rest_url", &self.rest_url)
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SupabaseRemote {
    pub fn new(config: &RemoteConfig) -> SyncResult<Self> {
        Ok(Self {
            rest_url: config.rest_url(),
            anon_key: config.anon_key().to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
        })
    }

    fn authorized(&self, request: RequestBuilder, session: &AuthSession) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .header("Accept", "application/json")
    }

    async fn send_json(&self, request: RequestBuilder) -> SyncResult<Vec<Value>> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::api(status, parse_api_error(status, &body)));
        }

        match response.json::<Value>().await? {
            Value::Array(rows) => Ok(rows),
            other => Err(SyncError::Protocol(format!(
                "expected a JSON array, got {}",
                compact_text(&other.to_string())
            ))),
        }
    }
}

impl RemoteStore for SupabaseRemote {
    async fn upsert(
        &self,
        kind: EntityKind,
        session: &AuthSession,
        items: &[Value],
    ) -> SyncResult<Vec<UpsertVerdict>> {
        let request = self.authorized(
            self.client
                .post(format!("{}/rpc/{}", self.rest_url, kind.upsert_rpc()))
                .json(&serde_json::json!({ "items": items })),
            session,
        );
        let rows = self.send_json(request).await?;
        parse_verdicts(kind, &rows)
    }

    async fn pull(
        &self,
        kind: EntityKind,
        session: &AuthSession,
        user: &UserId,
        cursor: &SyncCursor,
        limit: usize,
    ) -> SyncResult<Vec<Value>> {
        let url = format!(
            "{}/{}?{}",
            self.rest_url,
            kind.remote_table(),
            pull_query(kind, user, cursor, limit)
        );
        self.send_json(self.authorized(self.client.get(url), session))
            .await
    }
}

/// PostgREST query selecting rows strictly after `cursor` by `(updated_at, id)`.
pub fn pull_query(kind: EntityKind, user: &UserId, cursor: &SyncCursor, limit: usize) -> String {
    let id_column = kind.remote_id_column();
    // Values are quoted because timestamps contain PostgREST delimiters
    let after = format!(
        "(updated_at.gt.\"{ts}\",and(updated_at.eq.\"{ts}\",{id_column}.gt.\"{id}\"))",
        ts = cursor.last_synced_at,
        id = cursor.last_id,
    );
    format!(
        "user_id=eq.{}&or={}&order=updated_at.asc,{id_column}.asc&limit={limit}",
        urlencoding::encode(user.as_str()),
        urlencoding::encode(&after),
    )
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorResponse {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
    error: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorResponse>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            let extra = payload.details.or(payload.hint);
            return match extra {
                Some(extra) if !extra.trim().is_empty() => {
                    format!("{} ({})", message.trim(), compact_text(&extra))
                }
                _ => message.trim().to_string(),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}
