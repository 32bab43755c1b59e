//! Remote attempt log and member lookup over a Supabase/PostgREST API.
//!
//! The remote service is optional. When it is not configured, or the client
//! cannot be built, [`RemoteLog`] stays disabled and every call is a no-op.

use crate::{AttemptSink, SinkError};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use turnstile_core::{AttemptRecord, UNKNOWN};

const MEMBER_COLUMNS: &str = "member_id,name,premium_tier,membership_status";
/// Template values shipped in example configs; treated as "not configured".
const URL_PLACEHOLDER: &str = "YOUR-PROJECT";
const KEY_PLACEHOLDER: &str = "YOUR_SUPABASE";

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub key: String,
    pub logs_table: String,
    pub members_table: String,
    pub timeout: Duration,
}

impl RemoteConfig {
    /// True when both URL and key are set to something other than the template placeholders.
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
            && !self.key.trim().is_empty()
            && !self.url.contains(URL_PLACEHOLDER)
            && !self.key.contains(KEY_PLACEHOLDER)
    }
}

/// A row of the members table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub member_id: serde_json::Value,
    pub name: String,
    pub premium_tier: Option<String>,
    pub membership_status: Option<String>,
}

struct RestClient {
    http: Client,
    base_url: String,
    logs_table: String,
    members_table: String,
}

impl RestClient {
    fn build(config: &RemoteConfig) -> Result<Self, SinkError> {
        let key = config.key.trim();
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(key).map_err(|e| SinkError::InvalidConfig(format!("api key: {e}")))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| SinkError::InvalidConfig(format!("api key: {e}")))?,
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            logs_table: config.logs_table.clone(),
            members_table: config.members_table.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn insert(&self, record: &AttemptRecord) -> Result<(), SinkError> {
        self.http
            .post(self.table_url(&self.logs_table))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn member(&self, name: &str) -> Result<Option<MemberRecord>, SinkError> {
        let filter = format!("ilike.{name}");
        let rows: Vec<MemberRecord> = self
            .http
            .get(self.table_url(&self.members_table))
            .query(&[
                ("select", MEMBER_COLUMNS),
                ("name", filter.as_str()),
                ("limit", "1"),
            ])
            .send()?
            .error_for_status()?
            .json()?;
        Ok(rows.into_iter().next())
    }
}

/// Remote attempt sink plus member lookup. Disabled when unconfigured.
pub struct RemoteLog {
    client: Option<RestClient>,
}

impl RemoteLog {
    pub fn connect(config: &RemoteConfig) -> Self {
        if !config.is_configured() {
            tracing::info!("remote attempt log not configured; logging locally only");
            return Self::disabled();
        }

        match RestClient::build(config) {
            Ok(client) => {
                tracing::info!(url = %client.base_url, table = %client.logs_table, "remote attempt log enabled");
                Self { client: Some(client) }
            }
            Err(e) => {
                tracing::warn!(error = %e, "remote attempt log disabled");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    /// Look up a member by case-insensitive name.
    ///
    /// `None` when disabled, for the unknown identity, or on any failure.
    pub fn query_member(&self, name: &str) -> Option<MemberRecord> {
        let client = self.client.as_ref()?;
        let name = name.trim();
        if name.is_empty() || name == UNKNOWN {
            return None;
        }

        match client.member(name) {
            Ok(member) => member,
            Err(e) => {
                tracing::warn!(name, error = %e, "member lookup failed");
                None
            }
        }
    }
}

impl AttemptSink for RemoteLog {
    fn name(&self) -> &str {
        "remote"
    }

    fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    fn record(&mut self, record: &AttemptRecord) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        match client.insert(record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "remote attempt insert failed");
                false
            }
        }
    }
}
