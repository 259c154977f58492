//! Movement fetch: a single POST against the push-messaging storage
//! endpoint the upstream system repurposed to hold transaction history.
//!
//! The contract is unofficial. A non-success status is an error, but a
//! success body whose nesting does not match the expected shape degrades
//! to an empty ledger: the missing key is reported as a diagnostic, never
//! thrown.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use cartola_core::{DailyLedger, LedgerEntry};
use cartola_ingest::NotificationParser;

use crate::error::{ClientError, Stage};
use crate::token::AccessToken;

pub const MOVEMENTS_URL: &str =
    "https://api-dsk.santander.cl/perdsk/datosCliente/mensajeriaPush/serviciosAlmacenamiento";

const CLIENT_ID_HEADER: &str = "x-santander-client-id";

/// One raw notification record. The body is opaque free text; transaction
/// semantics are inferred downstream. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub id: i64,
    #[serde(default)]
    pub public_content_text: String,
    #[serde(default)]
    pub private_content_text: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub ts_create: i64,
    #[serde(default)]
    pub ts_update: i64,
}

impl RawRecord {
    /// Creation timestamp (upstream stores epoch milliseconds).
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.ts_create).single()
    }
}

/// Which level of the expected response nesting was missing when a
/// successful response degraded to an empty result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeIssue {
    MissingData,
    MissingListContentsResponse,
    MissingReturn,
    MissingContents,
}

impl ShapeIssue {
    pub fn missing_key(self) -> &'static str {
        match self {
            ShapeIssue::MissingData => "DATA",
            ShapeIssue::MissingListContentsResponse => "ns2:listContentsResponse",
            ShapeIssue::MissingReturn => "return",
            ShapeIssue::MissingContents => "contents",
        }
    }
}

/// Walk the response body down to the record array. Any missing level
/// yields an empty list plus the diagnostic naming the absent key.
/// Individual records that fail to deserialize are skipped.
pub fn extract_records(body: &Value) -> (Vec<RawRecord>, Option<ShapeIssue>) {
    let Some(data) = body.get("DATA") else {
        return (Vec::new(), Some(ShapeIssue::MissingData));
    };
    let Some(list) = data.get("ns2:listContentsResponse") else {
        return (Vec::new(), Some(ShapeIssue::MissingListContentsResponse));
    };
    let Some(ret) = list.get("return") else {
        return (Vec::new(), Some(ShapeIssue::MissingReturn));
    };
    let Some(contents) = ret.get("contents").and_then(Value::as_array) else {
        return (Vec::new(), Some(ShapeIssue::MissingContents));
    };

    let records = contents
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect();
    (records, None)
}

/// Classify each record's text and fold the results into a per-date
/// ledger, preserving arrival order. Records without a parseable date or
/// amount are dropped silently.
pub fn fold_records(parser: &NotificationParser, records: &[RawRecord]) -> DailyLedger {
    let mut ledger = DailyLedger::new();
    let mut skipped = 0usize;
    for record in records {
        match parser.parse(&record.public_content_text) {
            Some(m) => ledger.push(
                &m.date,
                m.category,
                LedgerEntry::new(m.amount, m.description),
            ),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(skipped, "records without a date or amount were dropped");
    }
    ledger
}

pub struct LedgerFetcher {
    client: Client,
    url: String,
    parser: NotificationParser,
}

impl LedgerFetcher {
    pub fn new(client: Client) -> Result<Self, ClientError> {
        Ok(Self {
            client,
            url: MOVEMENTS_URL.to_string(),
            parser: NotificationParser::new()?,
        })
    }

    /// Point at a different endpoint (tests, staging).
    pub fn with_url(client: Client, url: impl Into<String>) -> Result<Self, ClientError> {
        Ok(Self {
            client,
            url: url.into(),
            parser: NotificationParser::new()?,
        })
    }

    /// Fetch up to `limit` records for `username` and classify them into a
    /// ledger. One request, no retry.
    pub async fn fetch(
        &self,
        token: &AccessToken,
        api_client_id: &str,
        username: &str,
        limit: u32,
    ) -> Result<DailyLedger, ClientError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&token.access_token)
            .header(CLIENT_ID_HEADER, api_client_id)
            .json(&request_body(username, limit))
            .send()
            .await
            .map_err(|e| ClientError::transport(Stage::Fetch, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Fetch {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::transport(Stage::Fetch, e))?;

        let (records, issue) = extract_records(&body);
        if let Some(issue) = issue {
            warn!(
                missing = issue.missing_key(),
                "response shape not as expected, degrading to an empty ledger"
            );
        }
        let newest = records.first().and_then(RawRecord::created_at);
        debug!(records = records.len(), newest = ?newest, "raw records fetched");

        Ok(fold_records(&self.parser, &records))
    }
}

/// Legacy enterprise-integration envelope the storage endpoint expects:
/// a header block of channel/device metadata and a payload block naming
/// the record limit and fixed application/company references.
fn request_body(username: &str, limit: u32) -> Value {
    json!({
        "Cabecera": {
            "HOST": {
                "USUARIO-ALT": "GHOBP",
                "TERMINAL-ALT": "",
                "CANAL-ID": "078",
            },
            "CanalFisico": "003",
            "CanalLogico": "74",
            "RutCliente": username,
            "RutUsuario": username,
            "IpCliente": "",
            "InfoDispositivo": "valor InfoDispositivo",
        },
        "Entrada": {
            "RutCliente": username,
            "listContents": {
                "params": {
                    "keyValue": username,
                    "limit": limit.to_string(),
                    "read": null,
                    "refApp": "santander_movil",
                    "refCompany": "SCHCL",
                },
            },
        },
    })
}
