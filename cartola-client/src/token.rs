//! Token exchange: one form-encoded POST trading the captured telemetry
//! value plus the login secret for a bearer access token. No retry, no
//! caching; a fresh token is obtained on every pipeline run.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ClientError, Stage};
use crate::telemetry::TelemetryToken;

pub const TOKEN_URL: &str = "https://apideveloper.santander.cl/sancl/privado/\
     party_authentication_restricted/party_auth_dss/v1/oauth2/token";

const TELEMETRY_HEADER: &str = "Akamai-BM-Telemetry";
const SCOPE: &str = "Completa";

// Fixed channel-identification values the endpoint requires.
const APP_ID: &str = "007";
const CHANNEL_ID: &str = "003";
const SERIAL_NUMBER: &str = "";
const REFERRER: &str = "https://mibanco.santander.cl/";

/// Bearer token as returned by the endpoint. Lives for one pipeline run.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

pub struct TokenExchanger {
    client: Client,
    url: String,
}

impl TokenExchanger {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            url: TOKEN_URL.to_string(),
        }
    }

    /// Point at a different endpoint (tests, staging).
    pub fn with_url(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Perform the handshake. Exactly one outbound request; a non-success
    /// status or a success body without a usable `access_token` both fail
    /// with the upstream status and body attached.
    pub async fn exchange(
        &self,
        username: &str,
        password: &str,
        client_id: &str,
        telemetry: &TelemetryToken,
    ) -> Result<AccessToken, ClientError> {
        let form = [
            ("scope", SCOPE),
            ("username", username),
            ("password", password),
            ("client_id", client_id),
        ];

        let response = self
            .client
            .post(&self.url)
            .header("accept", "application/json")
            .header("referrer", REFERRER)
            .header(TELEMETRY_HEADER, telemetry.as_str())
            .header("app", APP_ID)
            .header("canal", CHANNEL_ID)
            .header("nro_ser", SERIAL_NUMBER)
            .form(&form)
            .send()
            .await
            .map_err(|e| ClientError::transport(Stage::Token, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::transport(Stage::Token, e))?;

        if !status.is_success() {
            return Err(ClientError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<AccessToken>(&body) {
            Ok(token) if !token.access_token.is_empty() => {
                debug!(
                    token_type = %token.token_type,
                    expires_in = token.expires_in,
                    "access token obtained"
                );
                Ok(token)
            }
            _ => Err(ClientError::Auth {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_deserializes() {
        let token: AccessToken = serde_json::from_str(
            r#"{"access_token":"abc","token_type":"Bearer","expires_in":1799,"scope":"Completa"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, 1799);
        assert_eq!(token.refresh_token, None);
    }

    #[test]
    fn test_body_without_token_field_is_rejected() {
        let result = serde_json::from_str::<AccessToken>(r#"{"error":"invalid_grant"}"#);
        assert!(result.is_err());
    }
}
