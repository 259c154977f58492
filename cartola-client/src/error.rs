//! Stage error taxonomy. Every failure names the stage it aborted; the
//! pipeline never retries and never returns partial results.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Pipeline stage, for failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Telemetry,
    Token,
    Fetch,
    Pipeline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Telemetry => "telemetry capture",
            Stage::Token => "token exchange",
            Stage::Fetch => "movement fetch",
            Stage::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

/// Failures of the browser-driven telemetry capture stage.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The public site never loaded, or the private-area entry control
    /// never appeared.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The embedded login frame did not appear within its timeout.
    #[error("login frame did not appear")]
    LoginFrame,

    /// Every configured selector candidate for a login form field failed.
    #[error("no selector candidate matched the {field} field")]
    LoginForm { field: &'static str },

    /// Submission went through but no outgoing request ever carried the
    /// telemetry header.
    #[error("telemetry header was never observed on outgoing traffic")]
    TelemetryNotCaptured,

    /// Browser process could not be configured or launched.
    #[error("browser launch: {0}")]
    Launch(String),

    /// Unexpected devtools-protocol failure.
    #[error("browser protocol: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
}

/// Any error the pipeline can abort with.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("telemetry capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// Token endpoint rejected the handshake, or answered without an
    /// access token. Carries the upstream status and body.
    #[error("authentication failed ({status}): {body}")]
    Auth { status: u16, body: String },

    /// Movement endpoint answered with a non-success status.
    #[error("movement fetch failed with status {status}")]
    Fetch { status: u16 },

    /// Request never completed (connect, timeout, decode).
    #[error("transport failure during {stage}: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },

    #[error("internal pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The optional end-to-end deadline elapsed before the run finished.
    #[error("pipeline deadline of {0:?} exceeded")]
    Deadline(Duration),
}

impl ClientError {
    pub fn transport(stage: Stage, source: reqwest::Error) -> Self {
        ClientError::Transport { stage, source }
    }

    /// Stage the pipeline aborted in.
    pub fn stage(&self) -> Stage {
        match self {
            ClientError::Capture(_) => Stage::Telemetry,
            ClientError::Auth { .. } => Stage::Token,
            ClientError::Fetch { .. } | ClientError::Pattern(_) => Stage::Fetch,
            ClientError::Transport { stage, .. } => *stage,
            ClientError::Deadline(_) => Stage::Pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_map_to_their_stage() {
        assert_eq!(
            ClientError::Capture(CaptureError::LoginFrame).stage(),
            Stage::Telemetry
        );
        assert_eq!(
            ClientError::Auth {
                status: 401,
                body: "denied".into()
            }
            .stage(),
            Stage::Token
        );
        assert_eq!(ClientError::Fetch { status: 500 }.stage(), Stage::Fetch);
        assert_eq!(
            ClientError::Deadline(Duration::from_secs(60)).stage(),
            Stage::Pipeline
        );
    }

    #[test]
    fn test_auth_error_keeps_upstream_body() {
        let err = ClientError::Auth {
            status: 403,
            body: "bot detected".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("bot detected"));
    }
}
