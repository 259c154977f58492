//! cartola-client: the four network-facing stages of the extraction
//! pipeline.
//!
//! 1. [`telemetry`] drives a real browser through the login flow and
//!    captures the anti-automation telemetry header from outgoing traffic.
//! 2. [`token`] trades that telemetry value plus the login secret for a
//!    bearer access token.
//! 3. [`movements`] pulls raw notification records from the push-messaging
//!    storage endpoint and folds them into a ledger.
//! 4. [`pipeline`] sequences the stages, short-circuiting on the first
//!    failure.

pub mod error;
pub mod movements;
pub mod pipeline;
pub mod telemetry;
pub mod token;

pub use error::{CaptureError, ClientError, Stage};
pub use movements::{LedgerFetcher, RawRecord, ShapeIssue};
pub use pipeline::{Credentials, Pipeline, PipelineOptions, PipelineOutput, PipelineRunner};
pub use telemetry::{TelemetryCapture, TelemetryToken};
pub use token::{AccessToken, TokenExchanger};
