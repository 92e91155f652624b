//! Error taxonomy shared across the scraper, store and API surface.

use thiserror::Error;

/// Top-level error type returned by library-facing operations.
///
/// Each variant corresponds to one of the error kinds in the design
/// document: configuration is fatal at start-up, agent/decode errors are
/// recorded and surfaced through health rather than propagated, and the
/// "not found" variants map onto the aggregated API's standard envelope.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0:?}")]
    ConfigInvalid(Vec<String>),

    #[error("node agent for {node} is unreachable: {source}")]
    AgentUnreachable {
        node: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("node {0} has no usable address for any accepted address type")]
    NoAddress(String),

    #[error("node agent for {node} has no stats endpoint")]
    AgentNotFound { node: String },

    #[error("node agent for {node} returned status {status}")]
    AgentStatus { node: String, status: u16 },

    #[error("scrape of {node} timed out")]
    Timeout { node: String },

    #[error("failed to decode stats summary from {node}: {source}")]
    DecodeInvalid {
        node: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{kind} {name} not found")]
    EntityUnknown { kind: &'static str, name: String },

    #[error("{kind} {name} has no samples yet")]
    NotReadyYet { kind: &'static str, name: String },

    #[error("node {0} is already being scraped")]
    ScraperAlreadyActive(String),
}

pub type Result<T> = std::result::Result<T, Error>;
