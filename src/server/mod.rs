//! Service surface: request/result envelopes, the HTTP API, and the
//! outbound result publishing seam.

pub mod http;
pub mod messages;

pub use http::{app, serve, AppState, RunSummary};
pub use messages::{
    LoggingPublisher, ResultPublisher, SearchRequest, SearchResult, SEARCH_STRATEGY,
};
