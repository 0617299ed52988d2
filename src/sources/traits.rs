use crate::paper::{normalize_date, MandatoryField, RawPaper};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

/// One query round issued to every registered source
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Query string (terms joined, already planner-expanded)
    pub query: String,
    /// Optional research domain used by sources that support category filters
    pub domain: Option<String>,
    /// Maximum results to return from this source
    pub limit: u32,
    /// Only include papers published in or after this year
    pub year_from: Option<i32>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, limit: u32) -> Self {
        Self {
            query: query.into(),
            domain: None,
            limit,
            year_from: None,
        }
    }
}

/// Identifier handed to a source for a metadata lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupId {
    Doi(String),
    Arxiv(String),
    Pmid(String),
    SemanticScholar(String),
    /// Title-search fallback for papers with no usable identifier
    Title(String),
}

/// Value returned by a single-field metadata lookup
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Authors(Vec<String>),
    Date(NaiveDate),
}

impl FieldValue {
    /// Project one mandatory field out of a full record.
    ///
    /// Returns `None` when the record does not carry a usable value,
    /// including dates that fail normalization.
    pub fn from_raw(paper: &RawPaper, field: MandatoryField) -> Option<FieldValue> {
        match field {
            MandatoryField::Doi => paper
                .doi
                .as_deref()
                .and_then(crate::paper::normalize_doi)
                .map(FieldValue::Text),
            MandatoryField::Abstract => paper
                .abstract_text
                .as_deref()
                .filter(|a| !a.trim().is_empty())
                .map(|a| FieldValue::Text(a.to_string())),
            MandatoryField::Authors => {
                if paper.authors.is_empty() {
                    None
                } else {
                    Some(FieldValue::Authors(paper.authors.clone()))
                }
            }
            MandatoryField::PublicationDate => paper
                .publication_date
                .as_deref()
                .and_then(normalize_date)
                .map(FieldValue::Date),
        }
    }
}

/// Errors that can occur during source operations
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Timeout occurred")]
    Timeout,
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl SourceError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Network(_)
                | SourceError::RateLimit
                | SourceError::ServiceUnavailable(_)
                | SourceError::Timeout
        )
    }
}

/// Trait for scholarly data sources.
///
/// Implementations are registered once at startup; the pipeline only
/// ever talks to the trait, never to a concrete source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique name/identifier for this source (stable registry key)
    fn name(&self) -> &'static str;

    /// Human-readable description of the source
    fn description(&self) -> &'static str;

    /// Search for papers matching the query
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawPaper>, SourceError>;

    /// Fetch a full record by identifier.
    ///
    /// `Ok(None)` means the source has no match; errors are reserved for
    /// transport and service failures.
    async fn fetch(&self, id: &LookupId) -> Result<Option<RawPaper>, SourceError> {
        let _ = id;
        Ok(None)
    }

    /// Look up a single mandatory field by identifier.
    ///
    /// A plain miss is `Ok(None)`, never an error.
    async fn lookup(
        &self,
        field: MandatoryField,
        id: &LookupId,
    ) -> Result<Option<FieldValue>, SourceError> {
        Ok(self
            .fetch(id)
            .await?
            .and_then(|paper| FieldValue::from_raw(&paper, field)))
    }

    /// Per-call search timeout override.
    ///
    /// `None` means the configured `search.source_timeout_secs` applies;
    /// adapters with known-slow backends return their own budget.
    fn search_timeout(&self) -> Option<Duration> {
        None
    }
}
