//! Upstream fetch errors.
//!
//! Raised only by the fetcher. The refresh cache converts them into a
//! degraded record; they never reach callers of `RefreshCache::get`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DatasetName;

/// Cause code of a failed upstream fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    Timeout,
    HttpError,
    ParseError,
}

impl std::fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::HttpError => "http error",
            Self::ParseError => "parse error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{dataset} fetch failed ({kind}): {detail}")]
pub struct UpstreamError {
    pub dataset: DatasetName,
    pub kind: UpstreamErrorKind,
    /// HTTP status when the upstream answered with a non-success code
    pub status: Option<u16>,
    pub detail: String,
}

impl UpstreamError {
    pub fn timeout(dataset: DatasetName, detail: impl Into<String>) -> Self {
        Self {
            dataset,
            kind: UpstreamErrorKind::Timeout,
            status: None,
            detail: detail.into(),
        }
    }

    pub fn http(dataset: DatasetName, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            dataset,
            kind: UpstreamErrorKind::HttpError,
            status,
            detail: detail.into(),
        }
    }

    pub fn parse(dataset: DatasetName, detail: impl Into<String>) -> Self {
        Self {
            dataset,
            kind: UpstreamErrorKind::ParseError,
            status: None,
            detail: detail.into(),
        }
    }

    /// Classify a reqwest failure for `dataset`.
    pub fn from_reqwest(dataset: DatasetName, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(dataset, error.to_string())
        } else if error.is_decode() {
            Self::parse(dataset, error.to_string())
        } else {
            Self::http(dataset, error.status().map(|s| s.as_u16()), error.to_string())
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Parse failures and 4xx answers (other than 408/429) are permanent.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            UpstreamErrorKind::Timeout => true,
            UpstreamErrorKind::ParseError => false,
            UpstreamErrorKind::HttpError => match self.status {
                None => true,
                Some(status) => status >= 500 || status == 408 || status == 429,
            },
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self.kind {
            UpstreamErrorKind::Timeout => "The Hong Kong Observatory did not respond in time.",
            UpstreamErrorKind::HttpError => "The Hong Kong Observatory service is unavailable.",
            UpstreamErrorKind::ParseError => "Received unexpected data from the Hong Kong Observatory.",
        }
    }
}
