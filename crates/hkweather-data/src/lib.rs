//! Hong Kong Observatory data for hkweather
//!
//! An upstream fetcher for the HKO open data API and a refresh cache that
//! serves fresh-enough records, merges concurrent refreshes and degrades to
//! stale data when the upstream fails.

pub mod cache;
pub mod error;
pub mod retry;
pub mod types;
pub mod upstream;

pub use cache::{EntryStatus, HealthReport, RefreshCache, DEFAULT_MAX_AGE};
pub use error::{UpstreamError, UpstreamErrorKind};
pub use retry::RetryConfig;
pub use types::*;
pub use upstream::{parse_payload, HkoFetcher, UpstreamFetcher};
