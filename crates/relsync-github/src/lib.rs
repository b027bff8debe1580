//! `relsync-github`: the GitHub REST implementation of
//! [`relsync_core::host::SourceHost`].
//!
//! ```text
//! SyncOrchestrator
//!     │  SourceHost
//!     ▼
//! GitHubHost      ← branches, contents (raw), actions/runs, check-runs
//!     │
//!     ▼
//! RateLimitState  ← X-RateLimit-* from every response
//! ```

pub mod api;
pub mod client;
pub mod rate_limit;

#[cfg(test)]
mod tests;

pub use client::GitHubHost;
pub use rate_limit::RateLimitState;
