//! Platform client: rate-limited, retrying access to the code-host REST
//! API, with strict timestamp handling and bounded pagination.

pub mod client;
pub mod models;
pub mod rate_limit;

pub use client::{GithubClient, GithubError, PlatformApi};
pub use models::{CommitItem, IssueItem, PullItem, ReleaseItem, RepoInfo};
pub use rate_limit::TokenBucket;
