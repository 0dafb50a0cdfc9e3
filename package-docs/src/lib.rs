//! Aggregated package documentation with a two-tier (memory and disk) cache.

mod cache;
mod candidates;
mod document;
mod error;
mod summary;

pub use cache::CachedEntry;
pub use cache::DEFAULT_OPTIONAL_BUDGET_RATIO;
pub use cache::DocumentCache;
pub use candidates::CHANGELOG_CANDIDATES;
pub use candidates::LICENSE_CANDIDATES;
pub use candidates::README_CANDIDATES;
pub use candidates::first_match;
pub use document::CachedDocument;
pub use document::DocumentLinks;
pub use document::package_uri;
pub use error::DocsError;
pub use error::Result;
pub use summary::PackageDocsSummary;
