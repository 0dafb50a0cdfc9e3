//! Read-only client for the Typst package registry hosted on GitHub.
//!
//! Every request goes through [`url_guard`] (SSRF filter) and [`fetch`]
//! (response size caps), and every identifier is validated by
//! [`identifier`] before it is interpolated into a URL.

mod client;
mod error;
pub mod fetch;
pub mod identifier;
mod metadata;
mod transport;
pub mod url_guard;

pub use client::DirectoryEntry;
pub use client::EntryKind;
pub use client::ExampleFile;
pub use client::RegistryClient;
pub use client::RegistryEndpoints;
pub use error::RegistryError;
pub use error::Result;
pub use identifier::RegistryIdentifier;
pub use identifier::ValidationError;
pub use metadata::PackageMetadata;
pub use transport::HttpTransport;
pub use transport::RegistryTransport;
pub use transport::TransportResponse;
