//! Sandboxing layer for every external command the server runs on behalf of
//! model-generated input.
//!
//! The pieces, leaves first:
//!
//! - [`policy`] derives the filesystem and network rules for one process.
//! - [`settings`] maps a policy onto the configuration shape consumed by the
//!   external enforcement helper (`srt`).
//! - [`artifact`] writes that configuration to a file the constrained process
//!   cannot rewrite, using the per-platform capabilities in [`platform`].
//! - [`session`] detects the helper, owns the artifact and wraps commands.
//! - [`exec`] runs a (wrapped) command with a wall-clock timeout.
//! - [`fs_ops`] provides atomic writes and helper-mediated copies.

pub mod artifact;
mod error;
pub mod exec;
pub mod fs_ops;
pub mod platform;
pub mod policy;
pub mod session;
pub mod settings;

pub use artifact::PolicyArtifact;
pub use artifact::ProtectionState;
pub use error::FileOpError;
pub use error::Result;
pub use error::SandboxError;
pub use exec::ExecOutput;
pub use policy::EnvOverrides;
pub use policy::ReadMode;
pub use policy::SandboxPolicy;
pub use policy::build_policy;
pub use session::Helper;
pub use session::SandboxMethod;
pub use session::SandboxSession;
pub use session::SessionOptions;
pub use session::SessionState;
