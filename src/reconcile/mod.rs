//! Reconciliation building blocks shared by the import passes.

pub mod content;
pub mod files;
pub mod hierarchy;
pub mod identity;
pub mod rewrite;
pub mod writer;

pub use content::{BlockContent, ContentStrategy, FlatContent};
pub use files::{CandidateFilePath, FileResolver, Resolution};
pub use identity::IdentityMap;
pub use rewrite::{AssetMap, LinkIndex, LinkRewriter};
pub use writer::{PublishPolicy, WriteOutcome};
