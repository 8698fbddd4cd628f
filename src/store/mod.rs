pub mod lock;
pub mod site;

pub use lock::RunLock;
pub use site::{KindSummary, SiteStore, TargetStore};
