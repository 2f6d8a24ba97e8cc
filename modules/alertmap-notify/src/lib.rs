pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod matcher;
pub mod pass;
pub mod sender;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use dedup::deduplicate_matches;
pub use dispatch::{DispatchStats, Dispatcher};
pub use error::NotifyError;
pub use matcher::{match_message, CandidateMatch};
pub use pass::{MatchingPass, NotifyDeps, PassReport};
pub use sender::{NotificationPayload, NotificationSender, SendOutcome};
