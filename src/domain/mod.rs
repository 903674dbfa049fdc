pub mod chat;
pub mod clock;
pub mod message;
pub mod types;

pub use chat::{ChatRecord, ChatTypeFilter};
pub use clock::LocalClock;
pub use message::{ActivityEntry, ReplyOutcome};
pub use types::PollerSnapshot;
