/// Read-only view of the poller's progress, republished after every iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerSnapshot {
    /// Next update id to request; `None` until the first update is handled.
    pub cursor: Option<i64>,
    pub messages_processed: u64,
    pub polls_completed: u64,
    pub polls_failed: u64,
    pub replies_sent: u64,
    pub replies_failed: u64,
    pub paused: bool,
}
