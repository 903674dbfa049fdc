use tokio::sync::watch;

/// On/off toggle for the update poller. The poller only looks at it between
/// iterations, so a long poll already in flight always completes.
#[derive(Clone)]
pub struct MonitorSwitch {
    sender: watch::Sender<bool>,
}

impl MonitorSwitch {
    pub fn new(enabled: bool) -> Self {
        let (sender, _) = watch::channel(enabled);
        Self { sender }
    }

    pub fn is_enabled(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn set(&self, enabled: bool) {
        self.sender.send_replace(enabled);
    }

    /// Flips the switch and returns the new state.
    pub fn toggle(&self) -> bool {
        let mut enabled = false;
        self.sender.send_modify(|value| {
            *value = !*value;
            enabled = *value;
        });
        enabled
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
