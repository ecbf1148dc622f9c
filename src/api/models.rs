use serde::{Deserialize, Serialize};

/// One SMS as published by the remote mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub text: String,
    #[serde(rename = "receivedStamp")]
    pub received_at: i64,
}

impl Message {
    pub fn new(from: impl Into<String>, text: impl Into<String>, received_at: i64) -> Self {
        Self {
            from: from.into(),
            text: text.into(),
            received_at,
        }
    }

    /// Receive time in whole seconds, rounded like the mailbox UI shows it.
    pub fn received_secs(&self) -> i64 {
        (self.received_at as f64 / 1000.0).round() as i64
    }
}
