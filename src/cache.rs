use std::sync::{Arc, Mutex};

use crate::api::models::Message;

/// Handle shared between the sync engine and the UI.
pub type SharedCache = Arc<Mutex<MessageCache>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Back,
    Forward,
}

/// Messages currently on display, newest first, plus the cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageCache {
    messages: Vec<Message>,
    active: usize,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCache {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn current(&self) -> Option<&Message> {
        self.messages.get(self.active)
    }

    /// Replace the contents when they differ. Resets the cursor on change.
    pub fn replace_if_changed(&mut self, messages: &[Message]) -> bool {
        if self.messages == messages {
            return false;
        }
        self.messages = messages.to_vec();
        self.active = 0;
        true
    }

    /// Move the cursor one step, clamped at both ends.
    pub fn advance(&mut self, direction: Direction) -> bool {
        match direction {
            Direction::Back if self.can_go_back() => self.active -= 1,
            Direction::Forward if self.can_go_forward() => self.active += 1,
            _ => return false,
        }
        true
    }

    pub fn can_go_back(&self) -> bool {
        self.len() > 1 && self.active > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.len() > 1 && self.active + 1 < self.len()
    }
}
