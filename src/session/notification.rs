use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of notifications kept in the trailing window
pub const NOTIFICATION_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Error,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub severity: Severity,
    pub message: String,
    pub timestamp: String,
}

/// Bounded log of the most recent notifications, oldest first
#[derive(Debug, Clone, Default)]
pub struct NotificationLog {
    entries: VecDeque<Notification>,
    last_id: u64,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a notification, evicting the oldest once the window is full.
    ///
    /// Ids are millisecond timestamps, bumped when two notifications land in
    /// the same millisecond so they stay unique and increasing.
    pub fn push(&mut self, severity: Severity, message: impl Into<String>) -> Notification {
        let now = chrono::Local::now();
        let id = (now.timestamp_millis().max(0) as u64).max(self.last_id + 1);
        self.last_id = id;

        if self.entries.len() == NOTIFICATION_CAPACITY {
            self.entries.pop_front();
        }

        let notification = Notification {
            id,
            severity,
            message: message.into(),
            timestamp: now.format("%H:%M:%S").to_string(),
        };
        tracing::debug!(
            id = notification.id,
            severity = ?notification.severity,
            message = %notification.message,
            "Notification appended"
        );
        self.entries.push_back(notification.clone());
        notification
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.entries.iter().cloned().collect()
    }
}
