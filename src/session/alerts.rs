use std::collections::BTreeSet;

use super::student::Student;

/// Confusion at which an ungrouped student shows up in the alert panel
pub const STRUGGLING_THRESHOLD: u8 = 30;

/// Confusion at which a struggling student triggers a notification
pub const HIGH_CONFUSION_THRESHOLD: u8 = 40;

pub fn is_struggling(student: &Student) -> bool {
    student.confusion >= STRUGGLING_THRESHOLD && !student.in_peer_node()
}

pub fn struggling_students(students: &[Student]) -> Vec<&Student> {
    students.iter().filter(|s| is_struggling(s)).collect()
}

pub fn alert_message(count: usize) -> String {
    format!("{} student(s) showing high confusion levels", count)
}

/// Tracks which students have already been reported as highly confused.
///
/// A student is reported once when entering the high-confusion set and is
/// forgotten when leaving it, so a later relapse reports again.
#[derive(Debug, Clone, Default)]
pub struct AlertDeriver {
    alerted: BTreeSet<u32>,
}

impl AlertDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many students newly crossed the high-confusion threshold
    pub fn observe(&mut self, students: &[Student]) -> usize {
        let current: BTreeSet<u32> = students
            .iter()
            .filter(|s| is_struggling(s) && s.confusion >= HIGH_CONFUSION_THRESHOLD)
            .map(|s| s.id)
            .collect();

        let newly = current.difference(&self.alerted).count();
        self.alerted = current;
        newly
    }

    pub fn reset(&mut self) {
        self.alerted.clear();
    }

    #[cfg(test)]
    pub fn alerted(&self) -> impl Iterator<Item = &u32> {
        self.alerted.iter()
    }
}
