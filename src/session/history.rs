use std::collections::VecDeque;

use rand::Rng;
use serde::Serialize;

use super::student::Student;

/// Number of samples shown on the class engagement chart
pub const HISTORY_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngagementSample {
    pub time: u32,
    pub engagement: u8,
    pub confusion: u8,
}

/// Trailing window of class-wide averages
#[derive(Debug, Clone, Default)]
pub struct EngagementHistory {
    samples: VecDeque<EngagementSample>,
    next_time: u32,
}

impl EngagementHistory {
    /// Seeds a full window with plausible background values
    pub fn seeded<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let samples = (0..HISTORY_LEN as u32)
            .map(|time| EngagementSample {
                time,
                engagement: rng.gen_range(50..=85),
                confusion: rng.gen_range(10..=30),
            })
            .collect();

        Self {
            samples,
            next_time: HISTORY_LEN as u32,
        }
    }

    /// Appends the roster's current averages. An empty roster records nothing.
    pub fn record(&mut self, students: &[Student]) {
        let Some(engagement) = average(students.iter().map(|s| s.attention)) else {
            return;
        };
        let confusion = average(students.iter().map(|s| s.confusion)).unwrap_or_default();

        if self.samples.len() == HISTORY_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(EngagementSample {
            time: self.next_time,
            engagement,
            confusion,
        });
        self.next_time += 1;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&EngagementSample> {
        self.samples.back()
    }

    pub fn to_vec(&self) -> Vec<EngagementSample> {
        self.samples.iter().copied().collect()
    }
}

/// Rounded mean of a set of scores
pub fn average(scores: impl Iterator<Item = u8>) -> Option<u8> {
    let (sum, count) = scores.fold((0u32, 0u32), |(sum, count), s| (sum + u32::from(s), count + 1));
    if count == 0 {
        return None;
    }
    Some(((sum as f64) / (count as f64)).round() as u8)
}
