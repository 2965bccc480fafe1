use rand::Rng;

use super::student::{nudge_score, Student, SCORE_MAX, SCORE_MIN};

/// Lowest attention the simulator will drift a student down to
pub const ATTENTION_FLOOR: u8 = 20;

const SPEAKING_FLIP_PROBABILITY: f64 = 0.05;
const HAND_FLIP_PROBABILITY: f64 = 0.03;
const MAX_ANALYSIS_BOOST: i32 = 15;

/// One simulator step for a single student
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryDelta {
    pub attention: i32,
    pub confusion: i32,
    pub toggle_speaking: bool,
    pub toggle_hand_raised: bool,
}

impl TelemetryDelta {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            attention: rng.gen_range(-5..=5),
            confusion: rng.gen_range(-3..=4),
            toggle_speaking: rng.gen_bool(SPEAKING_FLIP_PROBABILITY),
            toggle_hand_raised: rng.gen_bool(HAND_FLIP_PROBABILITY),
        }
    }

    /// Applies the step in place, keeping both scores inside their ranges
    pub fn apply_to(&self, student: &mut Student) {
        student.attention = nudge_score(student.attention, self.attention, ATTENTION_FLOOR, SCORE_MAX);
        student.confusion = nudge_score(student.confusion, self.confusion, SCORE_MIN, SCORE_MAX);
        if self.toggle_speaking {
            student.speaking = !student.speaking;
        }
        if self.toggle_hand_raised {
            student.hand_raised = !student.hand_raised;
        }
    }
}

/// Source of per-student engagement signals.
///
/// The bundled implementation is random; a real inference backend can be
/// plugged into the session controller in its place.
pub trait TelemetrySource: Send + Sync {
    /// Next drift step for `student`
    fn sample(&self, student: &Student) -> TelemetryDelta;

    /// Confusion increase reported for `student` by an on-demand analysis
    fn analysis_boost(&self, student: &Student) -> i32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTelemetry;

impl TelemetrySource for RandomTelemetry {
    fn sample(&self, _student: &Student) -> TelemetryDelta {
        TelemetryDelta::random(&mut rand::thread_rng())
    }

    fn analysis_boost(&self, _student: &Student) -> i32 {
        rand::thread_rng().gen_range(0..=MAX_ANALYSIS_BOOST)
    }
}
