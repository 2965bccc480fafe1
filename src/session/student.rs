use rand::Rng;
use serde::{Deserialize, Serialize};

pub const STUDENT_NAMES: [&str; 16] = [
    "Aarav", "Isha", "Vihaan", "Diya", "Kabir", "Anaya", "Advait", "Myra",
    "Reyansh", "Sara", "Vivaan", "Aadhya", "Arjun", "Zara", "Ira", "Rohan",
];

pub const TOPICS: [&str; 8] = [
    "Calculus: Limits",
    "OS: Deadlocks",
    "DBMS: Normalization",
    "DSA: Graphs",
    "ML: Overfitting",
    "Physics: SHM",
    "Chemistry: Titration",
    "Economics: Elasticity",
];

pub const SCORE_MIN: u8 = 0;
pub const SCORE_MAX: u8 = 100;

const AVATAR_BASE_URL: &str = "https://api.dicebear.com/7.x/avataaars/svg";

/// Coarse confusion band used to colour a student card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfusionLevel {
    Normal,
    Elevated,
    High,
}

impl ConfusionLevel {
    pub fn from_score(confusion: u8) -> Self {
        match confusion {
            50.. => ConfusionLevel::High,
            30..=49 => ConfusionLevel::Elevated,
            _ => ConfusionLevel::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: u32,
    pub name: String,
    pub topic: String,
    pub attention: u8,
    pub confusion: u8,
    pub speaking: bool,
    pub hand_raised: bool,
    pub peer_node: Option<String>,
    pub avatar: String,
}

impl Student {
    /// Builds the `index`-th student of a freshly generated roster
    pub fn generate<R: Rng + ?Sized>(index: usize, rng: &mut R) -> Self {
        let first_name = STUDENT_NAMES[index % STUDENT_NAMES.len()];
        let cohort = index / STUDENT_NAMES.len() + 1;

        Self {
            id: index as u32 + 1,
            name: format!("{} {}", first_name, cohort),
            topic: TOPICS[index % TOPICS.len()].to_string(),
            attention: rng.gen_range(40..=95),
            confusion: rng.gen_range(0..=40),
            speaking: rng.gen_bool(0.15),
            hand_raised: rng.gen_bool(0.10),
            peer_node: None,
            avatar: avatar_url(first_name),
        }
    }

    pub fn in_peer_node(&self) -> bool {
        self.peer_node.is_some()
    }

    pub fn confusion_level(&self) -> ConfusionLevel {
        ConfusionLevel::from_score(self.confusion)
    }

    /// Case-insensitive match against name or topic
    pub fn matches(&self, needle_lowercase: &str) -> bool {
        self.name.to_lowercase().contains(needle_lowercase)
            || self.topic.to_lowercase().contains(needle_lowercase)
    }
}

/// Generates `count` students with ids `1..=count`
pub fn generate_roster<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<Student> {
    (0..count).map(|i| Student::generate(i, rng)).collect()
}

/// Applies a signed step to a score and clamps the result into `[min, max]`
pub fn nudge_score(value: u8, step: i32, min: u8, max: u8) -> u8 {
    (i32::from(value) + step).clamp(i32::from(min), i32::from(max)) as u8
}

fn avatar_url(seed: &str) -> String {
    format!("{}?seed={}", AVATAR_BASE_URL, urlencoding::encode(seed))
}
