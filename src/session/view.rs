use serde::Serialize;

use crate::analysis::Attentiveness;

use super::alerts::struggling_students;
use super::history::{average, EngagementSample};
use super::notification::Notification;
use super::peer_nodes::{filter_students, peer_nodes, PeerNode};
use super::settings::SettingsView;
use super::state::SessionState;
use super::student::{ConfusionLevel, Student};

/// Number of struggling students listed in the live alert panel
pub const ALERT_PANEL_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total_students: usize,
    pub struggling: usize,
    pub peer_nodes: usize,
    pub average_engagement: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentCard {
    #[serde(flatten)]
    pub student: Student,
    pub selected: bool,
    pub level: ConfusionLevel,
}

/// Read-only snapshot of a session as rendered to operators
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub connected: bool,
    pub stats: SessionStats,
    pub students: Vec<StudentCard>,
    pub selected: Vec<u32>,
    pub alerts: Vec<Student>,
    pub peer_nodes: Vec<PeerNode>,
    pub notifications: Vec<Notification>,
    pub attentiveness: Attentiveness,
    pub history: Vec<EngagementSample>,
    pub settings: SettingsView,
}

impl SessionView {
    pub fn build(state: &SessionState, search: &str) -> Self {
        let students = state.students();
        let struggling = struggling_students(students);
        let nodes = peer_nodes(students);

        let stats = SessionStats {
            total_students: students.len(),
            struggling: struggling.len(),
            peer_nodes: nodes.len(),
            average_engagement: average(students.iter().map(|s| s.attention)).unwrap_or_default(),
        };

        let cards = filter_students(students, search)
            .into_iter()
            .map(|student| StudentCard {
                student: student.clone(),
                selected: state.is_selected(student.id),
                level: student.confusion_level(),
            })
            .collect();

        Self {
            connected: state.connected(),
            stats,
            students: cards,
            selected: state.selection().to_vec(),
            alerts: struggling.into_iter().take(ALERT_PANEL_LEN).cloned().collect(),
            peer_nodes: nodes,
            notifications: state.notifications().to_vec(),
            attentiveness: state.attentiveness(),
            history: state.history().to_vec(),
            settings: state.settings().view(),
        }
    }
}
