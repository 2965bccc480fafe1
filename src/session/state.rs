use crate::analysis::Attentiveness;
use crate::error::{HiveError, Result};

use super::alerts::{alert_message, AlertDeriver};
use super::history::EngagementHistory;
use super::notification::{NotificationLog, Severity};
use super::settings::{Settings, SettingsPatch};
use super::simulator::TelemetryDelta;
use super::student::{nudge_score, Student, SCORE_MAX, SCORE_MIN};

pub const CONNECTED_MESSAGE: &str = "Connected to Zoom session (Demo Mode)";
pub const DISCONNECTED_MESSAGE: &str = "Disconnected from Zoom session";
pub const ANALYSIS_STARTED_MESSAGE: &str = "Running AI analysis...";
pub const ANALYSIS_COMPLETED_MESSAGE: &str = "AI analysis completed - flagged struggling students";

const COACH_PREVIEW_CHARS: usize = 50;

/// Every way the session can change. Randomness is resolved by the caller,
/// so applying the same actions to the same state is deterministic.
#[derive(Debug, Clone)]
pub enum Action {
    Connect,
    CaptureDenied,
    Disconnect { roster: Vec<Student> },
    Tick(Vec<(u32, TelemetryDelta)>),
    ToggleSelection(u32),
    CreatePeerNode { name: String },
    SendCoachMessage(String),
    AnalysisStarted,
    AnalysisCompleted(Vec<(u32, i32)>),
    UpdateSettings(SettingsPatch),
    RecordAttentiveness(Attentiveness),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Connect => "connect",
            Action::CaptureDenied => "capture_denied",
            Action::Disconnect { .. } => "disconnect",
            Action::Tick(_) => "tick",
            Action::ToggleSelection(_) => "toggle_selection",
            Action::CreatePeerNode { .. } => "create_peer_node",
            Action::SendCoachMessage(_) => "send_coach_message",
            Action::AnalysisStarted => "analysis_started",
            Action::AnalysisCompleted(_) => "analysis_completed",
            Action::UpdateSettings(_) => "update_settings",
            Action::RecordAttentiveness(_) => "record_attentiveness",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    connected: bool,
    students: Vec<Student>,
    selection: Vec<u32>,
    notifications: NotificationLog,
    settings: Settings,
    history: EngagementHistory,
    attentiveness: Attentiveness,
    alerts: AlertDeriver,
}

impl SessionState {
    pub fn new(students: Vec<Student>, history: EngagementHistory) -> Self {
        Self {
            connected: false,
            students,
            selection: Vec::new(),
            notifications: NotificationLog::new(),
            settings: Settings::default(),
            history,
            attentiveness: Attentiveness::Unknown,
            alerts: AlertDeriver::new(),
        }
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn student(&self, id: u32) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn selection(&self) -> &[u32] {
        &self.selection
    }

    pub fn is_selected(&self, id: u32) -> bool {
        self.selection.contains(&id)
    }

    pub fn notifications(&self) -> &NotificationLog {
        &self.notifications
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn history(&self) -> &EngagementHistory {
        &self.history
    }

    pub fn attentiveness(&self) -> Attentiveness {
        self.attentiveness
    }

    /// Applies one action. On error the roster is left untouched, though a
    /// notification describing the failure may still be appended.
    pub fn apply(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Connect => {
                if self.connected {
                    return Ok(());
                }
                self.connected = true;
                self.notifications.push(Severity::Success, CONNECTED_MESSAGE);
            }
            Action::CaptureDenied => {
                self.notifications
                    .push(Severity::Error, HiveError::CaptureDenied.to_string());
            }
            Action::Disconnect { roster } => {
                self.connected = false;
                self.students = roster;
                self.selection.clear();
                self.attentiveness = Attentiveness::Unknown;
                self.alerts.reset();
                self.notifications.push(Severity::Info, DISCONNECTED_MESSAGE);
            }
            Action::Tick(deltas) => {
                if !self.connected {
                    return Ok(());
                }
                for (id, delta) in deltas {
                    if let Some(student) = self.students.iter_mut().find(|s| s.id == id) {
                        delta.apply_to(student);
                    }
                }
                self.history.record(&self.students);
            }
            Action::ToggleSelection(id) => self.toggle_selection(id)?,
            Action::CreatePeerNode { name } => self.create_peer_node(&name)?,
            Action::SendCoachMessage(message) => {
                let message = message.trim();
                if message.is_empty() {
                    return Ok(());
                }
                let preview: String = message.chars().take(COACH_PREVIEW_CHARS).collect();
                self.notifications
                    .push(Severity::Info, format!("Coach message sent: {}...", preview));
            }
            Action::AnalysisStarted => {
                self.notifications.push(Severity::Info, ANALYSIS_STARTED_MESSAGE);
            }
            Action::AnalysisCompleted(boosts) => {
                for (id, boost) in boosts {
                    if let Some(student) = self.students.iter_mut().find(|s| s.id == id) {
                        student.confusion = nudge_score(student.confusion, boost, SCORE_MIN, SCORE_MAX);
                    }
                }
                self.notifications.push(Severity::Success, ANALYSIS_COMPLETED_MESSAGE);
            }
            Action::UpdateSettings(patch) => self.settings.apply(patch),
            Action::RecordAttentiveness(reading) => self.attentiveness = reading,
        }

        self.derive_alerts();
        Ok(())
    }

    fn toggle_selection(&mut self, id: u32) -> Result<()> {
        let student = self.student(id).ok_or(HiveError::StudentNotFound(id))?;
        if let Some(node) = &student.peer_node {
            return Err(HiveError::AlreadyGrouped(id, node.clone()));
        }

        if let Some(pos) = self.selection.iter().position(|&selected| selected == id) {
            self.selection.remove(pos);
        } else {
            self.selection.push(id);
        }
        Ok(())
    }

    fn create_peer_node(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() || self.selection.is_empty() {
            self.notifications
                .push(Severity::Error, HiveError::InvalidPeerNode.to_string());
            return Err(HiveError::InvalidPeerNode);
        }

        for student in self.students.iter_mut() {
            if self.selection.contains(&student.id) {
                student.peer_node = Some(name.to_string());
            }
        }

        tracing::info!(node = %name, members = self.selection.len(), "Peer node created");
        self.notifications.push(
            Severity::Success,
            format!("Created peer node \"{}\" with {} students", name, self.selection.len()),
        );
        self.selection.clear();
        Ok(())
    }

    fn derive_alerts(&mut self) {
        // Memory is only valid while it is being kept current
        if !self.settings.auto_detection {
            self.alerts.reset();
            return;
        }
        if !self.connected {
            return;
        }
        let newly_struggling = self.alerts.observe(&self.students);
        if newly_struggling > 0 {
            tracing::info!(count = newly_struggling, "Students crossed high confusion threshold");
            self.notifications
                .push(Severity::Alert, alert_message(newly_struggling));
        }
    }
}
