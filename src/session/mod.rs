//! Classroom session model and its lifecycle.
//!
//! - `student`: roster records and generation
//! - `state`: the session state and the reducer applying [`Action`]s
//! - `simulator`: telemetry drift behind the [`TelemetrySource`] seam
//! - `alerts`: struggling-student derivation and alert de-duplication
//! - `controller`: timers, capture and cancellation for a live session

pub mod alerts;
pub mod capture;
mod controller;
pub mod history;
pub mod notification;
pub mod peer_nodes;
pub mod settings;
pub mod simulator;
pub mod state;
pub mod student;
mod view;

pub use capture::{CaptureSource, CaptureStream, PushedFrameCapture};
pub use controller::SessionController;
pub use notification::{Notification, NotificationLog, Severity};
pub use peer_nodes::PeerNode;
pub use settings::{SettingsPatch, SettingsView};
pub use simulator::{RandomTelemetry, TelemetryDelta, TelemetrySource};
pub use state::{Action, SessionState};
pub use student::Student;
pub use view::{SessionStats, SessionView, StudentCard};
