//! Error types for the race authority

use thiserror::Error;

use crate::race_server::player::PlayerId;
use crate::race_server::race::RacePhase;

/// Rejections raised by the coordinator.
///
/// Every variant is recoverable: the operation is refused and race state is
/// left exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RaceError {
    /// A join was attempted while every slot is taken
    #[error("race is full ({max} players)")]
    CapacityExceeded { max: u32 },

    /// Operation called outside the phase (or player state) it is valid in
    #[error("{operation} is not allowed while the race is {phase:?}")]
    InvalidTransition {
        operation: &'static str,
        phase: RacePhase,
    },

    /// Operation referenced a player the coordinator does not track
    #[error("unknown player: {0}")]
    UnknownPlayer(PlayerId),
}

impl RaceError {
    pub(crate) fn invalid(operation: &'static str, phase: RacePhase) -> Self {
        RaceError::InvalidTransition { operation, phase }
    }
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, RaceError>;

/// Errors raised while reading the persisted race settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Errors that stop the headless binary
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("failed to write leaderboard: {0}")]
    Leaderboard(#[from] std::io::Error),

    #[error("race did not finish within {0:.0}s")]
    Unfinished(f32),
}
