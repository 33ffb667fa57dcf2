//! Race Server Module
//!
//! Authoritative race state for a multiplayer endless runner. One owner
//! applies every mutation; observers receive snapshots and events.

pub mod commands;
pub mod config;
pub mod elimination;
pub mod error;
pub mod events;
pub mod leaderboard;
pub mod player;
pub mod race;
pub mod ranking;
pub mod sections;
pub mod sequence;
pub mod server;
pub mod spectate;

pub use commands::RaceCommand;
pub use config::{PowerUpConfig, RaceConfig, RaceSettings, SectionConfig};
pub use error::{AppError, RaceError, SettingsError};
pub use events::{EventBus, PowerUpKind, RaceEvent, Subscription};
pub use leaderboard::{submit_final_results, JsonLinesLeaderboard, LeaderboardEntry, LeaderboardSink};
pub use player::{PlayerId, PlayerRaceState, PlayerSnapshot};
pub use race::{DamageOutcome, RaceCoordinator, RacePhase, RaceSnapshot};
pub use ranking::{finalize_rankings, RaceResult, RankingInput};
pub use sections::{Section, SectionGenerator, SectionId};
pub use server::{AuthorityHandle, RaceServer, RaceUpdate, ServerState, ServerStats};
pub use spectate::Spectator;
