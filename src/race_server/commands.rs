//! Commands - Requests observers send to the authority
//!
//! Observers never touch race state. They send one of these over the
//! replication channel and the authority applies it (or rejects it).

use serde::{Deserialize, Serialize};

use crate::race_server::error::Result;
use crate::race_server::events::PowerUpKind;
use crate::race_server::player::PlayerId;
use crate::race_server::race::RaceCoordinator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RaceCommand {
    Join { id: PlayerId, name: String },
    AvatarReady { id: PlayerId },
    ReportDistance { id: PlayerId, distance: u32 },
    ReportCoin { id: PlayerId },
    ReportCollision { id: PlayerId },
    /// Stun window elapsed on the caller's side
    ResumeMovement { id: PlayerId },
    ReportPowerUp { id: PlayerId, kind: PowerUpKind },
    /// The scene tore down a section
    SectionRetired,
}

impl RaceCommand {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            RaceCommand::Join { .. } => "join",
            RaceCommand::AvatarReady { .. } => "avatar_ready",
            RaceCommand::ReportDistance { .. } => "report_distance",
            RaceCommand::ReportCoin { .. } => "report_coin",
            RaceCommand::ReportCollision { .. } => "report_collision",
            RaceCommand::ResumeMovement { .. } => "resume_movement",
            RaceCommand::ReportPowerUp { .. } => "report_power_up",
            RaceCommand::SectionRetired => "section_retired",
        }
    }

    /// Apply on the authority
    pub fn apply(self, coordinator: &mut RaceCoordinator) -> Result<()> {
        match self {
            RaceCommand::Join { id, name } => coordinator.add_player(id, name),
            RaceCommand::AvatarReady { id } => coordinator.mark_avatar_ready(id),
            RaceCommand::ReportDistance { id, distance } => {
                coordinator.update_distance(id, distance)
            }
            RaceCommand::ReportCoin { id } => coordinator.collect_coin(id),
            RaceCommand::ReportCollision { id } => coordinator.apply_damage(id).map(|_| ()),
            RaceCommand::ResumeMovement { id } => coordinator.resume_player(id),
            RaceCommand::ReportPowerUp { id, kind } => coordinator.apply_power_up(id, kind),
            RaceCommand::SectionRetired => {
                coordinator.on_section_retired();
                Ok(())
            }
        }
    }
}
