//! Player - Per-player race record
//!
//! One record per connected player for the lifetime of a race. Only the
//! coordinator mutates these; observers see [`PlayerSnapshot`]s.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable player identifier handed out by the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Player status flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerFlags {
    pub avatar_ready: bool,
    pub stunned: bool,
    pub eliminated: bool,
}

/// Temporary change to a player's running speed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedEffect {
    pub multiplier: f32,
    /// Seconds left before the multiplier returns to 1.0
    pub remaining: f32,
}

/// Complete state for a single player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRaceState {
    pub id: PlayerId,
    pub name: String,
    /// Slot index in join order (0 = first to join)
    pub join_order: u32,
    /// Whole distance units travelled
    pub distance: u32,
    pub coins: u32,
    pub lives: u32,
    /// 0 until rankings are finalized
    pub rank: u32,
    pub can_move: bool,
    pub flags: PlayerFlags,
    pub speed: Option<SpeedEffect>,
}

impl PlayerRaceState {
    pub fn new(id: PlayerId, name: String, join_order: u32, lives: u32) -> Self {
        Self {
            id,
            name,
            join_order,
            distance: 0,
            coins: 0,
            lives,
            rank: 0,
            can_move: false,
            flags: PlayerFlags::default(),
            speed: None,
        }
    }

    pub fn is_eliminated(&self) -> bool {
        self.flags.eliminated
    }

    /// Moving and not knocked out; the players that bound section generation
    pub fn is_running(&self) -> bool {
        self.can_move && !self.flags.eliminated
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed.map_or(1.0, |effect| effect.multiplier)
    }

    /// Raise distance, ignoring regressions. Returns whether anything changed.
    pub(crate) fn advance_to(&mut self, distance: u32) -> bool {
        if distance <= self.distance {
            return false;
        }
        self.distance = distance;
        true
    }

    /// Take one life. Returns the lives left.
    pub(crate) fn lose_life(&mut self) -> u32 {
        self.lives = self.lives.saturating_sub(1);
        self.can_move = false;
        if self.lives == 0 {
            self.flags.eliminated = true;
            self.flags.stunned = false;
            self.speed = None;
        } else {
            self.flags.stunned = true;
        }
        self.lives
    }

    pub(crate) fn apply_speed(&mut self, multiplier: f32, duration: f32) {
        self.speed = Some(SpeedEffect {
            multiplier,
            remaining: duration,
        });
    }

    /// Count down an active speed effect. Returns true when it just expired.
    pub(crate) fn tick_speed(&mut self, delta: f32) -> bool {
        let Some(effect) = self.speed.as_mut() else {
            return false;
        };
        effect.remaining -= delta;
        if effect.remaining <= 0.0 {
            self.speed = None;
            return true;
        }
        false
    }
}

/// Compact player state for replication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub distance: u32,
    pub coins: u32,
    pub lives: u32,
    pub rank: u32,
    pub can_move: bool,
    pub stunned: bool,
    pub eliminated: bool,
    pub speed_multiplier: f32,
}

impl From<&PlayerRaceState> for PlayerSnapshot {
    fn from(state: &PlayerRaceState) -> Self {
        Self {
            id: state.id,
            name: state.name.clone(),
            distance: state.distance,
            coins: state.coins,
            lives: state.lives,
            rank: state.rank,
            can_move: state.can_move,
            stunned: state.flags.stunned,
            eliminated: state.flags.eliminated,
            speed_multiplier: state.speed_multiplier(),
        }
    }
}
