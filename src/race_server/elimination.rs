//! Elimination - Who is out, in what order, and whether the race is over

use serde::{Deserialize, Serialize};

use crate::race_server::player::PlayerId;

/// Counts knocked-out players against the size of the field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EliminationTracker {
    total: u32,
    order: Vec<PlayerId>,
}

impl EliminationTracker {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            order: Vec::new(),
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Mark a player as out. Returns false when they were already counted.
    pub fn record_elimination(&mut self, id: PlayerId) -> bool {
        if self.order.contains(&id) {
            return false;
        }
        self.order.push(id);
        true
    }

    pub fn eliminated_count(&self) -> u32 {
        self.order.len() as u32
    }

    pub fn is_eliminated(&self, id: PlayerId) -> bool {
        self.order.contains(&id)
    }

    /// 0 for the first player out
    pub fn elimination_order(&self, id: PlayerId) -> Option<u32> {
        self.order.iter().position(|p| *p == id).map(|i| i as u32)
    }

    /// Everybody is out
    pub fn is_race_over(&self) -> bool {
        self.total > 0 && self.eliminated_count() >= self.total
    }

    /// Exactly one runner left in a field of two or more
    pub fn is_last_survivor(&self) -> bool {
        self.total >= 2 && self.eliminated_count() == self.total - 1
    }

    pub fn reset(&mut self) {
        self.order.clear();
    }
}
