//! Ranking - Final standings

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::race_server::player::{PlayerId, PlayerRaceState};

/// One player's standing at the end of a race
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceResult {
    pub player_id: PlayerId,
    pub player_name: String,
    pub distance: u32,
    pub coins: u32,
    /// 1-based
    pub rank: u32,
}

/// What the ranking needs to know about a player
#[derive(Debug, Clone)]
pub struct RankingInput {
    pub id: PlayerId,
    pub name: String,
    pub distance: u32,
    pub coins: u32,
    pub join_order: u32,
    /// Position in the elimination sequence, `None` while still alive
    pub eliminated_at: Option<u32>,
}

impl RankingInput {
    pub fn from_state(state: &PlayerRaceState, eliminated_at: Option<u32>) -> Self {
        Self {
            id: state.id,
            name: state.name.clone(),
            distance: state.distance,
            coins: state.coins,
            join_order: state.join_order,
            eliminated_at,
        }
    }

    fn is_survivor(&self) -> bool {
        self.eliminated_at.is_none()
    }
}

fn standing(a: &RankingInput, b: &RankingInput) -> Ordering {
    b.distance
        .cmp(&a.distance)
        .then_with(|| b.is_survivor().cmp(&a.is_survivor()))
        .then_with(|| a.join_order.cmp(&b.join_order))
        .then_with(|| a.id.cmp(&b.id))
}

/// Order players by distance (furthest first) and assign ranks 1..=N.
///
/// Equal distances go to a runner still in the race over eliminated ones,
/// otherwise to the earlier joiner. The result depends only on the input values, never on
/// their order.
pub fn finalize_rankings(players: &[RankingInput]) -> Vec<RaceResult> {
    let mut ordered: Vec<&RankingInput> = players.iter().collect();
    ordered.sort_by(|a, b| standing(a, b));

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, p)| RaceResult {
            player_id: p.id,
            player_name: p.name.clone(),
            distance: p.distance,
            coins: p.coins,
            rank: i as u32 + 1,
        })
        .collect()
}
