//! Leaderboard - One-shot export of final standings

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::race_server::race::RaceCoordinator;
use crate::race_server::ranking::RaceResult;

/// What the leaderboard service stores per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    /// Final distance
    pub score: u32,
}

impl From<&RaceResult> for LeaderboardEntry {
    fn from(result: &RaceResult) -> Self {
        Self {
            name: result.player_name.clone(),
            score: result.distance,
        }
    }
}

/// Destination for finished-race entries
pub trait LeaderboardSink {
    type Error;

    fn submit(&mut self, entry: &LeaderboardEntry) -> Result<(), Self::Error>;
}

/// Writes one JSON object per line
pub struct JsonLinesLeaderboard<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesLeaderboard<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LeaderboardSink for JsonLinesLeaderboard<W> {
    type Error = io::Error;

    fn submit(&mut self, entry: &LeaderboardEntry) -> Result<(), Self::Error> {
        serde_json::to_writer(&mut self.out, entry)?;
        self.out.write_all(b"\n")
    }
}

/// Submit the final entries of a finished race. Returns how many were sent;
/// 0 when the race is not finished or its entries were already submitted.
/// A failed submission can be retried.
pub fn submit_final_results<S: LeaderboardSink>(
    coordinator: &mut RaceCoordinator,
    sink: &mut S,
) -> Result<usize, S::Error> {
    let Some(entries) = coordinator.pending_leaderboard_entries() else {
        return Ok(0);
    };
    for entry in &entries {
        sink.submit(entry)?;
    }
    coordinator.confirm_leaderboard_submitted();
    log::info!("Submitted {} leaderboard entries", entries.len());
    Ok(entries.len())
}
