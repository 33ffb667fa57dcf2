//! Spectate - Following other runners after being knocked out

use crate::race_server::player::PlayerId;
use crate::race_server::race::{RacePhase, RaceSnapshot};

/// Camera target cycling for an eliminated viewer
#[derive(Debug, Clone)]
pub struct Spectator {
    viewer: PlayerId,
    targets: Vec<PlayerId>,
    index: usize,
}

impl Spectator {
    /// Start watching from the runners still alive in `snapshot`
    pub fn start(viewer: PlayerId, snapshot: &RaceSnapshot) -> Self {
        let mut spectator = Self {
            viewer,
            targets: Vec::new(),
            index: 0,
        };
        spectator.refresh(snapshot);
        spectator
    }

    fn alive_targets(&self, snapshot: &RaceSnapshot) -> Vec<PlayerId> {
        snapshot
            .players
            .iter()
            .filter(|p| p.id != self.viewer && !p.eliminated)
            .map(|p| p.id)
            .collect()
    }

    /// Drop runners that went out since the last snapshot. Stays on the
    /// current target while it is alive, otherwise moves to the next one.
    pub fn refresh(&mut self, snapshot: &RaceSnapshot) {
        let current = self.current();
        let targets = self.alive_targets(snapshot);

        self.index = match current.and_then(|id| targets.iter().position(|t| *t == id)) {
            Some(pos) => pos,
            // Whoever slid into the old slot is the "next" runner
            None if !targets.is_empty() => self.index.min(targets.len() - 1),
            None => 0,
        };
        self.targets = targets;
    }

    pub fn current(&self) -> Option<PlayerId> {
        self.targets.get(self.index).copied()
    }

    pub fn next(&mut self) -> Option<PlayerId> {
        if !self.targets.is_empty() {
            self.index = (self.index + 1) % self.targets.len();
        }
        self.current()
    }

    pub fn previous(&mut self) -> Option<PlayerId> {
        if !self.targets.is_empty() {
            self.index = (self.index + self.targets.len() - 1) % self.targets.len();
        }
        self.current()
    }

    /// Nothing left to watch: time for the podium
    pub fn should_show_podium(&self, snapshot: &RaceSnapshot) -> bool {
        snapshot.phase == RacePhase::Finished || self.targets.is_empty()
    }
}
