//! Server - The authority loop
//!
//! Owns the coordinator, drains queued observer commands, advances the race
//! clock and publishes a snapshot plus the tick's events to every connected
//! observer.

use std::time::Instant;

use flume::{Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::race_server::commands::RaceCommand;
use crate::race_server::config::RaceConfig;
use crate::race_server::events::RaceEvent;
use crate::race_server::race::{RaceCoordinator, RacePhase, RaceSnapshot};

/// Coarse server state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    /// Not ticking
    Idle,
    /// Waiting for players and avatars
    Lobby,
    /// Countdown or race in progress
    Racing,
    /// Final standings available
    Results,
}

/// Server statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStats {
    pub tick_rate: f32,
    pub avg_tick_time_ms: f32,
    pub player_count: u32,
    pub server_state: ServerState,
    pub rejected_commands: u64,
}

/// What observers receive after every tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceUpdate {
    pub snapshot: RaceSnapshot,
    pub events: Vec<RaceEvent>,
}

/// Observer side of the replication channel
#[derive(Clone)]
pub struct AuthorityHandle {
    commands: Sender<RaceCommand>,
    updates: Receiver<RaceUpdate>,
}

impl AuthorityHandle {
    /// Queue a request. Returns false once the authority is gone.
    pub fn send(&self, command: RaceCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Next update, if one is waiting
    pub fn try_recv(&self) -> Option<RaceUpdate> {
        self.updates.try_recv().ok()
    }

    /// Every waiting update, oldest first
    pub fn drain(&self) -> Vec<RaceUpdate> {
        self.updates.try_iter().collect()
    }
}

/// Main race server
pub struct RaceServer {
    coordinator: RaceCoordinator,
    command_tx: Sender<RaceCommand>,
    command_rx: Receiver<RaceCommand>,
    observers: Vec<Sender<RaceUpdate>>,
    /// Target tick rate (ticks per second)
    tick_rate: f32,
    last_tick: Instant,
    /// Recent tick durations for averaging
    tick_times: Vec<f32>,
    running: bool,
    rejected: u64,
}

impl RaceServer {
    pub fn new(config: RaceConfig) -> Self {
        Self::with_coordinator(RaceCoordinator::new(config))
    }

    pub fn with_coordinator(coordinator: RaceCoordinator) -> Self {
        let (command_tx, command_rx) = flume::unbounded();
        Self {
            coordinator,
            command_tx,
            command_rx,
            observers: Vec::new(),
            tick_rate: 60.0,
            last_tick: Instant::now(),
            tick_times: Vec::with_capacity(60),
            running: false,
            rejected: 0,
        }
    }

    /// Hand out a new observer connection
    pub fn connect(&mut self) -> AuthorityHandle {
        let (update_tx, update_rx) = flume::unbounded();
        self.observers.push(update_tx);
        AuthorityHandle {
            commands: self.command_tx.clone(),
            updates: update_rx,
        }
    }

    pub fn coordinator(&self) -> &RaceCoordinator {
        &self.coordinator
    }

    /// Begin ticking on the wall clock
    pub fn start(&mut self) {
        self.running = true;
        self.last_tick = Instant::now();
        log::info!("Race server started at {} ticks/s", self.tick_rate);
    }

    /// One tick using wall-clock time since the previous one
    pub fn tick(&mut self) -> RaceSnapshot {
        if !self.running {
            return self.coordinator.snapshot();
        }
        let now = Instant::now();
        let delta = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;
        self.step(delta)
    }

    /// One tick with an explicit time step
    pub fn step(&mut self, delta: f32) -> RaceSnapshot {
        let tick_start = Instant::now();

        loop {
            match self.command_rx.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        self.coordinator.advance(delta);
        let events = self.coordinator.dispatch_events();
        let snapshot = self.coordinator.snapshot();

        // Observers that hung up are dropped
        let update = RaceUpdate {
            snapshot: snapshot.clone(),
            events,
        };
        self.observers
            .retain(|observer| observer.send(update.clone()).is_ok());

        let tick_time = tick_start.elapsed().as_secs_f32() * 1000.0;
        self.tick_times.push(tick_time);
        if self.tick_times.len() > 60 {
            self.tick_times.remove(0);
        }

        snapshot
    }

    fn apply(&mut self, command: RaceCommand) {
        let name = command.name();
        if let Err(err) = command.apply(&mut self.coordinator) {
            self.rejected += 1;
            log::warn!("Rejected {} command: {}", name, err);
        }
    }

    pub fn get_snapshot(&self) -> RaceSnapshot {
        self.coordinator.snapshot()
    }

    pub fn get_state(&self) -> ServerState {
        if !self.running {
            return ServerState::Idle;
        }
        match self.coordinator.phase() {
            RacePhase::Waiting => ServerState::Lobby,
            RacePhase::Countdown | RacePhase::Racing => ServerState::Racing,
            RacePhase::Finished => ServerState::Results,
        }
    }

    pub fn get_stats(&self) -> ServerStats {
        let avg_tick_time = if self.tick_times.is_empty() {
            0.0
        } else {
            self.tick_times.iter().sum::<f32>() / self.tick_times.len() as f32
        };

        ServerStats {
            tick_rate: self.tick_rate,
            avg_tick_time_ms: avg_tick_time,
            player_count: self.coordinator.players().len() as u32,
            server_state: self.get_state(),
            rejected_commands: self.rejected,
        }
    }

    /// Give the coordinator to a caller that needs authority-only access
    /// (leaderboard submission, scripted setup)
    pub fn coordinator_mut(&mut self) -> &mut RaceCoordinator {
        &mut self.coordinator
    }

    /// Back to an empty lobby; queued commands from the old race are dropped
    pub fn reset(&mut self) {
        let stale = self.command_rx.drain().count();
        if stale > 0 {
            log::debug!("Dropped {} stale commands on reset", stale);
        }
        self.coordinator.reset();
        self.tick_times.clear();
        self.rejected = 0;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        if !self.running {
            self.running = true;
            self.last_tick = Instant::now();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}
