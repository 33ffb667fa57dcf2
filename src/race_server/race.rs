//! Race - The authoritative race coordinator
//!
//! Owns every player record, the section generator and the elimination
//! count, and walks the run through Waiting → Countdown → Racing → Finished.
//! All writes to shared race state go through here; everyone else reads
//! [`RaceSnapshot`]s.

use serde::{Deserialize, Serialize};

use crate::race_server::config::RaceConfig;
use crate::race_server::elimination::EliminationTracker;
use crate::race_server::error::{RaceError, Result};
use crate::race_server::events::{EventBus, PowerUpKind, RaceEvent, Subscription};
use crate::race_server::leaderboard::LeaderboardEntry;
use crate::race_server::player::{PlayerId, PlayerRaceState, PlayerSnapshot};
use crate::race_server::ranking::{finalize_rankings, RaceResult, RankingInput};
use crate::race_server::sections::{SectionGenerator, SectionId};
use crate::race_server::sequence::Timeline;

/// Race phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RacePhase {
    Waiting,
    Countdown,
    Racing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountdownStep {
    Tick(u32),
    Go,
}

/// What a hit did to the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageOutcome {
    /// Lost a life, frozen until resumed
    Stunned { lives_left: u32 },
    /// Lost the last life
    Eliminated,
    /// Already out; nothing changed
    AlreadyEliminated,
}

/// Complete race coordinator state
pub struct RaceCoordinator {
    config: RaceConfig,
    phase: RacePhase,
    /// In join order
    players: Vec<PlayerRaceState>,
    sections: SectionGenerator,
    eliminations: EliminationTracker,
    events: EventBus,
    countdown: Option<Timeline<CountdownStep>>,
    /// Last number announced by the countdown
    countdown_tick: Option<u32>,
    grace: Option<Timeline<()>>,
    results: Vec<RaceResult>,
    announced_all_joined: bool,
    announced_all_ready: bool,
    leaderboard_submitted: bool,
    /// Seconds since the start signal
    elapsed_time: f32,
}

impl RaceCoordinator {
    pub fn new(config: RaceConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    /// Coordinator whose section layouts are reproducible from `seed`
    pub fn with_seed(config: RaceConfig, seed: u64) -> Self {
        Self {
            sections: SectionGenerator::new(config.sections.clone(), seed),
            eliminations: EliminationTracker::new(config.max_players),
            config,
            phase: RacePhase::Waiting,
            players: Vec::new(),
            events: EventBus::new(),
            countdown: None,
            countdown_tick: None,
            grace: None,
            results: Vec::new(),
            announced_all_joined: false,
            announced_all_ready: false,
            leaderboard_submitted: false,
            elapsed_time: 0.0,
        }
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn players(&self) -> &[PlayerRaceState] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerRaceState> {
        self.players.iter().find(|p| p.id == id)
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut PlayerRaceState> {
        self.players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RaceError::UnknownPlayer(id))
    }

    pub fn sections(&self) -> &SectionGenerator {
        &self.sections
    }

    pub fn eliminated_count(&self) -> u32 {
        self.eliminations.eliminated_count()
    }

    pub fn results(&self) -> &[RaceResult] {
        &self.results
    }

    /// Register a listener for race events
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&RaceEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Deliver queued events to listeners and return them
    pub fn dispatch_events(&mut self) -> Vec<RaceEvent> {
        self.events.process()
    }

    // ------------------------------------------------------------------
    // Lobby
    // ------------------------------------------------------------------

    /// Take the next free slot
    pub fn add_player(&mut self, id: PlayerId, name: impl Into<String>) -> Result<()> {
        let max = self.config.max_players;
        if self.players.len() as u32 >= max {
            return Err(RaceError::CapacityExceeded { max });
        }
        if self.phase != RacePhase::Waiting {
            return Err(RaceError::invalid("add_player", self.phase));
        }
        if self.player(id).is_some() {
            return Err(RaceError::invalid("add_player (already joined)", self.phase));
        }

        let name = name.into();
        let slot = self.players.len() as u32;
        self.players.push(PlayerRaceState::new(
            id,
            name.clone(),
            slot,
            self.config.starting_lives,
        ));
        log::info!(
            "Player {} ({}) joined slot {} ({}/{})",
            id,
            name,
            slot,
            self.players.len(),
            max
        );
        self.events.publish(RaceEvent::PlayerJoined { id, name, slot });

        if self.all_players_joined() && !self.announced_all_joined {
            self.announced_all_joined = true;
            log::info!("All {} players joined, waiting for avatars", max);
            self.events.publish(RaceEvent::AllPlayersJoined);
            self.announce_ready_if_complete();
        }
        Ok(())
    }

    pub fn all_players_joined(&self) -> bool {
        self.players.len() as u32 == self.config.max_players
    }

    pub fn all_avatars_ready(&self) -> bool {
        self.all_players_joined() && self.players.iter().all(|p| p.flags.avatar_ready)
    }

    /// Avatar provider reports a player's avatar as loaded
    pub fn mark_avatar_ready(&mut self, id: PlayerId) -> Result<()> {
        let player = self.player_mut(id)?;
        if player.flags.avatar_ready {
            return Ok(());
        }
        player.flags.avatar_ready = true;
        log::debug!("Avatar ready for player {}", id);
        self.announce_ready_if_complete();
        Ok(())
    }

    fn announce_ready_if_complete(&mut self) {
        if !self.all_avatars_ready() || self.announced_all_ready {
            return;
        }
        self.announced_all_ready = true;
        log::info!("All avatars ready");
        self.events.publish(RaceEvent::AllAvatarsReady);
        if self.phase == RacePhase::Waiting {
            self.begin_countdown();
        }
    }

    /// Begin the start sequence. Needs a full lobby with every avatar ready.
    pub fn start_countdown(&mut self) -> Result<()> {
        if self.phase != RacePhase::Waiting || !self.all_avatars_ready() {
            return Err(RaceError::invalid("start_countdown", self.phase));
        }
        self.begin_countdown();
        Ok(())
    }

    fn begin_countdown(&mut self) {
        let lead_in = self.config.countdown_lead_in;
        let interval = self.config.countdown_interval;

        let mut timeline = Timeline::new();
        let mut delay = lead_in;
        for n in (1..=self.config.countdown_ticks).rev() {
            timeline = timeline.then(delay, CountdownStep::Tick(n));
            delay = interval;
        }
        timeline = timeline.then(delay, CountdownStep::Go);

        self.phase = RacePhase::Countdown;
        self.countdown = Some(timeline);
        self.countdown_tick = None;
        self.sections.start();
        log::info!("Countdown started");
        self.events.publish(RaceEvent::CountdownStarted);
    }

    fn begin_racing(&mut self) {
        self.phase = RacePhase::Racing;
        self.countdown_tick = None;
        self.elapsed_time = 0.0;
        // Everyone is released on the same tick
        for player in &mut self.players {
            player.can_move = true;
        }
        log::info!("Race started with {} players", self.players.len());
        self.events.publish(RaceEvent::RaceStarted);
    }

    // ------------------------------------------------------------------
    // Racing
    // ------------------------------------------------------------------

    /// Record progress. Regressions are ignored.
    pub fn update_distance(&mut self, id: PlayerId, distance: u32) -> Result<()> {
        let phase = self.phase;
        if phase != RacePhase::Racing {
            return Err(RaceError::invalid("update_distance", phase));
        }
        let player = self.player_mut(id)?;
        if !player.can_move {
            return Err(RaceError::invalid("update_distance", phase));
        }
        player.advance_to(distance);
        Ok(())
    }

    pub fn collect_coin(&mut self, id: PlayerId) -> Result<()> {
        let phase = self.phase;
        let player = self.player_mut(id)?;
        if !player.can_move {
            return Err(RaceError::invalid("collect_coin", phase));
        }
        player.coins += 1;
        Ok(())
    }

    /// Obstacle hit: one life lost
    pub fn apply_damage(&mut self, id: PlayerId) -> Result<DamageOutcome> {
        let phase = self.phase;
        if phase != RacePhase::Racing {
            return Err(RaceError::invalid("apply_damage", phase));
        }
        let player = self.player_mut(id)?;
        if player.is_eliminated() {
            return Ok(DamageOutcome::AlreadyEliminated);
        }

        let lives_left = player.lose_life();
        let distance = player.distance;
        if lives_left > 0 {
            log::info!("Player {} stunned, {} lives left", id, lives_left);
            self.events.publish(RaceEvent::PlayerStunned(id));
            return Ok(DamageOutcome::Stunned { lives_left });
        }

        self.eliminations.record_elimination(id);
        log::info!(
            "Player {} eliminated at distance {} ({}/{})",
            id,
            distance,
            self.eliminations.eliminated_count(),
            self.eliminations.total()
        );
        self.events.publish(RaceEvent::PlayerEliminated(id));

        if self.eliminations.is_race_over() {
            self.finish();
        } else if self.eliminations.is_last_survivor() && self.grace.is_none() {
            log::info!(
                "One runner left, ranking in {}s",
                self.config.grace_period
            );
            self.grace = Some(Timeline::after(self.config.grace_period, ()));
        }
        Ok(DamageOutcome::Eliminated)
    }

    /// Stun recovery, scheduled by the caller once the stun window is over
    pub fn resume_player(&mut self, id: PlayerId) -> Result<()> {
        let phase = self.phase;
        if phase != RacePhase::Racing {
            return Err(RaceError::invalid("resume_player", phase));
        }
        let player = self.player_mut(id)?;
        if player.is_eliminated() || !player.flags.stunned {
            return Err(RaceError::invalid("resume_player", phase));
        }
        player.flags.stunned = false;
        player.can_move = true;
        log::debug!("Player {} resumed", id);
        self.events.publish(RaceEvent::PlayerResumed(id));
        Ok(())
    }

    pub fn apply_power_up(&mut self, collector: PlayerId, kind: PowerUpKind) -> Result<()> {
        let phase = self.phase;
        if phase != RacePhase::Racing {
            return Err(RaceError::invalid("apply_power_up", phase));
        }
        if !self.player_mut(collector)?.can_move {
            return Err(RaceError::invalid("apply_power_up", phase));
        }

        let power_ups = &self.config.power_ups;
        let (multiplier, duration) = match kind {
            PowerUpKind::SpeedUp => (power_ups.speed_up_multiplier, power_ups.duration),
            PowerUpKind::SlowDown => (power_ups.slow_down_multiplier, power_ups.duration),
        };
        for player in &mut self.players {
            let affected = match kind {
                PowerUpKind::SpeedUp => player.id == collector,
                PowerUpKind::SlowDown => player.id != collector && !player.is_eliminated(),
            };
            if affected {
                player.apply_speed(multiplier, duration);
            }
        }
        log::debug!("Player {} used {:?}", collector, kind);
        self.events
            .publish(RaceEvent::PowerUpApplied { collector, kind });
        Ok(())
    }

    /// Scene-side teardown of a section; frees a generation slot
    pub fn on_section_retired(&mut self) -> Option<SectionId> {
        let section = self.sections.on_section_retired()?;
        self.events.publish(RaceEvent::SectionRetired(section.id));
        Some(section.id)
    }

    fn running_distances(&self) -> impl Iterator<Item = u32> + '_ {
        self.players
            .iter()
            .filter(|p| p.is_running())
            .map(|p| p.distance)
    }

    /// Distance of the furthest player still moving, 0 when nobody is
    pub fn furthest_running_z(&self) -> f32 {
        self.running_distances().max().unwrap_or(0) as f32
    }

    /// Distance of the furthest-behind player still moving
    pub fn trailing_running_z(&self) -> Option<f32> {
        self.running_distances().min().map(|d| d as f32)
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    /// Advance every timed sequence by `delta` seconds
    pub fn advance(&mut self, delta: f32) {
        if let Some(countdown) = self.countdown.as_mut() {
            let due = countdown.advance(delta);
            let finished = countdown.is_finished();
            for step in due {
                match step {
                    CountdownStep::Tick(n) => {
                        self.countdown_tick = Some(n);
                        log::info!("Countdown {}", n);
                        self.events.publish(RaceEvent::CountdownTick(n));
                    }
                    CountdownStep::Go => self.begin_racing(),
                }
            }
            if finished {
                self.countdown = None;
            }
        }

        if self.phase == RacePhase::Racing {
            self.elapsed_time += delta;
            for player in &mut self.players {
                if player.tick_speed(delta) {
                    log::debug!("Speed effect on player {} expired", player.id);
                }
            }

            let grace_over = self
                .grace
                .as_mut()
                .map_or(false, |grace| !grace.advance(delta).is_empty());
            if grace_over {
                self.finish();
            }
        }

        if self.sections.is_running() {
            let furthest = self.furthest_running_z();
            if let Some(section) = self.sections.poll(delta, furthest) {
                self.events.publish(RaceEvent::SectionSpawned {
                    id: section.id,
                    start_offset: section.start_offset,
                    variant: section.variant,
                });
            }
            if let Some(trailing) = self.trailing_running_z() {
                for section in self.sections.retire_behind(trailing) {
                    self.events.publish(RaceEvent::SectionRetired(section.id));
                }
            }
        }
    }

    fn finish(&mut self) {
        if let Some(mut grace) = self.grace.take() {
            grace.cancel();
        }

        let inputs: Vec<RankingInput> = self
            .players
            .iter()
            .map(|p| RankingInput::from_state(p, self.eliminations.elimination_order(p.id)))
            .collect();
        let results = finalize_rankings(&inputs);

        for result in &results {
            if let Some(player) = self.players.iter_mut().find(|p| p.id == result.player_id) {
                player.rank = result.rank;
                player.can_move = false;
            }
            log::info!(
                "Rank {}: {} with distance {}",
                result.rank,
                result.player_name,
                result.distance
            );
        }

        self.sections.stop();
        self.phase = RacePhase::Finished;
        self.results = results.clone();
        log::info!("Race finished after {:.1}s", self.elapsed_time);
        self.events.publish(RaceEvent::RaceFinished(results));
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Back to an empty lobby. Pending countdown and grace period are dropped
    /// without firing.
    pub fn reset(&mut self) {
        if let Some(mut countdown) = self.countdown.take() {
            countdown.cancel();
        }
        if let Some(mut grace) = self.grace.take() {
            grace.cancel();
        }

        self.players.clear();
        self.sections.reset();
        self.eliminations.reset();
        self.results.clear();
        self.phase = RacePhase::Waiting;
        self.countdown_tick = None;
        self.announced_all_joined = false;
        self.announced_all_ready = false;
        self.leaderboard_submitted = false;
        self.elapsed_time = 0.0;

        log::info!("Race reset");
        self.events.publish(RaceEvent::RaceReset);
    }

    /// Final (name, distance) pairs of a finished race, until they are
    /// confirmed as submitted
    pub fn pending_leaderboard_entries(&self) -> Option<Vec<LeaderboardEntry>> {
        if self.phase != RacePhase::Finished || self.leaderboard_submitted {
            return None;
        }
        Some(self.results.iter().map(LeaderboardEntry::from).collect())
    }

    /// Called once every entry reached the leaderboard
    pub fn confirm_leaderboard_submitted(&mut self) {
        if self.phase == RacePhase::Finished {
            self.leaderboard_submitted = true;
        }
    }

    /// Read-only view for observers
    pub fn snapshot(&self) -> RaceSnapshot {
        RaceSnapshot {
            phase: self.phase,
            elapsed_time: self.elapsed_time,
            countdown: self.countdown_tick,
            players: self.players.iter().map(PlayerSnapshot::from).collect(),
            active_sections: self.sections.active_count(),
            frontier_z: self.sections.frontier_z(),
            eliminated_count: self.eliminations.eliminated_count(),
            rankings: self.results.clone(),
        }
    }
}

/// Compact race snapshot for replication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub phase: RacePhase,
    pub elapsed_time: f32,
    pub countdown: Option<u32>,
    pub players: Vec<PlayerSnapshot>,
    pub active_sections: u32,
    pub frontier_z: f32,
    pub eliminated_count: u32,
    /// Empty until the race is finished
    pub rankings: Vec<RaceResult>,
}

impl RaceSnapshot {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    const P1: PlayerId = PlayerId(1);
    const P2: PlayerId = PlayerId(2);
    const P3: PlayerId = PlayerId(3);

    fn coordinator(max_players: u32) -> RaceCoordinator {
        RaceCoordinator::with_seed(RaceConfig::with_max_players(max_players), 42)
    }

    fn record(coord: &RaceCoordinator) -> (Subscription, Arc<Mutex<Vec<RaceEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = coord.subscribe(move |e| sink.lock().push(e.clone()));
        (sub, seen)
    }

    /// Three joined, ready players past the start signal
    fn racing_three() -> RaceCoordinator {
        let mut coord = coordinator(3);
        for (id, name) in [(P1, "Ann"), (P2, "Bob"), (P3, "Cid")] {
            coord.add_player(id, name).unwrap();
            coord.mark_avatar_ready(id).unwrap();
        }
        coord.advance(10.0);
        assert_eq!(coord.phase(), RacePhase::Racing);
        coord
    }

    fn eliminate(coord: &mut RaceCoordinator, id: PlayerId) {
        for _ in 0..3 {
            coord.apply_damage(id).unwrap();
        }
    }

    #[test]
    fn join_creates_fresh_record() {
        let mut coord = coordinator(2);
        coord.add_player(P1, "Ann").unwrap();
        let p = coord.player(P1).unwrap();
        assert_eq!((p.lives, p.distance, p.coins, p.rank), (3, 0, 0, 0));
        assert!(!p.can_move);
        assert!(!coord.all_players_joined());
    }

    #[test]
    fn join_beyond_capacity_leaves_state_untouched() {
        let mut coord = coordinator(2);
        coord.add_player(P1, "Ann").unwrap();
        coord.add_player(P2, "Bob").unwrap();
        let before = coord.snapshot();

        assert_eq!(
            coord.add_player(P3, "Cid"),
            Err(RaceError::CapacityExceeded { max: 2 })
        );
        assert_eq!(coord.snapshot(), before);
    }

    #[test]
    fn duplicate_join_is_rejected() {
        let mut coord = coordinator(3);
        coord.add_player(P1, "Ann").unwrap();
        assert!(matches!(
            coord.add_player(P1, "Ann again"),
            Err(RaceError::InvalidTransition { .. })
        ));
        assert_eq!(coord.players().len(), 1);
    }

    #[test]
    fn all_joined_is_announced_once() {
        let mut coord = coordinator(2);
        let (_sub, seen) = record(&coord);
        coord.add_player(P1, "Ann").unwrap();
        coord.add_player(P2, "Bob").unwrap();
        coord.dispatch_events();

        let count = seen
            .lock()
            .iter()
            .filter(|e| **e == RaceEvent::AllPlayersJoined)
            .count();
        assert_eq!(count, 1);
        assert!(coord.all_players_joined());
        assert_eq!(coord.phase(), RacePhase::Waiting);
    }

    #[test]
    fn countdown_waits_for_avatars() {
        let mut coord = coordinator(2);
        coord.add_player(P1, "Ann").unwrap();
        coord.add_player(P2, "Bob").unwrap();
        assert!(matches!(
            coord.start_countdown(),
            Err(RaceError::InvalidTransition { .. })
        ));

        coord.mark_avatar_ready(P1).unwrap();
        coord.mark_avatar_ready(P1).unwrap();
        assert_eq!(coord.phase(), RacePhase::Waiting);

        coord.mark_avatar_ready(P2).unwrap();
        assert_eq!(coord.phase(), RacePhase::Countdown);
        assert!(coord.sections().is_running());
        assert!(matches!(
            coord.start_countdown(),
            Err(RaceError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn ready_before_full_lobby_starts_on_last_join() {
        let mut coord = coordinator(2);
        coord.add_player(P1, "Ann").unwrap();
        coord.mark_avatar_ready(P1).unwrap();
        coord.add_player(P2, "Bob").unwrap();
        assert_eq!(coord.phase(), RacePhase::Waiting);
        coord.mark_avatar_ready(P2).unwrap();
        assert_eq!(coord.phase(), RacePhase::Countdown);
    }

    #[test]
    fn countdown_sequence_releases_everyone_together() {
        let mut coord = coordinator(2);
        let (_sub, seen) = record(&coord);
        for id in [P1, P2] {
            coord.add_player(id, "x").unwrap();
            coord.mark_avatar_ready(id).unwrap();
        }

        coord.advance(1.0);
        assert_eq!(coord.snapshot().countdown, None);
        coord.advance(0.6);
        assert_eq!(coord.snapshot().countdown, Some(3));
        coord.advance(0.7);
        assert_eq!(coord.snapshot().countdown, Some(2));
        coord.advance(0.7);
        assert_eq!(coord.snapshot().countdown, Some(1));
        assert_eq!(coord.phase(), RacePhase::Countdown);
        assert!(coord.players().iter().all(|p| !p.can_move));

        coord.advance(0.7);
        assert_eq!(coord.phase(), RacePhase::Racing);
        assert!(coord.players().iter().all(|p| p.can_move));

        coord.dispatch_events();
        let timeline: Vec<RaceEvent> = seen
            .lock()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    RaceEvent::CountdownStarted | RaceEvent::CountdownTick(_) | RaceEvent::RaceStarted
                )
            })
            .cloned()
            .collect();
        assert_eq!(
            timeline,
            vec![
                RaceEvent::CountdownStarted,
                RaceEvent::CountdownTick(3),
                RaceEvent::CountdownTick(2),
                RaceEvent::CountdownTick(1),
                RaceEvent::RaceStarted,
            ]
        );
    }

    #[test]
    fn distance_only_grows_while_racing() {
        let mut coord = coordinator(1);
        coord.add_player(P1, "Ann").unwrap();
        assert!(matches!(
            coord.update_distance(P1, 5),
            Err(RaceError::InvalidTransition { .. })
        ));
        coord.mark_avatar_ready(P1).unwrap();
        coord.advance(10.0);

        let mut last = 0;
        for d in [10, 25, 7, 25, 3, 40, 39] {
            coord.update_distance(P1, d).unwrap();
            let now = coord.player(P1).unwrap().distance;
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 40);
    }

    #[test]
    fn unknown_player_is_reported() {
        let mut coord = racing_three();
        let ghost = PlayerId(99);
        assert_eq!(coord.update_distance(ghost, 1), Err(RaceError::UnknownPlayer(ghost)));
        assert_eq!(coord.collect_coin(ghost), Err(RaceError::UnknownPlayer(ghost)));
        assert_eq!(coord.apply_damage(ghost), Err(RaceError::UnknownPlayer(ghost)));
        assert_eq!(coord.mark_avatar_ready(ghost), Err(RaceError::UnknownPlayer(ghost)));
    }

    #[test]
    fn coins_need_a_moving_player() {
        let mut coord = coordinator(1);
        coord.add_player(P1, "Ann").unwrap();
        assert!(matches!(
            coord.collect_coin(P1),
            Err(RaceError::InvalidTransition { phase: RacePhase::Waiting, .. })
        ));
        coord.mark_avatar_ready(P1).unwrap();
        coord.advance(10.0);
        coord.collect_coin(P1).unwrap();
        coord.collect_coin(P1).unwrap();
        assert_eq!(coord.player(P1).unwrap().coins, 2);
    }

    #[test]
    fn stun_freezes_until_resumed() {
        let mut coord = racing_three();
        let (_sub, seen) = record(&coord);

        assert_eq!(
            coord.apply_damage(P1),
            Ok(DamageOutcome::Stunned { lives_left: 2 })
        );
        assert!(!coord.player(P1).unwrap().can_move);
        assert!(coord.update_distance(P1, 10).is_err());
        assert!(coord.collect_coin(P1).is_err());

        coord.resume_player(P1).unwrap();
        assert!(coord.player(P1).unwrap().can_move);
        assert!(coord.resume_player(P1).is_err());
        coord.update_distance(P1, 10).unwrap();

        coord.dispatch_events();
        let seen = seen.lock();
        assert!(seen.contains(&RaceEvent::PlayerStunned(P1)));
        assert!(seen.contains(&RaceEvent::PlayerResumed(P1)));
    }

    #[test]
    fn three_hits_eliminate_exactly_once() {
        let mut coord = racing_three();
        let (_sub, seen) = record(&coord);

        assert!(matches!(coord.apply_damage(P1), Ok(DamageOutcome::Stunned { .. })));
        assert!(matches!(coord.apply_damage(P1), Ok(DamageOutcome::Stunned { .. })));
        assert_eq!(coord.apply_damage(P1), Ok(DamageOutcome::Eliminated));
        assert_eq!(coord.apply_damage(P1), Ok(DamageOutcome::AlreadyEliminated));
        assert_eq!(coord.apply_damage(P1), Ok(DamageOutcome::AlreadyEliminated));

        let p = coord.player(P1).unwrap();
        assert_eq!(p.lives, 0);
        assert!(!p.can_move);
        assert_eq!(coord.eliminated_count(), 1);
        assert!(coord.resume_player(P1).is_err());

        coord.dispatch_events();
        let eliminated = seen
            .lock()
            .iter()
            .filter(|e| **e == RaceEvent::PlayerEliminated(P1))
            .count();
        assert_eq!(eliminated, 1);
    }

    #[test]
    fn last_survivor_gets_a_grace_period() {
        let mut coord = racing_three();
        coord.update_distance(P1, 50).unwrap();
        coord.update_distance(P2, 80).unwrap();
        coord.update_distance(P3, 30).unwrap();

        eliminate(&mut coord, P3);
        eliminate(&mut coord, P1);
        assert_eq!(coord.eliminated_count(), 2);
        assert_eq!(coord.phase(), RacePhase::Racing);

        // Survivor's last report lands inside the window
        coord.advance(0.5);
        coord.update_distance(P2, 95).unwrap();
        assert_eq!(coord.phase(), RacePhase::Racing);

        coord.advance(0.6);
        assert_eq!(coord.phase(), RacePhase::Finished);
        assert!(!coord.sections().is_running());
        assert!(coord.players().iter().all(|p| !p.can_move));

        let ranks: Vec<(PlayerId, u32, u32)> = coord
            .results()
            .iter()
            .map(|r| (r.player_id, r.distance, r.rank))
            .collect();
        assert_eq!(ranks, vec![(P2, 95, 1), (P1, 50, 2), (P3, 30, 3)]);
        assert_eq!(coord.player(P2).unwrap().rank, 1);
    }

    #[test]
    fn everyone_out_finishes_immediately() {
        let mut coord = racing_three();
        let (_sub, seen) = record(&coord);
        coord.update_distance(P1, 50).unwrap();
        coord.update_distance(P2, 80).unwrap();
        coord.update_distance(P3, 30).unwrap();

        eliminate(&mut coord, P1);
        eliminate(&mut coord, P2);
        // Last one goes down inside the grace window
        eliminate(&mut coord, P3);

        assert_eq!(coord.phase(), RacePhase::Finished);
        assert!(!coord.sections().is_running());

        // The cancelled grace period must not finish the race a second time
        coord.advance(5.0);
        coord.dispatch_events();
        let finished: Vec<Vec<RaceResult>> = seen
            .lock()
            .iter()
            .filter_map(|e| match e {
                RaceEvent::RaceFinished(results) => Some(results.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(finished.len(), 1);
        let order: Vec<PlayerId> = finished[0].iter().map(|r| r.player_id).collect();
        assert_eq!(order, vec![P2, P1, P3]);
    }

    #[test]
    fn finished_race_rejects_mutation() {
        let mut coord = racing_three();
        for id in [P1, P2, P3] {
            eliminate(&mut coord, id);
        }
        assert!(matches!(
            coord.apply_damage(P1),
            Err(RaceError::InvalidTransition { phase: RacePhase::Finished, .. })
        ));
        assert!(coord.update_distance(P1, 500).is_err());
        assert!(coord.collect_coin(P1).is_err());
    }

    #[test]
    fn ranks_are_unique_after_finish() {
        let mut coord = racing_three();
        for id in [P1, P2, P3] {
            coord.update_distance(id, 10).unwrap();
        }
        for id in [P2, P3, P1] {
            eliminate(&mut coord, id);
        }
        let mut ranks: Vec<u32> = coord.players().iter().map(|p| p.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3]);
        // Everybody out at equal distance: join order decides
        assert_eq!(coord.player(P1).unwrap().rank, 1);
        assert_eq!(coord.player(P2).unwrap().rank, 2);
        assert_eq!(coord.player(P3).unwrap().rank, 3);
    }

    #[test]
    fn survivor_wins_a_distance_tie() {
        let mut coord = racing_three();
        for id in [P1, P2, P3] {
            coord.update_distance(id, 10).unwrap();
        }
        eliminate(&mut coord, P1);
        eliminate(&mut coord, P3);
        coord.advance(1.01);

        assert_eq!(coord.phase(), RacePhase::Finished);
        assert_eq!(coord.player(P2).unwrap().rank, 1);
        assert_eq!(coord.player(P1).unwrap().rank, 2);
        assert_eq!(coord.player(P3).unwrap().rank, 3);
    }

    #[test]
    fn sections_follow_the_leader_and_respect_the_cap() {
        let mut coord = racing_three();
        let initial = coord.sections().active_count();
        assert!(initial > 0);

        for step in 1..=400u32 {
            for id in [P1, P2, P3] {
                coord.update_distance(id, step * 2).unwrap();
            }
            coord.advance(0.5);
            assert!(coord.sections().active_count() <= coord.sections().max_active());
        }
        // Everybody at 800: frontier stays within reach and old sections are gone
        assert!(coord.sections().frontier_z() > 800.0);
        assert!(coord
            .sections()
            .active_sections()
            .all(|s| s.start_offset >= 800.0 - 30.0));
    }

    #[test]
    fn power_ups_change_speed_temporarily() {
        let mut coord = racing_three();
        coord.apply_power_up(P1, PowerUpKind::SpeedUp).unwrap();
        assert_eq!(coord.player(P1).unwrap().speed_multiplier(), 2.0);
        assert_eq!(coord.player(P2).unwrap().speed_multiplier(), 1.0);

        eliminate(&mut coord, P3);
        coord.apply_power_up(P2, PowerUpKind::SlowDown).unwrap();
        assert_eq!(coord.player(P1).unwrap().speed_multiplier(), 0.5);
        assert_eq!(coord.player(P2).unwrap().speed_multiplier(), 1.0);
        assert_eq!(coord.player(P3).unwrap().speed_multiplier(), 1.0);

        coord.advance(3.5);
        assert!(coord.players().iter().all(|p| p.speed_multiplier() == 1.0));
    }

    #[test]
    fn reset_cancels_pending_countdown() {
        let mut coord = coordinator(1);
        let (_sub, seen) = record(&coord);
        coord.add_player(P1, "Ann").unwrap();
        coord.mark_avatar_ready(P1).unwrap();
        coord.advance(1.6);
        assert_eq!(coord.phase(), RacePhase::Countdown);

        coord.reset();
        coord.dispatch_events();
        seen.lock().clear();

        coord.advance(10.0);
        coord.dispatch_events();
        assert!(seen.lock().is_empty());
        assert_eq!(coord.phase(), RacePhase::Waiting);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut coord = racing_three();
        coord.update_distance(P1, 100).unwrap();
        coord.advance(2.0);
        eliminate(&mut coord, P2);
        eliminate(&mut coord, P3);

        coord.reset();
        let snap = coord.snapshot();
        assert!(snap.players.is_empty());
        assert_eq!(snap.phase, RacePhase::Waiting);
        assert_eq!(snap.frontier_z, 20.0);
        assert_eq!(snap.active_sections, 0);
        assert_eq!(snap.eliminated_count, 0);
        assert!(snap.rankings.is_empty());

        // Pending grace period is gone too
        coord.advance(5.0);
        assert_eq!(coord.phase(), RacePhase::Waiting);

        // A fresh race can be run
        coord.add_player(P1, "Ann").unwrap();
        assert_eq!(coord.player(P1).unwrap().lives, 3);
    }

    #[test]
    fn leaderboard_entries_stay_pending_until_confirmed() {
        let mut coord = racing_three();
        assert!(coord.pending_leaderboard_entries().is_none());
        coord.update_distance(P2, 77).unwrap();
        for id in [P1, P2, P3] {
            eliminate(&mut coord, id);
        }
        let entries = coord.pending_leaderboard_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "Bob");
        assert_eq!(entries[0].score, 77);
        assert_eq!(coord.pending_leaderboard_entries(), Some(entries));

        coord.confirm_leaderboard_submitted();
        assert!(coord.pending_leaderboard_entries().is_none());
    }
}
