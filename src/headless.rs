//! Headless - Bot-driven races without a scene
//!
//! Bots play the observer role: they read the authority's updates and send
//! requests back over the same channel a real client would use.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::race_server::{
    AuthorityHandle, PlayerId, PlayerSnapshot, PowerUpKind, RaceCommand, RaceConfig,
    RaceCoordinator, RacePhase, RaceResult, RaceServer, RaceSnapshot,
};

/// Fixed step the authority is advanced by
pub const TICK: f32 = 1.0 / 60.0;

/// One bot-controlled runner
#[derive(Debug, Clone)]
struct Bot {
    id: PlayerId,
    name: String,
    position: f32,
    current_speed: f32,
    target_speed: f32,
    /// Seconds left before asking to move again
    stun_timer: Option<f32>,
}

impl Bot {
    const ACCELERATION_RATE: f32 = 4.0;
    const STUN_DURATION: f32 = 0.5;

    fn new(id: PlayerId, name: String, target_speed: f32) -> Self {
        Self {
            id,
            name,
            position: 0.0,
            current_speed: 0.0,
            target_speed,
            stun_timer: None,
        }
    }
}

/// Chances per second of things happening to a running bot
#[derive(Debug, Clone, Copy)]
struct BotBehaviour {
    coin_rate: f32,
    power_up_rate: f32,
    /// Obstacle rate at race start
    hazard_rate: f32,
    /// Added to the obstacle rate for every second of racing so races end
    hazard_growth: f32,
}

impl Default for BotBehaviour {
    fn default() -> Self {
        Self {
            coin_rate: 0.8,
            power_up_rate: 0.05,
            hazard_rate: 0.05,
            hazard_growth: 0.01,
        }
    }
}

/// A complete race: the authority plus one bot per slot
pub struct HeadlessRace {
    server: RaceServer,
    handle: AuthorityHandle,
    bots: Vec<Bot>,
    behaviour: BotBehaviour,
    rng: StdRng,
    latest: Option<RaceSnapshot>,
}

impl HeadlessRace {
    pub fn new(config: RaceConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bots = (0..config.max_players)
            .map(|i| {
                let id = PlayerId(u64::from(i) + 1);
                Bot::new(id, format!("Bot {}", i + 1), rng.gen_range(8.0..14.0))
            })
            .collect();

        let mut server = RaceServer::with_coordinator(RaceCoordinator::with_seed(config, seed));
        let handle = server.connect();

        Self {
            server,
            handle,
            bots,
            behaviour: BotBehaviour::default(),
            rng,
            latest: None,
        }
    }

    /// Rename the first bot, e.g. after the local player's settings
    pub fn with_player_name(mut self, name: impl Into<String>) -> Self {
        if let Some(bot) = self.bots.first_mut() {
            bot.name = name.into();
        }
        self
    }

    pub fn server(&self) -> &RaceServer {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut RaceServer {
        &mut self.server
    }

    /// Run until the race is finished or `time_limit` seconds have passed.
    /// Returns the last snapshot the authority published.
    pub fn run(&mut self, time_limit: f32) -> RaceSnapshot {
        for bot in &self.bots {
            self.handle.send(RaceCommand::Join {
                id: bot.id,
                name: bot.name.clone(),
            });
            self.handle.send(RaceCommand::AvatarReady { id: bot.id });
        }
        self.server.start();

        let mut clock = 0.0;
        loop {
            let snapshot = self.server.step(TICK);
            clock += TICK;

            for update in self.handle.drain() {
                for event in &update.events {
                    log::debug!("{:?}", event);
                }
                self.latest = Some(update.snapshot);
            }

            if snapshot.phase == RacePhase::Finished {
                log::info!("Race finished after {:.1}s", snapshot.elapsed_time);
                return snapshot;
            }
            if clock >= time_limit {
                log::warn!("Headless race hit its {:.0}s limit", time_limit);
                return snapshot;
            }

            self.drive_bots();
        }
    }

    fn drive_bots(&mut self) {
        let Some(snapshot) = self.latest.as_ref() else {
            return;
        };
        if snapshot.phase != RacePhase::Racing {
            return;
        }

        let hazard_rate =
            self.behaviour.hazard_rate + self.behaviour.hazard_growth * snapshot.elapsed_time;
        let mut commands = Vec::new();

        for bot in &mut self.bots {
            let Some(state) = snapshot.player(bot.id) else {
                continue;
            };
            if state.eliminated {
                continue;
            }
            if state.stunned {
                commands.extend(tick_stun(bot, state));
                continue;
            }
            if !state.can_move {
                continue;
            }

            // Smooth acceleration toward the bot's pace
            let accel = Bot::ACCELERATION_RATE * TICK;
            bot.current_speed = (bot.current_speed + accel).min(bot.target_speed);
            bot.position += bot.current_speed * state.speed_multiplier * TICK;

            let reached = bot.position.floor() as u32;
            if reached > state.distance {
                commands.push(RaceCommand::ReportDistance {
                    id: bot.id,
                    distance: reached,
                });
            }

            if self.rng.gen_bool(chance(self.behaviour.coin_rate)) {
                commands.push(RaceCommand::ReportCoin { id: bot.id });
            }
            if self.rng.gen_bool(chance(self.behaviour.power_up_rate)) {
                let kind = if self.rng.gen_bool(0.5) {
                    PowerUpKind::SpeedUp
                } else {
                    PowerUpKind::SlowDown
                };
                commands.push(RaceCommand::ReportPowerUp { id: bot.id, kind });
            }
            if self.rng.gen_bool(chance(hazard_rate)) {
                bot.current_speed = 0.0;
                bot.stun_timer = Some(Bot::STUN_DURATION);
                commands.push(RaceCommand::ReportCollision { id: bot.id });
            }
        }

        for command in commands {
            self.handle.send(command);
        }
    }

    /// Results the authority finalized, if the race is over
    pub fn results(&self) -> Option<Vec<RaceResult>> {
        let coordinator = self.server.coordinator();
        (coordinator.phase() == RacePhase::Finished).then(|| coordinator.results().to_vec())
    }
}

fn tick_stun(bot: &mut Bot, state: &PlayerSnapshot) -> Option<RaceCommand> {
    let remaining = bot.stun_timer.get_or_insert(Bot::STUN_DURATION);
    *remaining -= TICK;
    if *remaining > 0.0 {
        return None;
    }
    bot.stun_timer = None;
    Some(RaceCommand::ResumeMovement { id: state.id })
}

/// Per-tick probability for a per-second rate
fn chance(rate_per_second: f32) -> f64 {
    f64::from((rate_per_second * TICK).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bots_race_to_a_finish() {
        let mut race = HeadlessRace::new(RaceConfig::with_max_players(3), 11);
        let snapshot = race.run(600.0);

        assert_eq!(snapshot.phase, RacePhase::Finished);
        let results = race.results().unwrap();
        let mut ranks: Vec<u32> = results.iter().map(|r| r.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert!(results.iter().any(|r| r.distance > 0));
    }

    #[test]
    fn same_seed_same_outcome() {
        let a = HeadlessRace::new(RaceConfig::with_max_players(2), 7).run(600.0);
        let b = HeadlessRace::new(RaceConfig::with_max_players(2), 7).run(600.0);
        assert_eq!(a.rankings, b.rankings);
    }

    #[test]
    fn player_name_goes_to_first_bot() {
        let mut race =
            HeadlessRace::new(RaceConfig::with_max_players(2), 1).with_player_name("Kim");
        race.run(5.0);
        let coordinator = race.server().coordinator();
        assert_eq!(coordinator.player(PlayerId(1)).unwrap().name, "Kim");
    }
}
