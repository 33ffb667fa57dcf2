//! Runner Race - Authoritative race coordinator
//!
//! Owns the state of a multiplayer endless-runner race: lobby, countdown,
//! distances, damage and elimination, power-ups, track sections and final
//! rankings. The binary runs a bot-driven race headlessly.

pub mod headless;
pub mod race_server;

use std::io;
use std::path::Path;

use headless::HeadlessRace;
use race_server::{
    submit_final_results, AppError, JsonLinesLeaderboard, RaceConfig, RacePhase, RaceSettings,
};

/// Path of the settings file, if any
pub const SETTINGS_ENV: &str = "RUNNER_RACE_SETTINGS";
/// Optional fixed seed for reproducible runs
pub const SEED_ENV: &str = "RUNNER_RACE_SEED";

const DEFAULT_PLAYERS: u32 = 3;
const TIME_LIMIT: f32 = 900.0;

fn load_settings() -> Result<Option<RaceSettings>, AppError> {
    match std::env::var_os(SETTINGS_ENV) {
        Some(path) => Ok(Some(RaceSettings::load(Path::new(&path))?)),
        None => Ok(None),
    }
}

fn seed() -> u64 {
    std::env::var(SEED_ENV)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(rand::random)
}

/// Install the stderr logger unless the host already has one
fn init_logging() -> bool {
    let env = env_logger::Env::default().default_filter_or("info");
    let installed = env_logger::Builder::from_env(env).try_init().is_ok();
    if !installed {
        log::debug!("Logger already installed, keeping it");
    }
    installed
}

/// Run one headless race and print the leaderboard as JSON lines
pub fn run() -> Result<(), AppError> {
    init_logging();

    let settings = load_settings()?;
    let config = settings
        .as_ref()
        .map(RaceSettings::race_config)
        .unwrap_or_else(|| RaceConfig::with_max_players(DEFAULT_PLAYERS));
    config.validate()?;
    let seed = seed();
    log::info!(
        "Runner race starting with {} players (seed {})",
        config.max_players,
        seed
    );

    let mut race = HeadlessRace::new(config, seed);
    if let Some(name) = settings.and_then(|s| s.player_name) {
        race = race.with_player_name(name);
    }

    let snapshot = race.run(TIME_LIMIT);
    if snapshot.phase != RacePhase::Finished {
        return Err(AppError::Unfinished(TIME_LIMIT));
    }

    for result in &snapshot.rankings {
        log::info!(
            "#{} {} - {}m, {} coins",
            result.rank,
            result.player_name,
            result.distance,
            result.coins
        );
    }

    let stats = race.server().get_stats();
    log::info!(
        "Average tick {:.3}ms, {} rejected commands",
        stats.avg_tick_time_ms,
        stats.rejected_commands
    );

    let mut sink = JsonLinesLeaderboard::new(io::stdout().lock());
    submit_final_results(race.server_mut().coordinator_mut(), &mut sink)?;
    Ok(())
}
