use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use meritorder_lib::market::types::{AssetInstance, RoundDispatchResult, RoundInput};
use meritorder_lib::{init_tracing, load_market_config, MarketEngine, Standing};

const DEFAULT_SEED: u64 = 42;

/// A recorded game: a shared roster plus the rounds to replay. Rounds that
/// carry their own `assets` use those instead of the shared roster.
#[derive(Debug, Deserialize)]
struct GameInput {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    assets: Vec<AssetInstance>,
    rounds: Vec<RoundInput>,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    session_id: String,
    seed: u64,
    rounds: Vec<RoundDispatchResult>,
    standings: Vec<Standing>,
}

fn main() {
    init_tracing();
    if let Err(error) = run() {
        eprintln!("round replay failed: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut game_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut seed = DEFAULT_SEED;
    let mut output_path = PathBuf::from("round_replay_results.json");

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(());
        }

        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg.clone(), None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("{flag} requires a value"))
        };

        match flag.as_str() {
            "--game" => game_path = Some(PathBuf::from(value()?)),
            "--config" => config_path = Some(PathBuf::from(value()?)),
            "--seed" => {
                let raw = value()?;
                seed = raw
                    .parse::<u64>()
                    .map_err(|_| format!("--seed expects an unsigned integer, got '{raw}'"))?;
            }
            "--output" => output_path = PathBuf::from(value()?),
            _ => return Err(format!("unknown argument '{arg}'. Use --help for usage")),
        }
    }

    let game_path = game_path.ok_or_else(|| "--game <path> is required".to_string())?;
    let raw = std::fs::read_to_string(&game_path)
        .map_err(|error| format!("failed to read '{}': {error}", game_path.display()))?;
    let game: GameInput = serde_json::from_str(&raw)
        .map_err(|error| format!("failed to parse '{}': {error}", game_path.display()))?;

    let config = load_market_config(config_path.as_deref()).map_err(|error| error.to_string())?;
    let mut engine = MarketEngine::new(config);
    if let Some(session_id) = game.session_id {
        engine = engine.with_session_id(session_id);
    }
    let mut rng = StdRng::seed_from_u64(seed);

    tracing::info!(
        "replaying {} round(s) for session {} with seed {seed}",
        game.rounds.len(),
        engine.session_id()
    );

    let mut results = Vec::with_capacity(game.rounds.len());
    for mut round in game.rounds {
        if round.assets.is_empty() {
            round.assets = game.assets.clone();
        }
        let result = engine
            .run_round(&round, &mut rng)
            .map_err(|error| format!("round {}: {error}", round.round))?;
        print_round(&result);
        results.push(result);
    }

    let standings = engine.standings();
    print_standings(&standings);

    let report = ReplayReport {
        session_id: engine.session_id().to_string(),
        seed,
        rounds: results,
        standings,
    };
    let output_json = serde_json::to_string_pretty(&report)
        .map_err(|error| format!("failed to serialize replay report: {error}"))?;
    std::fs::write(&output_path, output_json)
        .map_err(|error| format!("failed to write '{}': {error}", output_path.display()))?;

    println!("\nSaved replay output to {}", output_path.display());
    Ok(())
}

fn print_round(result: &RoundDispatchResult) {
    println!("\nRound {}", result.round);
    println!("--------");
    if let Some(event) = &result.balancing {
        println!(
            "  catch-up balancing: {}/{} derated {:.0}%",
            event.team_id,
            event.asset_id,
            event.derate_fraction * 100.0
        );
    }
    for clearing in &result.clearing_results {
        println!(
            "  {:<12} ${:>9.2}/MWh  {:>9.2} MW of {:>9.2} MW  ({:?}{})",
            clearing.period,
            clearing.clearing_price,
            clearing.total_dispatched_mw,
            clearing.effective_demand_mw,
            clearing.price_formation,
            if clearing.has_shortfall() {
                format!(", short {:.2} MW", clearing.shortfall_mw)
            } else {
                String::new()
            }
        );
    }
    for (team_id, profit) in &result.team_profits {
        println!("  {team_id:<12} profit ${profit:>12.2}");
    }
}

fn print_standings(standings: &[Standing]) {
    println!("\nStandings");
    println!("---------");
    for (position, standing) in standings.iter().enumerate() {
        println!(
            "  {:>2}. {:<12} ${:>12.2}  ({} round(s))",
            position + 1,
            standing.team_id,
            standing.cumulative_profit,
            standing.rounds_recorded
        );
    }
}

fn print_help() {
    println!("Replay a recorded game through the market clearing engine");
    println!();
    println!("Usage:");
    println!("  cargo run --bin round_replay -- --game <path> [options]");
    println!();
    println!("Options:");
    println!("  --game <path>      Game JSON file: {{ session_id?, assets, rounds }} (required)");
    println!("  --config <path>    Market config JSON (default: built-in values + MERIT_* env)");
    println!("  --seed <n>         Seed for catch-up balancing draws (default: {DEFAULT_SEED})");
    println!("  --output <path>    Output JSON file (default: round_replay_results.json)");
}
