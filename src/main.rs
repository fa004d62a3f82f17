//! funding-network CLI
//!
//! Run funding simulations from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Simulate 100 ticks with 8 players on a network file
//! funding-network simulate --network network.json --players 8 --ticks 100
//!
//! # Output the league table as JSON
//! funding-network simulate --network network.json --format json
//!
//! # Generate a random network for testing
//! funding-network generate --policies 30 --goals 6 --seed 42
//! ```

use funding_network::game::config::GameConfig;
use funding_network::game::network_def::NetworkDefinition;
use funding_network::game::projection::LeagueEntry;
use funding_network::game::Game;
use funding_network::simulation::generator::{generate_network, seed_players, GeneratorConfig};
use log::info;
use rust_decimal::Decimal;
use std::fs;
use std::process;

fn print_usage() {
    eprintln!(
        r#"funding-network: simulation engine for a multiplayer funding game

USAGE:
    funding-network <COMMAND> [OPTIONS]

COMMANDS:
    simulate    Run ticks over a network and report the league table
    generate    Generate a random network definition (for testing)
    help        Show this message

OPTIONS (simulate):
    --network <FILE>    Path to JSON network definition
    --config <FILE>     Path to JSON game configuration
    --players <N>       Number of players (default: 4)
    --ticks <N>         Number of ticks to run (default: 100)
    --format <FORMAT>   Output format: text (default) or json

OPTIONS (generate):
    --policies <N>      Number of policies (default: 30)
    --goals <N>         Number of goals (default: 6)
    --links <N>         Outgoing links per policy (default: 2)
    --seed <N>          Random seed
    --output <FILE>     Write to file instead of stdout

Set RUST_LOG=info (or debug) for engine logging.

EXAMPLES:
    funding-network simulate --network network.json --players 8 --ticks 200
    funding-network generate --policies 50 --goals 10 --output network.json"#
    );
}

/// JSON output schema for a simulation run.
#[derive(serde::Serialize)]
struct SimulationOutput {
    ticks: u32,
    players: usize,
    total_leaked: Decimal,
    total_forwarded: Decimal,
    total_balance: Decimal,
    league: Vec<LeagueEntry>,
}

fn arg_value(args: &[String], i: usize, flag: &str, what: &str) -> String {
    args.get(i).cloned().unwrap_or_else(|| {
        eprintln!("{} requires {}", flag, what);
        process::exit(1);
    })
}

fn arg_number<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    args.get(i)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            eprintln!("{} requires a number", flag);
            process::exit(1);
        })
}

fn load_network(path: &str) -> NetworkDefinition {
    let content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading file '{}': {}", path, e);
        process::exit(1);
    });

    NetworkDefinition::from_json(&content).unwrap_or_else(|e| {
        eprintln!("Error parsing JSON: {}", e);
        eprintln!("Expected format:");
        eprintln!(r#"{{
  "goals": [ {{ "id": "g1", "name": "Clean Air", "leakage": 0.1 }} ],
  "policies": [
    {{ "id": "p1", "name": "Bike Lanes", "leakage": 0.2,
       "connections": [ {{ "id": "l1", "from_id": "p1", "to_id": "g1", "weight": 5 }} ] }}
  ]
}}"#);
        process::exit(1);
    })
}

fn cmd_simulate(args: &[String]) {
    let mut network_path = None;
    let mut config_path = None;
    let mut players = 4usize;
    let mut ticks = 100u32;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--network" => {
                i += 1;
                network_path = Some(arg_value(args, i, "--network", "a file path"));
            }
            "--config" => {
                i += 1;
                config_path = Some(arg_value(args, i, "--config", "a file path"));
            }
            "--players" => {
                i += 1;
                players = arg_number(args, i, "--players");
            }
            "--ticks" => {
                i += 1;
                ticks = arg_number(args, i, "--ticks");
            }
            "--format" => {
                i += 1;
                format = arg_value(args, i, "--format", "'text' or 'json'");
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = network_path.unwrap_or_else(|| {
        eprintln!("Error: --network <FILE> is required");
        process::exit(1);
    });

    let config = match config_path {
        Some(path) => GameConfig::load(&path).unwrap_or_else(|e| {
            eprintln!("Error loading config '{}': {}", path, e);
            process::exit(1);
        }),
        None => GameConfig::default(),
    };
    let replenish_every = config.ticks_per_budget_cycle;

    let game = Game::new(config).unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        process::exit(1);
    });
    game.create_network(&load_network(&path)).unwrap_or_else(|e| {
        eprintln!("Invalid network: {}", e);
        process::exit(1);
    });
    seed_players(&game, players).unwrap_or_else(|e| {
        eprintln!("Error creating players: {}", e);
        process::exit(1);
    });

    let mut leaked = Decimal::ZERO;
    let mut forwarded = Decimal::ZERO;
    for tick in 1..=ticks {
        let report = game.tick().unwrap_or_else(|e| {
            eprintln!("Tick {} failed: {}", tick, e);
            process::exit(1);
        });
        leaked += report.leaked;
        forwarded += report.forwarded;

        if tick % replenish_every == 0 {
            game.do_replenish_budget().unwrap_or_else(|e| {
                eprintln!("Budget cycle failed after tick {}: {}", tick, e);
                process::exit(1);
            });
        }
    }
    info!("simulation finished after {} ticks", ticks);

    let league = game.top_players(players);
    if format == "json" {
        let output = SimulationOutput {
            ticks,
            players,
            total_leaked: leaked,
            total_forwarded: forwarded,
            total_balance: game.network().total_balance(),
            league,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
    } else {
        println!("Ticks:           {}", ticks);
        println!("Players:         {}", players);
        println!("Total leaked:    {}", leaked);
        println!("Total forwarded: {}", forwarded);
        println!("Total balance:   {}", game.network().total_balance());
        println!();
        println!("League table:");
        for (pos, entry) in league.iter().enumerate() {
            println!(
                "  {:>2}. {:<16} {:>14}  of {} in {}",
                pos + 1,
                entry.name,
                entry.goal_contribution.round_dp(2),
                entry.goal_total.round_dp(2),
                entry.goal.as_deref().unwrap_or("-")
            );
        }
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = GeneratorConfig::default();
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--policies" => {
                i += 1;
                config.policy_count = arg_number(args, i, "--policies");
            }
            "--goals" => {
                i += 1;
                config.goal_count = arg_number(args, i, "--goals");
            }
            "--links" => {
                i += 1;
                config.links_per_policy = arg_number(args, i, "--links");
            }
            "--seed" => {
                i += 1;
                config.seed = Some(arg_number(args, i, "--seed"));
            }
            "--output" => {
                i += 1;
                output_path = Some(arg_value(args, i, "--output", "a file path"));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let definition = generate_network(&config);
    let json = definition.to_json_pretty().unwrap();

    if let Some(path) = output_path {
        fs::write(&path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        eprintln!(
            "Generated {} policies and {} goals with {} links → {}",
            definition.policies.len(),
            definition.goals.len(),
            definition.connections().count(),
            path
        );
    } else {
        println!("{}", json);
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "simulate" => cmd_simulate(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
