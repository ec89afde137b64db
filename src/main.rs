//! # UCT Arena Self-Play Driver
//!
//! Entry point for engine-vs-engine games played with the Monte Carlo Tree
//! Search library. A fresh search session is built for every move decision,
//! so each move is chosen from the configured number of rollouts alone.
//!
//! ## Usage
//! Run with `cargo run --release` for best performance. `--game connect4`
//! switches boards, `--seed` makes a game reproducible, and the chess draw
//! thresholds are tunable with `--halfmove-draw-clock` and
//! `--repetition-draws`. Set `RUST_LOG=mcts=trace` to watch the rollouts.

use clap::{Parser, ValueEnum};
use colored::Colorize;
use mcts::games::chess::{ChessRules, ChessState};
use mcts::games::connect4::Connect4State;
use mcts::{GameState, MCTS};
use std::error::Error;
use std::fmt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Game {
    Chess,
    Connect4,
}

/// Engine-vs-engine self-play with Monte Carlo Tree Search.
#[derive(Parser, Debug)]
#[command(name = "play")]
struct Args {
    /// Game to play
    #[arg(long, value_enum, default_value_t = Game::Chess)]
    game: Game,

    /// Rollouts per move decision
    #[arg(long, default_value_t = 400)]
    rollouts: u32,

    /// Exploration weight in the UCT selection formula
    #[arg(long, default_value_t = 1.0)]
    exploration: f64,

    /// Seed for a reproducible game; omitted means OS entropy
    #[arg(long)]
    seed: Option<u64>,

    /// Starting position as a FEN string (chess only)
    #[arg(long)]
    fen: Option<String>,

    /// Opening moves in UCI notation, applied before self-play (chess only)
    #[arg(long, num_args = 0.., value_delimiter = ' ')]
    opening: Vec<String>,

    /// Stop an unfinished game after this many plies
    #[arg(long, default_value_t = 200)]
    max_plies: u32,

    /// Half-moves without a capture or pawn move before a draw (chess)
    #[arg(long, default_value_t = 150)]
    halfmove_draw_clock: u32,

    /// Occurrences of the same position before a draw (chess)
    #[arg(long, default_value_t = 5)]
    repetition_draws: u32,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    match args.game {
        Game::Chess => {
            let rules = ChessRules {
                halfmove_draw_clock: args.halfmove_draw_clock,
                repetition_draws: args.repetition_draws,
            };
            let mut state = match &args.fen {
                Some(fen) => ChessState::from_fen(fen, rules)?,
                None => ChessState::new(rules),
            };
            for mv in &args.opening {
                state = state.play_uci(mv)?;
            }
            play_out(state, &args)
        }
        Game::Connect4 => play_out(Connect4State::new(7, 6, 4), &args),
    }
}

/// Alternates engine moves until the game ends or the ply limit is hit.
fn play_out<S: GameState + fmt::Display>(mut state: S, args: &Args) -> Result<(), Box<dyn Error>> {
    for ply in 0..args.max_plies {
        println!("{}", format!("ply {ply}").cyan().bold());
        println!("{state}\n");
        if state.is_terminal() {
            return report(&state);
        }
        // One session per move decision; statistics are not carried over.
        let mut engine = match args.seed {
            Some(seed) => MCTS::with_seed(args.exploration, seed.wrapping_add(u64::from(ply))),
            None => MCTS::new(args.exploration),
        };
        state = engine.run_search(&state, args.rollouts)?;
    }
    println!("{state}\n");
    if state.is_terminal() {
        return report(&state);
    }
    println!("{}", "move limit reached, game unfinished".yellow().bold());
    Ok(())
}

fn report<S: GameState>(state: &S) -> Result<(), Box<dyn Error>> {
    let reward = state.reward()?;
    if reward == 0.5 {
        println!("{}", "game drawn".yellow().bold());
    } else {
        println!("{}", "game over: the side to move has lost".green().bold());
    }
    Ok(())
}
