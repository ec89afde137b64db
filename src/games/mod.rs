//! # Game Adapters Module
//!
//! This module contains the concrete games searchable by the engine. Each
//! game implements the [`GameState`](crate::GameState) trait; the engine
//! itself has no game-specific knowledge, so everything about legality,
//! termination and payoff lives here.
//!
//! ## Supported Games
//! - **Chess**: full rules via the `shakmaty` move generator, with
//!   configurable draw thresholds
//! - **Connect 4**: gravity-based connection game on a configurable grid
//!
//! ## Adding New Games
//! To add a new game, create a new module with:
//! 1. An immutable state type carrying whatever the rules need
//! 2. A `GameState` implementation whose equality and hash agree
//! 3. A `Display` implementation so the self-play driver can print boards

pub mod chess;
pub mod connect4;
