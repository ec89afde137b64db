//! # Chess Game Adapter
//!
//! This module makes chess searchable by delegating the rules to the
//! `shakmaty` move generator: legal-move enumeration, move application and
//! the board-level ending conditions all come from the rules engine, the
//! adapter only maps them onto the search contract.
//!
//! ## Ending conditions
//! A position is terminal on exactly one of: checkmate, stalemate,
//! insufficient material, the halfmove-clock draw rule, or a position
//! repeated often enough. The two draw thresholds are configuration
//! ([`ChessRules`]), not constants; the defaults match the
//! seventy-five-move and fivefold-repetition rules that end a game without
//! a claim.
//!
//! State identity is the canonical FEN string, so two states are equal
//! exactly when board, side to move, castling rights, en passant square and
//! both move counters agree.

use crate::{GameState, SearchError};
use rand::seq::SliceRandom;
use rand::Rng;
use shakmaty::fen::Fen;
use shakmaty::uci::Uci;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Outcome, Position};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Failures surfaced by the adapter's own entry points. Kept separate from
/// the search contract errors: these mean bad input, not a broken search.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChessError {
    /// The FEN string could not be parsed into a legal position.
    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    /// The move string is not UCI notation.
    #[error("invalid move notation: {0}")]
    InvalidMoveNotation(String),

    /// The move is well-formed but not legal in this position.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// A move was applied to a finished game.
    #[error("game is already over")]
    GameOver,
}

/// Draw thresholds applied on top of the board-level ending conditions.
#[derive(Debug, Clone, Copy)]
pub struct ChessRules {
    /// Half-moves without a capture or pawn move before the game is drawn.
    pub halfmove_draw_clock: u32,
    /// Occurrences of the same position (current one included) before the
    /// game is drawn.
    pub repetition_draws: u32,
}

impl Default for ChessRules {
    fn default() -> Self {
        ChessRules {
            halfmove_draw_clock: 150,
            repetition_draws: 5,
        }
    }
}

/// An immutable chess position carrying its own termination verdict.
///
/// The verdict, the canonical FEN and the repetition history are computed
/// once at construction, so the hot search operations (`is_terminal`,
/// `reward`, equality, hashing) never re-run move generation. The
/// repetition history holds the zobrist keys of every position since the
/// last irreversible move and is excluded from identity: transpositions to
/// the same position share statistics regardless of the path taken.
#[derive(Debug, Clone)]
pub struct ChessState {
    pos: Chess,
    fen: String,
    rules: ChessRules,
    history: Vec<u64>,
    outcome: Option<Outcome>,
}

impl PartialEq for ChessState {
    fn eq(&self, other: &Self) -> bool {
        self.fen == other.fen
    }
}

impl Eq for ChessState {}

impl Hash for ChessState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fen.hash(state);
    }
}

impl Default for ChessState {
    fn default() -> Self {
        Self::new(ChessRules::default())
    }
}

impl ChessState {
    /// The standard starting position under the given draw rules.
    pub fn new(rules: ChessRules) -> Self {
        Self::from_parts(Chess::default(), rules, &[])
    }

    /// Builds a position from a FEN string.
    ///
    /// The repetition history starts fresh at the given position, since a
    /// FEN carries no record of how it was reached.
    pub fn from_fen(fen: &str, rules: ChessRules) -> Result<Self, ChessError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|e| ChessError::InvalidFen(format!("{e}")))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| ChessError::InvalidFen(format!("{e}")))?;
        Ok(Self::from_parts(pos, rules, &[]))
    }

    /// Applies a move given in UCI notation (for opening lines and other
    /// outside input). Notation and legality failures come back as
    /// distinguishable [`ChessError`] values.
    pub fn play_uci(&self, mv: &str) -> Result<Self, ChessError> {
        if self.is_terminal() {
            return Err(ChessError::GameOver);
        }
        let uci: Uci = mv
            .parse()
            .map_err(|e| ChessError::InvalidMoveNotation(format!("{e}")))?;
        let mv = uci
            .to_move(&self.pos)
            .map_err(|e| ChessError::IllegalMove(format!("{e}")))?;
        let mut next = self.pos.clone();
        next.play_unchecked(&mv);
        Ok(Self::from_parts(next, self.rules, &self.history))
    }

    /// The canonical FEN of this position.
    pub fn fen(&self) -> &str {
        &self.fen
    }

    /// The side to move.
    pub fn turn(&self) -> Color {
        self.pos.turn()
    }

    /// The termination verdict, if the game is over.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    fn from_parts(pos: Chess, rules: ChessRules, prior_history: &[u64]) -> Self {
        let key: Zobrist64 = pos.zobrist_hash(EnPassantMode::Legal);
        // A capture or pawn move resets the clock and makes every earlier
        // position unrepeatable.
        let mut history = if pos.halfmoves() == 0 {
            Vec::new()
        } else {
            prior_history.to_vec()
        };
        history.push(key.0);
        let repetitions = history.iter().filter(|&&k| k == key.0).count() as u32;
        let fen = Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string();
        let outcome = compute_outcome(&pos, &rules, repetitions);
        ChessState {
            pos,
            fen,
            rules,
            history,
            outcome,
        }
    }

    fn state_after(&self, mv: &shakmaty::Move) -> Self {
        let mut next = self.pos.clone();
        next.play_unchecked(mv);
        Self::from_parts(next, self.rules, &self.history)
    }
}

/// One complete, ordered pass over the ending conditions. An emptied legal
/// move list is checkmate or stalemate depending on check; everything else
/// the game can end on is a draw.
fn compute_outcome(pos: &Chess, rules: &ChessRules, repetitions: u32) -> Option<Outcome> {
    if pos.legal_moves().is_empty() {
        if pos.is_check() {
            Some(Outcome::Decisive {
                winner: !pos.turn(),
            })
        } else {
            Some(Outcome::Draw)
        }
    } else if pos.is_insufficient_material() {
        Some(Outcome::Draw)
    } else if pos.halfmoves() >= rules.halfmove_draw_clock {
        Some(Outcome::Draw)
    } else if repetitions >= rules.repetition_draws {
        Some(Outcome::Draw)
    } else {
        None
    }
}

impl fmt::Display for ChessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let board = self.fen.split_whitespace().next().unwrap_or("");
        for rank in board.split('/') {
            for ch in rank.chars() {
                match ch.to_digit(10) {
                    Some(n) => {
                        for _ in 0..n {
                            write!(f, ". ")?;
                        }
                    }
                    None => write!(f, "{ch} ")?,
                }
            }
            writeln!(f)?;
        }
        let side = if self.pos.turn().is_white() {
            "white"
        } else {
            "black"
        };
        write!(f, "{side} to move")
    }
}

impl GameState for ChessState {
    fn successors(&self) -> Result<Vec<Self>, SearchError> {
        if self.is_terminal() {
            return Err(SearchError::TerminalState);
        }
        Ok(self
            .pos
            .legal_moves()
            .iter()
            .map(|mv| self.state_after(mv))
            .collect())
    }

    fn random_successor<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Self> {
        if self.is_terminal() {
            return None;
        }
        let moves = self.pos.legal_moves();
        let mv = moves.choose(rng)?;
        Some(self.state_after(mv))
    }

    fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    fn reward(&self) -> Result<f64, SearchError> {
        match self.outcome {
            None => Err(SearchError::NonterminalState),
            Some(Outcome::Draw) => Ok(0.5),
            Some(Outcome::Decisive { winner }) if winner == self.pos.turn() => Err(
                SearchError::UnreachableState("side to move recorded as the winner"),
            ),
            Some(Outcome::Decisive { .. }) => Ok(0.0),
        }
    }
}
