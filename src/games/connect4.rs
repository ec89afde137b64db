//! # Connect 4 Game Adapter
//!
//! This module implements the classic Connect 4 board game as a searchable
//! state. Players take turns dropping pieces into columns, trying to get
//! `line_size` pieces in a row (horizontally, vertically, or diagonally).
//!
//! ## Rules
//! - Players alternate dropping pieces into columns
//! - Pieces fall to the lowest available spot in the column due to gravity
//! - First player to complete a line wins
//! - Game is a draw if the board fills up with no winner

use crate::{GameState, SearchError};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;

/// A move in Connect 4: the 0-based column to drop a piece into.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Connect4Move(pub usize);

/// The complete state of a Connect 4 game.
///
/// The board is a flat row-major vector with row 0 at the top; cells hold
/// 1 for player 1, -1 for player 2 and 0 for empty. States are immutable:
/// [`play`](Connect4State::play) returns the position after a move and
/// leaves the original untouched.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Connect4State {
    board: Vec<i32>,
    /// Side to move, 1 or -1.
    current_player: i32,
    width: usize,
    height: usize,
    /// Number of pieces in a row needed to win.
    line_size: usize,
    /// Set when the previous move completed a line.
    winner: Option<i32>,
}

impl fmt::Display for Connect4State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.height {
            for c in 0..self.width {
                let symbol = match self.board[r * self.width + c] {
                    1 => "X",
                    -1 => "O",
                    _ => ".",
                };
                write!(f, "{} ", symbol)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Connect4State {
    /// Creates an empty board with the given dimensions.
    ///
    /// # Arguments
    /// * `width` - Number of columns
    /// * `height` - Number of rows
    /// * `line_size` - Pieces in a row needed to win (4 for the standard game)
    pub fn new(width: usize, height: usize, line_size: usize) -> Self {
        Self {
            board: vec![0; width * height],
            current_player: 1,
            width,
            height,
            line_size,
            winner: None,
        }
    }

    /// Side to move, 1 or -1.
    pub fn current_player(&self) -> i32 {
        self.current_player
    }

    /// The winning player, if the game has been decided.
    pub fn winner(&self) -> Option<i32> {
        self.winner
    }

    /// Columns that can still receive a piece.
    fn open_columns(&self) -> Vec<Connect4Move> {
        (0..self.width)
            .filter(|&c| self.board[c] == 0)
            .map(Connect4Move)
            .collect()
    }

    /// Returns the position after dropping the mover's piece in the given
    /// column. Fails when the game is over or the column is full.
    pub fn play(&self, mv: Connect4Move) -> Result<Self, String> {
        if self.is_terminal() {
            return Err("game is already over".to_string());
        }
        if mv.0 >= self.width || self.board[mv.0] != 0 {
            return Err(format!("column {} is not open", mv.0));
        }
        let mut next = self.clone();
        for r in (0..self.height).rev() {
            let idx = r * self.width + mv.0;
            if next.board[idx] == 0 {
                next.board[idx] = next.current_player;
                break;
            }
        }
        if check_line_win(
            &next.board,
            next.width,
            next.height,
            next.current_player,
            next.line_size,
        ) {
            next.winner = Some(next.current_player);
        }
        next.current_player = -next.current_player;
        Ok(next)
    }
}

impl GameState for Connect4State {
    fn successors(&self) -> Result<Vec<Self>, SearchError> {
        if self.is_terminal() {
            return Err(SearchError::TerminalState);
        }
        Ok(self
            .open_columns()
            .into_iter()
            .map(|mv| self.play(mv).expect("open column is playable"))
            .collect())
    }

    fn random_successor<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Self> {
        if self.is_terminal() {
            return None;
        }
        let columns = self.open_columns();
        let mv = columns.choose(rng)?;
        Some(self.play(*mv).expect("open column is playable"))
    }

    fn is_terminal(&self) -> bool {
        self.winner.is_some() || self.board[..self.width].iter().all(|&c| c != 0)
    }

    fn reward(&self) -> Result<f64, SearchError> {
        match self.winner {
            None if self.is_terminal() => Ok(0.5),
            None => Err(SearchError::NonterminalState),
            Some(w) if w == self.current_player => Err(SearchError::UnreachableState(
                "side to move recorded as the winner",
            )),
            Some(_) => Ok(0.0),
        }
    }
}

/// Scans the whole board for a completed line of `player` pieces.
fn check_line_win(board: &[i32], width: usize, height: usize, player: i32, line_size: usize) -> bool {
    let cell = |r: usize, c: usize| board[r * width + c];
    let runs = |r: usize, c: usize, dr: usize, dc: usize| {
        (0..line_size).all(|k| cell(r + k * dr, c + k * dc) == player)
    };
    for r in 0..height {
        for c in 0..width {
            // Rightward, downward and the two diagonals cover every line
            // once the whole board is scanned.
            if c + line_size <= width && runs(r, c, 0, 1) {
                return true;
            }
            if r + line_size <= height && runs(r, c, 1, 0) {
                return true;
            }
            if r + line_size <= height && c + line_size <= width && runs(r, c, 1, 1) {
                return true;
            }
            if r + line_size <= height && c >= line_size - 1 {
                let hit = (0..line_size).all(|k| cell(r + k, c - k) == player);
                if hit {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_out(moves: &[usize]) -> Connect4State {
        let mut game = Connect4State::new(7, 6, 4);
        for &c in moves {
            game = game.play(Connect4Move(c)).unwrap();
        }
        game
    }

    #[test]
    fn new_game_is_open() {
        let game = Connect4State::new(7, 6, 4);
        assert_eq!(game.current_player(), 1);
        assert!(!game.is_terminal());
        assert_eq!(game.successors().unwrap().len(), 7);
    }

    #[test]
    fn pieces_stack_with_gravity() {
        let game = play_out(&[3, 3]);
        assert_eq!(game.board[5 * 7 + 3], 1);
        assert_eq!(game.board[4 * 7 + 3], -1);
        assert_eq!(game.current_player(), 1);
    }

    #[test]
    fn horizontal_win() {
        let game = play_out(&[0, 0, 1, 1, 2, 2, 3]);
        assert_eq!(game.winner(), Some(1));
        assert!(game.is_terminal());
    }

    #[test]
    fn vertical_win() {
        let game = play_out(&[0, 1, 0, 1, 0, 1, 0]);
        assert_eq!(game.winner(), Some(1));
        assert!(game.is_terminal());
    }

    #[test]
    fn diagonal_win() {
        // Player 1 builds the / diagonal across columns 0 to 3.
        let game = play_out(&[0, 1, 1, 2, 2, 3, 2, 3, 3, 6, 3]);
        assert_eq!(game.winner(), Some(1));
        assert!(game.is_terminal());
    }

    #[test]
    fn full_board_without_a_line_is_a_draw() {
        // On a 2x2 board needing 3 in a row no line can ever form.
        let mut game = Connect4State::new(2, 2, 3);
        for c in [0, 1, 0, 1] {
            game = game.play(Connect4Move(c)).unwrap();
        }
        assert!(game.is_terminal());
        assert_eq!(game.winner(), None);
        assert_eq!(game.reward().unwrap(), 0.5);
    }

    #[test]
    fn loser_is_the_side_to_move() {
        let game = play_out(&[0, 0, 1, 1, 2, 2, 3]);
        // Player 1 just won, so player -1 moves next and has lost.
        assert_eq!(game.current_player(), -1);
        assert_eq!(game.reward().unwrap(), 0.0);
    }

    #[test]
    fn terminal_state_refuses_moves() {
        let game = play_out(&[0, 0, 1, 1, 2, 2, 3]);
        assert_eq!(game.successors(), Err(SearchError::TerminalState));
        assert!(game
            .random_successor(&mut rand::thread_rng())
            .is_none());
        assert!(game.play(Connect4Move(4)).is_err());
    }

    #[test]
    fn reward_requires_a_finished_game() {
        let game = play_out(&[0, 1]);
        assert_eq!(game.reward(), Err(SearchError::NonterminalState));
    }

    #[test]
    fn full_column_is_rejected() {
        let game = play_out(&[0, 0, 0, 0, 0, 0]);
        assert!(game.play(Connect4Move(0)).is_err());
        assert_eq!(game.successors().unwrap().len(), 6);
    }
}
