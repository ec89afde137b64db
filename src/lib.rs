//! Monte Carlo Tree Search with UCT selection.
//!
//! The engine keeps per-state statistics in a transposition-style table
//! rather than an explicit node tree: one map from state to visit/reward
//! totals, one map from state to its successor list. Each rollout selects a
//! leaf through the partially built tree, expands it, plays one random game
//! to the end and propagates the result back up the selection path with the
//! reward perspective flipped at every ply.

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;
use tracing::{debug, trace};

pub mod games;

/// Errors raised when the search contract is violated.
///
/// None of these are recoverable inside the search loop; they indicate a
/// caller or adapter bug and propagate out of [`MCTS::run_search`],
/// [`MCTS::do_rollout`] and [`MCTS::choose`] unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// An operation that needs a legal continuation was invoked on a state
    /// that has none (game already decided).
    #[error("operation is not defined on a terminal state")]
    TerminalState,

    /// `reward` was requested before the game was over.
    #[error("reward is only defined on terminal states")]
    NonterminalState,

    /// The reward bookkeeping met a position that cannot occur in a played
    /// game. Signals an adapter bug and should be treated as fatal.
    #[error("unreachable state: {0}")]
    UnreachableState(&'static str),
}

/// A game position searchable by the engine. Implementations are immutable
/// values: every operation returns fresh states and leaves `self` untouched.
///
/// Equality and hashing define state identity and must agree, because the
/// engine keys its statistics table and expansion cache by state.
///
/// # Reward orientation
///
/// `reward` is the payoff to the side to move at the terminal state:
/// `0.0` means that side has lost (the opponent just completed a win),
/// `0.5` is a draw. A terminal state where the side to move is recorded as
/// the winner is unreachable in alternating games and must be reported as
/// [`SearchError::UnreachableState`]. The engine's simulation and
/// backpropagation flips assume exactly this orientation.
pub trait GameState: Clone + Eq + Hash + fmt::Debug {
    /// Returns every state reachable by one legal move from this state.
    ///
    /// Fails with [`SearchError::TerminalState`] when no moves remain;
    /// callers check terminality first.
    fn successors(&self) -> Result<Vec<Self>, SearchError>;

    /// Returns one uniformly random successor, or `None` on a terminal
    /// state. Used for deep repeated sampling during simulation, so
    /// implementations should avoid work beyond a single move where they
    /// can (materializing the full move list is acceptable).
    fn random_successor<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Self>;

    /// Returns true if no legal moves remain or a game-ending condition
    /// holds.
    fn is_terminal(&self) -> bool;

    /// Returns the terminal payoff in `[0, 1]` for the side to move (see
    /// the trait docs for the orientation). Fails with
    /// [`SearchError::NonterminalState`] before the game is over.
    fn reward(&self) -> Result<f64, SearchError>;
}

/// Visit and reward totals for one state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeStats {
    /// Number of rollout paths that passed through this state.
    pub visits: u32,
    /// Accumulated reward over those rollouts.
    pub reward: f64,
}

impl NodeStats {
    /// Average reward per visit, the exploitation term of the UCT score.
    pub fn mean_reward(&self) -> f64 {
        self.reward / f64::from(self.visits)
    }
}

/// One search session: the statistics table, the expansion cache and the
/// rollout machinery.
///
/// A session is constructed per move decision (or reused across a game at
/// the caller's discretion), grows monotonically while rollouts run and is
/// dropped wholesale afterwards. All state is owned; nothing is global.
pub struct MCTS<S: GameState> {
    /// Visit/reward totals for every state a rollout path passed through.
    stats: HashMap<S, NodeStats>,
    /// Successor lists, populated once per expanded state. Keys are always
    /// non-terminal; lists keep the adapter's generation order so that
    /// selection and tie-breaking are reproducible under a fixed seed.
    children: HashMap<S, Vec<S>>,
    /// The exploration weight `C` in the UCT formula.
    exploration_weight: f64,
    rng: Xoshiro256PlusPlus,
}

impl<S: GameState> MCTS<S> {
    /// Creates a search session seeded from OS entropy.
    ///
    /// # Arguments
    /// * `exploration_weight` - The constant balancing exploration against
    ///   exploitation in UCT selection. 1.0 is the usual starting point.
    pub fn new(exploration_weight: f64) -> Self {
        Self::with_rng(exploration_weight, Xoshiro256PlusPlus::from_entropy())
    }

    /// Creates a search session with a fixed seed. Two sessions built with
    /// the same seed, root and rollout count choose the same move and end
    /// with identical statistics.
    pub fn with_seed(exploration_weight: f64, seed: u64) -> Self {
        Self::with_rng(exploration_weight, Xoshiro256PlusPlus::seed_from_u64(seed))
    }

    fn with_rng(exploration_weight: f64, rng: Xoshiro256PlusPlus) -> Self {
        MCTS {
            stats: HashMap::new(),
            children: HashMap::new(),
            exploration_weight,
            rng,
        }
    }

    /// Runs `num_rollouts` rollouts from `root`, then returns the best
    /// successor per [`choose`](Self::choose).
    ///
    /// Fails with [`SearchError::TerminalState`] when `root` has no legal
    /// continuation.
    pub fn run_search(&mut self, root: &S, num_rollouts: u32) -> Result<S, SearchError> {
        if root.is_terminal() {
            return Err(SearchError::TerminalState);
        }
        for _ in 0..num_rollouts {
            self.do_rollout(root)?;
        }
        debug!(
            num_rollouts,
            visited_states = self.stats.len(),
            "search complete"
        );
        self.choose(root)
    }

    /// Performs exactly one rollout (select, expand, simulate,
    /// backpropagate) against the session state. Exposed for callers with
    /// their own stopping conditions, such as time-boxed search.
    pub fn do_rollout(&mut self, root: &S) -> Result<(), SearchError> {
        let path = self.select(root);
        let leaf = path.last().expect("selection path always contains the root");
        let leaf = leaf.clone();
        self.expand(&leaf)?;
        let reward = self.simulate(&leaf)?;
        trace!(depth = path.len(), reward, "rollout complete");
        self.backpropagate(&path, reward);
        Ok(())
    }

    /// Picks the best immediate successor of `root` by average reward.
    ///
    /// A never-visited child scores negative infinity and is not chosen
    /// over any visited child; ties go to the earliest child in generation
    /// order. When `root` was never expanded the session has no statistics
    /// to compare and a random successor is returned instead.
    pub fn choose(&mut self, root: &S) -> Result<S, SearchError> {
        if root.is_terminal() {
            return Err(SearchError::TerminalState);
        }
        let children = match self.children.get(root) {
            Some(children) => children,
            None => {
                debug!("choose on an unexpanded root, falling back to a random successor");
                return root
                    .random_successor(&mut self.rng)
                    .ok_or(SearchError::UnreachableState(
                        "non-terminal state produced no successor",
                    ));
            }
        };
        if children.is_empty() {
            return Err(SearchError::UnreachableState(
                "non-terminal state expanded to no successors",
            ));
        }
        let mut best: Option<(&S, f64)> = None;
        for child in children {
            let score = match self.stats.get(child) {
                Some(stats) => stats.mean_reward(),
                None => f64::NEG_INFINITY,
            };
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((child, score));
            }
        }
        let (choice, _) = best.expect("child list checked nonempty");
        Ok(choice.clone())
    }

    /// Returns the recorded statistics for `state`, if any rollout path has
    /// passed through it.
    pub fn node_stats(&self, state: &S) -> Option<NodeStats> {
        self.stats.get(state).copied()
    }

    /// Returns the cached successor list of `state`, if it has been
    /// expanded.
    pub fn cached_children(&self, state: &S) -> Option<&[S]> {
        self.children.get(state).map(Vec::as_slice)
    }

    /// Snapshot of the whole statistics table. Mainly useful for analysis
    /// and for comparing two seeded runs.
    pub fn stats_snapshot(&self) -> HashMap<S, NodeStats> {
        self.stats.clone()
    }

    /// Descends from `root` to the leaf of this rollout.
    ///
    /// Descent continues while the current node is expanded with a
    /// nonempty successor list. The first successor that is itself
    /// unexpanded becomes the leaf; when every successor is expanded the
    /// walk takes the UCT-best child one layer deeper.
    fn select(&self, root: &S) -> Vec<S> {
        let mut path = Vec::new();
        let mut node = root.clone();
        loop {
            path.push(node.clone());
            let children = match self.children.get(&node) {
                Some(children) if !children.is_empty() => children,
                // Unexplored or terminal: this rollout stops here.
                _ => return path,
            };
            if let Some(unexplored) = children.iter().find(|c| !self.children.contains_key(*c)) {
                path.push(unexplored.clone());
                return path;
            }
            node = self.uct_select(&node);
        }
    }

    /// Caches the successor list of `leaf`. A no-op when `leaf` is already
    /// expanded or terminal, so terminal states never become cache keys.
    fn expand(&mut self, leaf: &S) -> Result<(), SearchError> {
        if self.children.contains_key(leaf) || leaf.is_terminal() {
            return Ok(());
        }
        let successors = leaf.successors()?;
        let mut unique = Vec::with_capacity(successors.len());
        for successor in successors {
            if !unique.contains(&successor) {
                unique.push(successor);
            }
        }
        self.children.insert(leaf.clone(), unique);
        Ok(())
    }

    /// Plays one random game from `leaf` to a terminal state and returns
    /// the simulated reward, oriented for the leaf.
    ///
    /// The `invert` flag starts true and toggles on every sampled ply, so
    /// the terminal reward is re-expressed in the leaf mover's perspective
    /// regardless of the walk's length. The walk touches neither session
    /// map: states seen only during simulation are never cached.
    fn simulate(&mut self, leaf: &S) -> Result<f64, SearchError> {
        let mut node = leaf.clone();
        let mut invert = true;
        loop {
            if node.is_terminal() {
                let reward = node.reward()?;
                return Ok(if invert { 1.0 - reward } else { reward });
            }
            node = node
                .random_successor(&mut self.rng)
                .ok_or(SearchError::UnreachableState(
                    "non-terminal state produced no successor",
                ))?;
            invert = !invert;
        }
    }

    /// Credits `reward` to every state on the rollout path, leaf to root,
    /// flipping the reward at each step up. A child's good outcome is its
    /// parent's bad outcome, since the players alternate.
    fn backpropagate(&mut self, path: &[S], mut reward: f64) {
        for node in path.iter().rev() {
            let stats = self.stats.entry(node.clone()).or_default();
            stats.visits += 1;
            stats.reward += reward;
            reward = 1.0 - reward;
        }
    }

    /// Selects among the children of `node` by UCT score.
    ///
    /// Every child must already be expanded (selection routes unexpanded
    /// children through the leaf branch instead), which also guarantees
    /// each child has been visited at least once.
    fn uct_select(&self, node: &S) -> S {
        let children = &self.children[node];
        debug_assert!(
            children.iter().all(|c| self.children.contains_key(c)),
            "UCT selection requires every child to be expanded"
        );
        let parent_visits = self.stats[node].visits;
        let log_parent = f64::from(parent_visits).ln();
        let mut best: Option<(&S, f64)> = None;
        for child in children {
            let score = self.uct(child, log_parent);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((child, score));
            }
        }
        let (choice, _) = best.expect("UCT selection on a node with no children");
        choice.clone()
    }

    /// Upper confidence bound for trees.
    fn uct(&self, child: &S, log_parent_visits: f64) -> f64 {
        let stats = &self.stats[child];
        let visits = f64::from(stats.visits);
        stats.reward / visits + self.exploration_weight * (log_parent_visits / visits).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Subtraction game: `remaining` tokens on the table, the side to move
    /// takes between 1 and `max_take`, whoever takes the last token wins.
    /// With `max_take` 1 the whole game is one forced line, which makes the
    /// bookkeeping exactly predictable.
    #[derive(Clone, PartialEq, Eq, Hash, Debug)]
    struct TakeAway {
        remaining: u32,
        max_take: u32,
    }

    impl TakeAway {
        fn new(remaining: u32, max_take: u32) -> Self {
            TakeAway { remaining, max_take }
        }

        fn after_take(&self, take: u32) -> Self {
            TakeAway {
                remaining: self.remaining - take,
                max_take: self.max_take,
            }
        }
    }

    impl GameState for TakeAway {
        fn successors(&self) -> Result<Vec<Self>, SearchError> {
            if self.is_terminal() {
                return Err(SearchError::TerminalState);
            }
            Ok((1..=self.max_take.min(self.remaining))
                .map(|take| self.after_take(take))
                .collect())
        }

        fn random_successor<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Self> {
            if self.is_terminal() {
                return None;
            }
            let take = rng.gen_range(1..=self.max_take.min(self.remaining));
            Some(self.after_take(take))
        }

        fn is_terminal(&self) -> bool {
            self.remaining == 0
        }

        fn reward(&self) -> Result<f64, SearchError> {
            if !self.is_terminal() {
                return Err(SearchError::NonterminalState);
            }
            // The opponent took the last token; the side to move lost.
            Ok(0.0)
        }
    }

    #[test]
    fn forced_line_statistics_alternate() {
        // remaining 3, take exactly 1: every rollout is forced, so the
        // table after three rollouts is known in closed form.
        let root = TakeAway::new(3, 1);
        let mut engine = MCTS::with_seed(1.0, 0);
        for _ in 0..3 {
            engine.do_rollout(&root).unwrap();
        }

        let root_stats = engine.node_stats(&root).unwrap();
        assert_eq!(root_stats.visits, 3);
        assert_eq!(root_stats.reward, 0.0);

        let two = engine.node_stats(&TakeAway::new(2, 1)).unwrap();
        assert_eq!(two.visits, 2);
        assert_eq!(two.reward, 2.0);

        let one = engine.node_stats(&TakeAway::new(1, 1)).unwrap();
        assert_eq!(one.visits, 1);
        assert_eq!(one.reward, 0.0);

        // The terminal state is only ever seen inside simulation and never
        // recorded or expanded.
        assert!(engine.node_stats(&TakeAway::new(0, 1)).is_none());
        assert!(engine.cached_children(&TakeAway::new(0, 1)).is_none());
    }

    #[test]
    fn expansion_is_idempotent() {
        let root = TakeAway::new(4, 2);
        let mut engine = MCTS::with_seed(1.0, 3);
        engine.expand(&root).unwrap();
        let first: Vec<TakeAway> = engine.cached_children(&root).unwrap().to_vec();
        engine.expand(&root).unwrap();
        assert_eq!(engine.cached_children(&root).unwrap(), &first[..]);
    }

    #[test]
    fn select_prefers_the_first_unexplored_child() {
        let root = TakeAway::new(3, 2);
        let mut engine = MCTS::with_seed(1.0, 5);
        engine.do_rollout(&root).unwrap();
        // Root is now expanded to [2, 1] and neither child is; the second
        // rollout must stop at the first of them.
        let path = engine.select(&root);
        assert_eq!(path, vec![root.clone(), TakeAway::new(2, 2)]);
    }

    #[test]
    fn choose_never_prefers_an_unvisited_child() {
        let root = TakeAway::new(3, 2);
        let mut engine = MCTS::with_seed(1.0, 9);
        engine.do_rollout(&root).unwrap();
        engine.do_rollout(&root).unwrap();
        // Two rollouts visit the root and its first child only; the second
        // child has no statistics and must lose to the visited one no
        // matter what was simulated.
        let visited = TakeAway::new(2, 2);
        assert!(engine.node_stats(&visited).unwrap().visits > 0);
        assert!(engine.node_stats(&TakeAway::new(1, 2)).is_none());
        assert_eq!(engine.choose(&root).unwrap(), visited);
    }

    #[test]
    fn choose_on_an_unexpanded_root_samples_randomly() {
        let root = TakeAway::new(5, 2);
        let mut engine = MCTS::with_seed(1.0, 11);
        let choice = engine.choose(&root).unwrap();
        assert!(choice == TakeAway::new(4, 2) || choice == TakeAway::new(3, 2));
    }

    #[test]
    fn terminal_and_nonterminal_guards() {
        let ended = TakeAway::new(0, 2);
        let mut engine = MCTS::with_seed(1.0, 2);
        assert_eq!(engine.run_search(&ended, 10), Err(SearchError::TerminalState));
        assert_eq!(engine.choose(&ended), Err(SearchError::TerminalState));
        assert_eq!(ended.successors(), Err(SearchError::TerminalState));
        assert!(ended.random_successor(&mut rand::thread_rng()).is_none());
        assert_eq!(TakeAway::new(3, 2).reward(), Err(SearchError::NonterminalState));
    }

    #[test]
    fn visit_counts_and_reward_bounds() {
        let root = TakeAway::new(9, 2);
        let mut engine = MCTS::with_seed(1.0, 7);
        let rollouts = 100;
        for _ in 0..rollouts {
            engine.do_rollout(&root).unwrap();
        }
        // The root is on every rollout path.
        assert_eq!(engine.node_stats(&root).unwrap().visits, rollouts);
        for stats in engine.stats_snapshot().values() {
            assert!(stats.visits >= 1);
            let mean = stats.mean_reward();
            assert!((0.0..=1.0).contains(&mean), "mean reward {mean} out of range");
        }
    }

    #[test]
    fn seeded_sessions_are_reproducible() {
        let root = TakeAway::new(12, 3);
        let mut a = MCTS::with_seed(1.0, 42);
        let mut b = MCTS::with_seed(1.0, 42);
        let choice_a = a.run_search(&root, 200).unwrap();
        let choice_b = b.run_search(&root, 200).unwrap();
        assert_eq!(choice_a, choice_b);
        assert_eq!(a.stats_snapshot(), b.stats_snapshot());
    }
}
