//! Generic A* search engine
//!
//! The engine knows nothing about grids or primitives. A [`SearchSpace`]
//! provides state identity, successors with their edge costs, the heuristic
//! and an optional analytic shortcut to the goal. Search records live in an
//! arena addressed through a dense slot table and are reset in bulk before
//! every search.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::time::{Duration, Instant};

use ordered_float::OrderedFloat;
use tracing::{debug, trace, warn};

use crate::common::{NoPathReason, PlannerError, PlannerResult, Pose2D};

/// Neighbor produced by one expansion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Successor<S, M> {
    pub state: S,
    pub motion: M,
    /// Edge cost, non-negative
    pub cost: f64,
}

/// Direct connection from an expanded state to the goal
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticConnection {
    /// Poses after the expanded state, goal last
    pub poses: Vec<Pose2D>,
    pub cost: f64,
}

/// Capabilities the search engine needs from a discretized space
pub trait SearchSpace {
    type State: Copy + PartialEq + fmt::Debug;
    type Motion: Copy + fmt::Debug;

    /// Upper bound of [`SearchSpace::state_index`] plus one
    fn state_count(&self) -> usize;

    /// Dense index of a state, `None` outside the space
    fn state_index(&self, state: &Self::State) -> Option<usize>;

    fn check_start(&self, state: &Self::State) -> PlannerResult<()>;

    fn check_goal(&self, state: &Self::State) -> PlannerResult<()>;

    /// Called once before the first heuristic query of a search
    fn begin_search(&mut self, start: &Self::State, goal: &Self::State);

    /// Admissible estimate of the remaining cost to the goal
    fn heuristic(&mut self, state: &Self::State) -> f64;

    fn is_goal(&self, state: &Self::State, goal: &Self::State) -> bool {
        state == goal
    }

    /// Push every admissible successor of `state` into `out`
    fn expand(
        &mut self,
        state: &Self::State,
        incoming: Option<Self::Motion>,
        out: &mut Vec<Successor<Self::State, Self::Motion>>,
    ) -> PlannerResult<()>;

    /// Try to reach the goal directly from `state`
    fn analytic_expansion(
        &mut self,
        _state: &Self::State,
        _incoming: Option<Self::Motion>,
        _goal: &Self::State,
    ) -> Option<AnalyticConnection> {
        None
    }

    fn state_pose(&self, state: &Self::State) -> Pose2D;

    /// Poses traversed by `motion` after leaving `from`, ending at the successor
    fn motion_poses(&self, from: &Self::State, motion: &Self::Motion) -> Vec<Pose2D>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Ready,
    Searching,
    Succeeded,
    FailedNoPath,
    FailedIterationLimit,
    FailedInvalidInput,
}

/// Termination limits of one search
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SearchLimits {
    /// `None` means unbounded
    pub max_iterations: Option<usize>,
    pub max_planning_time: Option<Duration>,
}

/// Result of a successful search, ordered goal first
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport<S> {
    /// Poses from the goal back to the start, primitive poses included
    pub poses: Vec<Pose2D>,
    /// States from the goal back to the start
    pub states: Vec<S>,
    pub iterations: usize,
    pub cost: f64,
}

#[derive(Debug, Clone)]
struct NodeRecord<S, M> {
    state: S,
    g: f64,
    h: f64,
    parent: Option<usize>,
    motion: Option<M>,
    closed: bool,
}

const EMPTY_SLOT: usize = usize::MAX;

/// Search records addressed by dense state index
#[derive(Debug, Clone)]
struct NodeArena<S, M> {
    records: Vec<NodeRecord<S, M>>,
    slots: Vec<usize>,
    slot_of: Vec<usize>,
}

impl<S: Copy, M: Copy> NodeArena<S, M> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            slots: Vec::new(),
            slot_of: Vec::new(),
        }
    }

    /// Forget every record; only touched slots are cleared
    fn reset(&mut self, state_count: usize) {
        if self.slots.len() == state_count {
            for &slot in &self.slot_of {
                self.slots[slot] = EMPTY_SLOT;
            }
        } else {
            self.slots = vec![EMPTY_SLOT; state_count];
        }
        self.records.clear();
        self.slot_of.clear();
    }

    fn get_or_insert(&mut self, slot: usize, state: S) -> usize {
        let index = self.slots[slot];
        if index != EMPTY_SLOT {
            return index;
        }
        let index = self.records.len();
        self.records.push(NodeRecord {
            state,
            g: f64::INFINITY,
            h: f64::NAN,
            parent: None,
            motion: None,
            closed: false,
        });
        self.slots[slot] = index;
        self.slot_of.push(slot);
        index
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    f: OrderedFloat<f64>,
    g: OrderedFloat<f64>,
    index: usize,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest: lowest f, then highest g, then oldest record
        other
            .f
            .cmp(&self.f)
            .then_with(|| self.g.cmp(&other.g))
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Best-first search over states `S` connected by motions `M`.
///
/// The engine outlives the spaces it searches: every call borrows a
/// [`SearchSpace`] with matching state and motion types.
#[derive(Debug, Clone)]
pub struct AStarAlgorithm<S, M> {
    limits: SearchLimits,
    phase: SearchPhase,
    start: Option<S>,
    goal: Option<S>,
    arena: NodeArena<S, M>,
    open: BinaryHeap<QueueEntry>,
}

impl<S, M> AStarAlgorithm<S, M>
where
    S: Copy + PartialEq + fmt::Debug,
    M: Copy + fmt::Debug,
{
    pub fn new(limits: SearchLimits) -> Self {
        Self {
            limits,
            phase: SearchPhase::Ready,
            start: None,
            goal: None,
            arena: NodeArena::new(),
            open: BinaryHeap::new(),
        }
    }

    pub fn limits(&self) -> SearchLimits {
        self.limits
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// Records created by the last search
    pub fn visited(&self) -> usize {
        self.arena.len()
    }

    pub fn set_start<Sp: SearchSpace<State = S, Motion = M>>(&mut self, space: &Sp, state: S) -> PlannerResult<()> {
        if let Err(e) = space.check_start(&state) {
            self.phase = SearchPhase::FailedInvalidInput;
            self.start = None;
            return Err(e);
        }
        self.start = Some(state);
        self.phase = SearchPhase::Ready;
        Ok(())
    }

    pub fn set_goal<Sp: SearchSpace<State = S, Motion = M>>(&mut self, space: &Sp, state: S) -> PlannerResult<()> {
        if let Err(e) = space.check_goal(&state) {
            self.phase = SearchPhase::FailedInvalidInput;
            self.goal = None;
            return Err(e);
        }
        self.goal = Some(state);
        self.phase = SearchPhase::Ready;
        Ok(())
    }

    /// Run the search from the configured start to the configured goal
    pub fn create_path<Sp: SearchSpace<State = S, Motion = M>>(&mut self, space: &mut Sp) -> PlannerResult<SearchReport<S>> {
        let (start, goal) = match (self.start, self.goal) {
            (Some(start), Some(goal)) => (start, goal),
            _ => {
                warn!("Search started without a start and a goal");
                return Err(PlannerError::InvalidUse(
                    "start and goal must be set before searching".to_string(),
                ));
            }
        };

        let result = self.search(space, start, goal);
        self.phase = match &result {
            Ok(_) => SearchPhase::Succeeded,
            Err(PlannerError::IterationLimit { .. }) => SearchPhase::FailedIterationLimit,
            Err(PlannerError::InvalidInput(_)) => SearchPhase::FailedInvalidInput,
            Err(PlannerError::InvalidUse(msg)) => {
                warn!("Invalid use of the search engine: {}", msg);
                SearchPhase::FailedNoPath
            }
            Err(_) => SearchPhase::FailedNoPath,
        };
        result
    }

    fn search<Sp: SearchSpace<State = S, Motion = M>>(
        &mut self,
        space: &mut Sp,
        start: S,
        goal: S,
    ) -> PlannerResult<SearchReport<S>> {
        self.phase = SearchPhase::Searching;
        self.arena.reset(space.state_count());
        self.open.clear();
        space.begin_search(&start, &goal);
        let started = Instant::now();

        let start_slot = space
            .state_index(&start)
            .ok_or_else(|| PlannerError::InvalidInput(format!("start {:?} is outside the search space", start)))?;
        let start_index = self.arena.get_or_insert(start_slot, start);
        let h = space.heuristic(&start);
        {
            let record = &mut self.arena.records[start_index];
            record.g = 0.0;
            record.h = h;
        }
        self.open.push(QueueEntry {
            f: OrderedFloat(h),
            g: OrderedFloat(0.0),
            index: start_index,
        });

        let mut iterations = 0;
        let mut successors = Vec::new();

        loop {
            // Checked before popping: a cap of N fully processes N states
            if let Some(max_iterations) = self.limits.max_iterations {
                if iterations >= max_iterations && !self.open.is_empty() {
                    debug!("Search hit the iteration cap of {}", max_iterations);
                    return Err(PlannerError::IterationLimit { iterations });
                }
            }
            let entry = match self.open.pop() {
                Some(entry) => entry,
                None => break,
            };
            let (state, g, incoming) = {
                let record = &mut self.arena.records[entry.index];
                if record.closed || OrderedFloat(record.g) != entry.g {
                    continue;
                }
                record.closed = true;
                (record.state, record.g, record.motion)
            };
            iterations += 1;

            if space.is_goal(&state, &goal) {
                debug!("Goal reached after {} iterations", iterations);
                return Ok(self.backtrace(space, entry.index, None, iterations, g));
            }

            if let Some(deadline) = self.limits.max_planning_time {
                if started.elapsed() >= deadline {
                    debug!("Search ran out of time after {} iterations", iterations);
                    return Err(PlannerError::NoPath {
                        reason: NoPathReason::DeadlineExceeded,
                        iterations,
                    });
                }
            }

            if let Some(connection) = space.analytic_expansion(&state, incoming, &goal) {
                debug!("Analytic expansion reached the goal after {} iterations", iterations);
                let cost = g + connection.cost;
                let mut report = self.backtrace(space, entry.index, Some(connection), iterations, cost);
                report.states.insert(0, goal);
                return Ok(report);
            }

            successors.clear();
            space.expand(&state, incoming, &mut successors)?;

            for successor in &successors {
                let slot = match space.state_index(&successor.state) {
                    Some(slot) => slot,
                    None => continue,
                };
                let index = self.arena.get_or_insert(slot, successor.state);
                let new_g = g + successor.cost;
                let record = &mut self.arena.records[index];
                if record.closed || new_g >= record.g {
                    continue;
                }
                if record.h.is_nan() {
                    record.h = space.heuristic(&successor.state);
                }
                record.g = new_g;
                record.parent = Some(entry.index);
                record.motion = Some(successor.motion);
                self.open.push(QueueEntry {
                    f: OrderedFloat(new_g + record.h),
                    g: OrderedFloat(new_g),
                    index,
                });
            }

            if iterations % 10_000 == 0 {
                trace!(
                    "Iteration {}: {} open entries, {} records",
                    iterations,
                    self.open.len(),
                    self.arena.len()
                );
            }
        }

        debug!("Open set exhausted after {} iterations", iterations);
        Err(PlannerError::NoPath {
            reason: NoPathReason::FrontierExhausted,
            iterations,
        })
    }

    /// Walk the predecessor chain from `index` back to the start
    fn backtrace<Sp: SearchSpace<State = S, Motion = M>>(
        &self,
        space: &Sp,
        index: usize,
        connection: Option<AnalyticConnection>,
        iterations: usize,
        cost: f64,
    ) -> SearchReport<S> {
        let mut poses = Vec::new();
        let mut states = Vec::new();

        if let Some(connection) = connection {
            poses.extend(connection.poses.into_iter().rev());
        }

        let mut current = index;
        loop {
            let record = &self.arena.records[current];
            states.push(record.state);
            match (record.parent, record.motion) {
                (Some(parent), Some(motion)) => {
                    let from = self.arena.records[parent].state;
                    poses.extend(space.motion_poses(&from, &motion).into_iter().rev());
                    current = parent;
                }
                _ => {
                    poses.push(space.state_pose(&record.state));
                    break;
                }
            }
        }

        SearchReport {
            poses,
            states,
            iterations,
            cost,
        }
    }
}
