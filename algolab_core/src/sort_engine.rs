//! Step-wise sorting engine.
//! ==========================
//!
//! Turns a sorting algorithm into a lazy, pull-based sequence of atomic
//! operations so that a renderer can show one comparison or write per frame.
//!
//! ```text
//!   StepEngine::next()
//!        │
//!        ▼
//!   ┌──────────────┐  Yield(step)   ──► returned to caller
//!   │  top frame   │  Finished      ──► pop, resume the frame below
//!   │  (resumable) │  Expand([..])  ──► pop, push children (first on top)
//!   ├──────────────┤
//!   │    ...       │
//!   └──────────────┘
//! ```
//!
//! Recursive algorithms (quick, merge) never recurse on the Rust stack: each
//! sub-range is a frame, and a frame that needs sub-ranges sorted first
//! expands into an ordered list of child frames. The engine flattens the
//! children in order, which gives exactly the sequence a recursive generator
//! would produce.

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;

/// Smallest value produced by [`random_dataset`].
pub const MIN_VALUE: u32 = 10;

/// Upper bound (exclusive) of values produced by [`random_dataset`].
pub const MAX_VALUE: u32 = 100;

/// Generates a dataset of `len` values uniformly drawn from `[10, 100)`.
pub fn random_dataset<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Vec<u32> {
    (0..len).map(|_| rng.gen_range(MIN_VALUE..MAX_VALUE)).collect()
}

// =============================================================================
// ALGORITHM SELECTION
// =============================================================================

/// The sorting algorithms a lane can race with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortAlgorithm {
    #[default]
    Bubble,
    Selection,
    Quick,
    Merge,
}

impl SortAlgorithm {
    /// Every selectable algorithm, in menu order.
    pub const ALL: [SortAlgorithm; 4] = [
        SortAlgorithm::Bubble,
        SortAlgorithm::Selection,
        SortAlgorithm::Quick,
        SortAlgorithm::Merge,
    ];

    /// Resolves a human-written algorithm name.
    ///
    /// Matching is case-insensitive and ignores spaces, and looks for the
    /// substrings "quick", "merge" and "selection" in that order. Anything
    /// else resolves to [`SortAlgorithm::Bubble`].
    pub fn from_name(name: &str) -> Self {
        let normalized = name.to_lowercase().replace(' ', "");
        if normalized.contains("quick") {
            SortAlgorithm::Quick
        } else if normalized.contains("merge") {
            SortAlgorithm::Merge
        } else if normalized.contains("selection") {
            SortAlgorithm::Selection
        } else {
            SortAlgorithm::Bubble
        }
    }

    /// Returns the human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            SortAlgorithm::Bubble => "Bubble Sort",
            SortAlgorithm::Selection => "Selection Sort",
            SortAlgorithm::Quick => "Quick Sort",
            SortAlgorithm::Merge => "Merge Sort",
        }
    }

    /// Starts a step engine for this algorithm over a copy of `data`.
    pub fn engine(&self, data: &[u32]) -> StepEngine {
        StepEngine::new(*self, data)
    }
}

impl fmt::Display for SortAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SortAlgorithm {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl Serialize for SortAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for SortAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

// =============================================================================
// STEPS
// =============================================================================

/// One atomic sort operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    /// Two positions were compared. Nothing moved.
    Compare { indices: [usize; 2] },

    /// Two positions were exchanged (`[i, j]`) or one position was
    /// overwritten (`[k]`). `snapshot` is the whole dataset afterwards.
    Swap {
        indices: Vec<usize>,
        snapshot: Vec<u32>,
    },
}

impl Step {
    /// Positions touched by this step.
    pub fn indices(&self) -> &[usize] {
        match self {
            Step::Compare { indices } => indices,
            Step::Swap { indices, .. } => indices,
        }
    }

    /// Returns true for mutating steps.
    pub fn is_swap(&self) -> bool {
        matches!(self, Step::Swap { .. })
    }

    /// The post-mutation dataset, for swaps.
    pub fn snapshot(&self) -> Option<&[u32]> {
        match self {
            Step::Compare { .. } => None,
            Step::Swap { snapshot, .. } => Some(snapshot),
        }
    }

    fn swap(indices: Vec<usize>, data: &[u32]) -> Self {
        Step::Swap {
            indices,
            snapshot: data.to_vec(),
        }
    }
}

/// Applies one step to `data` using only its indices.
///
/// A two-index swap exchanges the positions; a one-index swap copies the
/// written value out of the snapshot. Compares change nothing.
///
/// Engines only emit swaps with one or two indices. Returns false, leaving
/// `data` untouched, for any other shape or for an index outside `data` or
/// the snapshot.
pub fn apply(data: &mut [u32], step: &Step) -> bool {
    let Step::Swap { indices, snapshot } = step else {
        return true;
    };
    match indices.as_slice() {
        &[i, j] if i < data.len() && j < data.len() => {
            data.swap(i, j);
            true
        }
        &[k] => match (data.get_mut(k), snapshot.get(k)) {
            (Some(slot), Some(&value)) => {
                *slot = value;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// Replays a step sequence against a copy of `original`.
pub fn replay<'a, I>(original: &[u32], steps: I) -> Vec<u32>
where
    I: IntoIterator<Item = &'a Step>,
{
    let mut data = original.to_vec();
    for step in steps {
        apply(&mut data, step);
    }
    data
}

// =============================================================================
// RESUMABLE FRAMES
// =============================================================================

enum Resume {
    Yield(Step),
    Finished,
    Expand(Vec<Frame>),
}

enum Frame {
    Bubble(BubbleState),
    Selection(SelectionState),
    Quick { low: usize, high: usize },
    Partition(PartitionState),
    MergeSort { left: usize, right: usize },
    Merge(MergeState),
}

impl Frame {
    fn resume(&mut self, data: &mut [u32]) -> Resume {
        match self {
            Frame::Bubble(state) => state.resume(data),
            Frame::Selection(state) => state.resume(data),
            Frame::Quick { low, high } => {
                if *low >= *high {
                    Resume::Finished
                } else {
                    Resume::Expand(vec![Frame::Partition(PartitionState::new(
                        data, *low, *high,
                    ))])
                }
            }
            Frame::Partition(state) => state.resume(data),
            Frame::MergeSort { left, right } => {
                let (left, right) = (*left, *right);
                if left >= right {
                    return Resume::Finished;
                }
                let mid = left + (right - left) / 2;
                Resume::Expand(vec![
                    Frame::MergeSort { left, right: mid },
                    Frame::MergeSort {
                        left: mid + 1,
                        right,
                    },
                    Frame::Merge(MergeState::new(left, mid, right)),
                ])
            }
            Frame::Merge(state) => state.resume(data),
        }
    }
}

/// Adjacent-pair sweep: `i` is the pass, `j` the left element of the pair.
#[derive(Default)]
struct BubbleState {
    pass: usize,
    j: usize,
    compared: bool,
}

impl BubbleState {
    fn resume(&mut self, data: &mut [u32]) -> Resume {
        let n = data.len();
        loop {
            if self.pass >= n {
                return Resume::Finished;
            }
            // j < n - pass - 1
            if self.j + self.pass + 1 >= n {
                self.pass += 1;
                self.j = 0;
                continue;
            }
            if !self.compared {
                self.compared = true;
                return Resume::Yield(Step::Compare {
                    indices: [self.j, self.j + 1],
                });
            }
            self.compared = false;
            let j = self.j;
            self.j += 1;
            if data[j] > data[j + 1] {
                data.swap(j, j + 1);
                return Resume::Yield(Step::swap(vec![j, j + 1], data));
            }
        }
    }
}

struct SelectionState {
    pass: usize,
    probe: usize,
    min_idx: usize,
    compared: bool,
}

impl SelectionState {
    fn new() -> Self {
        Self {
            pass: 0,
            probe: 1,
            min_idx: 0,
            compared: false,
        }
    }

    fn resume(&mut self, data: &mut [u32]) -> Resume {
        let n = data.len();
        loop {
            if self.pass >= n {
                return Resume::Finished;
            }
            if self.probe < n {
                if !self.compared {
                    self.compared = true;
                    return Resume::Yield(Step::Compare {
                        indices: [self.min_idx, self.probe],
                    });
                }
                self.compared = false;
                if data[self.probe] < data[self.min_idx] {
                    self.min_idx = self.probe;
                }
                self.probe += 1;
                continue;
            }

            // End of scan
            let pass = self.pass;
            let min_idx = self.min_idx;
            self.pass += 1;
            self.probe = self.pass + 1;
            self.min_idx = self.pass;
            if min_idx != pass {
                data.swap(pass, min_idx);
                return Resume::Yield(Step::swap(vec![pass, min_idx], data));
            }
        }
    }
}

/// Lomuto partition of `[low, high]` around `data[high]`.
///
/// `store` is the next slot for an element smaller than the pivot.
struct PartitionState {
    low: usize,
    high: usize,
    pivot: u32,
    store: usize,
    probe: usize,
    compared: bool,
    placed: bool,
}

impl PartitionState {
    fn new(data: &[u32], low: usize, high: usize) -> Self {
        Self {
            low,
            high,
            pivot: data[high],
            store: low,
            probe: low,
            compared: false,
            placed: false,
        }
    }

    fn resume(&mut self, data: &mut [u32]) -> Resume {
        loop {
            if self.probe < self.high {
                if !self.compared {
                    self.compared = true;
                    return Resume::Yield(Step::Compare {
                        indices: [self.probe, self.high],
                    });
                }
                self.compared = false;
                let probe = self.probe;
                self.probe += 1;
                if data[probe] < self.pivot {
                    let store = self.store;
                    self.store += 1;
                    data.swap(store, probe);
                    return Resume::Yield(Step::swap(vec![store, probe], data));
                }
                continue;
            }

            if !self.placed {
                self.placed = true;
                data.swap(self.store, self.high);
                return Resume::Yield(Step::swap(vec![self.store, self.high], data));
            }

            let pivot_idx = self.store;
            let mut children = Vec::with_capacity(2);
            if pivot_idx > self.low {
                children.push(Frame::Quick {
                    low: self.low,
                    high: pivot_idx - 1,
                });
            }
            children.push(Frame::Quick {
                low: pivot_idx + 1,
                high: self.high,
            });
            return Resume::Expand(children);
        }
    }
}

/// Merges the sorted runs `[left, mid]` and `[mid + 1, right]`.
///
/// The runs are copied out when the frame first resumes, i.e. after both
/// halves have been sorted.
struct MergeState {
    left: usize,
    mid: usize,
    right: usize,
    runs: Option<(Vec<u32>, Vec<u32>)>,
    i: usize,
    j: usize,
    write: usize,
    compared: bool,
}

impl MergeState {
    fn new(left: usize, mid: usize, right: usize) -> Self {
        Self {
            left,
            mid,
            right,
            runs: None,
            i: 0,
            j: 0,
            write: left,
            compared: false,
        }
    }

    fn resume(&mut self, data: &mut [u32]) -> Resume {
        if self.runs.is_none() {
            self.runs = Some((
                data[self.left..=self.mid].to_vec(),
                data[self.mid + 1..=self.right].to_vec(),
            ));
        }
        let Some((lo, hi)) = self.runs.as_ref() else {
            return Resume::Finished;
        };

        let value = if self.i < lo.len() && self.j < hi.len() {
            if !self.compared {
                self.compared = true;
                // Positions are approximate once the left run is partly overwritten
                return Resume::Yield(Step::Compare {
                    indices: [self.left + self.i, self.mid + 1 + self.j],
                });
            }
            self.compared = false;
            if lo[self.i] <= hi[self.j] {
                self.i += 1;
                lo[self.i - 1]
            } else {
                self.j += 1;
                hi[self.j - 1]
            }
        } else if self.i < lo.len() {
            self.i += 1;
            lo[self.i - 1]
        } else if self.j < hi.len() {
            self.j += 1;
            hi[self.j - 1]
        } else {
            return Resume::Finished;
        };

        let k = self.write;
        self.write += 1;
        data[k] = value;
        Resume::Yield(Step::swap(vec![k], data))
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// A single-pass, lazy producer of [`Step`]s.
///
/// The engine owns a private copy of the dataset; the slice passed to
/// [`StepEngine::new`] is never touched. Once `next()` returns `None` it
/// keeps returning `None`.
pub struct StepEngine {
    algorithm: SortAlgorithm,
    data: Vec<u32>,
    frames: Vec<Frame>,
    emitted: u64,
}

impl StepEngine {
    /// Creates an engine over a copy of `data`.
    pub fn new(algorithm: SortAlgorithm, data: &[u32]) -> Self {
        let data = data.to_vec();
        let n = data.len();

        let frames = if n < 2 {
            Vec::new()
        } else {
            vec![match algorithm {
                SortAlgorithm::Bubble => Frame::Bubble(BubbleState::default()),
                SortAlgorithm::Selection => Frame::Selection(SelectionState::new()),
                SortAlgorithm::Quick => Frame::Quick { low: 0, high: n - 1 },
                SortAlgorithm::Merge => Frame::MergeSort {
                    left: 0,
                    right: n - 1,
                },
            }]
        };

        Self {
            algorithm,
            data,
            frames,
            emitted: 0,
        }
    }

    /// The algorithm this engine runs.
    pub fn algorithm(&self) -> SortAlgorithm {
        self.algorithm
    }

    /// The engine's working copy at the current position.
    pub fn working_data(&self) -> &[u32] {
        &self.data
    }

    /// Number of steps produced so far.
    pub fn steps_emitted(&self) -> u64 {
        self.emitted
    }

    /// Returns true once no further steps will be produced.
    pub fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Iterator for StepEngine {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        loop {
            let frame = self.frames.last_mut()?;
            match frame.resume(&mut self.data) {
                Resume::Yield(step) => {
                    self.emitted += 1;
                    return Some(step);
                }
                Resume::Finished => {
                    self.frames.pop();
                }
                Resume::Expand(children) => {
                    self.frames.pop();
                    self.frames.extend(children.into_iter().rev());
                }
            }
        }
    }
}

impl FusedIterator for StepEngine {}

impl fmt::Debug for StepEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepEngine")
            .field("algorithm", &self.algorithm)
            .field("len", &self.data.len())
            .field("pending_frames", &self.frames.len())
            .field("emitted", &self.emitted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn compare(i: usize, j: usize) -> Step {
        Step::Compare { indices: [i, j] }
    }

    fn swap(indices: &[usize], snapshot: &[u32]) -> Step {
        Step::Swap {
            indices: indices.to_vec(),
            snapshot: snapshot.to_vec(),
        }
    }

    #[test]
    fn test_algorithm_name_resolution() {
        assert_eq!(SortAlgorithm::from_name("Quick Sort"), SortAlgorithm::Quick);
        assert_eq!(SortAlgorithm::from_name("QUICKSORT"), SortAlgorithm::Quick);
        assert_eq!(SortAlgorithm::from_name("merge"), SortAlgorithm::Merge);
        assert_eq!(SortAlgorithm::from_name("Merge Sort"), SortAlgorithm::Merge);
        assert_eq!(
            SortAlgorithm::from_name("Selection Sort"),
            SortAlgorithm::Selection
        );
        assert_eq!(SortAlgorithm::from_name("sel ection"), SortAlgorithm::Selection);
        assert_eq!(SortAlgorithm::from_name("Bubble Sort"), SortAlgorithm::Bubble);
        // Unknown names fall back to bubble
        assert_eq!(SortAlgorithm::from_name("Heap Sort"), SortAlgorithm::Bubble);
        assert_eq!(SortAlgorithm::from_name(""), SortAlgorithm::Bubble);

        for algo in SortAlgorithm::ALL {
            assert_eq!(SortAlgorithm::from_name(algo.name()), algo);
            assert_eq!(algo.to_string().parse::<SortAlgorithm>().unwrap(), algo);
        }
    }

    #[test]
    fn test_algorithm_serde_uses_display_name() {
        let json = serde_json::to_string(&SortAlgorithm::Selection).unwrap();
        assert_eq!(json, "\"Selection Sort\"");

        let parsed: SortAlgorithm = serde_json::from_str("\"quick sort\"").unwrap();
        assert_eq!(parsed, SortAlgorithm::Quick);

        let fallback: SortAlgorithm = serde_json::from_str("\"Bogo Sort\"").unwrap();
        assert_eq!(fallback, SortAlgorithm::Bubble);
    }

    #[test]
    fn test_trivial_datasets_yield_nothing() {
        for algo in SortAlgorithm::ALL {
            assert_eq!(algo.engine(&[]).count(), 0);
            assert_eq!(algo.engine(&[42]).count(), 0);
        }
    }

    #[test]
    fn test_bubble_step_sequence() {
        let steps: Vec<Step> = SortAlgorithm::Bubble.engine(&[3, 1, 2]).collect();
        assert_eq!(
            steps,
            vec![
                compare(0, 1),
                swap(&[0, 1], &[1, 3, 2]),
                compare(1, 2),
                swap(&[1, 2], &[1, 2, 3]),
                compare(0, 1),
            ]
        );
    }

    #[test]
    fn test_selection_step_sequence() {
        let steps: Vec<Step> = SortAlgorithm::Selection.engine(&[3, 1, 2]).collect();
        assert_eq!(
            steps,
            vec![
                compare(0, 1),
                compare(1, 2),
                swap(&[0, 1], &[1, 3, 2]),
                compare(1, 2),
                swap(&[1, 2], &[1, 2, 3]),
            ]
        );
    }

    #[test]
    fn test_quick_step_sequence() {
        let steps: Vec<Step> = SortAlgorithm::Quick.engine(&[3, 1, 2]).collect();
        assert_eq!(
            steps,
            vec![
                compare(0, 2),
                compare(1, 2),
                swap(&[0, 1], &[1, 3, 2]),
                swap(&[1, 2], &[1, 2, 3]),
            ]
        );
    }

    #[test]
    fn test_quick_swaps_element_with_itself() {
        // Already sorted: every probe is below the pivot and lands in place
        let steps: Vec<Step> = SortAlgorithm::Quick.engine(&[1, 2, 3]).collect();
        assert_eq!(steps[0], compare(0, 2));
        assert_eq!(steps[1], swap(&[0, 0], &[1, 2, 3]));
        assert_eq!(steps[2], compare(1, 2));
        assert_eq!(steps[3], swap(&[1, 1], &[1, 2, 3]));
        assert_eq!(steps[4], swap(&[2, 2], &[1, 2, 3]));
    }

    #[test]
    fn test_merge_step_sequence() {
        let steps: Vec<Step> = SortAlgorithm::Merge.engine(&[3, 1, 2]).collect();
        assert_eq!(
            steps,
            vec![
                compare(0, 1),
                swap(&[0], &[1, 1, 2]),
                swap(&[1], &[1, 3, 2]),
                compare(0, 2),
                swap(&[0], &[1, 3, 2]),
                compare(1, 2),
                swap(&[1], &[1, 2, 2]),
                swap(&[2], &[1, 2, 3]),
            ]
        );
    }

    #[test]
    fn test_merge_ties_take_left() {
        let steps: Vec<Step> = SortAlgorithm::Merge.engine(&[5, 5]).collect();
        // One decision, then the right run drains
        assert_eq!(
            steps,
            vec![
                compare(0, 1),
                swap(&[0], &[5, 5]),
                swap(&[1], &[5, 5]),
            ]
        );
    }

    #[test]
    fn test_engine_does_not_mutate_caller_data() {
        let original = vec![9, 4, 7, 1, 8];
        for algo in SortAlgorithm::ALL {
            let engine = algo.engine(&original);
            let _: Vec<Step> = engine.collect();
            assert_eq!(original, vec![9, 4, 7, 1, 8]);
        }
    }

    #[test]
    fn test_engine_is_fused() {
        let mut engine = SortAlgorithm::Quick.engine(&[2, 1]);
        while engine.next().is_some() {}
        assert!(engine.is_exhausted());
        assert!(engine.next().is_none());
        assert!(engine.next().is_none());
    }

    #[test]
    fn test_steps_emitted_counts_pulls() {
        let mut engine = SortAlgorithm::Bubble.engine(&[3, 1, 2]);
        engine.next();
        engine.next();
        assert_eq!(engine.steps_emitted(), 2);
        let rest = engine.by_ref().count();
        assert_eq!(engine.steps_emitted(), 2 + rest as u64);
    }

    #[test]
    fn test_bubble_compare_count_is_data_independent() {
        let n = 12;
        let sorted: Vec<u32> = (10..10 + n as u32).collect();
        let reversed: Vec<u32> = sorted.iter().rev().copied().collect();
        let compares = |data: &[u32]| {
            SortAlgorithm::Bubble
                .engine(data)
                .filter(|s| !s.is_swap())
                .count()
        };
        assert_eq!(compares(&sorted), n * (n - 1) / 2);
        assert_eq!(compares(&reversed), n * (n - 1) / 2);
    }

    #[test]
    fn test_selection_swaps_at_most_once_per_pass() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let data = random_dataset(&mut rng, 40);
        let swaps = SortAlgorithm::Selection
            .engine(&data)
            .filter(Step::is_swap)
            .count();
        assert!(swaps < data.len());
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let data = random_dataset(&mut rng, 30);
        for algo in [SortAlgorithm::Bubble, SortAlgorithm::Selection] {
            let first: Vec<Step> = algo.engine(&data).collect();
            let second: Vec<Step> = algo.engine(&data).collect();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_apply_rejects_malformed_swaps() {
        let mut data = vec![30, 10, 20];
        let malformed = [
            Step::Swap { indices: vec![], snapshot: vec![1, 2, 3] },
            Step::Swap { indices: vec![0, 1, 2], snapshot: vec![1, 2, 3] },
            Step::Swap { indices: vec![0, 7], snapshot: vec![1, 2, 3] },
            Step::Swap { indices: vec![5], snapshot: vec![1, 2, 3] },
            Step::Swap { indices: vec![2], snapshot: vec![1] },
        ];
        for step in &malformed {
            assert!(!apply(&mut data, step), "{:?} was applied", step);
        }
        assert_eq!(data, vec![30, 10, 20]);

        assert!(apply(&mut data, &compare(0, 9)));
        assert!(apply(&mut data, &Step::Swap { indices: vec![0, 1], snapshot: vec![] }));
        assert!(apply(&mut data, &Step::Swap { indices: vec![2], snapshot: vec![0, 0, 99] }));
        assert_eq!(data, vec![10, 30, 99]);
    }

    #[test]
    fn test_random_dataset_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let data = random_dataset(&mut rng, 1000);
        assert_eq!(data.len(), 1000);
        assert!(data.iter().all(|v| (MIN_VALUE..MAX_VALUE).contains(v)));
    }

    #[test]
    fn test_step_json_shape() {
        let json = serde_json::to_value(compare(2, 3)).unwrap();
        assert_eq!(json["type"], "compare");
        assert_eq!(json["indices"], serde_json::json!([2, 3]));

        let json = serde_json::to_value(swap(&[1], &[4, 5])).unwrap();
        assert_eq!(json["type"], "swap");
        assert_eq!(json["snapshot"], serde_json::json!([4, 5]));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_replay_sorts_every_algorithm(data in prop::collection::vec(MIN_VALUE..MAX_VALUE, 0..500)) {
            let mut expected = data.clone();
            expected.sort_unstable();

            for algo in SortAlgorithm::ALL {
                let mut replayed = data.clone();
                for step in algo.engine(&data) {
                    prop_assert!(step.indices().iter().all(|&i| i < data.len()));
                    prop_assert!(apply(&mut replayed, &step));
                    if let Some(snapshot) = step.snapshot() {
                        prop_assert_eq!(snapshot, replayed.as_slice());
                    }
                }
                prop_assert_eq!(&replayed, &expected, "{} did not sort", algo);
            }
        }
    }
}
