//! Padded recursive decomposition of a taxon set into bounded, overlapping subsets.
//!
//! # Overview
//! The taxa are first laid out in a fixed order: sorted label order for a bare
//! taxon set, or depth-first leaf order when a guide tree is available (so that
//! neighbouring positions are phylogenetic neighbours). The ordering is then
//! bisected at its midpoint and each half is padded with a few boundary taxa
//! from the other half. With `max_overlap = 2`:
//!
//! ```text
//! order:   t0 t1 t2 t3 t4 | t5 t6 t7 t8 t9
//! left':   t0 t1 t2 t3 t4   t5                  (padded with t5)
//! right':              t4   t5 t6 t7 t8 t9      (padded with t4)
//! ```
//!
//! Padding on both sides never exceeds `max_overlap` taxa in total, so two
//! sibling halves share at most `max_overlap` taxa. Each padded half is then
//! decomposed again until it fits within `max_subset_size`.
//!
//! Because padding is always taken right next to the split point, every subset
//! ends up a contiguous window of the ordering. The recursion therefore works
//! on index ranges over an immutable snapshot of the ordering and never copies
//! labels until a subset is emitted.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

use phylotree::tree::Tree as PhyloTree;

use crate::bitset::Bitset;
use crate::error::{PipelineError, Result};

/// Validated size and overlap limits for a decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompositionBounds {
    max_subset_size: usize,
    max_overlap: usize,
}

impl DecompositionBounds {
    /// Checks `max_subset_size >= 1` and `max_overlap < max_subset_size`.
    pub fn new(max_subset_size: usize, max_overlap: usize) -> Result<Self> {
        let invalid = |reason| PipelineError::InvalidConfiguration {
            max_subset_size,
            max_overlap,
            reason,
        };
        if max_subset_size == 0 {
            return Err(invalid("maximum subset size must be at least 1"));
        }
        if max_overlap >= max_subset_size {
            return Err(invalid("maximum overlap must be smaller than the maximum subset size"));
        }
        Ok(Self { max_subset_size, max_overlap })
    }

    pub fn max_subset_size(&self) -> usize {
        self.max_subset_size
    }

    pub fn max_overlap(&self) -> usize {
        self.max_overlap
    }
}

/// One emitted subset. Taxa appear in decomposition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subset {
    pub index: usize,
    pub taxa: Vec<String>,
}

impl Subset {
    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }
}

/// Bookkeeping for one bisection.
///
/// `left` and `right` are the index ranges (into [`Decomposition::subsets`])
/// of the subsets produced from each padded half; `shared` are the taxa both
/// halves received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRecord {
    pub depth: usize,
    pub left: Range<usize>,
    pub right: Range<usize>,
    pub shared: Vec<String>,
}

/// Result of [`decompose`] / [`decompose_guided`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    /// The taxon ordering every subset is a window of.
    pub order: Vec<String>,
    pub subsets: Vec<Subset>,
    pub splits: Vec<SplitRecord>,
}

impl Decomposition {
    pub fn len(&self) -> usize {
        self.subsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsets.is_empty()
    }

    /// Re-checks the size, coverage and sibling-overlap guarantees.
    ///
    /// Every subset is reduced to its hull, the smallest window of `order`
    /// holding all its taxa. A split's two sides are compared through the
    /// union of their hulls: since every subset lies inside its hull, two
    /// subsets from opposite sides never share more taxa than the two side
    /// hulls do. Coverage is a single [`Bitset`] over `order`.
    ///
    /// # Errors
    /// `DecompositionFailure` for an oversized subset, `OverlapExceeded` when
    /// the sides of a split share too many positions, `CoverageGap` when some
    /// taxon of `order` is in no subset.
    pub fn verify(&self, bounds: DecompositionBounds) -> Result<()> {
        let n = self.order.len();
        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.as_str(), idx))
            .collect();

        let mut covered = Bitset::zeros(n.div_ceil(64));
        let mut hulls: Vec<Option<Range<usize>>> = Vec::with_capacity(self.subsets.len());
        for subset in &self.subsets {
            if subset.len() > bounds.max_subset_size {
                return Err(PipelineError::DecompositionFailure {
                    subset: subset.index,
                    size: subset.len(),
                    max_subset_size: bounds.max_subset_size,
                });
            }
            let mut hull: Option<Range<usize>> = None;
            for &idx in subset.taxa.iter().filter_map(|label| position.get(label.as_str())) {
                covered.set(idx);
                hull = Some(union_hull(hull, idx..idx + 1));
            }
            hulls.push(hull);
        }

        for (split_index, split) in self.splits.iter().enumerate() {
            let shared = overlap_len(side_hull(&hulls, &split.left), side_hull(&hulls, &split.right));
            if shared > bounds.max_overlap {
                return Err(PipelineError::OverlapExceeded {
                    split: split_index,
                    depth: split.depth,
                    shared,
                    max_overlap: bounds.max_overlap,
                });
            }
        }

        let missing = n - covered.count_ones();
        if missing > 0 {
            return Err(PipelineError::CoverageGap { missing, total: n });
        }

        Ok(())
    }
}

fn union_hull(hull: Option<Range<usize>>, other: Range<usize>) -> Range<usize> {
    match hull {
        Some(hull) => hull.start.min(other.start)..hull.end.max(other.end),
        None => other,
    }
}

/// Union of the hulls of the subsets in `subsets`; `None` if that side holds
/// no placed taxon.
fn side_hull(hulls: &[Option<Range<usize>>], subsets: &Range<usize>) -> Option<Range<usize>> {
    hulls
        .get(subsets.clone())?
        .iter()
        .flatten()
        .cloned()
        .fold(None, |acc, hull| Some(union_hull(acc, hull)))
}

fn overlap_len(a: Option<Range<usize>>, b: Option<Range<usize>>) -> usize {
    match (a, b) {
        (Some(a), Some(b)) => a.end.min(b.end).saturating_sub(a.start.max(b.start)),
        _ => 0,
    }
}

/// Decompose a taxon set using sorted label order.
///
/// # Errors
/// `EmptyTaxonSet` for an empty input; any error of [`Decomposition::verify`]
/// if the result does not satisfy the bounds.
pub fn decompose<I, S>(taxa: I, bounds: DecompositionBounds) -> Result<Decomposition>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let sorted: BTreeSet<String> = taxa.into_iter().map(Into::into).collect();
    decompose_ordered(sorted.into_iter().collect(), bounds)
}

/// Decompose following an explicit guide ordering (see [`guide_order`]).
///
/// Duplicate labels keep their first position.
pub fn decompose_guided<I, S>(order: I, bounds: DecompositionBounds) -> Result<Decomposition>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    let order: Vec<String> = order
        .into_iter()
        .map(Into::into)
        .filter(|label| seen.insert(label.clone()))
        .collect();
    decompose_ordered(order, bounds)
}

fn decompose_ordered(order: Vec<String>, bounds: DecompositionBounds) -> Result<Decomposition> {
    if order.is_empty() {
        return Err(PipelineError::EmptyTaxonSet);
    }

    let mut windows = Vec::new();
    let mut splits = Vec::new();
    split_range(0..order.len(), 0, bounds, &mut windows, &mut splits);

    let subsets = windows
        .into_iter()
        .enumerate()
        .map(|(index, window)| Subset { index, taxa: order[window].to_vec() })
        .collect();
    let splits = splits
        .into_iter()
        .map(|(depth, left, right, shared)| SplitRecord {
            depth,
            left,
            right,
            shared: order[shared].to_vec(),
        })
        .collect();

    let decomposition = Decomposition { order, subsets, splits };
    decomposition.verify(bounds)?;

    tracing::info!(
        "Decomposed {} taxa into {} subsets (max size {}, max overlap {})",
        decomposition.order.len(),
        decomposition.subsets.len(),
        bounds.max_subset_size,
        bounds.max_overlap
    );
    Ok(decomposition)
}

type RawSplit = (usize, Range<usize>, Range<usize>, Range<usize>);

/// Recursively bisect `range`, pushing emitted windows in left-to-right order.
fn split_range(
    range: Range<usize>,
    depth: usize,
    bounds: DecompositionBounds,
    windows: &mut Vec<Range<usize>>,
    splits: &mut Vec<RawSplit>,
) {
    let n = range.len();
    if n <= bounds.max_subset_size {
        windows.push(range);
        return;
    }

    // n >= 2 here, so both halves are non-empty.
    let mid = range.start + n / 2;
    let left_len = mid - range.start;
    let right_len = range.end - mid;

    // Each padded half must stay strictly smaller than the range it came from.
    let from_right = (bounds.max_overlap - bounds.max_overlap / 2).min(right_len - 1);
    let from_left = (bounds.max_overlap / 2).min(left_len - 1);

    let left = range.start..mid + from_right;
    let right = mid - from_left..range.end;
    let shared = right.start..left.end;
    tracing::debug!(
        "Split {:?} at {} (depth {}), sharing {} taxa",
        range,
        mid,
        depth,
        shared.len()
    );

    let first_left = windows.len();
    split_range(left, depth + 1, bounds, windows, splits);
    let first_right = windows.len();
    split_range(right, depth + 1, bounds, windows, splits);
    splits.push((depth, first_left..first_right, first_right..windows.len(), shared));
}

/// Leaf labels of a guide tree in depth-first order.
///
/// Unlabelled leaves are skipped.
pub fn guide_order(tree: &PhyloTree) -> Result<Vec<String>> {
    let root = tree.get_root().map_err(|e| guide_error(e.to_string()))?;
    let mut order = Vec::with_capacity(tree.get_leaves().len());
    let mut stack = vec![root];
    while let Some(node_id) = stack.pop() {
        let node = tree.get(&node_id).map_err(|e| guide_error(e.to_string()))?;
        if node.children.is_empty() {
            if let Some(name) = &node.name {
                order.push(name.clone());
            }
        } else {
            // Reversed so the leftmost child is visited first.
            stack.extend(node.children.iter().rev().copied());
        }
    }
    Ok(order)
}

fn guide_error(message: String) -> PipelineError {
    PipelineError::MalformedTree {
        path: "<guide tree>".into(),
        index: 0,
        message,
    }
}
