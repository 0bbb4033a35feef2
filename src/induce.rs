//! Restrict tree collections to a set of taxon labels (induced subtrees).
//!
//! # Overview
//! For every tree, leaves whose label is not kept are removed. Removing leaves
//! leaves behind two kinds of redundant structure, both cleaned up here:
//!
//! ```text
//!        root                      root
//!       /    \                    /    \
//!     n1      n2       keep      a      c
//!    /  \    /  \     {a,c}
//!   a    b  c    d    ─────▶   (n1 and n2 keep one child each
//!                               and are suppressed)
//! ```
//!
//! - internal nodes left with no children disappear entirely
//! - internal nodes left with exactly one child are suppressed, and their
//!   edge is fused into the child's edge (so path lengths are preserved)
//!
//! Ancestry among kept leaves is unchanged, and applying the same restriction
//! to an already restricted tree gives back the same tree.
//!
//! Trees are first copied into a plain [`TopologySnapshot`] (the tree type
//! itself cannot cross threads), restricted in parallel over the snapshots,
//! and rebuilt into fresh trees in source order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use phylotree::tree::{Node, Tree as PhyloTree, TreeError};
use rayon::prelude::*;

use crate::error::{PipelineError, Result};
use crate::io::{
    induced_output_path, read_taxon_list, read_tree_collection, remove_transient,
    write_tree_collection,
};

/// Restricted copy of a collection.
#[derive(Debug, Clone)]
pub struct InducedCollection {
    /// Restricted trees, in source order.
    pub trees: Vec<PhyloTree>,
    /// Source indices of trees that kept no leaf and were dropped.
    pub dropped: Vec<usize>,
}

/// Outcome of [`induce_from_files`] for one taxon list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InductionReport {
    pub labels_path: PathBuf,
    pub output_path: PathBuf,
    pub kept_trees: usize,
    pub dropped_trees: Vec<usize>,
}

/// Owned, `Sync` copy of a tree's topology.
///
/// `phylotree::tree::Tree` keeps interior-mutable caches, so it cannot be
/// shared across threads. Trees are lowered into this snapshot one by one,
/// restricted in parallel, and rebuilt one by one.
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    nodes: Vec<SnapshotNode>,
    root: usize,
}

#[derive(Debug, Clone)]
struct SnapshotNode {
    name: Option<String>,
    edge: Option<f64>,
    children: Vec<usize>,
}

impl TopologySnapshot {
    /// Copy the reachable part of `tree`, children kept in source order.
    ///
    /// # Errors
    /// Returns `TreeError` if the tree has no root or references missing nodes.
    pub fn from_tree(tree: &PhyloTree) -> std::result::Result<Self, TreeError> {
        let root_id = tree.get_root()?;
        let mut nodes = Vec::with_capacity(tree.size());
        // (source node id, slot of its parent in `nodes`)
        let mut stack: Vec<(usize, Option<usize>)> = vec![(root_id, None)];

        while let Some((node_id, parent_slot)) = stack.pop() {
            let node = tree.get(&node_id)?;
            let slot = nodes.len();
            nodes.push(SnapshotNode {
                name: node.name.clone(),
                edge: node.parent_edge,
                children: Vec::with_capacity(node.children.len()),
            });
            if let Some(parent_slot) = parent_slot {
                nodes[parent_slot].children.push(slot);
            }
            // Reversed so children are visited, and recorded, left to right.
            stack.extend(node.children.iter().rev().map(|&child| (child, Some(slot))));
        }

        Ok(Self { nodes, root: 0 })
    }

    /// Restrict to `keep`; `None` when no kept leaf survives.
    pub fn restrict(&self, keep: &HashSet<String>) -> Option<Restricted> {
        self.restrict_node(self.root, keep)
    }

    fn restrict_node(&self, slot: usize, keep: &HashSet<String>) -> Option<Restricted> {
        let node = &self.nodes[slot];

        // Base case: leaf node
        if node.children.is_empty() {
            let kept = node.name.as_ref().is_some_and(|name| keep.contains(name));
            return kept.then(|| Restricted {
                name: node.name.clone(),
                edge: node.edge,
                children: Vec::new(),
            });
        }

        let mut children: Vec<Restricted> = node
            .children
            .iter()
            .filter_map(|&child| self.restrict_node(child, keep))
            .collect();

        match children.len() {
            0 => None,
            // Degree-2 node: splice it out.
            1 => children.pop().map(|mut only| {
                only.edge = fuse_edges(node.edge, only.edge);
                only
            }),
            _ => Some(Restricted {
                name: node.name.clone(),
                edge: node.edge,
                children,
            }),
        }
    }
}

/// Owned form of a restricted subtree, turned back into a tree by
/// [`Restricted::into_tree`].
#[derive(Debug, Clone)]
pub struct Restricted {
    name: Option<String>,
    edge: Option<f64>,
    children: Vec<Restricted>,
}

impl Restricted {
    pub fn into_tree(self) -> std::result::Result<PhyloTree, TreeError> {
        let mut tree = PhyloTree::new();
        build_node(&mut tree, None, self)?;
        Ok(tree)
    }
}

fn fuse_edges(parent: Option<f64>, child: Option<f64>) -> Option<f64> {
    match (parent, child) {
        (Some(p), Some(c)) => Some(p + c),
        (p, c) => p.or(c),
    }
}

fn build_node(
    tree: &mut PhyloTree,
    parent: Option<usize>,
    restricted: Restricted,
) -> std::result::Result<(), TreeError> {
    let mut node = Node::new();
    node.name = restricted.name;

    let id = match parent {
        None => {
            node.parent_edge = restricted.edge;
            tree.add(node)
        }
        Some(parent) => tree.add_child(node, parent, restricted.edge)?,
    };
    for child in restricted.children {
        build_node(tree, Some(id), child)?;
    }
    Ok(())
}

fn collection_error(index: usize, e: TreeError) -> PipelineError {
    PipelineError::MalformedTree {
        path: PathBuf::from("<collection>"),
        index,
        message: e.to_string(),
    }
}

/// Restrict one tree to `keep`. Returns `None` if no leaf survives.
///
/// # Errors
/// Returns `TreeError` if the tree has no root or references missing nodes.
pub fn restrict_tree(
    tree: &PhyloTree,
    keep: &HashSet<String>,
) -> std::result::Result<Option<PhyloTree>, TreeError> {
    TopologySnapshot::from_tree(tree)?
        .restrict(keep)
        .map(Restricted::into_tree)
        .transpose()
}

/// Lower a collection into snapshots, in source order.
pub fn snapshot_collection(trees: &[PhyloTree]) -> Result<Vec<TopologySnapshot>> {
    trees
        .iter()
        .enumerate()
        .map(|(index, tree)| TopologySnapshot::from_tree(tree).map_err(|e| collection_error(index, e)))
        .collect()
}

/// Restrict snapshots to `keep` in parallel, rebuilding trees in source order.
///
/// Trees left without any leaf are dropped and their source indices reported
/// in [`InducedCollection::dropped`].
pub fn induce_snapshots(snapshots: &[TopologySnapshot], keep: &HashSet<String>) -> Result<InducedCollection> {
    let restricted: Vec<Option<Restricted>> = snapshots
        .par_iter()
        .map(|snapshot| snapshot.restrict(keep))
        .collect();

    let mut induced = InducedCollection { trees: Vec::with_capacity(snapshots.len()), dropped: Vec::new() };
    for (index, tree) in restricted.into_iter().enumerate() {
        match tree {
            Some(tree) => induced.trees.push(tree.into_tree().map_err(|e| collection_error(index, e))?),
            None => induced.dropped.push(index),
        }
    }

    if !induced.dropped.is_empty() {
        tracing::warn!(
            "Dropped {} of {} trees with no leaf in the kept label set",
            induced.dropped.len(),
            snapshots.len()
        );
    }
    Ok(induced)
}

/// Restrict every tree of a collection to `keep`, preserving order.
pub fn induce_trees(trees: &[PhyloTree], keep: &HashSet<String>) -> Result<InducedCollection> {
    induce_snapshots(&snapshot_collection(trees)?, keep)
}

/// Restrict the collection at `tree_path` once per taxon-list file.
///
/// All or nothing: every list is read and every restriction computed before
/// any output is written. If a write fails, outputs already written by this
/// call are removed again. Lists are removed only after every output has been
/// written. The collection file itself is never modified.
///
/// # Errors
/// `MissingInputFile` if the collection or any list cannot be read;
/// `WriteOutput` if an output cannot be written.
pub fn induce_from_files<P, Q>(tree_path: P, labels_paths: &[Q]) -> Result<Vec<InductionReport>>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let tree_path = tree_path.as_ref();
    let snapshots = snapshot_collection(&read_tree_collection(tree_path)?)?;

    let keeps = labels_paths
        .iter()
        .map(|labels_path| read_taxon_list(labels_path).map(|labels| labels.into_iter().collect::<HashSet<String>>()))
        .collect::<Result<Vec<_>>>()?;

    let induced = keeps
        .iter()
        .map(|keep| induce_snapshots(&snapshots, keep))
        .collect::<Result<Vec<_>>>()?;

    let mut written: Vec<PathBuf> = Vec::with_capacity(induced.len());
    for (labels_path, collection) in labels_paths.iter().zip(&induced) {
        let output_path = induced_output_path(labels_path);
        if let Err(e) = write_tree_collection(&output_path, &collection.trees) {
            // The failed output may be partially written too.
            for path in written.iter().chain(std::iter::once(&output_path)) {
                let _ = std::fs::remove_file(path);
            }
            return Err(e);
        }
        written.push(output_path);
    }

    for labels_path in labels_paths {
        remove_transient(labels_path)?;
    }

    let reports = labels_paths
        .iter()
        .zip(keeps.iter().zip(induced))
        .zip(written)
        .map(|((labels_path, (keep, collection)), output_path)| {
            tracing::info!(
                "Induced {} trees on {} taxa into {}",
                collection.trees.len(),
                keep.len(),
                output_path.display()
            );
            InductionReport {
                labels_path: labels_path.as_ref().to_path_buf(),
                output_path,
                kept_trees: collection.trees.len(),
                dropped_trees: collection.dropped,
            }
        })
        .collect();
    Ok(reports)
}
