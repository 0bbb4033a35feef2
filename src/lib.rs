//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `decompose`: padded recursive decomposition of a taxon set into bounded, overlapping subsets.
//! - `induce`: restriction of Newick tree collections to a taxon label set.
//! - `select`: quartet-score parsing and best-iteration selection.
//! - `io`: tree-collection, taxon-list and subset-report files.
//! - `bitset`: compact bitset over taxon indices.
//! - `error`: the shared `PipelineError` type.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod decompose;
pub mod error;
pub mod induce;
pub mod io;
pub mod select;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use decompose::{Decomposition, DecompositionBounds, Subset, decompose, decompose_guided, guide_order};
pub use error::{PipelineError, Result};
pub use induce::{InducedCollection, induce_from_files, induce_trees, restrict_tree};
pub use io::{read_taxon_list, read_tree_collection, write_subset_report, write_tree_collection};
pub use select::{Selection, quartet_score, select_best};
