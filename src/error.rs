//! Error type shared by every stage of the pipeline.
//!
//! Configuration and missing-file problems abort the operation that hit them.
//! Per-iteration score problems never surface here; they are recorded as
//! [`crate::select::ScoreIssue`] values on the selection result instead.

use std::path::PathBuf;

/// Fatal errors raised by decomposition, induction and selection.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Size/overlap bounds rejected before any work was done.
    #[error(
        "invalid configuration (max subset size {max_subset_size}, max overlap {max_overlap}): {reason}"
    )]
    InvalidConfiguration {
        max_subset_size: usize,
        max_overlap: usize,
        reason: &'static str,
    },

    /// The taxon set handed to the decomposer holds no labels.
    #[error("cannot decompose an empty taxon set")]
    EmptyTaxonSet,

    /// A subset could not be brought under the size bound.
    #[error("subset {subset} has {size} taxa, above the maximum of {max_subset_size}")]
    DecompositionFailure {
        subset: usize,
        size: usize,
        max_subset_size: usize,
    },

    /// Some taxon of the ordering ended up in no subset.
    #[error("{missing} of {total} taxa are not covered by any subset")]
    CoverageGap { missing: usize, total: usize },

    /// The two sides of a split share more taxa than allowed.
    #[error("split {split} (depth {depth}) shares {shared} taxa between its sides, above the maximum overlap of {max_overlap}")]
    OverlapExceeded {
        split: usize,
        depth: usize,
        shared: usize,
        max_overlap: usize,
    },

    /// A required input (tree collection or taxon list) could not be read.
    #[error("failed to read {path}: {source}")]
    MissingInputFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A Newick record in a tree collection could not be parsed or serialized.
    #[error("malformed tree {index} in {path}: {message}")]
    MalformedTree {
        path: PathBuf,
        index: usize,
        message: String,
    },

    /// An output file could not be created or written.
    #[error("failed to write {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    /// None of the scanned iterations reported a usable score.
    #[error("no valid scores found across {iterations} iteration logs")]
    NoValidScore { iterations: usize },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
