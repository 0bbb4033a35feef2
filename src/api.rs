//! Python binding layer for the decomposition pipeline.
//!
//! Exposes subset decomposition, subtree induction and iteration selection
//! so that Python orchestration scripts can call them in-process.

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashSet;

use crate::decompose::{DecompositionBounds, decompose, decompose_guided};
use crate::error::PipelineError;
use crate::induce::{induce_from_files, induce_trees};
use crate::io::{read_tree_collection, write_tree_collection};
use crate::select::select_best;

fn to_py_err(e: PipelineError) -> PyErr {
    match e {
        PipelineError::MissingInputFile { .. } | PipelineError::WriteOutput { .. } => {
            PyIOError::new_err(e.to_string())
        }
        _ => PyValueError::new_err(e.to_string()),
    }
}

/// Split taxa into bounded, overlapping subsets.
///
/// Args:
///     taxa: Taxon labels of the full dataset
///     max_subset_size: Maximum number of taxa per subset
///     max_overlap: Maximum number of taxa shared by sibling subsets (default: 0)
///     guided: Keep the given order of `taxa` instead of sorting labels (default: False)
///
/// Returns:
///     A list of subsets, each a list of taxon labels, in decomposition order.
///
/// Raises:
///     ValueError: If the bounds are invalid or `taxa` is empty
#[pyfunction]
#[pyo3(signature = (taxa, max_subset_size, max_overlap=0, guided=false))]
fn decompose_taxa(
    taxa: Vec<String>,
    max_subset_size: usize,
    max_overlap: usize,
    guided: bool,
) -> PyResult<Vec<Vec<String>>> {
    let bounds = DecompositionBounds::new(max_subset_size, max_overlap).map_err(to_py_err)?;
    let decomposition = if guided {
        decompose_guided(taxa, bounds)
    } else {
        decompose(taxa, bounds)
    }
    .map_err(to_py_err)?;

    Ok(decomposition.subsets.into_iter().map(|s| s.taxa).collect())
}

/// Restrict a Newick tree collection to a set of taxa.
///
/// Args:
///     tree_path: Path to the Newick tree collection
///     labels: Taxon labels to keep
///     output_path: Where to write the restricted collection
///
/// Returns:
///     Indices of source trees dropped because no kept taxon remained.
///
/// Raises:
///     IOError: If the collection cannot be read or the output written
///     ValueError: If a tree cannot be parsed
#[pyfunction]
fn induce_trees_to_file(tree_path: String, labels: Vec<String>, output_path: String) -> PyResult<Vec<usize>> {
    let trees = read_tree_collection(&tree_path).map_err(to_py_err)?;
    let keep: HashSet<String> = labels.into_iter().collect();
    let induced = induce_trees(&trees, &keep).map_err(to_py_err)?;
    write_tree_collection(&output_path, &induced.trees).map_err(to_py_err)?;
    Ok(induced.dropped)
}

/// Restrict a tree collection once per taxon-list file.
///
/// Each list is consumed (removed) and its result written next to it as
/// `in.<list name>`.
///
/// Returns:
///     The output paths, one per list.
#[pyfunction]
fn induce_from_lists(tree_path: String, label_paths: Vec<String>) -> PyResult<Vec<String>> {
    let reports = induce_from_files(&tree_path, &label_paths).map_err(to_py_err)?;
    Ok(reports
        .into_iter()
        .map(|r| r.output_path.to_string_lossy().into_owned())
        .collect())
}

/// Pick the best-scoring iteration from `<prefix>logs.<i>` for i in 0..=max_iteration.
///
/// Returns:
///     A tuple of (best_index, found) where `found` is False if no iteration
///     produced a score (best_index is then 0).
#[pyfunction]
fn select_best_iteration(prefix: String, max_iteration: usize) -> (usize, bool) {
    let selection = select_best(&prefix, max_iteration);
    (selection.best_index(), selection.best.is_some())
}

/// Python module definition
#[pymodule]
fn phylo_subsets(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(decompose_taxa, m)?)?;
    m.add_function(wrap_pyfunction!(induce_trees_to_file, m)?)?;
    m.add_function(wrap_pyfunction!(induce_from_lists, m)?)?;
    m.add_function(wrap_pyfunction!(select_best_iteration, m)?)?;
    Ok(())
}
