//! Decompose a dataset, restrict its trees to each subset, then choose the
//! best of several iterations.

use std::collections::HashSet;
use std::fs;

use itertools::Itertools;
use phylo_subsets::decompose::{DecompositionBounds, decompose};
use phylo_subsets::induce::induce_from_files;
use phylo_subsets::io::{read_dataset_taxa, read_tree_collection};
use phylo_subsets::select::{iteration_log_path, select_best};
use tempfile::tempdir;

const TREES: &str = "\
((((t0,t1),(t2,t3)),(t4,t5)),((t6,t7),(t8,t9)));
(((t0,t2),(t1,t3)),((t4,(t5,t6)),(t7,(t8,t9))));
";

#[test]
fn decompose_then_induce_each_subset() {
    let dir = tempdir().unwrap();
    let trees_path = dir.path().join("gene_trees.nwk");
    fs::write(&trees_path, TREES).unwrap();

    let taxa = read_dataset_taxa(&trees_path).unwrap();
    assert_eq!(taxa.len(), 10);

    let bounds = DecompositionBounds::new(4, 1).unwrap();
    let decomposition = decompose(taxa.iter().cloned(), bounds).unwrap();
    assert!(decomposition.subsets.iter().all(|s| s.len() <= 4));

    for split in &decomposition.splits {
        for (i, j) in split.left.clone().cartesian_product(split.right.clone()) {
            let a: HashSet<&String> = decomposition.subsets[i].taxa.iter().collect();
            let shared = decomposition.subsets[j].taxa.iter().filter(|t| a.contains(t)).count();
            assert!(shared <= 1);
        }
    }

    let list_paths: Vec<_> = decomposition
        .subsets
        .iter()
        .map(|subset| {
            let path = dir.path().join(format!("subset{}.txt", subset.index));
            fs::write(&path, subset.taxa.join("\n")).unwrap();
            path
        })
        .collect();

    let reports = induce_from_files(&trees_path, &list_paths).unwrap();
    assert_eq!(reports.len(), decomposition.len());

    for (subset, report) in decomposition.subsets.iter().zip(&reports) {
        assert!(!report.labels_path.exists());
        let induced = read_tree_collection(&report.output_path).unwrap();
        assert_eq!(induced.len(), 2);

        let expected: HashSet<String> = subset.taxa.iter().cloned().collect();
        for tree in &induced {
            let leaves: HashSet<String> = tree.get_leaf_names().into_iter().flatten().collect();
            assert_eq!(leaves, expected);
        }
    }
}

#[test]
fn select_among_iterations() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("out_");
    let scores = [Some(1500), Some(1720), None, Some(1720), Some(900)];
    for (i, score) in scores.iter().enumerate() {
        if let Some(score) = score {
            fs::write(
                iteration_log_path(&prefix, i),
                format!("Reading trees\nFinal quartet score is: {score}\nFinal normalized quartet score is: 0.8\n"),
            )
            .unwrap();
        }
    }

    let selection = select_best(&prefix, scores.len() - 1);
    assert_eq!(selection.best, Some((1, 1720)));
    assert_eq!(selection.unscored().map(|it| it.index).collect::<Vec<_>>(), vec![2]);
}
