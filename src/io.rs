use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use itertools::Itertools;
use phylotree::tree::Tree;

use crate::decompose::Decomposition;
use crate::error::{PipelineError, Result};

/// Prefix marking an induced (filtered) tree collection.
pub const INDUCED_PREFIX: &str = "in.";

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

fn missing(path: &Path, source: io::Error) -> PipelineError {
    PipelineError::MissingInputFile { path: path.to_path_buf(), source }
}

fn write_failed(path: &Path, source: io::Error) -> PipelineError {
    PipelineError::WriteOutput { path: path.to_path_buf(), source }
}

/// Read a whole file as text, gunzipping it first if the path ends with `.gz`.
fn read_text(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| missing(path, e))?;
    let mut content = String::new();
    if is_gz(path) {
        GzDecoder::new(file)
            .read_to_string(&mut content)
            .map_err(|e| missing(path, e))?;
    } else {
        BufReader::new(file)
            .read_to_string(&mut content)
            .map_err(|e| missing(path, e))?;
    }
    Ok(content)
}

/// A blank between two characters of one unquoted label, such as
/// `Homo sapiens`. Newick needs such labels quoted or written with `_`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unquoted whitespace inside label starting {label:?}")]
pub struct UnquotedBlank {
    /// Zero-based index of the record holding the label.
    pub record: usize,
    /// Label text up to and including the first character after the blank.
    pub label: String,
}

/// Split a multi-tree Newick document into one string per tree.
///
/// Records end at `;` outside quoted labels. Bracketed comments (`[&rate=...]`,
/// `[&R]`, ...) are dropped since the tree parser does not need them. Each
/// returned record keeps its terminating `;`.
///
/// Blanks around structural characters (`(),:;`) are dropped. A blank inside
/// an unquoted label is rejected rather than dropped, since dropping it would
/// silently merge `Homo sapiens` into `Homosapiens`.
pub fn split_newick_records(content: &str) -> std::result::Result<Vec<String>, UnquotedBlank> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut comment_depth = 0usize;
    // Unquoted label or number being read, and whether a blank followed it.
    let mut token = String::new();
    let mut blank_after_token = false;

    for ch in content.chars() {
        if let Some(q) = quote {
            current.push(ch);
            token.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '[' => comment_depth += 1,
            ']' if comment_depth > 0 => comment_depth -= 1,
            _ if comment_depth > 0 => {}
            c if c.is_whitespace() => blank_after_token = !token.is_empty(),
            '(' | ')' | ',' | ':' | ';' => {
                token.clear();
                blank_after_token = false;
                current.push(ch);
                if ch == ';' {
                    let record = current.trim();
                    if record != ";" {
                        records.push(record.to_string());
                    }
                    current.clear();
                }
            }
            c => {
                if blank_after_token {
                    token.push(' ');
                    token.push(c);
                    return Err(UnquotedBlank { record: records.len(), label: token });
                }
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                current.push(c);
                token.push(c);
            }
        }
    }

    if !current.trim().is_empty() {
        tracing::warn!("Ignoring trailing Newick text without a closing ';'");
    }
    Ok(records)
}

/// Read every tree of a Newick collection, in file order.
///
/// # Errors
/// `MissingInputFile` if the file cannot be read; `MalformedTree` naming the
/// zero-based record index if any record fails to parse.
pub fn read_tree_collection<P: AsRef<Path>>(path: P) -> Result<Vec<Tree>> {
    let path = path.as_ref();
    let content = read_text(path)?;

    let records = split_newick_records(&content).map_err(|e| PipelineError::MalformedTree {
        path: path.to_path_buf(),
        index: e.record,
        message: e.to_string(),
    })?;
    let trees = records
        .iter()
        .enumerate()
        .map(|(index, newick)| {
            Tree::from_newick(newick).map_err(|e| PipelineError::MalformedTree {
                path: path.to_path_buf(),
                index,
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!("Read {} trees from {}", trees.len(), path.display());
    Ok(trees)
}

/// Write a tree collection as Newick, one tree per line.
/// If `path` ends with `.gz`, the output is gzip-compressed.
pub fn write_tree_collection<P: AsRef<Path>>(path: P, trees: &[Tree]) -> Result<()> {
    let path = path.as_ref();

    let file = File::create(path).map_err(|e| write_failed(path, e))?;
    let mut out: Box<dyn Write> = if is_gz(path) {
        Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
    } else {
        Box::new(BufWriter::new(file))
    };

    for (index, tree) in trees.iter().enumerate() {
        let newick = tree.to_newick().map_err(|e| PipelineError::MalformedTree {
            path: path.to_path_buf(),
            index,
            message: e.to_string(),
        })?;
        writeln!(&mut out, "{newick}").map_err(|e| write_failed(path, e))?;
    }

    out.flush().map_err(|e| write_failed(path, e))?;
    Ok(())
}

/// Read a taxon list: one label per line.
///
/// Trailing whitespace (including `\r`) is stripped, blank lines are skipped
/// and a missing final newline is fine. Labels are otherwise kept verbatim,
/// in file order.
pub fn read_taxon_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| missing(path, e))?;

    let mut labels = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| missing(path, e))?;
        let label = line.trim_end();
        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }
    Ok(labels)
}

/// The full taxon set of a dataset: the union of leaf labels over every tree
/// of a Newick collection. Unlabelled leaves are ignored.
pub fn read_dataset_taxa<P: AsRef<Path>>(path: P) -> Result<BTreeSet<String>> {
    let trees = read_tree_collection(path)?;
    Ok(trees
        .iter()
        .flat_map(|tree| tree.get_leaf_names())
        .flatten()
        .collect())
}

/// Where the induced collection for a given taxon list is written:
/// `<dir of list>/in.<list file name>`.
pub fn induced_output_path<P: AsRef<Path>>(labels_path: P) -> PathBuf {
    let labels_path = labels_path.as_ref();
    let name = labels_path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    labels_path.with_file_name(format!("{INDUCED_PREFIX}{name}"))
}

/// Write the human-readable subset report, one line per subset:
///
/// ```text
/// subset  0: t0, t1, t2, t3
/// subset  1: t3, t4, t5
/// ```
pub fn write_subset_report<P: AsRef<Path>>(path: P, decomposition: &Decomposition) -> Result<()> {
    let path = path.as_ref();
    let mut out = BufWriter::new(File::create(path).map_err(|e| write_failed(path, e))?);
    for subset in &decomposition.subsets {
        writeln!(&mut out, "subset {:2}: {}", subset.index, subset.taxa.iter().join(", "))
            .map_err(|e| write_failed(path, e))?;
    }
    out.flush().map_err(|e| write_failed(path, e))?;
    Ok(())
}

/// Remove a transient file once its consumer has finished with it.
pub fn remove_transient<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    fs::remove_file(path).map_err(|e| write_failed(path, e))?;
    tracing::debug!("Removed {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::{DecompositionBounds, decompose};
    use tempfile::tempdir;

    #[test]
    fn test_split_records() {
        let content = "((a,b),c);\n(a,(b,c));\n\n";
        assert_eq!(split_newick_records(content).unwrap(), vec!["((a,b),c);", "(a,(b,c));"]);
    }

    #[test]
    fn test_split_records_multiline_and_comments() {
        let content = "[&R] ((a:[&rate=0.1]1.0,\n  b:2.0),c:3.0);(x,y);";
        assert_eq!(
            split_newick_records(content).unwrap(),
            vec!["((a:1.0,b:2.0),c:3.0);", "(x,y);"]
        );
    }

    #[test]
    fn test_split_records_blanks_around_structure() {
        let content = "( a , b ) : 0.1 ;\n(c ,\td);";
        assert_eq!(split_newick_records(content).unwrap(), vec!["(a,b):0.1;", "(c,d);"]);
    }

    #[test]
    fn test_split_records_rejects_blank_in_label() {
        let content = "(a,b);\n(Homo sapiens,Pan);";
        assert_eq!(
            split_newick_records(content),
            Err(UnquotedBlank { record: 1, label: "Homo s".to_string() })
        );
        // Quoted, the blank is part of the label.
        assert_eq!(
            split_newick_records("('Homo sapiens',Pan);").unwrap(),
            vec!["('Homo sapiens',Pan);"]
        );
    }

    #[test]
    fn test_blank_in_label_is_malformed_tree() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trees.nwk");
        fs::write(&path, "(Homo sapiens,(Pan,Gorilla));\n").unwrap();
        let err = read_tree_collection(&path).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedTree { index: 0, .. }));
    }

    #[test]
    fn test_split_records_quoted_semicolon() {
        let content = "('a;b',c);";
        assert_eq!(split_newick_records(content).unwrap(), vec!["('a;b',c);"]);
    }

    #[test]
    fn test_read_taxon_list_trims() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("taxa.txt");
        fs::write(&path, "a\r\nb  \n\nc").unwrap();
        assert_eq!(read_taxon_list(&path).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_taxon_list() {
        let dir = tempdir().unwrap();
        let err = read_taxon_list(dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInputFile { .. }));
    }

    #[test]
    fn test_collection_gz_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trees.nwk.gz");
        let trees = vec![
            Tree::from_newick("((a,b),c);").unwrap(),
            Tree::from_newick("(a,(b,c));").unwrap(),
        ];
        write_tree_collection(&path, &trees).unwrap();
        let back = read_tree_collection(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].to_newick().unwrap(), trees[0].to_newick().unwrap());
    }

    #[test]
    fn test_malformed_tree_reports_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.nwk");
        fs::write(&path, "((a,b),c);\n((a,b),c;\n").unwrap();
        match read_tree_collection(&path) {
            Err(PipelineError::MalformedTree { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected malformed tree error, got {other:?}"),
        }
    }

    #[test]
    fn test_dataset_taxa_union() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trees.nwk");
        fs::write(&path, "((a,b),c);\n((a,d),e);\n").unwrap();
        let taxa: Vec<String> = read_dataset_taxa(&path).unwrap().into_iter().collect();
        assert_eq!(taxa, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_induced_output_path() {
        let path = induced_output_path("/work/run1/subset3.txt");
        assert_eq!(path, PathBuf::from("/work/run1/in.subset3.txt"));
    }

    #[test]
    fn test_subset_report_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subsets.txt");
        let bounds = DecompositionBounds::new(4, 1).unwrap();
        let dec = decompose((0..10).map(|i| format!("t{i}")), bounds).unwrap();
        write_subset_report(&path, &dec).unwrap();

        let report = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "subset  0: t0, t1, t2, t3");
        assert_eq!(lines[3], "subset  3: t7, t8, t9");
    }
}
