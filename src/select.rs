//! Pick the best pipeline iteration from the quartet tool's per-iteration logs.
//!
//! Iteration `i` writes its log to `<prefix>logs.<i>`. The tool reports its
//! result on a line such as
//!
//! ```text
//! Final quartet score is: 182364
//! ```
//!
//! The first such line in a file is that iteration's score. A missing log, a
//! log without the line, or a line whose score token does not parse just
//! leaves the iteration unscored; it never aborts the selection.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{PipelineError, Result};

/// Fixed text that opens a score line (case-sensitive).
pub const SCORE_LINE_PREFIX: &str = "Final quartet score is: ";

/// Position of the score among the whitespace-separated tokens after
/// [`SCORE_LINE_PREFIX`].
pub const SCORE_TOKEN_INDEX: usize = 4;

/// Why an iteration has no score.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreIssue {
    #[error("log file not found")]
    MissingLog,
    #[error("log file unreadable: {0}")]
    Unreadable(String),
    #[error("no score line")]
    NoScoreLine,
    #[error("malformed score line: {line:?}")]
    MalformedScoreLine { line: String },
}

/// Parse one log line.
///
/// Returns `None` when the line is not a score line. Otherwise the score is
/// the token at [`SCORE_TOKEN_INDEX`] after the prefix; lines carrying fewer
/// tokens than that (the tool's usual `Final quartet score is: <n>` form)
/// take the first token instead.
///
/// The position wins over the content: `Final quartet score is: 57 a b c d`
/// has a token at index 4 (`d`), so it is a `MalformedScoreLine` even though
/// the first token is a valid integer. Any line with five or more tokens
/// after the prefix is read at index 4 only.
pub fn parse_score_line(line: &str) -> Option<std::result::Result<i64, ScoreIssue>> {
    let rest = line.strip_prefix(SCORE_LINE_PREFIX)?;
    let tokens: Vec<&str> = rest.split_whitespace().collect();

    let malformed = || ScoreIssue::MalformedScoreLine { line: line.trim_end().to_string() };
    let token = tokens.get(SCORE_TOKEN_INDEX).or(tokens.first());
    Some(match token {
        Some(token) => token.parse::<i64>().map_err(|_| malformed()),
        None => Err(malformed()),
    })
}

/// Score reported in one iteration log. Only the first score line counts.
pub fn quartet_score<P: AsRef<Path>>(path: P) -> std::result::Result<i64, ScoreIssue> {
    let file = File::open(path.as_ref()).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ScoreIssue::MissingLog,
        _ => ScoreIssue::Unreadable(e.to_string()),
    })?;

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| ScoreIssue::Unreadable(e.to_string()))?;
        if let Some(score) = parse_score_line(&line) {
            return score;
        }
    }
    Err(ScoreIssue::NoScoreLine)
}

/// `<prefix>logs.<index>`; `prefix` is used verbatim, so a directory prefix
/// needs its trailing separator.
pub fn iteration_log_path<P: AsRef<Path>>(prefix: P, index: usize) -> PathBuf {
    let mut name = OsString::from(prefix.as_ref().as_os_str());
    name.push(format!("logs.{index}"));
    PathBuf::from(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationScore {
    pub index: usize,
    pub path: PathBuf,
    pub score: std::result::Result<i64, ScoreIssue>,
}

/// Mean and median over the iterations that produced a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSummary {
    pub scored: usize,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// One entry per scanned iteration, in index order.
    pub iterations: Vec<IterationScore>,
    /// Winning `(index, score)`, if any iteration was scored.
    pub best: Option<(usize, i64)>,
}

impl Selection {
    /// Winning index, or 0 when nothing was scored (check [`Selection::best`]
    /// or [`Selection::winner`] to tell the two apart).
    pub fn best_index(&self) -> usize {
        self.best.map_or(0, |(index, _)| index)
    }

    /// The winner, or `NoValidScore` if no iteration produced a score.
    pub fn winner(&self) -> Result<(usize, i64)> {
        self.best.ok_or(PipelineError::NoValidScore { iterations: self.iterations.len() })
    }

    /// Iterations that contributed no score.
    pub fn unscored(&self) -> impl Iterator<Item = &IterationScore> {
        self.iterations.iter().filter(|it| it.score.is_err())
    }

    pub fn summary(&self) -> Option<ScoreSummary> {
        let mut scores: Vec<i64> = self.iterations.iter().filter_map(|it| it.score.clone().ok()).collect();
        if scores.is_empty() {
            return None;
        }
        scores.sort_unstable();

        let n = scores.len();
        let mean = scores.iter().map(|&s| s as f64).sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            scores[n / 2] as f64
        } else {
            (scores[n / 2 - 1] as f64 + scores[n / 2] as f64) / 2.0
        };
        Some(ScoreSummary { scored: n, mean, median })
    }
}

/// Keep the highest score; on ties the earliest iteration stays champion.
fn champion(iterations: &[IterationScore]) -> Option<(usize, i64)> {
    let mut best: Option<(usize, i64)> = None;
    for it in iterations {
        if let Ok(score) = it.score {
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((it.index, score));
            }
        }
    }
    best
}

/// Scan iterations `0..=max_iteration_index` and pick the best-scoring one.
pub fn select_best<P: AsRef<Path> + Sync>(prefix: P, max_iteration_index: usize) -> Selection {
    let iterations: Vec<IterationScore> = (0..=max_iteration_index)
        .into_par_iter()
        .map(|index| {
            let path = iteration_log_path(&prefix, index);
            let score = quartet_score(&path);
            IterationScore { index, path, score }
        })
        .collect();

    for it in &iterations {
        match &it.score {
            Ok(score) => tracing::debug!("Iteration {} scored {}", it.index, score),
            Err(issue) => tracing::warn!("Iteration {} has no score ({}): {}", it.index, it.path.display(), issue),
        }
    }

    let best = champion(&iterations);
    match best {
        Some((index, score)) => tracing::info!("Best iteration is {} with quartet score {}", index, score),
        None => tracing::warn!("No valid scores found in {} iteration logs", iterations.len()),
    }
    Selection { iterations, best }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_logs(dir: &Path, scores: &[Option<i64>]) -> PathBuf {
        let prefix = dir.join("run_");
        for (i, score) in scores.iter().enumerate() {
            if let Some(score) = score {
                let body = format!("starting\nweights computed\nFinal quartet score is: {score}\ndone\n");
                fs::write(iteration_log_path(&prefix, i), body).unwrap();
            }
        }
        prefix
    }

    #[test]
    fn test_parse_score_token_offset() {
        assert_eq!(parse_score_line("Final quartet score is: run1 flag2 flag3 flag4 57"), Some(Ok(57)));
    }

    #[test]
    fn test_parse_bare_score() {
        assert_eq!(parse_score_line("Final quartet score is: 182364"), Some(Ok(182364)));
        assert_eq!(parse_score_line("Final quartet score is: 182364\r"), Some(Ok(182364)));
    }

    #[test]
    fn test_parse_non_matching() {
        assert_eq!(parse_score_line("final quartet score is: 5"), None);
        assert_eq!(parse_score_line("Normalized score is: 0.9"), None);
        assert_eq!(parse_score_line("  Final quartet score is: 5"), None);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_score_line("Final quartet score is: a b c d e"),
            Some(Err(ScoreIssue::MalformedScoreLine { .. }))
        ));
        assert!(matches!(
            parse_score_line("Final quartet score is: "),
            Some(Err(ScoreIssue::MalformedScoreLine { .. }))
        ));
    }

    #[test]
    fn test_parse_trailing_tokens_use_offset() {
        assert_eq!(
            parse_score_line("Final quartet score is: 57 a b c d"),
            Some(Err(ScoreIssue::MalformedScoreLine { line: "Final quartet score is: 57 a b c d".to_string() }))
        );
        // Fewer than five tokens still fall back to the first one.
        assert_eq!(parse_score_line("Final quartet score is: 57 a b c"), Some(Ok(57)));
    }

    #[test]
    fn test_first_match_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs.0");
        fs::write(&path, "Final quartet score is: 10\nFinal quartet score is: 99\n").unwrap();
        assert_eq!(quartet_score(&path), Ok(10));
    }

    #[test]
    fn test_no_score_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs.0");
        fs::write(&path, "nothing to see\n").unwrap();
        assert_eq!(quartet_score(&path), Err(ScoreIssue::NoScoreLine));
        assert_eq!(quartet_score(dir.path().join("logs.1")), Err(ScoreIssue::MissingLog));
    }

    #[test]
    fn test_log_path() {
        assert_eq!(iteration_log_path("/tmp/out/", 3), PathBuf::from("/tmp/out/logs.3"));
        assert_eq!(iteration_log_path("/tmp/out/run_", 0), PathBuf::from("/tmp/out/run_logs.0"));
    }

    #[test]
    fn test_tie_break_earliest() {
        let dir = tempdir().unwrap();
        let prefix = write_logs(dir.path(), &[Some(10), Some(20), Some(20), Some(5)]);
        let selection = select_best(&prefix, 3);
        assert_eq!(selection.best, Some((1, 20)));
        assert_eq!(selection.best_index(), 1);
    }

    #[test]
    fn test_missing_iteration_skipped() {
        let dir = tempdir().unwrap();
        let prefix = write_logs(dir.path(), &[Some(3), Some(8), None, Some(30)]);
        let selection = select_best(&prefix, 3);
        assert_eq!(selection.best, Some((3, 30)));
        let unscored: Vec<usize> = selection.unscored().map(|it| it.index).collect();
        assert_eq!(unscored, vec![2]);
    }

    #[test]
    fn test_missing_best_candidate() {
        // Iteration 2 would have won had its log existed.
        let dir = tempdir().unwrap();
        let prefix = write_logs(dir.path(), &[Some(3), Some(8), None, Some(4)]);
        assert_eq!(select_best(&prefix, 3).best_index(), 1);
    }

    #[test]
    fn test_no_valid_scores() {
        let dir = tempdir().unwrap();
        let prefix = write_logs(dir.path(), &[None, None]);
        let selection = select_best(&prefix, 1);
        assert_eq!(selection.best, None);
        assert_eq!(selection.best_index(), 0);
        assert!(matches!(selection.winner(), Err(PipelineError::NoValidScore { iterations: 2 })));
        assert!(selection.summary().is_none());
    }

    #[test]
    fn test_zero_score_can_win() {
        let dir = tempdir().unwrap();
        let prefix = write_logs(dir.path(), &[None, Some(0)]);
        assert_eq!(select_best(&prefix, 1).best, Some((1, 0)));
    }

    #[test]
    fn test_summary() {
        let dir = tempdir().unwrap();
        let prefix = write_logs(dir.path(), &[Some(10), Some(20), Some(20), Some(5)]);
        let summary = select_best(&prefix, 3).summary().unwrap();
        assert_eq!(summary.scored, 4);
        assert_eq!(summary.mean, 13.75);
        assert_eq!(summary.median, 15.0);
    }
}
