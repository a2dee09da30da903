//! Line and word level text diffs.
//!
//! Lines are aligned with Myers' algorithm (a shortest edit script, i.e. a
//! longest common subsequence of lines), grouped into hunks with a fixed amount
//! of context. Inside each replaced region removed and added lines are paired
//! in order and diffed again at token granularity.

use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, DiffOp, DiffTag, capture_diff_slices};
use ts_rs::TS;

/// Number of leading bytes inspected by [`is_binary`], the same window git uses.
pub const BINARY_SNIFF_BYTES: usize = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
pub enum DiffStatus {
    Unmodified,
    Added,
    Removed,
}

impl From<ChangeTag> for DiffStatus {
    fn from(tag: ChangeTag) -> Self {
        match tag {
            ChangeTag::Equal => DiffStatus::Unmodified,
            ChangeTag::Insert => DiffStatus::Added,
            ChangeTag::Delete => DiffStatus::Removed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct WordDiff {
    pub text: String,
    pub status: DiffStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct LineDiff {
    pub status: DiffStatus,
    pub src_line_number: Option<usize>,
    pub dst_line_number: Option<usize>,
    /// Concatenated, these reproduce the line without its newline.
    pub words: Vec<WordDiff>,
}

impl LineDiff {
    pub fn text(&self) -> String {
        self.words.iter().map(|w| w.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Hunk {
    /// Unified diff header, e.g. `@@ -3,7 +3,8 @@`.
    pub header: String,
    pub src_line: usize,
    pub src_count: usize,
    pub dst_line: usize,
    pub dst_count: usize,
    pub lines: Vec<LineDiff>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(transparent)]
pub struct FileDiff(pub Vec<Hunk>);

impl FileDiff {
    pub fn hunks(&self) -> &[Hunk] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub context_lines: usize,
    /// Lines longer than this are never word-diffed.
    pub word_diff_max_line_bytes: usize,
    /// Replaced regions with more line pairs than this are never word-diffed.
    pub word_diff_max_pairs: usize,
    /// Files with more lines than this (both sides together) are aligned
    /// only by their common prefix and suffix.
    pub line_diff_max_lines: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: 3,
            word_diff_max_line_bytes: 1000,
            word_diff_max_pairs: 200,
            line_diff_max_lines: 20_000,
        }
    }
}

/// Git's heuristic: content with a NUL byte near the start is binary.
pub fn is_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_SNIFF_BYTES).any(|b| *b == 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Line<'a> {
    text: &'a str,
    newline: bool,
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        match rest.find('\n') {
            Some(idx) => {
                lines.push(Line {
                    text: &rest[..idx],
                    newline: true,
                });
                rest = &rest[idx + 1..];
            }
            None => {
                lines.push(Line {
                    text: rest,
                    newline: false,
                });
                break;
            }
        }
    }
    lines
}

/// Compute the hunked diff of two texts. Identical inputs produce no hunks.
pub fn diff_text(old: &str, new: &str, options: &DiffOptions) -> FileDiff {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let ops = if old_lines.len() + new_lines.len() > options.line_diff_max_lines {
        coarse_ops(&old_lines, &new_lines)
    } else {
        capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines)
    };

    let hunks = similar::group_diff_ops(ops, options.context_lines)
        .iter()
        .filter_map(|group| build_hunk(group, &old_lines, &new_lines, options))
        .collect();
    FileDiff(hunks)
}

/// Common prefix and suffix kept, everything between them replaced.
fn coarse_ops(old: &[Line<'_>], new: &[Line<'_>]) -> Vec<DiffOp> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_len = old.len() - prefix - suffix;
    let new_len = new.len() - prefix - suffix;

    let mut ops = Vec::with_capacity(3);
    if prefix > 0 {
        ops.push(DiffOp::Equal {
            old_index: 0,
            new_index: 0,
            len: prefix,
        });
    }
    match (old_len, new_len) {
        (0, 0) => {}
        (old_len, 0) => ops.push(DiffOp::Delete {
            old_index: prefix,
            old_len,
            new_index: prefix,
        }),
        (0, new_len) => ops.push(DiffOp::Insert {
            old_index: prefix,
            new_index: prefix,
            new_len,
        }),
        (old_len, new_len) => ops.push(DiffOp::Replace {
            old_index: prefix,
            old_len,
            new_index: prefix,
            new_len,
        }),
    }
    if suffix > 0 {
        ops.push(DiffOp::Equal {
            old_index: prefix + old_len,
            new_index: prefix + new_len,
            len: suffix,
        });
    }
    ops
}

fn format_range(start: usize, count: usize) -> String {
    if count == 1 {
        start.to_string()
    } else {
        format!("{start},{count}")
    }
}

fn build_hunk(
    group: &[DiffOp],
    old: &[Line<'_>],
    new: &[Line<'_>],
    options: &DiffOptions,
) -> Option<Hunk> {
    let (first, last) = (group.first()?, group.last()?);
    let (old_start, new_start) = (first.old_range().start, first.new_range().start);
    let src_count = last.old_range().end - old_start;
    let dst_count = last.new_range().end - new_start;
    // An empty side points at the line before the change, as in unified diffs.
    let src_line = if src_count == 0 { old_start } else { old_start + 1 };
    let dst_line = if dst_count == 0 { new_start } else { new_start + 1 };

    let mut lines = Vec::new();
    for op in group {
        match *op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => {
                for i in 0..len {
                    lines.push(LineDiff {
                        status: DiffStatus::Unmodified,
                        src_line_number: Some(old_index + i + 1),
                        dst_line_number: Some(new_index + i + 1),
                        words: whole_line(old[old_index + i].text, DiffStatus::Unmodified),
                    });
                }
            }
            DiffOp::Delete {
                old_index, old_len, ..
            } => {
                for i in old_index..old_index + old_len {
                    lines.push(removed_line(i, whole_line(old[i].text, DiffStatus::Removed)));
                }
            }
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                for i in new_index..new_index + new_len {
                    lines.push(added_line(i, whole_line(new[i].text, DiffStatus::Added)));
                }
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => push_replaced(
                &mut lines,
                (old_index, &old[old_index..old_index + old_len]),
                (new_index, &new[new_index..new_index + new_len]),
                options,
            ),
        }
    }

    Some(Hunk {
        header: format!(
            "@@ -{} +{} @@",
            format_range(src_line, src_count),
            format_range(dst_line, dst_count)
        ),
        src_line,
        src_count,
        dst_line,
        dst_count,
        lines,
    })
}

fn removed_line(index: usize, words: Vec<WordDiff>) -> LineDiff {
    LineDiff {
        status: DiffStatus::Removed,
        src_line_number: Some(index + 1),
        dst_line_number: None,
        words,
    }
}

fn added_line(index: usize, words: Vec<WordDiff>) -> LineDiff {
    LineDiff {
        status: DiffStatus::Added,
        src_line_number: None,
        dst_line_number: Some(index + 1),
        words,
    }
}

/// Removed lines first, then added lines; the i-th removed and i-th added
/// line form a pair for word highlighting.
fn push_replaced(
    lines: &mut Vec<LineDiff>,
    (old_index, removed): (usize, &[Line<'_>]),
    (new_index, added): (usize, &[Line<'_>]),
    options: &DiffOptions,
) {
    let mut removed_words: Vec<Vec<WordDiff>> = removed
        .iter()
        .map(|l| whole_line(l.text, DiffStatus::Removed))
        .collect();
    let mut added_words: Vec<Vec<WordDiff>> = added
        .iter()
        .map(|l| whole_line(l.text, DiffStatus::Added))
        .collect();

    let pairs = removed.len().min(added.len());
    if pairs <= options.word_diff_max_pairs {
        for i in 0..pairs {
            let (old_text, new_text) = (removed[i].text, added[i].text);
            if old_text.len() > options.word_diff_max_line_bytes
                || new_text.len() > options.word_diff_max_line_bytes
            {
                continue;
            }
            let (old_words, new_words) = diff_words(old_text, new_text);
            removed_words[i] = old_words;
            added_words[i] = new_words;
        }
    }

    for (i, words) in removed_words.into_iter().enumerate() {
        lines.push(removed_line(old_index + i, words));
    }
    for (i, words) in added_words.into_iter().enumerate() {
        lines.push(added_line(new_index + i, words));
    }
}

fn whole_line(text: &str, status: DiffStatus) -> Vec<WordDiff> {
    let mut words = Vec::new();
    push_word(&mut words, text, status);
    words
}

fn push_word(words: &mut Vec<WordDiff>, text: &str, status: DiffStatus) {
    if text.is_empty() {
        return;
    }
    match words.last_mut() {
        Some(last) if last.status == status => last.text.push_str(text),
        _ => words.push(WordDiff {
            text: text.to_string(),
            status,
        }),
    }
}

/// Token-level diff of a line pair: the words of the old line (Unmodified or
/// Removed) and of the new line (Unmodified or Added).
pub fn diff_words(old: &str, new: &str) -> (Vec<WordDiff>, Vec<WordDiff>) {
    let old_tokens = tokenize_words(old);
    let new_tokens = tokenize_words(new);
    let mut old_words = Vec::new();
    let mut new_words = Vec::new();

    for op in capture_diff_slices(Algorithm::Myers, &old_tokens, &new_tokens) {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        let (old_status, new_status) = match tag {
            DiffTag::Equal => (DiffStatus::Unmodified, DiffStatus::Unmodified),
            DiffTag::Delete | DiffTag::Insert | DiffTag::Replace => {
                (DiffStatus::Removed, DiffStatus::Added)
            }
        };
        for token in &old_tokens[old_range] {
            push_word(&mut old_words, token, old_status);
        }
        for token in &new_tokens[new_range] {
            push_word(&mut new_words, token, new_status);
        }
    }

    (old_words, new_words)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenClass {
    Word,
    Space,
    Punct,
}

fn token_class(c: char) -> TokenClass {
    if c.is_alphanumeric() || c == '_' {
        TokenClass::Word
    } else if c.is_whitespace() {
        TokenClass::Space
    } else {
        TokenClass::Punct
    }
}

/// Split a line into runs of word characters, runs of whitespace, and single
/// punctuation characters.
pub fn tokenize_words(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut current: Option<TokenClass> = None;

    for (idx, c) in line.char_indices() {
        let class = token_class(c);
        match current {
            Some(prev) if prev == class && class != TokenClass::Punct => {}
            Some(_) => {
                tokens.push(&line[start..idx]);
                start = idx;
            }
            None => {}
        }
        current = Some(class);
    }
    if start < line.len() {
        tokens.push(&line[start..]);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side_text(diff: &FileDiff, keep: DiffStatus) -> Vec<String> {
        diff.hunks()
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| l.status == DiffStatus::Unmodified || l.status == keep)
            .map(LineDiff::text)
            .collect()
    }

    #[test]
    fn tokenizer_splits_on_class_transitions() {
        assert_eq!(
            tokenize_words("let x_1 = foo(a,  b);"),
            vec![
                "let", " ", "x_1", " ", "=", " ", "foo", "(", "a", ",", "  ", "b", ")", ";"
            ]
        );
        assert_eq!(tokenize_words(""), Vec::<&str>::new());
        assert_eq!(tokenize_words("::"), vec![":", ":"]);
        assert_eq!(tokenize_words("héllo wörld"), vec!["héllo", " ", "wörld"]);
    }

    #[test]
    fn identical_texts_have_no_hunks() {
        let text = "a\nb\nc\n";
        assert!(diff_text(text, text, &DiffOptions::default()).is_empty());
    }

    #[test]
    fn single_change_produces_git_style_hunk() {
        let old = "one\ntwo\nthree\nfour\nfive\nsix\nseven\neight\n";
        let new = "one\ntwo\nthree\nfour\nFIVE\nsix\nseven\neight\n";
        let diff = diff_text(old, new, &DiffOptions::default());
        assert_eq!(diff.hunks().len(), 1);
        let hunk = &diff.hunks()[0];
        assert_eq!(hunk.header, "@@ -2,7 +2,7 @@");
        assert_eq!((hunk.src_line, hunk.src_count), (2, 7));

        let statuses: Vec<DiffStatus> = hunk.lines.iter().map(|l| l.status).collect();
        assert_eq!(
            statuses,
            vec![
                DiffStatus::Unmodified,
                DiffStatus::Unmodified,
                DiffStatus::Unmodified,
                DiffStatus::Removed,
                DiffStatus::Added,
                DiffStatus::Unmodified,
                DiffStatus::Unmodified,
                DiffStatus::Unmodified,
            ]
        );
        let removed = &hunk.lines[3];
        assert_eq!(removed.src_line_number, Some(5));
        assert_eq!(removed.dst_line_number, None);
        let added = &hunk.lines[4];
        assert_eq!(added.dst_line_number, Some(5));
    }

    #[test]
    fn words_reconstruct_both_sides() {
        let old = "fn main() {\n    let total = a + b;\n    println!(\"{total}\");\n}\n";
        let new = "fn main() {\n    let sum = a + b + c;\n    println!(\"{sum}\");\n}\n// end\n";
        let diff = diff_text(old, new, &DiffOptions::default());

        let old_lines: Vec<String> = old.lines().map(str::to_string).collect();
        let new_lines: Vec<String> = new.lines().map(str::to_string).collect();
        assert_eq!(side_text(&diff, DiffStatus::Removed), old_lines);
        assert_eq!(side_text(&diff, DiffStatus::Added), new_lines);
    }

    #[test]
    fn paired_lines_highlight_changed_words() {
        let diff = diff_text("let total = 1;\n", "let sum = 1;\n", &DiffOptions::default());
        let lines = &diff.hunks()[0].lines;
        assert_eq!(
            lines[0].words,
            vec![
                WordDiff {
                    text: "let ".into(),
                    status: DiffStatus::Unmodified
                },
                WordDiff {
                    text: "total".into(),
                    status: DiffStatus::Removed
                },
                WordDiff {
                    text: " = 1;".into(),
                    status: DiffStatus::Unmodified
                },
            ]
        );
        assert_eq!(lines[1].words[1].text, "sum");
        assert_eq!(lines[1].words[1].status, DiffStatus::Added);
    }

    #[test]
    fn long_lines_fall_back_to_whole_line_words() {
        let options = DiffOptions {
            word_diff_max_line_bytes: 16,
            ..DiffOptions::default()
        };
        let old = format!("{}\n", "x ".repeat(20));
        let new = format!("{}y\n", "x ".repeat(20));
        let diff = diff_text(&old, &new, &options);
        let lines = &diff.hunks()[0].lines;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].words.len(), 1);
        assert_eq!(lines[0].words[0].status, DiffStatus::Removed);
        assert_eq!(lines[1].words.len(), 1);
        assert_eq!(lines[1].words[0].status, DiffStatus::Added);
    }

    #[test]
    fn too_many_pairs_skip_word_diff() {
        let options = DiffOptions {
            word_diff_max_pairs: 1,
            ..DiffOptions::default()
        };
        let diff = diff_text("a b\nc d\n", "a x\nc y\n", &options);
        assert!(
            diff.hunks()[0]
                .lines
                .iter()
                .all(|l| l.words.len() == 1 && l.words[0].status == l.status)
        );
    }

    #[test]
    fn added_file_is_single_hunk_of_additions() {
        let diff = diff_text("", "a\nb\n", &DiffOptions::default());
        let hunk = &diff.hunks()[0];
        assert_eq!(hunk.header, "@@ -0,0 +1,2 @@");
        assert!(hunk.lines.iter().all(|l| l.status == DiffStatus::Added));
    }

    #[test]
    fn missing_trailing_newline_is_a_change() {
        let diff = diff_text("a\nb\n", "a\nb", &DiffOptions::default());
        assert_eq!(diff.hunks().len(), 1);
        let texts: Vec<String> = diff.hunks()[0].lines.iter().map(LineDiff::text).collect();
        assert_eq!(texts, vec!["a", "b", "b"]);
    }

    #[test]
    fn diff_is_deterministic() {
        let old = "alpha beta\ngamma\n".repeat(50);
        let new = "alpha BETA\ngamma\n".repeat(50);
        let options = DiffOptions::default();
        let first = serde_json::to_string(&diff_text(&old, &new, &options)).unwrap();
        let second = serde_json::to_string(&diff_text(&old, &new, &options)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn oversized_files_keep_only_prefix_and_suffix() {
        let old = "head\na\nmid\nb\ntail\n";
        let new = "head\nA\nmid\nB\ntail\n";
        let unmodified = |diff: &FileDiff| {
            diff.hunks()
                .iter()
                .flat_map(|h| h.lines.iter())
                .filter(|l| l.status == DiffStatus::Unmodified)
                .count()
        };

        let full = diff_text(old, new, &DiffOptions::default());
        assert_eq!(unmodified(&full), 3);

        let options = DiffOptions {
            line_diff_max_lines: 4,
            ..DiffOptions::default()
        };
        let coarse = diff_text(old, new, &options);
        assert_eq!(unmodified(&coarse), 2);
        assert_eq!(coarse.hunks().len(), 1);
        assert_eq!(coarse.hunks()[0].header, "@@ -1,5 +1,5 @@");
        assert_eq!(side_text(&coarse, DiffStatus::Removed), ["head", "a", "mid", "b", "tail"]);
        assert_eq!(side_text(&coarse, DiffStatus::Added), ["head", "A", "mid", "B", "tail"]);
        assert_eq!(coarse, diff_text(old, new, &options));

        assert!(diff_text(old, old, &options).is_empty());
    }

    #[test]
    fn binary_sniffing_uses_leading_window() {
        assert!(is_binary(b"abc\0def"));
        assert!(!is_binary(b"plain text\n"));
        let mut late_nul = vec![b'a'; BINARY_SNIFF_BYTES];
        late_nul.push(0);
        assert!(!is_binary(&late_nul));
    }
}
