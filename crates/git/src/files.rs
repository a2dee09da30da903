//! Changed-file records from `git diff-tree --raw -z` and `git status`.
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{GitHash, ParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    TypeChanged,
    Unmerged,
}

impl FileStatus {
    pub fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'A' => FileStatus::Added,
            'D' => FileStatus::Deleted,
            'M' => FileStatus::Modified,
            'R' => FileStatus::Renamed,
            'C' => FileStatus::Copied,
            'T' => FileStatus::TypeChanged,
            'U' => FileStatus::Unmerged,
            _ => return None,
        })
    }

    /// Renames and copies carry a source and a destination path.
    fn has_two_paths(self) -> bool {
        matches!(self, FileStatus::Renamed | FileStatus::Copied)
    }
}

/// One file changed between two trees (or between HEAD, index and worktree).
///
/// Added files have no source side and deleted files no destination side;
/// every other status has both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct File {
    pub src_path: Option<String>,
    pub dst_path: Option<String>,
    pub src_hash: Option<GitHash>,
    pub dst_hash: Option<GitHash>,
    pub status: FileStatus,
    /// Similarity percentage for renames and copies.
    pub score: Option<u8>,
}

impl File {
    pub fn new(
        status: FileStatus,
        src_path: Option<String>,
        dst_path: Option<String>,
        src_hash: Option<GitHash>,
        dst_hash: Option<GitHash>,
        score: Option<u8>,
    ) -> Result<Self, ParseError> {
        let src_path = (status != FileStatus::Added).then_some(src_path).flatten();
        let dst_path = (status != FileStatus::Deleted).then_some(dst_path).flatten();
        let valid = match status {
            FileStatus::Added => dst_path.is_some(),
            FileStatus::Deleted => src_path.is_some(),
            _ => src_path.is_some() && dst_path.is_some(),
        };
        if !valid {
            return Err(ParseError::new(
                "file paths",
                &format!("{status:?} {src_path:?} -> {dst_path:?}"),
            ));
        }
        Ok(Self {
            src_path,
            dst_path,
            src_hash: (status != FileStatus::Added).then_some(src_hash).flatten(),
            dst_hash: (status != FileStatus::Deleted).then_some(dst_hash).flatten(),
            status,
            score,
        })
    }

    /// The path this file is known by after the change.
    pub fn path(&self) -> &str {
        self.dst_path
            .as_deref()
            .or(self.src_path.as_deref())
            .unwrap_or_default()
    }

    pub fn matches_path(&self, path: &str) -> bool {
        self.dst_path.as_deref() == Some(path) || self.src_path.as_deref() == Some(path)
    }
}

/// Working-tree changes split by where they live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct ChangedFiles {
    /// HEAD against the index.
    pub staged: Vec<File>,
    /// Index against the working tree, untracked files included.
    pub unstaged: Vec<File>,
}

impl ChangedFiles {
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty()
    }
}

/// Parse `git diff-tree -r -z --abbrev=40` (raw format) output.
pub fn parse_raw_diff(output: &str) -> Result<Vec<File>, ParseError> {
    let mut tokens = output.split('\0').filter(|t| !t.is_empty());
    let mut files = Vec::new();

    while let Some(header) = tokens.next() {
        // diff-tree prints the commit id first when given a single commit.
        let Some(header) = header.trim_start_matches('\n').strip_prefix(':') else {
            if GitHash::parse(header.trim()).is_ok() {
                continue;
            }
            return Err(ParseError::new("raw diff header", header));
        };
        let fields: Vec<&str> = header.split(' ').collect();
        let [_src_mode, _dst_mode, src_hash, dst_hash, status] = fields.as_slice() else {
            return Err(ParseError::new("raw diff header", header));
        };

        let mut chars = status.chars();
        let status_kind = chars
            .next()
            .and_then(FileStatus::from_letter)
            .ok_or_else(|| ParseError::new("raw diff status", status))?;
        let score_text = chars.as_str();
        let score = if score_text.is_empty() {
            None
        } else {
            Some(
                score_text
                    .parse::<u8>()
                    .map_err(|_| ParseError::new("similarity score", status))?,
            )
        };

        let mut next_path = || {
            tokens
                .next()
                .map(str::to_string)
                .ok_or_else(|| ParseError::new("raw diff path", header))
        };
        let (src_path, dst_path) = if status_kind.has_two_paths() {
            let src = next_path()?;
            (Some(src), Some(next_path()?))
        } else {
            let path = next_path()?;
            (Some(path.clone()), Some(path))
        };

        files.push(File::new(
            status_kind,
            src_path,
            dst_path,
            GitHash::parse_optional(src_hash)?,
            GitHash::parse_optional(dst_hash)?,
            score,
        )?);
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const Z: &str = "0000000000000000000000000000000000000000";
    const H1: &str = "1111111111111111111111111111111111111111";
    const H2: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn root_commit_lists_every_file_as_added() {
        let out = format!(
            "{H2}\0:000000 100644 {Z} {H1} A\0README.md\0:000000 100644 {Z} {H2} A\0src/lib.rs\0"
        );
        let files = parse_raw_diff(&out).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.status == FileStatus::Added));
        assert_eq!(files[0].src_path, None);
        assert_eq!(files[0].src_hash, None);
        assert_eq!(files[0].dst_path.as_deref(), Some("README.md"));
        assert_eq!(files[1].path(), "src/lib.rs");
    }

    #[test]
    fn renames_carry_both_paths_and_score() {
        let out = format!(":100644 100644 {H1} {H2} R086\0a.txt\0b.txt\0");
        let files = parse_raw_diff(&out).unwrap();
        let file = &files[0];
        assert_eq!(file.status, FileStatus::Renamed);
        assert_eq!(file.src_path.as_deref(), Some("a.txt"));
        assert_eq!(file.dst_path.as_deref(), Some("b.txt"));
        assert_eq!(file.score, Some(86));
        assert!(file.matches_path("a.txt"));
        assert!(file.matches_path("b.txt"));
    }

    #[test]
    fn deletions_have_no_destination() {
        let out = format!(":100644 000000 {H1} {Z} D\0gone.txt\0");
        let file = &parse_raw_diff(&out).unwrap()[0];
        assert_eq!(file.dst_path, None);
        assert_eq!(file.dst_hash, None);
        assert_eq!(file.src_hash.as_ref().map(GitHash::as_str), Some(H1));
        assert_eq!(file.path(), "gone.txt");
    }

    #[test]
    fn paths_with_spaces_survive() {
        let out = format!(":100644 100644 {H1} {H2} M\0dir with space/f i le.txt\0");
        let file = &parse_raw_diff(&out).unwrap()[0];
        assert_eq!(file.path(), "dir with space/f i le.txt");
    }

    #[test]
    fn malformed_output_is_rejected() {
        assert!(parse_raw_diff(":100644 100644 abc def M\0x\0").is_err());
        assert!(parse_raw_diff(&format!(":100644 100644 {H1} {H2} X\0x\0")).is_err());
        assert!(parse_raw_diff(&format!(":100644 100644 {H1} {H2} R\0only-one\0")).is_err());
        assert!(parse_raw_diff("garbage\0").is_err());
    }

    #[test]
    fn file_invariants_are_enforced() {
        assert!(File::new(FileStatus::Modified, None, Some("x".into()), None, None, None).is_err());
        let added = File::new(
            FileStatus::Added,
            Some("ignored".into()),
            Some("x".into()),
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(added.src_path, None);
    }
}
