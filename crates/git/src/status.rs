//! `git status --porcelain=v2 -z` parsing.
use crate::{
    GitHash, ParseError,
    files::{ChangedFiles, File, FileStatus},
};

/// Parse porcelain v2 entries into staged and unstaged changes. Ignored
/// entries and `#` headers are skipped.
pub fn parse_porcelain_v2(output: &str) -> Result<ChangedFiles, ParseError> {
    let mut changes = ChangedFiles::default();
    let mut entries = output.split('\0').filter(|e| !e.is_empty());

    while let Some(entry) = entries.next() {
        let (kind, rest) = entry.split_once(' ').unwrap_or((entry, ""));
        match kind {
            "#" | "!" => {}
            "?" => changes.unstaged.push(File::new(
                FileStatus::Added,
                None,
                Some(non_empty_path(rest, entry)?),
                None,
                None,
                None,
            )?),
            "1" => {
                let fields: Vec<&str> = rest.splitn(8, ' ').collect();
                let [xy, _sub, _m_head, _m_index, _m_work, h_head, h_index, path] =
                    fields.as_slice()
                else {
                    return Err(ParseError::new("ordinary status entry", entry));
                };
                let (x, y) = status_pair(xy, entry)?;
                let path = non_empty_path(path, entry)?;
                push_pair(&mut changes, x, y, &path, &path, h_head, h_index, None)?;
            }
            "2" => {
                let fields: Vec<&str> = rest.splitn(9, ' ').collect();
                let [xy, _sub, _m_head, _m_index, _m_work, h_head, h_index, score, path] =
                    fields.as_slice()
                else {
                    return Err(ParseError::new("rename status entry", entry));
                };
                let (x, y) = status_pair(xy, entry)?;
                let path = non_empty_path(path, entry)?;
                let orig = entries
                    .next()
                    .ok_or_else(|| ParseError::new("rename source path", entry))?;
                let score = score
                    .get(1..)
                    .and_then(|s| s.parse::<u8>().ok())
                    .ok_or_else(|| ParseError::new("rename score", entry))?;
                push_pair(&mut changes, x, y, orig, &path, h_head, h_index, Some(score))?;
            }
            "u" => {
                let fields: Vec<&str> = rest.splitn(10, ' ').collect();
                let [_xy, _sub, _m1, _m2, _m3, _m_work, _h1, _h2, _h3, path] = fields.as_slice()
                else {
                    return Err(ParseError::new("unmerged status entry", entry));
                };
                let path = non_empty_path(path, entry)?;
                changes.unstaged.push(File::new(
                    FileStatus::Unmerged,
                    Some(path.clone()),
                    Some(path),
                    None,
                    None,
                    None,
                )?);
            }
            _ => return Err(ParseError::new("status entry", entry)),
        }
    }

    Ok(changes)
}

fn non_empty_path(path: &str, entry: &str) -> Result<String, ParseError> {
    if path.is_empty() {
        Err(ParseError::new("status path", entry))
    } else {
        Ok(path.to_string())
    }
}

/// `.` means unchanged on that side.
fn status_pair(xy: &str, entry: &str) -> Result<(Option<FileStatus>, Option<FileStatus>), ParseError> {
    let side = |c: char| match c {
        '.' => Ok(None),
        c => FileStatus::from_letter(c)
            .map(Some)
            .ok_or_else(|| ParseError::new("status code", entry)),
    };
    let mut chars = xy.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(x), Some(y), None) => Ok((side(x)?, side(y)?)),
        _ => Err(ParseError::new("status code", entry)),
    }
}

#[allow(clippy::too_many_arguments)]
fn push_pair(
    changes: &mut ChangedFiles,
    x: Option<FileStatus>,
    y: Option<FileStatus>,
    orig_path: &str,
    path: &str,
    h_head: &str,
    h_index: &str,
    score: Option<u8>,
) -> Result<(), ParseError> {
    let head = GitHash::parse_optional(h_head)?;
    let index = GitHash::parse_optional(h_index)?;
    let score_for = |status: FileStatus| {
        matches!(status, FileStatus::Renamed | FileStatus::Copied)
            .then_some(score)
            .flatten()
    };
    let src_for = |status: FileStatus| match status {
        FileStatus::Renamed | FileStatus::Copied => orig_path.to_string(),
        _ => path.to_string(),
    };

    if let Some(status) = x {
        changes.staged.push(File::new(
            status,
            Some(src_for(status)),
            Some(path.to_string()),
            head,
            index.clone(),
            score_for(status),
        )?);
    }
    if let Some(status) = y {
        // The working-tree side is not hashed by status.
        let src_path = if x.is_some() { path.to_string() } else { src_for(status) };
        changes.unstaged.push(File::new(
            status,
            Some(src_path),
            Some(path.to_string()),
            index,
            None,
            score_for(status),
        )?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const Z: &str = "0000000000000000000000000000000000000000";
    const H1: &str = "1111111111111111111111111111111111111111";
    const H2: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn splits_staged_and_unstaged_sides() {
        let out = format!(
            "# branch.oid {H1}\0\
             1 M. N... 100644 100644 100644 {H1} {H2} staged.txt\0\
             1 .M N... 100644 100644 100644 {H1} {H1} dirty file.txt\0\
             1 AM N... 000000 100644 100644 {Z} {H2} new.txt\0\
             ? untracked.txt\0\
             ! target/\0"
        );
        let changes = parse_porcelain_v2(&out).unwrap();

        let staged: Vec<(&str, FileStatus)> =
            changes.staged.iter().map(|f| (f.path(), f.status)).collect();
        assert_eq!(
            staged,
            vec![
                ("staged.txt", FileStatus::Modified),
                ("new.txt", FileStatus::Added)
            ]
        );
        let unstaged: Vec<(&str, FileStatus)> = changes
            .unstaged
            .iter()
            .map(|f| (f.path(), f.status))
            .collect();
        assert_eq!(
            unstaged,
            vec![
                ("dirty file.txt", FileStatus::Modified),
                ("new.txt", FileStatus::Modified),
                ("untracked.txt", FileStatus::Added),
            ]
        );
        assert_eq!(changes.staged[0].src_hash.as_ref().map(GitHash::as_str), Some(H1));
        assert_eq!(changes.staged[0].dst_hash.as_ref().map(GitHash::as_str), Some(H2));
        assert_eq!(changes.unstaged[0].dst_hash, None);
        assert_eq!(changes.staged[1].src_hash, None);
    }

    #[test]
    fn staged_rename_reads_original_path() {
        let out = format!("2 R. N... 100644 100644 100644 {H1} {H1} R100 new name.txt\0old.txt\0");
        let changes = parse_porcelain_v2(&out).unwrap();
        let file = &changes.staged[0];
        assert_eq!(file.status, FileStatus::Renamed);
        assert_eq!(file.src_path.as_deref(), Some("old.txt"));
        assert_eq!(file.dst_path.as_deref(), Some("new name.txt"));
        assert_eq!(file.score, Some(100));
        assert!(changes.unstaged.is_empty());
    }

    #[test]
    fn conflicts_are_unstaged_unmerged() {
        let out = format!(
            "u UU N... 100644 100644 100644 100644 {H1} {H2} {H1} conflict.txt\0"
        );
        let changes = parse_porcelain_v2(&out).unwrap();
        assert!(changes.staged.is_empty());
        assert_eq!(changes.unstaged[0].status, FileStatus::Unmerged);
        assert_eq!(changes.unstaged[0].path(), "conflict.txt");
    }

    #[test]
    fn clean_tree_is_empty() {
        let changes = parse_porcelain_v2(&format!("# branch.oid {H1}\0# branch.head main\0")).unwrap();
        assert!(changes.is_empty());
        assert!(parse_porcelain_v2("").unwrap().is_empty());
    }

    #[test]
    fn unknown_entries_fail() {
        assert!(parse_porcelain_v2("x what\0").is_err());
        assert!(parse_porcelain_v2("1 M. N...\0").is_err());
        assert!(parse_porcelain_v2(&format!("2 R. N... 100644 100644 100644 {H1} {H1} R100 a\0")).is_err());
    }
}
