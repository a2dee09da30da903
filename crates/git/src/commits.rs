//! Commit graph records parsed from `git log`.
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ts_rs::TS;

use crate::{GitHash, ParseError};

const FIELD_SEPARATOR: char = '\x1f';
const FIELD_COUNT: usize = 9;

/// `--format` for `git log -z`: unit-separated fields, raw body last.
pub(crate) const LOG_FORMAT: &str =
    "--format=%H%x1f%P%x1f%an%x1f%ae%x1f%at%x1f%cn%x1f%ce%x1f%ct%x1f%B";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct CommitUser {
    pub name: String,
    pub email: String,
    /// SHA-256 of the trimmed, lowercased email, for avatar lookup.
    pub email_hash: String,
    /// UTC.
    pub date: NaiveDateTime,
}

impl CommitUser {
    pub fn new(name: &str, email: &str, unix_seconds: i64) -> Option<Self> {
        let date = DateTime::from_timestamp(unix_seconds, 0)?.naive_utc();
        Some(Self {
            name: name.to_string(),
            email: email.to_string(),
            email_hash: email_hash(email),
            date,
        })
    }
}

pub fn email_hash(email: &str) -> String {
    format!("{:x}", Sha256::digest(email.trim().to_lowercase().as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Commit {
    pub hash: GitHash,
    /// First parent is the mainline.
    pub parent_hashes: Vec<GitHash>,
    pub message: String,
    pub description: Option<String>,
    pub author: CommitUser,
    pub committer: CommitUser,
}

/// Subject line and the trimmed remainder of a raw commit message.
pub fn split_message(raw: &str) -> (String, Option<String>) {
    let raw = raw.trim_end();
    let (subject, rest) = raw.split_once('\n').unwrap_or((raw, ""));
    let description = rest.trim();
    (
        subject.trim_end().to_string(),
        (!description.is_empty()).then(|| description.to_string()),
    )
}

/// Parse `git log -z` output produced with [`LOG_FORMAT`].
pub fn parse_log(output: &str) -> Result<Vec<Commit>, ParseError> {
    output
        .split('\0')
        .filter(|record| !record.trim().is_empty())
        .map(parse_commit)
        .collect()
}

fn parse_commit(record: &str) -> Result<Commit, ParseError> {
    let fields: Vec<&str> = record
        .trim_start_matches('\n')
        .splitn(FIELD_COUNT, FIELD_SEPARATOR)
        .collect();
    let [
        hash,
        parents,
        author_name,
        author_email,
        author_time,
        committer_name,
        committer_email,
        committer_time,
        body,
    ] = fields.as_slice()
    else {
        return Err(ParseError::new("log record", record));
    };

    let user = |name: &str, email: &str, time: &str| {
        time.parse::<i64>()
            .ok()
            .and_then(|secs| CommitUser::new(name, email, secs))
            .ok_or_else(|| ParseError::new("commit timestamp", time))
    };

    let parent_hashes = parents
        .split_whitespace()
        .map(GitHash::parse)
        .collect::<Result<Vec<_>, _>>()?;
    let (message, description) = split_message(body);

    Ok(Commit {
        hash: GitHash::parse(hash)?,
        parent_hashes,
        message,
        description,
        author: user(author_name, author_email, author_time)?,
        committer: user(committer_name, committer_email, committer_time)?,
    })
}
