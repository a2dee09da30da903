//! Local and remote branch listings with upstream tracking state.
use std::collections::{BTreeMap, btree_map::Entry};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::{GitHash, ParseError};

pub(crate) const LOCAL_BRANCH_FIELDS: [&str; 5] = [
    "HEAD",
    "refname",
    "upstream",
    "upstream:track,nobracket",
    "objectname",
];
pub(crate) const REMOTE_BRANCH_FIELDS: [&str; 3] = ["refname", "symref", "objectname"];

/// Divergence of a branch from its configured upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub enum UpstreamTrack {
    InSync,
    /// The upstream is configured but its remote-tracking ref does not exist.
    Gone,
    Delta { ahead: u32, behind: u32 },
}

impl UpstreamTrack {
    /// `delta(0, 0)` is `InSync`; a zero delta is never constructed.
    pub fn delta(ahead: u32, behind: u32) -> Self {
        if ahead == 0 && behind == 0 {
            UpstreamTrack::InSync
        } else {
            UpstreamTrack::Delta { ahead, behind }
        }
    }

    /// Parse `%(upstream:track,nobracket)`.
    pub fn parse(track: &str) -> Result<Self, ParseError> {
        match track.trim() {
            "" => Ok(UpstreamTrack::InSync),
            "gone" => Ok(UpstreamTrack::Gone),
            counts => {
                let mut ahead = None;
                let mut behind = None;
                for part in counts.split(", ") {
                    let (key, value) = part
                        .split_once(' ')
                        .ok_or_else(|| ParseError::new("upstream track", track))?;
                    let value: u32 = value
                        .parse()
                        .map_err(|_| ParseError::new("upstream track", track))?;
                    let slot = match key {
                        "ahead" => &mut ahead,
                        "behind" => &mut behind,
                        _ => return Err(ParseError::new("upstream track", track)),
                    };
                    if slot.replace(value).is_some() {
                        return Err(ParseError::new("upstream track", track));
                    }
                }
                Ok(Self::delta(ahead.unwrap_or(0), behind.unwrap_or(0)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct LocalBranch {
    pub name: Vec<String>,
    pub head: bool,
    /// `None` when the branch has no upstream configured.
    pub upstream_name: Option<Vec<String>>,
    pub upstream_track: Option<UpstreamTrack>,
    pub hash: GitHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct RemoteBranch {
    /// The remote name is the first segment.
    pub name: Vec<String>,
    pub hash: GitHash,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Branches {
    pub local: Vec<LocalBranch>,
    pub remote: Vec<RemoteBranch>,
}

impl Branches {
    pub fn local_tree(&self) -> Result<BranchTree<&LocalBranch>, PathCollision> {
        BranchTree::build(self.local.iter().map(|b| (b.name.as_slice(), b)))
    }

    /// Remote branches, one top-level folder per remote.
    pub fn remote_tree(&self) -> Result<BranchTree<&RemoteBranch>, PathCollision> {
        BranchTree::build(self.remote.iter().map(|b| (b.name.as_slice(), b)))
    }
}

fn segments(name: &str) -> Vec<String> {
    name.split('/').map(str::to_string).collect()
}

fn strip_ref<'a>(refname: &'a str, prefix: &str) -> Result<&'a str, ParseError> {
    refname
        .strip_prefix(prefix)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| ParseError::new("ref name", refname))
}

fn upstream_segments(upstream: &str) -> Vec<String> {
    let short = upstream
        .strip_prefix("refs/remotes/")
        .or_else(|| upstream.strip_prefix("refs/heads/"))
        .or_else(|| upstream.strip_prefix("refs/"))
        .unwrap_or(upstream);
    segments(short)
}

/// Parse `for-each-ref refs/heads` output formatted with [`LOCAL_BRANCH_FIELDS`].
pub fn parse_local_branches(output: &str) -> Result<Vec<LocalBranch>, ParseError> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(parse_local_branch)
        .collect()
}

fn parse_local_branch(line: &str) -> Result<LocalBranch, ParseError> {
    let fields: Vec<&str> = line.split('\0').collect();
    let [head, refname, upstream, track, hash] = fields.as_slice() else {
        return Err(ParseError::new("local branch", line));
    };
    let head = match *head {
        "*" => true,
        " " | "" => false,
        _ => return Err(ParseError::new("HEAD marker", line)),
    };
    let name = segments(strip_ref(refname, "refs/heads/")?);

    // `%(upstream)` is empty exactly when branch.<name>.merge is unset.
    let (upstream_name, upstream_track) = if upstream.is_empty() {
        (None, None)
    } else {
        (
            Some(upstream_segments(upstream)),
            Some(UpstreamTrack::parse(track)?),
        )
    };

    Ok(LocalBranch {
        name,
        head,
        upstream_name,
        upstream_track,
        hash: GitHash::parse(hash)?,
    })
}

/// Parse `for-each-ref refs/remotes` output formatted with
/// [`REMOTE_BRANCH_FIELDS`], dropping symbolic refs such as `origin/HEAD`.
pub fn parse_remote_branches(output: &str) -> Result<Vec<RemoteBranch>, ParseError> {
    let mut branches = Vec::new();
    for line in output.lines().filter(|line| !line.is_empty()) {
        let fields: Vec<&str> = line.split('\0').collect();
        let [refname, symref, hash] = fields.as_slice() else {
            return Err(ParseError::new("remote branch", line));
        };
        if !symref.is_empty() {
            continue;
        }
        let name = segments(strip_ref(refname, "refs/remotes/")?);
        if name.len() < 2 {
            return Err(ParseError::new("remote branch name", refname));
        }
        branches.push(RemoteBranch {
            name,
            hash: GitHash::parse(hash)?,
        });
    }
    Ok(branches)
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("branch path collision at `{0}`")]
pub struct PathCollision(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BranchNode<T> {
    Leaf(T),
    Folder(BranchTree<T>),
}

/// Branches grouped into folders by shared name prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchTree<T> {
    pub children: BTreeMap<String, BranchNode<T>>,
}

impl<T> Default for BranchTree<T> {
    fn default() -> Self {
        Self {
            children: BTreeMap::new(),
        }
    }
}

impl<T> BranchTree<T> {
    pub fn build<'a, I>(items: I) -> Result<Self, PathCollision>
    where
        I: IntoIterator<Item = (&'a [String], T)>,
    {
        let mut tree = Self::default();
        for (path, value) in items {
            tree.insert(path, value)?;
        }
        Ok(tree)
    }

    /// Insert a leaf. Fails if the path, or one of its prefixes, is already a leaf
    /// or if the path is already a folder.
    pub fn insert(&mut self, path: &[String], value: T) -> Result<(), PathCollision> {
        self.insert_at(path, value)
            .map_err(|()| PathCollision(path.join("/")))
    }

    fn insert_at(&mut self, path: &[String], value: T) -> Result<(), ()> {
        let Some((first, rest)) = path.split_first() else {
            return Err(());
        };
        if rest.is_empty() {
            return match self.children.entry(first.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(BranchNode::Leaf(value));
                    Ok(())
                }
                Entry::Occupied(_) => Err(()),
            };
        }
        match self
            .children
            .entry(first.clone())
            .or_insert_with(|| BranchNode::Folder(BranchTree::default()))
        {
            BranchNode::Folder(tree) => tree.insert_at(rest, value),
            BranchNode::Leaf(_) => Err(()),
        }
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.children
            .values()
            .map(|node| match node {
                BranchNode::Leaf(_) => 1,
                BranchNode::Folder(tree) => tree.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Every leaf with its full path, in name order.
    pub fn leaves(&self) -> Vec<(Vec<String>, &T)> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, &'a T)>) {
        for (name, node) in &self.children {
            prefix.push(name.clone());
            match node {
                BranchNode::Leaf(value) => out.push((prefix.clone(), value)),
                BranchNode::Folder(tree) => tree.collect_leaves(prefix, out),
            }
            prefix.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H1: &str = "1111111111111111111111111111111111111111";
    const H2: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn track_states_parse_strictly() {
        assert_eq!(UpstreamTrack::parse("").unwrap(), UpstreamTrack::InSync);
        assert_eq!(UpstreamTrack::parse("gone").unwrap(), UpstreamTrack::Gone);
        assert_eq!(
            UpstreamTrack::parse("ahead 2, behind 1").unwrap(),
            UpstreamTrack::Delta {
                ahead: 2,
                behind: 1
            }
        );
        assert_eq!(
            UpstreamTrack::parse("behind 4").unwrap(),
            UpstreamTrack::Delta {
                ahead: 0,
                behind: 4
            }
        );
        for bad in ["ahead", "ahead x", "sideways 3", "ahead 1, ahead 2", "ahead -1"] {
            assert!(UpstreamTrack::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn zero_delta_normalizes_to_in_sync() {
        assert_eq!(UpstreamTrack::delta(0, 0), UpstreamTrack::InSync);
        assert_eq!(
            UpstreamTrack::parse("ahead 0, behind 0").unwrap(),
            UpstreamTrack::InSync
        );
    }

    #[test]
    fn local_branches_distinguish_missing_and_gone_upstreams() {
        let output = format!(
            "*\0refs/heads/main\0refs/remotes/origin/main\0\0{H1}\n \
             \0refs/heads/feature/x\0refs/remotes/origin/feature/x\0ahead 2, behind 1\0{H2}\n \
             \0refs/heads/old\0refs/remotes/origin/old\0gone\0{H2}\n \
             \0refs/heads/scratch\0\0\0{H1}\n"
        );
        let branches = parse_local_branches(&output).unwrap();
        assert_eq!(branches.len(), 4);

        assert!(branches[0].head);
        assert_eq!(branches[0].name, vec!["main"]);
        assert_eq!(branches[0].upstream_track, Some(UpstreamTrack::InSync));

        assert_eq!(branches[1].name, vec!["feature", "x"]);
        assert_eq!(
            branches[1].upstream_name,
            Some(vec!["origin".into(), "feature".into(), "x".into()])
        );
        assert_eq!(
            branches[1].upstream_track,
            Some(UpstreamTrack::Delta {
                ahead: 2,
                behind: 1
            })
        );

        assert_eq!(branches[2].upstream_track, Some(UpstreamTrack::Gone));

        assert!(!branches[3].head);
        assert_eq!(branches[3].upstream_name, None);
        assert_eq!(branches[3].upstream_track, None);
        assert_eq!(branches.iter().filter(|b| b.head).count(), 1);
    }

    #[test]
    fn malformed_local_lines_fail_closed() {
        assert!(parse_local_branches("*\0refs/heads/main\n").is_err());
        let bad_hash = "*\0refs/heads/main\0\0\0abc\n";
        assert!(parse_local_branches(bad_hash).is_err());
        let bad_marker = format!("x\0refs/heads/main\0\0\0{H1}\n");
        assert!(parse_local_branches(&bad_marker).is_err());
    }

    #[test]
    fn remote_branches_skip_symbolic_heads() {
        let output = format!(
            "refs/remotes/origin/HEAD\0refs/remotes/origin/main\0{H1}\n\
             refs/remotes/origin/main\0\0{H1}\n\
             refs/remotes/upstream/feat/y\0\0{H2}\n"
        );
        let branches = parse_remote_branches(&output).unwrap();
        let names: Vec<Vec<String>> = branches.into_iter().map(|b| b.name).collect();
        assert_eq!(
            names,
            vec![
                vec!["origin".to_string(), "main".to_string()],
                vec!["upstream".to_string(), "feat".to_string(), "y".to_string()],
            ]
        );
    }

    #[test]
    fn tree_groups_by_prefix_and_rejects_collisions() {
        let paths: Vec<Vec<String>> = ["main", "feature/x", "feature/y", "fix/deep/one"]
            .iter()
            .map(|p| segments(p))
            .collect();
        let tree = BranchTree::build(paths.iter().map(|p| (p.as_slice(), ()))).unwrap();
        assert_eq!(tree.len(), 4);
        assert!(matches!(
            tree.children.get("feature"),
            Some(BranchNode::Folder(folder)) if folder.len() == 2
        ));

        let mut tree = tree;
        assert_eq!(
            tree.insert(&segments("feature/x"), ()),
            Err(PathCollision("feature/x".into()))
        );
        assert!(tree.insert(&segments("main/sub"), ()).is_err());
        assert!(tree.insert(&segments("feature"), ()).is_err());
    }
}
