use std::path::{Component, Path};

/// Whether `path` names a location inside a working tree: relative, non-empty,
/// and without `..` or root components.
pub fn is_repo_relative_path(path: &str) -> bool {
    if path.is_empty() || path.contains('\0') {
        return false;
    }
    Path::new(path)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// `path` as git prints it: `/`-separated, with `.` segments dropped.
/// `None` when it is not repository-relative or names the root itself.
pub fn normalize_repo_path(path: &str) -> Option<String> {
    if !is_repo_relative_path(path) {
        return None;
    }
    let segments: Vec<&str> = Path::new(path)
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => segment.to_str(),
            _ => None,
        })
        .collect();
    (!segments.is_empty()).then(|| segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert!(is_repo_relative_path("README.md"));
        assert!(is_repo_relative_path("src/lib.rs"));
        assert!(is_repo_relative_path("./src/lib.rs"));
        assert!(is_repo_relative_path("dir with spaces/file"));
    }

    #[test]
    fn test_invalid_paths() {
        assert!(!is_repo_relative_path(""));
        assert!(!is_repo_relative_path("/etc/passwd"));
        assert!(!is_repo_relative_path("../outside"));
        assert!(!is_repo_relative_path("src/../../outside"));
        assert!(!is_repo_relative_path("nul\0byte"));
    }

    #[test]
    fn normalized_paths_match_git_output() {
        assert_eq!(normalize_repo_path("./src/lib.rs").as_deref(), Some("src/lib.rs"));
        assert_eq!(normalize_repo_path("src/./lib.rs").as_deref(), Some("src/lib.rs"));
        assert_eq!(normalize_repo_path("src//lib.rs").as_deref(), Some("src/lib.rs"));
        assert_eq!(normalize_repo_path("README.md").as_deref(), Some("README.md"));
        assert_eq!(normalize_repo_path("."), None);
        assert_eq!(normalize_repo_path("../x"), None);
    }
}
