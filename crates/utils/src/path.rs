use std::path::{Path, PathBuf};

/// Expand a leading `~` to the current user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Turn user input into an absolute path without touching the filesystem.
pub fn absolute_path(input: &str) -> std::io::Result<PathBuf> {
    std::path::absolute(expand_tilde(input.trim()))
}

/// Render a path the way it is stored and compared: lossy UTF-8, no trailing separator.
pub fn path_key(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    let trimmed = rendered.trim_end_matches(std::path::MAIN_SEPARATOR);
    if trimmed.is_empty() {
        rendered.into_owned()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~/code"), home.join("code"));
        assert_eq!(expand_tilde("/tmp/x"), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn absolute_path_is_absolute() {
        assert!(absolute_path("relative/dir").unwrap().is_absolute());
    }

    #[test]
    fn path_key_drops_trailing_separator() {
        let sep = std::path::MAIN_SEPARATOR;
        let with = format!("{sep}tmp{sep}repo{sep}");
        let without = format!("{sep}tmp{sep}repo");
        assert_eq!(path_key(Path::new(&with)), without);
        assert_eq!(path_key(Path::new(&sep.to_string())), sep.to_string());
    }
}
