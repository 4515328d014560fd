use std::path::PathBuf;

/// Expand a leading `~` to the current user's home directory.
///
/// Paths without a leading tilde (and `~user` forms) are returned unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_home_prefix() {
        let expanded = expand_tilde("~/boards/kanban.db");
        assert!(!expanded.to_string_lossy().contains('~'));
        assert!(expanded.ends_with("boards/kanban.db"));
    }

    #[test]
    fn test_expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("/tmp/kanban.db"), PathBuf::from("/tmp/kanban.db"));
        assert_eq!(expand_tilde("kanban.db"), PathBuf::from("kanban.db"));
        assert_eq!(expand_tilde("~other/x"), PathBuf::from("~other/x"));
    }
}
