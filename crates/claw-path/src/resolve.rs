// resolve.rs — Canonical path resolution.
//
// Resolution is symlink-hardened: the target is realpathed so containment
// checks judge a path by where it points. Missing targets degrade in two
// steps (realpath the parent, then a pure lexical normalisation) so that
// resolution itself never fails — the firewall decides, not an I/O error.

use std::path::{Component, Path, PathBuf};

/// The user's home directory, from `HOME` (or `USERPROFILE` on Windows).
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Expand a leading `~` or `~/...` to the user's home directory.
///
/// A path with no leading tilde, or an unexpandable `~user` form, is
/// returned unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Resolve a path to an absolute canonical form with forward slashes.
///
/// Tilde-expands, resolves relative paths against `base`, then realpaths
/// the target (following symlinks). If the target does not exist, its
/// parent is realpathed and the basename re-appended; if the parent is
/// also missing, a lexical normalisation of the joined path is returned.
pub fn resolve(path: &str, base: &Path) -> String {
    let expanded = expand_tilde(path);
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };

    let canonical = match std::fs::canonicalize(&joined) {
        Ok(real) => real,
        Err(_) => match (joined.parent(), joined.file_name()) {
            (Some(parent), Some(name)) => match std::fs::canonicalize(parent) {
                Ok(real_parent) => real_parent.join(name),
                Err(_) => lexical_normalize(&joined),
            },
            _ => lexical_normalize(&joined),
        },
    };

    to_slash_string(&canonical)
}

/// Containment test: `target` equals `root` or sits strictly below it.
///
/// Both arguments must already be resolved slash-normalised strings. A
/// plain prefix match is not enough (`/work` must not contain
/// `/workspace`), so the prefix must end at a separator.
pub fn under(root: &str, target: &str) -> bool {
    let root = root.trim_end_matches('/');
    target == root
        || target
            .strip_prefix(root)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

/// Collapse `.` and `..` components without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root.
                if out.components().count() > 1 {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Render a path with forward slashes regardless of platform.
fn to_slash_string(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if raw.contains('\\') {
        raw.replace('\\', "/")
    } else {
        raw.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absolute_path_resolves_to_itself() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        let resolved = resolve(file.to_str().unwrap(), Path::new("/"));
        assert_eq!(resolved, to_slash_string(&std::fs::canonicalize(&file).unwrap()));
    }

    #[test]
    fn relative_path_resolves_against_base() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("rel.txt"), "x").unwrap();

        let resolved = resolve("rel.txt", dir.path());
        assert!(resolved.ends_with("/rel.txt"));
    }

    #[test]
    fn missing_file_in_existing_dir_keeps_basename() {
        let dir = tempdir().unwrap();
        let resolved = resolve("does-not-exist.txt", dir.path());
        assert!(resolved.ends_with("/does-not-exist.txt"));
        // The parent portion is still canonical.
        let parent = to_slash_string(&std::fs::canonicalize(dir.path()).unwrap());
        assert!(under(&parent, &resolved));
    }

    #[test]
    fn missing_parent_falls_back_to_lexical_form() {
        let resolved = resolve("/no/such/dir/./x/../file.txt", Path::new("/"));
        assert_eq!(resolved, "/no/such/dir/file.txt");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_is_followed_to_its_target() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let secret = outside.path().join("secret.txt");
        std::fs::write(&secret, "x").unwrap();

        let link = dir.path().join("innocent.txt");
        std::os::unix::fs::symlink(&secret, &link).unwrap();

        let resolved = resolve(link.to_str().unwrap(), Path::new("/"));
        let real_outside = to_slash_string(&std::fs::canonicalize(outside.path()).unwrap());
        assert!(under(&real_outside, &resolved));
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = home_dir() {
            let expanded = expand_tilde("~/notes.txt");
            assert_eq!(expanded, home.join("notes.txt"));
            assert_eq!(expand_tilde("~"), home);
        }
    }

    #[test]
    fn tilde_user_form_is_left_alone() {
        assert_eq!(expand_tilde("~other/x"), PathBuf::from("~other/x"));
    }

    #[test]
    fn under_requires_separator_boundary() {
        assert!(under("/work", "/work"));
        assert!(under("/work", "/work/src/main.rs"));
        assert!(!under("/work", "/workspace/file"));
        assert!(!under("/work/src", "/work"));
    }

    #[test]
    fn under_tolerates_trailing_slash_on_root() {
        assert!(under("/work/", "/work/file"));
        assert!(under("/work/", "/work"));
    }
}
