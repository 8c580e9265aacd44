//! Lexical path normalization for namespace paths.

/// Parse a path into its components, dropping empty and `.` segments and
/// resolving `..` against the components seen so far. `..` at the root stays
/// at the root.
pub fn components(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            name => out.push(name),
        }
    }
    out
}

/// Normalize a caller-supplied path into the rooted form used as a cache key.
///
/// The result always starts with `/` and never ends with one unless it is
/// the root itself.
pub fn clean(path: &str) -> String {
    let parts = components(path);
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Join a directory path and an entry name, normalizing the result.
pub fn join(dir: &str, name: &str) -> String {
    clean(&format!("{}/{}", dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_root_forms() {
        assert_eq!(clean(""), "/");
        assert_eq!(clean("/"), "/");
        assert_eq!(clean("//"), "/");
        assert_eq!(clean("."), "/");
        assert_eq!(clean(".."), "/");
    }

    #[test]
    fn test_clean_relative_becomes_rooted() {
        assert_eq!(clean("a/b"), "/a/b");
    }

    #[test]
    fn test_clean_strips_trailing_and_dots() {
        assert_eq!(clean("/a/./b/"), "/a/b");
        assert_eq!(clean("/a//b///c"), "/a/b/c");
    }

    #[test]
    fn test_clean_resolves_parent() {
        assert_eq!(clean("/a/b/../c"), "/a/c");
        assert_eq!(clean("/../../a"), "/a");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "x"), "/x");
        assert_eq!(join("/dir", "f.txt"), "/dir/f.txt");
        assert_eq!(join("/dir/", "sub"), "/dir/sub");
    }
}
