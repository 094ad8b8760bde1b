//! Request path → source file resolution across overlaid content roots.
//!
//! Roots are probed in order and the first hit wins. An existing file is
//! served as is; a directory is served through its `index.html`. When
//! nothing exists at the requested path and it names a `.js` or `.css`
//! output, the source suffixes that produce it are tried in priority order.
//! Every probe is a fresh `stat`; nothing is cached.

use std::path::{Path, PathBuf};

use tracing::debug;

use kiln_shared::{Destination, SourceKind};

/// How a target was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// A regular file at the requested path or a derived source path.
    File,
    /// A directory containing `index.html`.
    Directory,
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// How to build the response. Direct hits are always `Passthrough`.
    pub kind: SourceKind,
    /// The file to read or compile.
    pub path: PathBuf,
    pub hit: HitKind,
    /// A directory was hit through a path without a trailing slash; the
    /// caller must redirect instead of writing a body.
    pub redirect: bool,
}

/// Collapse `.`, `..` and repeated slashes. The result always starts with `/`
/// and `..` never climbs above the root.
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Strip the serving prefix from a cleaned request path, giving a path
/// relative to each root. `None` when the request is outside the prefix.
pub fn relative_to_prefix(prefix: &str, request_path: &str) -> Option<String> {
    let prefix = clean_path(prefix);
    let cleaned = clean_path(request_path);
    if prefix == "/" {
        return Some(cleaned[1..].to_string());
    }
    if cleaned == prefix {
        return Some(String::new());
    }
    cleaned
        .strip_prefix(&prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_string)
}

/// Probe every root for `rel`, returning the first file or indexed directory.
pub fn find_file(roots: &[PathBuf], rel: &str) -> Option<(PathBuf, HitKind)> {
    for root in roots {
        let target = join_relative(root, rel);

        let Ok(meta) = std::fs::metadata(&target) else {
            continue;
        };

        if !meta.is_dir() {
            return Some((target, HitKind::File));
        }

        let index = target.join("index.html");
        if index.is_file() {
            return Some((index, HitKind::Directory));
        }
    }
    None
}

/// Resolve a request path against `roots`.
pub fn resolve(prefix: &str, request_path: &str, roots: &[PathBuf]) -> Option<ResolvedTarget> {
    let rel = relative_to_prefix(prefix, request_path)?;

    if let Some((path, hit)) = find_file(roots, &rel) {
        let redirect = hit == HitKind::Directory && !request_path.ends_with('/');
        debug!(path = %path.display(), ?hit, redirect, "direct hit");
        return Some(ResolvedTarget {
            kind: SourceKind::Passthrough,
            path,
            hit,
            redirect,
        });
    }

    let destination = Destination::of(&rel)?;
    let stem = &rel[..rel.len() - destination.extension().len()];

    for &kind in destination.candidates() {
        let Some(suffix) = kind.suffix() else {
            continue;
        };
        let candidate = format!("{stem}{suffix}");
        if let Some((path, HitKind::File)) = find_file(roots, &candidate) {
            debug!(path = %path.display(), %kind, "source hit");
            return Some(ResolvedTarget {
                kind,
                path,
                hit: HitKind::File,
                redirect: false,
            });
        }
    }

    None
}

fn join_relative(root: &Path, rel: &str) -> PathBuf {
    rel.split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |acc, seg| acc.join(seg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn clean_path_collapses_segments() {
        assert_eq!(clean_path("a/./b//c"), "/a/b/c");
        assert_eq!(clean_path("/a/../../etc/passwd"), "/etc/passwd");
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("/js/"), "/js");
    }

    #[test]
    fn prefix_is_stripped() {
        assert_eq!(relative_to_prefix("/", "/app.js").as_deref(), Some("app.js"));
        assert_eq!(
            relative_to_prefix("/static/", "/static/js/app.js").as_deref(),
            Some("js/app.js")
        );
        assert_eq!(relative_to_prefix("/static", "/static").as_deref(), Some(""));
        assert_eq!(relative_to_prefix("/static", "/staticky/a.js"), None);
        assert_eq!(relative_to_prefix("/static", "/static/../a.js"), None);
    }

    #[test]
    fn first_root_wins() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let in_a = touch(a.path(), "lib.js", "a");
        touch(b.path(), "lib.js", "b");

        let roots = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        let hit = resolve("/", "/lib.js", &roots).unwrap();
        assert_eq!(hit.path, in_a);
        assert_eq!(hit.kind, SourceKind::Passthrough);
    }

    #[test]
    fn later_root_is_used_when_earlier_misses() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let in_b = touch(b.path(), "img/logo.png", "png");

        let roots = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        assert_eq!(resolve("/", "/img/logo.png", &roots).unwrap().path, in_b);
    }

    #[test]
    fn directory_hit_requires_trailing_slash() {
        let root = tempfile::tempdir().unwrap();
        let index = touch(root.path(), "docs/index.html", "<html>");
        let roots = vec![root.path().to_path_buf()];

        let hit = resolve("/", "/docs", &roots).unwrap();
        assert_eq!(hit.hit, HitKind::Directory);
        assert!(hit.redirect);

        let hit = resolve("/", "/docs/", &roots).unwrap();
        assert_eq!(hit.path, index);
        assert!(!hit.redirect);
    }

    #[test]
    fn directory_without_index_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("empty")).unwrap();
        assert!(resolve("/", "/empty/", &[root.path().to_path_buf()]).is_none());
    }

    #[test]
    fn script_sources_are_tried_in_priority_order() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path(), "app.main.js", "cpp");
        let jsx = touch(root.path(), "app.main.jsx", "jsx");
        let roots = vec![root.path().to_path_buf()];

        let hit = resolve("/", "/app.js", &roots).unwrap();
        assert_eq!(hit.kind, SourceKind::Component);
        assert_eq!(hit.path, jsx);
    }

    #[test]
    fn candidate_in_later_root_beats_lower_priority_candidate() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        touch(a.path(), "app.barrel", "{}");
        let ts = touch(b.path(), "app.main.ts", "let x = 1;");

        let roots = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        let hit = resolve("/", "/app.js", &roots).unwrap();
        assert_eq!(hit.kind, SourceKind::TypedSuperset);
        assert_eq!(hit.path, ts);
    }

    #[test]
    fn stylesheet_source_is_found() {
        let root = tempfile::tempdir().unwrap();
        let scss = touch(root.path(), "css/style.main.scss", "a {}");
        let hit = resolve("/", "/css/style.css", &[root.path().to_path_buf()]).unwrap();
        assert_eq!(hit.kind, SourceKind::Stylesheet);
        assert_eq!(hit.path, scss);
    }

    #[test]
    fn unknown_destination_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path(), "page.main.jsx", "jsx");
        assert!(resolve("/", "/page.html", &[root.path().to_path_buf()]).is_none());
    }

    #[test]
    fn prefix_mounts_roots() {
        let root = tempfile::tempdir().unwrap();
        let bundle = touch(root.path(), "all.barrel", "{}");
        let hit = resolve("/assets/", "/assets/all.js", &[root.path().to_path_buf()]).unwrap();
        assert_eq!(hit.kind, SourceKind::Bundle);
        assert_eq!(hit.path, bundle);
    }
}
