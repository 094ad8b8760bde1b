//! The content surface: overlaid roots served on demand.
//!
//! [`Content`] owns the root list, the build settings and the toolchain.
//! Requests resolve and compile under the read side of the root lock;
//! productionize takes the write side (see `productionize.rs`).

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use tracing::{debug, instrument};

use kiln_shared::{BuildSettings, KilnError, Result, SourceKind, Toolchain};

use crate::compile::Compiler;
use crate::resolver::{self, HitKind, ResolvedTarget};

const INDEX_CONTENT_TYPE: &str = "text/html; charset=utf-8";

// ---------------------------------------------------------------------------
// Request / response seam
// ---------------------------------------------------------------------------

/// One request as seen by the content surface.
#[derive(Debug, Clone, Copy)]
pub struct ServeRequest<'a> {
    /// Mount point of the content roots.
    pub prefix: &'a str,
    /// Raw request path, including the prefix.
    pub path: &'a str,
    pub if_modified_since: Option<SystemTime>,
}

/// Where a response body goes. Headers must be set before the first write.
pub trait ResponseSink: Write {
    fn set_content_type(&mut self, value: &str);
    fn set_last_modified(&mut self, at: SystemTime);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOutcome {
    /// A body was written to the sink.
    Served,
    NotFound,
    /// A directory was requested without its trailing slash.
    Redirect(String),
    NotModified,
}

/// A response collected in memory.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    pub content_type: Option<String>,
    pub last_modified: Option<SystemTime>,
    pub body: Vec<u8>,
}

impl Write for BufferedResponse {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseSink for BufferedResponse {
    fn set_content_type(&mut self, value: &str) {
        self.content_type = Some(value.to_string());
    }

    fn set_last_modified(&mut self, at: SystemTime) {
        self.last_modified = Some(at);
    }
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct RootList {
    pub(crate) roots: Vec<PathBuf>,
    /// Roots added by productionize. Their contents are outputs, never
    /// sources for another export.
    pub(crate) exports: Vec<PathBuf>,
}

impl RootList {
    pub(crate) fn sources(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .filter(|r| !self.exports.contains(r))
            .cloned()
            .collect()
    }
}

/// Serving context: roots in priority order plus how to compile.
#[derive(Debug)]
pub struct Content {
    state: RwLock<RootList>,
    settings: BuildSettings,
    tools: Toolchain,
}

impl Content {
    pub fn new(roots: Vec<PathBuf>, settings: BuildSettings, tools: Toolchain) -> Self {
        Self {
            state: RwLock::new(RootList {
                roots,
                exports: Vec::new(),
            }),
            settings,
            tools,
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn tools(&self) -> &Toolchain {
        &self.tools
    }

    pub fn compiler(&self) -> Compiler<'_> {
        Compiler::new(&self.tools, &self.settings)
    }

    /// Snapshot of the current root list.
    pub fn roots(&self) -> Result<Vec<PathBuf>> {
        Ok(self.lock_roots()?.roots.clone())
    }

    pub(crate) fn lock_roots(&self) -> Result<RwLockReadGuard<'_, RootList>> {
        self.state.read().map_err(|_| KilnError::LockPoisoned)
    }

    pub(crate) fn lock_roots_mut(&self) -> Result<RwLockWriteGuard<'_, RootList>> {
        self.state.write().map_err(|_| KilnError::LockPoisoned)
    }

    /// Resolve `req` and write its body into `sink`. The read lock is held
    /// until the body is complete, so a concurrent productionize never swaps
    /// roots under a running request.
    #[instrument(skip_all, fields(path = req.path))]
    pub fn serve(&self, req: &ServeRequest<'_>, sink: &mut impl ResponseSink) -> Result<ServeOutcome> {
        let state = self.lock_roots()?;

        let Some(target) = resolver::resolve(req.prefix, req.path, &state.roots) else {
            debug!("not found");
            return Ok(ServeOutcome::NotFound);
        };

        if target.redirect {
            return Ok(ServeOutcome::Redirect(format!("{}/", req.path)));
        }

        let Some(destination) = target.kind.destination() else {
            return serve_file(&target, req.if_modified_since, sink);
        };

        sink.set_content_type(destination.content_type());
        self.compiler().compile(target.kind, &target.path, sink)?;
        Ok(ServeOutcome::Served)
    }
}

fn serve_file(
    target: &ResolvedTarget,
    if_modified_since: Option<SystemTime>,
    sink: &mut impl ResponseSink,
) -> Result<ServeOutcome> {
    debug_assert_eq!(target.kind, SourceKind::Passthrough);
    let path = &target.path;
    let mut file = File::open(path).map_err(|e| KilnError::io(path, e))?;
    let modified = file.metadata().and_then(|m| m.modified()).ok();

    if let (Some(modified), Some(since)) = (modified, if_modified_since) {
        if !modified_since(modified, since) {
            return Ok(ServeOutcome::NotModified);
        }
    }

    sink.set_content_type(&content_type_of(path, target.hit));
    if let Some(modified) = modified {
        sink.set_last_modified(modified);
    }
    io::copy(&mut file, sink).map_err(|e| KilnError::io(path, e))?;
    Ok(ServeOutcome::Served)
}

/// HTTP dates have whole-second precision, so anything within a second
/// after `since` counts as unchanged.
pub fn modified_since(modified: SystemTime, since: SystemTime) -> bool {
    modified >= since + Duration::from_secs(1)
}

fn content_type_of(path: &Path, hit: HitKind) -> String {
    match hit {
        HitKind::Directory => INDEX_CONTENT_TYPE.to_string(),
        HitKind::File => mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_shared::{OptimizationLevel, Tool};

    fn placeholder_tools() -> Toolchain {
        let t = |name| Tool::new(name, "/nonexistent/tool");
        Toolchain {
            component: t("component compiler"),
            typescript: t("typescript compiler"),
            stylesheet: t("stylesheet compiler"),
            preprocessor: t("preprocessor"),
            optimizer: t("optimizer"),
        }
    }

    fn content(roots: &[&Path]) -> Content {
        Content::new(
            roots.iter().map(|r| r.to_path_buf()).collect(),
            BuildSettings::default(),
            placeholder_tools(),
        )
    }

    fn get(content: &Content, path: &str) -> (ServeOutcome, BufferedResponse) {
        let mut resp = BufferedResponse::default();
        let req = ServeRequest {
            prefix: "/",
            path,
            if_modified_since: None,
        };
        let outcome = content.serve(&req, &mut resp).unwrap();
        (outcome, resp)
    }

    #[test]
    fn passthrough_is_served_with_guessed_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.json"), "{}").unwrap();

        let (outcome, resp) = get(&content(&[dir.path()]), "/data.json");
        assert_eq!(outcome, ServeOutcome::Served);
        assert_eq!(resp.content_type.as_deref(), Some("application/json"));
        assert_eq!(resp.body, b"{}");
        assert!(resp.last_modified.is_some());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, resp) = get(&content(&[dir.path()]), "/nope.png");
        assert_eq!(outcome, ServeOutcome::NotFound);
        assert!(resp.body.is_empty());
    }

    #[test]
    fn directory_without_slash_redirects_without_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/index.html"), "<html>").unwrap();
        let c = content(&[dir.path()]);

        let (outcome, resp) = get(&c, "/docs");
        assert_eq!(outcome, ServeOutcome::Redirect("/docs/".into()));
        assert!(resp.body.is_empty());

        let (outcome, resp) = get(&c, "/docs/");
        assert_eq!(outcome, ServeOutcome::Served);
        assert_eq!(resp.content_type.as_deref(), Some(INDEX_CONTENT_TYPE));
        assert_eq!(resp.body, b"<html>");
    }

    #[test]
    fn unchanged_file_is_not_modified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a").unwrap();
        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
        let c = content(&[dir.path()]);

        let mut resp = BufferedResponse::default();
        let req = ServeRequest {
            prefix: "/",
            path: "/a.txt",
            if_modified_since: Some(mtime),
        };
        assert_eq!(c.serve(&req, &mut resp).unwrap(), ServeOutcome::NotModified);
        assert!(resp.body.is_empty());

        let req = ServeRequest {
            if_modified_since: Some(mtime - Duration::from_secs(5)),
            ..req
        };
        assert_eq!(c.serve(&req, &mut resp).unwrap(), ServeOutcome::Served);
    }

    #[test]
    fn modified_since_uses_one_second_window() {
        let since = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        assert!(!modified_since(since, since));
        assert!(!modified_since(since + Duration::from_millis(999), since));
        assert!(modified_since(since + Duration::from_secs(1), since));
        assert!(!modified_since(since - Duration::from_secs(1), since));
    }

    #[test]
    fn missing_tool_is_an_error_not_a_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.main.jsx"), "class A {}").unwrap();
        let c = Content::new(
            vec![dir.path().to_path_buf()],
            BuildSettings {
                level: OptimizationLevel::None,
                ..BuildSettings::default()
            },
            placeholder_tools(),
        );

        let mut resp = BufferedResponse::default();
        let req = ServeRequest {
            prefix: "/",
            path: "/app.js",
            if_modified_since: None,
        };
        let err = c.serve(&req, &mut resp).unwrap_err();
        assert!(matches!(err, KilnError::ToolNotFound { .. }));
        assert!(resp.body.is_empty());
    }

    #[cfg(unix)]
    mod compiled {
        use super::*;
        use crate::testing::{fake_tools, write};

        fn serve_with(level: OptimizationLevel, files: &[(&str, &str)], path: &str) -> BufferedResponse {
            let fake = fake_tools();
            let root = fake.dir.path().join("site");
            for (name, body) in files {
                write(&root, name, body);
            }
            let c = Content::new(
                vec![root],
                BuildSettings {
                    level,
                    ..BuildSettings::default()
                },
                fake.tools.clone(),
            );
            let mut resp = BufferedResponse::default();
            let req = ServeRequest {
                prefix: "/",
                path,
                if_modified_since: None,
            };
            assert_eq!(c.serve(&req, &mut resp).unwrap(), ServeOutcome::Served);
            resp
        }

        #[test]
        fn component_at_none_is_plain_compiler_output() {
            let resp = serve_with(
                OptimizationLevel::None,
                &[("app.main.jsx", "class App {}\n")],
                "/app.js",
            );
            assert_eq!(resp.content_type.as_deref(), Some("text/javascript"));
            let body = String::from_utf8(resp.body).unwrap();
            assert_eq!(body, "/* jsx app.main.jsx */\nclass App {}\n");
            assert!(!body.contains("/* opt"));
        }

        #[test]
        fn stylesheet_at_advanced_is_compressed() {
            let resp = serve_with(
                OptimizationLevel::Advanced,
                &[("style.main.scss", "body { }\n")],
                "/style.css",
            );
            assert_eq!(resp.content_type.as_deref(), Some("text/css"));
            let body = String::from_utf8(resp.body).unwrap();
            assert!(body.starts_with("/* sass --style compressed "), "{body}");
            assert!(!body.contains("/* opt"));
        }

        #[test]
        fn bundle_is_served_as_script() {
            let resp = serve_with(
                OptimizationLevel::None,
                &[
                    ("a.main.js", "var a;\n"),
                    ("all.barrel", r#"{ "Units": [ { "File": "a.main.js" } ] }"#),
                ],
                "/all.js",
            );
            assert_eq!(resp.content_type.as_deref(), Some("text/javascript"));
            assert!(String::from_utf8(resp.body).unwrap().contains("var a;"));
        }
    }
}
