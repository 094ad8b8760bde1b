//! Core domain types: optimization levels and source kinds.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KilnError;

// ---------------------------------------------------------------------------
// OptimizationLevel
// ---------------------------------------------------------------------------

/// Compilation aggressiveness, ordered `None < Basic < Advanced`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum OptimizationLevel {
    #[default]
    None,
    Basic,
    Advanced,
}

impl OptimizationLevel {
    pub const ALL: [OptimizationLevel; 3] = [Self::None, Self::Basic, Self::Advanced];

    /// The level a unit actually compiles at: never above `global`.
    pub fn capped_by(self, global: OptimizationLevel) -> OptimizationLevel {
        self.min(global)
    }

    /// Whether an optimizer stage belongs in the pipeline.
    pub fn optimizes(self) -> bool {
        self > Self::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic => "Basic",
            Self::Advanced => "Advanced",
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationLevel {
    type Err = KilnError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            _ => Err(KilnError::validation(format!(
                "invalid optimization level: {s} (expected none, basic or advanced)"
            ))),
        }
    }
}

impl TryFrom<String> for OptimizationLevel {
    type Error = KilnError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OptimizationLevel> for String {
    fn from(level: OptimizationLevel) -> Self {
        level.as_str().to_ascii_lowercase()
    }
}

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// Category of a source file, which decides its build recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// `*.main.jsx`, compiled by the component compiler.
    Component,
    /// `*.main.ts`, transpiled by the typed-superset compiler.
    TypedSuperset,
    /// `*.main.scss`, compiled by the stylesheet compiler.
    Stylesheet,
    /// `*.main.js`, run through the macro preprocessor.
    PreprocessedScript,
    /// `*.barrel`, a JSON manifest of several units.
    Bundle,
    /// Served and copied byte for byte.
    Passthrough,
    /// An include-only fragment (`.jsx`, `.ts`, `.scss`): neither compiled
    /// on its own nor copied.
    Unknown,
}

/// Compiled source suffixes in matching priority order. `.main.js` must come
/// after `.main.jsx` since one is a prefix of the other.
pub const SOURCE_SUFFIXES: &[(SourceKind, &str)] = &[
    (SourceKind::Component, ".main.jsx"),
    (SourceKind::TypedSuperset, ".main.ts"),
    (SourceKind::Stylesheet, ".main.scss"),
    (SourceKind::PreprocessedScript, ".main.js"),
    (SourceKind::Bundle, ".barrel"),
];

/// Suffixes of files that exist only to be included by other sources.
pub const FRAGMENT_SUFFIXES: &[&str] = &[".jsx", ".ts", ".scss"];

impl SourceKind {
    /// Classify a path by its most specific suffix.
    pub fn of(path: &Path) -> SourceKind {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return SourceKind::Passthrough;
        };
        if let Some((kind, _)) = SOURCE_SUFFIXES.iter().find(|(_, s)| name.ends_with(s)) {
            return *kind;
        }
        if FRAGMENT_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            return SourceKind::Unknown;
        }
        SourceKind::Passthrough
    }

    /// The suffix that identifies this kind, if it is compiled.
    pub fn suffix(self) -> Option<&'static str> {
        SOURCE_SUFFIXES
            .iter()
            .find(|(k, _)| *k == self)
            .map(|(_, s)| *s)
    }

    /// What this kind compiles into.
    pub fn destination(self) -> Option<Destination> {
        match self {
            Self::Component | Self::TypedSuperset | Self::PreprocessedScript | Self::Bundle => {
                Some(Destination::Script)
            }
            Self::Stylesheet => Some(Destination::Stylesheet),
            Self::Passthrough | Self::Unknown => None,
        }
    }

    /// Output path for a compiled source: the source suffix replaced by the
    /// destination extension. `None` for kinds that are not compiled.
    pub fn output_name(self, source: &Path) -> Option<std::path::PathBuf> {
        let suffix = self.suffix()?;
        let dest = self.destination()?;
        let name = source.file_name()?.to_str()?;
        let stem = name.strip_suffix(suffix)?;
        Some(source.with_file_name(format!("{stem}{}", dest.extension())))
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Component => "component",
            Self::TypedSuperset => "typed-superset",
            Self::Stylesheet => "stylesheet",
            Self::PreprocessedScript => "preprocessed-script",
            Self::Bundle => "bundle",
            Self::Passthrough => "passthrough",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

/// A compiled output type, recognized by the requested extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Script,
    Stylesheet,
}

impl Destination {
    /// Recognize a requested path's extension.
    pub fn of(path: &str) -> Option<Destination> {
        if path.ends_with(".js") {
            Some(Destination::Script)
        } else if path.ends_with(".css") {
            Some(Destination::Stylesheet)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Script => ".js",
            Self::Stylesheet => ".css",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Script => "text/javascript",
            Self::Stylesheet => "text/css",
        }
    }

    /// Source kinds that can produce this destination, in probe order.
    pub fn candidates(self) -> &'static [SourceKind] {
        match self {
            Self::Script => &[
                SourceKind::Component,
                SourceKind::TypedSuperset,
                SourceKind::PreprocessedScript,
                SourceKind::Bundle,
            ],
            Self::Stylesheet => &[SourceKind::Stylesheet],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn levels_are_ordered() {
        assert!(OptimizationLevel::None < OptimizationLevel::Basic);
        assert!(OptimizationLevel::Basic < OptimizationLevel::Advanced);
        assert!(!OptimizationLevel::None.optimizes());
        assert!(OptimizationLevel::Basic.optimizes());
    }

    #[test]
    fn unit_level_is_capped_by_global() {
        use OptimizationLevel::*;
        assert_eq!(Basic.capped_by(Advanced), Basic);
        assert_eq!(Advanced.capped_by(Basic), Basic);
        assert_eq!(Advanced.capped_by(None), None);
        assert_eq!(None.capped_by(Advanced), None);
    }

    #[test]
    fn level_parsing_is_case_insensitive() {
        assert_eq!("ADVANCED".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::Advanced);
        assert_eq!("basic".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::Basic);
        assert!("super".parse::<OptimizationLevel>().is_err());
    }

    #[test]
    fn classify_prefers_most_specific_suffix() {
        assert_eq!(SourceKind::of(Path::new("a/app.main.jsx")), SourceKind::Component);
        assert_eq!(SourceKind::of(Path::new("app.main.js")), SourceKind::PreprocessedScript);
        assert_eq!(SourceKind::of(Path::new("app.main.ts")), SourceKind::TypedSuperset);
        assert_eq!(SourceKind::of(Path::new("style.main.scss")), SourceKind::Stylesheet);
        assert_eq!(SourceKind::of(Path::new("all.barrel")), SourceKind::Bundle);
        assert_eq!(SourceKind::of(Path::new("lib.js")), SourceKind::Passthrough);
        assert_eq!(SourceKind::of(Path::new("_mixins.scss")), SourceKind::Unknown);
        assert_eq!(SourceKind::of(Path::new("widget.jsx")), SourceKind::Unknown);
        assert_eq!(SourceKind::of(Path::new("index.html")), SourceKind::Passthrough);
    }

    #[test]
    fn output_name_rewrites_extension() {
        assert_eq!(
            SourceKind::Component.output_name(Path::new("js/app.main.jsx")),
            Some(PathBuf::from("js/app.js"))
        );
        assert_eq!(
            SourceKind::Stylesheet.output_name(Path::new("style.main.scss")),
            Some(PathBuf::from("style.css"))
        );
        assert_eq!(SourceKind::Passthrough.output_name(Path::new("a.txt")), None);
    }

    #[test]
    fn destination_candidates_follow_priority() {
        assert_eq!(Destination::of("/app.js"), Some(Destination::Script));
        assert_eq!(Destination::of("/s.css"), Some(Destination::Stylesheet));
        assert_eq!(Destination::of("/index.html"), None);
        assert_eq!(Destination::Script.candidates()[0], SourceKind::Component);
        assert_eq!(Destination::Script.candidates()[3], SourceKind::Bundle);
    }
}
