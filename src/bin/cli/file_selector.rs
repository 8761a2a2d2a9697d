//! Item selection using glob patterns.

use archkit::item::{Item, ItemSelector};
use glob::{MatchOptions, Pattern};

/// Error type for file selector operations
#[derive(Debug)]
pub struct PatternError(pub String);

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid glob pattern: {}", self.0)
    }
}

impl std::error::Error for PatternError {}

/// Selects items whose `/`-separated path matches the include patterns and
/// none of the exclude patterns.
///
/// A pattern without a `/` is also tried against the bare file name, so
/// `*.txt` selects text files at any depth.
pub struct FileSelector {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, PatternError> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(|e| PatternError(format!("{p}: {e}"))))
        .collect()
}

impl FileSelector {
    /// Creates a new file selector from pattern strings
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, PatternError> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Checks if a path matches the selection criteria
    pub fn matches(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        let hit = |p: &Pattern| {
            p.matches_with(path, OPTIONS)
                || (!p.as_str().contains('/') && p.matches_with(name, OPTIONS))
        };
        if !self.include.is_empty() && !self.include.iter().any(hit) {
            return false;
        }
        !self.exclude.iter().any(hit)
    }
}

impl ItemSelector for FileSelector {
    fn select(&self, _index: usize, item: &Item) -> bool {
        self.matches(&item.path.to_slash_string())
    }
}

impl ItemSelector for &FileSelector {
    fn select(&self, index: usize, item: &Item) -> bool {
        (**self).select(index, item)
    }
}
