use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Settings for opening a [`crate::Workspace`].
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// SQLite database file. `None` opens an in-memory workspace.
    pub db_path: Option<PathBuf>,
    /// Maximum nesting of reference/embedded schemas in a form tree.
    pub max_tree_depth: usize,
    pub busy_timeout_ms: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_tree_depth: 16,
            busy_timeout_ms: 5000,
        }
    }
}

impl WorkspaceConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn on_disk(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Parses `--db=PATH`, `--max-tree-depth=N` and `--busy-timeout-ms=N`.
    /// Unknown arguments are ignored.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        let mut config = Self::default();
        for arg in args {
            let arg = arg.as_ref();
            if let Some(path) = arg.strip_prefix("--db=") {
                config.db_path = Some(PathBuf::from(path));
            } else if let Some(n) = arg.strip_prefix("--max-tree-depth=") {
                config.max_tree_depth = parse_or(n, "max-tree-depth", config.max_tree_depth);
            } else if let Some(n) = arg.strip_prefix("--busy-timeout-ms=") {
                config.busy_timeout_ms = parse_or(n, "busy-timeout-ms", config.busy_timeout_ms);
            }
        }
        config
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(raw: &str, name: &str, default: T) -> T {
    match raw.parse() {
        Ok(v) => v,
        Err(_) => {
            warn!("invalid --{name} value {raw:?}, using {default}");
            default
        }
    }
}
