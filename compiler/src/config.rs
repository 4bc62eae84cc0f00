// config.rs — Vectorization settings
//
// Layering: built-in defaults, then environment, then command line (applied
// by the binary on top of `from_env`).

use std::path::PathBuf;

use crate::vectorizer::WidthMode;

/// Builtins library consulted when nothing else is configured.
pub const DEFAULT_BUILTINS_PATH: &str = "/system/lib/libclcore_x86.bc";

/// Caller-size threshold for inlining callees that are not always-inline.
pub const DEFAULT_INLINE_THRESHOLD: usize = 4096;

pub const ENV_DISABLE: &str = "WIDEN_VECTORIZER_DISABLE";
pub const ENV_BUILTINS_PATH: &str = "WIDEN_BUILTINS_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorizeConfig {
    pub enabled: bool,
    pub width: WidthMode,
    pub builtins_path: PathBuf,
    pub inline_threshold: usize,
    /// Directory for debug dumps; `None` disables them.
    pub dump_dir: Option<PathBuf>,
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        VectorizeConfig {
            enabled: true,
            width: WidthMode::default(),
            builtins_path: PathBuf::from(DEFAULT_BUILTINS_PATH),
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            dump_dir: None,
        }
    }
}

impl VectorizeConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::with_env(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup` (an environment stand-in).
    pub fn with_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_DISABLE) {
            if is_truthy(&value) {
                config.enabled = false;
            }
        }
        if let Some(path) = lookup(ENV_BUILTINS_PATH) {
            if !path.is_empty() {
                config.builtins_path = PathBuf::from(path);
            }
        }
        config
    }
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value == "true"
}
