// dump.rs — Debug dumps of the module between passes
//
// A side channel only: failures are logged and never reach the caller.
// Each sink owns its counter, so dumps from one compilation are numbered
// independently of any other.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::ir::Module;

#[derive(Debug, Default)]
pub struct DumpSink {
    dir: Option<PathBuf>,
    module_counter: u32,
    point_counter: u32,
}

impl DumpSink {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn to_dir(dir: impl Into<PathBuf>) -> Self {
        DumpSink {
            dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Write the module text to `<dir>/<tag>_<title>_<n>.ll`.
    pub fn dump_module(&mut self, tag: &str, title: &str, module: &Module) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let path = dir.join(format!("{}_{}_{}.ll", tag, title, self.module_counter));
        self.module_counter += 1;
        write_logged(&path, module.to_string().as_bytes())
    }

    /// Create the empty marker file `<dir>/DBGP_<tag>_<title>.<n>`.
    pub fn dump_point(&mut self, tag: &str, title: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let path = dir.join(format!("DBGP_{}_{}.{}", tag, title, self.point_counter));
        self.point_counter += 1;
        write_logged(&path, &[])
    }
}

fn write_logged(path: &Path, contents: &[u8]) -> Option<PathBuf> {
    match fs::write(path, contents) {
        Ok(()) => {
            debug!(path = %path.display(), "dump written");
            Some(path.to_path_buf())
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot write dump");
            None
        }
    }
}
