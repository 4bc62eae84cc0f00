// loader.rs — Reading modules from storage
//
// `.json` files hold a serialized `Module`; anything else is textual IR.

use std::path::Path;

use crate::error::LoadError;
use crate::ir::Module;
use crate::parser;

pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<Module, LoadError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileModuleLoader;

impl ModuleLoader for FileModuleLoader {
    fn load(&self, path: &Path) -> Result<Module, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if path.extension().is_some_and(|ext| ext == "json") {
            return serde_json::from_str(&text).map_err(|source| LoadError::Json {
                path: path.to_path_buf(),
                source,
            });
        }
        parse_text(path, &text)
    }
}

/// Parse textual IR, turning any diagnostic into `LoadError::Parse`.
pub fn parse_text(path: &Path, text: &str) -> Result<Module, LoadError> {
    let default_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let result = parser::parse(text, &default_name);
    match result.module {
        Some(module) if result.errors.is_empty() => Ok(module),
        _ => Err(LoadError::Parse {
            path: path.to_path_buf(),
            messages: result
                .errors
                .iter()
                .map(|e| format!("{} at {:?}", e, e.span()))
                .collect(),
        }),
    }
}
