// naming.rs — Function roles and the cross-phase symbol table
//
// The external vectorizer hands back nothing but module side effects, so a
// transformed function is found again purely by its symbol. All suffix and
// prefix arithmetic lives here; callers go through `FunctionHandle` and
// `SymbolTable` instead of concatenating strings.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ir::{Function, Module};
use crate::registry;

pub const WRAPPER_SUFFIX: &str = ".wrapper";
pub const INDEXED_SUFFIX: &str = ".indexed";
pub const VECTORIZED_PREFIX: &str = "__Vectorized_.";

pub fn wrapper_name(kernel: &str) -> String {
    format!("{}{}", kernel, WRAPPER_SUFFIX)
}

pub fn indexed_name(target: &str) -> String {
    format!("{}{}", target, INDEXED_SUFFIX)
}

pub fn vectorized_name(indexed: &str) -> String {
    format!("{}{}", VECTORIZED_PREFIX, indexed)
}

// ── Roles ──────────────────────────────────────────────────────────────────

/// Which view of a kernel a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Original,
    Wrapper,
    Indexed,
    Vectorized,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Original => "original",
            Role::Wrapper => "wrapper",
            Role::Indexed => "indexed",
            Role::Vectorized => "vectorized",
        };
        write!(f, "{}", s)
    }
}

/// A kernel's base name plus the role being referred to.
///
/// `wrapped` records whether the indexed/vectorized forms were derived from a
/// wrapper (kernel entries) or directly from the kernel (simple void kernels).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionHandle {
    pub base: String,
    pub role: Role,
    pub wrapped: bool,
}

impl FunctionHandle {
    pub fn new(base: impl Into<String>, role: Role, wrapped: bool) -> Self {
        FunctionHandle {
            base: base.into(),
            role,
            wrapped,
        }
    }

    /// The symbol this handle resolves to.
    pub fn symbol(&self) -> String {
        let indexed_target = || {
            if self.wrapped {
                wrapper_name(&self.base)
            } else {
                self.base.clone()
            }
        };
        match self.role {
            Role::Original => self.base.clone(),
            Role::Wrapper => wrapper_name(&self.base),
            Role::Indexed => indexed_name(&indexed_target()),
            Role::Vectorized => vectorized_name(&indexed_name(&indexed_target())),
        }
    }

    pub fn with_role(&self, role: Role) -> FunctionHandle {
        FunctionHandle {
            role,
            ..self.clone()
        }
    }

    /// Recover base name and role from a symbol.
    pub fn classify(symbol: &str) -> FunctionHandle {
        if let Some(indexed) = symbol.strip_prefix(VECTORIZED_PREFIX) {
            let inner = Self::classify(indexed);
            if inner.role == Role::Indexed {
                return inner.with_role(Role::Vectorized);
            }
        }
        if let Some(target) = symbol.strip_suffix(INDEXED_SUFFIX) {
            return match target.strip_suffix(WRAPPER_SUFFIX) {
                Some(base) => FunctionHandle::new(base, Role::Indexed, true),
                None => FunctionHandle::new(target, Role::Indexed, false),
            };
        }
        if let Some(base) = symbol.strip_suffix(WRAPPER_SUFFIX) {
            return FunctionHandle::new(base, Role::Wrapper, true);
        }
        FunctionHandle::new(symbol, Role::Original, false)
    }
}

impl fmt::Display for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} of {})", self.symbol(), self.role, self.base)
    }
}

// ── Symbol table ───────────────────────────────────────────────────────────

/// Kernels produced by prepare, keyed by base name, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    kernels: IndexMap<String, bool>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, base: impl Into<String>, wrapped: bool) {
        self.kernels.insert(base.into(), wrapped);
    }

    /// Rebuild the table from the indexed-kernel registry of `module`.
    pub fn from_registry(module: &Module) -> Self {
        let mut table = SymbolTable::new();
        for entry in registry::entries(module) {
            let handle = FunctionHandle::classify(&entry);
            if handle.role == Role::Indexed {
                table.record(handle.base, handle.wrapped);
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn contains(&self, base: &str) -> bool {
        self.kernels.contains_key(base)
    }

    /// Handle for `role` of kernel `base`. `None` for unknown kernels and
    /// for the wrapper role of kernels that were indexed directly.
    pub fn handle(&self, base: &str, role: Role) -> Option<FunctionHandle> {
        let wrapped = *self.kernels.get(base)?;
        if role == Role::Wrapper && !wrapped {
            return None;
        }
        Some(FunctionHandle::new(base, role, wrapped))
    }

    pub fn lookup<'m>(&self, module: &'m Module, base: &str, role: Role) -> Option<&'m Function> {
        let handle = self.handle(base, role)?;
        module.function(&handle.symbol())
    }

    pub fn find_wrapper<'m>(&self, module: &'m Module, base: &str) -> Option<&'m Function> {
        self.lookup(module, base, Role::Wrapper)
    }

    pub fn find_indexed<'m>(&self, module: &'m Module, base: &str) -> Option<&'m Function> {
        self.lookup(module, base, Role::Indexed)
    }

    pub fn find_vectorized<'m>(&self, module: &'m Module, base: &str) -> Option<&'m Function> {
        self.lookup(module, base, Role::Vectorized)
    }

    /// Base kernel a symbol belongs to, if the kernel is in the table.
    pub fn kernel_for(&self, symbol: &str) -> Option<&str> {
        let handle = FunctionHandle::classify(symbol);
        self.kernels
            .get_key_value(handle.base.as_str())
            .filter(|(_, wrapped)| handle.role == Role::Original || **wrapped == handle.wrapped)
            .map(|(k, _)| k.as_str())
    }

    pub fn handles(&self, role: Role) -> impl Iterator<Item = FunctionHandle> + '_ {
        self.kernels
            .iter()
            .map(move |(base, wrapped)| FunctionHandle::new(base.clone(), role, *wrapped))
    }
}
