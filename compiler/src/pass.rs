// pass.rs — Pass descriptor module: metadata, ordering, phase membership
//
// Declares the passes of the two orchestration phases, their ordering edges
// and the invariants they establish. Used by the pipeline runner to execute
// each phase in a fixed, dependency-respecting order.

use std::collections::HashSet;

// ── Certificates ───────────────────────────────────────────────────────────

/// Machine-checkable evidence that a stage met its postconditions.
pub trait StageCert {
    fn all_pass(&self) -> bool;
    /// Named obligations with their outcome, in a stable order.
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    /// Names of failed obligations.
    fn failed(&self) -> Vec<&'static str> {
        self.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect()
    }
}

// ── Pass identifiers ───────────────────────────────────────────────────────

/// The two externally visible orchestration phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Prepare,
    Vectorize,
}

/// Identifies each pass the runner executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    CreateIndexFunction,
    Synthesize,
    NormalizeCalls,
    Flatten,
    LoadBuiltins,
    Reflatten,
    RunVectorizer,
    PreventDivisionCrashes,
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Name used in logs and dump file names.
    pub name: &'static str,
    pub phase: Phase,
    /// Passes that must have run before this one.
    pub inputs: &'static [PassId],
    /// Postconditions (documentation; flatten's are checked by `FlattenCert`).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::CreateIndexFunction => PassDescriptor {
            name: "create_index_fn",
            phase: Phase::Prepare,
            inputs: &[],
            invariants: "get.id defined with a constant-zero body",
        },
        PassId::Synthesize => PassDescriptor {
            name: "synthesize",
            phase: Phase::Prepare,
            inputs: &[PassId::CreateIndexFunction],
            invariants: "one wrapper per kernel entry, one indexed function per kernel, registry appended",
        },
        PassId::NormalizeCalls => PassDescriptor {
            name: "normalize_calls",
            phase: Phase::Prepare,
            inputs: &[PassId::Synthesize],
            invariants: "constant-mask shuffle calls rewritten to shufflevector",
        },
        PassId::Flatten => PassDescriptor {
            name: "flatten",
            phase: Phase::Prepare,
            inputs: &[PassId::NormalizeCalls],
            invariants: "F1-F4: indexed bodies flat, protected builtins and index stub kept",
        },
        PassId::LoadBuiltins => PassDescriptor {
            name: "load_builtins",
            phase: Phase::Vectorize,
            inputs: &[],
            invariants: "builtins library parsed",
        },
        PassId::Reflatten => PassDescriptor {
            name: "flatten",
            phase: Phase::Vectorize,
            inputs: &[PassId::LoadBuiltins],
            invariants: "F1-F4 hold again before the vectorizer runs",
        },
        PassId::RunVectorizer => PassDescriptor {
            name: "vectorize",
            phase: Phase::Vectorize,
            inputs: &[PassId::Reflatten],
            invariants: "outputs correlate with registry entries by name",
        },
        PassId::PreventDivisionCrashes => PassDescriptor {
            name: "prevent_division_crashes",
            phase: Phase::Vectorize,
            inputs: &[PassId::RunVectorizer],
            invariants: "no integer division by a possibly-zero divisor",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 8] = [
    PassId::CreateIndexFunction,
    PassId::Synthesize,
    PassId::NormalizeCalls,
    PassId::Flatten,
    PassId::LoadBuiltins,
    PassId::Reflatten,
    PassId::RunVectorizer,
    PassId::PreventDivisionCrashes,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

/// Every pass of `phase`, in execution order.
pub fn phase_passes(phase: Phase) -> Vec<PassId> {
    let terminal = ALL_PASSES
        .iter()
        .rev()
        .find(|id| descriptor(**id).phase == phase);
    match terminal {
        Some(&id) => required_passes(id),
        None => Vec::new(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
