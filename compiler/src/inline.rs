// inline.rs — Selective inliner
//
// Flattens call graphs so each indexed function reaches the vectorizer as a
// single body. Which callees may be inlined is decided by an `InlinePolicy`;
// the flattening policy denies the protected math builtins and the index
// function, which must stay as calls for the vectorizer to specialize.
//
// Preconditions: module bodies are well-formed (every used local defined).
// Postconditions: no call site remains whose callee is a defined, allowed,
//   non-recursive function within the size threshold (always-inline callees
//   ignore the threshold).
// Failure modes: none. Recursive callees are left as calls.
// Side effects: mutates the module; removes dead internal always-inline functions.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::builder::fresh_name;
use crate::builtins;
use crate::index_fn::{self, INDEX_FUNCTION_NAME};
use crate::ir::{Block, Constant, Function, Inst, Linkage, Module, Op, Terminator, Value};
use crate::pass::StageCert;
use crate::registry;

/// Per-symbol allow/deny predicate consulted before inlining a callee.
pub trait InlinePolicy {
    fn allows(&self, callee: &Function) -> bool;
}

/// Inline everything the inliner's structural rules permit.
pub struct InlineAll;

impl InlinePolicy for InlineAll {
    fn allows(&self, _callee: &Function) -> bool {
        true
    }
}

/// Deny protected builtins and the index function.
#[derive(Debug, Clone)]
pub struct FlattenPolicy {
    index_fn: String,
}

impl Default for FlattenPolicy {
    fn default() -> Self {
        FlattenPolicy {
            index_fn: INDEX_FUNCTION_NAME.to_string(),
        }
    }
}

impl InlinePolicy for FlattenPolicy {
    fn allows(&self, callee: &Function) -> bool {
        callee.name != self.index_fn && !builtins::is_protected(&callee.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStats {
    pub inlined_calls: usize,
    pub removed: Vec<String>,
}

// ── Call graph ─────────────────────────────────────────────────────────────

/// Defined functions that can reach themselves through calls to defined functions.
pub fn recursive_functions(module: &Module) -> HashSet<String> {
    let edges: HashMap<&str, Vec<String>> = module
        .functions()
        .filter(|f| !f.is_declaration())
        .map(|f| (f.name.as_str(), f.callees()))
        .collect();

    let mut recursive = HashSet::new();
    for &start in edges.keys() {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = edges[start].iter().map(String::as_str).collect();
        while let Some(name) = stack.pop() {
            if name == start {
                recursive.insert(start.to_string());
                break;
            }
            if !seen.insert(name) {
                continue;
            }
            if let Some(next) = edges.get(name) {
                stack.extend(next.iter().map(String::as_str));
            }
        }
    }
    recursive
}

// ── Inliner ────────────────────────────────────────────────────────────────

/// Inline call sites module-wide under `policy`.
pub fn inline_module(module: &mut Module, policy: &dyn InlinePolicy, threshold: usize) -> InlineStats {
    let recursive = recursive_functions(module);
    let mut stats = InlineStats::default();

    for caller_name in module.function_names() {
        loop {
            let site = {
                let caller = match module.function(&caller_name) {
                    Some(f) if !f.is_declaration() => f,
                    _ => break,
                };
                find_site(module, caller, policy, &recursive, threshold)
            };
            let (bi, ii, callee) = match site {
                Some(site) => site,
                None => break,
            };
            if let Some(caller) = module.function_mut(&caller_name) {
                inline_call_site(caller, bi, ii, &callee);
                stats.inlined_calls += 1;
            }
        }
    }

    stats.removed = remove_dead_always_inline(module);
    debug!(
        inlined = stats.inlined_calls,
        removed = stats.removed.len(),
        "inliner finished"
    );
    stats
}

/// First call site in `caller` that may be inlined, with a copy of the callee.
fn find_site(
    module: &Module,
    caller: &Function,
    policy: &dyn InlinePolicy,
    recursive: &HashSet<String>,
    threshold: usize,
) -> Option<(usize, usize, Function)> {
    let caller_size = caller.instruction_count();
    for (bi, ii) in caller.call_sites() {
        let callee_name = match caller.blocks[bi].insts[ii].op.callee() {
            Some(name) => name,
            None => continue,
        };
        if callee_name == caller.name || recursive.contains(callee_name) {
            continue;
        }
        let callee = match module.function(callee_name) {
            Some(f) if !f.is_declaration() => f,
            _ => continue,
        };
        if callee.attrs.no_inline || !policy.allows(callee) {
            continue;
        }
        if !callee.attrs.always_inline && caller_size + callee.instruction_count() > threshold {
            continue;
        }
        return Some((bi, ii, callee.clone()));
    }
    None
}

/// Replace the call at `(bi, ii)` in `caller` with a renamed copy of `callee`'s body.
///
/// The calling block is split after the call; the callee's returns branch to
/// the continuation block, merging return values with a phi when needed.
pub fn inline_call_site(caller: &mut Function, bi: usize, ii: usize, callee: &Function) {
    let call = caller.blocks[bi].insts[ii].clone();
    let (ret_ty, args) = match call.op {
        Op::Call { ret, args, .. } => (ret, args),
        other => panic!("inline_call_site on non-call instruction {:?}", other),
    };
    assert_eq!(
        args.len(),
        callee.params.len(),
        "call to '{}' passes {} arguments for {} parameters",
        callee.name,
        args.len(),
        callee.params.len()
    );

    let mut names = caller.local_names();
    let suffix = format!("{}.i", callee.name);

    // Parameters map to argument values; callee locals and labels get fresh names.
    let mut values: HashMap<String, Value> = HashMap::new();
    for (param, (_, arg)) in callee.params.iter().zip(args) {
        values.insert(param.name.clone(), arg);
    }
    let mut labels: HashMap<String, String> = HashMap::new();
    for block in &callee.blocks {
        let label = fresh_name(&mut names, &format!("{}.{}", block.label, suffix));
        labels.insert(block.label.clone(), label);
        for inst in &block.insts {
            if let Some(r) = &inst.result {
                let renamed = fresh_name(&mut names, &format!("{}.{}", r, suffix));
                values.insert(r.clone(), Value::Local(renamed));
            }
        }
    }
    let cont_label = fresh_name(&mut names, &format!("{}.exit", callee.name));

    let remap = |v: &mut Value| {
        if let Value::Local(name) = v {
            if let Some(new) = values.get(name.as_str()) {
                *v = new.clone();
            }
        }
    };

    let mut returns: Vec<(Value, String)> = Vec::new();
    let mut body: Vec<Block> = Vec::with_capacity(callee.blocks.len() + 1);
    for block in &callee.blocks {
        let label = labels[&block.label].clone();
        let mut insts = Vec::with_capacity(block.insts.len());
        for inst in &block.insts {
            let mut inst = inst.clone();
            if inst.result.is_some() {
                inst.result = inst
                    .result
                    .as_ref()
                    .and_then(|r| values.get(r))
                    .and_then(|v| v.as_local())
                    .map(str::to_string);
            }
            for v in inst.op.operands_mut() {
                remap(v);
            }
            if let Op::Phi { incoming, .. } = &mut inst.op {
                for (_, from) in incoming.iter_mut() {
                    if let Some(new) = labels.get(from.as_str()) {
                        *from = new.clone();
                    }
                }
            }
            insts.push(inst);
        }
        let term = match &block.term {
            Terminator::Ret(value) => {
                if let Some((_, v)) = value {
                    let mut v = v.clone();
                    remap(&mut v);
                    returns.push((v, label.clone()));
                }
                Terminator::Br(cont_label.clone())
            }
            other => {
                let mut term = other.clone();
                for v in term.operands_mut() {
                    remap(v);
                }
                for dest in term.successors_mut() {
                    if let Some(new) = labels.get(dest.as_str()) {
                        *dest = new.clone();
                    }
                }
                term
            }
        };
        body.push(Block { label, insts, term });
    }

    // Split the calling block at the call.
    let entry_label = labels[&callee.blocks[0].label].clone();
    let block = &mut caller.blocks[bi];
    let tail: Vec<Inst> = block.insts.split_off(ii + 1);
    block.insts.pop();
    let old_label = block.label.clone();
    let old_term = std::mem::replace(&mut block.term, Terminator::Br(entry_label));
    let successors: Vec<String> = old_term.successors().iter().map(|s| s.to_string()).collect();

    let mut cont = Block {
        label: cont_label.clone(),
        insts: tail,
        term: old_term,
    };

    let result_value = match (&call.result, returns.len()) {
        (None, _) => None,
        (Some(_), 0) => Some(Value::Const(Constant::Undef)),
        (Some(_), 1) => Some(returns[0].0.clone()),
        (Some(r), _) => {
            cont.insts.insert(
                0,
                Inst::new(
                    Some(r.clone()),
                    Op::Phi {
                        ty: ret_ty.clone(),
                        incoming: returns.clone(),
                    },
                ),
            );
            None
        }
    };

    body.push(cont);
    let at = bi + 1;
    caller.blocks.splice(at..at, body);

    // Successors of the split block now have the continuation as predecessor.
    for succ in successors {
        if let Some(idx) = caller.block_index(&succ) {
            for inst in &mut caller.blocks[idx].insts {
                if let Op::Phi { incoming, .. } = &mut inst.op {
                    for (_, from) in incoming.iter_mut() {
                        if *from == old_label {
                            *from = cont_label.clone();
                        }
                    }
                }
            }
        }
    }

    if let (Some(r), Some(v)) = (&call.result, result_value) {
        caller.replace_local_uses(r, &v);
    }
}

/// Remove internal always-inline definitions nothing refers to any more.
fn remove_dead_always_inline(module: &mut Module) -> Vec<String> {
    let mut removed = Vec::new();
    loop {
        let dead: Vec<String> = module
            .functions()
            .filter(|f| {
                f.linkage == Linkage::Internal
                    && f.attrs.always_inline
                    && !f.is_declaration()
                    && module.uses_of(&f.name) == 0
                    && !module.is_referenced_by_metadata(&f.name)
            })
            .map(|f| f.name.clone())
            .collect();
        if dead.is_empty() {
            break;
        }
        for name in dead {
            module.remove_function(&name);
            removed.push(name);
        }
    }
    removed
}

// ── Flattening protocol ────────────────────────────────────────────────────

/// Outcome of one flattening run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenReport {
    pub inlined_calls: usize,
    pub removed: Vec<String>,
    /// Protected builtins that had uses in the module.
    pub protected: Vec<String>,
    pub index_fn_present: bool,
}

/// Detach the index function body, inline under `FlattenPolicy`, restore the body.
pub fn flatten_for_vectorization(module: &mut Module, threshold: usize) -> FlattenReport {
    let protected: Vec<String> = builtins::used_in(module)
        .into_iter()
        .map(str::to_string)
        .collect();
    let index_fn_present = index_fn::detach_index_body(module);

    let stats = inline_module(module, &FlattenPolicy::default(), threshold);

    if index_fn_present {
        assert!(
            module.function(INDEX_FUNCTION_NAME).is_some(),
            "index function removed during flattening"
        );
        index_fn::restore_index_body(module);
    }

    debug!(
        protected = protected.len(),
        inlined = stats.inlined_calls,
        "flatten complete"
    );
    FlattenReport {
        inlined_calls: stats.inlined_calls,
        removed: stats.removed,
        protected,
        index_fn_present,
    }
}

// ── Certificate ────────────────────────────────────────────────────────────

/// Postconditions of flattening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenCert {
    /// Every registry entry names a defined function.
    pub registry_entries_defined: bool,
    /// Indexed bodies call only declarations, protected builtins, the index
    /// function, or recursive functions.
    pub indexed_bodies_flat: bool,
    /// The index function, when present, has its stub body.
    pub index_fn_stubbed: bool,
    /// Protected builtins used by the module are still in the module.
    pub protected_builtins_kept: bool,
}

impl StageCert for FlattenCert {
    fn all_pass(&self) -> bool {
        self.registry_entries_defined
            && self.indexed_bodies_flat
            && self.index_fn_stubbed
            && self.protected_builtins_kept
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("F1_registry_entries_defined", self.registry_entries_defined),
            ("F2_indexed_bodies_flat", self.indexed_bodies_flat),
            ("F3_index_fn_stubbed", self.index_fn_stubbed),
            ("F4_protected_builtins_kept", self.protected_builtins_kept),
        ]
    }
}

pub fn verify_flatten(module: &Module, protected_before: &[String]) -> FlattenCert {
    let entries = registry::entries(module);
    let recursive = recursive_functions(module);

    let registry_entries_defined = registry::dangling_entries(module).is_empty();

    let indexed_bodies_flat = entries.iter().all(|name| {
        let Some(f) = module.function(name) else {
            return false;
        };
        f.callees().iter().all(|callee| {
            callee == INDEX_FUNCTION_NAME
                || builtins::is_protected(callee)
                || recursive.contains(callee)
                || module.function(callee).map_or(true, |c| c.is_declaration() || c.attrs.no_inline)
        })
    });

    let index_fn_stubbed = match module.function(INDEX_FUNCTION_NAME) {
        None => true,
        Some(f) => {
            f.blocks.len() == 1
                && f.blocks[0].insts.is_empty()
                && f.blocks[0].term
                    == Terminator::Ret(Some((index_fn::index_type(), Value::int(0))))
        }
    };

    let protected_builtins_kept = protected_before
        .iter()
        .all(|name| module.function(name).is_some());

    FlattenCert {
        registry_entries_defined,
        indexed_bodies_flat,
        index_fn_stubbed,
        protected_builtins_kept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Type;
    use crate::parser::parse;

    fn module(source: &str) -> Module {
        let result = parse(source, "test");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        result.module.unwrap()
    }

    #[test]
    fn inlines_single_return() {
        let mut m = module(
            "define i32 @caller(i32 %a) {\n\
             entry:\n\
               %r = call i32 @sq(i32 %a)\n\
               %s = add i32 %r, 1\n\
               ret i32 %s\n\
             }\n\
             define internal i32 @sq(i32 %v) alwaysinline {\n\
             entry:\n\
               %m = mul i32 %v, %v\n\
               ret i32 %m\n\
             }",
        );
        let stats = inline_module(&mut m, &InlineAll, 4096);
        assert_eq!(stats.inlined_calls, 1);
        assert_eq!(stats.removed, vec!["sq".to_string()]);
        insta::assert_snapshot!(m.to_string(), @r#"
        source_filename = "test"

        define i32 @caller(i32 %a) {
        entry:
          br label %entry.sq.i
        entry.sq.i:
          %m.sq.i = mul i32 %a, %a
          br label %sq.exit
        sq.exit:
          %s = add i32 %m.sq.i, 1
          ret i32 %s
        }
        "#);
    }

    #[test]
    fn multiple_returns_merge_with_phi() {
        let mut m = module(
            "define i32 @caller(i32 %a) {\n\
             entry:\n\
               %r = call i32 @abs(i32 %a)\n\
               ret i32 %r\n\
             }\n\
             define i32 @abs(i32 %v) {\n\
             entry:\n\
               %neg = icmp slt i32 %v, 0\n\
               br %neg, label %flip, label %keep\n\
             flip:\n\
               %n = sub i32 0, %v\n\
               ret i32 %n\n\
             keep:\n\
               ret i32 %v\n\
             }",
        );
        inline_module(&mut m, &InlineAll, 4096);
        let caller = m.function("caller").unwrap();
        assert_eq!(caller.uses_of("abs"), 0);
        let exit = &caller.blocks[caller.block_index("abs.exit").unwrap()];
        assert_eq!(
            exit.insts[0],
            Inst::new(
                Some("r".into()),
                Op::Phi {
                    ty: Type::i32(),
                    incoming: vec![
                        (Value::local("n.abs.i"), "flip.abs.i".into()),
                        (Value::local("a"), "keep.abs.i".into()),
                    ],
                }
            )
        );
        // External callee stays even though it is no longer called.
        assert!(m.function("abs").is_some());
    }

    #[test]
    fn successor_phis_follow_split() {
        let mut m = module(
            "define i32 @caller(i32 %a, i1 %c) {\n\
             entry:\n\
               %r = call i32 @id(i32 %a)\n\
               br %c, label %join, label %other\n\
             other:\n\
               br label %join\n\
             join:\n\
               %p = phi i32 [%r, %entry], [0, %other]\n\
               ret i32 %p\n\
             }\n\
             define i32 @id(i32 %v) alwaysinline {\n\
             entry:\n\
               ret i32 %v\n\
             }",
        );
        inline_module(&mut m, &InlineAll, 4096);
        let caller = m.function("caller").unwrap();
        let join = &caller.blocks[caller.block_index("join").unwrap()];
        assert_eq!(
            join.insts[0].op,
            Op::Phi {
                ty: Type::i32(),
                incoming: vec![
                    (Value::local("a"), "id.exit".into()),
                    (Value::int(0), "other".into()),
                ],
            }
        );
    }

    #[test]
    fn recursion_and_noinline_are_left_alone() {
        let mut m = module(
            "define void @caller() {\n\
             entry:\n\
               call void @rec()\n\
               call void @pinned()\n\
               ret void\n\
             }\n\
             define void @rec() alwaysinline {\n\
             entry:\n\
               call void @rec()\n\
               ret void\n\
             }\n\
             define void @pinned() alwaysinline noinline {\n\
             entry:\n\
               ret void\n\
             }",
        );
        let stats = inline_module(&mut m, &InlineAll, 4096);
        assert_eq!(stats.inlined_calls, 0);
        assert_eq!(m.function("caller").unwrap().callees(), vec!["rec", "pinned"]);
        assert!(recursive_functions(&m).contains("rec"));
    }

    #[test]
    fn threshold_limits_ordinary_callees() {
        let source = "define void @caller() {\n\
             entry:\n\
               call void @big()\n\
               ret void\n\
             }\n\
             define void @big() {\n\
             entry:\n\
               call void @_Z3cosf(float 0.0)\n\
               call void @_Z3cosf(float 1.0)\n\
               ret void\n\
             }\n\
             declare void @_Z3cosf(float %x)";
        let mut small = module(source);
        assert_eq!(inline_module(&mut small, &InlineAll, 4).inlined_calls, 0);
        let mut large = module(source);
        assert_eq!(inline_module(&mut large, &InlineAll, 5).inlined_calls, 1);
    }

    #[test]
    fn flatten_protects_builtins_and_index_fn() {
        let mut m = module(
            "define float @k.indexed(float %x) alwaysinline {\n\
             entry:\n\
               %id = call i32 @get.id()\n\
               %c = call float @_Z3cosf(float %x)\n\
               %h = call float @helper(float %c)\n\
               ret float %h\n\
             }\n\
             define float @helper(float %v) alwaysinline {\n\
             entry:\n\
               %w = fmul float %v, 2.0\n\
               ret float %w\n\
             }\n\
             define float @_Z3cosf(float %x) alwaysinline {\n\
             entry:\n\
               ret float %x\n\
             }\n\
             define i32 @get.id() {\n\
             entry:\n\
               ret i32 0\n\
             }\n\
             !rs.indexed.kernels = !{!{@k.indexed}}",
        );
        let report = flatten_for_vectorization(&mut m, 4096);
        assert!(report.index_fn_present);
        assert_eq!(report.protected, vec!["_Z3cosf".to_string()]);
        assert_eq!(report.inlined_calls, 1);

        let k = m.function("k.indexed").unwrap();
        assert_eq!(k.callees(), vec!["get.id", "_Z3cosf"]);
        assert!(!m.function("_Z3cosf").unwrap().is_declaration());

        let cert = verify_flatten(&m, &report.protected);
        assert!(cert.all_pass(), "{:?}", cert.obligations());
    }

    #[test]
    fn flatten_is_idempotent() {
        let source = "define void @k(float* %out, float %v) alwaysinline {\n\
             entry:\n\
               %s = call float @_Z4sqrtf(float %v)\n\
               %t = call float @scale(float %s)\n\
               store float %t, %out\n\
               ret void\n\
             }\n\
             define internal float @scale(float %v) alwaysinline {\n\
             entry:\n\
               %w = fmul float %v, 0.5\n\
               ret float %w\n\
             }\n\
             declare float @_Z4sqrtf(float %v)\n\
             define void @k.indexed(float* %out, float %v) alwaysinline {\n\
             init:\n\
               %id = call i32 @get.id()\n\
               %outElement = getelementptr inbounds float, %out, %id\n\
               call void @k(float* %outElement, float %v)\n\
               ret void\n\
             }\n\
             define i32 @get.id() {\n\
             entry:\n\
               ret i32 0\n\
             }";
        let mut once = module(source);
        flatten_for_vectorization(&mut once, 4096);
        let mut twice = once.clone();
        let second = flatten_for_vectorization(&mut twice, 4096);
        assert_eq!(second.inlined_calls, 0);
        assert_eq!(once.fingerprint(), twice.fingerprint());
    }

    #[test]
    fn cert_flags_unflattened_body() {
        let m = module(
            "define void @k.indexed() {\n\
             entry:\n\
               call void @helper()\n\
               ret void\n\
             }\n\
             define void @helper() noinline {\n\
             entry:\n\
               ret void\n\
             }\n\
             define void @other() {\n\
             entry:\n\
               ret void\n\
             }\n\
             !rs.indexed.kernels = !{!{@k.indexed}, !{@missing}}",
        );
        let cert = verify_flatten(&m, &[]);
        assert!(!cert.registry_entries_defined);
        // noinline callees are an accepted residue.
        assert!(cert.indexed_bodies_flat);
        assert!(!cert.all_pass());
    }
}
