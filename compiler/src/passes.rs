// passes.rs — Function-level normalization passes around the vectorizer
//
// `ShuffleCallToInst` runs before vectorization and turns calls to the
// `shuffle`/`shuffle2` vector builtins with constant masks into
// `shufflevector` instructions the vectorizer can widen directly.
// `PreventDivisionCrashes` runs after it and guards integer division so that
// lanes masked off in the scalar predicate cannot trap on a zero divisor.
//
// Both passes touch one function at a time and report whether they changed it.

use std::collections::HashMap;

use tracing::trace;

use crate::builder::fresh_name;
use crate::ir::{BinOp, CmpPred, Constant, Function, Inst, Module, Op, Type, Value};

/// A transformation applied to each function body independently.
pub trait FunctionPass {
    fn name(&self) -> &'static str;
    /// Returns true when the function was modified.
    fn run_on_function(&mut self, function: &mut Function) -> bool;
}

/// Run `pass` over every defined function. Returns the number changed.
pub fn run_on_definitions(pass: &mut dyn FunctionPass, module: &mut Module) -> usize {
    let mut changed = 0;
    for function in module.functions_mut() {
        if function.is_declaration() {
            continue;
        }
        if pass.run_on_function(function) {
            trace!(pass = pass.name(), function = %function.name, "changed");
            changed += 1;
        }
    }
    changed
}

// ── Shuffle normalization ──────────────────────────────────────────────────

const SHUFFLE_PREFIX: &str = "_Z7shuffle";
const SHUFFLE2_PREFIX: &str = "_Z8shuffle2";

#[derive(Debug, Default)]
pub struct ShuffleCallToInst;

impl ShuffleCallToInst {
    /// The `shufflevector` equivalent of a shuffle builtin call, if the call qualifies.
    fn rewrite(op: &Op) -> Option<Op> {
        let (ret, callee, args) = match op {
            Op::Call { ret, callee, args } => (ret, callee, args),
            _ => return None,
        };
        let (lhs, rhs, mask) = if callee.starts_with(SHUFFLE2_PREFIX) && args.len() == 3 {
            (&args[0], args[1].1.clone(), &args[2].1)
        } else if callee.starts_with(SHUFFLE_PREFIX) && args.len() == 2 {
            (&args[0], Value::Const(Constant::Undef), &args[1].1)
        } else {
            return None;
        };
        let two_inputs = !matches!(rhs, Value::Const(Constant::Undef));

        let ty = lhs.0.clone();
        let lanes = ty.lanes()?;
        let range = if two_inputs { lanes * 2 } else { lanes };
        let lanes_mask = match mask {
            Value::Const(Constant::Vector(lanes)) => lanes,
            _ => return None,
        };
        let mut indices = Vec::with_capacity(lanes_mask.len());
        for lane in lanes_mask {
            match lane {
                Constant::Int(v) => indices.push((v.rem_euclid(range as i64)) as u32),
                _ => return None,
            }
        }

        let shuffle = Op::Shuffle {
            ty,
            lhs: lhs.1.clone(),
            rhs,
            mask: indices,
        };
        if shuffle.result_type() != *ret {
            return None;
        }
        Some(shuffle)
    }
}

impl FunctionPass for ShuffleCallToInst {
    fn name(&self) -> &'static str {
        "shuffle-call-to-inst"
    }

    fn run_on_function(&mut self, function: &mut Function) -> bool {
        let mut changed = false;
        for block in &mut function.blocks {
            for inst in &mut block.insts {
                if inst.result.is_none() {
                    continue;
                }
                if let Some(op) = Self::rewrite(&inst.op) {
                    inst.op = op;
                    changed = true;
                }
            }
        }
        changed
    }
}

// ── Division guarding ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PreventDivisionCrashes;

impl PreventDivisionCrashes {
    /// Locals already produced by `select (icmp eq d, 0), <nonzero>, d`.
    fn guarded_locals(function: &Function) -> Vec<String> {
        let mut defs: HashMap<&str, &Op> = HashMap::new();
        for block in &function.blocks {
            for inst in &block.insts {
                if let Some(r) = &inst.result {
                    defs.insert(r, &inst.op);
                }
            }
        }
        let mut guarded = Vec::new();
        for (name, op) in &defs {
            let Op::Select {
                cond: Value::Local(cond),
                on_true: Value::Const(on_true),
                on_false,
                ..
            } = op
            else {
                continue;
            };
            if !on_true.is_nonzero_int() {
                continue;
            }
            let is_zero_test = matches!(
                defs.get(cond.as_str()),
                Some(Op::ICmp { pred: CmpPred::Eq, lhs, rhs: Value::Const(zero), .. })
                    if lhs == on_false && zero.is_zero_int()
            );
            if is_zero_test {
                guarded.push(name.to_string());
            }
        }
        guarded
    }

    fn needs_guard(divisor: &Value, guarded: &[String]) -> bool {
        match divisor {
            Value::Const(c) => !c.is_nonzero_int(),
            Value::Local(name) => !guarded.iter().any(|g| g == name),
            Value::Global(_) => true,
        }
    }
}

impl FunctionPass for PreventDivisionCrashes {
    fn name(&self) -> &'static str {
        "prevent-division-crashes"
    }

    fn run_on_function(&mut self, function: &mut Function) -> bool {
        let guarded = Self::guarded_locals(function);
        let mut names = function.local_names();
        let mut changed = false;

        for block in &mut function.blocks {
            let mut i = 0;
            while i < block.insts.len() {
                let (ty, divisor) = match &block.insts[i].op {
                    Op::Binary { op, ty, rhs, .. } if is_trapping(*op, ty) => {
                        (ty.clone(), rhs.clone())
                    }
                    _ => {
                        i += 1;
                        continue;
                    }
                };
                if !Self::needs_guard(&divisor, &guarded) {
                    i += 1;
                    continue;
                }

                let is_zero = fresh_name(&mut names, "div.iszero");
                let safe = fresh_name(&mut names, "div.safe");
                let test = Inst::new(
                    Some(is_zero.clone()),
                    Op::ICmp {
                        pred: CmpPred::Eq,
                        ty: ty.clone(),
                        lhs: divisor.clone(),
                        rhs: Value::Const(Constant::int_like(&ty, 0)),
                    },
                );
                let select = Inst::new(
                    Some(safe.clone()),
                    Op::Select {
                        ty: ty.clone(),
                        cond: Value::Local(is_zero),
                        on_true: Value::Const(Constant::int_like(&ty, 1)),
                        on_false: divisor,
                    },
                );
                if let Op::Binary { rhs, .. } = &mut block.insts[i].op {
                    *rhs = Value::Local(safe);
                }
                block.insts.insert(i, select);
                block.insts.insert(i, test);
                changed = true;
                i += 3;
            }
        }
        changed
    }
}

/// Integer division ops in `function` whose divisor is not provably non-zero.
pub fn unguarded_divisions(function: &Function) -> usize {
    let guarded = PreventDivisionCrashes::guarded_locals(function);
    function
        .blocks
        .iter()
        .flat_map(|b| b.insts.iter())
        .filter(|inst| match &inst.op {
            Op::Binary { op, ty, rhs, .. } => {
                is_trapping(*op, ty) && PreventDivisionCrashes::needs_guard(rhs, &guarded)
            }
            _ => false,
        })
        .count()
}

fn is_trapping(op: BinOp, ty: &Type) -> bool {
    op.is_int_division() && ty.is_integral()
}
