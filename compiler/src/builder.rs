// builder.rs — Instruction builder for synthesized function bodies
//
// Appends blocks and instructions to a `Function` and hands out local names
// that never collide with names already present in the function.

use std::collections::HashSet;

use crate::ir::{BinOp, Block, Function, Inst, Op, Terminator, Type, Value};

/// Return `base` if unused in `names`, else `base.1`, `base.2`, ... Records the choice.
pub fn fresh_name(names: &mut HashSet<String>, base: &str) -> String {
    if names.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 1usize;
    loop {
        let candidate = format!("{}.{}", base, n);
        if names.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

pub struct FunctionBuilder<'f> {
    func: &'f mut Function,
    names: HashSet<String>,
    current: Option<usize>,
}

impl<'f> FunctionBuilder<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        let names = func.local_names();
        let current = func.blocks.len().checked_sub(1);
        FunctionBuilder {
            func,
            names,
            current,
        }
    }

    pub fn fresh(&mut self, hint: &str) -> String {
        fresh_name(&mut self.names, hint)
    }

    /// Append a new block and move the insertion point to it. Returns its label.
    ///
    /// The block is terminated by `unreachable` until a terminator is set.
    pub fn append_block(&mut self, hint: &str) -> String {
        let label = self.fresh(hint);
        self.func.blocks.push(Block {
            label: label.clone(),
            insts: Vec::new(),
            term: Terminator::Unreachable,
        });
        self.current = Some(self.func.blocks.len() - 1);
        label
    }

    fn block(&mut self) -> &mut Block {
        let idx = match self.current {
            Some(idx) => idx,
            None => panic!("FunctionBuilder used before append_block"),
        };
        &mut self.func.blocks[idx]
    }

    fn emit(&mut self, hint: &str, op: Op) -> Value {
        let result = self.fresh(hint);
        self.block().insts.push(Inst::new(Some(result.clone()), op));
        Value::Local(result)
    }

    fn emit_void(&mut self, op: Op) {
        self.block().insts.push(Inst::new(None, op));
    }

    /// Emit a call. Returns the result value, or `None` for void callees.
    pub fn call(
        &mut self,
        ret: Type,
        callee: &str,
        args: Vec<(Type, Value)>,
        hint: &str,
    ) -> Option<Value> {
        let op = Op::Call {
            ret: ret.clone(),
            callee: callee.to_string(),
            args,
        };
        if ret.is_void() {
            self.emit_void(op);
            None
        } else {
            Some(self.emit(hint, op))
        }
    }

    pub fn load(&mut self, ty: Type, ptr: Value, hint: &str) -> Value {
        self.emit(hint, Op::Load { ty, ptr })
    }

    pub fn store(&mut self, ty: Type, value: Value, ptr: Value) {
        self.emit_void(Op::Store { ty, value, ptr });
    }

    pub fn inbounds_gep(&mut self, elem: Type, base: Value, index: Value, hint: &str) -> Value {
        self.emit(
            hint,
            Op::Gep {
                elem,
                base,
                index,
                inbounds: true,
            },
        )
    }

    pub fn add(&mut self, ty: Type, lhs: Value, rhs: Value, hint: &str) -> Value {
        self.emit(
            hint,
            Op::Binary {
                op: BinOp::Add,
                ty,
                lhs,
                rhs,
            },
        )
    }

    pub fn ret(&mut self, value: Option<(Type, Value)>) {
        self.block().term = Terminator::Ret(value);
    }

    pub fn ret_void(&mut self) {
        self.ret(None);
    }
}
