// ir.rs — Kernel IR: types, values, instructions, functions, modules
//
// A small SSA IR shaped after LLVM's, large enough to synthesize wrapper and
// indexed functions, flatten call graphs, and run the pre/post vectorization
// passes. Functions are referenced by symbol name everywhere; the module is
// the sole owner of every function value.
//
// Preconditions: none (data model only).
// Postconditions: `Display` output is accepted by `parser::parse` and yields
//   a structurally identical module.
// Failure modes: none.
// Side effects: none.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    /// Integer of the given bit width (`i1`, `i8`, `i32`, ...).
    Int(u32),
    Float,
    Double,
    Ptr(Box<Type>),
    /// Fixed-width vector `<N x T>`.
    Vector(u32, Box<Type>),
    /// Opaque named aggregate (`%struct.rs_allocation`).
    Named(String),
}

impl Type {
    pub fn i1() -> Type {
        Type::Int(1)
    }

    pub fn i32() -> Type {
        Type::Int(32)
    }

    pub fn ptr_to(&self) -> Type {
        Type::Ptr(Box::new(self.clone()))
    }

    pub fn vector(lanes: u32, elem: Type) -> Type {
        Type::Vector(lanes, Box::new(elem))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Lane count for vector types.
    pub fn lanes(&self) -> Option<u32> {
        match self {
            Type::Vector(n, _) => Some(*n),
            _ => None,
        }
    }

    /// Element type of a vector, or the type itself for scalars.
    pub fn element(&self) -> &Type {
        match self {
            Type::Vector(_, elem) => elem,
            other => other,
        }
    }

    /// True for integer scalars and integer vectors.
    pub fn is_integral(&self) -> bool {
        matches!(self.element(), Type::Int(_))
    }

    /// Result type of a comparison over this type: `i1` or `<N x i1>`.
    pub fn bool_like(&self) -> Type {
        match self {
            Type::Vector(n, _) => Type::vector(*n, Type::i1()),
            _ => Type::i1(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Ptr(inner) => write!(f, "{}*", inner),
            Type::Vector(n, elem) => write!(f, "<{} x {}>", n, elem),
            Type::Named(name) => write!(f, "%{}", name),
        }
    }
}

// ── Values ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Null,
    Undef,
    Vector(Vec<Constant>),
}

impl Constant {
    /// Integer constant `value` shaped like `ty` (splatted across lanes for vectors).
    pub fn int_like(ty: &Type, value: i64) -> Constant {
        match ty {
            Type::Vector(n, _) => Constant::Vector(vec![Constant::Int(value); *n as usize]),
            _ => Constant::Int(value),
        }
    }

    /// True when every lane is a non-zero integer.
    pub fn is_nonzero_int(&self) -> bool {
        match self {
            Constant::Int(v) => *v != 0,
            Constant::Vector(lanes) => !lanes.is_empty() && lanes.iter().all(|c| c.is_nonzero_int()),
            _ => false,
        }
    }

    /// True when every lane is the integer zero.
    pub fn is_zero_int(&self) -> bool {
        match self {
            Constant::Int(v) => *v == 0,
            Constant::Vector(lanes) => !lanes.is_empty() && lanes.iter().all(|c| c.is_zero_int()),
            _ => false,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Float(v) => write!(f, "{}", fmt_float(*v)),
            Constant::Null => write!(f, "null"),
            Constant::Undef => write!(f, "undef"),
            Constant::Vector(lanes) => {
                write!(f, "<")?;
                for (i, c) in lanes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, ">")
            }
        }
    }
}

/// Float literal text that the lexer reads back as a float (never as an int).
fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{:?}", v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Function-local SSA name (parameters and instruction results).
    Local(String),
    /// Module-level symbol used as a value.
    Global(String),
    Const(Constant),
}

impl Value {
    pub fn local(name: impl Into<String>) -> Value {
        Value::Local(name.into())
    }

    pub fn int(v: i64) -> Value {
        Value::Const(Constant::Int(v))
    }

    pub fn as_local(&self) -> Option<&str> {
        match self {
            Value::Local(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Local(name) => write!(f, "%{}", name),
            Value::Global(name) => write!(f, "@{}", name),
            Value::Const(c) => write!(f, "{}", c),
        }
    }
}

// ── Instructions ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    And,
    Or,
    Xor,
    Shl,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::UDiv => "udiv",
            BinOp::SRem => "srem",
            BinOp::URem => "urem",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
        }
    }

    /// Integer division and remainder: the ops that trap on a zero divisor.
    pub fn is_int_division(self) -> bool {
        matches!(self, BinOp::SDiv | BinOp::UDiv | BinOp::SRem | BinOp::URem)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl CmpPred {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Slt => "slt",
            CmpPred::Sle => "sle",
            CmpPred::Sgt => "sgt",
            CmpPred::Sge => "sge",
            CmpPred::Ult => "ult",
            CmpPred::Ule => "ule",
            CmpPred::Ugt => "ugt",
            CmpPred::Uge => "uge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Binary {
        op: BinOp,
        ty: Type,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        pred: CmpPred,
        ty: Type,
        lhs: Value,
        rhs: Value,
    },
    /// `ty` is the type of both arms; the condition is `ty.bool_like()`.
    Select {
        ty: Type,
        cond: Value,
        on_true: Value,
        on_false: Value,
    },
    Load {
        ty: Type,
        ptr: Value,
    },
    Store {
        ty: Type,
        value: Value,
        ptr: Value,
    },
    /// Single-index pointer offset: `base + index * sizeof(elem)`.
    Gep {
        elem: Type,
        base: Value,
        index: Value,
        inbounds: bool,
    },
    Call {
        ret: Type,
        callee: String,
        args: Vec<(Type, Value)>,
    },
    Phi {
        ty: Type,
        incoming: Vec<(Value, String)>,
    },
    /// `ty` is the operand vector type; the result has `mask.len()` lanes.
    Shuffle {
        ty: Type,
        lhs: Value,
        rhs: Value,
        mask: Vec<u32>,
    },
}

impl Op {
    pub fn result_type(&self) -> Type {
        match self {
            Op::Binary { ty, .. } | Op::Select { ty, .. } | Op::Load { ty, .. } => ty.clone(),
            Op::Phi { ty, .. } => ty.clone(),
            Op::ICmp { ty, .. } => ty.bool_like(),
            Op::Store { .. } => Type::Void,
            Op::Gep { elem, .. } => elem.ptr_to(),
            Op::Call { ret, .. } => ret.clone(),
            Op::Shuffle { ty, mask, .. } => Type::vector(mask.len() as u32, ty.element().clone()),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Op::Binary { lhs, rhs, .. } | Op::ICmp { lhs, rhs, .. } => vec![lhs, rhs],
            Op::Shuffle { lhs, rhs, .. } => vec![lhs, rhs],
            Op::Select {
                cond,
                on_true,
                on_false,
                ..
            } => vec![cond, on_true, on_false],
            Op::Load { ptr, .. } => vec![ptr],
            Op::Store { value, ptr, .. } => vec![value, ptr],
            Op::Gep { base, index, .. } => vec![base, index],
            Op::Call { args, .. } => args.iter_mut().map(|(_, v)| v).collect(),
            Op::Phi { incoming, .. } => incoming.iter_mut().map(|(v, _)| v).collect(),
        }
    }

    pub fn callee(&self) -> Option<&str> {
        match self {
            Op::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inst {
    pub result: Option<String>,
    pub op: Op,
}

impl Inst {
    pub fn new(result: Option<String>, op: Op) -> Self {
        Inst { result, op }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    Ret(Option<(Type, Value)>),
    Br(String),
    CondBr {
        cond: Value,
        then_dest: String,
        else_dest: String,
    },
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Terminator::Br(dest) => vec![dest],
            Terminator::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![then_dest, else_dest],
            Terminator::Ret(_) | Terminator::Unreachable => Vec::new(),
        }
    }

    pub fn successors_mut(&mut self) -> Vec<&mut String> {
        match self {
            Terminator::Br(dest) => vec![dest],
            Terminator::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![then_dest, else_dest],
            Terminator::Ret(_) | Terminator::Unreachable => Vec::new(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Terminator::Ret(Some((_, v))) => vec![v],
            Terminator::CondBr { cond, .. } => vec![cond],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub term: Terminator,
}

// ── Functions ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Param {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Linkage {
    #[default]
    External,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FnAttrs {
    pub always_inline: bool,
    pub no_inline: bool,
}

/// A function definition, or a declaration when `blocks` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub ret: Type,
    pub params: Vec<Param>,
    pub linkage: Linkage,
    pub attrs: FnAttrs,
    pub blocks: Vec<Block>,
}

impl Function {
    /// A body-less external declaration.
    pub fn declaration(name: impl Into<String>, ret: Type, params: Vec<Param>) -> Self {
        Function {
            name: name.into(),
            ret,
            params,
            linkage: Linkage::External,
            attrs: FnAttrs::default(),
            blocks: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Drop the body, turning the function into a declaration.
    pub fn delete_body(&mut self) {
        self.blocks.clear();
    }

    pub fn param_types(&self) -> Vec<Type> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    /// Instructions plus terminators.
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len() + 1).sum()
    }

    /// Positions `(block, inst)` of every call instruction, in body order.
    pub fn call_sites(&self) -> Vec<(usize, usize)> {
        let mut sites = Vec::new();
        for (bi, block) in self.blocks.iter().enumerate() {
            for (ii, inst) in block.insts.iter().enumerate() {
                if inst.op.callee().is_some() {
                    sites.push((bi, ii));
                }
            }
        }
        sites
    }

    /// Distinct callee names in first-call order.
    pub fn callees(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for block in &self.blocks {
            for inst in &block.insts {
                if let Some(callee) = inst.op.callee() {
                    if seen.insert(callee) {
                        out.push(callee.to_string());
                    }
                }
            }
        }
        out
    }

    /// Every name in the function's local namespace: params, results, labels.
    pub fn local_names(&self) -> HashSet<String> {
        let mut names: HashSet<String> = self.params.iter().map(|p| p.name.clone()).collect();
        for block in &self.blocks {
            names.insert(block.label.clone());
            for inst in &block.insts {
                if let Some(r) = &inst.result {
                    names.insert(r.clone());
                }
            }
        }
        names
    }

    pub fn block_index(&self, label: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }

    /// Number of references to `symbol` (call targets and global operands).
    pub fn uses_of(&self, symbol: &str) -> usize {
        let mut count = 0;
        for block in &self.blocks {
            for inst in &block.insts {
                if inst.op.callee() == Some(symbol) {
                    count += 1;
                }
                let mut op = inst.op.clone();
                count += op
                    .operands_mut()
                    .into_iter()
                    .filter(|v| matches!(v, Value::Global(g) if g == symbol))
                    .count();
            }
            if let Terminator::Ret(Some((_, Value::Global(g)))) = &block.term {
                if g == symbol {
                    count += 1;
                }
            }
        }
        count
    }

    /// Redirect every reference to `from` at `to`. Returns the number rewritten.
    pub fn replace_uses_of_global(&mut self, from: &str, to: &str) -> usize {
        let mut count = 0;
        for block in &mut self.blocks {
            for inst in &mut block.insts {
                if let Op::Call { callee, .. } = &mut inst.op {
                    if callee == from {
                        *callee = to.to_string();
                        count += 1;
                    }
                }
                for v in inst.op.operands_mut() {
                    if matches!(v, Value::Global(g) if g == from) {
                        *v = Value::Global(to.to_string());
                        count += 1;
                    }
                }
            }
            for v in block.term.operands_mut() {
                if matches!(v, Value::Global(g) if g == from) {
                    *v = Value::Global(to.to_string());
                    count += 1;
                }
            }
        }
        count
    }

    /// Substitute every use of local `name` with `with`.
    pub fn replace_local_uses(&mut self, name: &str, with: &Value) {
        for block in &mut self.blocks {
            for inst in &mut block.insts {
                for v in inst.op.operands_mut() {
                    if v.as_local() == Some(name) {
                        *v = with.clone();
                    }
                }
            }
            for v in block.term.operands_mut() {
                if v.as_local() == Some(name) {
                    *v = with.clone();
                }
            }
        }
    }
}

// ── Metadata ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MdOperand {
    Function(String),
    Str(String),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdNode(pub Vec<MdOperand>);

impl MdNode {
    pub fn function(name: impl Into<String>) -> Self {
        MdNode(vec![MdOperand::Function(name.into())])
    }
}

// ── Module ─────────────────────────────────────────────────────────────────

/// Errors returned by module symbol-table operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol '{0}' is already defined in the module")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    functions: IndexMap<String, Function>,
    named_metadata: IndexMap<String, Vec<MdNode>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            functions: IndexMap::new(),
            named_metadata: IndexMap::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.functions.values_mut()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Add a function. Symbols are never silently renamed: a clash is an error.
    pub fn add_function(&mut self, function: Function) -> Result<&mut Function, SymbolError> {
        if self.functions.contains_key(&function.name) {
            return Err(SymbolError::Duplicate(function.name));
        }
        let name = function.name.clone();
        let (idx, _) = self.functions.insert_full(name, function);
        Ok(&mut self.functions[idx])
    }

    /// Remove a function, preserving the order of the remaining ones.
    pub fn remove_function(&mut self, name: &str) -> Option<Function> {
        self.functions.shift_remove(name)
    }

    /// References to `symbol` from function bodies (metadata excluded).
    pub fn uses_of(&self, symbol: &str) -> usize {
        self.functions.values().map(|f| f.uses_of(symbol)).sum()
    }

    /// Redirect every body reference to `from` at `to`.
    pub fn replace_all_uses_with(&mut self, from: &str, to: &str) -> usize {
        self.functions
            .values_mut()
            .map(|f| f.replace_uses_of_global(from, to))
            .sum()
    }

    pub fn named_metadata(&self, name: &str) -> Option<&[MdNode]> {
        self.named_metadata.get(name).map(|v| v.as_slice())
    }

    pub fn get_or_insert_named_metadata(&mut self, name: &str) -> &mut Vec<MdNode> {
        self.named_metadata.entry(name.to_string()).or_default()
    }

    pub fn named_metadata_iter(&self) -> impl Iterator<Item = (&str, &[MdNode])> {
        self.named_metadata
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// True when some metadata node references function `name`.
    pub fn is_referenced_by_metadata(&self, name: &str) -> bool {
        self.named_metadata.values().flatten().any(|node| {
            node.0
                .iter()
                .any(|op| matches!(op, MdOperand::Function(f) if f == name))
        })
    }

    /// SHA-256 of the canonical text form.
    pub fn fingerprint(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }

    pub fn fingerprint_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in self.fingerprint() {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
        }
        s
    }
}

// ── Display ────────────────────────────────────────────────────────────────

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(r) = &self.result {
            write!(f, "%{} = ", r)?;
        }
        match &self.op {
            Op::Binary { op, ty, lhs, rhs } => {
                write!(f, "{} {} {}, {}", op.mnemonic(), ty, lhs, rhs)
            }
            Op::ICmp { pred, ty, lhs, rhs } => {
                write!(f, "icmp {} {} {}, {}", pred.mnemonic(), ty, lhs, rhs)
            }
            Op::Select {
                ty,
                cond,
                on_true,
                on_false,
            } => write!(f, "select {} {}, {}, {}", ty, cond, on_true, on_false),
            Op::Load { ty, ptr } => write!(f, "load {}, {}", ty, ptr),
            Op::Store { ty, value, ptr } => write!(f, "store {} {}, {}", ty, value, ptr),
            Op::Gep {
                elem,
                base,
                index,
                inbounds,
            } => {
                let ib = if *inbounds { "inbounds " } else { "" };
                write!(f, "getelementptr {}{}, {}, {}", ib, elem, base, index)
            }
            Op::Call { ret, callee, args } => {
                write!(f, "call {} @{}(", ret, callee)?;
                for (i, (ty, v)) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", ty, v)?;
                }
                write!(f, ")")
            }
            Op::Phi { ty, incoming } => {
                write!(f, "phi {} ", ty)?;
                for (i, (v, label)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{}, %{}]", v, label)?;
                }
                Ok(())
            }
            Op::Shuffle { ty, lhs, rhs, mask } => {
                let mask: Vec<String> = mask.iter().map(|m| m.to_string()).collect();
                write!(
                    f,
                    "shufflevector {} {}, {}, [{}]",
                    ty,
                    lhs,
                    rhs,
                    mask.join(", ")
                )
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Ret(None) => write!(f, "ret void"),
            Terminator::Ret(Some((ty, v))) => write!(f, "ret {} {}", ty, v),
            Terminator::Br(dest) => write!(f, "br label %{}", dest),
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
            } => write!(f, "br {}, label %{}, label %{}", cond, then_dest, else_dest),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.is_declaration() {
            "declare"
        } else {
            "define"
        };
        write!(f, "{} ", keyword)?;
        if self.linkage == Linkage::Internal {
            write!(f, "internal ")?;
        }
        write!(f, "{} @{}(", self.ret, self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} %{}", p.ty, p.name)?;
        }
        write!(f, ")")?;
        if self.attrs.always_inline {
            write!(f, " alwaysinline")?;
        }
        if self.attrs.no_inline {
            write!(f, " noinline")?;
        }
        if self.is_declaration() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.insts {
                writeln!(f, "  {}", inst)?;
            }
            writeln!(f, "  {}", block.term)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for MdOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MdOperand::Function(name) => write!(f, "@{}", name),
            MdOperand::Str(s) => {
                let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{}\"", escaped)
            }
            MdOperand::Int(v) => write!(f, "{}", v),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let escaped = self.name.replace('\\', "\\\\").replace('"', "\\\"");
        writeln!(f, "source_filename = \"{}\"", escaped)?;
        for function in self.functions.values() {
            writeln!(f)?;
            write!(f, "{}", function)?;
        }
        if !self.named_metadata.is_empty() {
            writeln!(f)?;
        }
        for (name, nodes) in &self.named_metadata {
            write!(f, "!{} = !{{", name)?;
            for (i, node) in nodes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "!{{")?;
                for (j, op) in node.0.iter().enumerate() {
                    if j > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", op)?;
                }
                write!(f, "}}")?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
