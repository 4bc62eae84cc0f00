// Lexer for the textual kernel IR (`.ll`-style modules and built-ins libraries).
//
// Uses the `logos` crate for DFA-based lexing. There is no generic identifier
// token: a bare word is a keyword, a type, an opcode, or a block label
// (`name:`). Symbol names always carry a sigil (`%`, `@`, `!`).
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::ir::{BinOp, CmpPred};

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// IR token types.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|;[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("source_filename")]
    SourceFilename,
    #[token("define")]
    Define,
    #[token("declare")]
    Declare,
    #[token("internal")]
    Internal,
    #[token("alwaysinline")]
    AlwaysInline,
    #[token("noinline")]
    NoInline,
    #[token("label")]
    LabelKw,
    #[token("null")]
    Null,
    #[token("undef")]
    Undef,
    #[token("x")]
    X,

    // ── Types ──
    #[token("void")]
    Void,
    #[token("float")]
    Float,
    #[token("double")]
    Double,
    #[regex(r"i[0-9]+", parse_int_type)]
    IntTy(u32),

    // ── Opcodes ──
    #[token("add", |_| BinOp::Add)]
    #[token("sub", |_| BinOp::Sub)]
    #[token("mul", |_| BinOp::Mul)]
    #[token("sdiv", |_| BinOp::SDiv)]
    #[token("udiv", |_| BinOp::UDiv)]
    #[token("srem", |_| BinOp::SRem)]
    #[token("urem", |_| BinOp::URem)]
    #[token("fadd", |_| BinOp::FAdd)]
    #[token("fsub", |_| BinOp::FSub)]
    #[token("fmul", |_| BinOp::FMul)]
    #[token("fdiv", |_| BinOp::FDiv)]
    #[token("and", |_| BinOp::And)]
    #[token("or", |_| BinOp::Or)]
    #[token("xor", |_| BinOp::Xor)]
    #[token("shl", |_| BinOp::Shl)]
    Bin(BinOp),

    #[token("eq", |_| CmpPred::Eq)]
    #[token("ne", |_| CmpPred::Ne)]
    #[token("slt", |_| CmpPred::Slt)]
    #[token("sle", |_| CmpPred::Sle)]
    #[token("sgt", |_| CmpPred::Sgt)]
    #[token("sge", |_| CmpPred::Sge)]
    #[token("ult", |_| CmpPred::Ult)]
    #[token("ule", |_| CmpPred::Ule)]
    #[token("ugt", |_| CmpPred::Ugt)]
    #[token("uge", |_| CmpPred::Uge)]
    Pred(CmpPred),

    #[token("icmp")]
    Icmp,
    #[token("select")]
    Select,
    #[token("load")]
    Load,
    #[token("store")]
    Store,
    #[token("getelementptr")]
    Getelementptr,
    #[token("inbounds")]
    Inbounds,
    #[token("call")]
    Call,
    #[token("phi")]
    Phi,
    #[token("shufflevector")]
    Shufflevector,
    #[token("ret")]
    Ret,
    #[token("br")]
    Br,
    #[token("unreachable")]
    Unreachable,

    // ── Symbols ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("*")]
    Star,
    #[token("!{")]
    MetaOpen,

    // ── Names ──
    /// `%name`: a local value, or a named type in type position.
    #[regex(r"%[A-Za-z0-9_.]+", strip_sigil)]
    Local(String),
    /// `@name`: a module-level symbol.
    #[regex(r"@[A-Za-z0-9_.$]+", strip_sigil)]
    Global(String),
    /// `!name`: a named metadata list.
    #[regex(r"![A-Za-z_.][A-Za-z0-9_.]*", strip_sigil)]
    MetaName(String),
    /// `name:` at the head of a basic block.
    #[regex(r"[A-Za-z0-9_.]+:", strip_colon)]
    BlockLabel(String),

    // ── Literals ──
    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"-?[0-9]+[eE][+-]?[0-9]+", parse_float)]
    #[token("nan", |_| f64::NAN)]
    #[token("inf", |_| f64::INFINITY)]
    #[token("-inf", |_| f64::NEG_INFINITY)]
    FloatLit(f64),

    #[regex(r"-?[0-9]+", parse_int)]
    IntLit(i64),

    /// String literal with `\"` and `\\` escapes.
    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    Str(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::SourceFilename => write!(f, "source_filename"),
            Token::Define => write!(f, "define"),
            Token::Declare => write!(f, "declare"),
            Token::Internal => write!(f, "internal"),
            Token::AlwaysInline => write!(f, "alwaysinline"),
            Token::NoInline => write!(f, "noinline"),
            Token::LabelKw => write!(f, "label"),
            Token::Null => write!(f, "null"),
            Token::Undef => write!(f, "undef"),
            Token::X => write!(f, "x"),
            Token::Void => write!(f, "void"),
            Token::Float => write!(f, "float"),
            Token::Double => write!(f, "double"),
            Token::IntTy(bits) => write!(f, "i{bits}"),
            Token::Bin(op) => write!(f, "{}", op.mnemonic()),
            Token::Pred(p) => write!(f, "{}", p.mnemonic()),
            Token::Icmp => write!(f, "icmp"),
            Token::Select => write!(f, "select"),
            Token::Load => write!(f, "load"),
            Token::Store => write!(f, "store"),
            Token::Getelementptr => write!(f, "getelementptr"),
            Token::Inbounds => write!(f, "inbounds"),
            Token::Call => write!(f, "call"),
            Token::Phi => write!(f, "phi"),
            Token::Shufflevector => write!(f, "shufflevector"),
            Token::Ret => write!(f, "ret"),
            Token::Br => write!(f, "br"),
            Token::Unreachable => write!(f, "unreachable"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Star => write!(f, "*"),
            Token::MetaOpen => write!(f, "!{{"),
            Token::Local(name) => write!(f, "%{name}"),
            Token::Global(name) => write!(f, "@{name}"),
            Token::MetaName(name) => write!(f, "!{name}"),
            Token::BlockLabel(name) => write!(f, "{name}:"),
            Token::FloatLit(v) => write!(f, "{v:?}"),
            Token::IntLit(v) => write!(f, "{v}"),
            Token::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

// ── Callbacks ──

fn parse_int_type(lex: &mut logos::Lexer<'_, Token>) -> Option<u32> {
    let bits: u32 = lex.slice()[1..].parse().ok()?;
    (1..=128).contains(&bits).then_some(bits)
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn strip_sigil(lex: &mut logos::Lexer<'_, Token>) -> String {
    lex.slice()[1..].to_string()
}

fn strip_colon(lex: &mut logos::Lexer<'_, Token>) -> String {
    let slice = lex.slice();
    slice[..slice.len() - 1].to_string()
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                '"' => result.push('"'),
                '\\' => result.push('\\'),
                _ => return None,
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

/// Lex IR source text into tokens.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──
