// Parser for the textual kernel IR.
//
// Parses a token stream (from the lexer) into an `ir::Module`. Uses chumsky
// combinators. The accepted grammar is exactly what `ir`'s `Display` impls
// print, so printed modules parse back unchanged.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns a module plus any parse errors (non-fatal).
// Failure modes: syntax errors and duplicate symbols produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ir::{
    Block, Constant, FnAttrs, Function, Inst, Linkage, MdNode, MdOperand, Module, Op, Param,
    Terminator, Type, Value,
};
use crate::lexer::Token;

/// Result of parsing: module plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub module: Option<Module>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Top-level entries, in source order.
enum Item {
    Function(Function, SimpleSpan),
    Metadata(String, Vec<MdNode>),
}

/// Parse IR source text. Lexes then parses.
///
/// `default_name` names the module when the text has no `source_filename`.
pub fn parse(source: &str, default_name: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = module_parser();
    let (items, parse_errors) = parser.parse(stream).into_output_errors();

    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    let module = items.map(|(name, items)| {
        let mut module = Module::new(name.unwrap_or_else(|| default_name.to_string()));
        for item in items {
            match item {
                Item::Function(function, span) => {
                    if let Err(e) = module.add_function(function) {
                        all_errors.push(Rich::custom(span, e.to_string()));
                    }
                }
                Item::Metadata(name, nodes) => {
                    module.get_or_insert_named_metadata(&name).extend(nodes);
                }
            }
        }
        module
    });

    ParseResult {
        module,
        errors: all_errors,
    }
}

// ── Grammar ──

fn module_parser<'tokens, I>(
) -> impl Parser<'tokens, I, (Option<String>, Vec<Item>), extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let comma = just(Token::Comma);

    let local_name = select! { Token::Local(name) => name };
    let global_name = select! { Token::Global(name) => name };

    // ── Types ──

    let ty = recursive(|ty| {
        let base = select! {
            Token::Void => Type::Void,
            Token::Float => Type::Float,
            Token::Double => Type::Double,
            Token::IntTy(bits) => Type::Int(bits),
            Token::Local(name) => Type::Named(name),
        };
        let vector = select! { Token::IntLit(n) if n > 0 => n as u32 }
            .then_ignore(just(Token::X))
            .then(ty)
            .delimited_by(just(Token::Lt), just(Token::Gt))
            .map(|(lanes, elem)| Type::vector(lanes, elem));
        base.or(vector)
            .then(just(Token::Star).repeated().collect::<Vec<_>>())
            .map(|(t, stars)| stars.iter().fold(t, |t, _| t.ptr_to()))
    })
    .boxed();

    // ── Values ──

    let constant = recursive(|constant| {
        let scalar = select! {
            Token::IntLit(v) => Constant::Int(v),
            Token::FloatLit(v) => Constant::Float(v),
            Token::Null => Constant::Null,
            Token::Undef => Constant::Undef,
        };
        let vector = constant
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just(Token::Lt), just(Token::Gt))
            .map(Constant::Vector);
        scalar.or(vector)
    });

    let value = select! {
        Token::Local(name) => Value::Local(name),
        Token::Global(name) => Value::Global(name),
    }
    .or(constant.map(Value::Const))
    .boxed();

    let typed_value = ty.clone().then(value.clone());
    let label_ref = just(Token::LabelKw).ignore_then(local_name.clone());

    // ── Instructions ──

    let binary = select! { Token::Bin(op) => op }
        .then(ty.clone())
        .then(value.clone())
        .then_ignore(comma.clone())
        .then(value.clone())
        .map(|(((op, ty), lhs), rhs)| Op::Binary { op, ty, lhs, rhs });

    let icmp = just(Token::Icmp)
        .ignore_then(select! { Token::Pred(p) => p })
        .then(ty.clone())
        .then(value.clone())
        .then_ignore(comma.clone())
        .then(value.clone())
        .map(|(((pred, ty), lhs), rhs)| Op::ICmp { pred, ty, lhs, rhs });

    let select_op = just(Token::Select)
        .ignore_then(ty.clone())
        .then(value.clone())
        .then_ignore(comma.clone())
        .then(value.clone())
        .then_ignore(comma.clone())
        .then(value.clone())
        .map(|(((ty, cond), on_true), on_false)| Op::Select {
            ty,
            cond,
            on_true,
            on_false,
        });

    let load = just(Token::Load)
        .ignore_then(ty.clone())
        .then_ignore(comma.clone())
        .then(value.clone())
        .map(|(ty, ptr)| Op::Load { ty, ptr });

    let store = just(Token::Store)
        .ignore_then(ty.clone())
        .then(value.clone())
        .then_ignore(comma.clone())
        .then(value.clone())
        .map(|((ty, value), ptr)| Op::Store { ty, value, ptr });

    let gep = just(Token::Getelementptr)
        .ignore_then(just(Token::Inbounds).or_not().map(|ib| ib.is_some()))
        .then(ty.clone())
        .then_ignore(comma.clone())
        .then(value.clone())
        .then_ignore(comma.clone())
        .then(value.clone())
        .map(|(((inbounds, elem), base), index)| Op::Gep {
            elem,
            base,
            index,
            inbounds,
        });

    let call = just(Token::Call)
        .ignore_then(ty.clone())
        .then(global_name.clone())
        .then(
            typed_value
                .clone()
                .separated_by(comma.clone())
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map(|((ret, callee), args)| Op::Call { ret, callee, args });

    let phi = just(Token::Phi)
        .ignore_then(ty.clone())
        .then(
            value
                .clone()
                .then_ignore(comma.clone())
                .then(local_name.clone())
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .separated_by(comma.clone())
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map(|(ty, incoming)| Op::Phi { ty, incoming });

    let shuffle = just(Token::Shufflevector)
        .ignore_then(ty.clone())
        .then(value.clone())
        .then_ignore(comma.clone())
        .then(value.clone())
        .then_ignore(comma.clone())
        .then(
            select! { Token::IntLit(m) if m >= 0 => m as u32 }
                .separated_by(comma.clone())
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBracket), just(Token::RBracket)),
        )
        .map(|(((ty, lhs), rhs), mask)| Op::Shuffle { ty, lhs, rhs, mask });

    let op = choice((
        binary, icmp, select_op, load, store, gep, call, phi, shuffle,
    ));

    let inst = local_name
        .clone()
        .then_ignore(just(Token::Equals))
        .or_not()
        .then(op)
        .map(|(result, op)| Inst::new(result, op));

    // ── Terminators ──

    let ret = just(Token::Ret)
        .ignore_then(
            just(Token::Void)
                .to(None)
                .or(typed_value.clone().map(Some)),
        )
        .map(Terminator::Ret);

    let br = just(Token::Br).ignore_then(
        label_ref.clone().map(Terminator::Br).or(value
            .clone()
            .then_ignore(comma.clone())
            .then(label_ref.clone())
            .then_ignore(comma.clone())
            .then(label_ref.clone())
            .map(|((cond, then_dest), else_dest)| Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
            })),
    );

    let terminator = choice((
        ret,
        br,
        just(Token::Unreachable).to(Terminator::Unreachable),
    ));

    let block = select! { Token::BlockLabel(label) => label }
        .then(inst.repeated().collect::<Vec<_>>())
        .then(terminator)
        .map(|((label, insts), term)| Block { label, insts, term });

    // ── Functions ──

    let param = ty
        .clone()
        .then(local_name)
        .map(|(ty, name)| Param { name, ty });

    let attrs = select! {
        Token::AlwaysInline => (true, false),
        Token::NoInline => (false, true),
    }
    .repeated()
    .collect::<Vec<_>>()
    .map(|flags| FnAttrs {
        always_inline: flags.iter().any(|f| f.0),
        no_inline: flags.iter().any(|f| f.1),
    });

    let header = just(Token::Internal)
        .or_not()
        .map(|i| {
            if i.is_some() {
                Linkage::Internal
            } else {
                Linkage::External
            }
        })
        .then(ty.clone())
        .then(global_name)
        .then(
            param
                .separated_by(comma.clone())
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then(attrs)
        .map(|((((linkage, ret), name), params), attrs)| Function {
            name,
            ret,
            params,
            linkage,
            attrs,
            blocks: Vec::new(),
        });

    let define = just(Token::Define)
        .ignore_then(header.clone())
        .then(
            block
                .repeated()
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map_with(|(mut function, blocks), e| {
            function.blocks = blocks;
            Item::Function(function, e.span())
        });

    let declare = just(Token::Declare)
        .ignore_then(header)
        .map_with(|function, e| Item::Function(function, e.span()));

    // ── Metadata ──

    let md_operand = select! {
        Token::Global(name) => MdOperand::Function(name),
        Token::Str(s) => MdOperand::Str(s),
        Token::IntLit(v) => MdOperand::Int(v),
    };

    let md_node = md_operand
        .separated_by(comma.clone())
        .collect::<Vec<_>>()
        .delimited_by(just(Token::MetaOpen), just(Token::RBrace))
        .map(MdNode);

    let named_metadata = select! { Token::MetaName(name) => name }
        .then_ignore(just(Token::Equals))
        .then(
            md_node
                .separated_by(comma)
                .collect::<Vec<_>>()
                .delimited_by(just(Token::MetaOpen), just(Token::RBrace)),
        )
        .map(|(name, nodes)| Item::Metadata(name, nodes));

    // ── Module ──

    let source_filename = just(Token::SourceFilename)
        .ignore_then(just(Token::Equals))
        .ignore_then(select! { Token::Str(s) => s });

    source_filename
        .or_not()
        .then(
            choice((define, declare, named_metadata))
                .repeated()
                .collect::<Vec<_>>(),
        )
        .then_ignore(end())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, CmpPred};

    fn parse_ok(source: &str) -> Module {
        let result = parse(source, "test");
        assert!(
            result.errors.is_empty(),
            "unexpected parse errors: {:?}",
            result.errors
        );
        result.module.expect("module should parse")
    }

    #[test]
    fn empty_module() {
        let m = parse_ok("");
        assert_eq!(m.name, "test");
        assert!(m.is_empty());
    }

    #[test]
    fn source_filename_names_module() {
        let m = parse_ok("source_filename = \"kernels.rs\"");
        assert_eq!(m.name, "kernels.rs");
    }

    #[test]
    fn declaration() {
        let m = parse_ok("declare float @_Z3cosf(float %x)");
        let f = m.function("_Z3cosf").unwrap();
        assert!(f.is_declaration());
        assert_eq!(f.ret, Type::Float);
        assert_eq!(f.params, vec![Param::new("x", Type::Float)]);
    }

    #[test]
    fn definition_with_attrs() {
        let m = parse_ok(
            "define internal <4 x float> @k(<4 x float>* %p, i32 %x) alwaysinline {\n\
             entry:\n\
               %v = load <4 x float>, %p\n\
               ret <4 x float> %v\n\
             }",
        );
        let f = m.function("k").unwrap();
        assert_eq!(f.linkage, Linkage::Internal);
        assert!(f.attrs.always_inline);
        assert!(!f.attrs.no_inline);
        assert_eq!(f.params[0].ty, Type::vector(4, Type::Float).ptr_to());
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(
            f.blocks[0].insts[0].op,
            Op::Load {
                ty: Type::vector(4, Type::Float),
                ptr: Value::local("p"),
            }
        );
    }

    #[test]
    fn every_instruction_form() {
        let m = parse_ok(
            "define i32 @f(i32 %a, i32 %b, i32* %p, <4 x i32> %v) {\n\
             entry:\n\
               %s = add i32 %a, %b\n\
               %d = sdiv i32 %s, 3\n\
               %c = icmp eq i32 %d, 0\n\
               %m = select i32 %c, 1, %d\n\
               %q = getelementptr inbounds i32, %p, %a\n\
               store i32 %m, %q\n\
               %l = load i32, %q\n\
               %sh = shufflevector <4 x i32> %v, undef, [3, 2, 1, 0]\n\
               call void @sink(<4 x i32> %sh)\n\
               br %c, label %yes, label %no\n\
             yes:\n\
               br label %no\n\
             no:\n\
               %r = phi i32 [%l, %entry], [0, %yes]\n\
               ret i32 %r\n\
             }\n\
             declare void @sink(<4 x i32> %x)",
        );
        let f = m.function("f").unwrap();
        assert_eq!(f.blocks.len(), 3);
        let insts = &f.blocks[0].insts;
        assert!(matches!(insts[1].op, Op::Binary { op: BinOp::SDiv, .. }));
        assert!(matches!(insts[2].op, Op::ICmp { pred: CmpPred::Eq, .. }));
        assert!(matches!(insts[4].op, Op::Gep { inbounds: true, .. }));
        assert!(insts[5].result.is_none());
        assert!(matches!(&insts[7].op, Op::Shuffle { mask, .. } if mask == &vec![3, 2, 1, 0]));
        assert!(insts[8].result.is_none());
        assert_eq!(
            f.blocks[0].term,
            Terminator::CondBr {
                cond: Value::local("c"),
                then_dest: "yes".into(),
                else_dest: "no".into(),
            }
        );
        assert!(matches!(&f.blocks[2].insts[0].op, Op::Phi { incoming, .. } if incoming.len() == 2));
    }

    #[test]
    fn vector_constants() {
        let m = parse_ok(
            "define <2 x i32> @f() {\n\
             entry:\n\
               ret <2 x i32> <1, -2>\n\
             }",
        );
        assert_eq!(
            m.function("f").unwrap().blocks[0].term,
            Terminator::Ret(Some((
                Type::vector(2, Type::i32()),
                Value::Const(Constant::Vector(vec![Constant::Int(1), Constant::Int(-2)])),
            )))
        );
    }

    #[test]
    fn named_metadata() {
        let m = parse_ok(
            "!rs.indexed.kernels = !{!{@a.indexed}, !{@b.indexed}}\n\
             !notes = !{!{\"x\", 3}}",
        );
        assert_eq!(
            m.named_metadata("rs.indexed.kernels").unwrap(),
            &[MdNode::function("a.indexed"), MdNode::function("b.indexed")]
        );
        assert_eq!(
            m.named_metadata("notes").unwrap(),
            &[MdNode(vec![MdOperand::Str("x".into()), MdOperand::Int(3)])]
        );
    }

    #[test]
    fn display_round_trips() {
        let source = [
            "source_filename = \"rt\"",
            "",
            "define internal float @k(float %in, i32 %x) alwaysinline {",
            "init:",
            "  %c = call float @_Z3cosf(float %in)",
            "  %f = fmul float %c, 0.5",
            "  ret float %f",
            "}",
            "",
            "declare float @_Z3cosf(float %x)",
            "",
            "!rs.indexed.kernels = !{!{@k}}",
            "",
        ]
        .join("\n");
        let m = parse_ok(&source);
        assert_eq!(m.to_string(), source);
        assert_eq!(parse_ok(&m.to_string()), m);
    }

    #[test]
    fn error_duplicate_symbol() {
        let result = parse(
            "declare void @a()\n\
             declare void @a()",
            "dup",
        );
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].to_string().contains("already defined"));
    }

    #[test]
    fn error_missing_terminator() {
        let result = parse(
            "define void @a() {\n\
             entry:\n\
             }",
            "bad",
        );
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn error_bad_character() {
        let result = parse("declare void @a() #", "bad");
        assert!(!result.errors.is_empty());
    }
}
