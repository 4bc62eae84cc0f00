// indexed.rs — Indexed function synthesis
//
// The indexed form of a kernel (or wrapper) has the same signature as its
// target. Its body fetches the work-item index once and offsets the
// per-element arguments by it before delegating to the target:
//
//   in  -> getelementptr inbounds in, id     (inElement)
//   out -> getelementptr inbounds out, id    (outElement)
//   usr -> forwarded
//   x   -> x + id                            (currentX)
//   y   -> forwarded
//
// Arguments are consumed in that fixed order, filtered by signature bits.

use std::collections::HashSet;

use crate::builder::FunctionBuilder;
use crate::error::SynthError;
use crate::ir::{Function, Module, Type, Value};
use crate::naming::indexed_name;
use crate::signature::Signature;

/// Mark every function reachable from `root` (and `root` itself) always-inline.
///
/// Callees are followed only when the module has a symbol for them;
/// declarations are marked but have nothing to walk.
pub fn mark_to_inline_called_functions(module: &mut Module, root: &str) {
    let mut visited: HashSet<String> = HashSet::new();
    let mut worklist = vec![root.to_string()];

    while let Some(name) = worklist.pop() {
        if !visited.insert(name.clone()) {
            continue;
        }
        let callees = match module.function(&name) {
            Some(f) => f.callees(),
            None => continue,
        };
        for callee in callees {
            if let Some(f) = module.function_mut(&callee) {
                f.attrs.always_inline = true;
                if !visited.contains(&callee) {
                    worklist.push(callee);
                }
            }
        }
    }

    if let Some(f) = module.function_mut(root) {
        f.attrs.always_inline = true;
    }
}

/// Build `<target>.indexed`. Returns its name.
///
/// Panics if the signature does not account for exactly the target's
/// parameters, or if a per-element parameter is not a pointer.
pub fn create_indexed(
    module: &mut Module,
    target_name: &str,
    signature: Signature,
    index_fn: &str,
) -> Result<String, SynthError> {
    let name = indexed_name(target_name);
    if module.function(&name).is_some() {
        return Err(SynthError::NameCollision(name));
    }
    if module.function(target_name).is_none() {
        return Err(SynthError::MissingFunction(target_name.to_string()));
    }
    let index_ret = match module.function(index_fn) {
        Some(f) => f.ret.clone(),
        None => return Err(SynthError::MissingFunction(index_fn.to_string())),
    };
    assert!(
        !index_ret.is_void(),
        "index function '{}' must return the work-item index",
        index_fn
    );

    mark_to_inline_called_functions(module, target_name);

    let target = match module.function(target_name) {
        Some(f) => f.clone(),
        None => return Err(SynthError::MissingFunction(target_name.to_string())),
    };

    let mut indexed = Function::declaration(name.clone(), target.ret.clone(), target.params.clone());
    indexed.linkage = target.linkage;

    {
        let mut b = FunctionBuilder::new(&mut indexed);
        b.append_block("init");
        let Some(id) = b.call(index_ret.clone(), index_fn, Vec::new(), "id") else {
            unreachable!("non-void call yields a value");
        };

        let params = &target.params;
        let mut next = 0usize;
        let mut args: Vec<(Type, Value)> = Vec::new();

        let element = |b: &mut FunctionBuilder<'_>, next: &mut usize, hint: &str| {
            let p = &params[*next];
            *next += 1;
            let elem = match p.ty.pointee() {
                Some(elem) => elem.clone(),
                None => panic!(
                    "parameter '{}' of '{}' must be a pointer to be indexed",
                    p.name, target.name
                ),
            };
            let v = b.inbounds_gep(elem, Value::local(&p.name), id.clone(), hint);
            (p.ty.clone(), v)
        };

        let wanted = [
            signature.has_input(),
            signature.has_output(),
            signature.has_user_data(),
            signature.has_x(),
            signature.has_y(),
        ]
        .iter()
        .filter(|w| **w)
        .count();
        assert_eq!(
            wanted,
            params.len(),
            "signature {} of '{}' does not match its {} parameters",
            signature,
            target.name,
            params.len()
        );

        if signature.has_input() {
            args.push(element(&mut b, &mut next, "inElement"));
        }
        if signature.has_output() {
            args.push(element(&mut b, &mut next, "outElement"));
        }
        if signature.has_user_data() {
            let p = &params[next];
            next += 1;
            args.push((p.ty.clone(), Value::local(&p.name)));
        }
        if signature.has_x() {
            let p = &params[next];
            next += 1;
            let x = b.add(p.ty.clone(), Value::local(&p.name), id.clone(), "currentX");
            args.push((p.ty.clone(), x));
        }
        if signature.has_y() {
            let p = &params[next];
            next += 1;
            args.push((p.ty.clone(), Value::local(&p.name)));
        }
        assert_eq!(next, params.len());

        let result = b.call(target.ret.clone(), &target.name, args, "ret");
        match result {
            Some(v) => b.ret(Some((target.ret.clone(), v))),
            None => b.ret_void(),
        }
    }

    module
        .add_function(indexed)
        .map_err(|_| SynthError::NameCollision(name.clone()))?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_fn::{create_index_function, INDEX_FUNCTION_NAME};
    use crate::parser::parse;

    fn module(source: &str) -> Module {
        let result = parse(source, "test");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let mut m = result.module.unwrap();
        create_index_function(&mut m).unwrap();
        m
    }

    #[test]
    fn full_signature_body() {
        let mut m = module(
            "define void @k(float* %in, float* %out, i8* %usr, i32 %x, i32 %y) {\n\
             entry:\n\
               ret void\n\
             }",
        );
        let sig = Signature::from_bits(0x1f);
        let name = create_indexed(&mut m, "k", sig, INDEX_FUNCTION_NAME).unwrap();
        assert_eq!(name, "k.indexed");
        insta::assert_snapshot!(m.function(&name).unwrap().to_string(), @r"
        define void @k.indexed(float* %in, float* %out, i8* %usr, i32 %x, i32 %y) {
        init:
          %id = call i32 @get.id()
          %inElement = getelementptr inbounds float, %in, %id
          %outElement = getelementptr inbounds float, %out, %id
          %currentX = add i32 %x, %id
          call void @k(float* %inElement, float* %outElement, i8* %usr, i32 %currentX, i32 %y)
          ret void
        }
        ");
    }

    #[test]
    fn single_index_fetch() {
        let mut m = module(
            "define void @k(i32* %in, i32* %out) {\n\
             entry:\n\
               ret void\n\
             }",
        );
        let name = create_indexed(
            &mut m,
            "k",
            Signature::INPUT | Signature::OUTPUT,
            INDEX_FUNCTION_NAME,
        )
        .unwrap();
        let f = m.function(&name).unwrap();
        assert_eq!(f.uses_of(INDEX_FUNCTION_NAME), 1);
    }

    #[test]
    fn returns_target_result() {
        let mut m = module(
            "define i32 @k(i32 %x) {\n\
             entry:\n\
               ret i32 %x\n\
             }",
        );
        let name = create_indexed(&mut m, "k", Signature::X, INDEX_FUNCTION_NAME).unwrap();
        let f = m.function(&name).unwrap();
        assert_eq!(f.ret, Type::i32());
        assert!(matches!(
            &f.blocks[0].term,
            crate::ir::Terminator::Ret(Some((Type::Int(32), Value::Local(r)))) if r == "ret"
        ));
    }

    #[test]
    fn marks_reachable_functions() {
        let mut m = module(
            "define void @k(i32 %x) {\n\
             entry:\n\
               call void @helper(i32 %x)\n\
               ret void\n\
             }\n\
             define void @helper(i32 %v) {\n\
             entry:\n\
               call void @helper2(i32 %v)\n\
               call void @_Z3absi(i32 %v)\n\
               ret void\n\
             }\n\
             define void @helper2(i32 %v) {\n\
             entry:\n\
               call void @helper(i32 %v)\n\
               ret void\n\
             }\n\
             declare void @_Z3absi(i32 %v)\n\
             define void @unrelated() {\n\
             entry:\n\
               ret void\n\
             }",
        );
        create_indexed(&mut m, "k", Signature::X, INDEX_FUNCTION_NAME).unwrap();
        for name in ["k", "helper", "helper2", "_Z3absi"] {
            assert!(m.function(name).unwrap().attrs.always_inline, "{name}");
        }
        assert!(!m.function("unrelated").unwrap().attrs.always_inline);
        assert!(!m.function(INDEX_FUNCTION_NAME).unwrap().attrs.always_inline);
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn arity_mismatch_panics() {
        let mut m = module(
            "define void @k(i32 %x, i32 %extra) {\n\
             entry:\n\
               ret void\n\
             }",
        );
        let _ = create_indexed(&mut m, "k", Signature::X, INDEX_FUNCTION_NAME);
    }

    #[test]
    #[should_panic(expected = "must be a pointer")]
    fn non_pointer_input_panics() {
        let mut m = module(
            "define void @k(i32 %in) {\n\
             entry:\n\
               ret void\n\
             }",
        );
        let _ = create_indexed(&mut m, "k", Signature::INPUT, INDEX_FUNCTION_NAME);
    }

    #[test]
    #[should_panic(expected = "must return the work-item index")]
    fn void_index_function_panics() {
        let mut m = Module::new("m");
        m.add_function(Function::declaration("k", Type::Void, vec![]))
            .unwrap();
        m.add_function(Function::declaration("get.id", Type::Void, vec![]))
            .unwrap();
        let _ = create_indexed(&mut m, "k", Signature::default(), "get.id");
    }

    #[test]
    fn missing_index_function() {
        let mut m = Module::new("m");
        m.add_function(Function::declaration("k", Type::Void, vec![]))
            .unwrap();
        assert_eq!(
            create_indexed(&mut m, "k", Signature::default(), "get.id"),
            Err(SynthError::MissingFunction("get.id".into()))
        );
    }
}
