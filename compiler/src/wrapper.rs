// wrapper.rs — Canonical wrapper synthesis
//
// A wrapper gives a kernel entry the uniform by-reference convention the
// indexed synthesizer expects: `(in*, out*, rest...) -> void`.
//
// Parameter layout, given kernel parameters `k0, k1, ...`:
//   - has-input: `in*` first, pointing at the kernel's input parameter type
//     (named `p<input name>`);
//   - has-output with a void kernel: the kernel's own first parameter is the
//     output pointer and is forwarded under its own name;
//   - has-output with a non-void kernel: a new `R*` parameter named `out`;
//   - every remaining kernel parameter, unchanged and in order.
// A void kernel with an output pointer takes it first, before the input, so
// the kernel call is `(out, in, rest...)` in that case.
//
// Preconditions: the kernel has the parameters the signature demands.
// Postconditions: `<kernel>.wrapper` exists; the kernel is always-inline.
// Failure modes: missing kernel or an existing wrapper symbol -> `SynthError`;
//   missing parameters are a contract violation (panic).
// Side effects: mutates the module.

use crate::builder::{fresh_name, FunctionBuilder};
use crate::error::SynthError;
use crate::ir::{Function, Module, Param, Type, Value};
use crate::naming::wrapper_name;
use crate::signature::Signature;

/// Build `<kernel>.wrapper`. Returns the wrapper's name.
pub fn create_wrapper(
    module: &mut Module,
    kernel_name: &str,
    signature: Signature,
) -> Result<String, SynthError> {
    let name = wrapper_name(kernel_name);
    if module.function(&name).is_some() {
        return Err(SynthError::NameCollision(name));
    }
    let kernel = module
        .function_mut(kernel_name)
        .ok_or_else(|| SynthError::MissingFunction(kernel_name.to_string()))?;
    kernel.attrs.always_inline = true;
    let kernel = kernel.clone();

    let returns_void = kernel.ret.is_void();
    let out_by_ref = signature.has_output() && returns_void;
    let out_by_ret = signature.has_output() && !returns_void;

    let mut remaining = kernel.params.iter();
    let mut params: Vec<Param> = Vec::new();

    // Output first (if forwarded); input is inserted at the front afterwards.
    let kernel_out = if out_by_ref {
        let p = remaining.next();
        assert!(
            p.is_some(),
            "kernel '{}' has signature {} but no output parameter",
            kernel.name,
            signature
        );
        p.cloned()
    } else {
        None
    };
    let kernel_in = if signature.has_input() {
        let p = remaining.next();
        assert!(
            p.is_some(),
            "kernel '{}' has signature {} but no input parameter",
            kernel.name,
            signature
        );
        p.cloned()
    } else {
        None
    };
    let rest: Vec<Param> = remaining.cloned().collect();

    // Forwarded names are kept as-is; the new input and output pointers yield.
    let mut names: std::collections::HashSet<String> = kernel_out
        .iter()
        .chain(rest.iter())
        .map(|p| p.name.clone())
        .collect();
    if let Some(p) = &kernel_in {
        let name = fresh_name(&mut names, &format!("p{}", p.name));
        params.push(Param::new(name, p.ty.ptr_to()));
    }
    if let Some(p) = &kernel_out {
        params.push(p.clone());
    } else if out_by_ret {
        let name = fresh_name(&mut names, "out");
        params.push(Param::new(name, kernel.ret.ptr_to()));
    }
    params.extend(rest.iter().cloned());

    let mut wrapper = Function::declaration(name.clone(), Type::Void, params);
    wrapper.linkage = kernel.linkage;

    {
        let wrapper_params = wrapper.params.clone();
        let mut slots = wrapper_params.iter();
        let in_slot = kernel_in.as_ref().and_then(|_| slots.next());
        let out_slot = if signature.has_output() {
            slots.next()
        } else {
            None
        };
        let rest_slots: Vec<&Param> = slots.collect();

        let mut b = FunctionBuilder::new(&mut wrapper);
        b.append_block("init");

        let mut args: Vec<(Type, Value)> = Vec::new();
        if let (true, Some(out)) = (out_by_ref, out_slot) {
            args.push((out.ty.clone(), Value::local(&out.name)));
        }
        if let (Some(kin), Some(slot)) = (&kernel_in, in_slot) {
            let input = b.load(kin.ty.clone(), Value::local(&slot.name), "Input");
            args.push((kin.ty.clone(), input));
        }
        for p in rest_slots {
            args.push((p.ty.clone(), Value::local(&p.name)));
        }

        let result = b.call(kernel.ret.clone(), &kernel.name, args, "call");
        if let (true, Some(out), Some(value)) = (out_by_ret, out_slot, result) {
            b.store(kernel.ret.clone(), value, Value::local(&out.name));
        }
        b.ret_void();
    }

    // Checked above; the symbol is still free.
    module
        .add_function(wrapper)
        .map_err(|_| SynthError::NameCollision(name.clone()))?;
    Ok(name)
}

/// Parameter count `create_wrapper` produces for a kernel with `kernel_params`
/// parameters and the given return kind.
pub fn expected_param_count(signature: Signature, kernel_params: usize, returns_void: bool) -> usize {
    let added_out = usize::from(signature.has_output() && !returns_void);
    kernel_params + added_out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn module(source: &str) -> Module {
        let result = parse(source, "test");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        result.module.unwrap()
    }

    fn sig(flags: &[Signature]) -> Signature {
        flags.iter().fold(Signature::default(), |acc, f| acc | *f)
    }

    #[test]
    fn value_returning_kernel() {
        let mut m = module(
            "define float @foo(float %in, i32 %x) {\n\
             entry:\n\
               ret float %in\n\
             }",
        );
        let name = create_wrapper(
            &mut m,
            "foo",
            sig(&[Signature::KERNEL, Signature::INPUT, Signature::OUTPUT, Signature::X]),
        )
        .unwrap();
        assert_eq!(name, "foo.wrapper");
        insta::assert_snapshot!(m.function(&name).unwrap().to_string(), @r"
        define void @foo.wrapper(float* %pin, float* %out, i32 %x) {
        init:
          %Input = load float, %pin
          %call = call float @foo(float %Input, i32 %x)
          store float %call, %out
          ret void
        }
        ");
        assert!(m.function("foo").unwrap().attrs.always_inline);
    }

    #[test]
    fn void_kernel_forwards_output() {
        let mut m = module(
            "define void @bar(i32* %dst, i32 %src, i8* %usr) {\n\
             entry:\n\
               store i32 %src, %dst\n\
               ret void\n\
             }",
        );
        let name = create_wrapper(
            &mut m,
            "bar",
            sig(&[
                Signature::KERNEL,
                Signature::INPUT,
                Signature::OUTPUT,
                Signature::USER_DATA,
            ]),
        )
        .unwrap();
        insta::assert_snapshot!(m.function(&name).unwrap().to_string(), @r"
        define void @bar.wrapper(i32* %psrc, i32* %dst, i8* %usr) {
        init:
          %Input = load i32, %psrc
          call void @bar(i32* %dst, i32 %Input, i8* %usr)
          ret void
        }
        ");
    }

    #[test]
    fn output_name_collision_is_renamed() {
        let mut m = module(
            "define i32 @k(i32 %in, i32 %out, i32 %out.1) {\n\
             entry:\n\
               ret i32 %in\n\
             }",
        );
        let name = create_wrapper(
            &mut m,
            "k",
            sig(&[Signature::KERNEL, Signature::INPUT, Signature::OUTPUT]),
        )
        .unwrap();
        let names: Vec<String> = m
            .function(&name)
            .unwrap()
            .params
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, vec!["pin", "out.2", "out", "out.1"]);
    }

    #[test]
    fn input_name_collision_is_renamed() {
        let mut m = module(
            "define float @k(float %in, i32 %pin) {\n\
             entry:\n\
               ret float %in\n\
             }",
        );
        let name = create_wrapper(
            &mut m,
            "k",
            sig(&[Signature::KERNEL, Signature::INPUT, Signature::OUTPUT, Signature::X]),
        )
        .unwrap();
        insta::assert_snapshot!(m.function(&name).unwrap().to_string(), @r"
        define void @k.wrapper(float* %pin.1, float* %out, i32 %pin) {
        init:
          %Input = load float, %pin.1
          %call = call float @k(float %Input, i32 %pin)
          store float %call, %out
          ret void
        }
        ");
    }

    #[test]
    fn no_input_no_output() {
        let mut m = module(
            "define void @k(i32 %x, i32 %y) {\n\
             entry:\n\
               ret void\n\
             }",
        );
        let name = create_wrapper(
            &mut m,
            "k",
            sig(&[Signature::KERNEL, Signature::X, Signature::Y]),
        )
        .unwrap();
        let w = m.function(&name).unwrap();
        assert_eq!(w.params.len(), 2);
        assert_eq!(w.ret, Type::Void);
        assert_eq!(w.blocks[0].insts.len(), 1);
    }

    #[test]
    fn linkage_follows_kernel() {
        let mut m = module(
            "define internal void @k(i32 %x) {\n\
             entry:\n\
               ret void\n\
             }",
        );
        let name = create_wrapper(&mut m, "k", Signature::KERNEL | Signature::X).unwrap();
        assert_eq!(m.function(&name).unwrap().linkage, crate::ir::Linkage::Internal);
    }

    #[test]
    fn existing_wrapper_is_a_collision() {
        let mut m = module(
            "define void @k() {\n\
             entry:\n\
               ret void\n\
             }\n\
             declare void @k.wrapper()",
        );
        assert_eq!(
            create_wrapper(&mut m, "k", Signature::KERNEL),
            Err(SynthError::NameCollision("k.wrapper".into()))
        );
    }

    #[test]
    fn missing_kernel() {
        let mut m = Module::new("m");
        assert_eq!(
            create_wrapper(&mut m, "ghost", Signature::KERNEL),
            Err(SynthError::MissingFunction("ghost".into()))
        );
    }

    #[test]
    #[should_panic(expected = "no input parameter")]
    fn missing_input_parameter_panics() {
        let mut m = module(
            "define float @k() {\n\
             entry:\n\
               ret float 0.0\n\
             }",
        );
        let _ = create_wrapper(&mut m, "k", Signature::KERNEL | Signature::INPUT);
    }

    #[test]
    fn expected_counts() {
        assert_eq!(expected_param_count(Signature::OUTPUT, 2, false), 3);
        assert_eq!(expected_param_count(Signature::OUTPUT, 2, true), 2);
        assert_eq!(expected_param_count(Signature::INPUT, 2, false), 2);
    }
}
