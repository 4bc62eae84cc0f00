// index_fn.rs — The work-item index function
//
// `get.id` takes no arguments and returns the current work-item index as
// `i32`. Until the vectorizer substitutes it with the real induction
// variable, its body is a stub returning 0. Flattening detaches the body so
// the call survives inlining, then regenerates it.

use crate::builder::FunctionBuilder;
use crate::error::PrepareError;
use crate::ir::{Function, Module, Type, Value};

pub const INDEX_FUNCTION_NAME: &str = "get.id";

pub fn index_type() -> Type {
    Type::i32()
}

/// Add `get.id` with its stub body. The name is reserved: a module that
/// already has the symbol is rejected.
pub fn create_index_function(module: &mut Module) -> Result<(), PrepareError> {
    let mut function = Function::declaration(INDEX_FUNCTION_NAME, index_type(), Vec::new());
    construct_index_body(&mut function);
    module
        .add_function(function)
        .map_err(|_| PrepareError::IndexFunctionCollision(INDEX_FUNCTION_NAME.to_string()))?;
    Ok(())
}

/// Give a body-less `get.id` its constant-zero body.
pub fn construct_index_body(function: &mut Function) {
    assert!(
        function.is_declaration(),
        "index function '{}' already has a body",
        function.name
    );
    let mut b = FunctionBuilder::new(function);
    b.append_block("entry");
    b.ret(Some((index_type(), Value::int(0))));
}

/// Drop the body of `get.id` if the module has one. Returns whether it existed.
pub fn detach_index_body(module: &mut Module) -> bool {
    match module.function_mut(INDEX_FUNCTION_NAME) {
        Some(f) => {
            f.delete_body();
            true
        }
        None => false,
    }
}

/// Regenerate the stub body after `detach_index_body`.
pub fn restore_index_body(module: &mut Module) {
    let function = match module.function_mut(INDEX_FUNCTION_NAME) {
        Some(f) => f,
        None => panic!("index function '{}' vanished while detached", INDEX_FUNCTION_NAME),
    };
    construct_index_body(function);
}
