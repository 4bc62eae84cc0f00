// registry.rs — Indexed-kernel registry
//
// The worklist handed to the vectorizer lives in the module itself, as the
// named metadata list `!rs.indexed.kernels`, one single-operand node per
// indexed function. The list is append-only and survives until the module is
// destroyed.

use crate::ir::{MdNode, MdOperand, Module};

pub const INDEXED_KERNELS_MD: &str = "rs.indexed.kernels";

/// Append `indexed` to the registry.
pub fn register(module: &mut Module, indexed: &str) {
    module
        .get_or_insert_named_metadata(INDEXED_KERNELS_MD)
        .push(MdNode::function(indexed));
}

/// Registered function names, in registration order.
///
/// Nodes whose first operand is not a function reference are ignored.
pub fn entries(module: &Module) -> Vec<String> {
    module
        .named_metadata(INDEXED_KERNELS_MD)
        .unwrap_or(&[])
        .iter()
        .filter_map(|node| match node.0.first() {
            Some(MdOperand::Function(name)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

pub fn is_empty(module: &Module) -> bool {
    entries(module).is_empty()
}

/// Entries that no longer name a defined function.
pub fn dangling_entries(module: &Module) -> Vec<String> {
    entries(module)
        .into_iter()
        .filter(|name| {
            module
                .function(name)
                .map_or(true, |f| f.is_declaration())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, Type};

    #[test]
    fn empty_module_has_empty_registry() {
        let m = Module::new("m");
        assert!(is_empty(&m));
        assert!(entries(&m).is_empty());
    }

    #[test]
    fn append_only_in_order() {
        let mut m = Module::new("m");
        register(&mut m, "b.indexed");
        register(&mut m, "a.indexed");
        assert_eq!(entries(&m), vec!["b.indexed", "a.indexed"]);
        assert_eq!(
            m.to_string(),
            "source_filename = \"m\"\n\n!rs.indexed.kernels = !{!{@b.indexed}, !{@a.indexed}}\n"
        );
    }

    #[test]
    fn foreign_nodes_ignored() {
        let mut m = Module::new("m");
        m.get_or_insert_named_metadata(INDEXED_KERNELS_MD)
            .push(MdNode(vec![MdOperand::Str("note".into())]));
        register(&mut m, "k.indexed");
        assert_eq!(entries(&m), vec!["k.indexed"]);
    }

    #[test]
    fn dangling_detection() {
        let mut m = Module::new("m");
        m.add_function(Function::declaration("decl.indexed", Type::Void, vec![]))
            .unwrap();
        register(&mut m, "decl.indexed");
        register(&mut m, "missing.indexed");
        assert_eq!(dangling_entries(&m), vec!["decl.indexed", "missing.indexed"]);
    }
}
