// vectorizer.rs — Contract with the external auto-vectorizer
//
// The vectorizer itself is opaque. A backend creates a configuration for a
// target width, optionally installs runtime support built from the builtins
// library, transforms the module in place over a worklist of indexed
// functions and reports which functions it produced and at what width.
// Results are correlated with kernels by name only (`__Vectorized_.<indexed>`).

use serde::Serialize;

use crate::ir::Module;
use crate::passes::{FunctionPass, PreventDivisionCrashes, ShuffleCallToInst};

/// Width requested from the vectorizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WidthMode {
    Fixed(u32),
    /// Let the vectorizer choose per function (requested as width 0).
    Heuristic,
}

impl WidthMode {
    pub const DEFAULT_FIXED: u32 = 4;

    /// The width value handed to the vectorizer.
    pub fn width(self) -> u32 {
        match self {
            WidthMode::Fixed(w) => w,
            WidthMode::Heuristic => 0,
        }
    }
}

impl Default for WidthMode {
    fn default() -> Self {
        if cfg!(feature = "heuristic-width") {
            WidthMode::Heuristic
        } else {
            WidthMode::Fixed(Self::DEFAULT_FIXED)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    pub width: u32,
}

/// What the vectorizer reports. `functions[i]` was widened to `widths[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VectorizerOutput {
    pub functions: Vec<String>,
    pub widths: Vec<u32>,
}

impl VectorizerOutput {
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.functions
            .iter()
            .map(String::as_str)
            .zip(self.widths.iter().copied())
    }
}

/// The services the orchestrator consumes from a vectorizer implementation.
pub trait VectorizerBackend {
    fn create_config(&self, width: WidthMode) -> OptimizerConfig {
        OptimizerConfig {
            width: width.width(),
        }
    }

    /// Install runtime support derived from the builtins library.
    fn attach_runtime(&mut self, _builtins: &Module) {}

    fn detach_runtime(&mut self) {}

    /// Vectorize the functions in `worklist`, mutating `module` in place.
    fn vectorize(
        &mut self,
        module: &mut Module,
        builtins: &Module,
        config: &OptimizerConfig,
        worklist: &[String],
    ) -> VectorizerOutput;

    /// Function pass run over every definition before flattening.
    fn call_normalization_pass(&self) -> Box<dyn FunctionPass> {
        Box::new(ShuffleCallToInst)
    }

    /// Function pass run over every definition after vectorization.
    fn division_safety_pass(&self) -> Box<dyn FunctionPass> {
        Box::new(PreventDivisionCrashes)
    }
}

/// Backend used when no vectorizer is linked: widens nothing.
#[derive(Debug, Default)]
pub struct ScalarFallback;

impl VectorizerBackend for ScalarFallback {
    fn vectorize(
        &mut self,
        _module: &mut Module,
        _builtins: &Module,
        config: &OptimizerConfig,
        worklist: &[String],
    ) -> VectorizerOutput {
        tracing::info!(
            candidates = worklist.len(),
            width = config.width,
            "no vectorizer linked; kernels stay scalar"
        );
        VectorizerOutput::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_values() {
        assert_eq!(WidthMode::Fixed(8).width(), 8);
        assert_eq!(WidthMode::Heuristic.width(), 0);
    }

    #[cfg(not(feature = "heuristic-width"))]
    #[test]
    fn default_is_four_wide() {
        assert_eq!(WidthMode::default(), WidthMode::Fixed(4));
        assert_eq!(ScalarFallback.create_config(WidthMode::default()).width, 4);
    }

    #[test]
    fn fallback_vectorizes_nothing() {
        let mut m = Module::new("m");
        let before = m.clone();
        let builtins = Module::new("builtins");
        let mut backend = ScalarFallback;
        let config = backend.create_config(WidthMode::default());
        let out = backend.vectorize(&mut m, &builtins, &config, &["k.indexed".to_string()]);
        assert!(out.is_empty());
        assert_eq!(m, before);
    }

    #[test]
    fn default_passes() {
        assert_eq!(ScalarFallback.call_normalization_pass().name(), "shuffle-call-to-inst");
        assert_eq!(ScalarFallback.division_safety_pass().name(), "prevent-division-crashes");
    }

    #[test]
    fn output_pairs() {
        let out = VectorizerOutput {
            functions: vec!["__Vectorized_.a.indexed".into()],
            widths: vec![4],
        };
        assert_eq!(out.iter().collect::<Vec<_>>(), vec![("__Vectorized_.a.indexed", 4)]);
        assert_eq!(out.len(), 1);
    }
}
