// pipeline.rs — Two-phase vectorization orchestration
//
// Runs the passes of each phase in descriptor order over a module the caller
// owns exclusively for the duration of the call.
//
// Prepare: index function, wrapper/indexed synthesis and registration,
//   call normalization, flattening.
// Vectorize: builtins library, re-flattening, the external vectorizer,
//   division guarding.
//
// Preconditions: prepare runs once per module before vectorize.
// Postconditions: see `PrepareOutcome` / `VectorizeOutcome`.
// Failure modes: reserved index-function name already taken (prepare);
//   builtins library missing or unreadable (vectorize, module untouched).
// Side effects: mutates the module; optional debug dumps through `DumpSink`.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::VectorizeConfig;
use crate::dump::DumpSink;
use crate::error::{PrepareError, SynthError, VectorizeError};
use crate::exports::ExportedKernelList;
use crate::index_fn::{self, INDEX_FUNCTION_NAME};
use crate::indexed::create_indexed;
use crate::inline::{flatten_for_vectorization, verify_flatten, FlattenReport};
use crate::ir::Module;
use crate::loader::{FileModuleLoader, ModuleLoader};
use crate::naming::{indexed_name, wrapper_name, SymbolTable};
use crate::pass::{descriptor, phase_passes, PassId, Phase, StageCert};
use crate::passes::run_on_definitions;
use crate::registry;
use crate::signature::Signature;
use crate::vectorizer::{VectorizerBackend, VectorizerOutput};
use crate::wrapper::create_wrapper;

// ── Outcomes ───────────────────────────────────────────────────────────────

/// Why an exported kernel got no indexed function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No function of that name in the module.
    NotFound,
    /// Simple kernel with no signature bits.
    EmptySignature,
    /// Simple kernel that returns a value; only kernel entries get wrappers.
    ReturnsValue,
    Synthesis(SynthError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "not found in module"),
            SkipReason::EmptySignature => write!(f, "empty signature"),
            SkipReason::ReturnsValue => write!(f, "simple kernel returns a value"),
            SkipReason::Synthesis(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareReport {
    /// Indexed functions appended to the registry, in export order.
    pub registered: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub symbols: SymbolTable,
    pub flatten: FlattenReport,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrepareOutcome {
    /// No exported kernels (or vectorization disabled); the module is unchanged.
    NothingToDo,
    Prepared(PrepareReport),
}

impl PrepareOutcome {
    pub fn did_work(&self) -> bool {
        matches!(self, PrepareOutcome::Prepared(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorizeOutcome {
    /// Empty registry (or vectorization disabled); the module is unchanged.
    NothingToDo,
    /// The vectorizer ran. It may have widened none, some or all candidates.
    Vectorized(VectorizerOutput),
}

impl VectorizeOutcome {
    pub fn did_work(&self) -> bool {
        matches!(self, VectorizeOutcome::Vectorized(_))
    }
}

// ── Orchestrator ───────────────────────────────────────────────────────────

pub struct VectorizationSupport<B: VectorizerBackend, L: ModuleLoader = FileModuleLoader> {
    config: VectorizeConfig,
    backend: B,
    loader: L,
    dumps: DumpSink,
}

impl<B: VectorizerBackend> VectorizationSupport<B, FileModuleLoader> {
    pub fn new(config: VectorizeConfig, backend: B) -> Self {
        let dumps = match &config.dump_dir {
            Some(dir) => DumpSink::to_dir(dir.clone()),
            None => DumpSink::disabled(),
        };
        VectorizationSupport {
            config,
            backend,
            loader: FileModuleLoader,
            dumps,
        }
    }
}

impl<B: VectorizerBackend, L: ModuleLoader> VectorizationSupport<B, L> {
    pub fn with_loader<L2: ModuleLoader>(self, loader: L2) -> VectorizationSupport<B, L2> {
        VectorizationSupport {
            config: self.config,
            backend: self.backend,
            loader,
            dumps: self.dumps,
        }
    }

    pub fn with_dump_sink(mut self, dumps: DumpSink) -> Self {
        self.dumps = dumps;
        self
    }

    pub fn config(&self) -> &VectorizeConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Build and register the indexed form of every exported kernel, then flatten.
    ///
    /// Kernels that cannot be processed are skipped and listed in the report;
    /// only a taken index-function name fails the whole phase.
    pub fn prepare(
        &mut self,
        exports: &ExportedKernelList,
        module: &mut Module,
    ) -> Result<PrepareOutcome, PrepareError> {
        if !self.config.enabled {
            info!("vectorizer disabled; skipping prepare");
            return Ok(PrepareOutcome::NothingToDo);
        }
        if exports.is_empty() {
            debug!("no exported kernels");
            return Ok(PrepareOutcome::NothingToDo);
        }

        let mut report = PrepareReport::default();
        self.dumps.dump_point("pre", "prepare");
        for &pass_id in &phase_passes(Phase::Prepare) {
            let t = Instant::now();
            match pass_id {
                PassId::CreateIndexFunction => index_fn::create_index_function(module)?,
                PassId::Synthesize => synthesize(exports, module, &mut report),
                PassId::NormalizeCalls => {
                    let mut pass = self.backend.call_normalization_pass();
                    let changed = run_on_definitions(pass.as_mut(), module);
                    debug!(pass = pass.name(), changed, "function pass finished");
                }
                PassId::Flatten => {
                    report.flatten = flatten_checked(module, self.config.inline_threshold);
                }
                other => unreachable!("{:?} is not a prepare pass", other),
            }
            finish_pass(&mut self.dumps, pass_id, t.elapsed(), module);
        }

        info!(
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "module prepared for vectorization"
        );
        Ok(PrepareOutcome::Prepared(report))
    }

    /// Run the vectorizer over the registered indexed functions.
    ///
    /// On a builtins load failure the error is logged and returned before
    /// the module is touched, so the scalar indexed kernels remain usable.
    pub fn vectorize(&mut self, module: &mut Module) -> Result<VectorizeOutcome, VectorizeError> {
        if !self.config.enabled {
            info!("vectorizer disabled; skipping vectorize");
            return Ok(VectorizeOutcome::NothingToDo);
        }
        if registry::is_empty(module) {
            debug!("registry empty; nothing to vectorize");
            return Ok(VectorizeOutcome::NothingToDo);
        }

        let mut builtins: Option<Module> = None;
        let mut output = VectorizerOutput::default();
        self.dumps.dump_point("pre", "vectorize");
        for &pass_id in &phase_passes(Phase::Vectorize) {
            let t = Instant::now();
            match pass_id {
                PassId::LoadBuiltins => {
                    let path = &self.config.builtins_path;
                    let loaded = self.loader.load(path).map_err(|e| {
                        error!(path = %path.display(), error = %e, "vectorizer failed to find/parse built-ins library");
                        e
                    })?;
                    self.backend.attach_runtime(&loaded);
                    builtins = Some(loaded);
                }
                PassId::Reflatten => {
                    flatten_checked(module, self.config.inline_threshold);
                }
                PassId::RunVectorizer => {
                    let config = self.backend.create_config(self.config.width);
                    let worklist = registry::entries(module);
                    if let Some(builtins) = &builtins {
                        output = self.backend.vectorize(module, builtins, &config, &worklist);
                    }
                    self.backend.detach_runtime();
                    check_output(module, &worklist, &output);
                }
                PassId::PreventDivisionCrashes => {
                    let mut pass = self.backend.division_safety_pass();
                    let changed = run_on_definitions(pass.as_mut(), module);
                    debug!(pass = pass.name(), changed, "function pass finished");
                }
                other => unreachable!("{:?} is not a vectorize pass", other),
            }
            finish_pass(&mut self.dumps, pass_id, t.elapsed(), module);
        }

        info!(
            candidates = registry::entries(module).len(),
            vectorized = output.len(),
            "vectorization finished"
        );
        Ok(VectorizeOutcome::Vectorized(output))
    }
}

// ── Passes ─────────────────────────────────────────────────────────────────

fn synthesize(exports: &ExportedKernelList, module: &mut Module, report: &mut PrepareReport) {
    for (name, signature) in exports.iter() {
        match synthesize_kernel(module, name, signature) {
            Ok((indexed, wrapped)) => {
                registry::register(module, &indexed);
                report.symbols.record(name, wrapped);
                debug!(kernel = name, %signature, indexed = %indexed, "kernel indexed");
                report.registered.push(indexed);
            }
            Err(reason) => {
                warn!(kernel = name, %signature, reason = %reason, "kernel skipped");
                report.skipped.push((name.to_string(), reason));
            }
        }
    }
}

/// Wrap (kernel entries) and index one kernel. Returns the indexed name and
/// whether a wrapper sits in between.
fn synthesize_kernel(
    module: &mut Module,
    name: &str,
    signature: Signature,
) -> Result<(String, bool), SkipReason> {
    let returns_void = match module.function(name) {
        Some(f) => f.ret.is_void(),
        None => return Err(SkipReason::NotFound),
    };

    if signature.is_kernel_entry() {
        // Both derived names must be free before the kernel is touched.
        let indexed = indexed_name(&wrapper_name(name));
        if module.function(&indexed).is_some() {
            return Err(SkipReason::Synthesis(SynthError::NameCollision(indexed)));
        }
        let wrapper = create_wrapper(module, name, signature).map_err(SkipReason::Synthesis)?;
        let indexed = create_indexed(module, &wrapper, signature, INDEX_FUNCTION_NAME)
            .map_err(SkipReason::Synthesis)?;
        return Ok((indexed, true));
    }

    if !returns_void {
        return Err(SkipReason::ReturnsValue);
    }
    if signature.is_empty() {
        return Err(SkipReason::EmptySignature);
    }
    let indexed =
        create_indexed(module, name, signature, INDEX_FUNCTION_NAME).map_err(SkipReason::Synthesis)?;
    Ok((indexed, false))
}

/// Flatten, then check the flattening certificate.
fn flatten_checked(module: &mut Module, threshold: usize) -> FlattenReport {
    let report = flatten_for_vectorization(module, threshold);
    let cert = verify_flatten(module, &report.protected);
    if !cert.all_pass() {
        warn!(failed = ?cert.failed(), "flatten postconditions not met");
    }
    report
}

/// Log vectorizer results that do not line up with the worklist.
fn check_output(module: &Module, worklist: &[String], output: &VectorizerOutput) {
    if output.functions.len() != output.widths.len() {
        warn!(
            functions = output.functions.len(),
            widths = output.widths.len(),
            "vectorizer output lists differ in length"
        );
    }
    for (function, width) in output.iter() {
        if module.function(function).is_none() {
            warn!(function, "vectorizer reported a function missing from the module");
        }
        debug!(function, width, "vectorized");
    }
    debug!(
        candidates = worklist.len(),
        vectorized = output.len(),
        "vectorizer returned"
    );
}

fn finish_pass(dumps: &mut DumpSink, pass_id: PassId, elapsed: Duration, module: &Module) {
    let name = descriptor(pass_id).name;
    debug!(
        pass = name,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "pass complete"
    );
    dumps.dump_module("post", name, module);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::ir::{Inst, Op, Value};
    use crate::parser::parse;
    use crate::vectorizer::ScalarFallback;
    use std::path::Path;

    struct StubLoader(Option<Module>);

    impl ModuleLoader for StubLoader {
        fn load(&self, path: &Path) -> Result<Module, LoadError> {
            self.0.clone().ok_or_else(|| LoadError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    fn module(source: &str) -> Module {
        let result = parse(source, "test");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        result.module.unwrap()
    }

    fn support(builtins: Option<Module>) -> VectorizationSupport<ScalarFallback, StubLoader> {
        VectorizationSupport::new(VectorizeConfig::default(), ScalarFallback)
            .with_loader(StubLoader(builtins))
    }

    const KERNELS: &str = "define float @entry(float %in, i32 %x) {\n\
                           entry:\n\
                             ret float %in\n\
                           }\n\
                           define void @simple(i32* %out) {\n\
                           entry:\n\
                             store i32 1, %out\n\
                             ret void\n\
                           }\n\
                           define i32 @valued(i32 %x) {\n\
                           entry:\n\
                             ret i32 %x\n\
                           }\n\
                           define void @noop(i32 %x) {\n\
                           entry:\n\
                             ret void\n\
                           }";

    #[test]
    fn empty_exports_do_nothing() {
        let mut m = module(KERNELS);
        let before = m.clone();
        let outcome = support(None).prepare(&ExportedKernelList::new(), &mut m).unwrap();
        assert_eq!(outcome, PrepareOutcome::NothingToDo);
        assert_eq!(m, before);
    }

    #[test]
    fn prepare_routes_kernels() {
        let mut m = module(KERNELS);
        let exports: ExportedKernelList = [
            ("entry", Signature::from_bits(0x2b)),
            ("simple", Signature::OUTPUT),
            ("valued", Signature::X),
            ("ghost", Signature::KERNEL),
            ("noop", Signature::default()),
        ]
        .into_iter()
        .collect();
        let outcome = support(None).prepare(&exports, &mut m).unwrap();
        let PrepareOutcome::Prepared(report) = outcome else {
            panic!("expected prepared");
        };
        assert_eq!(report.registered, vec!["entry.wrapper.indexed", "simple.indexed"]);
        assert_eq!(
            report.skipped,
            vec![
                ("valued".to_string(), SkipReason::ReturnsValue),
                ("ghost".to_string(), SkipReason::NotFound),
                ("noop".to_string(), SkipReason::EmptySignature),
            ]
        );
        assert_eq!(registry::entries(&m), report.registered);
        assert!(report.symbols.find_wrapper(&m, "entry").is_some());
        assert!(report.symbols.find_wrapper(&m, "simple").is_none());
        assert!(m.function(INDEX_FUNCTION_NAME).is_some());
    }

    #[test]
    fn indexed_bodies_are_flat_after_prepare() {
        let mut m = module(KERNELS);
        let exports: ExportedKernelList = [("entry", Signature::from_bits(0x2b))].into_iter().collect();
        support(None).prepare(&exports, &mut m).unwrap();
        let indexed = m.function("entry.wrapper.indexed").unwrap();
        assert_eq!(indexed.callees(), vec![INDEX_FUNCTION_NAME.to_string()]);
        let cert = verify_flatten(&m, &[]);
        assert!(cert.all_pass(), "{:?}", cert.failed());
    }

    #[test]
    fn input_load_goes_through_element_pointer() {
        let mut m = module(
            "define float @k(float %in, i32 %pin) {\n\
             entry:\n\
               ret float %in\n\
             }",
        );
        let exports: ExportedKernelList = [(
            "k",
            Signature::KERNEL | Signature::INPUT | Signature::OUTPUT | Signature::X,
        )]
        .into_iter()
        .collect();
        support(None).prepare(&exports, &mut m).unwrap();

        let indexed = m.function("k.wrapper.indexed").unwrap();
        let names: Vec<&str> = indexed.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["pin.1", "out", "pin"]);

        let insts: Vec<&Inst> = indexed.blocks.iter().flat_map(|b| &b.insts).collect();
        let element = insts
            .iter()
            .find_map(|inst| match &inst.op {
                Op::Gep { base, .. } if *base == Value::local("pin.1") => inst.result.clone(),
                _ => None,
            })
            .expect("input element address");
        let loads: Vec<&Value> = insts
            .iter()
            .filter_map(|inst| match &inst.op {
                Op::Load { ptr, .. } => Some(ptr),
                _ => None,
            })
            .collect();
        assert_eq!(loads, vec![&Value::local(&element)]);
        assert!(insts.iter().any(|inst| matches!(
            &inst.op,
            Op::Binary { lhs, .. } if *lhs == Value::local("pin")
        )));
    }

    #[test]
    fn taken_indexed_name_leaves_kernel_untouched() {
        let mut m = module(
            "define float @k(float %in) {\n\
             entry:\n\
               ret float %in\n\
             }\n\
             declare void @k.wrapper.indexed(float* %pin, float* %out)",
        );
        let exports: ExportedKernelList =
            [("k", Signature::KERNEL | Signature::INPUT | Signature::OUTPUT)]
                .into_iter()
                .collect();
        let PrepareOutcome::Prepared(report) = support(None).prepare(&exports, &mut m).unwrap() else {
            panic!("expected prepared");
        };
        assert_eq!(
            report.skipped,
            vec![(
                "k".to_string(),
                SkipReason::Synthesis(SynthError::NameCollision("k.wrapper.indexed".into()))
            )]
        );
        assert!(m.function("k.wrapper").is_none());
        assert!(!m.function("k").unwrap().attrs.always_inline);
        assert!(registry::entries(&m).is_empty());
    }

    #[test]
    fn index_name_taken_is_an_error() {
        let mut m = module("declare i32 @get.id()");
        let exports: ExportedKernelList = [("k", Signature::X)].into_iter().collect();
        assert_eq!(
            support(None).prepare(&exports, &mut m),
            Err(PrepareError::IndexFunctionCollision("get.id".into()))
        );
    }

    #[test]
    fn disabled_does_nothing() {
        let mut m = module(KERNELS);
        let before = m.clone();
        let config = VectorizeConfig {
            enabled: false,
            ..VectorizeConfig::default()
        };
        let mut s = VectorizationSupport::new(config, ScalarFallback).with_loader(StubLoader(None));
        let exports: ExportedKernelList = [("simple", Signature::OUTPUT)].into_iter().collect();
        assert_eq!(s.prepare(&exports, &mut m).unwrap(), PrepareOutcome::NothingToDo);
        assert_eq!(s.vectorize(&mut m).unwrap(), VectorizeOutcome::NothingToDo);
        assert_eq!(m, before);
    }

    #[test]
    fn empty_registry_skips_vectorize() {
        let mut m = module(KERNELS);
        let before = m.clone();
        assert_eq!(support(None).vectorize(&mut m).unwrap(), VectorizeOutcome::NothingToDo);
        assert_eq!(m, before);
    }

    #[test]
    fn missing_builtins_leave_module_untouched() {
        let mut m = module(KERNELS);
        let exports: ExportedKernelList = [("simple", Signature::OUTPUT)].into_iter().collect();
        let mut s = support(None);
        s.prepare(&exports, &mut m).unwrap();
        let prepared = m.clone();
        let err = s.vectorize(&mut m).unwrap_err();
        assert!(matches!(err, VectorizeError::Builtins(LoadError::Io { .. })));
        assert_eq!(m, prepared);
    }

    #[test]
    fn fallback_vectorizes_nothing_but_succeeds() {
        let mut m = module(KERNELS);
        let exports: ExportedKernelList = [("simple", Signature::OUTPUT)].into_iter().collect();
        let mut s = support(Some(Module::new("builtins")));
        s.prepare(&exports, &mut m).unwrap();
        let outcome = s.vectorize(&mut m).unwrap();
        assert_eq!(outcome, VectorizeOutcome::Vectorized(VectorizerOutput::default()));
        assert!(m.function("simple.indexed").is_some());
    }

    #[test]
    fn dumps_follow_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = module(KERNELS);
        let exports: ExportedKernelList = [("simple", Signature::OUTPUT)].into_iter().collect();
        let mut s = support(None).with_dump_sink(DumpSink::to_dir(dir.path()));
        s.prepare(&exports, &mut m).unwrap();
        for file in [
            "DBGP_pre_prepare.0",
            "post_create_index_fn_0.ll",
            "post_synthesize_1.ll",
            "post_normalize_calls_2.ll",
            "post_flatten_3.ll",
        ] {
            assert!(dir.path().join(file).exists(), "{file}");
        }
    }
}
