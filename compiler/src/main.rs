use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use widen::config::VectorizeConfig;
use widen::exports::ExportedKernelList;
use widen::ir::Module;
use widen::loader::{FileModuleLoader, ModuleLoader};
use widen::naming::{Role, SymbolTable};
use widen::pipeline::{VectorizationSupport, VectorizeOutcome};
use widen::vectorizer::{ScalarFallback, VectorizerOutput, WidthMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Module text after prepare
    Prepared,
    /// Module text after vectorize
    Vectorized,
    /// Registry and vectorizer results as JSON
    Registry,
    /// SHA-256 of the vectorized module text
    Fingerprint,
}

#[derive(Parser, Debug)]
#[command(
    name = "widen",
    version,
    about = "Prepares per-work-item compute kernels for an auto-vectorizer"
)]
struct Cli {
    /// Input module (.ll text or .json)
    module: PathBuf,

    /// Exported kernel list: JSON object of kernel name to signature bits
    #[arg(long)]
    exports: PathBuf,

    /// Builtins library (overrides WIDEN_BUILTINS_PATH)
    #[arg(long)]
    builtins: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Vectorized)]
    emit: EmitStage,

    /// Fixed vector width requested from the vectorizer
    #[arg(long, conflicts_with = "heuristic")]
    width: Option<u32>,

    /// Let the vectorizer pick the width per kernel
    #[arg(long)]
    heuristic: bool,

    /// Caller-size threshold for inlining
    #[arg(long)]
    inline_threshold: Option<usize>,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write module dumps between passes into this directory
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Log pass progress and timing
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> VectorizeConfig {
        let mut config = VectorizeConfig::from_env();
        if let Some(path) = &self.builtins {
            config.builtins_path = path.clone();
        }
        if let Some(width) = self.width {
            config.width = WidthMode::Fixed(width);
        }
        if self.heuristic {
            config.width = WidthMode::Heuristic;
        }
        if let Some(threshold) = self.inline_threshold {
            config.inline_threshold = threshold;
        }
        if self.dump_dir.is_some() {
            config.dump_dir = self.dump_dir.clone();
        }
        config
    }
}

#[derive(Serialize)]
struct RegistryRow {
    kernel: String,
    indexed: String,
    vectorized: Option<String>,
    width: Option<u32>,
}

fn registry_rows(module: &Module, output: &VectorizerOutput) -> Vec<RegistryRow> {
    let symbols = SymbolTable::from_registry(module);
    symbols
        .handles(Role::Indexed)
        .map(|indexed| {
            let vectorized = indexed.with_role(Role::Vectorized).symbol();
            let width = output
                .iter()
                .find(|(name, _)| *name == vectorized)
                .map(|(_, w)| w);
            RegistryRow {
                kernel: indexed.base.clone(),
                indexed: indexed.symbol(),
                vectorized: module.function(&vectorized).map(|_| vectorized.clone()),
                width,
            }
        })
        .collect()
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("WIDEN_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // ── Inputs ──
    let mut module = match FileModuleLoader.load(&cli.module) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("widen: error: {}", e);
            return ExitCode::from(2);
        }
    };
    let exports = match ExportedKernelList::load(&cli.exports) {
        Ok(list) => list,
        Err(e) => {
            eprintln!("widen: error: {}", e);
            return ExitCode::from(2);
        }
    };

    let mut support = VectorizationSupport::new(cli.config(), ScalarFallback);

    // ── Prepare ──
    if let Err(e) = support.prepare(&exports, &mut module) {
        eprintln!("widen: error: {}", e);
        return ExitCode::from(1);
    }

    // ── Vectorize ──
    let mut output = VectorizerOutput::default();
    if cli.emit != EmitStage::Prepared {
        match support.vectorize(&mut module) {
            Ok(VectorizeOutcome::Vectorized(out)) => output = out,
            Ok(VectorizeOutcome::NothingToDo) => {}
            // Already logged; the scalar indexed kernels are still valid.
            Err(e) => eprintln!("widen: warning: {}; kernels left scalar", e),
        }
    }

    // ── Emit ──
    let text = match cli.emit {
        EmitStage::Prepared | EmitStage::Vectorized => module.to_string(),
        EmitStage::Fingerprint => format!("{}\n", module.fingerprint_hex()),
        EmitStage::Registry => match serde_json::to_string_pretty(&registry_rows(&module, &output)) {
            Ok(json) => format!("{}\n", json),
            Err(e) => {
                eprintln!("widen: error: {}", e);
                return ExitCode::from(2);
            }
        },
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("widen: error: {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        }
        None => print!("{}", text),
    }
    ExitCode::SUCCESS
}
