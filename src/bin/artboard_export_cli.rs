//! Artboard Export CLI
//!
//! Commands: artboards, names, export
//! Outputs JSON to stdout, logs to stderr
//! Exit codes: 0 success, 1 error, 2 per-artboard failures, 3 cancelled

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use artboard_export::{
    enumerate_artboards, load_scene,
    logging::init_logging,
    naming::{strip_extension, suggested_prefix},
    BatchConfig, BatchOrchestrator, BatchOutcome, FixedPrompter, LogNotifier, MemoryHost,
    NameRegistry, Prompter, StdioPrompter, Variant, MIN_HOST_VERSION,
};

#[derive(Parser)]
#[command(name = "artboard-export-cli")]
#[command(about = "Artboard Export CLI - per-artboard WebP/JPEG export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Version reported by the in-memory host
    #[arg(long, global = true, default_value = MIN_HOST_VERSION)]
    host_version: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum VariantArg {
    Webp,
    WebpJpeg,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Webp => Variant::WebP,
            VariantArg::WebpJpeg => Variant::WebPJpeg,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the artboards of a document
    Artboards {
        /// Scene description (JSON)
        #[arg(short, long)]
        document: PathBuf,
    },

    /// Preview export names without writing anything
    Names {
        #[arg(short, long)]
        document: PathBuf,

        /// Prefix for the richer variant (defaults to the suggestion)
        #[arg(short, long)]
        prefix: Option<String>,

        #[arg(long, value_enum)]
        variant: Option<VariantArg>,

        /// Batch configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Export every artboard
    Export {
        #[arg(short, long)]
        document: PathBuf,

        /// Destination folder, created if missing
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        #[arg(short, long)]
        prefix: Option<String>,

        #[arg(long, value_enum)]
        variant: Option<VariantArg>,

        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Ask for the destination and prefix on stdin
        #[arg(short, long)]
        interactive: bool,
    },
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": message.to_string(),
    });
    println!("{}", output);
    ExitCode::FAILURE
}

fn print_json(value: &serde_json::Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&Path>, variant: Option<VariantArg>) -> Result<BatchConfig, String> {
    let mut config = match path {
        Some(path) => BatchConfig::load(path).map_err(|e| e.to_string())?,
        None => BatchConfig::default(),
    };
    if let Some(variant) = variant {
        config.variant = variant.into();
        config.validate().map_err(|e| e.to_string())?;
    }
    Ok(config)
}

fn open_host(document: &Path, version: &str) -> Result<(MemoryHost, artboard_export::DocumentId), String> {
    let scene = load_scene(document).map_err(|e| e.to_string())?;
    let mut host = MemoryHost::new(version);
    let doc = host.open(scene);
    Ok((host, doc))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.log_json) {
        return fail(e);
    }

    match cli.command {
        Commands::Artboards { document } => {
            let (host, doc) = match open_host(&document, &cli.host_version) {
                Ok(opened) => opened,
                Err(e) => return fail(e),
            };
            let artboards = match enumerate_artboards(&host, doc) {
                Ok(a) => a,
                Err(e) => return fail(e),
            };
            let layers = host.document(doc).map(|d| d.layers.as_slice()).unwrap_or_default();
            let listed: Vec<_> = artboards
                .iter()
                .map(|a| serde_json::json!({
                    "ordinal": a.ordinal,
                    "layer_index": a.layer_index.0,
                    "name": layers.get(a.layer_index.0).map(|l| l.name.as_str()),
                }))
                .collect();

            match print_json(&serde_json::Value::Array(listed)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => fail(e),
            }
        }

        Commands::Names { document, prefix, variant, config } => {
            let config = match load_config(config.as_deref(), variant) {
                Ok(c) => c,
                Err(e) => return fail(e),
            };
            let (host, doc) = match open_host(&document, &cli.host_version) {
                Ok(opened) => opened,
                Err(e) => return fail(e),
            };
            let artboards = match enumerate_artboards(&host, doc) {
                Ok(a) => a,
                Err(e) => return fail(e),
            };
            let Some(scene) = host.document(doc) else {
                return fail("document vanished");
            };

            let prefix = config.variant.is_rich().then(|| {
                prefix.unwrap_or_else(|| suggested_prefix(&scene.name, &config.prefix_separator))
            });
            let orchestrator = BatchOrchestrator::new(config.clone());
            let mut registry = NameRegistry::new(config.collision);
            let names: Vec<String> = artboards
                .iter()
                .filter_map(|a| scene.layers.get(a.layer_index.0))
                .map(|layer| {
                    registry.claim(orchestrator.resolver().resolve(&scene.name, &layer.name, prefix.as_deref()))
                })
                .collect();

            let output = serde_json::json!({
                "document": strip_extension(&scene.name),
                "variant": config.variant,
                "codecs": config.variant.codecs(),
                "names": names,
            });
            match print_json(&output) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => fail(e),
            }
        }

        Commands::Export { document, out, prefix, variant, config, interactive } => {
            let config = match load_config(config.as_deref(), variant) {
                Ok(c) => c,
                Err(e) => return fail(e),
            };
            let (mut host, _doc) = match open_host(&document, &cli.host_version) {
                Ok(opened) => opened,
                Err(e) => return fail(e),
            };

            let stdin = io::stdin();
            let mut prompter: Box<dyn Prompter> = if interactive {
                Box::new(StdioPrompter::new(stdin.lock(), Some(out.clone())))
            } else {
                let mut fixed = FixedPrompter::new(out.clone());
                fixed.prefix = prefix;
                Box::new(fixed)
            };
            let mut notifier = LogNotifier;

            let orchestrator = BatchOrchestrator::new(config);
            // Destinations must exist before the host writes into them
            let mut prompter = EnsureDestination(prompter.as_mut());

            match orchestrator.run(&mut host, &mut prompter, &mut notifier) {
                Ok(BatchOutcome::Completed(summary)) => {
                    let output = serde_json::json!({
                        "success": summary.is_clean(),
                        "message": summary.message(),
                        "summary": summary,
                    });
                    if let Err(e) = print_json(&output) {
                        return fail(e);
                    }
                    if summary.is_clean() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(2)
                    }
                }
                Ok(BatchOutcome::Cancelled(prompt)) => {
                    let output = serde_json::json!({
                        "success": false,
                        "cancelled": prompt,
                    });
                    println!("{}", output);
                    ExitCode::from(3)
                }
                Err(e) => fail(e),
            }
        }
    }
}

/// Creates the chosen destination folder.
struct EnsureDestination<'a>(&'a mut dyn Prompter);

impl Prompter for EnsureDestination<'_> {
    fn destination_folder(&mut self) -> Option<PathBuf> {
        let folder = self.0.destination_folder()?;
        if let Err(e) = fs::create_dir_all(&folder) {
            tracing::error!(folder = %folder.display(), error = %e, "Cannot create destination folder");
            return None;
        }
        Some(folder)
    }

    fn prefix(&mut self, suggestion: &str) -> Option<String> {
        self.0.prefix(suggestion)
    }
}
