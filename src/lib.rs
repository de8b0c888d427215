//! Artboard Export - per-artboard batch export
//!
//! # Batch Guarantees
//! 1. The master document is restored after every artboard
//! 2. Every isolated unit is discarded, success or failure
//! 3. One artboard's failure never stops the others
//! 4. Cancelling a prompt touches nothing
//! 5. Names are deterministic for an unchanged document

pub mod host;
pub mod memory;
pub mod codec;
pub mod xmp;
pub mod enumerate;
pub mod isolate;
pub mod metadata;
pub mod color;
pub mod naming;
pub mod export;
pub mod hashing;
pub mod config;
pub mod prompt;
pub mod scene;
pub mod logging;
pub mod pipeline;

pub use host::{DocumentId, Host, HostError, LayerIndex};
pub use memory::{Fault, HostCall, MemoryDocument, MemoryHost};
pub use enumerate::{enumerate_artboards, ArtboardHandle, EnumerationError};
pub use isolate::{IsolatedUnit, IsolationError, LayerIsolator};
pub use metadata::MetadataSanitizer;
pub use color::{ColorNormalizer, CANONICAL_PROFILE};
pub use naming::{CollisionPolicy, NameRegistry, NameResolver};
pub use export::{Codec, CodecFailurePolicy, ExportError, ExportedFile, Exporter};
pub use hashing::{canonical_json, compute_names_digest};
pub use config::{BatchConfig, ConfigError, Variant};
pub use prompt::{FixedPrompter, LogNotifier, Notifier, Prompt, Prompter, RecordingNotifier, StdioPrompter};
pub use scene::{load_scene, SceneError};
pub use pipeline::{BatchError, BatchOrchestrator, BatchOutcome, BatchSummary, PreconditionError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Oldest host with native WebP export.
pub const MIN_HOST_VERSION: &str = "23.0.0";
