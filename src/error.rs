// Error taxonomy for threadtrace.
// Analysis failures are local and recoverable; export failures are fatal.

use thiserror::Error;

/// An expected node or edge was absent while following a chain step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    #[error("no call to `{expected}` inside `{function}`")]
    MissingCall { function: String, expected: String },

    #[error("no reference to a `{marker}` symbol inside `{function}`")]
    MissingVtable { function: String, marker: String },

    #[error("vtable `{vtable}` has {slots} reference slot(s), at least 2 are required")]
    ShortVtable { vtable: String, slots: usize },

    #[error("`{builtin}` call carries no reference to `{expected}`")]
    MissingTrampolineTarget { builtin: String, expected: String },

    #[error("`{symbol}` does not resolve to a function declaration")]
    UnresolvedCallee { symbol: String },

    #[error("no non-intrinsic call inside `{function}`")]
    MissingEntryCall { function: String },
}

/// A spawn-site trace that broke at a given chain step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("chain step {step} (`{expected}`) failed: {cause}")]
pub struct TraceFailure {
    pub step: usize,
    pub expected: String,
    #[source]
    pub cause: LookupFailure,
}

/// A chain definition that can never be followed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain definition has no steps")]
    Empty,

    #[error("trampoline step {index} (`{name}`) has no following step to resolve")]
    TrampolineWithoutTarget { index: usize, name: String },

    #[error("trampoline step {index} (`{name}`) must be followed by a direct step")]
    TrampolineTargetNotDirect { index: usize, name: String },
}

/// Errors raised by a property-graph store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("node row is missing an integer `id` property")]
    MissingId,

    #[error("statement rejected: {0}")]
    Rejected(String),
}

/// Errors raised while planning or executing an export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("`{0}` is not a safe label or relationship identifier")]
    UnsafeIdentifier(String),

    #[error("node `{0}` has no surrogate id at relationship resolution time")]
    UnregisteredNode(String),

    #[error("store rejected `{statement}`: {source}")]
    Transport {
        statement: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to build export worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Errors raised while loading a graph interchange document.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read graph document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid graph document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate node key `{0}`")]
    DuplicateKey(String),

    #[error("edge refers to unknown node key `{0}`")]
    UnknownKey(String),

    #[error("graph document has {0} nodes but no roots")]
    NoRoots(usize),
}
