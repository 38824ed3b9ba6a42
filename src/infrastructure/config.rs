//! Configuration loaded from `threadtrace.toml`.
//!
//! Every field is optional; `effective_*` accessors supply the defaults.
//! CLI flags are applied on top through [`CliOverrides`].

use crate::domain::chain::{
    ChainSpec, ChainStep, DEFAULT_ENTRY_SYMBOL, DEFAULT_INTRINSIC_PREFIX, DEFAULT_SPAWN_SYMBOL,
};
use crate::error::{ChainError, ConfigError};
use crate::infrastructure::concurrency;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "threadtrace.toml";
pub const DEFAULT_RELATIONSHIP_BATCH_SIZE: usize = 700;

/// Node labels dropped from the export unless configured otherwise.
pub const DEFAULT_EXCLUDED_LABELS: [&str; 8] = [
    "CatchClause",
    "FunctionScope",
    "LLVMIRLanguage",
    "LocalScope",
    "TranslationUnitDeclaration",
    "OverlayEdge",
    "UnknownLanguage",
    "UnknownType",
];

/// Relationship types dropped from the export unless configured otherwise.
pub const DEFAULT_EXCLUDED_RELATIONSHIPS: [&str; 7] = [
    "ASSIGNED_TYPES",
    "CANDIDATES",
    "LANGUAGE",
    "EOG",
    "SCOPE",
    "TYPE",
    "TYPE_OBSERVERS",
];

/// Analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Runtime entry call whose first argument is `main`. Default: `std::rt::lang_start`.
    pub entry_symbol: Option<String>,
    /// Demangled name of the spawn call. Default: `std::thread::spawn`.
    pub spawn_symbol: Option<String>,
    /// Call-name prefixes skipped when picking the thread entry. Default: `["llvm."]`.
    pub intrinsic_prefixes: Option<Vec<String>>,
    /// Custom spawn lowering. Default: the std library chain.
    pub chain: Option<Vec<ChainStep>>,
}

impl AnalysisConfig {
    pub fn effective_entry_symbol(&self) -> String {
        self.entry_symbol
            .clone()
            .unwrap_or_else(|| DEFAULT_ENTRY_SYMBOL.to_string())
    }

    pub fn effective_spawn_symbol(&self) -> String {
        self.spawn_symbol
            .clone()
            .unwrap_or_else(|| DEFAULT_SPAWN_SYMBOL.to_string())
    }

    pub fn effective_intrinsic_prefixes(&self) -> Vec<String> {
        self.intrinsic_prefixes
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_INTRINSIC_PREFIX.to_string()])
    }

    pub fn effective_chain(&self) -> Result<ChainSpec, ChainError> {
        match &self.chain {
            Some(steps) => ChainSpec::new(steps.clone()),
            None => Ok(ChainSpec::rust_std_spawn()),
        }
    }
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExportConfig {
    /// Rows per relationship batch. Default: 700.
    pub relationship_batch_size: Option<usize>,
    /// Export worker threads. Default: half the cores, at least 1.
    pub workers: Option<usize>,
    pub excluded_labels: Option<Vec<String>>,
    pub excluded_relationships: Option<Vec<String>>,
    /// On-disk store location. Default: in-memory store.
    pub store_path: Option<PathBuf>,
}

impl ExportConfig {
    pub fn effective_relationship_batch_size(&self) -> usize {
        self.relationship_batch_size
            .unwrap_or(DEFAULT_RELATIONSHIP_BATCH_SIZE)
            .max(1)
    }

    pub fn effective_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(concurrency::default_workers)
            .max(1)
    }

    pub fn effective_excluded_labels(&self) -> BTreeSet<String> {
        match &self.excluded_labels {
            Some(labels) => labels.iter().cloned().collect(),
            None => DEFAULT_EXCLUDED_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn effective_excluded_relationships(&self) -> BTreeSet<String> {
        match &self.excluded_relationships {
            Some(types) => types.iter().cloned().collect(),
            None => DEFAULT_EXCLUDED_RELATIONSHIPS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ThreadtraceConfig {
    pub analysis: AnalysisConfig,
    pub export: ExportConfig,
}

/// CLI override arguments, highest priority.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub store_path: Option<PathBuf>,
    pub workers: Option<usize>,
    pub relationship_batch_size: Option<usize>,
}

impl ThreadtraceConfig {
    /// Load `path` if given, else `threadtrace.toml` in the working directory
    /// when present, else defaults; then apply `cli`.
    pub fn load(path: Option<&Path>, cli: Option<&CliOverrides>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let local = Path::new(CONFIG_FILE_NAME);
                if local.exists() {
                    Self::from_file(local)?
                } else {
                    Self::default()
                }
            }
        };

        if let Some(cli) = cli {
            config.apply_cli_overrides(cli);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Self::parse(toml_str, "<string>")
    }

    fn parse(content: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(path) = &cli.store_path {
            self.export.store_path = Some(path.clone());
        }
        if let Some(workers) = cli.workers {
            self.export.workers = Some(workers);
        }
        if let Some(size) = cli.relationship_batch_size {
            self.export.relationship_batch_size = Some(size);
        }
    }

    /// Reject a chain definition that can never be followed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.effective_chain()?;
        Ok(())
    }
}
