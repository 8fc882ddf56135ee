//! Spec-level options (spec.md §6), loaded the way the rest of this workspace loads
//! configuration: a `#[derive(Deserialize)]` struct with defaults, readable from a TOML
//! file or string (mirroring this crate's original `ActorConfig::from_file`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// All spec-level options, grouped the way spec.md §6's table groups them (`gen.*`,
/// `run.*`, `report.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub gen: GenOptions,
    pub run: RunOptions,
    pub report: ReportOptions,
}

/// Generation-time options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenOptions {
    /// Number of parallel threads to generate; 0 means purely sequential.
    pub threads: usize,
    /// Max length of the sequential prefix, and of each parallel thread.
    pub max_length: usize,
    /// Upper bound passed through to argument sub-generators.
    pub max_size: u32,
}

impl Default for GenOptions {
    fn default() -> Self {
        GenOptions { threads: 0, max_length: 20, max_size: 200 }
    }
}

/// Run-time options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub num_tests: u32,
    pub max_tries: u32,
    /// Harness seed; `None` means derive one from the wall clock at run time.
    pub seed: Option<u64>,
    /// **Ambient addition** (spec.md §5: "Implementations may add a wall-clock timeout
    /// per program as a quality-of-life extension"). `None` disables it.
    #[serde(with = "duration_ms")]
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions { num_tests: 200, max_tries: 1, seed: None, timeout: None }
    }
}

/// Reporting options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    pub first_case: bool,
    pub stacktrace: bool,
}

impl Options {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.gen.threads = threads;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.gen.max_length = max_length;
        self
    }

    pub fn with_num_tests(mut self, num_tests: u32) -> Self {
        self.run.num_tests = num_tests;
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.run.max_tries = max_tries.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.run.seed = Some(seed);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.run.timeout = Some(timeout);
        self
    }

    /// Resolve the configured seed, deriving one from the wall clock when unset
    /// (spec.md §6: `run.seed` default is "wall-clock").
    pub fn resolved_seed(&self) -> u64 {
        self.run.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0)
        })
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(anyhow::Error::from)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}
