//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `DOCSHELF_*`
//! env vars, with typed sections for the synchronizer, ranker, and vector
//! store. Also provides helpers to expand `~` and `${VAR}` and to resolve
//! relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::types::Metric;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("DOCSHELF_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract a typed section, falling back to its defaults when the key
    /// is absent.
    pub fn section<T>(&self, key: &str) -> T
    where
        T: serde::de::DeserializeOwned + Default,
    {
        self.figment.extract_inner(key).unwrap_or_default()
    }

    pub fn sync(&self) -> SyncConfig {
        self.section("sync")
    }

    pub fn library(&self) -> LibraryConfig {
        self.section("library")
    }

    pub fn rank(&self) -> RankConfig {
        self.section("rank")
    }

    pub fn vector(&self) -> VectorConfig {
        self.section("vector")
    }
}

/// Reconciliation worker tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after the last event for a path before reconciling it.
    pub debounce_ms: u64,
    /// Coalescing window for deletes, long enough for the matching create
    /// of a cross-directory move to arrive and resolve as a rename.
    pub delete_window_ms: u64,
    /// Scan interval of the polling fallback event source.
    pub poll_interval_ms: u64,
    /// Extraction attempts per revision before marking the document failed.
    pub max_extraction_retries: u32,
    /// Base delay between extraction attempts; doubles per attempt.
    pub retry_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            delete_window_ms: 1_000,
            poll_interval_ms: 30_000,
            max_extraction_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// The watched library root and which files in it are documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub root: String,
    /// Lower-case extensions considered library documents.
    pub extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: "~/Documents/library".to_string(),
            extensions: ["pdf", "txt", "md", "docx", "jpg", "jpeg", "png"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl LibraryConfig {
    pub fn root_path(&self) -> PathBuf {
        expand_path(&self.root)
    }
}

/// Hybrid score combination. Weights are deliberately configuration, not
/// constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    pub lexical_weight: f32,
    pub vector_weight: f32,
    /// Each index is asked for `overfetch * k` candidates before merging.
    pub overfetch: usize,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self { lexical_weight: 0.5, vector_weight: 0.5, overfetch: 3 }
    }
}

/// Vector store tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub metric: Metric,
    /// Below this many entries, search is an exact brute-force scan.
    pub exact_threshold: usize,
    /// Coarse lists probed per query once the store is above the threshold.
    pub nprobe: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { metric: Metric::Cosine, exact_threshold: 10_000, nprobe: 8 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after
/// expansion. If `p` is absolute, it's returned as-is.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::{Format, Toml};

    #[test]
    fn sections_fall_back_to_defaults() {
        let cfg = Config::from_figment(Figment::new());
        let sync = cfg.sync();
        assert_eq!(sync.debounce_ms, 200);
        assert_eq!(sync.max_extraction_retries, 3);
        assert_eq!(sync.retry_backoff_ms, 500);
        let rank = cfg.rank();
        assert!((rank.lexical_weight - rank.vector_weight).abs() < f32::EPSILON);
        assert_eq!(rank.overfetch, 3);
        assert_eq!(cfg.vector().metric, Metric::Cosine);
    }

    #[test]
    fn toml_overrides_partial_section() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [sync]
            debounce_ms = 50

            [rank]
            lexical_weight = 0.7
            vector_weight = 0.3

            [vector]
            metric = "l2"
            exact_threshold = 16
            "#,
        ));
        let cfg = Config::from_figment(figment);
        assert_eq!(cfg.sync().debounce_ms, 50);
        assert_eq!(cfg.sync().delete_window_ms, 1_000);
        assert!((cfg.rank().lexical_weight - 0.7).abs() < 1e-6);
        assert_eq!(cfg.vector().metric, Metric::L2);
        assert_eq!(cfg.vector().exact_threshold, 16);
    }

    #[test]
    fn resolve_with_base_keeps_absolute_paths() {
        let base = Path::new("/srv/library");
        assert_eq!(resolve_with_base(base, "/etc/docshelf"), PathBuf::from("/etc/docshelf"));
        assert_eq!(resolve_with_base(base, "inbox"), PathBuf::from("/srv/library/inbox"));
    }
}
