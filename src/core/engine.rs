//! The engine façade: configuration, parsing with imports, and generation.
//!
//! ```no_run
//! # async fn demo() -> Result<(), seed_engine::core::engine::EngineError> {
//! use seed_engine::core::engine::Engine;
//! use seed_engine::core::seed::Seed;
//!
//! let engine = Engine::builder().max_depth(32).build()?;
//! let book = engine.parse("root:\n- Hello {{ who }}\nwho:\n- world\n").await?;
//! let text = engine.render(&book, &Seed::new("k3x9")?, 0.0)?;
//! assert_eq!(text, "Hello world");
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::core::expand::{Bindings, ExpandError, Interpreter, DEFAULT_MAX_DEPTH, MAX_DEPTH_LIMIT};
use crate::core::grammar::{self, ParseError};
use crate::core::import::{DocumentLoader, ImportCache, ImportError, ImportResolver};
use crate::core::rng::Generator;
use crate::core::seed::{Seed, SeedError, DEFAULT_SEED_LENGTH};
use crate::schema::rule_table::RuleTable;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Expand(#[from] ExpandError),
    #[error("{0}")]
    Import(#[from] ImportError),
    #[error("{0}")]
    Seed(#[from] SeedError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine settings, loadable from RON:
///
/// ```ron
/// (max_depth: 48, root_rule: "main", seed_length: 6)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest reference nesting before expansion fails.
    pub max_depth: usize,
    /// Rule rendered by [`Engine::render`].
    pub root_rule: String,
    /// Length of seeds drawn by [`Engine::new_seed`].
    pub seed_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            root_rule: "root".to_string(),
            seed_length: DEFAULT_SEED_LENGTH,
        }
    }
}

impl EngineConfig {
    pub fn load_from_ron(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth > MAX_DEPTH_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_depth must be at most {}, got {}",
                MAX_DEPTH_LIMIT, self.max_depth
            )));
        }
        if self.seed_length == 0 {
            return Err(ConfigError::Invalid("seed_length must be at least 1".to_string()));
        }
        if self.root_rule.is_empty() {
            return Err(ConfigError::Invalid("root_rule must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Parses phrase books and renders them. Holds the session import cache;
/// nothing else persists between calls.
pub struct Engine {
    config: EngineConfig,
    loader: Option<Arc<dyn DocumentLoader>>,
    cache: ImportCache,
}

/// Builder for constructing an `Engine`.
#[derive(Default)]
pub struct EngineBuilder {
    config_path: Option<PathBuf>,
    config: Option<EngineConfig>,
    loader: Option<Arc<dyn DocumentLoader>>,
    max_depth: Option<usize>,
    root_rule: Option<String>,
    seed_length: Option<usize>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse `source` and merge its imports.
    ///
    /// Tables are only returned fully resolved.
    pub async fn parse(&self, source: &str) -> Result<RuleTable, EngineError> {
        let table = grammar::parse(source)?;
        if table.preamble.imports.is_empty() {
            return Ok(table);
        }
        let Some(loader) = self.loader.as_deref() else {
            return Err(ImportError::NoLoader(table.preamble.imports[0].id.clone()).into());
        };
        let resolved = ImportResolver::new(loader, &self.cache).resolve(table).await?;
        debug!(rules = resolved.rules.len(), "resolved phrase book");
        Ok(resolved)
    }

    /// Load a stored document by id and resolve its imports.
    pub async fn load(&self, id: &str) -> Result<RuleTable, EngineError> {
        let loader = self
            .loader
            .as_deref()
            .ok_or_else(|| ImportError::NoLoader(id.to_string()))?;
        Ok(ImportResolver::new(loader, &self.cache).load(id).await?)
    }

    /// Expand `root` with `args` for `seed` at animation time `t`.
    pub fn generate(
        &self,
        table: &RuleTable,
        root: &str,
        args: &Bindings,
        seed: &Seed,
        t: f64,
    ) -> Result<String, EngineError> {
        let generator = Generator::from_seed(seed);
        Ok(Interpreter::new(table)
            .with_max_depth(self.config.max_depth)
            .expand(root, args, &generator, t)?)
    }

    /// Expand the configured root rule without arguments.
    pub fn render(&self, table: &RuleTable, seed: &Seed, t: f64) -> Result<String, EngineError> {
        self.generate(table, &self.config.root_rule, &Bindings::default(), seed, t)
    }

    /// Render the frame shown `elapsed` seconds into playback, or `None`
    /// once a `once` animation is over.
    pub fn render_frame(
        &self,
        table: &RuleTable,
        seed: &Seed,
        elapsed: f64,
    ) -> Result<Option<String>, EngineError> {
        match table.preamble.frame_time(elapsed) {
            Some(t) => self.render(table, seed, t).map(Some),
            None => Ok(None),
        }
    }

    /// A random seed for a new document.
    pub fn new_seed(&self) -> Seed {
        Seed::random_with_length(self.config.seed_length)
    }

    pub fn next_seed(&self, seed: &Seed) -> Seed {
        seed.next()
    }

    pub fn prev_seed(&self, seed: &Seed) -> Result<Seed, EngineError> {
        Ok(seed.prev()?)
    }

    /// Drop cached imports so the next parse refetches them.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl EngineBuilder {
    /// Load settings from a RON file. Individual overrides still apply.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Provide settings directly.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn root_rule(mut self, name: &str) -> Self {
        self.root_rule = Some(name.to_string());
        self
    }

    pub fn seed_length(mut self, length: usize) -> Self {
        self.seed_length = Some(length);
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let mut config = match (self.config, &self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(path)?,
            (None, None) => EngineConfig::default(),
        };
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(root_rule) = self.root_rule {
            config.root_rule = root_rule;
        }
        if let Some(seed_length) = self.seed_length {
            config.seed_length = seed_length;
        }
        config.validate()?;

        Ok(Engine {
            config,
            loader: self.loader,
            cache: ImportCache::new(),
        })
    }
}

/// Parse `source`, resolving imports through `loader` with a fresh cache.
pub async fn parse(source: &str, loader: &dyn DocumentLoader) -> Result<RuleTable, EngineError> {
    let table = grammar::parse(source)?;
    let cache = ImportCache::new();
    Ok(ImportResolver::new(loader, &cache).resolve(table).await?)
}

/// Expand `root` with the default settings.
pub fn generate(
    table: &RuleTable,
    root: &str,
    args: &Bindings,
    seed: &Seed,
    t: f64,
) -> Result<String, EngineError> {
    Ok(crate::core::expand::generate(table, root, args, seed, t)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::import::MemoryLoader;

    fn seed(token: &str) -> Seed {
        Seed::new(token).unwrap()
    }

    #[test]
    fn builder_defaults() {
        let engine = Engine::builder().build().unwrap();
        assert_eq!(engine.config(), &EngineConfig::default());
        assert_eq!(engine.config().max_depth, 64);
    }

    #[test]
    fn builder_overrides() {
        let engine = Engine::builder()
            .config(EngineConfig::parse_ron("(max_depth: 10)").unwrap())
            .root_rule("main")
            .seed_length(4)
            .build()
            .unwrap();
        assert_eq!(engine.config().max_depth, 10);
        assert_eq!(engine.config().root_rule, "main");
        assert_eq!(engine.new_seed().as_str().len(), 4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(EngineConfig::parse_ron("(seed_length: 0)").is_err());
        assert!(EngineConfig::parse_ron("(max_depth: \"deep\")").is_err());
        assert!(Engine::builder().root_rule("").build().is_err());
    }

    #[test]
    fn oversized_depth_is_rejected() {
        let err = EngineConfig::parse_ron("(max_depth: 100000)").unwrap_err();
        assert_eq!(err.to_string(), "invalid config: max_depth must be at most 256, got 100000");
        assert!(matches!(
            Engine::builder().max_depth(5_000).build(),
            Err(EngineError::Config(ConfigError::Invalid(_)))
        ));
        assert!(Engine::builder().max_depth(MAX_DEPTH_LIMIT).build().is_ok());
    }

    #[test]
    fn missing_config_file_is_error() {
        let result = Engine::builder()
            .config_file("tests/fixtures/does_not_exist.ron")
            .build();
        assert!(matches!(result, Err(EngineError::Config(ConfigError::Io(_)))));
    }

    #[tokio::test]
    async fn parse_and_render() {
        let engine = Engine::builder().build().unwrap();
        let book = engine.parse("root:\n- Hi {{ who }}\nwho:\n- you\n").await.unwrap();
        assert_eq!(engine.render(&book, &seed("a"), 0.0).unwrap(), "Hi you");
    }

    #[tokio::test]
    async fn imports_without_loader_fail() {
        let engine = Engine::builder().build().unwrap();
        let err = engine
            .parse("%preamble:\n- imports: lib\nroot:\n- a\n")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Import(ImportError::NoLoader(ref id)) if id == "lib"));
    }

    #[tokio::test]
    async fn configured_depth_applies() {
        let engine = Engine::builder().max_depth(3).build().unwrap();
        let book = engine.parse("root:\n- {{ a }}\na:\n- {{ b }}\nb:\n- {{ c }}\nc:\n- {{ d }}\nd:\n- deep\n").await.unwrap();
        assert!(matches!(
            engine.render(&book, &seed("a"), 0.0),
            Err(EngineError::Expand(ExpandError::RecursionLimit { ref rule, limit: 3 })) if rule == "d"
        ));
        let deeper = Engine::builder().max_depth(4).build().unwrap();
        assert_eq!(deeper.render(&book, &seed("a"), 0.0).unwrap(), "deep");
    }

    #[tokio::test]
    async fn load_by_id_and_clear_cache() {
        let loader = Arc::new(MemoryLoader::new().with("sketch", "root:\n- stored\n"));
        let engine = Engine::builder().loader(loader).build().unwrap();
        let book = engine.load("sketch").await.unwrap();
        assert_eq!(engine.render(&book, &seed("a"), 0.0).unwrap(), "stored");
        engine.clear_cache();
        assert!(matches!(
            engine.load("missing").await,
            Err(EngineError::Import(ImportError::LoadFailure { .. }))
        ));
    }

    #[tokio::test]
    async fn render_frame_stops_after_once() {
        let engine = Engine::builder().build().unwrap();
        let book = engine
            .parse("%preamble:\n- duration: 1\n- animation: once\nroot:\n- {{ ~lerp(from: 0, to: 10) }}\n")
            .await
            .unwrap();
        assert_eq!(
            engine.render_frame(&book, &seed("a"), 0.5).unwrap(),
            Some("5".to_string())
        );
        assert_eq!(engine.render_frame(&book, &seed("a"), 1.5).unwrap(), None);
    }

    #[tokio::test]
    async fn free_functions() {
        let loader = MemoryLoader::new().with("lib", "v:\n- from lib\n");
        let book = parse("%preamble:\n- imports: lib\nroot:\n- {{ lib.v }}\n", &loader)
            .await
            .unwrap();
        assert_eq!(
            generate(&book, "root", &Bindings::default(), &seed("a"), 0.0).unwrap(),
            "from lib"
        );
    }
}
