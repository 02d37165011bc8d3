//! Import resolver: fetches, parses and namespaces imported phrase books.
//!
//! An import `id as alias` merges every rule `x` of the imported document
//! into the importing table as `alias.x`. Inside the imported rules, every
//! reference to a name the imported document defines is rewritten to
//! `alias.name`, even when the importing document defines the same bare
//! name; references to names it does not define are left as written, so
//! they can pick up bound arguments or rules of the importer.

use async_trait::async_trait;
use futures::future::try_join_all;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::core::grammar::{self, ParseError};
use crate::schema::document::Document;
use crate::schema::rule_table::{ArgValue, RuleDef, RuleTable, Segment, NAMESPACE_SEPARATOR};

/// Error type loaders may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("import cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
    #[error("could not import document named \"{id}\": {reason}")]
    LoadFailure { id: String, reason: String },
    #[error("in imported document \"{id}\": {source}")]
    Parse { id: String, source: ParseError },
    #[error("import alias '{0}' is used twice")]
    DuplicateAlias(String),
    #[error("document imports \"{0}\" but no document loader is configured")]
    NoLoader(String),
}

/// Host capability that fetches stored documents by id.
///
/// `Ok(None)` means the document does not exist.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load_document(&self, id: &str) -> Result<Option<Document>, BoxError>;
}

/// Loader over an in-memory map of documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: HashMap<String, Document>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, document: impl Into<Document>) {
        self.documents.insert(id.into(), document.into());
    }

    pub fn with(mut self, id: impl Into<String>, document: impl Into<Document>) -> Self {
        self.insert(id, document);
        self
    }
}

#[async_trait]
impl DocumentLoader for MemoryLoader {
    async fn load_document(&self, id: &str) -> Result<Option<Document>, BoxError> {
        Ok(self.documents.get(id).cloned())
    }
}

/// Loader reading `<dir>/<id>.seed` files.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

/// File extension of phrase-book sources on disk.
pub const SOURCE_EXTENSION: &str = "seed";

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        // Ids are opaque but must not walk out of the directory.
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return None;
        }
        Some(self.root.join(format!("{}.{}", id, SOURCE_EXTENSION)))
    }
}

#[async_trait]
impl DocumentLoader for DirectoryLoader {
    async fn load_document(&self, id: &str) -> Result<Option<Document>, BoxError> {
        let Some(path) = self.path_for(id) else {
            return Ok(None);
        };
        match std::fs::read_to_string(&path) {
            Ok(source) => Ok(Some(Document::new(source))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }
}

/// Session-scoped cache of parsed (not yet resolved) documents.
///
/// Each id gets one cell; concurrent requests for an id await the same
/// in-flight fetch. Failed fetches leave the cell empty. Entries are never
/// invalidated except by [`ImportCache::clear`].
#[derive(Debug, Default)]
pub struct ImportCache {
    cells: Mutex<FxHashMap<String, Arc<OnceCell<Arc<RuleTable>>>>>,
}

impl ImportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached document, forcing the next import to refetch.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of ids with a parsed document cached.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|c| c.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FxHashMap<String, Arc<OnceCell<Arc<RuleTable>>>>> {
        // A poisoned map is still a valid map.
        self.cells.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cell(&self, id: &str) -> Arc<OnceCell<Arc<RuleTable>>> {
        self.lock().entry(id.to_string()).or_default().clone()
    }

    /// Fetch and parse `id`, or return the cached table.
    pub async fn get_or_fetch(
        &self,
        id: &str,
        loader: &dyn DocumentLoader,
    ) -> Result<Arc<RuleTable>, ImportError> {
        let cell = self.cell(id);
        let result = cell
            .get_or_try_init(|| async {
                debug!(id, "fetching document");
                let document = loader
                    .load_document(id)
                    .await
                    .map_err(|e| {
                        warn!(id, error = %e, "document loader failed");
                        ImportError::LoadFailure {
                            id: id.to_string(),
                            reason: e.to_string(),
                        }
                    })?
                    .ok_or_else(|| {
                        warn!(id, "document not found");
                        ImportError::LoadFailure {
                            id: id.to_string(),
                            reason: "document not found".to_string(),
                        }
                    })?;
                let table = grammar::parse(&document.source).map_err(|source| ImportError::Parse {
                    id: id.to_string(),
                    source,
                })?;
                Ok::<_, ImportError>(Arc::new(table))
            })
            .await
            .cloned();
        if result.is_err() {
            self.forget_failed(id, &cell);
        }
        result
    }

    /// Drop the empty cell a failed fetch left behind, unless another
    /// caller has since filled or replaced it.
    fn forget_failed(&self, id: &str, cell: &Arc<OnceCell<Arc<RuleTable>>>) {
        let mut cells = self.lock();
        if let Some(current) = cells.get(id) {
            if Arc::ptr_eq(current, cell) && !current.initialized() {
                cells.remove(id);
            }
        }
    }
}

/// Resolves the imports of a table against a loader and a cache.
pub struct ImportResolver<'a> {
    loader: &'a dyn DocumentLoader,
    cache: &'a ImportCache,
}

impl<'a> ImportResolver<'a> {
    pub fn new(loader: &'a dyn DocumentLoader, cache: &'a ImportCache) -> Self {
        Self { loader, cache }
    }

    /// Merge every transitive import of `table` into it.
    pub async fn resolve(&self, table: RuleTable) -> Result<RuleTable, ImportError> {
        let mut path = Vec::new();
        self.resolve_on_path(table, &mut path).await
    }

    /// Load the stored document `id` and resolve its imports.
    pub async fn load(&self, id: &str) -> Result<RuleTable, ImportError> {
        let table = self.cache.get_or_fetch(id, self.loader).await?;
        let mut path = vec![id.to_string()];
        self.resolve_on_path((*table).clone(), &mut path).await
    }

    async fn resolve_on_path(
        &self,
        mut table: RuleTable,
        path: &mut Vec<String>,
    ) -> Result<RuleTable, ImportError> {
        let imports = table.preamble.imports.clone();
        if imports.is_empty() {
            return Ok(table);
        }

        let mut aliases = FxHashSet::default();
        for import in &imports {
            if path.contains(&import.id) {
                let mut cycle = path.clone();
                cycle.push(import.id.clone());
                return Err(ImportError::Cycle { path: cycle });
            }
            if !aliases.insert(import.alias.as_str()) {
                return Err(ImportError::DuplicateAlias(import.alias.clone()));
            }
        }

        // Fetch direct imports concurrently; resolve them in order.
        let fetched = try_join_all(
            imports
                .iter()
                .map(|import| self.cache.get_or_fetch(&import.id, self.loader)),
        )
        .await?;

        for (import, imported) in imports.iter().zip(fetched) {
            path.push(import.id.clone());
            let resolved = Box::pin(self.resolve_on_path((*imported).clone(), path)).await;
            path.pop();
            let resolved = resolved?;
            debug!(
                id = %import.id,
                alias = %import.alias,
                rules = resolved.rules.len(),
                "merging import"
            );
            for rule in namespaced(resolved, &import.alias) {
                table.rules.insert(rule.name.clone(), rule);
            }
        }
        Ok(table)
    }
}

/// Qualify `name` with `alias`.
pub fn qualify(alias: &str, name: &str) -> String {
    format!("{}{}{}", alias, NAMESPACE_SEPARATOR, name)
}

/// Rename every rule of `table` into the `alias` namespace and rewrite the
/// references that point at them.
pub fn namespaced(table: RuleTable, alias: &str) -> Vec<RuleDef> {
    let defined: FxHashSet<String> = table.rules.keys().cloned().collect();
    // Argument names are never qualified, so a renamed reference keeps the
    // name it was written with for binding lookups.
    let rewrite = |name: &mut String, binding: &mut Option<String>| {
        if defined.contains(name.as_str()) {
            let qualified = qualify(alias, name);
            let written = std::mem::replace(name, qualified);
            binding.get_or_insert(written);
        }
    };

    let mut rules: Vec<RuleDef> = table.rules.into_values().collect();
    for rule in &mut rules {
        rule.name = qualify(alias, &rule.name);
        for variant in &mut rule.variants {
            for segment in &mut variant.template.segments {
                let Segment::Reference(r) = segment else {
                    continue;
                };
                if !r.animated {
                    rewrite(&mut r.name, &mut r.binding);
                }
                for arg in &mut r.args {
                    if let ArgValue::Ref(name) = &mut arg.value {
                        rewrite(name, &mut arg.binding);
                    }
                }
            }
        }
    }
    rules
}
