//! WASM bindings for seed-engine, used by the browser editor.
//!
//! Imports are served from a JSON map of documents handed over by the host:
//! `{ "palette": "color:\n- teal\n", "frame": { "source": "...", "seed": "k3x9" } }`.

use std::collections::HashMap;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

use seed_engine::core::import::MemoryLoader;
use seed_engine::{Bindings, Document, Engine, RuleTable, Seed};

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum DocumentInput {
    Source(String),
    Full(Document),
}

impl From<DocumentInput> for Document {
    fn from(input: DocumentInput) -> Self {
        match input {
            DocumentInput::Source(source) => Document::new(source),
            DocumentInput::Full(document) => document,
        }
    }
}

#[derive(serde::Serialize)]
struct BookInfo {
    rules: Vec<String>,
    duration: f64,
    animation: String,
    imports: Vec<String>,
}

fn parse_documents(json: &str) -> Result<MemoryLoader, JsError> {
    let documents: HashMap<String, DocumentInput> = if json.trim().is_empty() {
        HashMap::new()
    } else {
        serde_json::from_str(json).map_err(|e| JsError::new(&format!("invalid documents JSON: {}", e)))?
    };
    let mut loader = MemoryLoader::new();
    for (id, document) in documents {
        loader.insert(id, document);
    }
    Ok(loader)
}

fn parse_args(json: &str) -> Result<Bindings, JsError> {
    if json.trim().is_empty() {
        return Ok(Bindings::default());
    }
    let args: HashMap<String, String> =
        serde_json::from_str(json).map_err(|e| JsError::new(&format!("invalid arguments JSON: {}", e)))?;
    Ok(args.into_iter().collect())
}

fn build_engine(loader: MemoryLoader) -> Result<Engine, JsError> {
    Engine::builder()
        .loader(Arc::new(loader))
        .build()
        .map_err(|e| JsError::new(&e.to_string()))
}

// ---------------------------------------------------------------------------
// Editor session
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct SeedStudio {
    engine: Engine,
    loader: MemoryLoader,
    book: Option<RuleTable>,
}

#[wasm_bindgen]
impl SeedStudio {
    /// Create a session over a JSON map of importable documents.
    #[wasm_bindgen(constructor)]
    pub fn new(documents_json: &str) -> Result<SeedStudio, JsError> {
        let loader = parse_documents(documents_json)?;
        Ok(SeedStudio {
            engine: build_engine(loader.clone())?,
            loader,
            book: None,
        })
    }

    /// Add or replace an importable document. Cached imports are dropped.
    pub fn set_document(&mut self, id: &str, source: &str) -> Result<(), JsError> {
        self.loader.insert(id, source);
        self.engine = build_engine(self.loader.clone())?;
        Ok(())
    }

    /// Parse and resolve the book being edited. Returns a JSON summary.
    pub fn parse(&mut self, source: &str) -> Result<String, JsError> {
        let book = futures::executor::block_on(self.engine.parse(source))
            .map_err(|e| JsError::new(&e.to_string()))?;
        let info = BookInfo {
            rules: book.names().into_iter().map(str::to_string).collect(),
            duration: book.preamble.duration,
            animation: book.preamble.animation.to_string(),
            imports: book.preamble.imports.iter().map(|i| i.alias.clone()).collect(),
        };
        self.book = Some(book);
        serde_json::to_string(&info).map_err(|e| JsError::new(&e.to_string()))
    }

    /// Render `rule` of the parsed book. `args_json` is an object of string
    /// arguments, or empty.
    pub fn generate(&self, rule: &str, args_json: &str, seed: &str, t: f64) -> Result<String, JsError> {
        let book = self
            .book
            .as_ref()
            .ok_or_else(|| JsError::new("no book parsed yet"))?;
        let args = parse_args(args_json)?;
        let seed = Seed::new(seed).map_err(|e| JsError::new(&e.to_string()))?;
        self.engine
            .generate(book, rule, &args, &seed, t)
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Animation time for a frame `elapsed` seconds into playback, or
    /// `undefined` once a `once` animation has finished.
    pub fn frame_time(&self, elapsed: f64) -> Option<f64> {
        let book = self.book.as_ref()?;
        book.preamble.frame_time(elapsed)
    }
}

// ---------------------------------------------------------------------------
// Seed picker
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub fn next_seed(seed: &str) -> Result<String, JsError> {
    let seed = Seed::new(seed).map_err(|e| JsError::new(&e.to_string()))?;
    Ok(seed.next().to_string())
}

#[wasm_bindgen]
pub fn prev_seed(seed: &str) -> Result<String, JsError> {
    let seed = Seed::new(seed).map_err(|e| JsError::new(&e.to_string()))?;
    seed.prev()
        .map(|s| s.to_string())
        .map_err(|e| JsError::new(&e.to_string()))
}

#[wasm_bindgen]
pub fn random_seed() -> String {
    Seed::random().to_string()
}
