/// Import integration tests: directory-backed books, cycles and the shared cache.
use async_trait::async_trait;
use seed_engine::core::import::{BoxError, DirectoryLoader, ImportCache, ImportResolver};
use seed_engine::core::grammar;
use seed_engine::{Bindings, Document, DocumentLoader, Engine, EngineError, ImportError, Seed};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const FIXTURES: &str = "tests/fixtures";

fn fixture_engine() -> Engine {
    Engine::builder()
        .loader(Arc::new(DirectoryLoader::new(FIXTURES)))
        .build()
        .unwrap()
}

#[tokio::test]
async fn poster_imports_palette_under_alias() {
    let engine = fixture_engine();
    let book = engine.load("poster").await.unwrap();

    assert!(book.contains("ink.color"));
    assert!(book.contains("ink.shade"));
    assert!(book.contains("color"));
    assert_eq!(book.preamble.duration, 3.0);

    let mut seed = Seed::new("poster").unwrap();
    for _ in 0..40 {
        let text = engine.render(&book, &seed, 0.5).unwrap();
        assert!(text.starts_with("<h1 style=\"color: "));
        // The palette's own `color` wins inside the palette.
        assert!(!text.contains("black"), "{}", text);
        assert!(text.contains("teal") || text.contains("coral"), "{}", text);
        seed = seed.next();
    }
}

#[tokio::test]
async fn poster_frames_follow_the_timeline() {
    let engine = fixture_engine();
    let book = engine.load("poster").await.unwrap();
    let seed = Seed::new("frame").unwrap();

    let t = book.preamble.frame_time(4.5).unwrap();
    assert!((t - 0.5).abs() < 1e-12);
    let start = engine.render_frame(&book, &seed, 0.0).unwrap().unwrap();
    let again = engine.render_frame(&book, &seed, 3.0).unwrap().unwrap();
    assert_eq!(start, again);
    assert!(start.contains("left: 0px"));

    let mid = engine.render_frame(&book, &seed, 1.5).unwrap().unwrap();
    assert!(mid.contains("left: 180px"), "{}", mid);
    assert_eq!(
        start.replace("left: 0px", ""),
        mid.replace("left: 180px", "")
    );
}

#[tokio::test]
async fn mutually_importing_files_fail_with_cycle() {
    let engine = fixture_engine();
    let err = engine.load("loop_a").await.unwrap_err();
    match err {
        EngineError::Import(ImportError::Cycle { path }) => {
            assert_eq!(path, vec!["loop_a", "loop_b", "loop_a"]);
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_file_is_a_load_failure() {
    let engine = fixture_engine();
    let err = engine
        .parse("%preamble:\n- imports: no_such_book\nroot:\n- x\n")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "could not import document named \"no_such_book\": document not found"
    );
}

#[tokio::test]
async fn free_parse_entry_point_resolves_imports() {
    let loader = DirectoryLoader::new(FIXTURES);
    let book = seed_engine::parse(
        "%preamble:\n- imports: thank_you as note\nroot:\n- P.S. {{ note.root }}\n",
        &loader,
    )
    .await
    .unwrap();
    let text = seed_engine::generate(&book, "root", &Bindings::default(), &Seed::new("a").unwrap(), 0.0)
        .unwrap();
    assert_eq!(text, "P.S. Dear Aunt Emma, thank you for the purple vase.");
}

/// Loader that counts fetches and takes a while to answer.
struct SlowLoader {
    fetches: AtomicUsize,
}

#[async_trait]
impl DocumentLoader for SlowLoader {
    async fn load_document(&self, id: &str) -> Result<Option<Document>, BoxError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(match id {
            "lib" => Some(Document::new("word:\n- shared\n")),
            _ => None,
        })
    }
}

#[tokio::test]
async fn concurrent_parses_share_one_fetch() {
    let loader = Arc::new(SlowLoader {
        fetches: AtomicUsize::new(0),
    });
    let engine = Engine::builder().loader(loader.clone()).build().unwrap();
    let source = "%preamble:\n- imports: lib\nroot:\n- {{ lib.word }}\n";

    let (a, b, c) = tokio::join!(engine.parse(source), engine.parse(source), engine.parse(source));
    let seed = Seed::new("s").unwrap();
    for book in [a.unwrap(), b.unwrap(), c.unwrap()] {
        assert_eq!(engine.render(&book, &seed, 0.0).unwrap(), "shared");
    }
    assert_eq!(loader.fetches.load(Ordering::SeqCst), 1);

    engine.parse(source).await.unwrap();
    assert_eq!(loader.fetches.load(Ordering::SeqCst), 1);

    engine.clear_cache();
    engine.parse(source).await.unwrap();
    assert_eq!(loader.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn resolver_can_be_driven_directly() {
    let loader = DirectoryLoader::new(FIXTURES);
    let cache = ImportCache::new();
    let table = grammar::parse("%preamble:\n- imports: palette\nroot:\n- {{ palette.shade }}\n").unwrap();
    let resolved = ImportResolver::new(&loader, &cache).resolve(table).await.unwrap();
    assert_eq!(cache.len(), 1);
    assert!(resolved.contains("palette.color"));
    assert!(resolved.preamble.imports.len() == 1);
}
