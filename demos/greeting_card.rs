/// Greeting card example: a small phrase book that imports a shared palette,
/// passes arguments and animates a value over a bounce cycle.
///
/// Prints the same card for three neighbouring seeds, then plays a few
/// frames of the animation for the first one.
///
/// Run with: cargo run --example greeting_card

use seed_engine::core::import::MemoryLoader;
use seed_engine::{Bindings, Engine, Seed};
use std::sync::Arc;

const PALETTE: &str = "\
# Colours shared between cards.
color:
- [3] teal
- [2] coral
- [1] gold
shade:
- pale {{ color }}
- deep {{ color }}
";

const CARD: &str = "\
%preamble:
- duration: 4
- animation: bounce
- imports: palette as ink

root:
- <div style=\"color: {{ ink.shade }}; opacity: {{ ~ease(from: 0.2, to: 1) }}\">{{ card(name: $recipient) }}</div>

card:
- {{ greeting }}, {{ name }}! {{ wish }}
- {{ name }}, {{ greeting }}. {{ _ }}
  - And {{ wish }}
  - {{ wish }}

greeting:
- Happy birthday
- [0.5] Many happy returns

recipient:
- Ada
- Grace
- Hedy

wish:
- Have a {{ adjective }} year.
- Hope it is {{ adjective }}.

adjective:
- bright
- gentle
- splendid
";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let loader = MemoryLoader::new().with("palette", PALETTE);
    let engine = Engine::builder()
        .loader(Arc::new(loader))
        .build()
        .expect("Failed to build engine");

    let book = engine.parse(CARD).await.expect("Failed to parse card");
    println!("Parsed {} rules", book.rules.len());

    let first = Seed::new("card1").expect("valid seed");
    let mut seed = first.clone();
    for _ in 0..3 {
        let text = engine.render(&book, &seed, 0.0).expect("Failed to render");
        println!("\n[{}]\n{}", seed, text);
        seed = seed.next();
    }

    println!("\n--- Animation ({}s {}) ---", book.preamble.duration, book.preamble.animation);
    for step in 0..8 {
        let elapsed = step as f64;
        if let Some(t) = book.preamble.frame_time(elapsed) {
            let text = engine
                .generate(&book, "root", &Bindings::default(), &first, t)
                .expect("Failed to render frame");
            println!("{:>4.1}s  t={:.2}  {}", elapsed, t, text);
        }
    }
}
