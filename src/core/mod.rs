pub mod animate;
pub mod engine;
pub mod expand;
pub mod grammar;
pub mod import;
pub mod lint;
pub mod rng;
pub mod seed;
pub mod timeline;
