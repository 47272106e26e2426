pub mod capture;
pub mod config;
pub mod emotion;
pub mod engine;
pub mod pixel;
pub mod signal;
pub mod util;

pub use engine::AffectEngine;
