#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod entity;
pub mod extract;
pub mod layout;
pub mod reddit;
pub mod redgifs;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
pub use extract::{ExtractedMedia, Extractor};
