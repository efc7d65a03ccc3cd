//! Post markup rendering.
//!
//! # Responsibility
//! - `richtext`: facets to HTML, hashtag extraction (pure, no I/O).
//! - `embed`: paragraph wrapping plus resolved embed markup.

pub mod embed;
pub mod richtext;

pub use embed::compose_post_markup;
pub use richtext::{render, RenderOptions, RenderedText};
