//! Domain model for mirrored posts.
//!
//! # Responsibility
//! - `event`: validated feed commits (input side).
//! - `post`: persisted posts, tags and their links (storage side).
//!
//! # Invariants
//! - Event types never reach storage directly; the materializer converts
//!   them into `NewPost` + tag names.

pub mod event;
pub mod post;
