//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate codec, renderer, resolver and storage calls into use-cases.
//! - Keep the feed and CLI layers decoupled from storage details.

pub mod error;
pub mod materializer;
pub mod post_query_service;

pub use error::{ApplicationError, ApplicationErrorCause};
pub use materializer::{DeleteScope, MaterializeOutcome, MaterializerOptions, PostMaterializer};
pub use post_query_service::PostQueryService;
