//! Core of skydiary: mirrors one account's posts from a commit feed into a
//! local SQLite store.
//!
//! Data flows subscriber -> codec -> renderer -> resolver -> storage.

pub mod config;
pub mod db;
pub mod firehose;
pub mod logging;
pub mod model;
pub mod render;
pub mod repo;
pub mod resolver;
pub mod service;

pub use config::{ConfigError, FirehoseConfig, LocalConfig};
pub use db::{
    open_at, open_db, open_db_in_memory, open_shared_db, open_shared_db_in_memory, DbError,
    DbLocation,
};
pub use firehose::{run_feeds, DispatchMode, FeedError, FeedSubscriber, FrameSink};
pub use logging::{init_logging, LogLevel, LogSettings, LoggingError};
pub use model::event::{Commit, CommitEvent, POST_COLLECTION};
pub use model::post::{Pagination, Post, PostPage, PostTag, Tag};
pub use repo::{
    PostRepository, PostTagRepository, RepoResult, RepositoryError, RepositoryErrorCode,
    SqlitePostRepository, SqlitePostTagRepository, SqliteTagRepository, TagRepository,
};
pub use resolver::{
    AppViewResolver, EmbedView, OfflineViewResolver, RemoteViewResolver, ResolverError,
    StubViewResolver,
};
pub use service::{
    ApplicationError, DeleteScope, MaterializeOutcome, MaterializerOptions, PostMaterializer,
    PostQueryService,
};
