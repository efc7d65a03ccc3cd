//! Commit feed ingestion.
//!
//! # Responsibility
//! - Decode raw feed frames into commit events (`codec`).
//! - Keep long-lived feed connections and hand frames to a sink
//!   (`subscriber`).

pub mod codec;
pub mod subscriber;

pub use codec::{decode, peek_frame, CodecError, FrameMeta};
pub use subscriber::{
    run_feeds, subscription_url, DispatchMode, FeedError, FeedSubscriber, FrameSink,
    SubscriptionOptions,
};
