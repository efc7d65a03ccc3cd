//! Commit event domain model.
//!
//! # Responsibility
//! - Define the typed shape of one validated feed commit.
//! - Keep create/delete as a sum type so the materializer matches both.
//!
//! # Invariants
//! - Values of these types are only produced by `firehose::codec::decode`
//!   and therefore already satisfy every shape constraint.
//! - Facet offsets are byte offsets into the UTF-8 encoding of `text`.

use serde_json::Value;

/// Collection NSID for posts; the only collection this mirror materializes.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Decentralized identifier of the account that authored a commit.
pub type ActorId = String;

/// Record key of a record within an actor's collection.
pub type RecordKey = String;

/// One validated commit notification from the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitEvent {
    pub actor_id: ActorId,
    /// Feed timestamp in microseconds; doubles as the resume cursor.
    pub time_us: i64,
    pub commit: Commit,
}

impl CommitEvent {
    /// Record key targeted by this commit regardless of operation.
    pub fn record_key(&self) -> &str {
        match &self.commit {
            Commit::Create(create) => create.record_key.as_str(),
            Commit::Delete(delete) => delete.record_key.as_str(),
        }
    }

    /// Wire name of the commit operation.
    pub fn operation(&self) -> &'static str {
        match self.commit {
            Commit::Create(_) => "create",
            Commit::Delete(_) => "delete",
        }
    }
}

/// Commit variants, discriminated by `operation` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    Create(CreateCommit),
    Delete(DeleteCommit),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCommit {
    pub revision: String,
    pub collection: String,
    pub record_key: RecordKey,
    pub record: PostRecord,
    /// Content identifier (CID) of the new record.
    pub content_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCommit {
    pub revision: String,
    pub collection: String,
    pub record_key: RecordKey,
}

/// Post record body as written by the author.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub record_type: String,
    /// Author-declared creation time, epoch milliseconds.
    pub created_at_ms: i64,
    /// Original `createdAt` text, kept for diagnostics.
    pub created_at_raw: String,
    pub text: String,
    pub embed: Option<RecordEmbed>,
    pub facets: Vec<Facet>,
    pub languages: Vec<String>,
}

/// Embed declared inside the record. Only its `$type` is interpreted; the
/// rendered form comes from the remote view.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEmbed {
    pub kind: String,
    pub raw: Value,
}

/// Byte-range annotation over post text.
#[derive(Debug, Clone, PartialEq)]
pub struct Facet {
    pub byte_start: usize,
    pub byte_end: usize,
    pub features: Vec<FacetFeature>,
}

impl Facet {
    /// Convenience constructor for single-feature facets.
    pub fn new(byte_start: usize, byte_end: usize, feature: FacetFeature) -> Self {
        Self {
            byte_start,
            byte_end,
            features: vec![feature],
        }
    }

    pub fn link(&self) -> Option<&str> {
        self.features.iter().find_map(|feature| match feature {
            FacetFeature::Link { uri } => Some(uri.as_str()),
            _ => None,
        })
    }

    pub fn mention(&self) -> Option<&str> {
        self.features.iter().find_map(|feature| match feature {
            FacetFeature::Mention { did } => Some(did.as_str()),
            _ => None,
        })
    }

    /// All hashtag names carried by this facet, in feature order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.features.iter().filter_map(|feature| match feature {
            FacetFeature::Tag { tag } => Some(tag.as_str()),
            _ => None,
        })
    }
}

/// One facet feature.
///
/// `Unknown` preserves any feature this crate does not interpret, including
/// known kinds whose payload is incomplete.
#[derive(Debug, Clone, PartialEq)]
pub enum FacetFeature {
    Mention { did: String },
    Link { uri: String },
    Tag { tag: String },
    Unknown { kind: String, raw: Value },
}

pub const MENTION_FEATURE: &str = "app.bsky.richtext.facet#mention";
pub const LINK_FEATURE: &str = "app.bsky.richtext.facet#link";
pub const TAG_FEATURE: &str = "app.bsky.richtext.facet#tag";
