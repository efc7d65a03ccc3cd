//! Commit event codec.
//!
//! # Responsibility
//! - Decode one raw feed frame into a validated [`CommitEvent`].
//! - Classify the commit as create or delete.
//! - Offer a lenient peek used for routing and resume cursors.
//!
//! # Invariants
//! - Decoding is pure: no I/O, no logging, no clock access.
//! - Bytes that are not JSON fail with `MalformedEncoding`; well-formed JSON
//!   that does not fit the commit shape fails with `SchemaViolation`.

use crate::model::event::{
    Commit, CommitEvent, CreateCommit, DeleteCommit, Facet, FacetFeature, PostRecord,
    RecordEmbed, LINK_FEATURE, MENTION_FEATURE, POST_COLLECTION, TAG_FEATURE,
};
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

static DID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^did:[a-z]+:[a-zA-Z0-9._:%-]*[a-zA-Z0-9._-]$").expect("valid did regex")
});
static RECORD_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._:~-]{1,512}$").expect("valid record key regex"));

const COMMIT_KIND: &str = "commit";

/// Decoding failure for one frame.
#[derive(Debug)]
pub enum CodecError {
    /// Bytes are not well-formed JSON.
    MalformedEncoding(serde_json::Error),
    /// Well-formed JSON violating the commit event shape.
    SchemaViolation { details: String },
}

impl CodecError {
    fn violation(details: impl Into<String>) -> Self {
        Self::SchemaViolation {
            details: details.into(),
        }
    }
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedEncoding(err) => write!(f, "malformed event encoding: {err}"),
            Self::SchemaViolation { details } => write!(f, "invalid commit event: {details}"),
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MalformedEncoding(err) => Some(err),
            Self::SchemaViolation { .. } => None,
        }
    }
}

/// Routing metadata readable from a frame even when it fails validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMeta {
    pub actor_id: Option<String>,
    pub record_key: Option<String>,
    pub time_us: Option<i64>,
}

#[derive(Deserialize)]
struct WireEvent {
    did: String,
    time_us: i64,
    kind: String,
    commit: WireCommit,
}

#[derive(Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
enum WireCommit {
    Create(WireCreate),
    Delete(WireDelete),
}

#[derive(Deserialize)]
struct WireCreate {
    rev: String,
    collection: String,
    rkey: String,
    record: WireRecord,
    cid: String,
}

#[derive(Deserialize)]
struct WireDelete {
    rev: String,
    collection: String,
    rkey: String,
}

#[derive(Deserialize)]
struct WireRecord {
    #[serde(rename = "$type")]
    record_type: String,
    #[serde(rename = "createdAt")]
    created_at: String,
    text: String,
    embed: Option<Value>,
    facets: Option<Vec<WireFacet>>,
    langs: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct WireFacet {
    index: WireByteSlice,
    features: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireByteSlice {
    byte_start: u64,
    byte_end: u64,
}

/// Decodes and validates one feed frame.
///
/// # Errors
/// - `MalformedEncoding` when `bytes` is not UTF-8 JSON.
/// - `SchemaViolation` when a required field is missing or mistyped, the
///   operation is unknown, the collection is not posts, `createdAt` is not
///   an ISO-8601 timestamp with offset, or text/identifiers are invalid.
pub fn decode(bytes: &[u8]) -> Result<CommitEvent, CodecError> {
    let value: Value = serde_json::from_slice(bytes).map_err(CodecError::MalformedEncoding)?;
    let wire: WireEvent = serde_json::from_value(value)
        .map_err(|err| CodecError::violation(err.to_string()))?;

    if wire.kind != COMMIT_KIND {
        return Err(CodecError::violation(format!(
            "expected kind `{COMMIT_KIND}`, got `{}`",
            wire.kind
        )));
    }
    validate_did(&wire.did)?;

    let commit = match wire.commit {
        WireCommit::Create(create) => Commit::Create(convert_create(create)?),
        WireCommit::Delete(delete) => Commit::Delete(convert_delete(delete)?),
    };

    Ok(CommitEvent {
        actor_id: wire.did,
        time_us: wire.time_us,
        commit,
    })
}

/// Reads actor, record key and feed timestamp without validating the frame.
///
/// Never fails; unreadable fields are `None`.
pub fn peek_frame(bytes: &[u8]) -> FrameMeta {
    let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
        return FrameMeta::default();
    };

    FrameMeta {
        actor_id: value.get("did").and_then(Value::as_str).map(str::to_string),
        record_key: value
            .get("commit")
            .and_then(|commit| commit.get("rkey"))
            .and_then(Value::as_str)
            .map(str::to_string),
        time_us: value.get("time_us").and_then(Value::as_i64),
    }
}

fn convert_create(wire: WireCreate) -> Result<CreateCommit, CodecError> {
    require_non_empty("commit.rev", &wire.rev)?;
    require_non_empty("commit.cid", &wire.cid)?;
    validate_collection(&wire.collection)?;
    validate_record_key(&wire.rkey)?;

    Ok(CreateCommit {
        revision: wire.rev,
        collection: wire.collection,
        record_key: wire.rkey,
        record: convert_record(wire.record)?,
        content_id: wire.cid,
    })
}

fn convert_delete(wire: WireDelete) -> Result<DeleteCommit, CodecError> {
    require_non_empty("commit.rev", &wire.rev)?;
    validate_collection(&wire.collection)?;
    validate_record_key(&wire.rkey)?;

    Ok(DeleteCommit {
        revision: wire.rev,
        collection: wire.collection,
        record_key: wire.rkey,
    })
}

fn convert_record(wire: WireRecord) -> Result<PostRecord, CodecError> {
    if wire.record_type != POST_COLLECTION {
        return Err(CodecError::violation(format!(
            "record.$type must be `{POST_COLLECTION}`, got `{}`",
            wire.record_type
        )));
    }
    require_non_empty("record.text", &wire.text)?;

    let created_at = DateTime::parse_from_rfc3339(&wire.created_at).map_err(|err| {
        CodecError::violation(format!(
            "record.createdAt `{}` is not an ISO-8601 timestamp with offset: {err}",
            wire.created_at
        ))
    })?;

    let embed = wire.embed.map(convert_embed).transpose()?;

    let languages = wire.langs.unwrap_or_default();
    if languages.iter().any(|lang| lang.is_empty()) {
        return Err(CodecError::violation("record.langs must not contain empty values"));
    }

    let facets = wire
        .facets
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(idx, facet)| convert_facet(idx, facet))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PostRecord {
        record_type: wire.record_type,
        created_at_ms: created_at.timestamp_millis(),
        created_at_raw: wire.created_at,
        text: wire.text,
        embed,
        facets,
        languages,
    })
}

fn convert_embed(raw: Value) -> Result<RecordEmbed, CodecError> {
    let kind = type_tag(&raw)
        .ok_or_else(|| CodecError::violation("record.embed requires a non-empty `$type`"))?
        .to_string();
    Ok(RecordEmbed { kind, raw })
}

fn convert_facet(idx: usize, wire: WireFacet) -> Result<Facet, CodecError> {
    let byte_start = usize::try_from(wire.index.byte_start).map_err(|_| {
        CodecError::violation(format!("record.facets[{idx}].index.byteStart out of range"))
    })?;
    let byte_end = usize::try_from(wire.index.byte_end).map_err(|_| {
        CodecError::violation(format!("record.facets[{idx}].index.byteEnd out of range"))
    })?;

    let features = wire
        .features
        .into_iter()
        .map(|raw| {
            convert_feature(raw).ok_or_else(|| {
                CodecError::violation(format!(
                    "record.facets[{idx}].features entries require a non-empty `$type`"
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Facet {
        byte_start,
        byte_end,
        features,
    })
}

/// Classifies one feature. Returns `None` only when `$type` is missing.
fn convert_feature(raw: Value) -> Option<FacetFeature> {
    let kind = type_tag(&raw)?.to_string();
    let field = |name: &str| {
        raw.get(name)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let known = match kind.as_str() {
        MENTION_FEATURE => field("did").map(|did| FacetFeature::Mention { did }),
        LINK_FEATURE => field("uri").map(|uri| FacetFeature::Link { uri }),
        TAG_FEATURE => field("tag").map(|tag| FacetFeature::Tag { tag }),
        _ => None,
    };

    Some(known.unwrap_or(FacetFeature::Unknown { kind, raw }))
}

fn type_tag(value: &Value) -> Option<&str> {
    value
        .get("$type")
        .and_then(Value::as_str)
        .filter(|kind| !kind.is_empty())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), CodecError> {
    if value.is_empty() {
        return Err(CodecError::violation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_collection(collection: &str) -> Result<(), CodecError> {
    if collection != POST_COLLECTION {
        return Err(CodecError::violation(format!(
            "commit.collection must be `{POST_COLLECTION}`, got `{collection}`"
        )));
    }
    Ok(())
}

fn validate_did(did: &str) -> Result<(), CodecError> {
    if !DID_RE.is_match(did) {
        return Err(CodecError::violation(format!("`{did}` is not a valid did")));
    }
    Ok(())
}

fn validate_record_key(rkey: &str) -> Result<(), CodecError> {
    if rkey == "." || rkey == ".." || !RECORD_KEY_RE.is_match(rkey) {
        return Err(CodecError::violation(format!(
            "`{rkey}` is not a valid record key"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{decode, peek_frame, CodecError};
    use crate::model::event::{Commit, FacetFeature};
    use serde_json::json;

    fn create_frame(record: serde_json::Value) -> Vec<u8> {
        json!({
            "did": "did:plc:abc123",
            "time_us": 1_725_911_162_329_308_i64,
            "kind": "commit",
            "commit": {
                "rev": "3l3qo2vutsw2b",
                "operation": "create",
                "collection": "app.bsky.feed.post",
                "rkey": "3l3qo2vuowo2b",
                "record": record,
                "cid": "bafyreidwaivazkwu67xztlmuobx35hs2lnfh3kolmgfmucldvhd3sgzcqi"
            }
        })
        .to_string()
        .into_bytes()
    }

    fn post_record(text: &str) -> serde_json::Value {
        json!({
            "$type": "app.bsky.feed.post",
            "createdAt": "2024-09-09T19:46:02.102Z",
            "text": text,
        })
    }

    #[test]
    fn non_json_bytes_are_malformed() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, CodecError::MalformedEncoding(_)));
    }

    #[test]
    fn unknown_operation_is_schema_violation() {
        let err = decode(br#"{"kind":"commit","commit":{"operation":"unknown"}}"#).unwrap_err();
        assert!(matches!(err, CodecError::SchemaViolation { .. }));

        let frame = json!({
            "did": "did:plc:abc123",
            "time_us": 1,
            "kind": "commit",
            "commit": {
                "rev": "r",
                "operation": "update",
                "collection": "app.bsky.feed.post",
                "rkey": "k"
            }
        });
        let err = decode(frame.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, CodecError::SchemaViolation { .. }));
    }

    #[test]
    fn create_commit_decodes_with_facets() {
        let mut record = post_record("hello #tech");
        record["facets"] = json!([{
            "index": { "byteStart": 6, "byteEnd": 11 },
            "features": [
                { "$type": "app.bsky.richtext.facet#tag", "tag": "tech" },
                { "$type": "com.example.custom#thing", "value": 1 }
            ]
        }]);
        record["langs"] = json!(["en"]);

        let event = decode(&create_frame(record)).unwrap();
        assert_eq!(event.actor_id, "did:plc:abc123");
        assert_eq!(event.operation(), "create");
        let Commit::Create(create) = event.commit else {
            panic!("expected create commit");
        };
        assert_eq!(create.record.text, "hello #tech");
        assert_eq!(create.record.languages, vec!["en".to_string()]);
        assert_eq!(create.record.created_at_ms, 1_725_911_162_102);
        let facet = &create.record.facets[0];
        assert_eq!((facet.byte_start, facet.byte_end), (6, 11));
        assert_eq!(
            facet.features[0],
            FacetFeature::Tag {
                tag: "tech".to_string()
            }
        );
        assert!(matches!(
            &facet.features[1],
            FacetFeature::Unknown { kind, .. } if kind == "com.example.custom#thing"
        ));
    }

    #[test]
    fn delete_commit_decodes_without_record() {
        let frame = json!({
            "did": "did:plc:abc123",
            "time_us": 42,
            "kind": "commit",
            "commit": {
                "rev": "3l3f6nzl3cv2s",
                "operation": "delete",
                "collection": "app.bsky.feed.post",
                "rkey": "3l3f6nzl3cv2s"
            }
        });
        let event = decode(frame.to_string().as_bytes()).unwrap();
        assert!(matches!(event.commit, Commit::Delete(_)));
        assert_eq!(event.record_key(), "3l3f6nzl3cv2s");
    }

    #[test]
    fn timestamp_without_offset_is_rejected() {
        let mut record = post_record("hi");
        record["createdAt"] = json!("2024-09-09 19:46:02");
        let err = decode(&create_frame(record)).unwrap_err();
        match err {
            CodecError::SchemaViolation { details } => assert!(details.contains("createdAt")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_text_and_wrong_collection_are_rejected() {
        assert!(matches!(
            decode(&create_frame(post_record(""))).unwrap_err(),
            CodecError::SchemaViolation { .. }
        ));

        let mut record = post_record("hi");
        record["$type"] = json!("app.bsky.feed.like");
        assert!(matches!(
            decode(&create_frame(record)).unwrap_err(),
            CodecError::SchemaViolation { .. }
        ));
    }

    #[test]
    fn non_commit_kind_is_rejected() {
        let frame = json!({
            "did": "did:plc:abc123",
            "time_us": 42,
            "kind": "identity",
            "commit": { "operation": "delete", "rev": "r", "collection": "app.bsky.feed.post", "rkey": "k" }
        });
        assert!(matches!(
            decode(frame.to_string().as_bytes()).unwrap_err(),
            CodecError::SchemaViolation { .. }
        ));
    }

    #[test]
    fn feature_without_type_is_rejected() {
        let mut record = post_record("hello");
        record["facets"] = json!([{
            "index": { "byteStart": 0, "byteEnd": 5 },
            "features": [{ "tag": "x" }]
        }]);
        assert!(matches!(
            decode(&create_frame(record)).unwrap_err(),
            CodecError::SchemaViolation { .. }
        ));
    }

    #[test]
    fn peek_reads_routing_fields_from_invalid_frames() {
        let meta = peek_frame(br#"{"did":"did:plc:x","time_us":7,"commit":{"rkey":"k1"}}"#);
        assert_eq!(meta.actor_id.as_deref(), Some("did:plc:x"));
        assert_eq!(meta.record_key.as_deref(), Some("k1"));
        assert_eq!(meta.time_us, Some(7));

        assert_eq!(peek_frame(b"garbage"), Default::default());
    }
}
