#![allow(dead_code)]

use serde_json::{json, Value};

pub const ACTOR: &str = "did:plc:ewvi7nxzyoun6zhxrhs64oiz";

/// Tag facet covering `#name` starting at byte `start`.
pub fn tag_facet(start: usize, name: &str) -> Value {
    json!({
        "index": { "byteStart": start, "byteEnd": start + name.len() + 1 },
        "features": [{ "$type": "app.bsky.richtext.facet#tag", "tag": name }]
    })
}

/// Jetstream create commit frame for a post.
pub fn create_frame(record_key: &str, text: &str, facets: Vec<Value>) -> Vec<u8> {
    create_frame_for(ACTOR, record_key, text, facets, 1_725_911_162_329_308)
}

pub fn create_frame_for(
    actor_id: &str,
    record_key: &str,
    text: &str,
    facets: Vec<Value>,
    time_us: i64,
) -> Vec<u8> {
    json!({
        "did": actor_id,
        "time_us": time_us,
        "kind": "commit",
        "commit": {
            "rev": "3l3qo2vutsw2b",
            "operation": "create",
            "collection": "app.bsky.feed.post",
            "rkey": record_key,
            "record": {
                "$type": "app.bsky.feed.post",
                "createdAt": "2024-09-09T19:46:02.102Z",
                "langs": ["en"],
                "text": text,
                "facets": facets
            },
            "cid": "bafyreidwaivazkwu67xztlmuobx35hs2lnfh3kolmgfmucldvhd3sgzcqi"
        }
    })
    .to_string()
    .into_bytes()
}

pub fn delete_frame(record_key: &str) -> Vec<u8> {
    delete_frame_for(ACTOR, record_key, 1_725_911_162_429_308)
}

pub fn delete_frame_for(actor_id: &str, record_key: &str, time_us: i64) -> Vec<u8> {
    json!({
        "did": actor_id,
        "time_us": time_us,
        "kind": "commit",
        "commit": {
            "rev": "3l3qo2vutsw2c",
            "operation": "delete",
            "collection": "app.bsky.feed.post",
            "rkey": record_key
        }
    })
    .to_string()
    .into_bytes()
}
