use skydiary_core::db::open_shared_db_in_memory;
use skydiary_core::model::post::{NewPost, Pagination, PostByTagQuery, PostListQuery};
use skydiary_core::repo::{
    PostRepository, PostTagRepository, RepositoryErrorCode, SqlitePostRepository,
    SqlitePostTagRepository, SqliteTagRepository, TagRepository,
};
use std::sync::Arc;
use uuid::Uuid;

struct Repos {
    posts: SqlitePostRepository,
    tags: SqliteTagRepository,
    links: SqlitePostTagRepository,
}

fn repos() -> Repos {
    let conn = open_shared_db_in_memory().unwrap();
    Repos {
        posts: SqlitePostRepository::try_new(Arc::clone(&conn)).unwrap(),
        tags: SqliteTagRepository::try_new(Arc::clone(&conn)).unwrap(),
        links: SqlitePostTagRepository::try_new(conn).unwrap(),
    }
}

fn new_post(actor_id: &str, record_key: &str, text: &str, posted_at: i64) -> NewPost {
    NewPost {
        actor_id: actor_id.to_string(),
        record_key: record_key.to_string(),
        text: text.to_string(),
        posted_at,
    }
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn repositories_refuse_unmigrated_connections() {
    let conn = skydiary_core::db::share(rusqlite::Connection::open_in_memory().unwrap());
    let err = SqlitePostRepository::try_new(conn).err().unwrap();
    assert_eq!(err.code, RepositoryErrorCode::SyntaxOrAccess);
}

#[test]
fn create_assigns_v7_id_and_timestamps() {
    let repos = repos();
    let post = repos
        .posts
        .create(&new_post("did:plc:abc", "3k1", "<p>hi</p>", 1_725_911_162_102))
        .unwrap();

    assert_eq!(post.id.get_version_num(), 7);
    assert_eq!(post.record_key, "3k1");
    assert_eq!(post.posted_at, 1_725_911_162_102);
    assert!(post.created_at > 0);
    assert_eq!(post.created_at, post.updated_at);
}

#[test]
fn duplicate_record_key_is_unique_violation_and_keeps_original() {
    let repos = repos();
    repos
        .posts
        .create(&new_post("did:plc:abc", "3k1", "<p>first</p>", 1))
        .unwrap();
    let err = repos
        .posts
        .create(&new_post("did:plc:abc", "3k1", "<p>second</p>", 2))
        .unwrap_err();
    assert_eq!(err.code, RepositoryErrorCode::UniqueViolation);

    let page = repos.posts.list(&PostListQuery::default()).unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].text, "<p>first</p>");
}

#[test]
fn list_orders_newest_first_and_paginates() {
    let repos = repos();
    for (index, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        repos
            .posts
            .create(&new_post("did:plc:abc", key, "<p>x</p>", index as i64))
            .unwrap();
    }

    let first = repos
        .posts
        .list(&PostListQuery {
            pagination: Pagination::new(1, 2),
            text: None,
        })
        .unwrap();
    assert_eq!(first.count, 5);
    let keys: Vec<&str> = first.items.iter().map(|post| post.record_key.as_str()).collect();
    assert_eq!(keys, vec!["e", "d"]);

    let last = repos
        .posts
        .list(&PostListQuery {
            pagination: Pagination::new(3, 2),
            text: None,
        })
        .unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].record_key, "a");

    let beyond = repos
        .posts
        .list(&PostListQuery {
            pagination: Pagination::new(9, 2),
            text: None,
        })
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.count, 5);
}

#[test]
fn text_filter_matches_literal_substrings() {
    let repos = repos();
    repos
        .posts
        .create(&new_post("did:plc:abc", "a", "<p>50% off #deal</p>", 1))
        .unwrap();
    repos
        .posts
        .create(&new_post("did:plc:abc", "b", "<p>500 items</p>", 2))
        .unwrap();

    let page = repos
        .posts
        .list(&PostListQuery {
            pagination: Pagination::default(),
            text: Some("0%".to_string()),
        })
        .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].record_key, "a");
}

#[test]
fn delete_by_record_leaves_sibling_posts() {
    let repos = repos();
    repos
        .posts
        .create(&new_post("did:plc:abc", "a", "<p>a</p>", 1))
        .unwrap();
    repos
        .posts
        .create(&new_post("did:plc:abc", "b", "<p>b</p>", 2))
        .unwrap();

    assert_eq!(repos.posts.delete_by_record("did:plc:abc", "a").unwrap(), 1);
    assert_eq!(repos.posts.delete_by_record("did:plc:abc", "a").unwrap(), 0);
    assert_eq!(repos.posts.delete_by_record("did:plc:other", "b").unwrap(), 0);

    let page = repos.posts.list(&PostListQuery::default()).unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].record_key, "b");
}

#[test]
fn delete_by_actor_removes_only_that_actor() {
    let repos = repos();
    repos
        .posts
        .create(&new_post("did:plc:abc", "a", "<p>a</p>", 1))
        .unwrap();
    repos
        .posts
        .create(&new_post("did:plc:abc", "b", "<p>b</p>", 2))
        .unwrap();
    repos
        .posts
        .create(&new_post("did:plc:other", "c", "<p>c</p>", 3))
        .unwrap();

    assert_eq!(repos.posts.delete_by_actor("did:plc:abc").unwrap(), 2);
    assert_eq!(repos.posts.list(&PostListQuery::default()).unwrap().count, 1);
    assert_eq!(repos.posts.delete_by_actor("did:plc:nobody").unwrap(), 0);
}

#[test]
fn upsert_many_is_idempotent_and_shares_tags_between_posts() {
    let repos = repos();
    let first = repos
        .posts
        .create(&new_post("did:plc:abc", "a", "<p>a</p>", 1))
        .unwrap();
    let second = repos
        .posts
        .create(&new_post("did:plc:abc", "b", "<p>b</p>", 2))
        .unwrap();

    let links = repos
        .links
        .upsert_many(first.id, &names(&["tech", "life", "tech"]))
        .unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].tag.name, "tech");
    assert_eq!(links[1].tag.name, "life");

    let replay = repos
        .links
        .upsert_many(first.id, &names(&["tech", "life"]))
        .unwrap();
    assert_eq!(replay, links);

    let other = repos
        .links
        .upsert_many(second.id, &names(&["tech"]))
        .unwrap();
    assert_eq!(other[0].tag.id, links[0].tag.id);

    let tags = repos.tags.list_all().unwrap();
    let tag_names: Vec<&str> = tags.iter().map(|tag| tag.name.as_str()).collect();
    assert_eq!(tag_names, vec!["life", "tech"]);

    let tech = repos.tags.get_by_name("tech").unwrap().unwrap();
    let tagged = repos
        .posts
        .list_by_tag(&PostByTagQuery {
            pagination: Pagination::default(),
            tag_id: tech.id,
        })
        .unwrap();
    assert_eq!(tagged.count, 2);
    assert_eq!(tagged.items[0].record_key, "b");
    assert!(repos.tags.get_by_name("missing").unwrap().is_none());
}

#[test]
fn upsert_many_for_missing_post_rolls_back_new_tags() {
    let repos = repos();
    let err = repos
        .links
        .upsert_many(Uuid::now_v7(), &names(&["orphan"]))
        .unwrap_err();
    assert_eq!(err.code, RepositoryErrorCode::ConstraintViolation);
    assert!(repos.tags.get_by_name("orphan").unwrap().is_none());
}

#[test]
fn upsert_many_rejects_empty_names_and_accepts_empty_input() {
    let repos = repos();
    let post = repos
        .posts
        .create(&new_post("did:plc:abc", "a", "<p>a</p>", 1))
        .unwrap();

    assert!(repos.links.upsert_many(post.id, &[]).unwrap().is_empty());
    let err = repos
        .links
        .upsert_many(post.id, &names(&["ok", ""]))
        .unwrap_err();
    assert_eq!(err.code, RepositoryErrorCode::Data);
    assert!(repos.tags.list_all().unwrap().is_empty());
}

#[test]
fn deleting_a_post_cascades_links_but_keeps_tags() {
    let repos = repos();
    let post = repos
        .posts
        .create(&new_post("did:plc:abc", "a", "<p>a</p>", 1))
        .unwrap();
    repos
        .links
        .upsert_many(post.id, &names(&["tech", "life"]))
        .unwrap();

    assert_eq!(repos.posts.delete_by_record("did:plc:abc", "a").unwrap(), 1);
    assert_eq!(repos.links.delete_by_post(post.id).unwrap(), 0);
    assert_eq!(repos.tags.list_all().unwrap().len(), 2);
}

#[test]
fn delete_by_post_removes_links_only() {
    let repos = repos();
    let post = repos
        .posts
        .create(&new_post("did:plc:abc", "a", "<p>a</p>", 1))
        .unwrap();
    repos
        .links
        .upsert_many(post.id, &names(&["tech", "life"]))
        .unwrap();

    assert_eq!(repos.links.delete_by_post(post.id).unwrap(), 2);
    assert_eq!(repos.posts.list(&PostListQuery::default()).unwrap().count, 1);
}
