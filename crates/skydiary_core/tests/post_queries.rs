use skydiary_core::model::post::{NewPost, Pagination, PostPage, Tag};
use skydiary_core::repo::{
    InMemoryStore, PostRepository, PostTagRepository, RepositoryErrorCode, StoreOperation,
};
use skydiary_core::service::post_query_service::{LIST_POSTS_BY_TAG_NAME, LIST_TAGS};
use skydiary_core::PostQueryService;
use uuid::Uuid;

fn seed(store: &InMemoryStore, record_key: &str, text: &str, posted_at: i64, tags: &[&str]) {
    let post = store
        .post_repository()
        .create(&NewPost {
            actor_id: "did:plc:abc".to_string(),
            record_key: record_key.to_string(),
            text: text.to_string(),
            posted_at,
        })
        .unwrap();
    if !tags.is_empty() {
        let names: Vec<String> = tags.iter().map(|tag| tag.to_string()).collect();
        store
            .post_tag_repository()
            .upsert_many(post.id, &names)
            .unwrap();
    }
}

fn service(store: &InMemoryStore) -> PostQueryService<
    skydiary_core::repo::InMemoryPostRepository,
    skydiary_core::repo::InMemoryTagRepository,
> {
    PostQueryService::new(store.post_repository(), store.tag_repository())
}

#[test]
fn list_posts_defaults_to_first_page_of_ten() {
    let store = InMemoryStore::new();
    for index in 0..12 {
        seed(&store, &format!("k{index}"), "<p>x</p>", index, &[]);
    }

    let page = service(&store)
        .list_posts(Pagination::default(), None)
        .unwrap();
    assert_eq!(page.count, 12);
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.items[0].record_key, "k11");
}

#[test]
fn list_by_tag_name_uses_links_when_tag_exists() {
    let store = InMemoryStore::new();
    seed(&store, "a", "<p>linked</p>", 1, &["tech"]);
    seed(&store, "b", "<p>mentions #tech only in text</p>", 2, &[]);

    let page = service(&store)
        .list_posts_by_tag_name("tech", Pagination::default())
        .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].record_key, "a");
}

#[test]
fn list_by_unknown_tag_name_falls_back_to_text_search() {
    let store = InMemoryStore::new();
    seed(&store, "a", "<p>about #rustlang today</p>", 1, &[]);
    seed(&store, "b", "<p>nothing here</p>", 2, &[]);

    let page = service(&store)
        .list_posts_by_tag_name("rustlang", Pagination::default())
        .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].record_key, "a");
}

#[test]
fn tags_are_listed_by_name() {
    let store = InMemoryStore::new();
    store.seed_tag(Tag {
        id: Uuid::now_v7(),
        name: "zeta".to_string(),
    });
    seed(&store, "a", "<p>x</p>", 1, &["alpha", "mid"]);

    let names: Vec<String> = service(&store)
        .list_tags()
        .unwrap()
        .into_iter()
        .map(|tag| tag.name)
        .collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[test]
fn failures_are_wrapped_and_can_be_masked_to_an_empty_page() {
    let store = InMemoryStore::new();
    store.set_fault(
        StoreOperation::GetTagByName,
        Some(RepositoryErrorCode::Connection),
    );
    store.set_fault(StoreOperation::ListTags, Some(RepositoryErrorCode::System));
    let service = service(&store);

    let err = service
        .list_posts_by_tag_name("tech", Pagination::default())
        .unwrap_err();
    assert_eq!(err.usecase, LIST_POSTS_BY_TAG_NAME);
    assert_eq!(err.repository_code(), Some(RepositoryErrorCode::Connection));

    let page = service
        .list_posts_by_tag_name("tech", Pagination::default())
        .unwrap_or_else(|_| PostPage::empty());
    assert_eq!(page, PostPage::empty());

    let err = service.list_tags().unwrap_err();
    assert_eq!(err.usecase, LIST_TAGS);
    assert_eq!(err.repository_code(), Some(RepositoryErrorCode::System));
}
