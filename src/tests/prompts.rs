//! Tests for the CSV prompt store.

use crate::prompts::{
    BackendCsv, Category, CommentCreate, PromptCreate, PromptStore, PromptUpdate, SearchQuery,
};

fn test_store() -> (tempfile::TempDir, BackendCsv) {
    let dir = tempfile::tempdir().unwrap();
    let store = BackendCsv::load(dir.path()).unwrap();
    (dir, store)
}

fn create(
    store: &BackendCsv,
    title: &str,
    content: &str,
    category: Category,
    is_public: Option<bool>,
) -> crate::prompts::Prompt {
    store
        .create(PromptCreate {
            title: title.to_string(),
            description: None,
            content: content.to_string(),
            category,
            tags: None,
            is_public,
        })
        .unwrap()
}

#[test]
fn test_create_and_get() {
    let (_dir, store) = test_store();

    let prompt = create(&store, "Rust helper", "debug rust code", Category::Coding, None);

    let loaded = store.get(prompt.id.as_str()).unwrap().unwrap();
    assert_eq!(loaded.title, "Rust helper");
    assert_eq!(loaded.category, Category::Coding);
    assert!(loaded.likes.is_empty());

    assert!(store.get("no-such-id").unwrap().is_none());
}

#[test]
fn test_save_and_reload_roundtrip() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let store = BackendCsv::load(dir.path()).unwrap();
        let prompt = create(
            &store,
            "Essay outline",
            "outline an essay about history",
            Category::Writing,
            Some(true),
        );
        store
            .add_comment(
                prompt.id.as_str(),
                CommentCreate {
                    author: "alice".to_string(),
                    body: "nice one".to_string(),
                },
            )
            .unwrap();
        store.like(prompt.id.as_str(), "bob").unwrap();
        prompt.id
    };

    let store = BackendCsv::load(dir.path()).unwrap();
    let prompt = store.get(id.as_str()).unwrap().unwrap();

    assert_eq!(prompt.title, "Essay outline");
    assert_eq!(prompt.category, Category::Writing);
    assert_eq!(prompt.is_public, Some(true));
    assert_eq!(prompt.likes, vec!["bob".to_string()]);
    assert_eq!(store.count_comments(id.as_str()).unwrap(), 1);
}

#[test]
fn test_find_eligible_excludes_only_explicitly_hidden() {
    let (_dir, store) = test_store();

    let visible = create(&store, "a", "text", Category::Other, Some(true));
    let unset = create(&store, "b", "text", Category::Other, None);
    let hidden = create(&store, "c", "text", Category::Other, Some(false));

    let eligible = store.find_eligible().unwrap();
    let ids: Vec<&str> = eligible.iter().map(|p| p.id.as_str()).collect();

    assert!(ids.contains(&visible.id.as_str()));
    assert!(ids.contains(&unset.id.as_str()));
    assert!(!ids.contains(&hidden.id.as_str()));
}

#[test]
fn test_find_by_ids() {
    let (_dir, store) = test_store();

    let a = create(&store, "a", "text", Category::Other, None);
    let _b = create(&store, "b", "text", Category::Other, None);
    let c = create(&store, "c", "text", Category::Other, None);

    let found = store
        .find_by_ids(&[a.id.to_string(), c.id.to_string(), "missing".to_string()])
        .unwrap();

    assert_eq!(found.len(), 2);
    assert!(found.iter().any(|p| p.id == a.id));
    assert!(found.iter().any(|p| p.id == c.id));
}

#[test]
fn test_search_by_category_and_keyword() {
    let (_dir, store) = test_store();

    create(&store, "SQL tutor", "teach me sql joins", Category::Coding, None);
    create(&store, "Poem", "write a poem about rain", Category::Creative, None);
    create(&store, "Rust review", "review my rust crate", Category::Coding, None);

    let coding = store
        .search(SearchQuery {
            category: Some(Category::Coding),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(coding.len(), 2);

    let rust = store
        .search(SearchQuery {
            keyword: Some("RUST crate".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(rust.len(), 1);
    assert_eq!(rust[0].title, "Rust review");

    let none = store
        .search(SearchQuery {
            keyword: Some("cooking".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_search_by_tag_and_limit() {
    let (_dir, store) = test_store();

    for i in 0..5 {
        store
            .create(PromptCreate {
                title: format!("p{i}"),
                description: None,
                content: "shared content".to_string(),
                category: Category::Other,
                tags: Some(vec!["daily".to_string()]),
                is_public: None,
            })
            .unwrap();
    }
    create(&store, "untagged", "shared content", Category::Other, None);

    let tagged = store
        .search(SearchQuery {
            tag: Some("Daily".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(tagged.len(), 5);

    let limited = store
        .search(SearchQuery {
            tag: Some("daily".to_string()),
            limit: Some(2),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[test]
fn test_search_hides_private_prompts() {
    let (_dir, store) = test_store();

    create(&store, "public", "shared words", Category::Other, None);
    create(&store, "private", "shared words", Category::Other, Some(false));

    let results = store.search(SearchQuery::default()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "public");
}

#[test]
fn test_update() {
    let (_dir, store) = test_store();

    let prompt = create(&store, "before", "text", Category::Other, None);

    let updated = store
        .update(
            prompt.id.as_str(),
            PromptUpdate {
                title: Some("after".to_string()),
                category: Some(Category::Learning),
                tags: Some(vec!["a".to_string(), "a".to_string(), "b".to_string()]),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(updated.title, "after");
    assert_eq!(updated.category, Category::Learning);
    // duplicate tags collapse
    assert_eq!(updated.tags, vec!["a".to_string(), "b".to_string()]);

    assert!(store.update("missing", PromptUpdate::default()).is_err());
}

#[test]
fn test_delete_removes_prompt_and_comments() {
    let (_dir, store) = test_store();

    let prompt = create(&store, "doomed", "text", Category::Other, None);
    store
        .add_comment(
            prompt.id.as_str(),
            CommentCreate {
                author: "alice".to_string(),
                body: "hello".to_string(),
            },
        )
        .unwrap();

    store.delete(prompt.id.as_str()).unwrap();

    assert!(store.get(prompt.id.as_str()).unwrap().is_none());
    assert_eq!(store.count_comments(prompt.id.as_str()).unwrap(), 0);
    assert_eq!(store.total().unwrap(), 0);
}

#[test]
fn test_like_toggles() {
    let (_dir, store) = test_store();

    let prompt = create(&store, "likeable", "text", Category::Other, None);

    let liked = store.like(prompt.id.as_str(), "alice").unwrap();
    assert_eq!(liked.likes.len(), 1);

    let unliked = store.like(prompt.id.as_str(), "alice").unwrap();
    assert!(unliked.likes.is_empty());
}

#[test]
fn test_comment_on_missing_prompt_fails() {
    let (_dir, store) = test_store();

    let result = store.add_comment(
        "missing",
        CommentCreate {
            author: "alice".to_string(),
            body: "hello".to_string(),
        },
    );
    assert!(result.is_err());
}

#[test]
fn test_tags_distinct_and_sorted() {
    let (_dir, store) = test_store();

    store
        .create(PromptCreate {
            title: "a".to_string(),
            description: None,
            content: "text".to_string(),
            category: Category::Other,
            tags: Some(vec!["zeta".to_string(), "alpha".to_string()]),
            is_public: None,
        })
        .unwrap();
    store
        .create(PromptCreate {
            title: "b".to_string(),
            description: None,
            content: "text".to_string(),
            category: Category::Other,
            tags: Some(vec!["alpha".to_string()]),
            is_public: None,
        })
        .unwrap();

    assert_eq!(
        store.tags().unwrap(),
        vec!["alpha".to_string(), "zeta".to_string()]
    );
}
