//! Shared fixtures for integration tests.

#![allow(dead_code)]

use ormdb_constraints::{
    ConstraintPolicy, ModelDef, ModelRegistry, Persistence, Record, RelationDef,
};
use tracing_subscriber::EnvFilter;

/// Install a test log subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Article with comments and a revision, each under its own policy.
pub fn blog_registry(comments: ConstraintPolicy, revision: ConstraintPolicy) -> ModelRegistry {
    let article = ModelDef::new("Article")
        .has(
            RelationDef::one_to_many("comments", "Article", "Comment", ["article_id"])
                .with_policy(comments),
        )
        .unwrap()
        .has(
            RelationDef::one_to_one("revision", "Article", "Revision", ["article_id"])
                .with_policy(revision),
        )
        .unwrap();

    ModelRegistry::new()
        .with_model(article)
        .unwrap()
        .with_model(ModelDef::new("Comment"))
        .unwrap()
        .with_model(ModelDef::new("Revision"))
        .unwrap()
}

/// Article 1 with comments 1 and 2 and revision 1; comment 3 belongs to article 2.
pub fn seed_blog<P: Persistence + ?Sized>(store: &P) -> Record {
    let article = Record::new("Article", [1i64]).with_field("title", "Hello");
    store.insert(article.clone()).unwrap();
    store.insert(Record::new("Article", [2i64])).unwrap();
    for id in 1..=2i64 {
        store
            .insert(Record::new("Comment", [id]).with_field("article_id", 1i64))
            .unwrap();
    }
    store
        .insert(Record::new("Comment", [3i64]).with_field("article_id", 2i64))
        .unwrap();
    store
        .insert(Record::new("Revision", [1i64]).with_field("article_id", 1i64))
        .unwrap();
    article
}

/// Check whether a record is still stored.
pub fn exists<P: Persistence + ?Sized>(store: &P, model: &str, id: i64) -> bool {
    store.get(model, &[id.into()]).unwrap().is_some()
}
