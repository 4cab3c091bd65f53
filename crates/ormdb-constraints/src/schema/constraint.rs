//! Native foreign key constraint descriptions.

use crate::catalog::{ModelDef, ReferentialAction, RelationDef};

/// Length of the digest suffix appended to truncated names.
const DIGEST_HEX_LEN: usize = 8;

/// Suffix of every generated constraint name.
const NAME_SUFFIX: &str = "fk";

/// A foreign key constraint as it exists in the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeConstraint {
    /// Constraint name.
    pub name: String,
    /// Table holding the foreign key.
    pub table: String,
    /// Foreign key columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub referenced_table: String,
    /// Referenced key columns, aligned with `columns`.
    pub referenced_columns: Vec<String>,
    /// Action for both `ON DELETE` and `ON UPDATE`.
    pub action: ReferentialAction,
}

impl NativeConstraint {
    /// Describe the constraint backing `relation`.
    ///
    /// Returns `None` when the relation has no native constraint of its own:
    /// many-to-many relations (the join model's relations own them) and the
    /// `skip` policy.
    pub fn for_relation(
        parent: &ModelDef,
        dependent: &ModelDef,
        relation: &RelationDef,
        max_identifier_length: usize,
    ) -> Option<Self> {
        if !relation.owns_native_constraint() {
            return None;
        }
        let action = relation.policy.native_action()?;

        let referenced_columns = if relation.parent_key.is_empty() {
            parent.key.clone()
        } else {
            relation.parent_key.clone()
        };

        Some(Self {
            name: constraint_name(
                &dependent.storage_name,
                &relation.foreign_key,
                &parent.storage_name,
                max_identifier_length,
            ),
            table: dependent.storage_name.clone(),
            columns: relation.foreign_key.clone(),
            referenced_table: parent.storage_name.clone(),
            referenced_columns,
            action,
        })
    }
}

/// Derive the name of a foreign key constraint.
///
/// The name is `<table>_<columns>_<referenced_table>_fk`. Names longer than
/// `max_length` are cut and end in the first 8 hex digits of the blake3
/// digest of the full name. Limits too small to hold a prefix yield the
/// digest alone, cut to `max_length`.
pub fn constraint_name(
    table: &str,
    columns: &[String],
    referenced_table: &str,
    max_length: usize,
) -> String {
    let full = format!(
        "{}_{}_{}_{}",
        table,
        columns.join("_"),
        referenced_table,
        NAME_SUFFIX
    );
    if full.len() <= max_length {
        return full;
    }

    let digest = blake3::hash(full.as_bytes());
    let mut suffix = hex::encode(&digest.as_bytes()[..DIGEST_HEX_LEN / 2]);
    if max_length <= DIGEST_HEX_LEN + 1 {
        suffix.truncate(max_length);
        return suffix;
    }

    let mut keep = max_length.saturating_sub(DIGEST_HEX_LEN + 1);
    while !full.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}_{}", &full[..keep], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ConstraintPolicy, JoinDef};

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_short_name() {
        assert_eq!(
            constraint_name("comments", &cols(&["article_id"]), "articles", 63),
            "comments_article_id_articles_fk"
        );
    }

    #[test]
    fn test_tiny_limit_is_respected() {
        let columns = cols(&["article_id"]);
        for max_length in [0, 1, 5, 8, 9, 10] {
            let name = constraint_name("comments", &columns, "articles", max_length);
            assert!(name.len() <= max_length, "{name} exceeds {max_length}");
        }
        let nine = constraint_name("comments", &columns, "articles", 9);
        assert_eq!(nine.len(), 8);
        assert!(nine.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(constraint_name("comments", &columns, "articles", 10).ends_with(&nine));
    }

    #[test]
    fn test_truncated_name_is_bounded_and_distinct() {
        let a = constraint_name(
            "very_long_dependent_table_name",
            &cols(&["first_part_of_key", "second_part_of_key"]),
            "very_long_parent_table_name",
            63,
        );
        let b = constraint_name(
            "very_long_dependent_table_name",
            &cols(&["first_part_of_key", "second_part_of_key_2"]),
            "very_long_parent_table_name",
            63,
        );
        assert_eq!(a.len(), 63);
        assert_eq!(b.len(), 63);
        assert_ne!(a, b);
        assert_eq!(
            a,
            constraint_name(
                "very_long_dependent_table_name",
                &cols(&["first_part_of_key", "second_part_of_key"]),
                "very_long_parent_table_name",
                63,
            )
        );
    }

    #[test]
    fn test_for_relation() {
        let article = ModelDef::new("Article");
        let comment = ModelDef::new("Comment");
        let mut relation =
            RelationDef::one_to_many("comments", "Article", "Comment", ["article_id"])
                .with_policy(ConstraintPolicy::SetNil);
        relation.parent_key = article.key.clone();

        let constraint = NativeConstraint::for_relation(&article, &comment, &relation, 63).unwrap();
        assert_eq!(constraint.name, "comments_article_id_articles_fk");
        assert_eq!(constraint.table, "comments");
        assert_eq!(constraint.referenced_table, "articles");
        assert_eq!(constraint.referenced_columns, cols(&["id"]));
        assert_eq!(constraint.action, ReferentialAction::SetNull);
    }

    #[test]
    fn test_no_constraint_for_skip_or_many_to_many() {
        let article = ModelDef::new("Article");
        let comment = ModelDef::new("Comment");
        let skip = RelationDef::one_to_many("comments", "Article", "Comment", ["article_id"])
            .with_policy(ConstraintPolicy::Skip);
        assert!(NativeConstraint::for_relation(&article, &comment, &skip, 63).is_none());

        let tags = RelationDef::many_to_many(
            "tags",
            "Article",
            "Tag",
            JoinDef::new("ArticleTag", "article_id", "tag_id"),
        );
        let join = ModelDef::new("ArticleTag");
        assert!(NativeConstraint::for_relation(&article, &join, &tags, 63).is_none());
    }
}
