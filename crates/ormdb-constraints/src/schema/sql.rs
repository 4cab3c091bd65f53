//! SQL schema adapter.
//!
//! Generates foreign key DDL for a dialect and runs it through a
//! caller-supplied [`SqlExecutor`], so no database driver is linked here.

use tracing::debug;

use super::adapter::SchemaAdapter;
use super::constraint::NativeConstraint;
use crate::error::AdapterError;

/// SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL.
    Postgres,
    /// MySQL and MariaDB.
    MySql,
}

impl Dialect {
    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let quote = match self {
            Dialect::Postgres => '"',
            Dialect::MySql => '`',
        };
        let mut quoted = String::with_capacity(identifier.len() + 2);
        quoted.push(quote);
        for c in identifier.chars() {
            if c == quote {
                quoted.push(quote);
            }
            quoted.push(c);
        }
        quoted.push(quote);
        quoted
    }

    /// Placeholder for the `index`-th (1-based) query parameter.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::MySql => "?".to_string(),
        }
    }

    fn current_schema(&self) -> &'static str {
        match self {
            Dialect::Postgres => "current_schema()",
            Dialect::MySql => "DATABASE()",
        }
    }

    fn quote_list(&self, identifiers: &[String]) -> String {
        identifiers
            .iter()
            .map(|identifier| self.quote_identifier(identifier))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `ALTER TABLE ... ADD CONSTRAINT ...` for the constraint.
    pub fn create_constraint_statement(&self, constraint: &NativeConstraint) -> String {
        let action = constraint.action.as_sql();
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_identifier(&constraint.table),
            self.quote_identifier(&constraint.name),
            self.quote_list(&constraint.columns),
            self.quote_identifier(&constraint.referenced_table),
            self.quote_list(&constraint.referenced_columns),
            action,
            action
        )
    }

    /// `ALTER TABLE ... DROP ...` for the constraint.
    pub fn drop_constraint_statement(&self, table: &str, name: &str) -> String {
        let clause = match self {
            Dialect::Postgres => "DROP CONSTRAINT",
            Dialect::MySql => "DROP FOREIGN KEY",
        };
        format!(
            "ALTER TABLE {} {} {}",
            self.quote_identifier(table),
            clause,
            self.quote_identifier(name)
        )
    }

    /// Catalog query for a foreign key, parameterized by table and constraint name.
    pub fn constraint_exists_query(&self) -> String {
        format!(
            "SELECT 1 FROM information_schema.table_constraints \
             WHERE constraint_type = 'FOREIGN KEY' AND table_schema = {} \
             AND table_name = {} AND constraint_name = {}",
            self.current_schema(),
            self.placeholder(1),
            self.placeholder(2)
        )
    }

    /// Catalog query for a table, parameterized by table name.
    pub fn storage_exists_query(&self) -> String {
        format!(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = {} AND table_name = {}",
            self.current_schema(),
            self.placeholder(1)
        )
    }
}

/// Runs SQL on behalf of [`SqlSchemaAdapter`].
pub trait SqlExecutor: Send + Sync {
    /// Execute a DDL statement.
    fn execute_ddl(&self, statement: &str) -> Result<(), AdapterError>;

    /// Run a query and report whether it returned any row.
    fn query_exists(&self, query: &str, params: &[&str]) -> Result<bool, AdapterError>;
}

/// A [`SchemaAdapter`] that manages constraints with SQL DDL.
pub struct SqlSchemaAdapter<E: SqlExecutor> {
    executor: E,
    dialect: Dialect,
}

impl<E: SqlExecutor> SqlSchemaAdapter<E> {
    /// Create an adapter for the given dialect.
    pub fn new(executor: E, dialect: Dialect) -> Self {
        Self { executor, dialect }
    }

    /// The adapter's dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The underlying executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }
}

impl<E: SqlExecutor> SchemaAdapter for SqlSchemaAdapter<E> {
    fn constraint_exists(&self, table: &str, name: &str) -> Result<bool, AdapterError> {
        self.executor
            .query_exists(&self.dialect.constraint_exists_query(), &[table, name])
    }

    fn storage_exists(&self, table: &str) -> Result<bool, AdapterError> {
        self.executor
            .query_exists(&self.dialect.storage_exists_query(), &[table])
    }

    fn create_relationship_constraint(
        &self,
        constraint: &NativeConstraint,
    ) -> Result<bool, AdapterError> {
        let statement = self.dialect.create_constraint_statement(constraint);
        debug!(statement = %statement, "Creating foreign key constraint");
        self.executor.execute_ddl(&statement)?;
        Ok(true)
    }

    fn destroy_relationship_constraint(
        &self,
        constraint: &NativeConstraint,
    ) -> Result<bool, AdapterError> {
        if !self.constraint_exists(&constraint.table, &constraint.name)? {
            return Ok(false);
        }
        let statement = self
            .dialect
            .drop_constraint_statement(&constraint.table, &constraint.name);
        debug!(statement = %statement, "Dropping foreign key constraint");
        self.executor.execute_ddl(&statement)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReferentialAction;

    fn constraint(action: ReferentialAction) -> NativeConstraint {
        NativeConstraint {
            name: "comments_article_id_articles_fk".to_string(),
            table: "comments".to_string(),
            columns: vec!["article_id".to_string()],
            referenced_table: "articles".to_string(),
            referenced_columns: vec!["id".to_string()],
            action,
        }
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::Postgres.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::MySql.quote_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn test_create_statement() {
        let sql = Dialect::Postgres.create_constraint_statement(&constraint(ReferentialAction::SetNull));
        assert_eq!(
            sql,
            "ALTER TABLE \"comments\" ADD CONSTRAINT \"comments_article_id_articles_fk\" \
             FOREIGN KEY (\"article_id\") REFERENCES \"articles\" (\"id\") \
             ON DELETE SET NULL ON UPDATE SET NULL"
        );
    }

    #[test]
    fn test_drop_statement_per_dialect() {
        assert_eq!(
            Dialect::Postgres.drop_constraint_statement("comments", "c_fk"),
            "ALTER TABLE \"comments\" DROP CONSTRAINT \"c_fk\""
        );
        assert_eq!(
            Dialect::MySql.drop_constraint_statement("comments", "c_fk"),
            "ALTER TABLE `comments` DROP FOREIGN KEY `c_fk`"
        );
    }

    #[test]
    fn test_exists_queries() {
        assert!(Dialect::Postgres
            .constraint_exists_query()
            .ends_with("table_name = $1 AND constraint_name = $2"));
        assert!(Dialect::MySql
            .storage_exists_query()
            .contains("table_schema = DATABASE() AND table_name = ?"));
    }
}
