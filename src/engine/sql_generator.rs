// SPDX-License-Identifier: Apache-2.0

//! SQL Generator
//!
//! Builds the administrative and smoke-test statements a provisioning run
//! issues. Identifiers that reach these builders have already passed
//! `FederationConfig::validate`; literals are still escaped here.

use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::RedshiftSqlDialect;
use sqlparser::parser::Parser;

use crate::config::{FederationConfig, SourceEngine};
use crate::engine::error::{EngineError, EngineResult};

/// Catalog query confirming the external schema exists. Binds `$1` = schema.
pub const VERIFY_EXTERNAL_SCHEMA_SQL: &str = "SELECT schemaname, databasename, esoptions \
FROM svv_external_schemas \
WHERE schemaname = $1";

/// Tables the warehouse can see through the external schema. Binds `$1` = schema.
pub const LIST_EXTERNAL_TABLES_SQL: &str = "SELECT DISTINCT tablename \
FROM svv_external_tables \
WHERE schemaname = $1 \
ORDER BY tablename";

/// Source-side table listing for SQL Server. Binds `@P1` = schema.
pub const SQLSERVER_LIST_TABLES_SQL: &str = "SELECT TABLE_NAME \
FROM INFORMATION_SCHEMA.TABLES \
WHERE TABLE_SCHEMA = @P1 \
ORDER BY TABLE_NAME";

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an identifier, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `<schema>."<table>"` reference into the external schema.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, quote_ident(table))
}

/// `CREATE EXTERNAL SCHEMA IF NOT EXISTS` for the configured source.
pub fn create_external_schema(config: &FederationConfig) -> String {
    let source = &config.source;
    let mut sql = format!(
        "CREATE EXTERNAL SCHEMA IF NOT EXISTS {}\nFROM {}\nDATABASE {}",
        config.external_schema,
        source.engine.from_keyword(),
        quote_literal(&source.database),
    );
    if source.engine.has_schema_clause() {
        sql.push_str(&format!(" SCHEMA {}", quote_literal(&source.schema)));
    }
    sql.push_str(&format!(
        "\nURI {} PORT {}\nIAM_ROLE {}\nSECRET_ARN {};",
        quote_literal(&source.host),
        source.port,
        quote_literal(&config.warehouse.iam_role_arn),
        quote_literal(&source.secret_arn),
    ));
    sql
}

/// Dropping an external schema only removes the mapping, never remote data.
pub fn drop_external_schema(config: &FederationConfig) -> String {
    format!("DROP SCHEMA IF EXISTS {};", config.external_schema)
}

pub fn count_rows(schema: &str, table: &str) -> String {
    format!(
        "SELECT COUNT(*) AS row_count FROM {}",
        qualified_table(schema, table)
    )
}

pub fn sample_rows(schema: &str, table: &str, limit: u32) -> String {
    format!("SELECT * FROM {} LIMIT {}", qualified_table(schema, table), limit)
}

/// Source-side listing query for engines with a direct driver.
pub fn source_list_tables(engine: SourceEngine) -> Option<&'static str> {
    match engine {
        SourceEngine::Sqlserver => Some(SQLSERVER_LIST_TABLES_SQL),
        SourceEngine::Postgres | SourceEngine::Mysql => None,
    }
}

fn body_is_read_only(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => body_is_read_only(&query.body),
        SetExpr::SetOperation { left, right, .. } => {
            body_is_read_only(left) && body_is_read_only(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

/// True when `sql` is exactly one statement that only reads.
pub fn is_read_only(sql: &str) -> bool {
    let Ok(statements) = Parser::parse_sql(&RedshiftSqlDialect {}, sql.trim()) else {
        return false;
    };

    match statements.as_slice() {
        [Statement::Query(query)] => body_is_read_only(&query.body),
        _ => false,
    }
}

/// Guard used before every smoke-test query.
pub fn ensure_read_only(sql: &str) -> EngineResult<()> {
    if is_read_only(sql) {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "refusing to run a non read-only statement as a smoke test: {sql}"
        )))
    }
}

/// Everything a run would send, in order, for `fedschema sql` and `--dry-run`.
pub fn render_plan(config: &FederationConfig) -> Vec<String> {
    let schema_literal = quote_literal(&config.external_schema);
    let mut plan = vec![
        create_external_schema(config),
        VERIFY_EXTERNAL_SCHEMA_SQL.replace("$1", &schema_literal) + ";",
        LIST_EXTERNAL_TABLES_SQL.replace("$1", &schema_literal) + ";",
    ];
    for table in &config.target_tables {
        plan.push(count_rows(&config.external_schema, table) + ";");
    }
    plan
}
