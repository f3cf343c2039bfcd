//! PostgreSQL backend over a single sqlx connection. Serves both the
//! verification harness and the read-only analyzer.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor, Row};

use pgseclab_core::compiler::RenderedStatement;
use pgseclab_core::error::{PgSecLabError, Result};
use pgseclab_core::sql::quote_ident;

use crate::analyze::{CatalogReader, InstanceInfo, RoleInfo, TableInfo};
use crate::config::DatabaseSection;
use crate::harness::fixtures::{FixtureRow, FixtureTable};

use super::VerifyBackend;

const DUPLICATE_SCHEMA: &str = "42P06";
const DEPENDENT_OBJECTS: &str = "2BP01";

fn has_code(e: &sqlx::Error, code: &str) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|c| c == code)
}

/// Message plus SQLSTATE for database errors, plain text otherwise.
fn describe(e: &sqlx::Error) -> String {
    match e.as_database_error() {
        Some(db) => match db.code() {
            Some(code) => format!("{} (SQLSTATE {code})", db.message()),
            None => db.message().to_string(),
        },
        None => e.to_string(),
    }
}

fn db_err(e: sqlx::Error) -> PgSecLabError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => PgSecLabError::Connection(describe(&e)),
        other => PgSecLabError::Internal(describe(&other)),
    }
}

pub struct PgBackend {
    conn: PgConnection,
}

impl PgBackend {
    /// Open one session. `statement_timeout` is set server-side for every
    /// statement the harness runs.
    pub async fn connect(url: &str, db: &DatabaseSection) -> Result<Self> {
        let opts = PgConnectOptions::from_str(url)
            .map_err(|e| PgSecLabError::Connection(format!("invalid database url: {e}")))?
            .application_name("pgseclab-verify")
            .options([("statement_timeout", db.statement_timeout_ms.to_string())]);

        let conn = tokio::time::timeout(db.connect_timeout(), PgConnection::connect_with(&opts))
            .await
            .map_err(|_| {
                PgSecLabError::Connection(format!(
                    "connect timed out after {} ms",
                    db.connect_timeout_ms
                ))
            })?
            .map_err(|e| PgSecLabError::Connection(describe(&e)))?;

        tracing::info!(
            host = opts.get_host(),
            database = opts.get_database().unwrap_or_default(),
            "connected"
        );
        Ok(Self { conn })
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(db_err)
    }
}

#[async_trait]
impl VerifyBackend for PgBackend {
    async fn namespace_exists(&mut self, namespace: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1)",
        )
        .bind(namespace)
        .fetch_one(&mut self.conn)
        .await
        .map_err(db_err)
    }

    async fn create_namespace(&mut self, namespace: &str) -> Result<bool> {
        let sql = format!("CREATE SCHEMA {}", quote_ident(namespace));
        match (&mut self.conn).execute(sqlx::raw_sql(&sql)).await {
            Ok(_) => Ok(true),
            Err(e) if has_code(&e, DUPLICATE_SCHEMA) => Ok(false),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn seed_table(
        &mut self,
        namespace: &str,
        table: &FixtureTable,
        rows: &[FixtureRow],
    ) -> Result<()> {
        let create = table.create_sql(namespace);
        (&mut self.conn).execute(sqlx::raw_sql(&create))
            .await
            .map_err(db_err)?;

        let insert = table.insert_sql(namespace);
        let mut tx = self.conn.begin().await.map_err(db_err)?;
        for row in rows {
            let mut q = sqlx::query(&insert).bind(row.id).bind(row.tenant);
            for v in &row.values {
                q = q.bind(v.clone());
            }
            q.execute(&mut *tx).await.map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn apply(&mut self, statements: &[RenderedStatement]) -> Result<()> {
        let mut tx = self.conn.begin().await.map_err(db_err)?;
        for (index, s) in statements.iter().enumerate() {
            if let Err(e) = (&mut *tx).execute(sqlx::raw_sql(&s.sql)).await {
                tracing::debug!(index, stage = %s.stage, sql = %s.sql, "statement failed");
                return Err(PgSecLabError::Apply {
                    index,
                    stage: s.stage.as_str(),
                    reason: describe(&e),
                });
            }
        }
        tx.commit().await.map_err(db_err)
    }

    async fn row_security(&mut self, namespace: &str, table: &str) -> Result<Option<bool>> {
        let row = sqlx::query(
            r#"
            SELECT c.relrowsecurity
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p')
            "#,
        )
        .bind(namespace)
        .bind(table)
        .fetch_optional(&mut self.conn)
        .await
        .map_err(db_err)?;

        row.map(|r| r.try_get::<bool, _>(0)).transpose().map_err(db_err)
    }

    async fn policy_count(&mut self, namespace: &str, table: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM pg_catalog.pg_policies WHERE schemaname = $1 AND tablename = $2",
        )
        .bind(namespace)
        .bind(table)
        .fetch_one(&mut self.conn)
        .await
        .map_err(db_err)
    }

    async fn relation_exists(&mut self, namespace: &str, name: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM pg_catalog.pg_class c
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                WHERE n.nspname = $1 AND c.relname = $2
            )
            "#,
        )
        .bind(namespace)
        .bind(name)
        .fetch_one(&mut self.conn)
        .await
        .map_err(db_err)
    }

    async fn drop_namespace(&mut self, namespace: &str) -> Result<()> {
        let sql = format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(namespace));
        (&mut self.conn).execute(sqlx::raw_sql(&sql))
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn drop_roles(&mut self, roles: &[String]) -> Result<()> {
        for role in roles {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_roles WHERE rolname = $1)",
            )
            .bind(role)
            .fetch_one(&mut self.conn)
            .await
            .map_err(db_err)?;
            if !exists {
                continue;
            }

            let drop = format!("DROP ROLE {}", quote_ident(role));
            match (&mut self.conn).execute(sqlx::raw_sql(&drop)).await {
                Ok(_) => {}
                // still holds privileges outside the dropped namespace
                Err(e) if has_code(&e, DEPENDENT_OBJECTS) => {
                    let sql = format!("DROP OWNED BY {id}; {drop}", id = quote_ident(role));
                    (&mut self.conn).execute(sqlx::raw_sql(&sql))
                        .await
                        .map_err(db_err)?;
                }
                Err(e) => return Err(db_err(e)),
            }
            tracing::debug!(role = %role, "scoped role dropped");
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogReader for PgBackend {
    async fn instance_info(&mut self, settings: &[&str]) -> Result<InstanceInfo> {
        let version = sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&mut self.conn)
            .await
            .map_err(db_err)?;

        let names: Vec<String> = settings.iter().map(|s| s.to_string()).collect();
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT name::text, setting::text FROM pg_catalog.pg_settings WHERE name = ANY($1)",
        )
        .bind(names)
        .fetch_all(&mut self.conn)
        .await
        .map_err(db_err)?;

        Ok(InstanceInfo {
            version,
            settings: rows.into_iter().collect(),
        })
    }

    async fn roles(&mut self) -> Result<Vec<RoleInfo>> {
        let rows = sqlx::query_as::<_, (String, bool, bool, bool)>(
            r#"
            SELECT rolname::text, rolcanlogin, rolsuper, rolbypassrls
            FROM pg_catalog.pg_roles
            WHERE NOT starts_with(rolname, 'pg_')
            ORDER BY rolname
            "#,
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(name, login, superuser, bypass_rls)| RoleInfo {
                name,
                login,
                superuser,
                bypass_rls,
                grants: Vec::new(),
            })
            .collect())
    }

    async fn role_grants(&mut self, role: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT (table_schema || '.' || table_name)::text, privilege_type::text
            FROM information_schema.role_table_grants
            WHERE grantee = $1
            ORDER BY table_schema, table_name, privilege_type
            "#,
        )
        .bind(role)
        .fetch_all(&mut self.conn)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(object, privilege)| format!("{privilege} ON {object}"))
            .collect())
    }

    async fn tables(&mut self) -> Result<Vec<TableInfo>> {
        let rows = sqlx::query_as::<_, (String, String, bool)>(
            r#"
            SELECT n.nspname::text, c.relname::text, c.relrowsecurity
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind = 'r'
              AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
            ORDER BY n.nspname, c.relname
            "#,
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(schema, name, rls_enabled)| TableInfo {
                schema,
                name,
                rls_enabled,
            })
            .collect())
    }
}
