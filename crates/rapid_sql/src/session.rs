//! A single database connection with statement helpers.
//!
//! Unless built with [`SqlSessionBuilder::auto_commit`], the session keeps a
//! transaction open at all times: [`SqlSession::commit`] and
//! [`SqlSession::rollback`] end it and immediately begin the next one.
//!
//! The connection lives in an [`AnyPool`] capped at one connection, so every
//! statement of the session runs on the same connection and transaction.

use crate::error::{is_connection_lost, SqlError, SqlResult};
use crate::table::{Dialect, TableBuilder};
use crate::value::{bind_all, SqlValue};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyPool;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configures and opens a [`SqlSession`].
pub struct SqlSessionBuilder {
    target: Target,
    dialect: Dialect,
    user: Option<String>,
    password: Option<String>,
    auto_commit: bool,
    tables: Vec<TableBuilder>,
}

enum Target {
    Url(String),
    MySql { host: String, database: String },
}

impl SqlSessionBuilder {
    /// SQLite database file, created if missing.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().display());
        Self::with_target(Target::Url(url), Dialect::Sqlite)
    }

    pub fn sqlite_memory() -> Self {
        Self::with_target(Target::Url("sqlite::memory:".to_string()), Dialect::Sqlite)
    }

    pub fn mysql(host: &str, database: &str) -> Self {
        Self::with_target(
            Target::MySql {
                host: host.to_string(),
                database: database.to_string(),
            },
            Dialect::MySql,
        )
    }

    /// Any URL sqlx understands. The dialect is picked from the scheme.
    pub fn url(url: &str) -> Self {
        let dialect = if url.starts_with("mysql:") {
            Dialect::MySql
        } else {
            Dialect::Sqlite
        };
        Self::with_target(Target::Url(url.to_string()), dialect)
    }

    fn with_target(target: Target, dialect: Dialect) -> Self {
        Self {
            target,
            dialect,
            user: None,
            password: None,
            auto_commit: false,
            tables: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn auto_commit(mut self) -> Self {
        self.auto_commit = true;
        self
    }

    /// Queues a table to create when the session is built.
    pub fn create_table<F>(mut self, name: &str, init: F) -> Self
    where
        F: FnOnce(&mut TableBuilder),
    {
        let mut table = TableBuilder::new(name, self.dialect);
        init(&mut table);
        self.tables.push(table);
        self
    }

    fn connection_url(&self) -> String {
        match &self.target {
            Target::Url(url) => url.clone(),
            Target::MySql { host, database } => {
                let credentials = match (&self.user, &self.password) {
                    (Some(user), Some(password)) => format!(
                        "{}:{}@",
                        urlencoding::encode(user),
                        urlencoding::encode(password)
                    ),
                    (Some(user), None) => format!("{}@", urlencoding::encode(user)),
                    _ => String::new(),
                };
                format!("mysql://{}{}/{}", credentials, host, database)
            }
        }
    }

    /// Connects and creates the queued tables.
    pub async fn build(self) -> SqlResult<SqlSession> {
        sqlx::any::install_default_drivers();

        let statements = self
            .tables
            .iter()
            .map(|table| table.to_sql().map(|sql| (table.name().to_string(), sql)))
            .collect::<SqlResult<Vec<_>>>()?;

        // Idle and lifetime limits would close the connection and drop the open transaction
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&self.connection_url())
            .await?;

        let session = SqlSession {
            pool,
            dialect: self.dialect,
            auto_commit: self.auto_commit,
            statement_lock: Mutex::new(()),
            savepoints: AtomicU64::new(0),
        };
        session.begin().await?;

        for (name, sql) in statements {
            session.execute(&sql, &[]).await?;
            debug!("🗄️ Table {} ready", name);
        }
        session.commit().await?;

        info!("🗄️ {:?} session opened (auto-commit: {})", session.dialect, session.auto_commit);
        Ok(session)
    }
}

/// Runs `operation`, and once more after `reconnect` when the first attempt
/// failed because the connection was lost. Other errors are returned as is.
pub(crate) async fn retry_on_connection_loss<T, Op, Fut, Re, ReFut>(
    mut operation: Op,
    reconnect: Re,
) -> SqlResult<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
    Re: FnOnce() -> ReFut,
    ReFut: Future<Output = SqlResult<()>>,
{
    match operation().await {
        Err(e) if is_connection_lost(&e) => {
            warn!("⚠️ Connection lost ({}), reconnecting", e);
            reconnect().await?;
            Ok(operation().await?)
        }
        other => Ok(other?),
    }
}

/// Marker returned by [`SqlSession::save_state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    name: String,
}

pub struct SqlSession {
    pool: AnyPool,
    dialect: Dialect,
    auto_commit: bool,
    /// Held across statements that must follow each other on the connection.
    statement_lock: Mutex<()>,
    savepoints: AtomicU64,
}

impl SqlSession {
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Opens the session's transaction on the current connection.
    async fn begin(&self) -> SqlResult<()> {
        if !self.auto_commit {
            sqlx::raw_sql("BEGIN").execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Runs an update statement.
    ///
    /// Returns the generated key of an `INSERT` when there is one, otherwise
    /// the number of affected rows; `0` when nothing changed.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> SqlResult<i64> {
        let _guard = self.statement_lock.lock().await;

        let result = retry_on_connection_loss(
            move || bind_all(sqlx::query(sql), params).execute(&self.pool),
            || self.begin(),
        )
        .await?;

        let affected = result.rows_affected();
        if affected < 1 {
            return Ok(0);
        }
        if !is_insert(sql) {
            return Ok(affected as i64);
        }

        match self.last_insert_key().await? {
            key if key > 0 => Ok(key),
            _ => Ok(affected as i64),
        }
    }

    /// Key generated by the last `INSERT` on the connection.
    async fn last_insert_key(&self) -> SqlResult<i64> {
        let sql = match self.dialect {
            Dialect::Sqlite => "SELECT last_insert_rowid()",
            Dialect::MySql => "SELECT CAST(LAST_INSERT_ID() AS SIGNED)",
        };
        let key = sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool).await?;
        Ok(key)
    }

    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> SqlResult<Vec<AnyRow>> {
        let _guard = self.statement_lock.lock().await;

        retry_on_connection_loss(
            move || bind_all(sqlx::query(sql), params).fetch_all(&self.pool),
            || self.begin(),
        )
        .await
    }

    pub async fn commit(&self) -> SqlResult<()> {
        self.end_transaction("COMMIT").await
    }

    pub async fn rollback(&self) -> SqlResult<()> {
        self.end_transaction("ROLLBACK").await
    }

    async fn end_transaction(&self, statement: &str) -> SqlResult<()> {
        if self.auto_commit {
            return Ok(());
        }

        let _guard = self.statement_lock.lock().await;
        sqlx::raw_sql(statement).execute(&self.pool).await?;
        self.begin().await
    }

    /// Marks a point in the open transaction to roll back to later.
    pub async fn save_state(&self) -> SqlResult<Savepoint> {
        if self.auto_commit {
            return Err(SqlError::AutoCommit);
        }

        let savepoint = Savepoint {
            name: format!("rapid_sp_{}", self.savepoints.fetch_add(1, Ordering::Relaxed)),
        };
        let _guard = self.statement_lock.lock().await;
        sqlx::raw_sql(&format!("SAVEPOINT {}", savepoint.name))
            .execute(&self.pool)
            .await?;
        Ok(savepoint)
    }

    pub async fn restore_state(&self, savepoint: &Savepoint) -> SqlResult<()> {
        if self.auto_commit {
            return Err(SqlError::AutoCommit);
        }

        let _guard = self.statement_lock.lock().await;
        sqlx::raw_sql(&format!("ROLLBACK TO SAVEPOINT {}", savepoint.name))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Closes the connection. Uncommitted work is rolled back.
    pub async fn close(self) -> SqlResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

impl std::fmt::Debug for SqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSession")
            .field("dialect", &self.dialect)
            .field("auto_commit", &self.auto_commit)
            .finish_non_exhaustive()
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}
