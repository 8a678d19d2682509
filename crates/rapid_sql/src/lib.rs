//! # Rapid SQL
//!
//! Thin session over a single sqlx connection for plugins that persist data
//! in SQLite or MySQL.
//!
//! ```rust,no_run
//! use rapid_sql::{Attribute, SqlSessionBuilder};
//!
//! # async fn demo() -> rapid_sql::SqlResult<()> {
//! let session = SqlSessionBuilder::sqlite("homes.db")
//!     .create_table("homes", |t| {
//!         t.if_not_exists()
//!             .field("id", "INTEGER", &[Attribute::PrimaryKey, Attribute::AutoIncrement])
//!             .field("owner", "TEXT", &[Attribute::NotNull]);
//!     })
//!     .build()
//!     .await?;
//!
//! let id = session.execute("INSERT INTO homes (owner) VALUES (?)", &["Steve".into()]).await?;
//! session.commit().await?;
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod session;
pub mod table;
pub mod value;

pub use error::{SqlError, SqlResult};
pub use session::{Savepoint, SqlSession, SqlSessionBuilder};
pub use sqlx::any::AnyRow;
pub use sqlx::Row;
pub use table::{Attribute, Dialect, TableBuilder};
pub use value::SqlValue;
