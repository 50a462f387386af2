// conversation storage - a single table on postgres or sqlite

use crate::Error;
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{AnyPool, any::AnyPoolOptions};

// what the to_char below (postgres) and CURRENT_TIMESTAMP (sqlite) look like
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub struct Db {
    pool: AnyPool,
    dialect: Dialect,
}

/// One stored question/answer pair.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub id: i64,
    pub user_input: String,
    pub ai_response: String,
    pub created_at: Option<NaiveDateTime>,
}

// id, user_input, ai_response, created_at as text; tables created
// elsewhere may have a nullable created_at
type ExchangeRow = (i64, String, String, Option<String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    fn create_table(self) -> &'static str {
        match self {
            Dialect::Postgres => {
                r#"CREATE TABLE IF NOT EXISTS conversation_history (
                     id SERIAL PRIMARY KEY,
                     user_input TEXT NOT NULL,
                     ai_response TEXT NOT NULL,
                     created_at TIMESTAMP NOT NULL DEFAULT now()
                   )"#
            }
            // AUTOINCREMENT so deleted ids are never handed out again
            Dialect::Sqlite => {
                r#"CREATE TABLE IF NOT EXISTS conversation_history (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     user_input TEXT NOT NULL,
                     ai_response TEXT NOT NULL,
                     created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                   )"#
            }
        }
    }

    fn insert(self) -> &'static str {
        match self {
            Dialect::Postgres => {
                r#"INSERT INTO conversation_history (user_input, ai_response)
                   VALUES ($1, $2)
                   RETURNING id::bigint, user_input, ai_response,
                             to_char(created_at, 'YYYY-MM-DD HH24:MI:SS.US')"#
            }
            Dialect::Sqlite => {
                r#"INSERT INTO conversation_history (user_input, ai_response)
                   VALUES (?, ?)
                   RETURNING id, user_input, ai_response, CAST(created_at AS TEXT)"#
            }
        }
    }

    fn history(self) -> &'static str {
        match self {
            Dialect::Postgres => {
                // to_char so the text form doesn't follow the server's DateStyle
                r#"SELECT id::bigint, user_input, ai_response,
                          to_char(created_at, 'YYYY-MM-DD HH24:MI:SS.US')
                   FROM conversation_history
                   ORDER BY id DESC"#
            }
            Dialect::Sqlite => {
                r#"SELECT id, user_input, ai_response, CAST(created_at AS TEXT)
                   FROM conversation_history
                   ORDER BY id DESC"#
            }
        }
    }

    fn find(self) -> &'static str {
        match self {
            Dialect::Postgres => "SELECT id::bigint FROM conversation_history WHERE id = $1",
            Dialect::Sqlite => "SELECT id FROM conversation_history WHERE id = ?",
        }
    }

    fn delete(self) -> &'static str {
        match self {
            Dialect::Postgres => "DELETE FROM conversation_history WHERE id = $1",
            Dialect::Sqlite => "DELETE FROM conversation_history WHERE id = ?",
        }
    }
}

impl Db {
    /// Connect and make sure the `conversation_history` table exists.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        sqlx::any::install_default_drivers();

        let dialect = detect_dialect(url)?;

        // every connection to an in-memory sqlite db sees its own database,
        // so keep exactly one and never recycle it
        let options = if url.contains(":memory:") {
            AnyPoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new().max_connections(5)
        };

        let pool = options.connect(url).await?;
        let db = Self { pool, dialect };
        db.ensure_table().await?;

        tracing::debug!(dialect = ?dialect, "database ready");
        Ok(db)
    }

    async fn ensure_table(&self) -> Result<(), Error> {
        sqlx::query(self.dialect.create_table())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // store a finished exchange; id and created_at come from the database
    pub async fn insert(&self, user_input: &str, ai_response: &str) -> Result<Exchange, Error> {
        let row: ExchangeRow = sqlx::query_as(self.dialect.insert())
            .bind(user_input)
            .bind(ai_response)
            .fetch_one(&self.pool)
            .await?;

        into_exchange(row)
    }

    // everything we have, newest first
    pub async fn history(&self) -> Result<Vec<Exchange>, Error> {
        let rows: Vec<ExchangeRow> = sqlx::query_as(self.dialect.history())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(into_exchange).collect()
    }

    /// Remove one exchange. Returns [`Error::NotFound`] if the id doesn't exist.
    pub async fn delete(&self, id: i64) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        let found: Option<(i64,)> = sqlx::query_as(self.dialect.find())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        if found.is_none() {
            tx.rollback().await?;
            return Err(Error::NotFound(id));
        }

        // an early return through `?` drops the transaction, which rolls it back
        sqlx::query(self.dialect.delete())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub fn dialect_name(&self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }
}

// figure out dialect from connection string
fn detect_dialect(url: &str) -> Result<Dialect, Error> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Dialect::Postgres)
    } else if url.starts_with("sqlite:") {
        Ok(Dialect::Sqlite)
    } else {
        Err(Error::Config(format!(
            "unsupported database url (expected postgres:// or sqlite:): {}",
            url.split("://").next().unwrap_or(url)
        )))
    }
}

fn into_exchange((id, user_input, ai_response, created_at): ExchangeRow) -> Result<Exchange, Error> {
    let created_at = created_at.as_deref().map(parse_timestamp).transpose()?;

    Ok(Exchange {
        id,
        user_input,
        ai_response,
        created_at,
    })
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, Error> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| Error::Database(sqlx::Error::Decode(Box::new(e))))
}
