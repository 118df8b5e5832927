//! Low-level SQLite access.
//!
//! Everything in here is a plain async function over a `&mut SqliteConnection`, so the same
//! code serves a pooled connection and an open transaction alike. The trait implementations in
//! [`super::sqlite_impl`] decide where the connection comes from and where the transaction
//! boundaries lie.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod invoices;
pub mod payments;
pub mod polling_events;

const SQLITE_DB_URL: &str = "sqlite://data/cpr_store.db";

pub fn db_url() -> String {
    let url = env::var("CPR_DATABASE_URL").unwrap_or_else(|_| {
        info!("CPR_DATABASE_URL is not set. Falling back to {SQLITE_DB_URL}.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {url}");
    url
}

pub async fn new_pool(url: &str, _max_connections: u32) -> Result<SqlitePool, SqlxError> {
    // SQLite permits a single writer at a time. Under WAL (the sqlx default) a pool with more
    // than one connection can read a snapshot on one connection and then try to write on
    // another, which fails immediately with SQLITE_BUSY_SNAPSHOT — an error no busy timeout can
    // rescue. A single pooled connection serializes all access onto one writer, which is the
    // single-writer discipline this engine is designed around. WAL and the busy timeout are set
    // explicitly as belt-and-braces for any out-of-process readers sharing the file.
    let options = SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    SqlitePoolOptions::new().max_connections(1).connect_with(options).await
}
