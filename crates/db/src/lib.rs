use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use sqlx::{
    Error, Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use utils::assets::database_path;

pub mod models;

async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct DBService {
    pub pool: Pool<Sqlite>,
}

impl DBService {
    /// Open the store in the asset directory.
    pub async fn new() -> Result<DBService, Error> {
        Self::new_at(&database_path()).await
    }

    /// Open (or create) the store at `path`. A file that cannot be opened or
    /// migrated for any reason other than permissions is moved aside and
    /// replaced by an empty store.
    pub async fn new_at(path: &Path) -> Result<DBService, Error> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        match Self::open(path).await {
            Ok(pool) => Ok(DBService { pool }),
            Err(e) if is_recoverable(&e) => {
                let moved_to = quarantine(path)?;
                tracing::warn!(
                    "Database at {} could not be opened ({}); moved it to {} and starting empty",
                    path.display(),
                    e,
                    moved_to.display()
                );
                let pool = Self::open(path).await?;
                Ok(DBService { pool })
            }
            Err(e) => Err(e),
        }
    }

    /// A private in-memory store, used by tests.
    pub async fn new_in_memory() -> Result<DBService, Error> {
        let options = SqliteConnectOptions::new().in_memory(true);
        // Every connection would get its own database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        run_migrations(&pool).await?;
        Ok(DBService { pool })
    }

    async fn open(path: &Path) -> Result<Pool<Sqlite>, Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        if let Err(e) = run_migrations(&pool).await {
            pool.close().await;
            return Err(e);
        }
        Ok(pool)
    }
}

fn is_recoverable(err: &Error) -> bool {
    match err {
        Error::Io(io) => io.kind() != ErrorKind::PermissionDenied,
        // SQLITE_PERM, SQLITE_READONLY, SQLITE_CANTOPEN and SQLITE_AUTH.
        Error::Database(db) => !matches!(
            db.code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff),
            Some(3 | 8 | 14 | 23)
        ),
        Error::Migrate(_) => true,
        _ => false,
    }
}

fn quarantine(path: &Path) -> std::io::Result<PathBuf> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let mut target = path.as_os_str().to_owned();
    target.push(format!(".corrupt-{stamp}"));
    let target = PathBuf::from(target);
    std::fs::rename(path, &target)?;
    Ok(target)
}
