use sqlx::SqlitePool;

/// Small key/value table for process state that must survive restarts.
pub struct AppState;

impl AppState {
    pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>("SELECT value FROM app_state WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO app_state (key, value) VALUES ($1, $2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn clear(pool: &SqlitePool, key: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM app_state WHERE key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn set_overwrites_and_clear_removes() {
        let db = DBService::new_in_memory().await.unwrap();
        assert_eq!(AppState::get(&db.pool, "open").await.unwrap(), None);
        AppState::set(&db.pool, "open", "1").await.unwrap();
        AppState::set(&db.pool, "open", "2").await.unwrap();
        assert_eq!(
            AppState::get(&db.pool, "open").await.unwrap().as_deref(),
            Some("2")
        );
        AppState::clear(&db.pool, "open").await.unwrap();
        assert_eq!(AppState::get(&db.pool, "open").await.unwrap(), None);
    }
}
