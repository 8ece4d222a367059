//! SQLite-backed persistence for state, history, and definition tables.
//!
//! Rows carry serialized JSON payloads keyed by id. The write path is the
//! core's write-behind queue; reads happen at startup and on cache misses,
//! so a single-connection pool is enough.

use anyhow::Result as AnyResult;
use sqlx::{Pool, Row, Sqlite, sqlite::SqlitePoolOptions};

use domain::association::Association;
use domain::device::{Device, DeviceId};
use domain::error::{CoreError, Result};
use domain::scene::Scene;
use domain::state::DeviceState;
use domain::store::{
    AssociationStore, DeviceStore, HistoryEntry, HistoryStore, SceneStore, StateStore,
};

pub async fn connect(connection_string: &str) -> AnyResult<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1) // SQLite is single-writer
        .connect(connection_string)
        .await?;
    Ok(pool)
}

pub async fn init_schema(pool: &Pool<Sqlite>) -> AnyResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS device_states (
            device_id TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS state_history (
            id INTEGER PRIMARY KEY,
            device_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS associations (
            id TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS scenes (
            id TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn storage_err(e: impl std::fmt::Display) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(storage_err)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(storage_err)
}

#[derive(Clone)]
pub struct SqliteStateStore {
    pool: Pool<Sqlite>,
}

impl SqliteStateStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, device_id: &DeviceId) -> Result<Option<DeviceState>> {
        let row = sqlx::query("SELECT payload FROM device_states WHERE device_id = ?")
            .bind(device_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        match row {
            Some(row) => Ok(Some(decode(&row.get::<String, _>(0))?)),
            None => Ok(None),
        }
    }

    async fn put(&self, state: &DeviceState) -> Result<()> {
        sqlx::query(
            "INSERT INTO device_states (device_id, payload) VALUES (?, ?)
             ON CONFLICT(device_id) DO UPDATE SET payload = excluded.payload",
        )
        .bind(state.device_id.as_str())
        .bind(encode(state)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeviceState>> {
        let rows = sqlx::query("SELECT payload FROM device_states")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter()
            .map(|row| decode(&row.get::<String, _>(0)))
            .collect()
    }
}

#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: Pool<Sqlite>,
}

impl SqliteHistoryStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM state_history")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)
    }
}

#[async_trait::async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, entry: &HistoryEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO state_history (device_id, payload, recorded_at) VALUES (?, ?, ?)",
        )
        .bind(entry.device_id.as_str())
        .bind(encode(entry)?)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteDeviceStore {
    pool: Pool<Sqlite>,
}

impl SqliteDeviceStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeviceStore for SqliteDeviceStore {
    async fn get(&self, device_id: &DeviceId) -> Result<Option<Device>> {
        let row = sqlx::query("SELECT payload FROM devices WHERE id = ?")
            .bind(device_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        match row {
            Some(row) => Ok(Some(decode(&row.get::<String, _>(0))?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Device>> {
        let rows = sqlx::query("SELECT payload FROM devices")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter()
            .map(|row| decode(&row.get::<String, _>(0)))
            .collect()
    }

    async fn put(&self, device: &Device) -> Result<()> {
        sqlx::query(
            "INSERT INTO devices (id, payload) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
        )
        .bind(device.id.as_str())
        .bind(encode(device)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn delete(&self, device_id: &DeviceId) -> Result<()> {
        sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(device_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteAssociationStore {
    pool: Pool<Sqlite>,
}

impl SqliteAssociationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AssociationStore for SqliteAssociationStore {
    async fn list(&self) -> Result<Vec<Association>> {
        let rows = sqlx::query("SELECT payload FROM associations")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter()
            .map(|row| decode(&row.get::<String, _>(0)))
            .collect()
    }

    async fn replace_all(&self, associations: &[Association]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        sqlx::query("DELETE FROM associations")
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        for assoc in associations {
            sqlx::query("INSERT INTO associations (id, payload) VALUES (?, ?)")
                .bind(&assoc.id)
                .bind(encode(assoc)?)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteSceneStore {
    pool: Pool<Sqlite>,
}

impl SqliteSceneStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SceneStore for SqliteSceneStore {
    async fn get(&self, scene_id: &str) -> Result<Option<Scene>> {
        let row = sqlx::query("SELECT payload FROM scenes WHERE id = ?")
            .bind(scene_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        match row {
            Some(row) => Ok(Some(decode(&row.get::<String, _>(0))?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Scene>> {
        let rows = sqlx::query("SELECT payload FROM scenes")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter()
            .map(|row| decode(&row.get::<String, _>(0)))
            .collect()
    }

    async fn put(&self, scene: &Scene) -> Result<()> {
        sqlx::query(
            "INSERT INTO scenes (id, payload) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
        )
        .bind(&scene.id)
        .bind(encode(scene)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn delete(&self, scene_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scenes WHERE id = ?")
            .bind(scene_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::association::{AssociationTarget, AssociationType};
    use domain::state::StateSource;

    async fn pool() -> Pool<Sqlite> {
        let pool = connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    fn sample_state(id: &str) -> DeviceState {
        let serde_json::Value::Object(props) = serde_json::json!({"on": true, "level": 80}) else {
            unreachable!()
        };
        DeviceState::new(
            DeviceId::new(id).unwrap(),
            props,
            Utc::now(),
            true,
            StateSource::Native,
        )
    }

    #[tokio::test]
    async fn test_state_put_get() {
        let store = SqliteStateStore::new(pool().await);
        let state = sample_state("light-1");
        store.put(&state).await.unwrap();

        let loaded = store.get(&state.device_id).await.unwrap().unwrap();
        assert_eq!(loaded.properties, state.properties);
        assert!(loaded.confirmed);
    }

    #[tokio::test]
    async fn test_state_put_overwrites() {
        let store = SqliteStateStore::new(pool().await);
        let mut state = sample_state("light-1");
        store.put(&state).await.unwrap();

        state.properties.insert("level".into(), serde_json::json!(20));
        store.put(&state).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].properties["level"], serde_json::json!(20));
    }

    #[tokio::test]
    async fn test_replace_all_swaps_association_set() {
        let store = SqliteAssociationStore::new(pool().await);
        let make = |id: &str| Association {
            id: id.to_string(),
            source_device_id: DeviceId::new("meter-1").unwrap(),
            target: AssociationTarget::Device {
                device_id: DeviceId::new("pump-1").unwrap(),
            },
            kind: AssociationType::Monitors,
            metrics: Default::default(),
            command_map: Default::default(),
            configured_at: Utc::now(),
        };

        store.replace_all(&[make("a1"), make("a2")]).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);

        store.replace_all(&[make("a3")]).await.unwrap();
        let left = store.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "a3");
    }

    #[tokio::test]
    async fn test_history_append_only() {
        let store = SqliteHistoryStore::new(pool().await);
        let state = sample_state("light-1");
        store
            .append(&HistoryEntry::from_state(&state))
            .await
            .unwrap();
        store
            .append(&HistoryEntry::from_state(&state))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
