use std::ops::Deref;

use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};
use tracing::info;

use super::types::StoredObject;
use crate::{error::AppError, utils::config::AppConfig};

/// Handle to the vector store. Derefs to the raw SurrealDB client for
/// queries that the typed helpers below do not cover.
#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    /// Connects to `address` (`surrealkv://dir`, `mem://`, `ws://host:port`).
    /// Only remote servers need credentials.
    pub async fn new(
        address: &str,
        credentials: Option<(&str, &str)>,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let client = connect(address).await?;
        if let Some((username, password)) = credentials {
            client.signin(Root { username, password }).await?;
        }
        client.use_ns(namespace).use_db(database).await?;
        Ok(Self { client })
    }

    /// Opens the store described by config, creating the on-disk directory
    /// for the embedded engine.
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        if config.surrealdb_address.is_none() {
            tokio::fs::create_dir_all(&config.vector_store_dir).await?;
        }
        let address = config.database_address();
        let credentials = config
            .surrealdb_username
            .as_deref()
            .zip(config.surrealdb_password.as_deref());

        info!(%address, namespace = %config.surrealdb_namespace, "Opening vector store");
        let client = Self::new(
            &address,
            credentials,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?;
        Ok(client)
    }

    /// Round trip used by the readiness probe.
    pub async fn ping(&self) -> Result<(), Error> {
        self.client.query("RETURN true").await?.check()?;
        Ok(())
    }

    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        let id = item.get_id().to_string();
        self.client.create((T::table_name(), id)).content(item).await
    }

    /// Like [`Self::store_item`] but replaces a record with the same id.
    pub async fn upsert_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        let id = item.get_id().to_string();
        self.client.upsert((T::table_name(), id)).content(item).await
    }

    pub async fn get_all_stored_items<T: StoredObject>(&self) -> Result<Vec<T>, Error> {
        self.client.select(T::table_name()).await
    }

    pub async fn get_item<T: StoredObject>(&self, id: &str) -> Result<Option<T>, Error> {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn delete_item<T: StoredObject>(&self, id: &str) -> Result<Option<T>, Error> {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Throwaway in-memory store for tests.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        Self::new("mem://", None, namespace, database).await
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    fn dummy(id: &str, name: &str) -> Dummy {
        Dummy {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let item = dummy("abc", "first");

        let stored = db.store_item(item.clone()).await.expect("Failed to store");
        assert!(stored.is_some());

        let fetched = db
            .get_item::<Dummy>(&item.id)
            .await
            .expect("Failed to fetch");
        assert_eq!(fetched, Some(item.clone()));

        let all = db
            .get_all_stored_items::<Dummy>()
            .await
            .expect("Failed to fetch all");
        assert!(all.contains(&item));

        let deleted = db
            .delete_item::<Dummy>(&item.id)
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, Some(item));

        let fetch_post = db
            .get_item::<Dummy>("abc")
            .await
            .expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_instead_of_duplicating() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.upsert_item(dummy("same", "first")).await.expect("upsert");
        db.upsert_item(dummy("same", "second")).await.expect("upsert");

        let all = db
            .get_all_stored_items::<Dummy>()
            .await
            .expect("Failed to fetch all");
        assert_eq!(all.len(), 1);
        assert_eq!(all.first().map(|d| d.name.as_str()), Some("second"));
    }

    #[tokio::test]
    async fn ping_succeeds_on_memory_engine() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ping().await.expect("ping");
    }

    #[tokio::test]
    async fn opens_embedded_store_from_config() {
        let config = AppConfig {
            surrealdb_address: Some("mem://".into()),
            ..AppConfig::default()
        };
        let db = SurrealDbClient::from_config(&config).await.expect("open");
        db.ping().await.expect("ping");
    }
}
