use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoHistoryDocument, MongoPlaybackDocument, history_doc_id, playback_doc_id},
};
use crate::dao::{
    models::{HistoryEntryEntity, PlaybackStateEntity},
    playback_store::PlaybackStore,
    storage::StorageResult,
};

const PLAYBACK_COLLECTION_NAME: &str = "playback_state";
const HISTORY_COLLECTION_NAME: &str = "listening_history";

/// MongoDB-backed [`PlaybackStore`].
#[derive(Clone)]
pub struct MongoPlaybackStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.database = database;
        Ok(())
    }
}

impl MongoPlaybackStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.history_collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"device_id": 1, "started_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("history_device_started_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: HISTORY_COLLECTION_NAME,
                index: "device_id,started_at",
                source,
            })?;

        Ok(())
    }

    async fn playback_collection(&self) -> Collection<MongoPlaybackDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPlaybackDocument>(PLAYBACK_COLLECTION_NAME)
    }

    async fn history_collection(&self) -> Collection<MongoHistoryDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoHistoryDocument>(HISTORY_COLLECTION_NAME)
    }

    async fn load_state(&self) -> MongoResult<Option<PlaybackStateEntity>> {
        let collection = self.playback_collection().await;
        let document = collection
            .find_one(playback_doc_id())
            .await
            .map_err(|source| MongoDaoError::LoadState { source })?;
        Ok(document.map(Into::into))
    }

    async fn upsert_state(&self, state: PlaybackStateEntity) -> MongoResult<()> {
        let revision = state.revision;
        let document: MongoPlaybackDocument = state.into();
        let collection = self.playback_collection().await;
        collection
            .replace_one(playback_doc_id(), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveState { revision, source })?;
        Ok(())
    }

    async fn insert_history(&self, entry: HistoryEntryEntity) -> MongoResult<()> {
        let id = entry.id;
        let document: MongoHistoryDocument = entry.into();
        let collection = self.history_collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveHistory { id, source })?;
        Ok(())
    }

    async fn update_history(&self, entry: HistoryEntryEntity) -> MongoResult<()> {
        let id = entry.id;
        let document: MongoHistoryDocument = entry.into();
        let collection = self.history_collection().await;
        let result = collection
            .replace_one(history_doc_id(id), &document)
            .await
            .map_err(|source| MongoDaoError::SaveHistory { id, source })?;
        if result.matched_count == 0 {
            return Err(MongoDaoError::MissingHistory { id });
        }
        Ok(())
    }

    async fn find_history(
        &self,
        filter: mongodb::bson::Document,
        limit: Option<usize>,
    ) -> MongoResult<Vec<HistoryEntryEntity>> {
        let collection = self.history_collection().await;
        let mut find = collection.find(filter).sort(doc! {"started_at": -1});
        if let Some(limit) = limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        let documents: Vec<MongoHistoryDocument> = find
            .await
            .map_err(|source| MongoDaoError::ListHistory { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListHistory { source })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }
}

impl PlaybackStore for MongoPlaybackStore {
    fn load_state(&self) -> BoxFuture<'static, StorageResult<Option<PlaybackStateEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_state().await.map_err(Into::into) })
    }

    fn upsert_state(&self, state: PlaybackStateEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_state(state).await.map_err(Into::into) })
    }

    fn insert_history(&self, entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_history(entry).await.map_err(Into::into) })
    }

    fn update_history(&self, entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.update_history(entry).await.map_err(Into::into) })
    }

    fn open_history(&self) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_history(doc! {"completed_at": null}, None)
                .await
                .map_err(Into::into)
        })
    }

    fn list_history(
        &self,
        device_id: Option<String>,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = match device_id {
                Some(device) => doc! {"device_id": device},
                None => doc! {},
            };
            store
                .find_history(filter, Some(limit))
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await.map_err(Into::into) })
    }
}
