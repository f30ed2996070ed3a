use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value};
use tracing::warn;

use crate::dao::{
    models::{HistoryEntryEntity, PlaybackStateEntity},
    playback_store::{PlaybackStore, select_recent},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        CouchHistoryDocument, CouchPlaybackDocument, FindResponse, history_doc_id,
        history_indexes, index_request, open_history_query, playback_doc_id,
        recent_history_query,
    },
};

/// CouchDB-backed [`PlaybackStore`] talking to the HTTP document API.
#[derive(Clone)]
pub struct CouchPlaybackStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchPlaybackStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        store.ensure_indexes().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: response.status(),
            })
        }
    }

    /// Create the Mango indexes the history queries rely on; existing ones are kept.
    async fn ensure_indexes(&self) -> CouchResult<()> {
        const INDEX: &str = "_index";
        for (name, fields) in history_indexes() {
            let response = self
                .request(Method::POST, INDEX)
                .json(&index_request(name, &fields))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: INDEX.to_string(),
                    source,
                })?;
            if !response.status().is_success() {
                return Err(CouchDaoError::RequestStatus {
                    path: INDEX.to_string(),
                    status: response.status(),
                });
            }
        }
        Ok(())
    }

    async fn find_documents<T>(&self, query: &Value) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const FIND: &str = "_find";
        let response = self
            .request(Method::POST, FIND)
            .json(query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: FIND.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: FIND.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<FindResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: FIND.to_string(),
                source,
            }
        })?;
        if let Some(warning) = payload.warning {
            warn!(%warning, "CouchDB query warning");
        }

        payload
            .docs
            .into_iter()
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: FIND.to_string(),
                    source,
                })
            })
            .collect()
    }

    async fn find_history(&self, query: Value) -> CouchResult<Vec<HistoryEntryEntity>> {
        let docs = self.find_documents::<CouchHistoryDocument>(&query).await?;
        Ok(docs.into_iter().map(|doc| doc.entry).collect())
    }
}

impl PlaybackStore for CouchPlaybackStore {
    fn load_state(&self) -> BoxFuture<'static, StorageResult<Option<PlaybackStateEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchPlaybackDocument>(&playback_doc_id())
                .await?;
            Ok(maybe_doc.map(CouchPlaybackDocument::into_entity))
        })
    }

    fn upsert_state(&self, state: PlaybackStateEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = playback_doc_id();
            let mut doc = CouchPlaybackDocument::from_entity(state);
            if let Some(existing) = store.get_document::<CouchPlaybackDocument>(&doc_id).await? {
                doc.rev = existing.rev;
            }
            store.put_document(&doc_id, &doc).await.map_err(Into::into)
        })
    }

    fn insert_history(&self, entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchHistoryDocument::from_entity(entry);
            store.put_document(&doc.id, &doc).await.map_err(Into::into)
        })
    }

    fn update_history(&self, entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = history_doc_id(entry.id);
            let Some(existing) = store.get_document::<CouchHistoryDocument>(&doc_id).await? else {
                return Err(CouchDaoError::MissingDocument { doc_id }.into());
            };
            let mut doc = CouchHistoryDocument::from_entity(entry);
            doc.rev = existing.rev;
            store.put_document(&doc_id, &doc).await.map_err(Into::into)
        })
    }

    fn open_history(&self) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut entries = store.find_history(open_history_query()).await?;
            entries.retain(HistoryEntryEntity::is_open);
            Ok(entries)
        })
    }

    fn list_history(
        &self,
        device_id: Option<String>,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let entries = store
                .find_history(recent_history_query(device_id.as_deref(), limit))
                .await?;
            Ok(select_recent(entries, device_id.as_deref(), limit))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", store.base_url, store.database);
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_database().await?;
            store.ensure_indexes().await.map_err(Into::into)
        })
    }
}
