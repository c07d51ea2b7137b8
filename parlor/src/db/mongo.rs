//! MongoDB client and collection wrapper
//!
//! Collections are typed by their schema document; indexes declared by the
//! schema are applied when the collection is opened.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::ParlorError;

/// Server error code for a unique index violation
const DUPLICATE_KEY: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping, failing fast on an unreachable server
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, ParlorError> {
        info!("Connecting to MongoDB at {}", uri);

        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| ParlorError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ParlorError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, ParlorError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    /// Open a collection and apply its indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, ParlorError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), ParlorError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| ParlorError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, stamping metadata.
    ///
    /// Returns `None` when a unique index rejects it, so callers can map the
    /// conflict to their own error.
    pub async fn try_insert_one(&self, mut item: T) -> Result<Option<ObjectId>, ParlorError> {
        let metadata = item.mut_metadata();
        let now = DateTime::now();
        metadata.created_at.get_or_insert(now);
        metadata.updated_at = Some(now);

        match self.inner.insert_one(item).await {
            Ok(result) => result
                .inserted_id
                .as_object_id()
                .map(Some)
                .ok_or_else(|| ParlorError::Database("Failed to get inserted ID".into())),
            Err(e) if is_duplicate_key(&e) => Ok(None),
            Err(e) => Err(ParlorError::Database(format!("Insert failed: {}", e))),
        }
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, ParlorError> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| ParlorError::Database(format!("Find failed: {}", e)))
    }

    /// Find documents by filter, optionally sorted and bounded
    pub async fn find_many(
        &self,
        filter: Document,
        sort: Option<Document>,
        limit: Option<i64>,
    ) -> Result<Vec<T>, ParlorError> {
        use futures_util::StreamExt;

        let mut find = self.inner.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        if let Some(limit) = limit {
            find = find.limit(limit);
        }

        let cursor = find
            .await
            .map_err(|e| ParlorError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Update one document, bumping `metadata.updated_at`
    pub async fn update_one(
        &self,
        filter: Document,
        mut set: Document,
    ) -> Result<UpdateResult, ParlorError> {
        set.insert("metadata.updated_at", DateTime::now());
        let modifications = UpdateModifications::Document(doc! { "$set": set });

        self.inner
            .update_one(filter, modifications)
            .await
            .map_err(|e| ParlorError::Database(format!("Update failed: {}", e)))
    }

    /// Delete matching documents, returning how many went
    pub async fn delete_many(&self, filter: Document) -> Result<u64, ParlorError> {
        self.inner
            .delete_many(filter)
            .await
            .map(|r| r.deleted_count)
            .map_err(|e| ParlorError::Database(format!("Delete failed: {}", e)))
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY,
        _ => false,
    }
}
