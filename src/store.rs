// src/store.rs
//! Document store seam. [`crate::mongo`] provides the MongoDB implementation.
use async_trait::async_trait;
use bson::{Bson, Document};

use crate::credentials::ResolvedConnection;
use crate::error::{NodeError, StoreError};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Cursor modifiers for `find`. `None` means the clause is not applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub upsert: bool,
    pub array_filters: Option<Vec<Document>>,
}

/// Second argument of an update: operator document or aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    Document(Document),
    Pipeline(Vec<Document>),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Runs the pipeline and materialises the whole cursor.
    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> StoreResult<Vec<Document>>;

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Returns the number of deleted documents.
    async fn delete_many(&self, collection: &str, filter: Document) -> StoreResult<u64>;

    /// Returns the `_id` assigned to the document.
    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson>;

    /// Returns the assigned `_id`s in input order.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<Vec<Bson>>;

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: UpdatePayload,
        options: WriteOptions,
    ) -> StoreResult<()>;

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: UpdatePayload,
        options: WriteOptions,
    ) -> StoreResult<()>;

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: WriteOptions,
    ) -> StoreResult<Option<Document>>;

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: UpdatePayload,
        options: WriteOptions,
    ) -> StoreResult<Option<Document>>;

    async fn list_search_indexes(&self, collection: &str, name: Option<&str>) -> StoreResult<Vec<Document>>;

    /// Returns the name the server gave the index.
    async fn create_search_index(
        &self,
        collection: &str,
        name: &str,
        definition: Document,
    ) -> StoreResult<String>;

    async fn update_search_index(&self, collection: &str, name: &str, definition: Document) -> StoreResult<()>;

    async fn drop_search_index(&self, collection: &str, name: &str) -> StoreResult<()>;

    async fn list_database_names(&self) -> StoreResult<Vec<String>>;

    /// Releases the connection. Errors while closing are not reported.
    async fn close(&self);
}

/// Opens a store for one invocation.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: DocumentStore;

    async fn connect(&self, connection: &ResolvedConnection) -> Result<Self::Store, NodeError>;
}
