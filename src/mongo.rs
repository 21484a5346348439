// src/mongo.rs
use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{
    ClientOptions, FindOneAndReplaceOptions, FindOneAndUpdateOptions, FindOptions as DriverFindOptions,
    Tls, TlsOptions, UpdateModifications, UpdateOptions,
};
use mongodb::{Client, Collection, Database, SearchIndexModel};
use tracing::debug;

use crate::credentials::ResolvedConnection;
use crate::error::NodeError;
use crate::store::{DocumentStore, FindOptions, StoreConnector, StoreResult, UpdatePayload, WriteOptions};

pub async fn connect(connection: &ResolvedConnection) -> Result<Client, NodeError> {
    let mut client_options = ClientOptions::parse(&connection.connection_string).await?;
    if let Some(files) = &connection.tls {
        let mut tls = TlsOptions::default();
        tls.ca_file_path = files.ca_file.clone();
        tls.cert_key_file_path = files.cert_key_file.clone();
        tls.tls_certificate_key_file_password = files.cert_key_password.clone().map(String::into_bytes);
        client_options.tls = Some(Tls::Enabled(tls));
    }
    let client = Client::with_options(client_options)?;
    Ok(client)
}

/// [`DocumentStore`] backed by one database of a live MongoDB deployment.
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, database: &str) -> Self {
        let db = client.database(database);
        MongoStore { client, db }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

impl From<UpdatePayload> for UpdateModifications {
    fn from(payload: UpdatePayload) -> Self {
        match payload {
            UpdatePayload::Document(doc) => UpdateModifications::Document(doc),
            UpdatePayload::Pipeline(stages) => UpdateModifications::Pipeline(stages),
        }
    }
}

fn update_options(options: WriteOptions) -> UpdateOptions {
    let mut driver = UpdateOptions::default();
    if options.upsert {
        driver.upsert = Some(true);
    }
    driver.array_filters = options.array_filters;
    driver
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> StoreResult<Vec<Document>> {
        let cursor = self.collection(collection).aggregate(pipeline).await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let mut driver = DriverFindOptions::default();
        driver.skip = options.skip;
        driver.limit = options.limit;
        driver.sort = options.sort;
        driver.projection = options.projection;

        let cursor = self.collection(collection).find(filter).with_options(driver).await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        let result = self.collection(collection).delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson> {
        let result = self.collection(collection).insert_one(document).await?;
        Ok(result.inserted_id)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<Vec<Bson>> {
        let count = documents.len();
        let mut result = self.collection(collection).insert_many(documents).await?;
        Ok((0..count)
            .filter_map(|i| result.inserted_ids.remove(&i))
            .collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: UpdatePayload,
        options: WriteOptions,
    ) -> StoreResult<()> {
        let result = self
            .collection(collection)
            .update_one(filter, UpdateModifications::from(update))
            .with_options(update_options(options))
            .await?;
        debug!(matched = result.matched_count, modified = result.modified_count, "update_one");
        Ok(())
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: UpdatePayload,
        options: WriteOptions,
    ) -> StoreResult<()> {
        let result = self
            .collection(collection)
            .update_many(filter, UpdateModifications::from(update))
            .with_options(update_options(options))
            .await?;
        debug!(matched = result.matched_count, modified = result.modified_count, "update_many");
        Ok(())
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: WriteOptions,
    ) -> StoreResult<Option<Document>> {
        let mut driver = FindOneAndReplaceOptions::default();
        if options.upsert {
            driver.upsert = Some(true);
        }
        Ok(self
            .collection(collection)
            .find_one_and_replace(filter, replacement)
            .with_options(driver)
            .await?)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: UpdatePayload,
        options: WriteOptions,
    ) -> StoreResult<Option<Document>> {
        let mut driver = FindOneAndUpdateOptions::default();
        if options.upsert {
            driver.upsert = Some(true);
        }
        driver.array_filters = options.array_filters;
        Ok(self
            .collection(collection)
            .find_one_and_update(filter, UpdateModifications::from(update))
            .with_options(driver)
            .await?)
    }

    async fn list_search_indexes(&self, collection: &str, name: Option<&str>) -> StoreResult<Vec<Document>> {
        let coll = self.collection(collection);
        let cursor = match name {
            Some(name) => coll.list_search_indexes().name(name).await?,
            None => coll.list_search_indexes().await?,
        };
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn create_search_index(
        &self,
        collection: &str,
        name: &str,
        definition: Document,
    ) -> StoreResult<String> {
        let model = SearchIndexModel::builder()
            .definition(definition)
            .name(Some(name.to_string()))
            .build();
        Ok(self.collection(collection).create_search_index(model).await?)
    }

    async fn update_search_index(&self, collection: &str, name: &str, definition: Document) -> StoreResult<()> {
        self.collection(collection)
            .update_search_index(name, definition)
            .await?;
        Ok(())
    }

    async fn drop_search_index(&self, collection: &str, name: &str) -> StoreResult<()> {
        self.collection(collection).drop_search_index(name).await?;
        Ok(())
    }

    async fn list_database_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.client.list_database_names().await?)
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}

/// Opens a fresh [`MongoStore`] per invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

#[async_trait]
impl StoreConnector for MongoConnector {
    type Store = MongoStore;

    async fn connect(&self, connection: &ResolvedConnection) -> Result<MongoStore, NodeError> {
        let client = connect(connection).await?;
        debug!(database = %connection.database, "connected to MongoDB");
        Ok(MongoStore::new(client, &connection.database))
    }
}
