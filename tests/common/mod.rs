#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use serde_json::{json, Value};

use mongoex::credentials::{Credentials, ResolvedConnection};
use mongoex::store::{FindOptions, StoreResult, UpdatePayload, WriteOptions};
use mongoex::{DocumentStore, ExecutionContext, NodeError, StoreConnector, StoreError, WorkItem};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Aggregate { collection: String, pipeline: Vec<Document> },
    Find { collection: String, filter: Document, options: FindOptions },
    DeleteMany { collection: String, filter: Document },
    InsertOne { collection: String, document: Document },
    InsertMany { collection: String, documents: Vec<Document> },
    UpdateOne { collection: String, filter: Document, update: UpdatePayload, options: WriteOptions },
    UpdateMany { collection: String, filter: Document, update: UpdatePayload, options: WriteOptions },
    FindOneAndReplace { collection: String, filter: Document, replacement: Document, options: WriteOptions },
    FindOneAndUpdate { collection: String, filter: Document, update: UpdatePayload, options: WriteOptions },
    ListSearchIndexes { collection: String, name: Option<String> },
    CreateSearchIndex { collection: String, name: String, definition: Document },
    UpdateSearchIndex { collection: String, name: String, definition: Document },
    DropSearchIndex { collection: String, name: String },
    ListDatabaseNames,
}

#[derive(Default)]
struct State {
    calls: Mutex<Vec<Call>>,
    documents: Mutex<Vec<Document>>,
    databases: Mutex<Vec<String>>,
    failing: Mutex<Option<String>>,
    closed: AtomicUsize,
}

/// In-memory store that records every call. Clones share state.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<State>,
}

impl FakeStore {
    pub fn new() -> Self {
        FakeStore::default()
    }

    /// Documents returned by find, aggregate and listSearchIndexes.
    pub fn with_documents(self, docs: Vec<Document>) -> Self {
        *self.state.documents.lock().unwrap() = docs;
        self
    }

    pub fn with_databases(self, names: &[&str]) -> Self {
        *self.state.databases.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Every call against this collection fails.
    pub fn failing_on(self, collection: &str) -> Self {
        *self.state.failing.lock().unwrap() = Some(collection.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn record(&self, collection: &str, call: Call) -> StoreResult<()> {
        if self.state.failing.lock().unwrap().as_deref() == Some(collection) {
            return Err(StoreError::Message(format!("collection {} is unavailable", collection)));
        }
        self.state.calls.lock().unwrap().push(call);
        Ok(())
    }

    fn documents(&self) -> Vec<Document> {
        self.state.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> StoreResult<Vec<Document>> {
        self.record(collection, Call::Aggregate { collection: collection.into(), pipeline })?;
        Ok(self.documents())
    }

    async fn find(&self, collection: &str, filter: Document, options: FindOptions) -> StoreResult<Vec<Document>> {
        self.record(collection, Call::Find { collection: collection.into(), filter, options })?;
        Ok(self.documents())
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        self.record(collection, Call::DeleteMany { collection: collection.into(), filter })?;
        Ok(self.documents().len() as u64)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson> {
        self.record(collection, Call::InsertOne { collection: collection.into(), document })?;
        Ok(Bson::ObjectId(ObjectId::new()))
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<Vec<Bson>> {
        let count = documents.len();
        self.record(collection, Call::InsertMany { collection: collection.into(), documents })?;
        Ok((0..count).map(|_| Bson::ObjectId(ObjectId::new())).collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: UpdatePayload,
        options: WriteOptions,
    ) -> StoreResult<()> {
        self.record(collection, Call::UpdateOne { collection: collection.into(), filter, update, options })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: UpdatePayload,
        options: WriteOptions,
    ) -> StoreResult<()> {
        self.record(collection, Call::UpdateMany { collection: collection.into(), filter, update, options })
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: WriteOptions,
    ) -> StoreResult<Option<Document>> {
        self.record(
            collection,
            Call::FindOneAndReplace { collection: collection.into(), filter, replacement, options },
        )?;
        Ok(None)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: UpdatePayload,
        options: WriteOptions,
    ) -> StoreResult<Option<Document>> {
        self.record(
            collection,
            Call::FindOneAndUpdate { collection: collection.into(), filter, update, options },
        )?;
        Ok(None)
    }

    async fn list_search_indexes(&self, collection: &str, name: Option<&str>) -> StoreResult<Vec<Document>> {
        self.record(
            collection,
            Call::ListSearchIndexes { collection: collection.into(), name: name.map(str::to_string) },
        )?;
        Ok(self.documents())
    }

    async fn create_search_index(&self, collection: &str, name: &str, definition: Document) -> StoreResult<String> {
        self.record(
            collection,
            Call::CreateSearchIndex { collection: collection.into(), name: name.into(), definition },
        )?;
        Ok(name.to_string())
    }

    async fn update_search_index(&self, collection: &str, name: &str, definition: Document) -> StoreResult<()> {
        self.record(
            collection,
            Call::UpdateSearchIndex { collection: collection.into(), name: name.into(), definition },
        )
    }

    async fn drop_search_index(&self, collection: &str, name: &str) -> StoreResult<()> {
        self.record(collection, Call::DropSearchIndex { collection: collection.into(), name: name.into() })
    }

    async fn list_database_names(&self) -> StoreResult<Vec<String>> {
        self.state.calls.lock().unwrap().push(Call::ListDatabaseNames);
        Ok(self.state.databases.lock().unwrap().clone())
    }

    async fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeConnector {
    pub store: FakeStore,
    pub refuse: Option<String>,
    pub seen: Mutex<Option<ResolvedConnection>>,
}

impl FakeConnector {
    pub fn new(store: FakeStore) -> Self {
        FakeConnector { store, refuse: None, seen: Mutex::new(None) }
    }

    pub fn refusing(message: &str) -> Self {
        FakeConnector { store: FakeStore::new(), refuse: Some(message.into()), seen: Mutex::new(None) }
    }
}

#[async_trait]
impl StoreConnector for FakeConnector {
    type Store = FakeStore;

    async fn connect(&self, connection: &ResolvedConnection) -> Result<FakeStore, NodeError> {
        *self.seen.lock().unwrap() = Some(connection.clone());
        match &self.refuse {
            Some(message) => Err(NodeError::Store(StoreError::Message(message.clone()))),
            None => Ok(self.store.clone()),
        }
    }
}

/// Parameters are shared by all items unless overridden for one index.
pub struct TestContext {
    items: Vec<WorkItem>,
    params: HashMap<String, Value>,
    overrides: HashMap<(String, usize), Value>,
    continue_on_fail: bool,
    type_version: f64,
}

impl TestContext {
    pub fn new(operation: &str) -> Self {
        let mut params = HashMap::new();
        params.insert("operation".to_string(), json!(operation));
        params.insert("collection".to_string(), json!("people"));
        TestContext {
            items: vec![WorkItem::new(0, json!({}))],
            params,
            overrides: HashMap::new(),
            continue_on_fail: false,
            type_version: 1.2,
        }
    }

    pub fn items(mut self, count: usize) -> Self {
        self.items = (0..count).map(|i| WorkItem::new(i, json!({ "n": i }))).collect();
        self
    }

    pub fn param(mut self, name: &str, value: Value) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    pub fn param_at(mut self, name: &str, index: usize, value: Value) -> Self {
        self.overrides.insert((name.to_string(), index), value);
        self
    }

    pub fn continue_on_fail(mut self) -> Self {
        self.continue_on_fail = true;
        self
    }

    pub fn version(mut self, version: f64) -> Self {
        self.type_version = version;
        self
    }
}

impl ExecutionContext for TestContext {
    fn input_items(&self) -> &[WorkItem] {
        &self.items
    }

    fn parameter(&self, name: &str, index: usize) -> mongoex::Result<Option<Value>> {
        Ok(self
            .overrides
            .get(&(name.to_string(), index))
            .or_else(|| self.params.get(name))
            .cloned())
    }

    fn credentials(&self) -> mongoex::Result<Credentials> {
        Ok(Credentials::from_uri("mongodb://localhost:27017", "test"))
    }

    fn continue_on_fail(&self) -> bool {
        self.continue_on_fail
    }

    fn type_version(&self) -> f64 {
        self.type_version
    }
}
