// src/dispatch.rs
//! Turns node parameters into store calls, one handler per [`OperationKind`].
use bson::{doc, Bson, Document};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::coerce::{coerce, json_to_bson};
use crate::context::{ExecutionContext, PairedItem, ParameterExt};
use crate::error::{NodeError, Result};
use crate::operation::{ItemMode, OperationKind};
use crate::output::{construct_execution_metadata, document_to_json, error_json, paired_items, OutputRecord};
use crate::store::{DocumentStore, FindOptions, StoreConnector, UpdatePayload, WriteOptions};

/// Resolves credentials, opens the store, runs the requested operation and
/// closes the store again on every path before returning.
pub async fn execute<K, C>(connector: &K, ctx: &C) -> Result<Vec<OutputRecord>>
where
    K: StoreConnector,
    C: ExecutionContext + ?Sized,
{
    let connection = ctx.credentials()?.resolve()?;
    let store = connector.connect(&connection).await?;

    let outcome = run_operation(&store, ctx).await;

    store.close().await;
    debug!("store connection closed");
    outcome
}

async fn run_operation<S, C>(store: &S, ctx: &C) -> Result<Vec<OutputRecord>>
where
    S: DocumentStore,
    C: ExecutionContext + ?Sized,
{
    let kind: OperationKind = ctx.str_param("operation", 0)?.parse()?;
    let mode = ItemMode::for_type_version(ctx.type_version());
    Dispatcher::new(store, ctx, mode).run(kind).await
}

pub struct Dispatcher<'a, S: ?Sized, C: ?Sized> {
    store: &'a S,
    ctx: &'a C,
    mode: ItemMode,
}

impl<'a, S, C> Dispatcher<'a, S, C>
where
    S: DocumentStore + ?Sized,
    C: ExecutionContext + ?Sized,
{
    pub fn new(store: &'a S, ctx: &'a C, mode: ItemMode) -> Self {
        Dispatcher { store, ctx, mode }
    }

    pub async fn run(&self, kind: OperationKind) -> Result<Vec<OutputRecord>> {
        let item_count = self.ctx.input_items().len();
        info!(
            operation = %kind,
            resource = ?kind.resource(),
            mode = ?self.mode,
            items = item_count,
            "running operation"
        );

        match kind {
            OperationKind::Insert => self.run_once(kind).await,
            _ if kind.is_whole_batch() => self.run_whole_batch(kind).await,
            _ => self.run_per_item(kind).await,
        }
    }

    /// Provenance shared by every record in legacy mode.
    fn fallback_provenance(&self) -> Option<Vec<PairedItem>> {
        match self.mode {
            ItemMode::Legacy => Some(paired_items(self.ctx.input_items().len())),
            ItemMode::PerItem => None,
        }
    }

    async fn run_per_item(&self, kind: OperationKind) -> Result<Vec<OutputRecord>> {
        let passes = self.mode.passes(self.ctx.input_items().len());
        let fallback = self.fallback_provenance();
        let mut records = Vec::new();

        for index in 0..passes {
            let provenance = fallback
                .clone()
                .unwrap_or_else(|| vec![PairedItem { item: index }]);

            match self.handle(kind, index).await {
                Ok(docs) => {
                    debug!(operation = %kind, index, results = docs.len(), "item done");
                    records.extend(
                        docs.into_iter()
                            .map(|doc| OutputRecord::from_document(doc, provenance.clone())),
                    );
                }
                Err(e) if self.ctx.continue_on_fail() => {
                    warn!(operation = %kind, index, error = %e, "item failed, continuing");
                    records.push(OutputRecord::error(e.to_string(), provenance));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(records)
    }

    async fn run_whole_batch(&self, kind: OperationKind) -> Result<Vec<OutputRecord>> {
        let item_count = self.ctx.input_items().len();
        let mut results = Vec::new();

        for index in 0..self.mode.passes(item_count) {
            match self.handle(kind, index).await {
                Ok(docs) => results.extend(docs.into_iter().map(document_to_json)),
                Err(e) if self.ctx.continue_on_fail() => {
                    warn!(operation = %kind, index, error = %e, "item failed, continuing");
                    results.push(error_json(e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(construct_execution_metadata(results, &paired_items(item_count)))
    }

    /// Single pass driven by the first item's parameters. A failure replaces
    /// the whole result set with one error record.
    async fn run_once(&self, kind: OperationKind) -> Result<Vec<OutputRecord>> {
        let results = match self.handle(kind, 0).await {
            Ok(docs) => docs.into_iter().map(document_to_json).collect(),
            Err(e) if self.ctx.continue_on_fail() => {
                warn!(operation = %kind, error = %e, "operation failed, continuing");
                vec![error_json(e.to_string())]
            }
            Err(e) => return Err(e),
        };

        Ok(construct_execution_metadata(
            results,
            &paired_items(self.ctx.input_items().len()),
        ))
    }

    async fn handle(&self, kind: OperationKind, index: usize) -> Result<Vec<Document>> {
        match kind {
            OperationKind::Aggregate => self.aggregate(index).await,
            OperationKind::Find => self.find(index).await,
            OperationKind::Delete => self.delete(index).await.map(|d| vec![d]),
            OperationKind::Insert => self.insert(index).await,
            OperationKind::Update => self.update(index).await.map(|d| vec![d]),
            OperationKind::FindOneAndReplace => self.find_one_and_replace(index).await.map(|d| vec![d]),
            OperationKind::FindOneAndUpdate => self.find_one_and_update(index).await.map(|d| vec![d]),
            OperationKind::ListSearchIndexes => self.list_search_indexes(index).await,
            OperationKind::CreateSearchIndex => self.create_search_index(index).await.map(|d| vec![d]),
            OperationKind::UpdateSearchIndex => self.update_search_index(index).await.map(|d| vec![d]),
            OperationKind::DropSearchIndex => self.drop_search_index(index).await.map(|d| vec![d]),
        }
    }

    async fn aggregate(&self, index: usize) -> Result<Vec<Document>> {
        let pipeline = match self.coerced_param("query", index)? {
            Bson::Array(stages) => into_documents(stages, "The aggregation pipeline")?,
            _ => return Err(NodeError::validation("The aggregation pipeline must be a JSON array")),
        };
        let collection = self.ctx.str_param("collection", index)?;

        Ok(self.store.aggregate(&collection, pipeline).await?)
    }

    async fn find(&self, index: usize) -> Result<Vec<Document>> {
        let filter = self.coerced_document("query", index)?;
        let collection = self.ctx.str_param("collection", index)?;
        let options = self.find_options(index)?;

        Ok(self.store.find(&collection, filter, options).await?)
    }

    async fn delete(&self, index: usize) -> Result<Document> {
        let filter = self.coerced_document("query", index)?;
        let collection = self.ctx.str_param("collection", index)?;

        let deleted = self.store.delete_many(&collection, filter).await?;
        Ok(doc! { "deletedCount": i64::try_from(deleted).unwrap_or(i64::MAX) })
    }

    async fn insert(&self, index: usize) -> Result<Vec<Document>> {
        let many = self.ctx.bool_param("many", index, false)?;
        let collection = self.ctx.str_param("collection", index)?;

        let documents = match self.ctx.json_param("document", index)? {
            Value::Array(items) => items,
            _ if many => {
                return Err(NodeError::validation(
                    "For many=true, the \"Document\" parameter must be an array of documents",
                ))
            }
            single => vec![single],
        };
        let documents = into_documents(
            documents.into_iter().map(|d| coerce(json_to_bson(d))).collect(),
            "The documents to insert",
        )?;

        let mut inserted = Vec::with_capacity(documents.len());
        if many {
            let ids = self.store.insert_many(&collection, documents.clone()).await?;
            for (mut doc, id) in documents.into_iter().zip(ids) {
                doc.insert("id", id);
                inserted.push(doc);
            }
        } else {
            for mut doc in documents {
                let id = self.store.insert_one(&collection, doc.clone()).await?;
                doc.insert("id", id);
                inserted.push(doc);
            }
        }

        debug!(collection = %collection, count = inserted.len(), "inserted documents");
        Ok(inserted)
    }

    async fn update(&self, index: usize) -> Result<Document> {
        let filter = self.coerced_document("updateFilter", index)?;
        let payload = self.coerced_param("update", index)?;

        let update = match update_payload(payload.clone())? {
            UpdatePayload::Document(doc) => UpdatePayload::Document(wrap_in_set(doc)),
            pipeline => pipeline,
        };

        let many = self.ctx.bool_param("many", index, false)?;
        let collection = self.ctx.str_param("collection", index)?;
        let options = WriteOptions {
            upsert: self.upsert()?,
            array_filters: self.array_filters(index)?,
        };

        if many {
            self.store.update_many(&collection, filter, update, options).await?;
        } else {
            self.store.update_one(&collection, filter, update, options).await?;
        }

        Ok(echo(payload))
    }

    async fn find_one_and_replace(&self, index: usize) -> Result<Document> {
        let filter = self.coerced_document("updateFilter", index)?;
        let source = if self.ctx.parameter("document", index)?.is_some() {
            "document"
        } else {
            "update"
        };
        let payload = self.coerced_param(source, index)?;
        let collection = self.ctx.str_param("collection", index)?;
        let options = WriteOptions {
            upsert: self.upsert()?,
            array_filters: None,
        };

        match update_payload(payload.clone())? {
            UpdatePayload::Document(replacement) => {
                self.store
                    .find_one_and_replace(&collection, filter, replacement, options)
                    .await?;
            }
            // A pipeline cannot be a replacement document; the server applies it as an update.
            pipeline => {
                self.store
                    .find_one_and_update(&collection, filter, pipeline, options)
                    .await?;
            }
        }

        Ok(echo(payload))
    }

    async fn find_one_and_update(&self, index: usize) -> Result<Document> {
        let filter = self.coerced_document("updateFilter", index)?;
        let payload = self.coerced_param("update", index)?;
        let update = update_payload(payload.clone())?;
        let collection = self.ctx.str_param("collection", index)?;
        let options = WriteOptions {
            upsert: self.upsert()?,
            array_filters: self.array_filters(index)?,
        };

        self.store
            .find_one_and_update(&collection, filter, update, options)
            .await?;

        Ok(echo(payload))
    }

    async fn list_search_indexes(&self, index: usize) -> Result<Vec<Document>> {
        let collection = self.ctx.str_param("collection", index)?;
        let name = self
            .ctx
            .optional_str_param("indexName", index)?
            .filter(|n| !n.is_empty());

        Ok(self
            .store
            .list_search_indexes(&collection, name.as_deref())
            .await?)
    }

    async fn create_search_index(&self, index: usize) -> Result<Document> {
        let collection = self.ctx.str_param("collection", index)?;
        let name = self.ctx.str_param("indexNameRequired", index)?;
        let definition = self.index_definition(index)?;

        let created = self
            .store
            .create_search_index(&collection, &name, definition)
            .await?;
        debug!(collection = %collection, index = %created, "created search index");

        Ok(doc! { "indexName": name })
    }

    async fn update_search_index(&self, index: usize) -> Result<Document> {
        let collection = self.ctx.str_param("collection", index)?;
        let name = self.ctx.str_param("indexNameRequired", index)?;
        let definition = self.index_definition(index)?;

        self.store
            .update_search_index(&collection, &name, definition)
            .await?;

        let mut result = Document::new();
        result.insert(name, true);
        Ok(result)
    }

    async fn drop_search_index(&self, index: usize) -> Result<Document> {
        let collection = self.ctx.str_param("collection", index)?;
        let name = self.ctx.str_param("indexNameRequired", index)?;

        self.store.drop_search_index(&collection, &name).await?;

        let mut result = Document::new();
        result.insert(name, true);
        Ok(result)
    }

    fn coerced_param(&self, name: &str, index: usize) -> Result<Bson> {
        Ok(coerce(json_to_bson(self.ctx.json_param(name, index)?)))
    }

    fn coerced_document(&self, name: &str, index: usize) -> Result<Document> {
        match self.coerced_param(name, index)? {
            Bson::Document(doc) => Ok(doc),
            _ => Err(NodeError::validation(format!(
                "Parameter \"{}\" must be a JSON object",
                name
            ))),
        }
    }

    /// Upsert is a node-wide setting taken from the first item.
    fn upsert(&self) -> Result<bool> {
        self.ctx.bool_param("upsert", 0, false)
    }

    fn array_filters(&self, index: usize) -> Result<Option<Vec<Document>>> {
        let Some(raw) = self.ctx.optional_json_param("arrayFilters", index)? else {
            return Ok(None);
        };
        match coerce(json_to_bson(raw)) {
            Bson::Array(filters) => Ok(Some(into_documents(filters, "Array filters")?)),
            _ => Err(NodeError::validation("Array filters must be a JSON array")),
        }
    }

    fn index_definition(&self, index: usize) -> Result<Document> {
        match json_to_bson(self.ctx.json_param("indexDefinition", index)?) {
            Bson::Document(definition) => Ok(definition),
            _ => Err(NodeError::validation("The index definition must be a JSON object")),
        }
    }

    fn find_options(&self, index: usize) -> Result<FindOptions> {
        let raw = match self.ctx.parameter("options", index)? {
            None | Some(Value::Null) => return Ok(FindOptions::default()),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(FindOptions::default()),
            Some(Value::String(s)) => serde_json::from_str(&s)?,
            Some(v) => v,
        };
        let Value::Object(options) = raw else {
            return Err(NodeError::validation("Parameter \"options\" must be a JSON object"));
        };

        Ok(FindOptions {
            skip: count_option(&options, "skip")?.map(|n| n as u64),
            limit: count_option(&options, "limit")?,
            sort: non_empty_document(options.get("sort"))?,
            projection: non_empty_document(options.get("projection"))?,
        })
    }
}

/// Skip and limit arrive as numbers or as rendered template text. Only
/// positive counts are applied.
fn count_option(options: &Map<String, Value>, name: &str) -> Result<Option<i64>> {
    let count = match options.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            whole_number(s.parse::<i64>().ok(), s.parse::<f64>().ok())
        }
        Some(Value::Number(n)) => whole_number(n.as_i64(), n.as_f64()),
        Some(_) => None,
    };
    let count = count.ok_or_else(|| {
        NodeError::validation(format!("Option \"{}\" must be a whole number", name))
    })?;
    Ok(Some(count).filter(|n| *n > 0))
}

fn whole_number(int: Option<i64>, float: Option<f64>) -> Option<i64> {
    int.or_else(|| float.filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

/// Sort and projection are sent only when they are a non-empty object.
fn non_empty_document(value: Option<&Value>) -> Result<Option<Document>> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)?,
        Some(v) => v.clone(),
    };
    match json_to_bson(parsed) {
        Bson::Document(doc) if !doc.is_empty() => Ok(Some(doc)),
        _ => Ok(None),
    }
}

fn into_documents(values: Vec<Bson>, what: &str) -> Result<Vec<Document>> {
    values
        .into_iter()
        .map(|value| match value {
            Bson::Document(doc) => Ok(doc),
            _ => Err(NodeError::validation(format!(
                "{} must contain only JSON objects",
                what
            ))),
        })
        .collect()
}

fn update_payload(payload: Bson) -> Result<UpdatePayload> {
    match payload {
        Bson::Document(doc) => Ok(UpdatePayload::Document(doc)),
        Bson::Array(stages) => Ok(UpdatePayload::Pipeline(into_documents(stages, "The update pipeline")?)),
        _ => Err(NodeError::validation(
            "The update must be a JSON object or an array of pipeline stages",
        )),
    }
}

/// Plain field maps become `{"$set": ...}`; operator documents pass unchanged.
pub fn wrap_in_set(update: Document) -> Document {
    if update.keys().any(|key| key.starts_with('$')) {
        update
    } else {
        doc! { "$set": update }
    }
}

/// Result record for update-style operations.
fn echo(payload: Bson) -> Document {
    match payload {
        Bson::Array(stages) => doc! { "updatePipeline": stages },
        Bson::Document(doc) => doc,
        _ => Document::new(),
    }
}
