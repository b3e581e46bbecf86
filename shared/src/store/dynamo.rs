use super::{Collection, Document, DocumentStore, Filter, FindOptions, StoreError, OWNER_FIELD};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Delete, Put, ReturnValue, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::{Number, Value};
use std::collections::HashMap;

type Item = HashMap<String, AttributeValue>;

/// Sort key of the one-per-user profile document.
const PROFILE_SK: &str = "PROFILE";

/// Sort key of the per-owner document counter kept beside capped collections.
const COUNT_SK: &str = "COUNT";
const COUNT_ATTR: &str = "itemCount";

/// Local secondary index over `(PK, timestamp)`.
pub const TIMESTAMP_INDEX: &str = "timestamp-index";
const TIMESTAMP_FIELD: &str = "timestamp";

/// Single-table DynamoDB store.
///
/// Layout: `PK = {COLLECTION}#{userId}`, `SK = <document id>` (or `PROFILE`
/// for the users collection). Every read and write is addressed through the
/// owner's partition. Guardian partitions also hold a `COUNT` item that
/// capped inserts and deletes keep in step with the documents.
///
/// Newest-first reads by `timestamp` go through [`TIMESTAMP_INDEX`], which
/// the table must define as a local secondary index.
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn query_partition(&self, pk: &str) -> Result<Vec<Item>, StoreError> {
        let mut items = Vec::new();
        let mut start_key = None;

        loop {
            let result = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk")
                .expression_attribute_values(":pk", AttributeValue::S(pk.to_string()))
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(backend)?;

            items.extend(result.items().iter().cloned());

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(items)
    }

    /// The `limit` most recent items of the partition, read from the timestamp index.
    async fn query_newest(&self, pk: &str, limit: usize) -> Result<Vec<Item>, StoreError> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(TIMESTAMP_INDEX)
            .key_condition_expression("PK = :pk")
            .expression_attribute_values(":pk", AttributeValue::S(pk.to_string()))
            .scan_index_forward(false)
            .limit(i32::try_from(limit).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(backend)?;

        Ok(result.items().to_vec())
    }

    /// Sort keys of the documents in the owner's partition matching `filter`.
    async fn matching_sort_keys(
        &self,
        collection: Collection,
        pk: &str,
        filter: &Filter,
    ) -> Result<Vec<String>, StoreError> {
        if let Some(sk) = sort_key_from_filter(collection, filter) {
            return Ok(vec![sk]);
        }

        let items = self.query_partition(pk).await?;
        Ok(items
            .iter()
            .filter(|item| filter.matches(&item_to_document(item)))
            .filter_map(|item| item.get("SK").and_then(|v| v.as_s().ok()).cloned())
            .collect())
    }
}

fn backend<E: std::error::Error>(e: E) -> StoreError {
    StoreError::Backend(DisplayErrorContext(&e).to_string())
}

fn owner<'a>(collection: Collection, filter: &'a Filter) -> Result<&'a str, StoreError> {
    filter
        .owner_id()
        .ok_or(StoreError::MissingOwner(collection.name()))
}

fn partition_key(collection: Collection, user_id: &str) -> String {
    format!("{}#{}", collection.name().to_uppercase(), user_id)
}

/// Collections whose partitions carry a `COUNT` item.
fn keeps_count(collection: Collection) -> bool {
    matches!(collection, Collection::Guardians)
}

/// Partition and sort key of a document about to be written.
fn document_keys(collection: Collection, doc: &Document) -> Result<(String, String), StoreError> {
    let user_id = doc
        .get(OWNER_FIELD)
        .and_then(Value::as_str)
        .ok_or(StoreError::MissingField(collection.name(), OWNER_FIELD))?;
    let sk = match collection.id_field() {
        Some(field) => doc
            .get(field)
            .and_then(Value::as_str)
            .ok_or(StoreError::MissingField(collection.name(), field))?
            .to_string(),
        None => PROFILE_SK.to_string(),
    };
    Ok((partition_key(collection, user_id), sk))
}

fn document_item(pk: String, sk: String, doc: &Document) -> Item {
    let mut item: Item = doc
        .iter()
        .map(|(key, value)| (key.clone(), to_attribute(value)))
        .collect();
    item.insert("PK".to_string(), AttributeValue::S(pk));
    item.insert("SK".to_string(), AttributeValue::S(sk));
    item
}

/// Index of the first transaction item whose condition failed.
fn failed_condition(err: Option<&TransactWriteItemsError>) -> Option<usize> {
    match err? {
        TransactWriteItemsError::TransactionCanceledException(cancelled) => cancelled
            .cancellation_reasons()
            .iter()
            .position(|reason| reason.code() == Some("ConditionalCheckFailed")),
        _ => None,
    }
}

/// Page size for a newest-first read that the timestamp index can serve.
fn newest_first_limit(collection: Collection, filter: &Filter, options: &FindOptions) -> Option<usize> {
    if options.sort_desc != Some(TIMESTAMP_FIELD) || !extra_conditions(collection, filter).is_empty() {
        return None;
    }
    options.limit
}

fn sort_key_from_filter(collection: Collection, filter: &Filter) -> Option<String> {
    match collection.id_field() {
        None => Some(PROFILE_SK.to_string()),
        Some(field) => filter.get(field).and_then(Value::as_str).map(str::to_string),
    }
}

/// Filter conditions not already encoded in the key.
fn extra_conditions(collection: Collection, filter: &Filter) -> Vec<(String, Value)> {
    filter
        .conditions()
        .filter(|(field, _)| *field != OWNER_FIELD && Some(*field) != collection.id_field())
        .map(|(field, value)| (field.to_string(), value.clone()))
        .collect()
}

pub(crate) fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

pub(crate) fn from_attribute(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => n
            .parse::<i64>()
            .map(Value::from)
            .ok()
            .or_else(|| {
                n.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            })
            .unwrap_or(Value::Null),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::L(values) => Value::Array(values.iter().map(from_attribute).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attribute(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn item_to_document(item: &Item) -> Document {
    item.iter()
        .filter(|(k, _)| k.as_str() != "PK" && k.as_str() != "SK")
        .map(|(k, v)| (k.clone(), from_attribute(v)))
        .collect()
}

#[async_trait]
impl DocumentStore for DynamoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map(|_| ())
            .map_err(backend)
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let pk = partition_key(collection, owner(collection, filter)?);

        let items = match sort_key_from_filter(collection, filter) {
            Some(sk) => {
                let result = self
                    .client
                    .get_item()
                    .table_name(&self.table_name)
                    .key("PK", AttributeValue::S(pk))
                    .key("SK", AttributeValue::S(sk))
                    .send()
                    .await
                    .map_err(backend)?;
                result.item().cloned().into_iter().collect()
            }
            None => match newest_first_limit(collection, filter, &options) {
                Some(limit) => self.query_newest(&pk, limit).await?,
                None => self.query_partition(&pk).await?,
            },
        };

        let docs = items
            .iter()
            .map(item_to_document)
            .filter(|doc| filter.matches(doc))
            .collect();
        Ok(options.apply(docs))
    }

    async fn insert(&self, collection: Collection, doc: Document) -> Result<(), StoreError> {
        let (pk, sk) = document_keys(collection, &doc)?;

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(document_item(pk, sk, &doc)))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Err(StoreError::Duplicate(collection.name()))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn insert_capped(
        &self,
        collection: Collection,
        doc: Document,
        max: u64,
    ) -> Result<(), StoreError> {
        let (pk, sk) = document_keys(collection, &doc)?;

        let counter = Update::builder()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(COUNT_SK.to_string()))
            .update_expression("ADD #n :one")
            .condition_expression("attribute_not_exists(#n) OR #n < :max")
            .expression_attribute_names("#n", COUNT_ATTR)
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":max", AttributeValue::N(max.to_string()))
            .build()
            .map_err(backend)?;
        let put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(document_item(pk, sk, &doc)))
            .condition_expression("attribute_not_exists(PK)")
            .build()
            .map_err(backend)?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().update(counter).build())
            .transact_items(TransactWriteItem::builder().put(put).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match failed_condition(e.as_service_error()) {
                Some(0) => Err(StoreError::LimitReached(collection.name())),
                Some(_) => Err(StoreError::Duplicate(collection.name())),
                None => Err(backend(e)),
            },
        }
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        fields: Document,
        upsert: bool,
    ) -> Result<u64, StoreError> {
        let pk = partition_key(collection, owner(collection, filter)?);

        let mut fields = fields;
        if upsert {
            for (field, value) in filter.conditions() {
                fields.entry(field.to_string()).or_insert_with(|| value.clone());
            }
        }
        if fields.is_empty() {
            return self.count(collection, filter).await;
        }
        let extra = extra_conditions(collection, filter);

        let mut matched = 0;
        for sk in self.matching_sort_keys(collection, &pk, filter).await? {
            let mut set_clauses = Vec::new();
            let mut request = self
                .client
                .update_item()
                .table_name(&self.table_name)
                .key("PK", AttributeValue::S(pk.clone()))
                .key("SK", AttributeValue::S(sk))
                .return_values(ReturnValue::AllOld);

            for (i, (key, value)) in fields.iter().enumerate() {
                set_clauses.push(format!("#f{i} = :f{i}"));
                request = request
                    .expression_attribute_names(format!("#f{i}"), key)
                    .expression_attribute_values(format!(":f{i}"), to_attribute(value));
            }
            request = request.update_expression(format!("SET {}", set_clauses.join(", ")));

            if !upsert {
                let mut conditions = vec!["attribute_exists(PK)".to_string()];
                for (i, (field, value)) in extra.iter().enumerate() {
                    conditions.push(format!("#c{i} = :c{i}"));
                    request = request
                        .expression_attribute_names(format!("#c{i}"), field)
                        .expression_attribute_values(format!(":c{i}"), to_attribute(value));
                }
                request = request.condition_expression(conditions.join(" AND "));
            }

            match request.send().await {
                Ok(output) => {
                    if output.attributes().is_some_and(|old| !old.is_empty()) {
                        matched += 1;
                    }
                }
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_conditional_check_failed_exception()) => {}
                Err(e) => return Err(backend(e)),
            }
        }

        Ok(matched)
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        let pk = partition_key(collection, owner(collection, filter)?);

        let mut conditions = vec!["attribute_exists(PK)".to_string()];
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        for (i, (field, value)) in extra_conditions(collection, filter).iter().enumerate() {
            conditions.push(format!("#c{i} = :c{i}"));
            names.insert(format!("#c{i}"), field.clone());
            values.insert(format!(":c{i}"), to_attribute(value));
        }
        let condition = conditions.join(" AND ");
        let names = (!names.is_empty()).then_some(names);
        let values = (!values.is_empty()).then_some(values);

        let mut deleted = 0;
        for sk in self.matching_sort_keys(collection, &pk, filter).await? {
            if !keeps_count(collection) {
                let result = self
                    .client
                    .delete_item()
                    .table_name(&self.table_name)
                    .key("PK", AttributeValue::S(pk.clone()))
                    .key("SK", AttributeValue::S(sk))
                    .condition_expression(&condition)
                    .set_expression_attribute_names(names.clone())
                    .set_expression_attribute_values(values.clone())
                    .send()
                    .await;

                match result {
                    Ok(_) => deleted += 1,
                    Err(e)
                        if e.as_service_error()
                            .is_some_and(|se| se.is_conditional_check_failed_exception()) => {}
                    Err(e) => return Err(backend(e)),
                }
                continue;
            }

            let delete = Delete::builder()
                .table_name(&self.table_name)
                .key("PK", AttributeValue::S(pk.clone()))
                .key("SK", AttributeValue::S(sk))
                .condition_expression(&condition)
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(values.clone())
                .build()
                .map_err(backend)?;
            let counter = Update::builder()
                .table_name(&self.table_name)
                .key("PK", AttributeValue::S(pk.clone()))
                .key("SK", AttributeValue::S(COUNT_SK.to_string()))
                .update_expression("ADD #n :minus_one")
                .expression_attribute_names("#n", COUNT_ATTR)
                .expression_attribute_values(":minus_one", AttributeValue::N("-1".to_string()))
                .build()
                .map_err(backend)?;

            let result = self
                .client
                .transact_write_items()
                .transact_items(TransactWriteItem::builder().delete(delete).build())
                .transact_items(TransactWriteItem::builder().update(counter).build())
                .send()
                .await;

            match result {
                Ok(_) => deleted += 1,
                Err(e) if failed_condition(e.as_service_error()) == Some(0) => {}
                Err(e) => return Err(backend(e)),
            }
        }

        Ok(deleted)
    }
}
