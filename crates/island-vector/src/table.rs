//! LanceDB connection and housekeeping helpers.
//!
//! Opens the database, creates tables, and maintains the key/value meta table
//! used for active-island pointers and build metadata.
use anyhow::{anyhow, Result};
use lancedb::{connect, Connection};

use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use std::sync::Arc;
use chrono::Utc;
use lancedb::query::{QueryBase, ExecutableQuery};

use crate::schema::build_meta_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

/// Create `name` from a single batch. Fails if the table already exists.
pub async fn create_table_from_batch(conn: &Connection, name: &str, batch: RecordBatch) -> Result<()> {
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    conn.create_table(name, reader).execute().await?;
    Ok(())
}

/// Read every row of `name`.
pub async fn read_all(conn: &Connection, name: &str) -> Result<Vec<RecordBatch>> {
    let t = conn.open_table(name).execute().await?;
    let rows = t.count_rows(None).await?;
    let mut stream = t.query().limit(rows.max(1)).execute().await?;
    let mut batches = Vec::new();
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        batches.push(batch);
    }
    Ok(batches)
}

pub async fn ensure_meta_table(conn: &Connection, name: &str) -> Result<()> {
    ensure_table(conn, name, build_meta_schema()).await
}

pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
    ensure_meta_table(conn, table).await?;
    let t = conn.open_table(table).execute().await?;
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    // Upsert behavior via merge_insert: key is unique
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    let _ = mi.execute(reader).await?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, table).await? { return Ok(None); }
    let t = conn.open_table(table).execute().await?;
    let mut stream = t.query().only_if(format!("key = '{}'", key.replace('\'', "''"))).execute().await?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        if batch.num_rows() == 0 { continue; }
        let val = batch.column_by_name("value").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("meta.value column missing"))?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}

/// All `(key, value)` pairs whose key starts with `prefix`, sorted by key.
pub async fn list_meta(conn: &Connection, table: &str, prefix: &str) -> Result<Vec<(String, String)>> {
    if !table_exists(conn, table).await? { return Ok(Vec::new()); }
    let mut out = Vec::new();
    for batch in read_all(conn, table).await? {
        let keys = batch.column_by_name("key").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("meta.key column missing"))?;
        let vals = batch.column_by_name("value").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("meta.value column missing"))?;
        for i in 0..batch.num_rows() {
            if keys.value(i).starts_with(prefix) {
                out.push((keys.value(i).to_string(), vals.value(i).to_string()));
            }
        }
    }
    out.sort();
    Ok(out)
}
