//! Arrow schemas of the persisted island tables.
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

/// Key/value table holding active pointers and per-build metadata.
pub const META_TABLE: &str = "meta";

fn vector_field(dim: i32) -> Field {
	Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true)
}

/// One row per chunk, `position` preserving the artifact's row order.
pub fn build_chunks_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("position", DataType::Int32, false),
		Field::new("chunk_id", DataType::Utf8, false),
		Field::new("source_document_id", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("start_offset", DataType::Int64, false),
		Field::new("length", DataType::Int64, false),
		Field::new("list_id", DataType::Int32, false),
		vector_field(dim),
	]))
}

/// IVF centroids, one row per inverted list.
pub fn build_centroids_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("position", DataType::Int32, false),
		vector_field(dim),
	]))
}

pub fn build_meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}
