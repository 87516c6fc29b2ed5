//! Data file encoding.
//!
//! Datasets are stored as parquet through arrow record batches. JSON is kept
//! for small fixtures and for deployments that set `data_extension = "json"`.
//! The codec is picked from the file extension.
//!
//! Each column is written with the narrowest arrow type holding all its
//! values: boolean, int64, float64 (ints and floats mixed), or utf8 for text
//! and anything mixed. Categorical levels ride along in the field metadata.
//! Reading accepts any arrow type; dictionary columns come back categorical
//! and unknown types are cast to text.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use tracing::debug;
use utd_core::error::{Result, TableError, UtdError};
use utd_core::naming::PathParts;
use utd_core::table::{Categories, Column, Table};
use utd_core::value::Value;

/// Field metadata entry carrying a categorical column's levels as JSON.
pub const CATEGORIES_METADATA_KEY: &str = "utd:categories";

/// First bytes of every parquet file.
pub const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Parquet,
    Json,
}

impl DataFormat {
    /// Codec for a data file path.
    ///
    /// # Errors
    ///
    /// Returns [`UtdError::Validation`] for an extension other than
    /// `parquet` or `json`.
    pub fn for_path(path: &str) -> Result<Self> {
        match PathParts::split(path).extension {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => Ok(Self::Parquet),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            other => Err(UtdError::Validation(format!(
                "unsupported data file extension '{}' in {path}; expected parquet or json",
                other.unwrap_or_default()
            ))),
        }
    }
}

fn codec_error(err: impl fmt::Display) -> UtdError {
    UtdError::Serialization(err.to_string())
}

/// Encode `table` for the file at `path`.
pub fn encode_table(table: &Table, path: &str) -> Result<Vec<u8>> {
    match DataFormat::for_path(path)? {
        DataFormat::Parquet => write_parquet(table),
        DataFormat::Json => Ok(serde_json::to_vec(table)?),
    }
}

/// Decode the contents of the file at `path`.
pub fn decode_table(bytes: Vec<u8>, path: &str) -> Result<Table> {
    let table = match DataFormat::for_path(path)? {
        DataFormat::Parquet => read_parquet(bytes)?,
        DataFormat::Json => serde_json::from_slice(&bytes)?,
    };
    table.validate()?;
    Ok(table)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Empty,
    Bool,
    Int,
    Float,
    Text,
}

fn kind_of(values: &[Value]) -> Kind {
    values.iter().fold(Kind::Empty, |kind, value| {
        let this = match value {
            Value::Null => return kind,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Str(_) => Kind::Text,
        };
        match (kind, this) {
            (Kind::Empty, t) => t,
            (k, t) if k == t => k,
            (Kind::Int, Kind::Float) | (Kind::Float, Kind::Int) => Kind::Float,
            _ => Kind::Text,
        }
    })
}

fn to_array(values: &[Value]) -> (DataType, ArrayRef) {
    match kind_of(values) {
        Kind::Bool => {
            let cells: Vec<Option<bool>> = values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            (DataType::Boolean, Arc::new(BooleanArray::from(cells)))
        }
        Kind::Int => {
            let cells: Vec<Option<i64>> = values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect();
            (DataType::Int64, Arc::new(Int64Array::from(cells)))
        }
        Kind::Float => {
            let cells: Vec<Option<f64>> = values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i as f64),
                    Value::Float(f) => Some(*f),
                    _ => None,
                })
                .collect();
            (DataType::Float64, Arc::new(Float64Array::from(cells)))
        }
        Kind::Text | Kind::Empty => {
            let cells: Vec<Option<String>> = values
                .iter()
                .map(|v| (!matches!(v, Value::Null)).then(|| v.to_text()))
                .collect();
            (DataType::Utf8, Arc::new(StringArray::from(cells)))
        }
    }
}

/// Arrow record batch holding every column of `table`.
///
/// # Errors
///
/// Returns [`UtdError::Serialization`] if arrow rejects the batch.
pub fn to_record_batch(table: &Table) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.n_cols());
    let mut arrays = Vec::with_capacity(table.n_cols());
    for column in table.columns() {
        let (data_type, array) = to_array(&column.values);
        let mut field = Field::new(column.name.as_str(), data_type, true);
        if let Some(categories) = &column.categories {
            let levels = serde_json::to_string(categories)?;
            field = field.with_metadata(HashMap::from([(
                CATEGORIES_METADATA_KEY.to_string(),
                levels,
            )]));
        }
        fields.push(field);
        arrays.push(array);
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(codec_error)
}

fn write_parquet(table: &Table) -> Result<Vec<u8>> {
    if table.n_cols() == 0 {
        return Err(UtdError::Validation(
            "a table without columns cannot be written as parquet".to_string(),
        ));
    }
    let batch = to_record_batch(table)?;
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None).map_err(codec_error)?;
    writer.write(&batch).map_err(codec_error)?;
    writer.close().map_err(codec_error)?;
    debug!(rows = table.n_rows(), bytes = buf.len(), "encoded parquet");
    Ok(buf)
}

fn read_parquet(bytes: Vec<u8>) -> Result<Table> {
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes)).map_err(codec_error)?;
    let schema = Arc::clone(builder.schema());
    let reader = builder.build().map_err(codec_error)?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(codec_error)?;
    let batch = concat_batches(&schema, &batches).map_err(codec_error)?;
    from_record_batch(&batch)
}

/// Table holding every column of `batch`.
///
/// # Errors
///
/// Returns [`UtdError::Serialization`] for a column arrow cannot convert, and
/// the table error for duplicate names or invalid categorical levels.
pub fn from_record_batch(batch: &RecordBatch) -> Result<Table> {
    let mut table = Table::new();
    for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
        let values = to_values(array)?;
        let stored: Option<Categories> = field
            .metadata()
            .get(CATEGORIES_METADATA_KEY)
            .map(|levels| serde_json::from_str(levels))
            .transpose()?;
        let categories = match (stored, array.as_any_dictionary_opt()) {
            (Some(categories), _) => Some(categories),
            (None, Some(dictionary)) => Some(Categories {
                levels: to_values(dictionary.values())?,
                ordered: false,
            }),
            (None, None) => None,
        };
        if table.has_column(field.name()) {
            return Err(TableError::DuplicateColumn(field.name().clone()).into());
        }
        let column = Column::new(field.name().as_str(), values);
        table.put_column(match categories {
            Some(c) => column.into_categorical(c.levels, c.ordered)?,
            None => column,
        })?;
    }
    Ok(table)
}

fn to_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let missing = || {
        codec_error(format!(
            "cannot read arrow column of type {}",
            array.data_type()
        ))
    };
    match array.data_type() {
        DataType::Null => Ok(vec![Value::Null; array.len()]),
        DataType::Boolean => {
            let cells = array.as_boolean_opt().ok_or_else(missing)?;
            Ok(cells.iter().map(Value::from).collect())
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let widened = cast(array.as_ref(), &DataType::Int64).map_err(codec_error)?;
            let cells = widened.as_primitive_opt::<Int64Type>().ok_or_else(missing)?;
            Ok(cells.iter().map(Value::from).collect())
        }
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(..)
        | DataType::Decimal256(..) => {
            let widened = cast(array.as_ref(), &DataType::Float64).map_err(codec_error)?;
            let cells = widened.as_primitive_opt::<Float64Type>().ok_or_else(missing)?;
            Ok(cells.iter().map(Value::from).collect())
        }
        DataType::Dictionary(_, value_type) => {
            let plain = cast(array.as_ref(), value_type).map_err(codec_error)?;
            to_values(&plain)
        }
        _ => {
            let text = cast(array.as_ref(), &DataType::Utf8).map_err(codec_error)?;
            let cells = text.as_string_opt::<i32>().ok_or_else(missing)?;
            Ok(cells.iter().map(|s| Value::from(s.map(str::to_string))).collect())
        }
    }
}
