use chrono::{DateTime, Utc};
use fxhash::FxHashMap;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::message_response::ResponseBody;
use crate::frame::message_result::{BodyResResultRows, ColSpec, ColTypeOption, ResResultBody};
use crate::frame::{Frame, StreamId};
use crate::types::column_value::ColumnValue;
use crate::types::decimal::Decimal;
use crate::types::CBytes;

// `None` marks a name shared by more than one column
type NameIndex = FxHashMap<String, Option<usize>>;

/// Where the rows of a cursor came from. Kept for diagnostics only; the cursor never holds on to
/// the connection itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowSource {
    pub address: SocketAddr,
    pub stream_id: StreamId,
}

macro_rules! typed_getter {
    ($(#[$meta:meta])* $name:ident -> $t:ty, $requested:literal, { $($pattern:pat => $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        pub fn $name(&self, index: usize) -> Result<Option<$t>> {
            match self.value_at(index)? {
                ColumnValue::Null => Ok(None),
                $($pattern => Ok(Some($value)),)+
                _ => Err(self.incompatible(index, $requested)),
            }
        }
    };
}

/// Forward-only reader over the rows of a single result. Rows are decoded lazily, one at a time,
/// as the cursor advances; once past the last row, the cursor stays exhausted.
///
/// Columns can be addressed by ordinal or by name. Name lookups are resolved once, when the cursor
/// is created. Result sets can legitimately contain several columns with the same name (e.g.
/// `SELECT a, a FROM t`); looking such a name up fails with [`Error::AmbiguousColumn`] and the
/// columns have to be accessed by ordinal.
///
/// A cursor is meant for a single reader and is not shared between tasks.
#[derive(Debug)]
pub struct RowCursor {
    rows: Option<BodyResResultRows>,
    name_index: NameIndex,
    position: u64,
    rows_read: usize,
    current: Option<Vec<CBytes>>,
    exhausted: bool,
    source: Option<RowSource>,
}

impl RowCursor {
    /// A cursor without columns or rows, as returned by statements which produce no rows.
    pub fn empty() -> Self {
        RowCursor {
            rows: None,
            name_index: Default::default(),
            position: 0,
            rows_read: 0,
            current: None,
            exhausted: true,
            source: None,
        }
    }

    pub fn new(rows: BodyResResultRows, source: Option<RowSource>) -> Self {
        let mut name_index = NameIndex::default();
        for (ordinal, spec) in rows.metadata.col_specs.iter().enumerate() {
            name_index
                .entry(spec.name.clone())
                .and_modify(|existing| *existing = None)
                .or_insert(Some(ordinal));
        }

        RowCursor {
            rows: Some(rows),
            name_index,
            position: 0,
            rows_read: 0,
            current: None,
            exhausted: false,
            source,
        }
    }

    /// Creates a cursor out of a RESULT response. Results other than rows give an empty cursor.
    pub fn from_response(frame: &Frame, address: SocketAddr) -> Result<Self> {
        let source = RowSource {
            address,
            stream_id: frame.stream,
        };

        match frame.response_body()? {
            ResponseBody::Result(ResResultBody::Rows(rows)) => Ok(RowCursor::new(rows, Some(source))),
            ResponseBody::Result(_) => Ok(RowCursor {
                source: Some(source),
                ..RowCursor::empty()
            }),
            body => Err(Error::General(format!(
                "Unexpected response to a query: {}",
                body.opcode()
            ))),
        }
    }

    #[inline]
    pub fn source(&self) -> Option<RowSource> {
        self.source
    }

    #[inline]
    fn col_specs(&self) -> &[ColSpec] {
        self.rows
            .as_ref()
            .map(|rows| rows.metadata.col_specs.as_slice())
            .unwrap_or_default()
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.col_specs().len()
    }

    /// Total number of rows in the result.
    #[inline]
    pub fn rows_count(&self) -> usize {
        self.rows
            .as_ref()
            .map(|rows| usize::try_from(rows.rows_count).unwrap_or(0))
            .unwrap_or(0)
    }

    #[inline]
    pub fn has_rows(&self) -> bool {
        self.rows_count() > 0
    }

    /// State needed to fetch the next page, if the server has more rows.
    pub fn paging_state(&self) -> Option<&CBytes> {
        self.rows
            .as_ref()
            .and_then(|rows| rows.metadata.paging_state.as_ref())
    }

    fn col_spec(&self, index: usize) -> Result<&ColSpec> {
        let specs = self.col_specs();
        specs.get(index).ok_or(Error::ColumnIndexOutOfRange {
            index,
            count: specs.len(),
        })
    }

    pub fn column_name(&self, index: usize) -> Result<&str> {
        self.col_spec(index).map(|spec| spec.name.as_str())
    }

    pub fn column_type(&self, index: usize) -> Result<&ColTypeOption> {
        self.col_spec(index).map(|spec| &spec.col_type)
    }

    /// Resolves a column name to its ordinal.
    pub fn ordinal(&self, name: &str) -> Result<usize> {
        match self.name_index.get(name) {
            Some(Some(ordinal)) => Ok(*ordinal),
            Some(None) => Err(Error::AmbiguousColumn(name.into())),
            None => Err(Error::UnknownColumn(name.into())),
        }
    }

    /// Moves to the next row. Returns `false` when there are no more rows, and keeps returning
    /// `false` afterwards.
    pub fn advance(&mut self) -> Result<bool> {
        if self.exhausted || self.rows_read >= self.rows_count() {
            self.close();
            return Ok(false);
        }

        let rows = match &self.rows {
            Some(rows) => rows,
            None => {
                self.close();
                return Ok(false);
            }
        };

        match rows.read_row(&mut self.position) {
            Ok(row) => {
                self.current = Some(row);
                self.rows_read += 1;
                Ok(true)
            }
            Err(error) => {
                self.close();
                Err(error)
            }
        }
    }

    /// Releases the rows. The cursor behaves as exhausted afterwards.
    pub fn close(&mut self) {
        self.exhausted = true;
        self.current = None;
    }

    fn current_cell(&self, index: usize) -> Result<(&ColSpec, &CBytes)> {
        let spec = self.col_spec(index)?;
        let row = self.current.as_ref().ok_or(Error::NoCurrentRow)?;
        row.get(index)
            .map(|cell| (spec, cell))
            .ok_or(Error::ColumnIndexOutOfRange {
                index,
                count: row.len(),
            })
    }

    /// Decodes a cell of the current row.
    pub fn value_at(&self, index: usize) -> Result<ColumnValue> {
        let (spec, cell) = self.current_cell(index)?;
        ColumnValue::decode(&spec.col_type, cell.as_slice())
    }

    pub fn value_by_name(&self, name: &str) -> Result<ColumnValue> {
        self.value_at(self.ordinal(name)?)
    }

    /// Checks if a cell of the current row is null.
    pub fn is_null(&self, index: usize) -> Result<bool> {
        self.value_at(index).map(|value| value.is_null())
    }

    /// Decodes the whole current row.
    pub fn values(&self) -> Result<Vec<ColumnValue>> {
        (0..self.column_count())
            .map(|index| self.value_at(index))
            .collect()
    }

    fn incompatible(&self, index: usize, requested: &'static str) -> Error {
        Error::IncompatibleColumnType {
            column: self
                .column_name(index)
                .map(|name| name.to_string())
                .unwrap_or_default(),
            requested,
        }
    }

    typed_getter!(get_bool -> bool, "bool", {
        ColumnValue::Boolean(value) => value,
    });

    typed_getter!(get_i8 -> i8, "i8", {
        ColumnValue::TinyInt(value) => value,
    });

    typed_getter!(get_i16 -> i16, "i16", {
        ColumnValue::TinyInt(value) => value.into(),
        ColumnValue::SmallInt(value) => value,
    });

    typed_getter!(get_i32 -> i32, "i32", {
        ColumnValue::TinyInt(value) => value.into(),
        ColumnValue::SmallInt(value) => value.into(),
        ColumnValue::Int(value) => value,
    });

    typed_getter!(
        /// Reads bigint and counter columns, and any narrower integer.
        get_i64 -> i64, "i64", {
        ColumnValue::TinyInt(value) => value.into(),
        ColumnValue::SmallInt(value) => value.into(),
        ColumnValue::Int(value) => value.into(),
        ColumnValue::BigInt(value) => value,
    });

    typed_getter!(get_f32 -> f32, "f32", {
        ColumnValue::Float(value) => value,
    });

    typed_getter!(get_f64 -> f64, "f64", {
        ColumnValue::Float(value) => value.into(),
        ColumnValue::Double(value) => value,
    });

    typed_getter!(get_decimal -> Decimal, "decimal", {
        ColumnValue::Decimal(value) => value,
        ColumnValue::Varint(value) => Decimal::new(value, 0),
    });

    typed_getter!(get_string -> String, "string", {
        ColumnValue::Text(value) => value,
    });

    typed_getter!(get_blob -> Vec<u8>, "blob", {
        ColumnValue::Blob(value) => value,
        ColumnValue::Raw(value) => value,
    });

    typed_getter!(get_timestamp -> DateTime<Utc>, "timestamp", {
        ColumnValue::Timestamp(value) => value,
    });

    typed_getter!(
        /// Reads both uuid and timeuuid columns.
        get_uuid -> Uuid, "uuid", {
        ColumnValue::Uuid(value) => value,
    });
}
