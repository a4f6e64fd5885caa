use bitflags::bitflags;
use derive_more::{Constructor, Display};
use std::convert::{TryFrom, TryInto};
use std::io::{Cursor, Read};

use crate::error;
use crate::error::Error;
use crate::frame::{FromBytes, FromCursor, Serialize, Version};
use crate::types::{
    from_cursor_str, serialize_str, try_i32_from_bytes, CBytes, CInt, CIntShort, INT_LEN,
    SHORT_LEN,
};

/// `ResultKind` is enum which represents types of result.
#[derive(Debug, Ord, PartialOrd, Eq, PartialEq, Copy, Clone, Hash, Display)]
pub enum ResultKind {
    /// Void result.
    Void,
    /// Rows result.
    Rows,
    /// Set keyspace result.
    SetKeyspace,
    /// Prepared result.
    Prepared,
    /// Schema change result.
    SchemaChange,
}

impl Serialize for ResultKind {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        CInt::from(*self).serialize(cursor, version);
    }
}

impl FromBytes for ResultKind {
    fn from_bytes(bytes: &[u8]) -> error::Result<ResultKind> {
        try_i32_from_bytes(bytes)
            .map_err(Into::into)
            .and_then(ResultKind::try_from)
    }
}

impl From<ResultKind> for CInt {
    fn from(value: ResultKind) -> Self {
        match value {
            ResultKind::Void => 0x0001,
            ResultKind::Rows => 0x0002,
            ResultKind::SetKeyspace => 0x0003,
            ResultKind::Prepared => 0x0004,
            ResultKind::SchemaChange => 0x0005,
        }
    }
}

impl TryFrom<CInt> for ResultKind {
    type Error = Error;

    fn try_from(value: CInt) -> Result<Self, Self::Error> {
        match value {
            0x0001 => Ok(ResultKind::Void),
            0x0002 => Ok(ResultKind::Rows),
            0x0003 => Ok(ResultKind::SetKeyspace),
            0x0004 => Ok(ResultKind::Prepared),
            0x0005 => Ok(ResultKind::SchemaChange),
            _ => Err(Error::UnexpectedResultKind(value)),
        }
    }
}

impl FromCursor for ResultKind {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> error::Result<ResultKind> {
        let mut buff = [0; INT_LEN];
        cursor.read_exact(&mut buff)?;

        CInt::from_be_bytes(buff).try_into()
    }
}

/// Body of a RESULT response. Prepared and schema change results are not interpreted by the
/// driver and are kept as raw bytes.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum ResResultBody {
    /// Void response body.
    Void,
    /// Rows response body.
    Rows(BodyResResultRows),
    /// Result of a `USE` query, containing the name of the keyspace just set.
    SetKeyspace(BodyResResultSetKeyspace),
    /// Prepared statement result.
    Prepared(Vec<u8>),
    /// Schema change result.
    SchemaChange(Vec<u8>),
}

impl Serialize for ResResultBody {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match self {
            ResResultBody::Void => {
                ResultKind::Void.serialize(cursor, version);
            }
            ResResultBody::Rows(rows) => {
                ResultKind::Rows.serialize(cursor, version);
                rows.serialize(cursor, version);
            }
            ResResultBody::SetKeyspace(set_keyspace) => {
                ResultKind::SetKeyspace.serialize(cursor, version);
                set_keyspace.serialize(cursor, version);
            }
            ResResultBody::Prepared(raw) => {
                ResultKind::Prepared.serialize(cursor, version);
                raw.serialize(cursor, version);
            }
            ResResultBody::SchemaChange(raw) => {
                ResultKind::SchemaChange.serialize(cursor, version);
                raw.serialize(cursor, version);
            }
        }
    }
}

impl ResResultBody {
    pub fn from_cursor(
        cursor: &mut Cursor<&[u8]>,
        version: Version,
    ) -> error::Result<ResResultBody> {
        let result_kind = ResultKind::from_cursor(cursor, version)?;

        Ok(match result_kind {
            ResultKind::Void => ResResultBody::Void,
            ResultKind::Rows => {
                ResResultBody::Rows(BodyResResultRows::from_cursor(cursor, version)?)
            }
            ResultKind::SetKeyspace => {
                ResResultBody::SetKeyspace(BodyResResultSetKeyspace::from_cursor(cursor, version)?)
            }
            ResultKind::Prepared => ResResultBody::Prepared(remaining(cursor)?),
            ResultKind::SchemaChange => ResResultBody::SchemaChange(remaining(cursor)?),
        })
    }

    /// Returns `Some` rows metadata if the result is of type rows and `None` otherwise.
    pub fn as_rows_metadata(&self) -> Option<&RowsMetadata> {
        match self {
            ResResultBody::Rows(rows_body) => Some(&rows_body.metadata),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<BodyResResultRows> {
        match self {
            ResResultBody::Rows(rows_body) => Some(rows_body),
            _ => None,
        }
    }

    pub fn into_set_keyspace(self) -> Option<BodyResResultSetKeyspace> {
        match self {
            ResResultBody::SetKeyspace(set_keyspace) => Some(set_keyspace),
            _ => None,
        }
    }
}

fn remaining(cursor: &mut Cursor<&[u8]>) -> error::Result<Vec<u8>> {
    let mut buffer = vec![];
    cursor.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// It represents set keyspace result body. Body contains keyspace name.
#[derive(Debug, Constructor, PartialEq, Ord, PartialOrd, Eq, Clone, Hash)]
pub struct BodyResResultSetKeyspace {
    /// It contains name of keyspace that was set.
    pub body: String,
}

impl Serialize for BodyResResultSetKeyspace {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str(cursor, &self.body, version);
    }
}

impl FromCursor for BodyResResultSetKeyspace {
    fn from_cursor(
        cursor: &mut Cursor<&[u8]>,
        _version: Version,
    ) -> error::Result<BodyResResultSetKeyspace> {
        from_cursor_str(cursor).map(|x| BodyResResultSetKeyspace::new(x.to_string()))
    }
}

/// Structure that represents result of type
/// [rows](https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec#L533).
///
/// Row contents are kept in their wire form and decoded one row at a time with
/// [`BodyResResultRows::read_row`], so a large result set is never materialized up front.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct BodyResResultRows {
    /// Rows metadata
    pub metadata: RowsMetadata,
    /// Number of rows.
    pub rows_count: CInt,
    /// Encoded rows: `rows_count` rows, each being `columns_count` `[bytes]` values.
    pub rows_content: Vec<u8>,
    /// Protocol version.
    pub protocol_version: Version,
}

impl Serialize for BodyResResultRows {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.metadata.serialize(cursor, version);
        self.rows_count.serialize(cursor, version);
        self.rows_content.serialize(cursor, version);
    }
}

impl FromCursor for BodyResResultRows {
    fn from_cursor(
        cursor: &mut Cursor<&[u8]>,
        version: Version,
    ) -> error::Result<BodyResResultRows> {
        let metadata = RowsMetadata::from_cursor(cursor, version)?;
        let rows_count = CInt::from_cursor(cursor, version)?;
        let rows_content = remaining(cursor)?;

        Ok(BodyResResultRows {
            metadata,
            rows_count,
            rows_content,
            protocol_version: version,
        })
    }
}

impl BodyResResultRows {
    /// Builds a rows body out of already decoded cell values.
    pub fn from_rows(metadata: RowsMetadata, rows: &[Vec<CBytes>], version: Version) -> Self {
        let mut rows_content = vec![];
        let mut cursor = Cursor::new(&mut rows_content);
        rows.iter()
            .flatten()
            .for_each(|cell| cell.serialize(&mut cursor, version));

        BodyResResultRows {
            metadata,
            rows_count: rows.len() as CInt,
            rows_content,
            protocol_version: version,
        }
    }

    /// Decodes the row starting at `position` within `rows_content` and moves `position` past it.
    pub fn read_row(&self, position: &mut u64) -> error::Result<Vec<CBytes>> {
        let mut cursor = Cursor::new(self.rows_content.as_slice());
        cursor.set_position(*position);

        let row = (0..self.metadata.columns_count)
            .map(|_| CBytes::from_cursor(&mut cursor, self.protocol_version))
            .collect::<error::Result<Vec<_>>>()?;

        *position = cursor.position();
        Ok(row)
    }
}

/// Rows metadata.
#[derive(Debug, Clone, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct RowsMetadata {
    /// Flags.
    pub flags: RowsMetadataFlags,
    /// Number of columns.
    pub columns_count: i32,
    /// Paging state.
    pub paging_state: Option<CBytes>,
    /// `Option` that may contain global table space.
    pub global_table_spec: Option<TableSpec>,
    /// List of column specifications.
    pub col_specs: Vec<ColSpec>,
}

impl RowsMetadata {
    /// Creates metadata for columns sharing a single table spec.
    pub fn with_global_table_spec(table_spec: TableSpec, col_specs: Vec<ColSpec>) -> Self {
        RowsMetadata {
            flags: RowsMetadataFlags::GLOBAL_TABLE_SPACE,
            columns_count: col_specs.len() as i32,
            paging_state: None,
            global_table_spec: Some(table_spec),
            col_specs,
        }
    }
}

impl Serialize for RowsMetadata {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        let mut flags = self.flags;
        flags.set(RowsMetadataFlags::HAS_MORE_PAGES, self.paging_state.is_some());
        flags.set(
            RowsMetadataFlags::GLOBAL_TABLE_SPACE,
            self.global_table_spec.is_some(),
        );

        flags.serialize(cursor, version);
        self.columns_count.serialize(cursor, version);

        if let Some(paging_state) = &self.paging_state {
            paging_state.serialize(cursor, version);
        }

        if flags.contains(RowsMetadataFlags::NO_METADATA) {
            return;
        }

        if let Some(global_table_spec) = &self.global_table_spec {
            global_table_spec.serialize(cursor, version);
        }

        self.col_specs
            .iter()
            .for_each(|x| x.serialize(cursor, version));
    }
}

impl FromCursor for RowsMetadata {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> error::Result<RowsMetadata> {
        let flags = RowsMetadataFlags::from_bits_truncate(CInt::from_cursor(cursor, version)?);
        let columns_count = CInt::from_cursor(cursor, version)?;

        let paging_state = if flags.contains(RowsMetadataFlags::HAS_MORE_PAGES) {
            Some(CBytes::from_cursor(cursor, version)?)
        } else {
            None
        };

        if flags.contains(RowsMetadataFlags::NO_METADATA) {
            return Ok(RowsMetadata {
                flags,
                columns_count,
                paging_state,
                global_table_spec: None,
                col_specs: vec![],
            });
        }

        let has_global_table_space = flags.contains(RowsMetadataFlags::GLOBAL_TABLE_SPACE);
        let global_table_spec = if has_global_table_space {
            Some(TableSpec::from_cursor(cursor, version)?)
        } else {
            None
        };

        let col_specs =
            ColSpec::parse_colspecs(cursor, columns_count, has_global_table_space, version)?;

        Ok(RowsMetadata {
            flags,
            columns_count,
            paging_state,
            global_table_spec,
            col_specs,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct RowsMetadataFlags: i32 {
        const GLOBAL_TABLE_SPACE = 0x0001;
        const HAS_MORE_PAGES = 0x0002;
        const NO_METADATA = 0x0004;
    }
}

impl Serialize for RowsMetadataFlags {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.bits().serialize(cursor, version)
    }
}

/// Table specification.
#[derive(Debug, Clone, PartialEq, Ord, PartialOrd, Eq, Hash, Constructor)]
pub struct TableSpec {
    pub ks_name: String,
    pub table_name: String,
}

impl Serialize for TableSpec {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str(cursor, &self.ks_name, version);
        serialize_str(cursor, &self.table_name, version);
    }
}

impl FromCursor for TableSpec {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> error::Result<Self> {
        let ks_name = from_cursor_str(cursor)?.to_string();
        let table_name = from_cursor_str(cursor)?.to_string();
        Ok(TableSpec {
            ks_name,
            table_name,
        })
    }
}

/// Single column specification.
#[derive(Debug, Clone, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct ColSpec {
    /// Only present if the global table spec flag is not set.
    pub table_spec: Option<TableSpec>,
    /// Column name
    pub name: String,
    /// Column type
    pub col_type: ColTypeOption,
}

impl ColSpec {
    /// Creates a column spec of a simple (non-parametrized) type.
    pub fn simple(name: impl Into<String>, id: ColType) -> Self {
        ColSpec {
            table_spec: None,
            name: name.into(),
            col_type: ColTypeOption { id, value: None },
        }
    }

    pub fn parse_colspecs(
        cursor: &mut Cursor<&[u8]>,
        column_count: i32,
        has_global_table_space: bool,
        version: Version,
    ) -> error::Result<Vec<ColSpec>> {
        (0..column_count)
            .map(|_| {
                let table_spec = if !has_global_table_space {
                    Some(TableSpec::from_cursor(cursor, version)?)
                } else {
                    None
                };

                let name = from_cursor_str(cursor)?.to_string();
                let col_type = ColTypeOption::from_cursor(cursor, version)?;

                Ok(ColSpec {
                    table_spec,
                    name,
                    col_type,
                })
            })
            .collect::<Result<_, _>>()
    }
}

impl Serialize for ColSpec {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        if let Some(table_spec) = &self.table_spec {
            table_spec.serialize(cursor, version);
        }

        serialize_str(cursor, &self.name, version);
        self.col_type.serialize(cursor, version);
    }
}

/// Data types which could be returned by a server.
#[derive(Debug, Clone, Display, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum ColType {
    Custom,
    Ascii,
    Bigint,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Int,
    Timestamp,
    Uuid,
    Varchar,
    Varint,
    Timeuuid,
    Inet,
    Date,
    Time,
    Smallint,
    Tinyint,
    Duration,
    List,
    Map,
    Set,
    Udt,
    Tuple,
}

impl TryFrom<CIntShort> for ColType {
    type Error = Error;

    fn try_from(value: CIntShort) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(ColType::Custom),
            0x0001 => Ok(ColType::Ascii),
            0x0002 => Ok(ColType::Bigint),
            0x0003 => Ok(ColType::Blob),
            0x0004 => Ok(ColType::Boolean),
            0x0005 => Ok(ColType::Counter),
            0x0006 => Ok(ColType::Decimal),
            0x0007 => Ok(ColType::Double),
            0x0008 => Ok(ColType::Float),
            0x0009 => Ok(ColType::Int),
            0x000B => Ok(ColType::Timestamp),
            0x000C => Ok(ColType::Uuid),
            0x000D => Ok(ColType::Varchar),
            0x000E => Ok(ColType::Varint),
            0x000F => Ok(ColType::Timeuuid),
            0x0010 => Ok(ColType::Inet),
            0x0011 => Ok(ColType::Date),
            0x0012 => Ok(ColType::Time),
            0x0013 => Ok(ColType::Smallint),
            0x0014 => Ok(ColType::Tinyint),
            0x0015 => Ok(ColType::Duration),
            0x0020 => Ok(ColType::List),
            0x0021 => Ok(ColType::Map),
            0x0022 => Ok(ColType::Set),
            0x0030 => Ok(ColType::Udt),
            0x0031 => Ok(ColType::Tuple),
            _ => Err(Error::UnexpectedColumnType(value)),
        }
    }
}

impl From<ColType> for CIntShort {
    fn from(value: ColType) -> Self {
        match value {
            ColType::Custom => 0x0000,
            ColType::Ascii => 0x0001,
            ColType::Bigint => 0x0002,
            ColType::Blob => 0x0003,
            ColType::Boolean => 0x0004,
            ColType::Counter => 0x0005,
            ColType::Decimal => 0x0006,
            ColType::Double => 0x0007,
            ColType::Float => 0x0008,
            ColType::Int => 0x0009,
            ColType::Timestamp => 0x000B,
            ColType::Uuid => 0x000C,
            ColType::Varchar => 0x000D,
            ColType::Varint => 0x000E,
            ColType::Timeuuid => 0x000F,
            ColType::Inet => 0x0010,
            ColType::Date => 0x0011,
            ColType::Time => 0x0012,
            ColType::Smallint => 0x0013,
            ColType::Tinyint => 0x0014,
            ColType::Duration => 0x0015,
            ColType::List => 0x0020,
            ColType::Map => 0x0021,
            ColType::Set => 0x0022,
            ColType::Udt => 0x0030,
            ColType::Tuple => 0x0031,
        }
    }
}

impl Serialize for ColType {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        CIntShort::from(*self).serialize(cursor, version);
    }
}

impl FromCursor for ColType {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> error::Result<ColType> {
        let mut buff = [0; SHORT_LEN];
        cursor.read_exact(&mut buff)?;

        CIntShort::from_be_bytes(buff).try_into()
    }
}

/// Option that represents a column type, together with the parameters of parametrized types.
#[derive(Debug, Clone, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct ColTypeOption {
    /// Id refers to `ColType`.
    pub id: ColType,
    /// Values depending on column type.
    pub value: Option<ColTypeOptionValue>,
}

impl Serialize for ColTypeOption {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.id.serialize(cursor, version);
        if let Some(value) = &self.value {
            value.serialize(cursor, version);
        }
    }
}

impl FromCursor for ColTypeOption {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> error::Result<ColTypeOption> {
        let id = ColType::from_cursor(cursor, version)?;
        let value = match id {
            ColType::Custom => Some(ColTypeOptionValue::CString(
                from_cursor_str(cursor)?.to_string(),
            )),
            ColType::Set => Some(ColTypeOptionValue::CSet(Box::new(
                ColTypeOption::from_cursor(cursor, version)?,
            ))),
            ColType::List => Some(ColTypeOptionValue::CList(Box::new(
                ColTypeOption::from_cursor(cursor, version)?,
            ))),
            ColType::Map => {
                let key_type = ColTypeOption::from_cursor(cursor, version)?;
                let value_type = ColTypeOption::from_cursor(cursor, version)?;
                Some(ColTypeOptionValue::CMap(
                    Box::new(key_type),
                    Box::new(value_type),
                ))
            }
            ColType::Udt => Some(ColTypeOptionValue::UdtType(CUdt::from_cursor(
                cursor, version,
            )?)),
            ColType::Tuple => Some(ColTypeOptionValue::TupleType(CTuple::from_cursor(
                cursor, version,
            )?)),
            _ => None,
        };

        Ok(ColTypeOption { id, value })
    }
}

/// Parameters of parametrized column types.
#[derive(Debug, Clone, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub enum ColTypeOptionValue {
    CString(String),
    CSet(Box<ColTypeOption>),
    CList(Box<ColTypeOption>),
    CMap(Box<ColTypeOption>, Box<ColTypeOption>),
    UdtType(CUdt),
    TupleType(CTuple),
}

impl Serialize for ColTypeOptionValue {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match self {
            Self::CString(c) => serialize_str(cursor, c, version),
            Self::CSet(c) | Self::CList(c) => c.serialize(cursor, version),
            Self::CMap(k, v) => {
                k.serialize(cursor, version);
                v.serialize(cursor, version);
            }
            Self::UdtType(udt) => udt.serialize(cursor, version),
            Self::TupleType(tuple) => tuple.serialize(cursor, version),
        }
    }
}

/// User defined type.
#[derive(Debug, Clone, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct CUdt {
    pub ks: String,
    pub udt_name: String,
    pub descriptions: Vec<(String, ColTypeOption)>,
}

impl Serialize for CUdt {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str(cursor, &self.ks, version);
        serialize_str(cursor, &self.udt_name, version);
        (self.descriptions.len() as CIntShort).serialize(cursor, version);
        self.descriptions.iter().for_each(|(name, col_type)| {
            serialize_str(cursor, name, version);
            col_type.serialize(cursor, version);
        });
    }
}

impl FromCursor for CUdt {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> error::Result<CUdt> {
        let ks = from_cursor_str(cursor)?.to_string();
        let udt_name = from_cursor_str(cursor)?.to_string();

        let n = CIntShort::from_cursor(cursor, version)?;
        let descriptions = (0..n.max(0))
            .map(|_| {
                let name = from_cursor_str(cursor)?.to_string();
                let col_type = ColTypeOption::from_cursor(cursor, version)?;
                Ok((name, col_type))
            })
            .collect::<error::Result<_>>()?;

        Ok(CUdt {
            ks,
            udt_name,
            descriptions,
        })
    }
}

/// Tuple type.
#[derive(Debug, Clone, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct CTuple {
    pub types: Vec<ColTypeOption>,
}

impl Serialize for CTuple {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        (self.types.len() as CIntShort).serialize(cursor, version);
        self.types.iter().for_each(|t| t.serialize(cursor, version));
    }
}

impl FromCursor for CTuple {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> error::Result<CTuple> {
        let n = CIntShort::from_cursor(cursor, version)?;
        let types = (0..n.max(0))
            .map(|_| ColTypeOption::from_cursor(cursor, version))
            .collect::<error::Result<_>>()?;

        Ok(CTuple { types })
    }
}

#[cfg(test)]
fn test_encode_decode(bytes: &[u8], expected: ResResultBody) {
    {
        let mut cursor: Cursor<&[u8]> = Cursor::new(bytes);
        let result = ResResultBody::from_cursor(&mut cursor, Version::V4).unwrap();
        assert_eq!(expected, result);
    }

    {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        expected.serialize(&mut cursor, Version::V4);
        assert_eq!(buffer, bytes);
    }
}
