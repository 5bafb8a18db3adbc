//! Log entry message.
//!
//! ## Wire Format
//!
//! ```text
//! delimited := varint(body_len) body
//! body      := varint(id) u8(type) string(table)
//!              u8(has_schema) [varint(schema_len) schema]
//!              { varint(record_len) record }*
//! schema    := varint(count) { string(name) u8(column_type) }*
//! record    := varint(count) { value }*
//! ```
//!
//! Records run until the body is exhausted, so a record's framing overhead
//! is exactly its length prefix.

use crate::decoder::Decoder;
use crate::encoder::{delimited_len, varint_len, Encoder};
use crate::error::{CodecError, CodecResult};
use crate::value::{ColumnType, Value};

/// Kind of mutation an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// Rows were inserted or updated.
    Update = 1,
    /// Rows were deleted.
    Delete = 2,
    /// The table was emptied.
    Truncate = 3,
}

impl EntryType {
    /// Converts a wire code to an entry type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Update),
            2 => Some(Self::Delete),
            3 => Some(Self::Truncate),
            _ => None,
        }
    }

    /// Converts the entry type to its wire code.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A named, typed table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub column_type: ColumnType,
}

impl Column {
    /// Creates a column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Table schema carried by an entry when it changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Columns in declaration order.
    pub columns: Vec<Column>,
}

impl Schema {
    /// Creates a schema from columns.
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    fn body_len(&self) -> usize {
        varint_len(self.columns.len() as u64)
            + self
                .columns
                .iter()
                .map(|c| delimited_len(c.name.len()) + 1)
                .sum::<usize>()
    }

    /// Exact size of the schema as embedded in an entry, length prefix included.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        delimited_len(self.body_len())
    }

    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.put_varint(self.body_len() as u64);
        enc.put_varint(self.columns.len() as u64);
        for column in &self.columns {
            enc.put_str(&column.name);
            enc.put_u8(column.column_type.as_byte());
        }
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut dec = Decoder::new(bytes);
        let count = dec.read_varint()?;
        let mut columns = Vec::new();
        for _ in 0..count {
            let name = dec.read_string()?;
            let code = dec.read_u8()?;
            let column_type =
                ColumnType::from_byte(code).ok_or(CodecError::UnknownColumnType(code))?;
            columns.push(Column { name, column_type });
        }
        dec.finish("schema")?;
        Ok(Self { columns })
    }
}

/// One row of a table mutation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Cell values in column order.
    pub values: Vec<Value>,
}

impl Record {
    /// Creates a record from values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    fn body_len(&self) -> usize {
        varint_len(self.values.len() as u64)
            + self.values.iter().map(Value::encoded_len).sum::<usize>()
    }

    /// Exact size of the record as embedded in an entry, including its
    /// length prefix.
    #[must_use]
    pub fn framed_len(&self) -> usize {
        delimited_len(self.body_len())
    }

    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.put_varint(self.body_len() as u64);
        enc.put_varint(self.values.len() as u64);
        for value in &self.values {
            value.encode(enc);
        }
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut dec = Decoder::new(bytes);
        let count = dec.read_varint()?;
        let mut values = Vec::new();
        for _ in 0..count {
            values.push(Value::decode(&mut dec)?);
        }
        dec.finish("record")?;
        Ok(Self { values })
    }
}

fn header_len(id: u64, table_name: &str, schema: Option<&Schema>) -> usize {
    varint_len(id) + 1 + delimited_len(table_name.len()) + 1 + schema.map_or(0, Schema::encoded_len)
}

/// An immutable, identified log entry.
///
/// Entries are produced by [`LogEntryBuilder::build`] once an id has been
/// assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    id: u64,
    entry_type: EntryType,
    table_name: String,
    schema: Option<Schema>,
    records: Vec<Record>,
}

impl LogEntry {
    /// Entry id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Kind of mutation.
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Table the entry applies to.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Schema, present only when it changed.
    #[must_use]
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Records in order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Consumes the entry, returning its id and the builder that produced it.
    #[must_use]
    pub fn into_parts(self) -> (u64, LogEntryBuilder) {
        (
            self.id,
            LogEntryBuilder {
                entry_type: self.entry_type,
                table_name: self.table_name,
                schema: self.schema,
                records: self.records,
            },
        )
    }

    /// Body bytes excluding records: id, type, table name and schema.
    #[must_use]
    pub fn header_len(&self) -> usize {
        header_len(self.id, &self.table_name, self.schema.as_ref())
    }

    /// Body bytes, excluding the outer length prefix.
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.header_len() + self.records.iter().map(Record::framed_len).sum::<usize>()
    }

    /// Exact number of bytes [`LogEntry::encode_delimited`] appends.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        delimited_len(self.body_len())
    }

    /// Appends the length-delimited encoding of this entry to `out`.
    pub fn encode_delimited(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        let mut enc = Encoder::new(out);
        enc.put_varint(self.body_len() as u64);
        enc.put_varint(self.id);
        enc.put_u8(self.entry_type.as_byte());
        enc.put_str(&self.table_name);
        match &self.schema {
            Some(schema) => {
                enc.put_u8(1);
                schema.encode(&mut enc);
            }
            None => enc.put_u8(0),
        }
        for record in &self.records {
            record.encode(&mut enc);
        }
    }

    /// Returns the length-delimited encoding as a new buffer.
    #[must_use]
    pub fn to_delimited_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_delimited(&mut out);
        out
    }

    /// Decodes one length-delimited entry from the front of `buf`.
    ///
    /// On success `buf` is advanced past the entry. A buffer that ends inside
    /// the entry yields [`CodecError::UnexpectedEof`].
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is truncated or malformed.
    pub fn decode_delimited(buf: &mut &[u8]) -> CodecResult<Self> {
        let mut outer = Decoder::new(buf);
        let body = outer.read_bytes()?;
        let entry = Self::decode_body(body)?;
        *buf = outer.remaining();
        Ok(entry)
    }

    fn decode_body(body: &[u8]) -> CodecResult<Self> {
        let mut dec = Decoder::new(body);
        let id = dec.read_varint()?;
        let code = dec.read_u8()?;
        let entry_type = EntryType::from_byte(code).ok_or(CodecError::UnknownEntryType(code))?;
        let table_name = dec.read_string()?;
        let schema = match dec.read_u8()? {
            0 => None,
            1 => Some(Schema::decode(dec.read_bytes()?)?),
            other => {
                return Err(CodecError::malformed(format!(
                    "invalid schema flag {other}"
                )))
            }
        };
        let mut records = Vec::new();
        while !dec.is_empty() {
            records.push(Record::decode(dec.read_bytes()?)?);
        }
        Ok(Self {
            id,
            entry_type,
            table_name,
            schema,
            records,
        })
    }
}

/// Builds a [`LogEntry`] before its id is known.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntryBuilder {
    entry_type: EntryType,
    table_name: String,
    schema: Option<Schema>,
    records: Vec<Record>,
}

impl LogEntryBuilder {
    /// Starts an entry for `table_name`.
    pub fn new(table_name: impl Into<String>, entry_type: EntryType) -> Self {
        Self {
            entry_type,
            table_name: table_name.into(),
            schema: None,
            records: Vec::new(),
        }
    }

    /// Shorthand for an [`EntryType::Update`] entry.
    pub fn update(table_name: impl Into<String>) -> Self {
        Self::new(table_name, EntryType::Update)
    }

    /// Attaches a schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Replaces the schema, possibly clearing it.
    #[must_use]
    pub fn with_schema(mut self, schema: Option<Schema>) -> Self {
        self.schema = schema;
        self
    }

    /// Appends one record.
    #[must_use]
    pub fn record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    /// Appends records.
    #[must_use]
    pub fn records(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        self.records.extend(records);
        self
    }

    /// Table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Whether a schema is attached.
    #[must_use]
    pub fn has_schema(&self) -> bool {
        self.schema.is_some()
    }

    /// Size [`LogEntry::header_len`] will report once built with `id`.
    #[must_use]
    pub fn header_len(&self, id: u64) -> usize {
        header_len(id, &self.table_name, self.schema.as_ref())
    }

    /// Takes the schema out, leaving the builder without one.
    pub fn take_schema(&mut self) -> Option<Schema> {
        self.schema.take()
    }

    /// Takes the records out, leaving the builder without any.
    pub fn take_records(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }

    /// Finalizes the entry with its id.
    #[must_use]
    pub fn build(self, id: u64) -> LogEntry {
        LogEntry {
            id,
            entry_type: self.entry_type,
            table_name: self.table_name,
            schema: self.schema,
            records: self.records,
        }
    }
}
