use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{Error, ErrorKind, Read, Result, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;

use crate::codepage::TextCodec;
use crate::convert;
use crate::dialect::{DEFAULT_VERSION, Dialect};
use crate::error::{Warning, WarningHandler, default_handler};
use crate::field::{FieldDescriptor, MAX_NAME_LEN, Value};
use crate::header::Header;
use crate::layout::{Decoded, Layout, Slot};
use crate::mach;
use crate::memo::MemoStore;
use crate::{EOF_MARKER, RECORD_DELETED, RECORD_LIVE};

/// One live record presented to a [`Table::for_each`] visitor: field
/// name to value, in column order.
pub struct Row<'a> {
    names: &'a [String],
    values: Vec<Value>,
}

impl Row<'_> {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A dBase-family table: the main file, its parsed header, the compiled
/// record layout and the memo sidecar.
///
/// The engine owns both file handles from open/create until
/// [`Table::close`]. It is strictly single-writer: two instances must
/// not hold the same file for writing at once.
pub struct Table {
    path: PathBuf,
    file: Option<File>,

    version: u8,
    language_driver: u8,
    dialect: Dialect,
    codec: TextCodec,

    fields: Vec<FieldDescriptor>,
    layout: Layout,
    memo: MemoStore,

    /// Record count including tombstones, as kept in the header.
    record_count: u32,
    /// Offset of the first record; equals the header size.
    data_offset: u64,
    /// Step between records, from the header when one existed.
    record_size: usize,

    /// A header block exists on disk.
    header_written: bool,
    records_modified: bool,
    fields_modified: bool,
    /// Anything was written since open; drives the trailing EOF marker.
    file_written: bool,
    position: Option<u64>,

    handler: WarningHandler,
    closed: bool,
}

impl Table {
    /// Open a table file, or start a fresh one if the path does not
    /// exist yet. A header that expects a memo sidecar without one on
    /// disk is reported and the table opens without memo support.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Table> {
        Self::open_with_handler(path, default_handler())
    }

    /// Like [`Table::open`], with the warning sink installed up front so
    /// open-time conditions reach it.
    pub fn open_with_handler(
        path: impl AsRef<Path>,
        handler: WarningHandler,
    ) -> anyhow::Result<Table> {
        let path = path.as_ref();
        if !path.exists() {
            let mut table = Self::create(path)?;
            table.handler = handler;
            return Ok(table);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("open table at {}", path.display()))?;

        let parsed = Header::parse(&mut file).context("parse table header")?;

        let mut table = match parsed {
            Some((header, fields)) => {
                let dialect = Dialect::from_version(header.version);
                let layout = Layout::compile(&fields, &dialect);
                let record_size = if header.record_size > 0 {
                    header.record_size as usize
                } else {
                    layout.record_size
                };

                Table {
                    path: path.to_path_buf(),
                    file: Some(file),
                    version: header.version,
                    language_driver: header.language_driver,
                    dialect,
                    codec: TextCodec::from_driver(header.language_driver),
                    fields,
                    layout,
                    memo: MemoStore::new(sidecar_path(path), dialect.single_memo_terminator),
                    record_count: header.record_count,
                    data_offset: header.header_size as u64,
                    record_size,
                    header_written: true,
                    records_modified: false,
                    fields_modified: false,
                    file_written: false,
                    position: Some(header.header_size as u64),
                    handler,
                    closed: false,
                }
            }
            // A short header means an empty table with no columns.
            None => {
                let dialect = Dialect::from_version(DEFAULT_VERSION);
                Table {
                    path: path.to_path_buf(),
                    file: Some(file),
                    version: DEFAULT_VERSION,
                    language_driver: 0,
                    dialect,
                    codec: TextCodec::Default,
                    fields: Vec::new(),
                    layout: Layout::default(),
                    memo: MemoStore::new(sidecar_path(path), dialect.single_memo_terminator),
                    record_count: 0,
                    data_offset: 0,
                    record_size: 1,
                    header_written: false,
                    records_modified: false,
                    fields_modified: false,
                    file_written: false,
                    position: None,
                    handler,
                    closed: false,
                }
            }
        };

        if table.memo.path().exists() {
            if let Err(err) = table.memo.open_existing() {
                // The table is still usable, memo values just read empty.
                log::debug!("cannot open memo file {}: {err}", table.memo.path().display());
                let w = Warning::DbtReadOnly {
                    path: table.memo.path().to_path_buf(),
                };
                (table.handler)(&w);
            }
        } else if table.dialect.memo_expected {
            let w = Warning::DbtDoesntExist {
                path: table.memo.path().to_path_buf(),
            };
            (table.handler)(&w);
        }

        Ok(table)
    }

    /// Create a table file, truncating anything already at the path. The
    /// header is not written until the first insert (or close).
    pub fn create(path: impl AsRef<Path>) -> anyhow::Result<Table> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("create table at {}", path.display()))?;

        let dialect = Dialect::from_version(DEFAULT_VERSION);

        Ok(Table {
            path: path.to_path_buf(),
            file: Some(file),
            version: DEFAULT_VERSION,
            language_driver: 0,
            dialect,
            codec: TextCodec::Default,
            fields: Vec::new(),
            layout: Layout::default(),
            memo: MemoStore::new(sidecar_path(path), dialect.single_memo_terminator),
            record_count: 0,
            data_offset: 0,
            record_size: 1,
            header_written: false,
            records_modified: false,
            fields_modified: false,
            file_written: false,
            position: None,
            handler: default_handler(),
            closed: false,
        })
    }

    /// Replace the sink for non-fatal conditions.
    pub fn set_error_handler(&mut self, handler: WarningHandler) {
        self.handler = handler;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn language_driver(&self) -> u8 {
        self.language_driver
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Record count as kept in the header, tombstones included.
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    /// Append a column. Only possible while the table holds no records.
    /// Returns false (after reporting) when the column is skipped;
    /// type and length violations are hard errors.
    pub fn add_column(
        &mut self,
        name: &str,
        kind: u8,
        length: Option<u32>,
        precision: Option<u8>,
    ) -> Result<bool> {
        if self.record_count > 0 {
            self.warn(Warning::RecordsExist {
                column: name.to_string(),
            });
            return Ok(false);
        }
        if self.fields.iter().any(|f| f.name.eq_ignore_ascii_case(name)) {
            self.warn(Warning::ColumnExists {
                column: name.to_string(),
            });
            return Ok(false);
        }
        if name.len() > MAX_NAME_LEN {
            // The 10-byte descriptor slot truncates the name on write.
            self.warn(Warning::ColumnNameTooLong {
                column: name.to_string(),
            });
        }

        let field = FieldDescriptor::new(name, kind, length, precision)?;
        self.fields.push(field);
        self.fields_modified = true;
        self.recompile();
        Ok(true)
    }

    /// Write a record, reusing the earliest tombstone slot if any.
    pub fn insert(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("expected {} values, got {}", self.fields.len(), values.len()),
            ));
        }

        if !self.header_written {
            self.flush_initial_header()?;
        }

        let addr = self.free_slot_addr()?;
        let area = match self.encode_record(values) {
            Ok(area) => area,
            Err(err) => {
                self.memo.rollback();
                return Err(err);
            }
        };

        let mut record = Vec::with_capacity(1 + area.len());
        record.push(RECORD_LIVE);
        record.extend_from_slice(&area);

        self.write_at(addr, &record)?;
        self.file_mut()?.flush()?;
        self.memo.flush()?;

        self.record_count += 1;
        self.records_modified = true;
        self.file_written = true;
        Ok(())
    }

    /// Rewrite the index-th live record with a full set of values. The
    /// deletion byte is left alone. On a serialization error the memo
    /// buffer is rolled back and the error re-raised.
    pub fn update(&mut self, index: usize, values: &[Value]) -> Result<bool> {
        if self.record_count == 0 {
            self.warn(Warning::NoRecordsWhileUpdating);
            return Ok(false);
        }
        if values.len() != self.fields.len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("expected {} values, got {}", self.fields.len(), values.len()),
            ));
        }
        if !self.seek(index)? {
            return Ok(false);
        }
        let addr = self.position.unwrap();

        let area = match self.encode_record(values) {
            Ok(area) => area,
            Err(err) => {
                self.memo.rollback();
                return Err(err);
            }
        };

        self.write_at(addr + 1, &area)?;
        self.file_mut()?.flush()?;
        self.memo.flush()?;

        self.records_modified = true;
        self.file_written = true;
        Ok(true)
    }

    /// Rewrite one field of the index-th live record, leaving every
    /// other byte of the record untouched.
    pub fn update_field(&mut self, index: usize, column: &str, value: &Value) -> Result<bool> {
        let slot = self
            .layout
            .slot_by_name(column)
            .cloned()
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidInput, format!("no such column: {column}"))
            })?;

        if self.record_count == 0 {
            self.warn(Warning::NoRecordsWhileUpdating);
            return Ok(false);
        }
        if !self.seek(index)? {
            return Ok(false);
        }
        let addr = self.position.unwrap();

        let bytes = {
            let Table {
                codec,
                memo,
                handler,
                ..
            } = self;
            match encode_one(&slot, value, codec, memo, handler) {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.memo.rollback();
                    return Err(err);
                }
            }
        };

        self.write_at(addr + 1 + slot.offset as u64, &bytes)?;
        self.file_mut()?.flush()?;
        self.memo.flush()?;

        self.records_modified = true;
        self.file_written = true;
        Ok(true)
    }

    /// Tombstone the index-th live record.
    pub fn delete(&mut self, index: usize) -> Result<bool> {
        if !self.seek(index)? {
            return Ok(false);
        }
        let addr = self.position.unwrap();

        self.write_at(addr, &[RECORD_DELETED])?;
        self.file_mut()?.flush()?;

        self.records_modified = true;
        self.file_written = true;
        Ok(true)
    }

    /// Position at the index-th live record.
    pub fn seek(&mut self, index: usize) -> Result<bool> {
        let addrs = self.live_addresses()?;
        match addrs.get(index) {
            Some(&addr) => {
                self.file_mut()?.seek(SeekFrom::Start(addr))?;
                self.position = Some(addr);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ordinal of the current position within the live-record sequence.
    pub fn tell(&mut self) -> Result<Option<usize>> {
        let Some(pos) = self.position else {
            return Ok(None);
        };
        let addrs = self.live_addresses()?;
        Ok(addrs.iter().position(|&a| a == pos))
    }

    /// Read the record at the current position and step past any
    /// tombstones that follow, so the next call yields the next live
    /// record. `None` on end of file.
    pub fn gets(&mut self) -> Result<Option<Vec<Value>>> {
        let Some(pos) = self.position else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.record_size];
        if self.read_at(pos, &mut buf)? < buf.len() {
            return Ok(None);
        }
        if buf[0] == EOF_MARKER {
            return Ok(None);
        }
        let values = self.decode_area(&buf[1..])?;

        let mut next = pos + self.record_size as u64;
        loop {
            let mut marker = [0u8; 1];
            if self.read_at(next, &mut marker)? == 0 || marker[0] != RECORD_DELETED {
                break;
            }
            next += self.record_size as u64;
        }
        self.position = Some(next);

        Ok(Some(values))
    }

    /// Visit every live record in file order.
    pub fn for_each(&mut self, mut body: impl FnMut(&Row<'_>)) -> Result<()> {
        let names: Vec<String> = self.fields.iter().map(|f| f.name.clone()).collect();

        let mut buf = vec![0u8; self.record_size];
        for i in 0..self.record_count as u64 {
            let addr = self.data_offset + i * self.record_size as u64;
            if self.read_at(addr, &mut buf)? < buf.len() {
                break;
            }
            if buf[0] == EOF_MARKER {
                break;
            }
            if buf[0] == RECORD_DELETED {
                continue;
            }
            let values = self.decode_area(&buf[1..])?;
            let row = Row {
                names: &names,
                values,
            };
            body(&row);
        }
        Ok(())
    }

    /// All live records, each as values in column order.
    pub fn get_all_data(&mut self) -> Result<Vec<Vec<Value>>> {
        let mut out = Vec::new();

        let mut buf = vec![0u8; self.record_size];
        for i in 0..self.record_count as u64 {
            let addr = self.data_offset + i * self.record_size as u64;
            if self.read_at(addr, &mut buf)? < buf.len() {
                break;
            }
            if buf[0] == EOF_MARKER {
                break;
            }
            if buf[0] == RECORD_DELETED {
                continue;
            }
            out.push(self.decode_area(&buf[1..])?);
        }
        Ok(out)
    }

    /// Number of live records.
    pub fn get_data_count(&mut self) -> Result<usize> {
        Ok(self.live_addresses()?.len())
    }

    /// Rewrite the table (and its memo sidecar) keeping only live
    /// records. The originals are overwritten in place through a
    /// temporary pair which is removed on every path.
    pub fn vacuum(&mut self) -> anyhow::Result<()> {
        let tmp_dbf = self.path.with_extension("vacuum.dbf");
        let tmp_dbt = sidecar_path(&tmp_dbf);

        let result = self.vacuum_into(&tmp_dbf, &tmp_dbt);

        let _ = std::fs::remove_file(&tmp_dbf);
        let _ = std::fs::remove_file(&tmp_dbt);
        result
    }

    fn vacuum_into(&mut self, tmp_dbf: &Path, tmp_dbt: &Path) -> anyhow::Result<()> {
        let mut dst = Table::create(tmp_dbf).context("create vacuum table")?;
        dst.version = self.version;
        dst.language_driver = self.language_driver;
        dst.dialect = self.dialect;
        dst.codec = self.codec;
        dst.memo = MemoStore::new(tmp_dbt.to_path_buf(), self.dialect.single_memo_terminator);
        dst.fields = self.fields.clone();
        dst.fields_modified = true;
        dst.recompile();

        let mut copied = 0u32;
        if self.seek(0)? {
            while let Some(values) = self.gets()? {
                dst.insert(&values).context("copy record into vacuum table")?;
                copied += 1;
            }
        }
        dst.close().context("close vacuum table")?;

        // Stream the compacted pair back over the originals.
        if let Some(file) = self.file.as_mut() {
            let mut src = File::open(tmp_dbf).context("reopen vacuum table")?;
            file.seek(SeekFrom::Start(0))?;
            file.set_len(0)?;
            std::io::copy(&mut src, file).context("overwrite table file")?;
            file.flush()?;
        }
        if self.memo.is_open() {
            if tmp_dbt.exists() {
                let mut src = File::open(tmp_dbt).context("reopen vacuum memo file")?;
                self.memo
                    .overwrite_from(&mut src)
                    .context("overwrite memo file")?;
            } else {
                self.memo.reset_empty().context("reset memo file")?;
            }
        }

        let (header_size, record_size) = Header::sizes(&self.fields);
        self.record_count = copied;
        self.data_offset = header_size as u64;
        self.record_size = record_size as usize;
        self.header_written = true;
        self.records_modified = false;
        self.fields_modified = false;
        self.file_written = true;
        self.position = Some(self.data_offset);
        self.seek(0)?;

        Ok(())
    }

    /// Flush pending header state, make sure the file ends with the EOF
    /// marker if it was written to, and release both handles. Safe to
    /// call twice.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.memo.close()?;

        if self.file.is_some() {
            if !self.header_written {
                self.flush_initial_header()?;
            } else if self.fields_modified {
                self.flush_initial_header()?;
            } else if self.records_modified {
                let mut buf = [0u8; 7];
                buf[..3].copy_from_slice(&today_bin());
                mach::write_4(&mut buf[3..], self.record_count);
                self.write_at(1, &buf)?;
            }

            if self.file_written {
                let len = self.file_mut()?.metadata()?.len();
                let mut last = [0u8; 1];
                let terminated =
                    len > 0 && self.read_at(len - 1, &mut last)? == 1 && last[0] == EOF_MARKER;
                if !terminated {
                    self.write_at(len, &[EOF_MARKER])?;
                }
            }

            self.file_mut()?.flush()?;
            self.file = None;
        }

        self.closed = true;
        Ok(())
    }

    fn warn(&mut self, warning: Warning) {
        (self.handler)(&warning)
    }

    fn recompile(&mut self) {
        self.layout = Layout::compile(&self.fields, &self.dialect);
        self.record_size = self.layout.record_size;
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::NotConnected, "table file is closed"))
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;

        let mut pos = 0;
        while pos < buf.len() {
            let n = file.read(&mut buf[pos..])?;
            if n == 0 {
                break;
            }
            pos += n;
        }
        Ok(pos)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)
    }

    /// Write the full header block: fixed part, descriptors, terminator.
    fn flush_initial_header(&mut self) -> Result<()> {
        let (header_size, record_size) = Header::sizes(&self.fields);
        let header = Header {
            version: self.version,
            last_update: today_bin(),
            record_count: self.record_count,
            header_size,
            record_size,
            incomplete_tx: 0,
            encrypted: 0,
            mdx: 0,
            language_driver: self.language_driver,
        };

        let bytes = header.emit(&self.fields);
        self.write_at(0, &bytes)?;

        self.data_offset = header_size as u64;
        self.record_size = record_size as usize;
        self.header_written = true;
        self.file_written = true;
        if self.position.is_none() {
            self.position = Some(self.data_offset);
        }
        Ok(())
    }

    // Address for the next insert: the earliest tombstone, or the first
    // slot past the last record (which may sit on the EOF marker).
    fn free_slot_addr(&mut self) -> Result<u64> {
        let mut addr = self.data_offset;
        for _ in 0..self.record_count {
            let mut marker = [0u8; 1];
            let n = self.read_at(addr, &mut marker)?;
            if n == 0 || marker[0] == RECORD_DELETED || marker[0] == EOF_MARKER {
                return Ok(addr);
            }
            addr += self.record_size as u64;
        }
        Ok(addr)
    }

    fn live_addresses(&mut self) -> Result<Vec<u64>> {
        let mut out = Vec::new();
        let mut addr = self.data_offset;
        for _ in 0..self.record_count {
            let mut marker = [0u8; 1];
            if self.read_at(addr, &mut marker)? == 0 || marker[0] == EOF_MARKER {
                break;
            }
            if marker[0] != RECORD_DELETED {
                out.push(addr);
            }
            addr += self.record_size as u64;
        }
        Ok(out)
    }

    fn encode_record(&mut self, values: &[Value]) -> Result<Vec<u8>> {
        let Table {
            layout,
            codec,
            memo,
            handler,
            ..
        } = self;

        let mut area = Vec::with_capacity(layout.record_size - 1);
        for (slot, value) in layout.slots.iter().zip(values) {
            area.extend_from_slice(&encode_one(slot, value, codec, memo, handler)?);
        }
        Ok(area)
    }

    fn decode_area(&mut self, area: &[u8]) -> Result<Vec<Value>> {
        let Table {
            layout,
            codec,
            memo,
            ..
        } = self;

        layout
            .slots
            .iter()
            .map(|slot| match slot.decode(area, codec) {
                Decoded::Value(v) => Ok(v),
                Decoded::MemoRef { pointer, binary } => {
                    let bytes = match pointer {
                        Some(p) => memo.read_value(p)?,
                        None => Vec::new(),
                    };
                    Ok(if binary {
                        Value::Blob(bytes)
                    } else if slot.encoded {
                        Value::Memo(codec.decode(&bytes))
                    } else {
                        Value::Memo(String::from_utf8_lossy(&bytes).into_owned())
                    })
                }
            })
            .collect()
    }
}

fn encode_one(
    slot: &Slot,
    value: &Value,
    codec: &TextCodec,
    memo: &mut MemoStore,
    handler: &mut WarningHandler,
) -> Result<Vec<u8>> {
    if !slot.is_memo() {
        return slot.encode(value, codec);
    }

    let body = slot.memo_body(value, codec)?;
    match memo.write_value(body) {
        Some(ptr) => Ok(slot.encode_pointer(Some(ptr))),
        None => {
            handler(&Warning::DbtReadOnly {
                path: memo.path().to_path_buf(),
            });
            Ok(slot.encode_pointer(None))
        }
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("dbt")
}

fn today_bin() -> [u8; 3] {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    convert::yyyymmdd_to_bin(&convert::unix_to_yyyymmdd(secs)).unwrap_or([0, 0, 0])
}

impl Drop for Table {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Table({}, version={:#04x} {}, columns={}, records={})",
            self.path.display(),
            self.version,
            self.dialect.name,
            self.fields.len(),
            self.record_count,
        )
    }
}

#[cfg(test)]
mod test {
    use super::Table;
    use crate::error::Warning;
    use crate::field::Value;
    use crate::{EOF_MARKER, RECORD_DELETED};
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn people_table(path: &PathBuf) -> Table {
        let mut t = Table::create(path).unwrap();
        t.add_column("ID", b'N', Some(5), Some(0)).unwrap();
        t.add_column("NAME", b'C', Some(10), None).unwrap();
        t.add_column("BORN", b'D', None, None).unwrap();
        t.add_column("NOTE", b'M', None, None).unwrap();
        t
    }

    fn person(id: f64, name: &str, born: &str, note: &str) -> Vec<Value> {
        vec![
            Value::Numeric(Some(id)),
            Value::Character(name.into()),
            Value::Date(born.into()),
            Value::Memo(note.into()),
        ]
    }

    #[test]
    fn test_create_insert_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.dbf");

        let mut t = people_table(&path);
        t.insert(&person(1.0, "Alice", "19700101", "hello")).unwrap();
        t.insert(&person(2.0, "Bob", "19851231", "world")).unwrap();
        t.close().unwrap();

        let mut t = Table::open(&path).unwrap();
        assert_eq!(t.get_data_count().unwrap(), 2);
        assert_eq!(t.record_count(), 2);

        let rows = t.get_all_data().unwrap();
        assert_eq!(rows[0], person(1.0, "Alice", "19700101", "hello"));
        assert_eq!(rows[1], person(2.0, "Bob", "19851231", "world"));

        let fields = t.fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[1].name, "NAME");
        assert_eq!(fields[1].length, 10);
        t.close().unwrap();

        // The memo bodies live in the sidecar.
        assert!(path.with_extension("dbt").exists());
    }

    #[test]
    fn test_eof_marker_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let mut t = people_table(&path);
        t.insert(&person(1.0, "Alice", "19700101", "x")).unwrap();
        t.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(*bytes.last().unwrap(), EOF_MARKER);

        // Another mutation cycle keeps a single trailing marker.
        let mut t = Table::open(&path).unwrap();
        t.delete(0).unwrap();
        t.close().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(*bytes.last().unwrap(), EOF_MARKER);
        assert_ne!(bytes[bytes.len() - 2], EOF_MARKER);
    }

    #[test]
    fn test_delete_skips_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let mut t = people_table(&path);
        for (id, name) in [(0.0, "zero"), (1.0, "one"), (2.0, "two")] {
            t.insert(&person(id, name, "20000101", "")).unwrap();
        }
        assert!(t.delete(1).unwrap());
        t.close().unwrap();

        let mut t = Table::open(&path).unwrap();
        assert_eq!(t.get_data_count().unwrap(), 2);
        assert_eq!(t.record_count(), 3);

        let mut seen = Vec::new();
        t.for_each(|row| {
            seen.push(row.get("name").unwrap().clone());
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![Value::Character("zero".into()), Value::Character("two".into())]
        );
        t.close().unwrap();
    }

    #[test]
    fn test_insert_reuses_earliest_tombstone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let mut t = people_table(&path);
        for id in 0..4 {
            t.insert(&person(id as f64, &format!("p{id}"), "20000101", "")).unwrap();
        }
        assert!(t.delete(2).unwrap());
        t.insert(&person(9.0, "new", "20000101", "")).unwrap();

        assert_eq!(t.record_count(), 5);
        let rows = t.get_all_data().unwrap();
        let names: Vec<_> = rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(
            names,
            vec![
                Value::Character("p0".into()),
                Value::Character("p1".into()),
                Value::Character("new".into()),
                Value::Character("p3".into()),
            ]
        );
        t.close().unwrap();
    }

    #[test]
    fn test_gets_walks_live_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let mut t = people_table(&path);
        for id in 0..3 {
            t.insert(&person(id as f64, &format!("p{id}"), "20000101", "")).unwrap();
        }
        t.delete(1).unwrap();

        assert!(t.seek(0).unwrap());
        assert_eq!(t.tell().unwrap(), Some(0));

        let first = t.gets().unwrap().unwrap();
        assert_eq!(first[1], Value::Character("p0".into()));
        // The tombstone in between is skipped.
        let second = t.gets().unwrap().unwrap();
        assert_eq!(second[1], Value::Character("p2".into()));
        assert_eq!(t.gets().unwrap(), None);

        assert!(!t.seek(2).unwrap());
        t.close().unwrap();
    }

    #[test]
    fn test_update_full_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let mut t = people_table(&path);
        t.insert(&person(1.0, "Alice", "19700101", "old")).unwrap();
        assert!(t.update(0, &person(1.0, "Alicia", "19700101", "new")).unwrap());

        let rows = t.get_all_data().unwrap();
        assert_eq!(rows[0][1], Value::Character("Alicia".into()));
        assert_eq!(rows[0][3], Value::Memo("new".into()));
        assert_eq!(t.record_count(), 1);
        t.close().unwrap();
    }

    #[test]
    fn test_update_field_leaves_others_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let mut t = people_table(&path);
        t.insert(&person(1.0, "Alice", "19700101", "keep")).unwrap();
        assert!(
            t.update_field(0, "NAME", &Value::Character("Bob".into())).unwrap()
        );

        let rows = t.get_all_data().unwrap();
        assert_eq!(rows[0][0], Value::Numeric(Some(1.0)));
        assert_eq!(rows[0][1], Value::Character("Bob".into()));
        assert_eq!(rows[0][2], Value::Date("19700101".into()));
        assert_eq!(rows[0][3], Value::Memo("keep".into()));

        assert!(t.update_field(0, "nosuch", &Value::Integer(1)).is_err());
        t.close().unwrap();
    }

    #[test]
    fn test_update_on_empty_table_warns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();

        let mut t = people_table(&path);
        t.set_error_handler(Box::new(move |w| sink.borrow_mut().push(w.clone())));

        assert!(!t.update(0, &person(1.0, "x", "20000101", "")).unwrap());
        assert_eq!(warnings.borrow()[0], Warning::NoRecordsWhileUpdating);
        t.close().unwrap();
    }

    #[test]
    fn test_add_column_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();

        let mut t = people_table(&path);
        t.set_error_handler(Box::new(move |w| sink.borrow_mut().push(w.symbol())));

        assert!(!t.add_column("name", b'C', Some(5), None).unwrap());
        assert_eq!(warnings.borrow().last(), Some(&"COLUMN_EXISTS"));

        assert!(t.add_column("VERYLONGNAME", b'L', None, None).unwrap());
        assert_eq!(warnings.borrow().last(), Some(&"COLUMN_NAME_TOO_LONG"));

        // Constraint violations are errors, not warnings.
        assert!(t.add_column("BAD", b'N', None, None).is_err());
        assert!(t.add_column("VEC", b'V', Some(4), None).is_err());

        t.insert(&[
            Value::Numeric(Some(1.0)),
            Value::Character("x".into()),
            Value::Date("20000101".into()),
            Value::Memo(String::new()),
            Value::Logical(Some(true)),
        ])
        .unwrap();

        assert!(!t.add_column("LATE", b'L', None, None).unwrap());
        assert_eq!(warnings.borrow().last(), Some(&"RECORDS_EXIST"));
        t.close().unwrap();
    }

    #[test]
    fn test_memo_rollback_on_failed_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        // Memo column first, so the body is already buffered when a
        // later slot rejects its value.
        let mut t = Table::create(&path).unwrap();
        t.add_column("NOTE", b'M', None, None).unwrap();
        t.add_column("NUM", b'I', None, None).unwrap();
        t.insert(&[Value::Memo("first".into()), Value::Integer(1)]).unwrap();
        t.close().unwrap();

        let dbt = std::fs::read(path.with_extension("dbt")).unwrap();

        let mut t = Table::open(&path).unwrap();
        let next_before = t.memo.next_available_block();

        let bad = vec![Value::Memo("leaked?".into()), Value::Character("x".into())];
        assert!(t.update(0, &bad).is_err());
        assert_eq!(t.memo.next_available_block(), next_before);
        t.close().unwrap();

        // Neither the allocation counter nor the file body moved.
        assert_eq!(std::fs::read(path.with_extension("dbt")).unwrap(), dbt);
    }

    #[test]
    fn test_language_driver_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let mut t = people_table(&path);
        t.insert(&person(1.0, "Alice", "19700101", "x")).unwrap();
        t.close().unwrap();

        // Stamp a cp1251 language driver into the header.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[29] = 0xc9;
        std::fs::write(&path, bytes).unwrap();

        let mut t = Table::open(&path).unwrap();
        assert_eq!(t.language_driver(), 0xc9);
        t.delete(0).unwrap();
        t.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes[29], 0xc9);
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brand_new.dbf");

        let mut t = Table::open(&path).unwrap();
        assert_eq!(t.fields().len(), 0);
        assert_eq!(t.record_count(), 0);
        assert!(t.add_column("A", b'C', Some(3), None).unwrap());
        t.close().unwrap();

        let mut t = Table::open(&path).unwrap();
        assert_eq!(t.fields().len(), 1);
        t.close().unwrap();
    }

    #[test]
    fn test_missing_memo_sidecar_warns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let mut t = people_table(&path);
        t.insert(&person(1.0, "Alice", "19700101", "x")).unwrap();
        t.close().unwrap();

        // Force a memo-expecting version and drop the sidecar.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = 0x83;
        std::fs::write(&path, bytes).unwrap();
        std::fs::remove_file(path.with_extension("dbt")).unwrap();

        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        let mut t = Table::open_with_handler(
            &path,
            Box::new(move |w| sink.borrow_mut().push(w.symbol())),
        )
        .unwrap();
        assert_eq!(*warnings.borrow(), vec!["DBT_DOESNT_EXIST"]);

        // Memo pointers read as empty values without the sidecar.
        let rows = t.get_all_data().unwrap();
        assert_eq!(rows[0][3], Value::Memo(String::new()));
        t.close().unwrap();
    }

    #[test]
    fn test_vacuum_compacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dbf");

        let mut t = people_table(&path);
        for id in 0..5 {
            t.insert(&person(id as f64, &format!("p{id}"), "20000101", &format!("note{id}")))
                .unwrap();
        }
        t.delete(1).unwrap();
        t.delete(2).unwrap();

        t.vacuum().unwrap();
        assert_eq!(t.record_count(), 3);
        assert_eq!(t.get_data_count().unwrap(), 3);

        // delete(1) removed p1, after which live index 2 was p3.
        let rows = t.get_all_data().unwrap();
        let names: Vec<_> = rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(
            names,
            vec![
                Value::Character("p0".into()),
                Value::Character("p2".into()),
                Value::Character("p4".into()),
            ]
        );
        assert_eq!(rows[2][3], Value::Memo("note4".into()));

        // No physical tombstones survive.
        t.close().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(!bytes.contains(&RECORD_DELETED));

        // Temporaries are gone.
        assert!(!path.with_extension("vacuum.dbf").exists());
        assert!(!path.with_extension("vacuum.dbt").exists());

        let mut t = Table::open(&path).unwrap();
        assert_eq!(t.get_data_count().unwrap(), 3);
        t.close().unwrap();
    }
}
