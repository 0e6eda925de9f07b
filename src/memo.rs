use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Result, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::mach;
use crate::{BlockPtr, EOF_MARKER, MEMO_BLOCK_SIZE};

/// The memo sidecar.
///
/// Writes are buffered per block pointer and only reach the file on
/// [`MemoStore::flush`], which the engine calls after the owning record
/// hit the table file. Until then a failed record write can take the
/// allocations back with [`MemoStore::rollback`]. The first four header
/// bytes (next available block) are rewritten once, at close.
pub struct MemoStore {
    path: PathBuf,
    file: Option<File>,
    next_available_block: BlockPtr,
    buffer: BTreeMap<BlockPtr, Vec<u8>>,
    rollback_anchor: Option<BlockPtr>,
    single_terminator: bool,
}

impl MemoStore {
    pub fn new(path: PathBuf, single_terminator: bool) -> MemoStore {
        MemoStore {
            path,
            file: None,
            next_available_block: 1,
            buffer: BTreeMap::new(),
            rollback_anchor: None,
            single_terminator,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn next_available_block(&self) -> BlockPtr {
        self.next_available_block
    }

    /// Open a sidecar that already exists on disk and pick up its next
    /// available block. A header shorter than four bytes counts as one
    /// used block.
    pub fn open_existing(&mut self) -> Result<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        let mut head = [0u8; 4];
        let mut pos = 0;
        while pos < head.len() {
            let n = file.read(&mut head[pos..])?;
            if n == 0 {
                break;
            }
            pos += n;
        }

        self.next_available_block = if pos == 4 { mach::read_4(&head).max(1) } else { 1 };
        self.file = Some(file);
        Ok(())
    }

    // Create the sidecar with a fresh header block: 0x01 and 511 zeros.
    fn create(&mut self) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;

        let mut block = [0u8; MEMO_BLOCK_SIZE];
        block[0] = 0x01;
        file.write_all(&block)?;

        self.next_available_block = 1;
        self.file = Some(file);
        Ok(())
    }

    /// Allocate blocks for a memo body and buffer it under the returned
    /// pointer. `None` means the sidecar could not be created for
    /// writing; the caller reports that and stores an empty pointer.
    ///
    /// The write terminator is always `1a 1a`; the single-terminator
    /// dialect rule only affects reads.
    pub fn write_value(&mut self, mut body: Vec<u8>) -> Option<BlockPtr> {
        if self.file.is_none() {
            if let Err(err) = self.create() {
                log::debug!("cannot create memo file {}: {err}", self.path.display());
                return None;
            }
        }

        body.extend_from_slice(&[EOF_MARKER, EOF_MARKER]);
        let blocks = body.len().div_ceil(MEMO_BLOCK_SIZE) as BlockPtr;

        let pointer = self.next_available_block;
        if self.rollback_anchor.is_none() {
            self.rollback_anchor = Some(pointer);
        }
        self.buffer.insert(pointer, body);
        self.next_available_block += blocks;

        Some(pointer)
    }

    /// Read the memo body starting at `pointer`, up to and excluding the
    /// terminator. Without an open sidecar, or past the end of the file,
    /// the value is empty.
    pub fn read_value(&mut self, pointer: BlockPtr) -> Result<Vec<u8>> {
        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };

        file.seek(SeekFrom::Start(pointer as u64 * MEMO_BLOCK_SIZE as u64))?;

        let mut acc = Vec::new();
        let mut chunk = [0u8; MEMO_BLOCK_SIZE];
        loop {
            let n = file.read(&mut chunk)?;
            if n == 0 {
                // EOF without a terminator.
                return Ok(acc);
            }
            acc.extend_from_slice(&chunk[..n]);

            let end = if self.single_terminator {
                acc.iter().position(|&b| b == EOF_MARKER)
            } else {
                acc.windows(2).position(|w| w == [EOF_MARKER, EOF_MARKER])
            };
            if let Some(end) = end {
                acc.truncate(end);
                return Ok(acc);
            }
        }
    }

    /// Write every buffered value at its block offset, in pointer order,
    /// zero-padding any gap between the current end of the file and the
    /// block start. Clears the buffer and the rollback anchor.
    pub fn flush(&mut self) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            self.buffer.clear();
            self.rollback_anchor = None;
            return Ok(());
        };

        for (&pointer, body) in &self.buffer {
            let offset = pointer as u64 * MEMO_BLOCK_SIZE as u64;
            let len = file.metadata()?.len();
            if len < offset {
                file.seek(SeekFrom::End(0))?;
                let mut gap = offset - len;
                let zeros = [0u8; MEMO_BLOCK_SIZE];
                while gap > 0 {
                    let n = gap.min(MEMO_BLOCK_SIZE as u64) as usize;
                    file.write_all(&zeros[..n])?;
                    gap -= n as u64;
                }
            }
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(body)?;
        }
        file.flush()?;

        self.buffer.clear();
        self.rollback_anchor = None;
        Ok(())
    }

    /// Forget all buffered values and hand back their blocks. Nothing on
    /// disk changes: buffered writes were never flushed.
    pub fn rollback(&mut self) {
        if let Some(anchor) = self.rollback_anchor.take() {
            self.next_available_block = anchor;
        }
        self.buffer.clear();
    }

    /// Replace the whole sidecar with the contents of `src` and adopt its
    /// next-available-block header.
    pub fn overwrite_from(&mut self, src: &mut File) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        std::io::copy(src, file)?;
        file.flush()?;

        file.seek(SeekFrom::Start(0))?;
        let mut head = [0u8; 4];
        self.next_available_block = match file.read_exact(&mut head) {
            Ok(()) => mach::read_4(&head).max(1),
            Err(_) => 1,
        };
        Ok(())
    }

    /// Truncate the sidecar back to a fresh header block.
    pub fn reset_empty(&mut self) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        let mut block = [0u8; MEMO_BLOCK_SIZE];
        block[0] = 0x01;
        file.write_all(&block)?;
        file.flush()?;

        self.next_available_block = 1;
        Ok(())
    }

    /// Rewrite the next-available-block header and release the handle.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.seek(SeekFrom::Start(0))?;
            let mut head = [0u8; 4];
            mach::write_4(&mut head, self.next_available_block);
            file.write_all(&head)?;
            file.flush()?;
        }
        Ok(())
    }
}
