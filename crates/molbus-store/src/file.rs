use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use molbus_protocol::packet::MAX_BODY_LEN;

use crate::{MessageStore, StoreError};

/// Durable, file-backed [`MessageStore`]: `<session>.events.dat` (framed
/// message log) paired with `<session>.index.dat` (one `i64` byte offset
/// per stored message).
pub struct FileMessageStore {
    messages: File,
    index: File,
    messages_path: PathBuf,
    index_path: PathBuf,
    body_len: u64,
    count: u64,
    scratch: Box<[u8; MAX_BODY_LEN]>,
}

impl FileMessageStore {
    /// Opens (creating and truncating) the two files for `session_name`
    /// under `dir`.
    pub fn open(dir: &Path, session_name: &str) -> Result<Self, StoreError> {
        let messages_path = dir.join(format!("{session_name}.events.dat"));
        let index_path = dir.join(format!("{session_name}.index.dat"));
        let messages = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&messages_path)?;
        let index = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&index_path)?;
        Ok(Self {
            messages,
            index,
            messages_path,
            index_path,
            body_len: 0,
            count: 0,
            scratch: Box::new([0u8; MAX_BODY_LEN]),
        })
    }

    /// Re-opens an existing pair of files without truncating, replaying
    /// the index to recover `count`/`body_len` — used when a sequencer
    /// restarts against a session it already has history for.
    pub fn reopen(dir: &Path, session_name: &str) -> Result<Self, StoreError> {
        let messages_path = dir.join(format!("{session_name}.events.dat"));
        let index_path = dir.join(format!("{session_name}.index.dat"));
        let messages = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&messages_path)?;
        let mut index = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&index_path)?;
        let index_len = index.seek(SeekFrom::End(0))?;
        let count = index_len / 8;
        let body_len = messages.metadata()?.len();
        Ok(Self {
            messages,
            index,
            messages_path,
            index_path,
            body_len,
            count,
            scratch: Box::new([0u8; MAX_BODY_LEN]),
        })
    }

    fn index_entry(&mut self, seq_1based: u64) -> Result<u64, StoreError> {
        let mut buf = [0u8; 8];
        self.index
            .seek(SeekFrom::Start((seq_1based - 1) * 8))?;
        self.index.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn record_bounds(&mut self, seq: u64) -> Result<(u64, u64), StoreError> {
        if seq < 1 || seq > self.count {
            return Err(StoreError::OutOfRange { seq, count: self.count });
        }
        let start = self.index_entry(seq)?;
        let end = if seq == self.count {
            self.body_len
        } else {
            self.index_entry(seq + 1)?
        };
        Ok((start, end))
    }
}

impl MessageStore for FileMessageStore {
    fn acquire(&mut self) -> &mut [u8; MAX_BODY_LEN] {
        &mut self.scratch
    }

    fn commit(&mut self, lengths: &[u16], index: usize, count: usize) -> Result<(), StoreError> {
        let mut scratch_offset: usize = lengths[..index]
            .iter()
            .map(|l| 2 + *l as usize)
            .sum();
        self.messages.seek(SeekFrom::End(0))?;
        self.index.seek(SeekFrom::End(0))?;
        for &len in &lengths[index..index + count] {
            let rec_len = 2 + len as usize;
            let record = &self.scratch[scratch_offset..scratch_offset + rec_len];
            self.messages.write_all(record)?;
            self.index.write_all(&self.body_len.to_be_bytes())?;
            self.body_len += rec_len as u64;
            self.count += 1;
            scratch_offset += rec_len;
        }
        self.messages.sync_data()?;
        self.index.sync_data()?;
        Ok(())
    }

    fn read(&mut self, dst: &mut [u8], dst_index: usize, seq: u64) -> Result<usize, StoreError> {
        let (start, end) = self.record_bounds(seq)?;
        let body_start = start + 2;
        let body_len = (end - body_start) as usize;
        if dst.len() - dst_index < body_len {
            return Err(StoreError::DestinationTooSmall {
                need: body_len,
                have: dst.len() - dst_index,
            });
        }
        self.messages.seek(SeekFrom::Start(body_start))?;
        self.messages
            .read_exact(&mut dst[dst_index..dst_index + body_len])?;
        Ok(body_len)
    }

    fn read_range_framed(
        &mut self,
        dst: &mut [u8],
        seq_start: u64,
        max_count: u16,
    ) -> Result<(usize, u16), StoreError> {
        if seq_start < 1 || seq_start > self.count {
            return Err(StoreError::OutOfRange { seq: seq_start, count: self.count });
        }
        let first_offset = self.index_entry(seq_start)?;
        self.messages.seek(SeekFrom::Start(first_offset))?;
        let mut written = 0usize;
        let mut packed = 0u16;
        let mut seq = seq_start;
        while packed < max_count && seq <= self.count {
            let (start, end) = self.record_bounds(seq)?;
            let rec_len = (end - start) as usize;
            if written + rec_len > dst.len() {
                break;
            }
            self.messages.seek(SeekFrom::Start(start))?;
            self.messages
                .read_exact(&mut dst[written..written + rec_len])?;
            written += rec_len;
            packed += 1;
            seq += 1;
        }
        Ok((written, packed))
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.messages.sync_all()?;
        self.index.sync_all()?;
        tracing::debug!(
            messages = %self.messages_path.display(),
            index = %self.index_path.display(),
            "message store closed"
        );
        Ok(())
    }
}
