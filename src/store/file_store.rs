//! Single-file durable tree store
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("CSMT_LOG")
//!   - version: 4 bytes (u32 LE)
//!   - reserved: 52 bytes
//!
//! [RECORDS: variable]
//!   - framed records (see `record.rs`), appended in commit order
//!   - each commit is a run of Node records closed by one Commit record
//! ```
//!
//! On open the log is replayed into an in-memory index of node offsets.
//! Node records only count once the Commit record that follows them has been
//! read back intact. A partial or damaged frame with no intact commit after
//! it is a torn write and is cut off. A damaged frame that an intact commit
//! follows is corruption of durable data, and the open fails with the file
//! left untouched.

use crate::config::StoreConfig;
use crate::model::Hash;
use crate::store::overlay::{StagedTransaction, WriteSet};
use crate::store::record::{CommitRecord, Frame, Record, RecordKind};
use crate::store::{TreeDb, TreeRead, TreeWrite};
use crate::trie::{empty_root, Node};
use crate::{Error, Result, MAGIC, VERSION};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HEADER_SIZE: u64 = 64;

/// Location of a node record in the file
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// Committed state: node index, root and append position
struct FileState {
    index: HashMap<Hash, IndexEntry>,
    root: Hash,
    write_offset: u64,
}

impl FileState {
    fn empty() -> Self {
        FileState {
            index: HashMap::new(),
            root: empty_root(),
            write_offset: HEADER_SIZE,
        }
    }
}

/// Read view over a [`FileTreeDb`]
struct FileView<'a> {
    file: &'a Mutex<File>,
    state: &'a FileState,
}

impl TreeRead for FileView<'_> {
    fn get_node(&self, hash: &Hash) -> Result<Node> {
        let entry = self
            .state
            .index
            .get(hash)
            .copied()
            .ok_or(Error::NotFound(*hash))?;

        let frame = read_frame(&mut self.file.lock(), entry)?;
        let record = match Record::read_from(&mut frame.as_slice(), frame.len() as u64)? {
            Frame::Record(record, _) => record,
            Frame::End | Frame::Short => {
                return Err(Error::Corruption(format!("Short record for node {}", hash)))
            }
        };
        if record.kind != RecordKind::Node {
            return Err(Error::Corruption(format!(
                "Expected Node record for {}, got {:?}",
                hash, record.kind
            )));
        }
        Node::from_bytes(&record.data, hash)
    }

    fn root(&self) -> Result<Hash> {
        Ok(self.state.root)
    }

    fn node_hashes(&self) -> Result<Vec<Hash>> {
        Ok(self.state.index.keys().copied().collect())
    }
}

/// A tree store backed by a single append-only file
pub struct FileTreeDb {
    /// Path to the database file
    path: PathBuf,
    config: StoreConfig,
    /// The file handle
    file: Mutex<File>,
    /// Index, root and append position
    state: RwLock<FileState>,
    /// Serializes write transactions and compaction
    writer: Mutex<()>,
}

impl FileTreeDb {
    /// Create a new database file with default config
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_config(path, StoreConfig::default())
    }

    /// Create a new database file, truncating any existing one
    pub fn create_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(&header())?;
        file.sync_all()?;

        debug!(path = %path.display(), "Created tree database");

        Ok(FileTreeDb {
            path,
            config,
            file: Mutex::new(file),
            state: RwLock::new(FileState::empty()),
            writer: Mutex::new(()),
        })
    }

    /// Open an existing database file with default config
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Open an existing database file and replay its log
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::InvalidFile("File too short for header".into())
            } else {
                Error::Io(e)
            }
        })?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&header[8..12]);
        let version = u32::from_le_bytes(version_bytes);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let file_len = file.seek(SeekFrom::End(0))?;
        let state = replay(&mut file, file_len)?;

        if state.write_offset < file_len {
            warn!(
                path = %path.display(),
                committed = state.write_offset,
                file_len,
                "Truncating uncommitted tail of tree log"
            );
            file.set_len(state.write_offset)?;
            file.sync_all()?;
        }

        debug!(
            path = %path.display(),
            nodes = state.index.len(),
            root = %state.root,
            "Opened tree database"
        );

        Ok(FileTreeDb {
            path,
            config,
            file: Mutex::new(file),
            state: RwLock::new(state),
            writer: Mutex::new(()),
        })
    }

    /// Open or create a database file
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_or_create_with_config(path, StoreConfig::default())
    }

    /// Open or create a database file with the given config
    pub fn open_or_create_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open_with_config(path, config)
        } else {
            Self::create_with_config(path, config)
        }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of indexed nodes
    pub fn node_count(&self) -> usize {
        self.state.read().index.len()
    }

    /// Bytes of log in use (header plus committed records)
    pub fn log_len(&self) -> u64 {
        self.state.read().write_offset
    }

    /// Rewrite the file with only the indexed nodes and the current root.
    ///
    /// Returns the number of bytes reclaimed. Views and writers wait for the
    /// rewrite; the new file replaces the old one by rename.
    pub fn compact(&self) -> Result<u64> {
        let _writer = self.writer.lock();
        let mut state = self.state.write();
        let mut file = self.file.lock();

        let tmp_path = self.path.with_extension("compact");
        let mut out = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        out.write_all(&header())?;

        // Sort by hash for determinism
        let mut entries: Vec<_> = state.index.iter().map(|(h, e)| (*h, *e)).collect();
        entries.sort_by_key(|(h, _)| *h);

        let mut index = HashMap::with_capacity(entries.len());
        let mut offset = HEADER_SIZE;
        for (hash, entry) in entries {
            let frame = read_frame(&mut file, entry)?;
            out.write_all(&frame)?;
            index.insert(
                hash,
                IndexEntry {
                    offset,
                    size: entry.size,
                },
            );
            offset += u64::from(entry.size);
        }

        let commit = CommitRecord {
            root: state.root,
            deleted: Vec::new(),
        };
        let frame = Record::new(RecordKind::Commit, bincode::serialize(&commit)?)
            .encode(self.config.compression_level)?;
        out.write_all(&frame)?;
        out.sync_all()?;
        let new_len = offset + frame.len() as u64;

        std::fs::rename(&tmp_path, &self.path)?;

        let reclaimed = state.write_offset.saturating_sub(new_len);
        *file = out;
        state.index = index;
        state.write_offset = new_len;

        debug!(
            path = %self.path.display(),
            nodes = state.index.len(),
            reclaimed,
            "Compacted tree database"
        );

        Ok(reclaimed)
    }

    /// Append a staged write set as one commit
    fn commit(&self, writes: WriteSet) -> Result<()> {
        let (base, current_root) = {
            let state = self.state.read();
            (state.write_offset, state.root)
        };
        let level = self.config.compression_level;

        let mut buf = Vec::new();
        let mut entries = Vec::with_capacity(writes.nodes.len());
        for node in writes.nodes.values() {
            let frame = Record::new(RecordKind::Node, node.to_bytes()?).encode(level)?;
            entries.push((
                node.hash(),
                IndexEntry {
                    offset: base + buf.len() as u64,
                    size: frame.len() as u32,
                },
            ));
            buf.extend(frame);
        }

        let root = writes.root.unwrap_or(current_root);
        let deleted: Vec<Hash> = writes.deleted.into_iter().collect();
        let commit = CommitRecord {
            root,
            deleted: deleted.clone(),
        };
        buf.extend(Record::new(RecordKind::Commit, bincode::serialize(&commit)?).encode(level)?);

        {
            let mut file = self.file.lock();
            if let Err(e) = append_at(&mut file, base, &buf, self.config.sync_on_commit) {
                // Drop the partial tail so the next commit starts clean
                if let Err(truncate) = file.set_len(base) {
                    warn!(
                        path = %self.path.display(),
                        offset = base,
                        error = %truncate,
                        "Failed to truncate partial commit"
                    );
                }
                return Err(e.into());
            }
        }

        let mut state = self.state.write();
        state.index.extend(entries);
        for hash in &deleted {
            state.index.remove(hash);
        }
        state.root = root;
        state.write_offset = base + buf.len() as u64;

        debug!(
            root = %root,
            written = buf.len(),
            deleted = deleted.len(),
            "Committed tree transaction"
        );
        Ok(())
    }
}

impl TreeDb for FileTreeDb {
    fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&dyn TreeRead) -> std::result::Result<T, E>,
    {
        let state = self.state.read();
        f(&FileView {
            file: &self.file,
            state: &state,
        })
    }

    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut dyn TreeWrite) -> std::result::Result<T, E>,
    {
        let _writer = self.writer.lock();

        let (out, writes) = {
            let state = self.state.read();
            let view = FileView {
                file: &self.file,
                state: &state,
            };
            let mut tx = StagedTransaction::new(&view);
            let out = f(&mut tx)?;
            (out, tx.into_writes())
        };

        if !writes.is_empty() {
            self.commit(writes)?;
        }
        Ok(out)
    }
}

impl Drop for FileTreeDb {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.file.lock().sync_all();
    }
}

fn header() -> [u8; HEADER_SIZE as usize] {
    let mut header = [0u8; HEADER_SIZE as usize];
    header[0..8].copy_from_slice(MAGIC);
    header[8..12].copy_from_slice(&VERSION.to_le_bytes());
    header
}

fn read_frame(file: &mut File, entry: IndexEntry) -> Result<Vec<u8>> {
    let mut frame = vec![0u8; entry.size as usize];
    file.seek(SeekFrom::Start(entry.offset))?;
    file.read_exact(&mut frame)?;
    Ok(frame)
}

fn append_at(file: &mut File, offset: u64, buf: &[u8], sync: bool) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}

/// Rebuild committed state from the records after the header
fn replay(file: &mut File, file_len: u64) -> Result<FileState> {
    file.seek(SeekFrom::Start(HEADER_SIZE))?;
    let mut reader = BufReader::new(&mut *file);

    let mut state = FileState::empty();
    let mut pending = Vec::new();
    let mut offset = HEADER_SIZE;

    loop {
        let remaining = file_len.saturating_sub(offset);
        let reason = match Record::read_from(&mut reader, remaining) {
            Ok(Frame::Record(record, len)) => {
                match record.kind {
                    RecordKind::Node => {
                        let node: Node = bincode::deserialize(&record.data)?;
                        pending.push((
                            node.hash(),
                            IndexEntry {
                                offset,
                                size: len as u32,
                            },
                        ));
                    }
                    RecordKind::Commit => {
                        let commit: CommitRecord = bincode::deserialize(&record.data)?;
                        state.index.extend(pending.drain(..));
                        for hash in &commit.deleted {
                            state.index.remove(hash);
                        }
                        state.root = commit.root;
                        state.write_offset = offset + len;
                    }
                }
                offset += len;
                continue;
            }
            Ok(Frame::End) => break,
            Ok(Frame::Short) => "partial record".to_string(),
            Err(Error::Corruption(reason)) => reason,
            Err(e) => return Err(e),
        };

        drop(reader);
        if let Some(commit_at) = find_commit(file, offset + 1, file_len)? {
            return Err(Error::Corruption(format!(
                "Unreadable record at offset {} ({}) is followed by a commit at offset {}",
                offset, reason, commit_at
            )));
        }
        warn!(offset, %reason, "Tree log ends in an unreadable record");
        break;
    }

    Ok(state)
}

/// Offset of the first intact Commit record starting at or after `from`
fn find_commit(file: &mut File, from: u64, file_len: u64) -> Result<Option<u64>> {
    if from >= file_len {
        return Ok(None);
    }
    let mut tail = Vec::new();
    file.seek(SeekFrom::Start(from))?;
    (&mut *file).take(file_len - from).read_to_end(&mut tail)?;

    let commit = RecordKind::Commit.as_byte();
    let found = tail
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte == commit)
        .map(|(start, _)| start)
        .find(|&start| {
            let mut candidate = &tail[start..];
            let remaining = candidate.len() as u64;
            matches!(
                Record::read_from(&mut candidate, remaining),
                Ok(Frame::Record(record, _))
                    if record.kind == RecordKind::Commit
                        && bincode::deserialize::<CommitRecord>(&record.data).is_ok()
            )
        });
    Ok(found.map(|start| from + start as u64))
}
