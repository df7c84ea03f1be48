//! SD card block device
//!
//! A byte-streamed file/directory device behind six ports (command, status,
//! data, filename, seek-low, seek-high). Firmwares spell out a filename one
//! byte at a time, issue a command, then pump bytes through the data port
//! while the status register's data bit stays up.
//!
//! Host-side file and directory access goes through the [`StorageBackend`]
//! trait: [`DiskBackend`] maps the device onto a host directory,
//! [`MemBackend`] keeps everything in memory for tests and sandboxed runs.
//! Backend failures never escape the device; they latch the status error bit
//! and leave the handle closed.

use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use log::debug;
use thiserror::Error;

/// Command bytes accepted at the command port
pub mod cmd {
    /// Open the named file for reading
    pub const OPEN_READ: u8 = 0x01;
    /// Create the named file, truncating any existing content
    pub const OPEN_CREATE: u8 = 0x02;
    /// Open the named file for writing positioned at the end
    pub const OPEN_APPEND: u8 = 0x03;
    /// Seek the open file back to the start
    pub const REWIND: u8 = 0x04;
    /// Close whatever is open
    pub const CLOSE: u8 = 0x05;
    /// Start streaming the directory listing
    pub const OPEN_DIR: u8 = 0x06;
    /// Open the named file for reading and writing without truncation
    pub const OPEN_RW: u8 = 0x07;
    /// Seek the open file to the latched 16-bit position
    pub const SEEK: u8 = 0x08;
}

/// Status register bits
pub mod status {
    /// Device present and ready
    pub const READY: u8 = 0x01;
    /// Last open/seek/write failed
    pub const ERROR: u8 = 0x02;
    /// The open file or directory can still yield a byte
    pub const DATA: u8 = 0x04;
}

/// Capacity of the filename latch; longer names silently truncate
pub const FNAME_MAX: usize = 32;

/// Errors surfaced by a storage backend.
///
/// These never reach the CPU; the device folds them into the status error
/// bit and logs them.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Named file does not exist
    #[error("file not found: {0}")]
    NotFound(String),
    /// Name is empty or contains path components
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    /// Operation needs an open file and the handle does not match one
    #[error("no matching open file")]
    NotOpen,
    /// Host I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Opaque handle to a file opened through a [`StorageBackend`]
#[derive(Debug, PartialEq, Eq)]
pub struct FileHandle(u32);

/// Host-side storage the SD device delegates to.
///
/// Implementations keep at most one file open at a time; opening a new file
/// through any `open_*` method may assume the device has closed the previous
/// handle first.
pub trait StorageBackend {
    /// Open an existing file for reading
    fn open_read(&mut self, name: &str) -> Result<FileHandle, StorageError>;
    /// Create (or truncate) a file for writing
    fn open_write_trunc(&mut self, name: &str) -> Result<FileHandle, StorageError>;
    /// Open a file for reading and writing, creating it if missing
    fn open_read_write(&mut self, name: &str) -> Result<FileHandle, StorageError>;
    /// Open a file for writing positioned at the end, creating it if missing
    fn open_append(&mut self, name: &str) -> Result<FileHandle, StorageError>;
    /// Close the handle
    fn close(&mut self, handle: FileHandle);
    /// Read the next byte; `None` at end of file
    fn read_byte(&mut self, handle: &FileHandle) -> Option<u8>;
    /// Write a byte at the current position
    fn write_byte(&mut self, handle: &FileHandle, byte: u8) -> Result<(), StorageError>;
    /// Seek to an absolute offset
    fn seek(&mut self, handle: &FileHandle, offset: u32) -> Result<(), StorageError>;
    /// List entry names in the backing directory
    fn list(&mut self) -> Result<Vec<String>, StorageError>;
}

// ========== In-memory backend ==========

#[derive(Debug)]
struct MemOpen {
    id: u32,
    name: String,
    pos: usize,
}

/// In-memory storage backend: a name-to-bytes map
#[derive(Debug, Default)]
pub struct MemBackend {
    files: BTreeMap<String, Vec<u8>>,
    open: Option<MemOpen>,
    next_id: u32,
}

impl MemBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file
    pub fn insert(&mut self, name: &str, data: &[u8]) {
        self.files.insert(name.to_string(), data.to_vec());
    }

    /// Current contents of a file
    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(|v| v.as_slice())
    }

    fn open_at(&mut self, name: &str, pos: usize) -> FileHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.open = Some(MemOpen {
            id,
            name: name.to_string(),
            pos,
        });
        FileHandle(id)
    }

    fn current(&mut self, handle: &FileHandle) -> Option<&mut MemOpen> {
        self.open.as_mut().filter(|o| o.id == handle.0)
    }
}

impl StorageBackend for MemBackend {
    fn open_read(&mut self, name: &str) -> Result<FileHandle, StorageError> {
        if !self.files.contains_key(name) {
            return Err(StorageError::NotFound(name.to_string()));
        }
        Ok(self.open_at(name, 0))
    }

    fn open_write_trunc(&mut self, name: &str) -> Result<FileHandle, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        self.files.insert(name.to_string(), Vec::new());
        Ok(self.open_at(name, 0))
    }

    fn open_read_write(&mut self, name: &str) -> Result<FileHandle, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        self.files.entry(name.to_string()).or_default();
        Ok(self.open_at(name, 0))
    }

    fn open_append(&mut self, name: &str) -> Result<FileHandle, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        let len = self.files.entry(name.to_string()).or_default().len();
        Ok(self.open_at(name, len))
    }

    fn close(&mut self, handle: FileHandle) {
        if self.open.as_ref().is_some_and(|o| o.id == handle.0) {
            self.open = None;
        }
    }

    fn read_byte(&mut self, handle: &FileHandle) -> Option<u8> {
        let open = self.open.as_mut().filter(|o| o.id == handle.0)?;
        let byte = self.files.get(&open.name)?.get(open.pos).copied()?;
        open.pos += 1;
        Some(byte)
    }

    fn write_byte(&mut self, handle: &FileHandle, byte: u8) -> Result<(), StorageError> {
        let open = self.current(handle).ok_or(StorageError::NotOpen)?;
        let (name, pos) = (open.name.clone(), open.pos);
        let data = self.files.get_mut(&name).ok_or(StorageError::NotOpen)?;
        if pos >= data.len() {
            data.resize(pos + 1, 0);
        }
        data[pos] = byte;
        if let Some(open) = self.open.as_mut() {
            open.pos += 1;
        }
        Ok(())
    }

    fn seek(&mut self, handle: &FileHandle, offset: u32) -> Result<(), StorageError> {
        let open = self.current(handle).ok_or(StorageError::NotOpen)?;
        open.pos = offset as usize;
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<String>, StorageError> {
        Ok(self.files.keys().cloned().collect())
    }
}

// ========== Filesystem backend ==========

/// Storage backend over a host directory.
///
/// Names must be plain file names; anything with path components is
/// rejected so firmwares cannot reach outside the root.
pub struct DiskBackend {
    root: PathBuf,
    open: Option<(u32, File)>,
    next_id: u32,
}

impl DiskBackend {
    /// Create a backend rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: None,
            next_id: 0,
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    fn store(&mut self, file: File) -> FileHandle {
        self.next_id += 1;
        self.open = Some((self.next_id, file));
        FileHandle(self.next_id)
    }

    fn current(&mut self, handle: &FileHandle) -> Option<&mut File> {
        match &mut self.open {
            Some((id, file)) if *id == handle.0 => Some(file),
            _ => None,
        }
    }
}

impl StorageBackend for DiskBackend {
    fn open_read(&mut self, name: &str) -> Result<FileHandle, StorageError> {
        let path = self.resolve(name)?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::Io(e),
        })?;
        Ok(self.store(file))
    }

    fn open_write_trunc(&mut self, name: &str) -> Result<FileHandle, StorageError> {
        let path = self.resolve(name)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(self.store(file))
    }

    fn open_read_write(&mut self, name: &str) -> Result<FileHandle, StorageError> {
        let path = self.resolve(name)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(self.store(file))
    }

    fn open_append(&mut self, name: &str) -> Result<FileHandle, StorageError> {
        let path = self.resolve(name)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        file.seek(SeekFrom::End(0))?;
        Ok(self.store(file))
    }

    fn close(&mut self, handle: FileHandle) {
        if self.open.as_ref().is_some_and(|(id, _)| *id == handle.0) {
            self.open = None;
        }
    }

    fn read_byte(&mut self, handle: &FileHandle) -> Option<u8> {
        let file = self.current(handle)?;
        let mut buf = [0u8; 1];
        match file.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }

    fn write_byte(&mut self, handle: &FileHandle, byte: u8) -> Result<(), StorageError> {
        let file = self.current(handle).ok_or(StorageError::NotOpen)?;
        file.write_all(&[byte])?;
        Ok(())
    }

    fn seek(&mut self, handle: &FileHandle, offset: u32) -> Result<(), StorageError> {
        let file = self.current(handle).ok_or(StorageError::NotOpen)?;
        file.seek(SeekFrom::Start(offset as u64))?;
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

// ========== The device itself ==========

/// SD card state machine behind the six device ports
pub struct SdCard {
    backend: Box<dyn StorageBackend>,
    fname: Vec<u8>,
    fname_done: bool,
    seek_pos: u16,
    file: Option<FileHandle>,
    writable: bool,
    dir: Option<VecDeque<u8>>,
    error: bool,
}

impl SdCard {
    /// Create the device over the given backend
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            fname: Vec::with_capacity(FNAME_MAX),
            fname_done: false,
            seek_pos: 0,
            file: None,
            writable: false,
            dir: None,
            error: false,
        }
    }

    /// Reset the device state; the backend and its directory survive
    pub fn reset(&mut self) {
        self.close_all();
        self.fname.clear();
        self.fname_done = false;
        self.seek_pos = 0;
        self.error = false;
    }

    /// Filename port write: append a byte, zero terminates.
    ///
    /// The first byte after a terminator starts a fresh name; overflow
    /// silently truncates.
    pub fn push_fname(&mut self, byte: u8) {
        if self.fname_done {
            self.fname.clear();
            self.fname_done = false;
        }
        if byte == 0 {
            self.fname_done = true;
        } else if self.fname.len() < FNAME_MAX - 1 {
            self.fname.push(byte);
        }
    }

    /// Seek-low port write
    pub fn set_seek_lo(&mut self, value: u8) {
        self.seek_pos = (self.seek_pos & 0xFF00) | value as u16;
    }

    /// Seek-high port write
    pub fn set_seek_hi(&mut self, value: u8) {
        self.seek_pos = (self.seek_pos & 0x00FF) | ((value as u16) << 8);
    }

    /// Command port write
    pub fn command(&mut self, c: u8) {
        self.error = false;
        match c {
            cmd::OPEN_READ => self.open_file(c, false),
            cmd::OPEN_CREATE | cmd::OPEN_APPEND | cmd::OPEN_RW => self.open_file(c, true),
            cmd::REWIND => self.seek_file(0),
            cmd::SEEK => self.seek_file(self.seek_pos as u32),
            cmd::CLOSE => self.close_all(),
            cmd::OPEN_DIR => self.open_dir(),
            other => {
                debug!("sd: unknown command {:#04x}", other);
                self.error = true;
            }
        }
    }

    /// Status port read
    pub fn read_status(&self) -> u8 {
        let mut s = status::READY;
        if self.error {
            s |= status::ERROR;
        }
        if self.data_available() {
            s |= status::DATA;
        }
        s
    }

    /// Data port read: next byte of the open file or directory stream.
    ///
    /// End of stream closes the handle so the status data bit drops.
    pub fn read_data(&mut self) -> u8 {
        if let Some(handle) = &self.file {
            match self.backend.read_byte(handle) {
                Some(byte) => return byte,
                None => {
                    if let Some(handle) = self.file.take() {
                        self.backend.close(handle);
                    }
                    return 0;
                }
            }
        }
        if let Some(dir) = &mut self.dir {
            if let Some(byte) = dir.pop_front() {
                if dir.is_empty() {
                    self.dir = None;
                }
                return byte;
            }
            self.dir = None;
        }
        0
    }

    /// Data port write: append to the open file when writable
    pub fn write_data(&mut self, byte: u8) {
        if !self.writable {
            return;
        }
        if let Some(handle) = &self.file {
            if let Err(e) = self.backend.write_byte(handle, byte) {
                debug!("sd: write failed: {}", e);
                self.error = true;
            }
        }
    }

    fn data_available(&self) -> bool {
        self.file.is_some() || self.dir.as_ref().is_some_and(|d| !d.is_empty())
    }

    fn latched_name(&self) -> String {
        String::from_utf8_lossy(&self.fname).into_owned()
    }

    fn open_file(&mut self, c: u8, writable: bool) {
        self.close_all();
        let name = self.latched_name();
        let result = match c {
            cmd::OPEN_READ => self.backend.open_read(&name),
            cmd::OPEN_CREATE => self.backend.open_write_trunc(&name),
            cmd::OPEN_APPEND => self.backend.open_append(&name),
            _ => self.backend.open_read_write(&name),
        };
        match result {
            Ok(handle) => {
                debug!("sd: opened {:?} (cmd {:#04x})", name, c);
                self.file = Some(handle);
                self.writable = writable;
            }
            Err(e) => {
                debug!("sd: open {:?} failed: {}", name, e);
                self.error = true;
            }
        }
    }

    fn seek_file(&mut self, offset: u32) {
        match &self.file {
            Some(handle) => {
                if let Err(e) = self.backend.seek(handle, offset) {
                    debug!("sd: seek to {} failed: {}", offset, e);
                    self.error = true;
                }
            }
            None => self.error = true,
        }
    }

    fn close_all(&mut self) {
        if let Some(handle) = self.file.take() {
            self.backend.close(handle);
        }
        self.dir = None;
        self.writable = false;
    }

    fn open_dir(&mut self) {
        self.close_all();
        match self.backend.list() {
            Ok(names) => {
                let mut stream = VecDeque::new();
                for name in names {
                    if name == "." || name == ".." {
                        continue;
                    }
                    stream.extend(name.bytes());
                    stream.extend(b"\r\n".iter().copied());
                }
                self.dir = Some(stream);
            }
            Err(e) => {
                debug!("sd: directory listing failed: {}", e);
                self.error = true;
            }
        }
    }
}
