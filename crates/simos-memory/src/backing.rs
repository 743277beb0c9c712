//! Backing store for evicted pages
//!
//! The memory manager is generic over this trait so the paging logic can be
//! exercised in tests without touching the filesystem. `FileBackingStore`
//! is the production implementation: an append-only text log, one record
//! per eviction:
//!
//! ```text
//! EVICTED: Process=p001 Page=3 Frame=7
//! 00 1f 2a ... (16 hex bytes per line)
//!
//! ```
//!
//! Readers scan the whole log; the latest record for a `(pid, vpn)` pair
//! wins. The format is deliberately inspectable.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use simos_core::Pid;

/// Persistent storage for evicted page contents.
pub trait BackingStore {
    /// Append the contents of an evicted page.
    fn persist(&mut self, pid: Pid, vpn: u32, frame: usize, data: &[u8]);

    /// Fill `buf` with the latest stored contents for `(pid, vpn)`.
    ///
    /// Returns `false` when no record exists (the caller zero-fills).
    fn load(&mut self, pid: Pid, vpn: u32, buf: &mut [u8]) -> bool;
}

/// Append-only text-log backing store.
pub struct FileBackingStore {
    path: PathBuf,
    // Serializes file writes and the scan-on-load against them.
    file_lock: Mutex<()>,
}

impl FileBackingStore {
    /// Create (truncating any previous run's log) a backing store at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::create(&path)?;
        writeln!(file, "SimOS backing store")?;
        Ok(Self {
            path,
            file_lock: Mutex::new(()),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_record_header(line: &str) -> Option<(Pid, u32)> {
        let rest = line.strip_prefix("EVICTED: ")?;
        let mut pid = None;
        let mut vpn = None;
        for field in rest.split_whitespace() {
            if let Some(p) = field.strip_prefix("Process=p") {
                pid = p.parse::<u64>().ok().map(Pid);
            } else if let Some(v) = field.strip_prefix("Page=") {
                vpn = v.parse::<u32>().ok();
            }
        }
        Some((pid?, vpn?))
    }
}

impl BackingStore for FileBackingStore {
    fn persist(&mut self, pid: Pid, vpn: u32, frame: usize, data: &[u8]) {
        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut record = format!("EVICTED: Process={} Page={} Frame={}\n", pid, vpn, frame);
        for (i, byte) in data.iter().enumerate() {
            record.push_str(&format!("{:02x}", byte));
            if (i + 1) % 16 == 0 {
                record.push('\n');
            } else {
                record.push(' ');
            }
        }
        if data.len() % 16 != 0 {
            record.push('\n');
        }
        record.push('\n');

        let result = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(record.as_bytes()));
        if let Err(e) = result {
            log::warn!("backing store append failed for {} page {}: {}", pid, vpn, e);
        }
    }

    fn load(&mut self, pid: Pid, vpn: u32, buf: &mut [u8]) -> bool {
        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("backing store open failed: {}", e);
                return false;
            }
        };

        // Last record for (pid, vpn) wins.
        let mut latest: Option<Vec<u8>> = None;
        let mut current: Option<Vec<u8>> = None;

        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };

            if let Some((record_pid, record_vpn)) = Self::parse_record_header(&line) {
                if let Some(done) = current.take() {
                    latest = Some(done);
                }
                if record_pid == pid && record_vpn == vpn {
                    current = Some(Vec::with_capacity(buf.len()));
                }
                continue;
            }

            if let Some(bytes) = current.as_mut() {
                if line.trim().is_empty() {
                    latest = current.take();
                    continue;
                }
                for token in line.split_whitespace() {
                    if let Ok(byte) = u8::from_str_radix(token, 16) {
                        bytes.push(byte);
                    }
                }
                if bytes.len() >= buf.len() {
                    latest = current.take();
                }
            }
        }
        if let Some(done) = current.take() {
            latest = Some(done);
        }

        match latest {
            Some(bytes) if bytes.len() >= buf.len() => {
                buf.copy_from_slice(&bytes[..buf.len()]);
                true
            }
            _ => false,
        }
    }
}

/// In-memory backing store for tests.
#[derive(Default)]
pub struct MemBackingStore {
    pages: BTreeMap<(Pid, u32), Vec<u8>>,
}

impl MemBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct `(pid, vpn)` pages currently stored.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl BackingStore for MemBackingStore {
    fn persist(&mut self, pid: Pid, vpn: u32, _frame: usize, data: &[u8]) {
        self.pages.insert((pid, vpn), data.to_vec());
    }

    fn load(&mut self, pid: Pid, vpn: u32, buf: &mut [u8]) -> bool {
        match self.pages.get(&(pid, vpn)) {
            Some(bytes) if bytes.len() >= buf.len() => {
                buf.copy_from_slice(&bytes[..buf.len()]);
                true
            }
            _ => false,
        }
    }
}
