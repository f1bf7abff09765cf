//! Snapshot table sources.
//!
//! A [`SnapshotSource`] first makes one cycle's snapshot available
//! ([`prepare`](SnapshotSource::prepare)), then hands out the raw bytes of
//! each table ([`load`](SnapshotSource::load)). The three loads of a cycle
//! run concurrently and only after `prepare` returned, so all of them read
//! the same archive. `prepare` fails with [`FeedError::Decode`] when any of
//! the three configured files is missing.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use obs_core::config::SnapshotFiles;
use obs_core::{FeedError, TableKind};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::transport;

/// Provider of the three raw snapshot tables.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Make the current snapshot available (download, unpack, ...).
    async fn prepare(&self) -> Result<(), FeedError>;
    /// Raw bytes of one table of the prepared snapshot.
    async fn load(&self, table: TableKind) -> Result<Vec<u8>, FeedError>;
}

fn file_name(files: &SnapshotFiles, table: TableKind) -> &str {
    match table {
        TableKind::Currencies => &files.currencies,
        TableKind::Exchangers => &files.exchangers,
        TableKind::Rates => &files.rates,
    }
}

async fn read_table(dir: &Path, files: &SnapshotFiles, table: TableKind) -> Result<Vec<u8>, FeedError> {
    let path = dir.join(file_name(files, table));
    tokio::fs::read(&path)
        .await
        .map_err(|e| FeedError::Transport(format!("reading {table} table {}: {e}", path.display())))
}

/// Every configured table file must exist under `dir`.
async fn check_tables(dir: &Path, files: &SnapshotFiles) -> Result<(), FeedError> {
    for table in [TableKind::Currencies, TableKind::Exchangers, TableKind::Rates] {
        let name = file_name(files, table);
        let present = tokio::fs::metadata(dir.join(name)).await.map(|m| m.is_file()).unwrap_or(false);
        if !present {
            return Err(FeedError::Decode(format!("snapshot has no {table} table ({name})")));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// HttpArchiveSource
// ---------------------------------------------------------------------------

/// Downloads the zip archive each cycle and unpacks it into a fresh
/// directory under `work_dir`. Only the last successfully prepared
/// directory is readable; it is removed when the next cycle prepares.
pub struct HttpArchiveSource {
    http: reqwest::Client,
    url: String,
    work_dir: PathBuf,
    files: SnapshotFiles,
    current: Mutex<Option<TempDir>>,
}

impl HttpArchiveSource {
    /// `timeout` bounds the whole download.
    pub fn new(url: String, work_dir: PathBuf, files: SnapshotFiles, timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Config(format!("building http client: {e}")))?;
        Ok(Self { http, url, work_dir, files, current: Mutex::new(None) })
    }

    async fn download(&self) -> Result<Vec<u8>, FeedError> {
        let resp = self.http.get(&self.url).send().await.map_err(|e| transport("archive request", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Transport(format!("archive request: status {status}")));
        }
        let body = resp.bytes().await.map_err(|e| transport("archive body", e))?;
        Ok(body.to_vec())
    }

    /// Swap the prepared snapshot. The replaced directory is deleted on drop.
    fn set_current(&self, dir: Option<TempDir>) -> Result<(), FeedError> {
        let mut current = self.current.lock().map_err(|_| FeedError::Task("snapshot slot poisoned".into()))?;
        *current = dir;
        Ok(())
    }

    fn current_dir(&self) -> Result<PathBuf, FeedError> {
        let current = self.current.lock().map_err(|_| FeedError::Task("snapshot slot poisoned".into()))?;
        current
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| FeedError::Transport("no snapshot prepared".into()))
    }
}

#[async_trait]
impl SnapshotSource for HttpArchiveSource {
    async fn prepare(&self) -> Result<(), FeedError> {
        // The previous cycle's tables must never be served again.
        self.set_current(None)?;

        let archive = self.download().await?;
        debug!("[bestchange] downloaded {} bytes from {}", archive.len(), self.url);

        let work_dir = self.work_dir.clone();
        let dir = tokio::task::spawn_blocking(move || unpack_fresh(&archive, &work_dir))
            .await
            .map_err(|e| FeedError::Task(format!("unpack task: {e}")))??;
        check_tables(dir.path(), &self.files).await?;

        info!("[bestchange] snapshot unpacked into {}", dir.path().display());
        self.set_current(Some(dir))
    }

    async fn load(&self, table: TableKind) -> Result<Vec<u8>, FeedError> {
        let dir = self.current_dir()?;
        read_table(&dir, &self.files, table).await
    }
}

/// Unpack `archive` into a new, empty directory under `work_dir`.
pub fn unpack_fresh(archive: &[u8], work_dir: &Path) -> Result<TempDir, FeedError> {
    std::fs::create_dir_all(work_dir)?;
    let dir = tempfile::Builder::new().prefix("snapshot-").tempdir_in(work_dir)?;
    let written = unpack(archive, dir.path())?;
    debug!("[bestchange] unpacked {written} file(s)");
    Ok(dir)
}

/// Extract every file of a zip archive under `dest`. Entries whose path
/// would escape `dest` are skipped. Returns the number of files written.
pub fn unpack(archive: &[u8], dest: &Path) -> Result<usize, FeedError> {
    std::fs::create_dir_all(dest)?;
    let mut zip = ZipArchive::new(Cursor::new(archive)).map_err(|e| FeedError::Decode(format!("archive: {e}")))?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| FeedError::Decode(format!("archive entry {i}: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            warn!("[bestchange] skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };

        let path = dest.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&path)?;
        std::io::copy(&mut entry, &mut out)?;
        written += 1;
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// DirectorySource
// ---------------------------------------------------------------------------

/// Reads an already-unpacked snapshot directory.
pub struct DirectorySource {
    dir: PathBuf,
    files: SnapshotFiles,
}

impl DirectorySource {
    pub fn new(dir: PathBuf, files: SnapshotFiles) -> Self {
        Self { dir, files }
    }
}

#[async_trait]
impl SnapshotSource for DirectorySource {
    async fn prepare(&self) -> Result<(), FeedError> {
        if !tokio::fs::try_exists(&self.dir).await? {
            return Err(FeedError::Transport(format!("snapshot dir {} does not exist", self.dir.display())));
        }
        check_tables(&self.dir, &self.files).await
    }

    async fn load(&self, table: TableKind) -> Result<Vec<u8>, FeedError> {
        read_table(&self.dir, &self.files, table).await
    }
}
