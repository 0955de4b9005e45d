//! Append-only CSV record sink.
//!
//! Each [`ArticleBatch`] is encoded in memory and handed to the file in one
//! write, then flushed and `fsync`ed before [`CsvSink::append`] returns. A
//! failed write is rolled back to the previous file length, so a batch is
//! either wholly present or absent.
//!
//! # Startup Modes
//!
//! - **Fresh**: no file, or an empty one. The header row goes out with the
//!   first batch.
//! - **Resume**: the file has content. It is opened for appending and the
//!   header is never rewritten. A missing trailing newline (left by an
//!   interrupted writer) is repaired before the first batch.
//!
//! In resume mode the existing header decides the column order of appended
//! rows, so stores written by older layouts (e.g. `url,title,text,topic,tags`)
//! stay readable by name. Columns the file lacks are dropped; unknown columns
//! are left empty. A header without a `url` column is refused.

use crate::error::StorageError;
use crate::models::{ArticleBatch, CSV_HEADER};
use csv::StringRecord;
use itertools::Itertools;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

/// How the sink found its file at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Fresh,
    Resume,
}

/// Durable, append-only writer for [`ArticleBatch`]es.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    file: File,
    mode: SinkMode,
    header_pending: bool,
    newline_pending: bool,
    len: u64,
    written: usize,
    /// For each file column, the index into [`CSV_HEADER`] it holds.
    layout: Vec<Option<usize>>,
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl CsvSink {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Io`] if the file cannot be inspected or opened
    /// - [`StorageError::Csv`] if an existing header cannot be read
    /// - [`StorageError::Header`] if an existing header has no `url` column
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let io_err = |source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        };

        let len = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(io_err(e)),
        };

        let newline_pending = if len > 0 {
            !ends_with_newline(path, len).await.map_err(io_err)?
        } else {
            false
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(io_err)?;

        let mode = if len == 0 { SinkMode::Fresh } else { SinkMode::Resume };
        let layout = match mode {
            SinkMode::Fresh => (0..CSV_HEADER.len()).map(Some).collect(),
            SinkMode::Resume => {
                let header = read_header(path).await?;
                column_layout(&header).ok_or_else(|| StorageError::Header {
                    path: path.to_path_buf(),
                    found: header.iter().join(","),
                })?
            }
        };
        if !is_canonical(&layout) {
            let missing: Vec<&str> = CSV_HEADER
                .iter()
                .enumerate()
                .filter(|(i, _)| !layout.contains(&Some(*i)))
                .map(|(_, name)| *name)
                .collect();
            warn!(?missing, "Output uses a different column layout; appending in its order");
        }
        if newline_pending {
            warn!("Output does not end with a newline; it will be repaired before appending");
        }
        info!(?mode, bytes = len, "Opened record sink");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mode,
            header_pending: len == 0,
            newline_pending,
            len,
            written: 0,
            layout,
            #[cfg(test)]
            fail_after: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> SinkMode {
        self.mode
    }

    /// Durably append every record of `batch` as one unit.
    ///
    /// An empty batch writes nothing, not even the header.
    ///
    /// # Errors
    ///
    /// [`StorageError`] if encoding or writing fails. The file is truncated
    /// back to its previous length first.
    #[instrument(level = "info", skip_all, fields(date = %batch.date, records = batch.len()))]
    pub async fn append(&mut self, batch: &ArticleBatch) -> Result<usize, StorageError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let buf = self.encode(batch).map_err(|source| StorageError::Csv {
            path: self.path.clone(),
            source,
        })?;

        if let Err(source) = self.write_durably(&buf).await {
            if let Err(e) = self.file.set_len(self.len).await {
                warn!(error = %e, "Could not roll back partial batch");
            }
            return Err(StorageError::Io {
                path: self.path.clone(),
                source,
            });
        }

        self.len += buf.len() as u64;
        self.header_pending = false;
        self.newline_pending = false;
        self.written += batch.len();
        debug!(bytes = buf.len(), total = self.written, "Appended batch");
        Ok(batch.len())
    }

    /// Flush and sync, then release the file.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] if the final sync fails.
    pub async fn close(mut self) -> Result<usize, StorageError> {
        let result = async {
            self.file.flush().await?;
            self.file.sync_all().await
        }
        .await;
        result.map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), records = self.written, "Closed record sink");
        Ok(self.written)
    }

    fn encode(&self, batch: &ArticleBatch) -> Result<Vec<u8>, csv::Error> {
        let mut buf = Vec::new();
        if self.newline_pending {
            buf.push(b'\n');
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(buf);
        if self.header_pending {
            writer.write_record(CSV_HEADER)?;
        }
        for record in batch.records() {
            let row = record.to_row();
            writer.write_record(
                self.layout
                    .iter()
                    .map(|col| col.map_or("", |i| row[i].as_str())),
            )?;
        }
        writer.into_inner().map_err(|e| e.into_error().into())
    }

    async fn write_durably(&mut self, buf: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(limit) = self.fail_after.take() {
            self.file.write_all(&buf[..limit.min(buf.len())]).await?;
            self.file.flush().await?;
            return Err(io::Error::other("short write"));
        }
        self.file.write_all(buf).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }
}

/// First record of the file at `path`, read as the header.
async fn read_header(path: &Path) -> Result<StringRecord, StorageError> {
    let owned = path.to_path_buf();
    let joined = tokio::task::spawn_blocking(move || {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&owned)?;
        let mut header = StringRecord::new();
        rdr.read_record(&mut header)?;
        Ok::<_, csv::Error>(header)
    })
    .await;
    match joined {
        Ok(header) => header.map_err(|source| StorageError::Csv {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) => Err(StorageError::Io {
            path: path.to_path_buf(),
            source: io::Error::other(e),
        }),
    }
}

/// Map each column of `header` to a field of [`CSV_HEADER`]; `None` without a `url` column.
fn column_layout(header: &StringRecord) -> Option<Vec<Option<usize>>> {
    let layout: Vec<Option<usize>> = header
        .iter()
        .map(|name| CSV_HEADER.iter().position(|field| *field == name.trim()))
        .collect();
    let url = CSV_HEADER.iter().position(|field| *field == "url");
    layout.contains(&url).then_some(layout)
}

fn is_canonical(layout: &[Option<usize>]) -> bool {
    layout.len() == CSV_HEADER.len() && layout.iter().enumerate().all(|(i, col)| *col == Some(i))
}

async fn ends_with_newline(path: &Path, len: u64) -> io::Result<bool> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}
