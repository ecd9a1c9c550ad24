use crc32fast::Hasher;
use govsearch_core::error::{ErrorCode, GovsearchError};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

const HEADER_LEN: u64 = 16;

#[derive(Error, Debug)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Data integrity error (CRC mismatch) at LSN {0}")]
    CrcMismatch(u64),
    #[error("Corrupt entry")]
    CorruptEntry,
    #[error("WAL rollback failed earlier; refusing further writes")]
    Poisoned,
}

impl GovsearchError for WalError {
    fn error_code(&self) -> ErrorCode {
        match self {
            WalError::Io(_) => ErrorCode::Unavailable,
            WalError::CrcMismatch(_) => ErrorCode::Internal,
            WalError::CorruptEntry => ErrorCode::Internal,
            WalError::Poisoned => ErrorCode::FailedPrecondition,
        }
    }
}

/// Append-only log. Appended records are staged in memory and reach the file
/// only on [`Wal::flush`]. A failed flush truncates the file back to the last
/// durable length, so a write reported as failed is never replayed.
pub struct Wal {
    file: File,
    pending: Vec<u8>,
    durable_len: u64,
    durable_lsn: u64,
    current_lsn: AtomicU64,
    poisoned: bool,
    #[cfg(test)]
    fail_next_flush: bool,
}

impl Wal {
    /// Open a WAL file, creating it if needed. An existing file is scanned to
    /// recover the last LSN; a torn record at the tail is truncated.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        let (last_lsn, valid_len) = recover_tail(&mut file).await?;

        Ok(Self {
            file,
            pending: Vec::new(),
            durable_len: valid_len,
            durable_lsn: last_lsn,
            current_lsn: AtomicU64::new(last_lsn),
            poisoned: false,
            #[cfg(test)]
            fail_next_flush: false,
        })
    }

    /// Stage an entry and return its LSN.
    /// Format: [LSN: 8 bytes][CRC: 4 bytes][Len: 4 bytes][Payload: Len bytes]
    pub async fn append(&mut self, payload: &[u8]) -> Result<u64, WalError> {
        if self.poisoned {
            return Err(WalError::Poisoned);
        }
        let len = u32::try_from(payload.len()).map_err(|_| WalError::CorruptEntry)?;
        let lsn = self.current_lsn.fetch_add(1, Ordering::SeqCst) + 1;

        let mut hasher = Hasher::new();
        hasher.update(payload);
        let crc = hasher.finalize();

        self.pending.extend_from_slice(&lsn.to_be_bytes());
        self.pending.extend_from_slice(&crc.to_be_bytes());
        self.pending.extend_from_slice(&len.to_be_bytes());
        self.pending.extend_from_slice(payload);

        Ok(lsn)
    }

    /// Write staged entries and fsync. On failure every staged entry is
    /// discarded and the file is cut back to its last durable length.
    pub async fn flush(&mut self) -> Result<(), WalError> {
        if self.poisoned {
            return Err(WalError::Poisoned);
        }
        if self.pending.is_empty() {
            return Ok(());
        }

        match self.write_pending().await {
            Ok(()) => {
                self.durable_len += self.pending.len() as u64;
                self.durable_lsn = self.current_lsn();
                self.pending.clear();
                Ok(())
            }
            Err(err) => {
                self.rollback().await;
                Err(WalError::Io(err))
            }
        }
    }

    pub fn current_lsn(&self) -> u64 {
        self.current_lsn.load(Ordering::SeqCst)
    }

    async fn write_pending(&mut self) -> std::io::Result<()> {
        if self.take_injected_failure() {
            let torn = self.pending.len() / 2;
            self.file.write_all(&self.pending[..torn]).await?;
            self.file.flush().await?;
            return Err(std::io::Error::other("injected write failure"));
        }
        self.file.write_all(&self.pending).await?;
        self.file.flush().await?;
        self.file.sync_all().await
    }

    async fn rollback(&mut self) {
        let discarded = self.pending.len();
        self.pending.clear();
        self.current_lsn.store(self.durable_lsn, Ordering::SeqCst);

        match self.truncate_to_durable().await {
            Ok(()) => tracing::warn!(
                discarded_bytes = discarded,
                durable_len = self.durable_len,
                "WAL write failed, rolled back to last durable record"
            ),
            Err(err) => {
                tracing::error!(
                    error = %err,
                    durable_len = self.durable_len,
                    "WAL rollback failed, refusing further writes"
                );
                self.poisoned = true;
            }
        }
    }

    async fn truncate_to_durable(&mut self) -> std::io::Result<()> {
        self.file.set_len(self.durable_len).await?;
        self.file.seek(std::io::SeekFrom::End(0)).await?;
        self.file.sync_all().await
    }

    #[cfg(test)]
    fn take_injected_failure(&mut self) -> bool {
        std::mem::take(&mut self.fail_next_flush)
    }

    #[cfg(not(test))]
    fn take_injected_failure(&mut self) -> bool {
        false
    }

    /// Make the next flush write half of the staged bytes and then fail.
    #[cfg(test)]
    pub(crate) fn fail_next_flush(&mut self) {
        self.fail_next_flush = true;
    }

    /// Replays the WAL from the beginning, verifying every CRC.
    /// Returns the last valid LSN found.
    pub async fn replay<F>(&mut self, mut callback: F) -> Result<u64, WalError>
    where
        F: FnMut(u64, Vec<u8>) -> Result<(), WalError>,
    {
        self.flush().await?;
        let file = &mut self.file;
        file.seek(std::io::SeekFrom::Start(0)).await?;

        let mut last_lsn = 0;
        let mut valid_end_pos = 0;

        loop {
            let lsn = match file.read_u64().await {
                Ok(v) => v,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            };

            let (crc, len) = match read_header_rest(file).await {
                Ok((crc, len)) => (crc, len as usize),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            };

            let mut payload = vec![0u8; len];
            match file.read_exact(&mut payload).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut hasher = Hasher::new();
            hasher.update(&payload);
            if hasher.finalize() != crc {
                return Err(WalError::CrcMismatch(lsn));
            }

            callback(lsn, payload)?;
            last_lsn = lsn;
            valid_end_pos = file.stream_position().await?;
        }

        if valid_end_pos < file.metadata().await?.len() {
            file.set_len(valid_end_pos).await?;
        }

        file.seek(std::io::SeekFrom::End(0)).await?;
        self.current_lsn.store(last_lsn, Ordering::SeqCst);
        self.durable_lsn = last_lsn;
        self.durable_len = valid_end_pos;

        Ok(last_lsn)
    }
}

async fn read_header_rest(file: &mut File) -> std::io::Result<(u32, u32)> {
    let crc = file.read_u32().await?;
    let len = file.read_u32().await?;
    Ok((crc, len))
}

/// Walk record headers without reading payloads. Returns the last complete LSN
/// and the valid length, truncating anything after the last complete record.
async fn recover_tail(file: &mut File) -> Result<(u64, u64), WalError> {
    let file_len = file.metadata().await?.len();
    file.seek(std::io::SeekFrom::Start(0)).await?;

    let mut pos = 0u64;
    let mut last_lsn = 0u64;

    while pos + HEADER_LEN <= file_len {
        let lsn = file.read_u64().await?;
        let _crc = file.read_u32().await?;
        let len = u64::from(file.read_u32().await?);

        let end = pos + HEADER_LEN + len;
        if end > file_len {
            break;
        }
        file.seek(std::io::SeekFrom::Start(end)).await?;
        last_lsn = lsn;
        pos = end;
    }

    if pos < file_len {
        tracing::warn!(
            valid_bytes = pos,
            file_bytes = file_len,
            "truncating torn WAL tail"
        );
        file.set_len(pos).await?;
    }
    file.seek(std::io::SeekFrom::End(0)).await?;

    Ok((last_lsn, pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_wal_append_and_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let mut wal = Wal::open(&path).await.expect("failed to open wal");

        let entry1 = b"first batch";
        let lsn1 = wal.append(entry1).await.expect("append failed");
        let entry2 = b"second batch";
        let lsn2 = wal.append(entry2).await.expect("append failed");

        assert!(lsn1 > 0);
        assert!(lsn2 > lsn1);

        wal.flush().await.expect("flush failed");

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        assert_eq!(
            metadata.len(),
            (HEADER_LEN * 2) + entry1.len() as u64 + entry2.len() as u64
        );
    }

    #[tokio::test]
    async fn test_wal_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replay.wal");

        {
            let mut wal = Wal::open(&path).await.unwrap();
            wal.append(b"Entry 1").await.unwrap();
            wal.append(b"Entry 2").await.unwrap();
            wal.flush().await.unwrap();
        }

        let mut wal = Wal::open(&path).await.unwrap();
        let mut recovered = Vec::new();

        let last_lsn = wal
            .replay(|lsn, payload| {
                recovered.push((lsn, payload));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(last_lsn, 2);
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0].1, b"Entry 1");
        assert_eq!(recovered[1].1, b"Entry 2");
    }

    #[tokio::test]
    async fn test_open_recovers_lsn_without_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lsn.wal");

        {
            let mut wal = Wal::open(&path).await.unwrap();
            wal.append(b"a").await.unwrap();
            wal.append(b"b").await.unwrap();
            wal.append(b"c").await.unwrap();
            wal.flush().await.unwrap();
        }

        let mut wal = Wal::open(&path).await.unwrap();
        assert_eq!(wal.current_lsn(), 3);
        assert_eq!(wal.append(b"d").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("torn.wal");

        {
            let mut wal = Wal::open(&path).await.unwrap();
            wal.append(b"complete").await.unwrap();
            wal.flush().await.unwrap();
        }

        // Header claiming 64 payload bytes followed by only 3.
        {
            let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
            file.write_u64(2).await.unwrap();
            file.write_u32(0).await.unwrap();
            file.write_u32(64).await.unwrap();
            file.write_all(b"abc").await.unwrap();
            file.flush().await.unwrap();
        }

        let mut wal = Wal::open(&path).await.unwrap();
        assert_eq!(wal.current_lsn(), 1);

        let mut count = 0;
        wal.replay(|_, _| {
            count += 1;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(count, 1);

        let len = tokio::fs::metadata(&path).await.unwrap().len();
        assert_eq!(len, HEADER_LEN + b"complete".len() as u64);
    }

    #[tokio::test]
    async fn test_failed_flush_is_rolled_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rollback.wal");

        {
            let mut wal = Wal::open(&path).await.unwrap();
            assert_eq!(wal.append(b"kept").await.unwrap(), 1);
            wal.flush().await.unwrap();

            assert_eq!(wal.append(b"reported as failed").await.unwrap(), 2);
            wal.fail_next_flush();
            assert!(matches!(wal.flush().await, Err(WalError::Io(_))));
            assert_eq!(wal.current_lsn(), 1);

            // The next successful flush must not carry the failed record.
            assert_eq!(wal.append(b"after failure").await.unwrap(), 2);
            wal.flush().await.unwrap();
        }

        let mut wal = Wal::open(&path).await.unwrap();
        let mut recovered = Vec::new();
        wal.replay(|lsn, payload| {
            recovered.push((lsn, payload));
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(
            recovered,
            vec![(1, b"kept".to_vec()), (2, b"after failure".to_vec())]
        );
        let len = tokio::fs::metadata(&path).await.unwrap().len();
        assert_eq!(
            len,
            HEADER_LEN * 2 + (b"kept".len() + b"after failure".len()) as u64
        );
    }
}
