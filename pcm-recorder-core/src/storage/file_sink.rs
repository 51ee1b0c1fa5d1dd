use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;

/// Append-only output file.
///
/// Payload writes get one retry on a transient I/O error; anything else is
/// a `SinkIoFailure`. Boundary writes (headers) are never retried.
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl FileSink {
    /// Create (or truncate) `path`, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::SinkIoFailure(format!("failed to create directory: {}", e)))?;
        }
        let file = File::create(&path)
            .map_err(|e| CaptureError::SinkIoFailure(format!("failed to create {}: {}", path.display(), e)))?;
        log::debug!("Opened sink {}", path.display());
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Append payload bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let path = &self.path;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CaptureError::SinkIoFailure(format!("{} is closed", path.display())))?;

        let mut offset = 0;
        let mut retried = false;
        while offset < data.len() {
            match writer.write(&data[offset..]) {
                Ok(0) => {
                    return Err(CaptureError::SinkIoFailure(format!(
                        "{} accepted no bytes",
                        path.display()
                    )))
                }
                Ok(n) => offset += n,
                Err(e) if is_transient(&e) && !retried => {
                    log::warn!("Transient write error on {}, retrying: {}", path.display(), e);
                    retried = true;
                }
                Err(e) => {
                    self.bytes_written += offset as u64;
                    return Err(CaptureError::SinkIoFailure(format!("write to {} failed: {}", path.display(), e)));
                }
            }
        }
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Write a container boundary (header) without retry.
    pub fn write_boundary(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let path = &self.path;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CaptureError::SinkIoFailure(format!("{} is closed", path.display())))?;
        writer
            .write_all(data)
            .map_err(|e| CaptureError::SinkIoFailure(format!("header write to {} failed: {}", path.display(), e)))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Push buffered bytes to the OS. Failures are logged, not returned.
    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                log::warn!("Flush of {} failed: {}", self.path.display(), e);
            }
        }
    }

    /// Flush, sync and close. Returns the total bytes written.
    ///
    /// Calling it again after a successful close is a no-op.
    pub fn close(&mut self) -> Result<u64, CaptureError> {
        let Some(writer) = self.writer.take() else {
            return Ok(self.bytes_written);
        };
        let file = writer
            .into_inner()
            .map_err(|e| CaptureError::SinkIoFailure(format!("flush of {} failed: {}", self.path.display(), e.error())))?;
        file.sync_all()
            .map_err(|e| CaptureError::SinkIoFailure(format!("sync of {} failed: {}", self.path.display(), e)))?;
        log::debug!("Closed sink {} ({} bytes)", self.path.display(), self.bytes_written);
        Ok(self.bytes_written)
    }

    /// Close without syncing and delete the file.
    pub fn discard(mut self) {
        self.writer = None;
        remove_quietly(&self.path);
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            self.flush();
        }
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}

/// Delete `path`, logging anything other than "not found".
pub fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path)
        .map_err(|e| CaptureError::SinkIoFailure(format!("failed to open file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CaptureError::SinkIoFailure(format!("failed to read file for checksum: {}", e))),
        };
        hasher.update(&chunk[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_counts_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.pcm");

        let mut sink = FileSink::create(&path).unwrap();
        sink.write(&[1, 2, 3]).unwrap();
        sink.write(&[4, 5]).unwrap();
        sink.flush();
        assert_eq!(sink.close().unwrap(), 5);
        assert_eq!(sink.close().unwrap(), 5);

        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::create(dir.path().join("a.pcm")).unwrap();
        sink.close().unwrap();
        assert!(matches!(sink.write(&[0]), Err(CaptureError::SinkIoFailure(_))));
    }

    #[test]
    fn discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.pcm");
        let mut sink = FileSink::create(&path).unwrap();
        sink.write(&[0; 8]).unwrap();
        sink.discard();
        assert!(!path.exists());
    }

    #[test]
    fn create_in_missing_readonly_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        // A regular file cannot act as a parent directory
        let err = FileSink::create(blocker.join("out.pcm")).err().unwrap();
        assert!(matches!(err, CaptureError::SinkIoFailure(_)));
    }

    #[test]
    fn checksum_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn transient_kinds() {
        assert!(is_transient(&io::Error::from(ErrorKind::Interrupted)));
        assert!(is_transient(&io::Error::from(ErrorKind::TimedOut)));
        assert!(!is_transient(&io::Error::from(ErrorKind::PermissionDenied)));
    }
}
