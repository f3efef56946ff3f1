use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::error::TransportError;
use crate::source::EventSource;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reads one JSON message per line from a file.
///
/// In follow mode the source behaves like `tail -f`: reaching the end of
/// the file waits for more data instead of ending the stream, and a line is
/// only yielded once its terminating newline has been written. Blank lines
/// are skipped.
///
/// Lines are handed out as raw bytes; a line that is not valid UTF-8 or not
/// JSON is the decoder's problem, not the transport's. The read position
/// survives reconnects, so a reconnect never replays lines already yielded.
pub struct JsonLinesSource {
    name: String,
    path: PathBuf,
    follow: bool,
    poll_interval: Duration,
    reader: Option<BufReader<File>>,
    pending: Vec<u8>,
    /// Byte offset just past the last complete line consumed.
    offset: u64,
}

impl JsonLinesSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            follow: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reader: None,
            pending: Vec::new(),
            offset: 0,
        }
    }

    /// Keep waiting for appended lines at end of file.
    #[must_use]
    pub fn follow(mut self, poll_interval: Duration) -> Self {
        self.follow = true;
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[async_trait]
impl EventSource for JsonLinesSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let connection_error =
            |e: std::io::Error| TransportError::Connection(format!("{}: {e}", self.path.display()));
        let mut file = File::open(&self.path).await.map_err(connection_error)?;

        // A file shorter than our position was replaced; start it over.
        let len = file.metadata().await.map_err(connection_error)?.len();
        if len < self.offset {
            self.offset = 0;
        }
        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(connection_error)?;

        self.reader = Some(BufReader::new(file));
        self.pending.clear();
        Ok(())
    }

    async fn next(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let reader = self.reader.as_mut().ok_or(TransportError::NotConnected)?;
        loop {
            reader.read_until(b'\n', &mut self.pending).await?;

            if self.pending.last() != Some(&b'\n') {
                if self.follow {
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
                if self.pending.is_empty() {
                    return Ok(None);
                }
            }

            let line = std::mem::take(&mut self.pending);
            self.offset += line.len() as u64;
            let line = line.trim_ascii();
            if !line.is_empty() {
                return Ok(Some(line.to_vec()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn reads_lines_in_order_and_skips_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"n":1}}"#).unwrap();
        writeln!(file).unwrap();
        write!(file, r#"{{"n":2}}"#).unwrap();
        file.flush().unwrap();

        let mut source = JsonLinesSource::new("raw", file.path());
        source.connect().await.unwrap();
        assert_eq!(source.next().await.unwrap(), Some(br#"{"n":1}"#.to_vec()));
        assert_eq!(source.next().await.unwrap(), Some(br#"{"n":2}"#.to_vec()));
        assert_eq!(source.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_file_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = JsonLinesSource::new("raw", dir.path().join("absent.jsonl"));
        assert!(matches!(
            source.connect().await,
            Err(TransportError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn next_before_connect_fails() {
        let mut source = JsonLinesSource::new("raw", "unused.jsonl");
        assert!(matches!(
            source.next().await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn invalid_utf8_lines_are_yielded_as_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"n":1}}"#).unwrap();
        file.write_all(b"\xff\xfe bad\n").unwrap();
        writeln!(file, r#"{{"n":2}}"#).unwrap();
        file.flush().unwrap();

        let mut source = JsonLinesSource::new("raw", file.path());
        source.connect().await.unwrap();
        assert_eq!(source.next().await.unwrap(), Some(br#"{"n":1}"#.to_vec()));
        assert_eq!(source.next().await.unwrap(), Some(b"\xff\xfe bad".to_vec()));
        assert_eq!(source.next().await.unwrap(), Some(br#"{"n":2}"#.to_vec()));
        assert_eq!(source.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn reconnect_resumes_after_the_last_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first").unwrap();
        writeln!(file, "second").unwrap();
        file.flush().unwrap();

        let mut source = JsonLinesSource::new("raw", file.path());
        source.connect().await.unwrap();
        assert_eq!(source.next().await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(source.offset(), 6);

        source.connect().await.unwrap();
        assert_eq!(source.next().await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(source.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn follow_mode_waits_for_appended_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first").unwrap();
        file.flush().unwrap();

        let mut source =
            JsonLinesSource::new("raw", file.path()).follow(Duration::from_millis(5));
        source.connect().await.unwrap();
        assert_eq!(source.next().await.unwrap(), Some(b"first".to_vec()));

        let path = file.path().to_path_buf();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
            writeln!(f, "second").unwrap();
        });

        let next = tokio::time::timeout(Duration::from_secs(5), source.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, Some(b"second".to_vec()));
        writer.await.unwrap();
        drop(file);
    }
}
