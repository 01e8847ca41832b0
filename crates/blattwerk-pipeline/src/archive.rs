// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Archive streamer: encode artifacts into a zip while the bytes are being
// sent.
//
// The zip encoder runs on a blocking worker and writes through
// `ChannelWriter` into a bounded channel whose receiving end is the response
// body. A full channel blocks the encoder (backpressure); a dropped receiver
// turns the next write into `BrokenPipe`, which aborts the archive.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Write};

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::types::{ArtifactBody, OutputArtifact};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use zip::write::{SimpleFileOptions, StreamWriter};
use zip::{CompressionMethod, ZipWriter};

use crate::scratch::JobScratch;

/// A chunk of archive bytes, or the error that ended the stream.
pub type ArchiveChunk = io::Result<Vec<u8>>;

// -- Sink ---------------------------------------------------------------------

/// `Write` adapter feeding a bounded channel in chunks of `chunk_bytes`.
pub struct ChannelWriter {
    sender: mpsc::Sender<ArchiveChunk>,
    buffer: Vec<u8>,
    chunk_bytes: usize,
}

impl ChannelWriter {
    pub fn new(sender: mpsc::Sender<ArchiveChunk>, chunk_bytes: usize) -> Self {
        let chunk_bytes = chunk_bytes.max(1);
        Self {
            sender,
            buffer: Vec::with_capacity(chunk_bytes),
            chunk_bytes,
        }
    }

    /// Must be called from a blocking context, never from an async task.
    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_bytes));
        self.sender
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive receiver dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() >= self.chunk_bytes {
            self.send_buffer()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffer()
    }
}

// -- Session ------------------------------------------------------------------

/// An archive being written to a non-seekable sink.
///
/// Entries appear in `append` order. [`ArchiveSession::finalize`] must be
/// called once at the end; without it the archive has no central directory
/// and is unusable.
pub struct ArchiveSession<W: Write> {
    zip: ZipWriter<StreamWriter<W>>,
    names: HashSet<String>,
}

impl<W: Write> ArchiveSession<W> {
    pub fn open(sink: W) -> Self {
        Self {
            zip: ZipWriter::new_stream(sink),
            names: HashSet::new(),
        }
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Add an entry whose content is read from `reader`.
    pub fn append(&mut self, name: &str, reader: &mut dyn Read) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(BlattwerkError::Internal(format!(
                "duplicate archive entry '{name}'"
            )));
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(name, options).map_err(zip_error)?;
        io::copy(reader, &mut self.zip)?;
        Ok(())
    }

    pub fn append_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.append(name, &mut io::Cursor::new(bytes))
    }

    /// Add an artifact, reading file-backed bodies from disk.
    pub fn append_artifact(&mut self, artifact: &OutputArtifact) -> Result<()> {
        match &artifact.body {
            ArtifactBody::Bytes(bytes) => self.append_bytes(&artifact.file_name, bytes),
            ArtifactBody::File(path) => {
                let mut file = File::open(path)?;
                self.append(&artifact.file_name, &mut file)
            }
        }
    }

    /// Write the central directory and flush the sink.
    pub fn finalize(self) -> Result<()> {
        let mut sink = self.zip.finish().map_err(zip_error)?;
        sink.flush()?;
        Ok(())
    }
}

fn zip_error(err: zip::result::ZipError) -> BlattwerkError {
    match err {
        zip::result::ZipError::Io(err) => BlattwerkError::Io(err),
        other => BlattwerkError::Internal(format!("zip encoder: {other}")),
    }
}

// -- Streaming ----------------------------------------------------------------

/// How an archive stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed { entries: usize },
    /// The archive is truncated; the reason is for logs only.
    Aborted(String),
}

/// A zip being produced in the background.
pub struct ArchiveStream {
    /// Response body chunks. Ends with an `Err` item if packaging failed.
    pub body: ReceiverStream<ArchiveChunk>,
    /// Resolves once the producer has finished and the request's scratch
    /// files have been removed.
    pub completion: oneshot::Receiver<StreamOutcome>,
}

/// Bounds on the producer's in-flight memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// Chunks buffered between encoder and consumer.
    pub channel_capacity: usize,
    pub chunk_bytes: usize,
}

/// Encode `artifacts` into a zip on a blocking worker.
///
/// The producer owns `scratch`: file-backed artifacts stay on disk until the
/// archive is finalized or aborted, and are removed before the completion
/// signal fires.
pub fn stream_archive(
    artifacts: Vec<OutputArtifact>,
    scratch: JobScratch,
    limits: StreamLimits,
) -> ArchiveStream {
    let (sender, receiver) = mpsc::channel(limits.channel_capacity.max(1));
    let (done, completion) = oneshot::channel();
    let job = scratch.job_id();

    tokio::task::spawn_blocking(move || {
        let writer = ChannelWriter::new(sender.clone(), limits.chunk_bytes);
        let outcome = match write_archive(writer, &artifacts) {
            Ok(entries) => {
                debug!(%job, entries, "archive finalized");
                StreamOutcome::Completed { entries }
            }
            Err(err) => {
                warn!(%job, %err, "archive aborted");
                // Fails the response body instead of ending it cleanly; the
                // receiver may already be gone.
                let _ = sender.blocking_send(Err(io::Error::other("archive aborted")));
                StreamOutcome::Aborted(err.to_string())
            }
        };

        drop(sender);
        drop(artifacts);
        scratch.cleanup_blocking();
        let _ = done.send(outcome);
    });

    ArchiveStream {
        body: ReceiverStream::new(receiver),
        completion,
    }
}

fn write_archive<W: Write>(sink: W, artifacts: &[OutputArtifact]) -> Result<usize> {
    let mut session = ArchiveSession::open(sink);
    for artifact in artifacts {
        session.append_artifact(artifact)?;
    }
    let entries = session.len();
    session.finalize()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use blattwerk_core::types::JobId;
    use tempfile::TempDir;
    use tokio_stream::StreamExt;
    use zip::ZipArchive;

    use crate::scratch::ScratchStore;

    /// Cloneable in-memory sink.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn entry_names(bytes: Vec<u8>) -> Vec<String> {
        let mut archive = ZipArchive::new(io::Cursor::new(bytes)).expect("valid zip");
        (0..archive.len())
            .map(|i| archive.by_index(i).expect("entry").name().to_string())
            .collect()
    }

    fn read_entry(bytes: &[u8], name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(io::Cursor::new(bytes.to_vec())).expect("valid zip");
        let mut entry = archive.by_name(name).expect("entry");
        let mut content = Vec::new();
        entry.read_to_end(&mut content).expect("read");
        content
    }

    #[test]
    fn entries_keep_append_order() {
        let sink = SharedSink::default();
        let mut session = ArchiveSession::open(sink.clone());
        session.append_bytes("b.txt", b"second").expect("append");
        session.append_bytes("a.txt", b"first").expect("append");
        session.finalize().expect("finalize");

        let bytes = sink.0.lock().expect("lock").clone();
        assert_eq!(entry_names(bytes.clone()), vec!["b.txt", "a.txt"]);
        assert_eq!(read_entry(&bytes, "a.txt"), b"first");
    }

    #[test]
    fn duplicate_names_are_refused() {
        let mut session = ArchiveSession::open(SharedSink::default());
        session.append_bytes("x", b"1").expect("append");
        assert!(session.append_bytes("x", b"2").is_err());
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn streamed_archive_is_complete_and_cleans_up() {
        let dir = TempDir::new().expect("tempdir");
        let store = ScratchStore::open(dir.path()).await.expect("store");
        let mut scratch = store.job(JobId::new());
        let upload = scratch
            .put(b"on disk", "page.jpg", "image/jpeg", "bin")
            .await
            .expect("put");

        let artifacts = vec![
            OutputArtifact::pdf("page-1.pdf", vec![7; 200_000]),
            OutputArtifact {
                body: ArtifactBody::File(upload.storage_path.clone()),
                file_name: "page-2.jpg".into(),
                media_type: "image/jpeg".into(),
            },
        ];
        let stream = stream_archive(
            artifacts,
            scratch,
            StreamLimits {
                channel_capacity: 2,
                chunk_bytes: 1024,
            },
        );

        let mut body = stream.body;
        let mut bytes = Vec::new();
        while let Some(chunk) = body.next().await {
            bytes.extend(chunk.expect("chunk"));
        }

        assert_eq!(
            stream.completion.await.expect("outcome"),
            StreamOutcome::Completed { entries: 2 }
        );
        assert_eq!(entry_names(bytes.clone()), vec!["page-1.pdf", "page-2.jpg"]);
        assert_eq!(read_entry(&bytes, "page-2.jpg"), b"on disk");
        assert!(!upload.storage_path.exists());
    }

    #[tokio::test]
    async fn dropped_receiver_aborts_and_cleans_up() {
        let dir = TempDir::new().expect("tempdir");
        let store = ScratchStore::open(dir.path()).await.expect("store");
        let mut scratch = store.job(JobId::new());
        let upload = scratch
            .put(b"x", "x.pdf", "application/pdf", "bin")
            .await
            .expect("put");

        // Incompressible-enough payload spread over many chunks.
        let payload: Vec<u8> = (0..2_000_000u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let stream = stream_archive(
            vec![OutputArtifact::pdf("big.pdf", payload)],
            scratch,
            StreamLimits {
                channel_capacity: 1,
                chunk_bytes: 512,
            },
        );

        drop(stream.body);
        match stream.completion.await.expect("outcome") {
            StreamOutcome::Aborted(_) => {}
            other => panic!("expected abort, got {other:?}"),
        }
        assert!(!upload.storage_path.exists());
    }

    #[tokio::test]
    async fn missing_file_aborts_with_error_chunk() {
        let dir = TempDir::new().expect("tempdir");
        let store = ScratchStore::open(dir.path()).await.expect("store");
        let scratch = store.job(JobId::new());

        let stream = stream_archive(
            vec![OutputArtifact {
                body: ArtifactBody::File(dir.path().join("gone.jpg")),
                file_name: "gone.jpg".into(),
                media_type: "image/jpeg".into(),
            }],
            scratch,
            StreamLimits {
                channel_capacity: 4,
                chunk_bytes: 64,
            },
        );

        let chunks: Vec<ArchiveChunk> = stream.body.collect().await;
        assert!(chunks.last().is_some_and(|chunk| chunk.is_err()));
        assert!(matches!(
            stream.completion.await.expect("outcome"),
            StreamOutcome::Aborted(_)
        ));
    }
}
