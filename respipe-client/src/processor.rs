//! Command processor.
//!
//! Owns both directions of a transport. Commands are queued with
//! [`CommandProcessor::add`] and written by a single-flight write loop
//! started by [`CommandProcessor::process`]; replies are pulled in wire order
//! with [`CommandProcessor::read`].

use crate::error::ClientError;
use crate::reader::ReplyReader;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::TryStreamExt;
use parking_lot::Mutex;
use respipe_protocol::{
    Command, CommandEncoderQueue, Composed, DecoderConfig, Reply, DEFAULT_BATCH_LIMIT,
};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::AbortHandle;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum commands rendered per flush.
    pub batch_limit: usize,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    pub decoder: DecoderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            decoder: DecoderConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_decoder(mut self, decoder: DecoderConfig) -> Self {
        self.decoder = decoder;
        self
    }
}

type WriteResult = Result<(), Arc<io::Error>>;
type SharedWrite = Shared<BoxFuture<'static, WriteResult>>;

struct State {
    closed: bool,
    queue: CommandEncoderQueue,
    /// Replies owed for submitted commands.
    reply_count: usize,
    /// Set while a write loop runs; cleared by the loop itself under this
    /// lock, in the same critical section where it observes an empty queue.
    in_flight: Option<SharedWrite>,
    /// Task running the write loop, aborted on close.
    write_task: Option<AbortHandle>,
}

impl State {
    fn finish_write(&mut self) {
        self.in_flight = None;
        self.write_task = None;
    }
}

struct Inner<R, W> {
    state: Mutex<State>,
    /// Both halves are taken out by [`CommandProcessor::shutdown`].
    writer: tokio::sync::Mutex<Option<W>>,
    reader: tokio::sync::Mutex<Option<ReplyReader<R>>>,
    reading: AtomicUsize,
    closed: watch::Sender<bool>,
    batch_limit: usize,
}

/// Pipelines commands over a transport split into a read and a write half.
pub struct CommandProcessor<R, W> {
    inner: Arc<Inner<R, W>>,
}

impl<R, W> Clone for CommandProcessor<R, W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, W> CommandProcessor<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W, config: PipelineConfig) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    closed: false,
                    queue: CommandEncoderQueue::new(),
                    reply_count: 0,
                    in_flight: None,
                    write_task: None,
                }),
                writer: tokio::sync::Mutex::new(Some(writer)),
                reader: tokio::sync::Mutex::new(Some(ReplyReader::new(
                    reader,
                    config.decoder,
                    config.read_buffer_size,
                ))),
                reading: AtomicUsize::new(0),
                closed,
                batch_limit: config.batch_limit.max(1),
            }),
        }
    }

    /// Queues a command. Ignored once closed.
    pub fn add(&self, cmd: Command) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.queue.add(cmd);
        state.reply_count += 1;
    }

    /// Starts writing queued commands, or joins the write already running.
    ///
    /// The returned handle resolves once the queue has been observed empty,
    /// which covers commands added while the write was in progress. The write
    /// runs on its own task whether or not the handle is awaited.
    pub fn process(&self) -> ProcessHandle {
        let mut state = self.inner.state.lock();
        if state.closed {
            return ProcessHandle::done();
        }
        if let Some(write) = &state.in_flight {
            return ProcessHandle::pending(write.clone());
        }
        if state.queue.is_empty() {
            return ProcessHandle::done();
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.write_loop().await });
        state.write_task = Some(task.abort_handle());
        let write = async move {
            match task.await {
                Ok(result) => result,
                // Aborted by close.
                Err(e) if e.is_cancelled() => Ok(()),
                Err(e) => Err(Arc::new(io::Error::new(io::ErrorKind::Other, e))),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(write.clone());
        ProcessHandle::pending(write)
    }

    /// Returns the next reply, or `None` once closed.
    ///
    /// Push messages are returned like any other reply but do not settle a
    /// pending command. End of stream closes the processor. Transport and
    /// decode errors are returned without closing it.
    pub async fn read(&self) -> Result<Option<Reply>, ClientError> {
        let mut closed = self.inner.closed.subscribe();
        if *closed.borrow_and_update() {
            return Ok(None);
        }

        let result = {
            let _reading = ReadingGuard::enter(&self.inner.reading);
            tokio::select! {
                _ = closed.wait_for(|closed| *closed) => return Ok(None),
                result = async {
                    match self.inner.reader.lock().await.as_mut() {
                        Some(reader) => reader.next_reply().await,
                        None => Ok(None),
                    }
                } => result,
            }
        };

        match result? {
            Some(reply) => {
                if !reply.is_push() {
                    let mut state = self.inner.state.lock();
                    state.reply_count = state.reply_count.saturating_sub(1);
                }
                Ok(Some(reply))
            }
            None => {
                tracing::debug!("transport reached end of stream");
                self.close();
                Ok(None)
            }
        }
    }

    /// Stops the processor. Idempotent.
    ///
    /// Unwritten commands are dropped, pending reads resolve to `None` and a
    /// running write is aborted, so a frame may be left half written. Pending
    /// [`ProcessHandle`]s resolve to `Ok(())`. The transport itself stays
    /// open until [`shutdown`](Self::shutdown).
    pub fn close(&self) {
        let write_task = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.reply_count = 0;
            state.queue.clear();
            state.in_flight = None;
            state.write_task.take()
        };
        if let Some(task) = write_task {
            task.abort();
        }
        self.inner.closed.send_replace(true);
        tracing::debug!("processor closed");
    }

    /// Closes the processor and releases the transport: the write half is
    /// shut down, the read half is dropped. Later calls do nothing.
    pub async fn shutdown(&self) -> io::Result<()> {
        self.close();
        // The aborted write task drops its writer guard once cancelled.
        let writer = self.inner.writer.lock().await.take();
        drop(self.inner.reader.lock().await.take());
        match writer {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// True while a write loop is running.
    pub fn is_writing(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    /// True while at least one [`read`](Self::read) awaits the transport.
    pub fn is_reading(&self) -> bool {
        !self.is_closed() && self.inner.reading.load(Ordering::Acquire) > 0
    }

    /// Replies still owed for submitted commands.
    pub fn reply_count(&self) -> usize {
        self.inner.state.lock().reply_count
    }

    /// Commands queued but not yet rendered for writing.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }
}

impl<R, W> Inner<R, W>
where
    W: AsyncWrite + Unpin,
{
    async fn write_loop(&self) -> WriteResult {
        tracing::debug!("write loop started");
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            self.state.lock().finish_write();
            return Ok(());
        };
        let mut batches = 0usize;

        loop {
            let frame = {
                let mut state = self.state.lock();
                let before = state.queue.len();
                let frame = if state.closed {
                    None
                } else {
                    state.queue.flush(self.batch_limit)
                };
                match &frame {
                    Some(frame) => tracing::trace!(
                        commands = before - state.queue.len(),
                        bytes = frame.as_buffer().map(|b| b.len()),
                        "flushing batch"
                    ),
                    None => state.finish_write(),
                }
                frame
            };

            let Some(frame) = frame else {
                break;
            };

            if let Err(e) = write_frame(&mut *writer, frame).await {
                self.state.lock().finish_write();
                tracing::warn!("write loop failed: {}", e);
                return Err(Arc::new(e));
            }
            batches += 1;
        }

        tracing::debug!(batches, "write loop finished");
        Ok(())
    }
}

async fn write_frame<W>(writer: &mut W, frame: Composed) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match frame {
        Composed::Buffer(buf) => writer.write_all(&buf).await?,
        Composed::Stream(mut stream) => {
            while let Some(chunk) = stream.try_next().await? {
                writer.write_all(&chunk).await?;
            }
        }
    }
    writer.flush().await
}

struct ReadingGuard<'a>(&'a AtomicUsize);

impl<'a> ReadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ReadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Completion of a write started by [`CommandProcessor::process`].
///
/// Clones resolve together with the same result.
#[derive(Clone)]
#[must_use = "dropping the handle does not cancel the write"]
pub struct ProcessHandle {
    write: Option<SharedWrite>,
}

impl ProcessHandle {
    fn done() -> Self {
        Self { write: None }
    }

    fn pending(write: SharedWrite) -> Self {
        Self { write: Some(write) }
    }
}

impl Future for ProcessHandle {
    type Output = Result<(), ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.write.as_mut() {
            Some(write) => write.poll_unpin(cx).map_err(ClientError::Write),
            None => Poll::Ready(Ok(())),
        }
    }
}
