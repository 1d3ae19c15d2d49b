//! High-level client API.

use crate::error::ClientError;
use crate::processor::{CommandProcessor, PipelineConfig, ProcessHandle};
use futures::future::try_join_all;
use futures::stream::{self, Stream};
use respipe_protocol::{Command, Reply};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

/// Pipelining client over one transport.
///
/// Sends never wait for the network. Replies are read back in submission
/// order with [`read`](Self::read), [`read_many`](Self::read_many),
/// [`read_all`](Self::read_all) or [`replies`](Self::replies).
pub struct Client<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    processor: CommandProcessor<R, W>,
    shut_down: AtomicBool,
}

impl<S> Client<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Creates a client over a duplex transport.
    pub fn new(io: S) -> Self {
        Self::with_config(io, PipelineConfig::default())
    }

    pub fn with_config(io: S, config: PipelineConfig) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self::from_halves(reader, writer, config)
    }
}

impl<R, W> Client<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a client over separate read and write halves.
    pub fn from_halves(reader: R, writer: W, config: PipelineConfig) -> Self {
        Self {
            processor: CommandProcessor::new(reader, writer, config),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Queues a command and starts writing. Returns immediately.
    pub fn send(&self, cmd: Command) -> &Self {
        self.processor.add(cmd);
        let _ = self.processor.process();
        self
    }

    /// Queues every command of `cmds`, in iteration order, then starts
    /// writing. The iterator is drained before this returns.
    pub fn send_batch<I>(&self, cmds: I) -> &Self
    where
        I: IntoIterator<Item = Command>,
    {
        for cmd in cmds {
            self.processor.add(cmd);
        }
        let _ = self.processor.process();
        self
    }

    /// Resolves once every command queued so far has been written.
    pub fn nop(&self) -> ProcessHandle {
        self.processor.process()
    }

    /// Reads one reply; `None` once closed.
    pub async fn read(&self) -> Result<Option<Reply>, ClientError> {
        self.processor.read().await
    }

    /// Alias of [`read`](Self::read).
    pub async fn repl(&self) -> Result<Option<Reply>, ClientError> {
        self.read().await
    }

    /// Reads `n` replies in order.
    ///
    /// Stops early if the client closes; the result then holds fewer than `n`
    /// replies.
    pub async fn read_many(&self, n: usize) -> Result<Vec<Reply>, ClientError> {
        let replies = try_join_all((0..n).map(|_| self.read())).await?;
        Ok(replies.into_iter().map_while(|reply| reply).collect())
    }

    /// Reads one reply for every command still awaiting one.
    pub async fn read_all(&self) -> Result<Vec<Reply>, ClientError> {
        self.read_many(self.command_count()).await
    }

    /// Lazily yields replies while commands are awaiting them.
    ///
    /// The count is checked on every pull, so commands sent between pulls
    /// extend the stream. Push messages are skipped; use
    /// [`read`](Self::read) to observe them. The stream ends after the first
    /// error.
    pub fn replies(&self) -> impl Stream<Item = Result<Reply, ClientError>> + '_ {
        stream::unfold(Some(self), |client| async move {
            let client = client?;
            while client.command_count() > 0 {
                match client.read().await {
                    Ok(Some(reply)) if reply.is_push() => {
                        tracing::trace!("skipping push message");
                    }
                    Ok(Some(reply)) => return Some((Ok(reply), Some(client))),
                    Ok(None) => return None,
                    Err(e) => return Some((Err(e), None)),
                }
            }
            None
        })
    }

    /// Closes the processor, then the transport. Idempotent.
    ///
    /// A write in progress is aborted rather than awaited, so this returns
    /// even when the peer has stopped reading. The write half is shut down
    /// and the read half is dropped.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.processor.shutdown().await?;
        tracing::debug!("client closed");
        Ok(())
    }

    /// True while a write is in progress.
    pub fn is_busy(&self) -> bool {
        self.is_writing()
    }

    pub fn is_writing(&self) -> bool {
        self.processor.is_writing()
    }

    pub fn is_reading(&self) -> bool {
        self.processor.is_reading()
    }

    pub fn is_closed(&self) -> bool {
        self.processor.is_closed()
    }

    /// Commands sent whose replies have not been read yet.
    pub fn command_count(&self) -> usize {
        self.processor.reply_count()
    }

    /// Alias of [`command_count`](Self::command_count).
    pub fn command_reply_count(&self) -> usize {
        self.command_count()
    }

    /// The underlying processor.
    pub fn processor(&self) -> &CommandProcessor<R, W> {
        &self.processor
    }
}

impl<R, W> Drop for Client<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn drop(&mut self) {
        self.processor.close();
    }
}
