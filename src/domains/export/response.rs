use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

/// The response side of a chunked download: headers, then body bytes that only
/// reach the client when `flush` is called.
#[async_trait]
pub trait ChunkedResponse: Send {
    /// Set a response header. Headers set after the first flush are ignored.
    fn set_header(&mut self, name: &str, value: &str);

    /// Buffer body bytes.
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Push everything buffered so far to the client as one chunk.
    async fn flush(&mut self) -> io::Result<()>;

    /// True once the client is gone and further output is pointless.
    fn is_closed(&self) -> bool {
        false
    }
}

#[async_trait]
impl<R: ChunkedResponse + ?Sized> ChunkedResponse for &mut R {
    fn set_header(&mut self, name: &str, value: &str) {
        (**self).set_header(name, value)
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        (**self).flush().await
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Ordered response headers
pub type HeaderList = Vec<(String, String)>;

fn upsert_header(headers: &mut HeaderList, name: &str, value: &str) {
    match headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
        Some(entry) => entry.1 = value.to_string(),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

/// Channel-backed response body. Each flush becomes one chunk on the receiving
/// stream, which an HTTP framework can forward as a streaming body.
pub struct ChunkedBody {
    headers: HeaderList,
    head_tx: Option<oneshot::Sender<HeaderList>>,
    pending: Vec<u8>,
    chunk_tx: mpsc::Sender<Vec<u8>>,
}

/// Receiving half of a [`ChunkedBody`].
pub struct ChunkedBodyReceiver {
    /// Resolves with the headers on the first flush.
    pub head: oneshot::Receiver<HeaderList>,
    pub body: ReceiverStream<Vec<u8>>,
}

impl ChunkedBody {
    /// `capacity` is the number of flushed chunks that may queue up before
    /// `flush` waits for the consumer.
    pub fn channel(capacity: usize) -> (Self, ChunkedBodyReceiver) {
        let (head_tx, head_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = mpsc::channel(capacity.max(1));
        let body = Self {
            headers: Vec::new(),
            head_tx: Some(head_tx),
            pending: Vec::new(),
            chunk_tx,
        };
        let receiver = ChunkedBodyReceiver {
            head: head_rx,
            body: ReceiverStream::new(chunk_rx),
        };
        (body, receiver)
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    fn send_head(&mut self) {
        if let Some(head_tx) = self.head_tx.take() {
            // receiver may only care about the body
            let _ = head_tx.send(self.headers.clone());
        }
    }
}

#[async_trait]
impl ChunkedResponse for ChunkedBody {
    fn set_header(&mut self, name: &str, value: &str) {
        if self.head_tx.is_none() {
            log::warn!("Ignoring header {} set after the response head was sent", name);
            return;
        }
        upsert_header(&mut self.headers, name, value);
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.chunk_tx.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "response body receiver dropped"));
        }
        self.pending.extend_from_slice(bytes);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.send_head();
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.pending);
        self.chunk_tx
            .send(chunk)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body receiver dropped"))
    }

    fn is_closed(&self) -> bool {
        self.chunk_tx.is_closed()
    }
}

/// Writes an HTTP/1.1 response with chunked transfer coding straight onto a
/// byte stream such as a `TcpStream`.
pub struct HttpChunkedWriter<W: AsyncWrite + Unpin + Send> {
    inner: W,
    headers: HeaderList,
    pending: Vec<u8>,
    head_sent: bool,
    finished: bool,
}

impl<W: AsyncWrite + Unpin + Send> HttpChunkedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            headers: Vec::new(),
            pending: Vec::new(),
            head_sent: false,
            finished: false,
        }
    }

    async fn write_head(&mut self) -> io::Result<()> {
        if self.head_sent {
            return Ok(());
        }
        if !self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("transfer-encoding")) {
            self.headers.push(("Transfer-Encoding".to_string(), "chunked".to_string()));
        }

        let mut head = String::from("HTTP/1.1 200 OK\r\n");
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        self.inner.write_all(head.as_bytes()).await?;
        self.head_sent = true;
        Ok(())
    }

    /// Flush remaining bytes and write the terminating zero-length chunk.
    pub async fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        ChunkedResponse::flush(self).await?;
        self.inner.write_all(b"0\r\n\r\n").await?;
        self.inner.flush().await?;
        self.finished = true;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChunkedResponse for HttpChunkedWriter<W> {
    fn set_header(&mut self, name: &str, value: &str) {
        if self.head_sent {
            log::warn!("Ignoring header {} set after the response head was sent", name);
            return;
        }
        upsert_header(&mut self.headers, name, value);
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::other("chunked response already finished"));
        }
        self.pending.extend_from_slice(bytes);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.write_head().await?;
        if !self.pending.is_empty() {
            let chunk = std::mem::take(&mut self.pending);
            self.inner.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await?;
            self.inner.write_all(&chunk).await?;
            self.inner.write_all(b"\r\n").await?;
        }
        self.inner.flush().await
    }
}
