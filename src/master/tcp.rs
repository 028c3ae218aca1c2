use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use super::context::{lock, PendingRequest, TransactionContext};
use super::AsyncTransport;
use crate::codec::tcp::{assemble_frame, MbapHeader, MBAP_HEADER_LEN, MODBUS_PROTOCOL_ID};
use crate::error::{ModbusError, Result};
use crate::messages::{ModbusPdu, RawPdu};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_MAX_QUEUED_REQUESTS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TcpConfig {
    /// Counted from submission, covers queueing as well as the wait for
    /// the response.
    pub request_timeout: Duration,
    /// Requests waiting for the writer beyond this bound hold up their
    /// callers.
    pub max_queued_requests: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_queued_requests: DEFAULT_MAX_QUEUED_REQUESTS,
        }
    }
}

impl TcpConfig {
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_max_queued_requests(mut self, max_queued_requests: usize) -> Self {
        self.max_queued_requests = max_queued_requests;
        self
    }
}

/// State shared between the caller-facing handle and the two connection
/// tasks.
struct Shared {
    context: TransactionContext,
    closed: Mutex<bool>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }

    /// Marks the connection closed, stops both tasks and fails every request
    /// still awaiting a response. Returns false if it was already closed.
    fn shut_down(&self) -> bool {
        {
            let mut closed = lock(&self.closed);
            if *closed {
                return false;
            }
            *closed = true;
        }

        self.shutdown.send_replace(true);

        for pending in self.context.drain() {
            pending.complete(Err(ModbusError::Closed));
        }
        true
    }
}

/// Asynchronous master over a stream connection. Any number of tasks may
/// have requests in flight at once; responses are matched to their callers
/// by transaction id, in whatever order they arrive.
pub struct TcpTransport {
    config: TcpConfig,
    shared: Arc<Shared>,
    queue: mpsc::Sender<Arc<PendingRequest>>,
}

impl TcpTransport {
    pub async fn connect<A: ToSocketAddrs>(addr: A, config: TcpConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(TcpTransport::new(stream, config))
    }

    /// Takes over `stream` and spawns the reader and writer tasks on the
    /// current tokio runtime.
    pub fn new<S>(stream: S, config: TcpConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            context: TransactionContext::new(),
            closed: Mutex::new(false),
            shutdown,
        });

        let (queue, queue_rx) = mpsc::channel(config.max_queued_requests.max(1));
        let (reader, writer) = tokio::io::split(stream);

        tokio::spawn(write_loop(writer, queue_rx, shutdown_rx.clone(), shared.clone()));
        tokio::spawn(read_loop(reader, shutdown_rx, shared.clone()));

        TcpTransport {
            config,
            shared,
            queue,
        }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    async fn exchange(&self, unit_id: u8, request: RawPdu) -> Result<RawPdu> {
        let (pending, mut completion) = self.shared.context.register(unit_id, request);
        let transaction_id = pending.transaction_id;

        // close() may have drained the map before this record went in
        if self.shared.is_closed() {
            self.shared.context.take(transaction_id);
            return Err(ModbusError::Closed);
        }

        let wait = async {
            // close() completes the record while the queue may still be full
            tokio::select! {
                sent = self.queue.send(pending) => {
                    if sent.is_err() {
                        self.shared.context.take(transaction_id);
                        return Err(ModbusError::Closed);
                    }
                }
                result = &mut completion => return result.unwrap_or(Err(ModbusError::Closed)),
            }
            completion.await.unwrap_or(Err(ModbusError::Closed))
        };

        match timeout(self.config.request_timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                self.shared.context.take(transaction_id);
                warn!(
                    "modbus/tcp: transaction {} to unit {} timed out after {:?}",
                    transaction_id, unit_id, self.config.request_timeout
                );
                Err(ModbusError::Timeout(self.config.request_timeout))
            }
        }
    }
}

#[async_trait]
impl AsyncTransport for TcpTransport {
    async fn write_request(&self, unit_id: u8, request: &dyn ModbusPdu) -> Result<RawPdu> {
        if self.shared.is_closed() {
            return Err(ModbusError::Closed);
        }

        let request = RawPdu::from_pdu(request)?;
        self.exchange(unit_id, request).await
    }

    async fn close(&self) -> Result<()> {
        if self.shared.shut_down() {
            info!("modbus/tcp: connection closed");
        }
        Ok(())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shared.shut_down();
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut queue: mpsc::Receiver<Arc<PendingRequest>>,
    mut shutdown: watch::Receiver<bool>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let pending = tokio::select! {
            _ = shutdown.changed() => break,
            pending = queue.recv() => match pending {
                Some(pending) => pending,
                None => break,
            },
        };

        let frame = assemble_frame(pending.transaction_id, pending.unit_id, pending.request.as_bytes());
        debug!("modbus/tcp: sending {:02x?}", frame);

        let written = tokio::select! {
            // the record was failed by shut_down
            _ = shutdown.changed() => break,
            written = writer.write(&frame) => written,
        };

        let failure = match written {
            Ok(written) if written == frame.len() => continue,
            Ok(written) => ModbusError::ShortWrite {
                written,
                expected: frame.len(),
            },
            Err(err) => ModbusError::Io(err),
        };

        warn!(
            "modbus/tcp: write of transaction {} failed: {}",
            pending.transaction_id, failure
        );
        if shared.context.take(pending.transaction_id).is_some() {
            pending.complete(Err(failure));
        }
    }

    queue.close();
    while let Ok(pending) = queue.try_recv() {
        shared.context.take(pending.transaction_id);
        pending.complete(Err(ModbusError::Closed));
    }

    if let Err(err) = writer.shutdown().await {
        debug!("modbus/tcp: shutting down the write half failed: {}", err);
    }
}

async fn read_loop<R>(mut reader: R, mut shutdown: watch::Receiver<bool>, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            result = read_frame(&mut reader, &shared) => {
                if let Err(err) = result {
                    if !shared.is_closed() {
                        error!("modbus/tcp: closing connection: {}", err);
                    }
                    shared.shut_down();
                    break;
                }
            }
        }
    }
}

/// Reads one response and hands it to its caller. Every error returned
/// leaves the stream in an unknown state.
async fn read_frame<R>(reader: &mut R, shared: &Shared) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; MBAP_HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let header = MbapHeader::parse(&header)?;

    let pending = shared
        .context
        .take(header.transaction_id)
        .ok_or(ModbusError::UnexpectedTransactionId(header.transaction_id))?;

    let pdu_len = match check_header(&header, pending.unit_id) {
        Ok(pdu_len) => pdu_len,
        Err(err) => {
            // the matched request and the connection fail together
            let reason = err.to_string();
            pending.complete(Err(err));
            return Err(ModbusError::Io(io::Error::new(io::ErrorKind::InvalidData, reason)));
        }
    };

    let mut pdu = vec![0u8; pdu_len];
    reader.read_exact(&mut pdu).await?;
    debug!(
        "modbus/tcp: received transaction {} from unit {}: {:02x?}",
        header.transaction_id, header.unit_id, pdu
    );

    pending.complete(RawPdu::new(pdu));
    Ok(())
}

fn check_header(header: &MbapHeader, unit_id: u8) -> Result<usize> {
    if header.protocol_id != MODBUS_PROTOCOL_ID {
        return Err(ModbusError::UnexpectedProtocolId(header.protocol_id));
    }
    if header.unit_id != unit_id {
        return Err(ModbusError::UnexpectedUnitId {
            sent: unit_id,
            received: header.unit_id,
        });
    }
    header.pdu_len()
}
