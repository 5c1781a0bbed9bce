// SPDX-FileCopyrightText: Copyright (c) 2017-2026 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus ASCII server skeleton

use std::{io, path::Path, sync::Arc, time::Duration};

use log::{debug, trace, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _},
    task::JoinHandle,
    time::timeout,
};
use tokio_serial::SerialStream;
use tokio_util::sync::CancellationToken;

use crate::{
    codec::{AsciiCodec, LrcCodec, CRLF},
    frame::{AsciiFrame, ExceptionCode, SlaveRequest},
    server::service::Service,
    slave::Slave,
    Result,
};

/// Upper bound of a single read from a port; one read is treated as one
/// candidate frame.
const READ_BUF_LEN: usize = 512;

/// How long the flush phase waits for another chunk of stale input before
/// falling through to normal operation.
const FLUSH_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// A Modbus ASCII server (slave) serving one or more serial ports.
///
/// Each registered port is served by its own worker task that owns
/// exclusive read/write access to the port. A shared cancellation token
/// broadcasts shutdown intent to all workers; [`Server::join`] awaits
/// their completion.
#[derive(Debug)]
pub struct Server<S, C = LrcCodec> {
    service: Arc<S>,
    codec: Arc<C>,
    request_timeout: Option<Duration>,
    ports: Vec<String>,
    workers: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl<S> Server<S, LrcCodec> {
    /// Set up a new server instance using the standard LRC wire codec.
    pub fn new(service: S) -> Self {
        Self::with_codec(service, LrcCodec)
    }
}

impl<S, C> Server<S, C> {
    /// Set up a new server instance with a custom wire codec.
    pub fn with_codec(service: S, codec: C) -> Self {
        Self {
            service: Arc::new(service),
            codec: Arc::new(codec),
            request_timeout: None,
            ports: Vec::new(),
            workers: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Bound the time a single service call may take.
    ///
    /// Without a deadline a stalling service blocks its port worker
    /// indefinitely. When the deadline elapses the request is answered
    /// with a [`ExceptionCode::ServerDeviceBusy`] exception.
    #[must_use]
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = Some(request_timeout);
        self
    }

    /// Descriptors of all ports registered since startup.
    ///
    /// Ports are never removed, not even after their worker terminated on
    /// a transport error.
    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    /// Broadcast shutdown intent to all port workers.
    ///
    /// Idempotent. Workers check the signal between frames, so an
    /// in-flight read finishes first; call [`Server::join`] to await
    /// their completion.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for all port workers to terminate.
    pub async fn join(&mut self) {
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                warn!("port worker failed: {err}");
            }
        }
    }
}

impl<S, C> Server<S, C>
where
    S: Service<Request = SlaveRequest, Response = AsciiFrame, Exception = ExceptionCode>
        + Send
        + Sync
        + 'static,
    C: AsciiCodec + Send + Sync + 'static,
{
    /// Open a serial port and start serving it as slave with the given
    /// address.
    ///
    /// Freshly read input is discarded until it is line-aligned, then a
    /// dedicated worker for the port is spawned and this call returns.
    pub async fn listen<P: AsRef<Path>>(
        &mut self,
        path: P,
        baud_rate: u32,
        slave: Slave,
    ) -> Result<()> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let mut port = SerialStream::open(&tokio_serial::new(path.as_str(), baud_rate))
            .map_err(io::Error::from)?;
        flush_stale_input(&mut port).await;
        self.ports.push(path);
        self.spawn_worker(port, slave);
        Ok(())
    }

    /// Serve an already connected transport as slave with the given
    /// address.
    ///
    /// Unlike [`Server::listen`] this skips the flush phase; there is no
    /// stale line buffer on a fresh byte pipe.
    pub fn attach<T>(&mut self, transport: T, slave: Slave)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.ports.push(format!("attached:{slave}"));
        self.spawn_worker(transport, slave);
    }

    fn spawn_worker<T>(&mut self, port: T, slave: Slave)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if !slave.is_single_device() {
            warn!("slave address {slave} is outside the single-device range");
        }
        let service = Arc::clone(&self.service);
        let codec = Arc::clone(&self.codec);
        let shutdown = self.shutdown.clone();
        let request_timeout = self.request_timeout;
        let worker = tokio::spawn(accept_ascii_requests(
            port,
            slave,
            service,
            codec,
            shutdown,
            request_timeout,
        ));
        self.workers.push(worker);
    }
}

/// Discard input left over from before the listener attached, so that the
/// first processed frame is line-aligned.
///
/// Chunks are read and dropped as long as a chunk contains more than one
/// line terminator; a timed out, failed or single-line read falls through
/// to normal operation.
async fn flush_stale_input<T: AsyncRead + Unpin>(port: &mut T) {
    let mut buf = [0u8; READ_BUF_LEN];
    loop {
        match timeout(FLUSH_READ_TIMEOUT, port.read(&mut buf)).await {
            Ok(Ok(len)) if count_terminators(&buf[..len]) > 1 => (),
            _ => break,
        }
    }
}

fn count_terminators(buf: &[u8]) -> usize {
    buf.windows(CRLF.len()).filter(|window| *window == CRLF).count()
}

/// The per-port request loop.
///
/// Reads and writes are strictly serialized within this single worker;
/// the serial hardware does not tolerate reading while a write is in
/// progress.
async fn accept_ascii_requests<T, S, C>(
    mut port: T,
    slave: Slave,
    service: Arc<S>,
    codec: Arc<C>,
    shutdown: CancellationToken,
    request_timeout: Option<Duration>,
) where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    S: Service<Request = SlaveRequest, Response = AsciiFrame, Exception = ExceptionCode>
        + Send
        + Sync
        + 'static,
    C: AsciiCodec + Send + Sync + 'static,
{
    let mut buf = [0u8; READ_BUF_LEN];
    loop {
        // Checked once per iteration; an in-flight read is not interrupted,
        // so shutdown latency is bounded by the next read completing.
        if shutdown.is_cancelled() {
            return;
        }

        let len = match port.read(&mut buf).await {
            // Stream is exhausted, the port is gone.
            Ok(0) => {
                debug!("port for slave {slave} closed");
                return;
            }
            Ok(len) => len,
            Err(err) => {
                if err.kind() == io::ErrorKind::UnexpectedEof {
                    debug!("port for slave {slave} closed");
                } else {
                    warn!("serial read error: {err}");
                }
                return;
            }
        };

        let frame = match AsciiFrame::decode(&*codec, &buf[..len]) {
            Ok(frame) => frame,
            Err(err) => {
                // Framing noise is recoverable; discard the line and keep
                // the worker alive.
                warn!("bad serial frame: {err}");
                continue;
            }
        };

        if frame.slave() != slave {
            // not for us -> ignore
            trace!("ignoring frame addressed to slave {}", frame.slave());
            continue;
        }

        let request = SlaveRequest::from(frame.clone());
        let response = match call_service(&*service, request, request_timeout).await {
            Ok(response) => response,
            Err(exception) => {
                let mut response = frame;
                response.set_exception(exception);
                response
            }
        };

        let line = response.encode(&*codec);
        if line.is_empty() {
            // Encoding failed, there is nothing to send.
            continue;
        }
        if let Err(err) = port.write_all(&line).await {
            warn!("serial write error: {err}");
            return;
        }
    }
}

async fn call_service<S>(
    service: &S,
    request: SlaveRequest,
    request_timeout: Option<Duration>,
) -> std::result::Result<AsciiFrame, ExceptionCode>
where
    S: Service<Request = SlaveRequest, Response = AsciiFrame, Exception = ExceptionCode>,
{
    let Some(deadline) = request_timeout else {
        return service.call(request).await;
    };
    match timeout(deadline, service.call(request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("service call timed out after {deadline:?}");
            Err(ExceptionCode::ServerDeviceBusy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{duplex, AsyncWriteExt as _};

    #[test]
    fn count_overlapping_terminators() {
        assert_eq!(count_terminators(b""), 0);
        assert_eq!(count_terminators(b"\r"), 0);
        assert_eq!(count_terminators(b"\r\n"), 1);
        assert_eq!(count_terminators(b"a\r\nb\r\nc\r\n"), 3);
        assert_eq!(count_terminators(b"\r\n\r\n"), 2);
    }

    #[tokio::test]
    async fn flush_discards_stale_lines() {
        let (mut server_side, mut client_side) = duplex(READ_BUF_LEN);
        client_side
            .write_all(b"stale\r\ngarbled\r\npartial\r\n")
            .await
            .unwrap();

        timeout(Duration::from_secs(1), flush_stale_input(&mut server_side))
            .await
            .unwrap();

        // The port is still usable after synchronization.
        client_side.write_all(b"fresh").await.unwrap();
        let mut buf = [0u8; 16];
        let len = server_side.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"fresh");
    }
}
