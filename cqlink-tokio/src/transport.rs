//! This module contains a declaration of the `CqlTransport` trait, which should be implemented for
//! a particular transport in order to use it for exchanging frames with a node.
//!
//! [`TransportTcp`] is the default transport, used to establish plain TCP connections. Requests
//! sent over a single transport are multiplexed: each one is tagged with its own stream id and
//! responses are matched back by that id, in whatever order the node sends them.
use cqlink_protocol::frame::{Frame, StreamId, EVENT_STREAM_ID, MAX_STREAM_ID};
use derive_more::Constructor;
use futures::FutureExt;
use fxhash::{FxHashMap, FxHashSet};
use std::collections::hash_map::Entry;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::*;

use crate::frame_parser::{convert_frame_into_result, parse_frame};
use crate::future::BoxFuture;
use crate::Error;
use crate::Result;

/// Requests written to a connection and then abandoned by their callers, which a connection may
/// accumulate before it is considered unresponsive.
pub const MAX_ORPHANED_STREAMS: usize = 1024;

/// General transport trait.
pub trait CqlTransport: Send + Sync {
    /// Schedules data frame for writing and waits for a response. ERROR responses are returned as
    /// [`Error::Server`].
    fn write_frame<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<Frame>>;

    /// Checks if the connection is broken (e.g. after read or write errors)
    fn is_broken(&self) -> bool;

    /// Returns associated node address
    fn address(&self) -> SocketAddr;
}

/// Default Tcp transport.
pub struct TransportTcp {
    inner: AsyncTransport,
}

impl TransportTcp {
    pub async fn new(
        addr: SocketAddr,
        buffer_size: usize,
        tcp_nodelay: bool,
    ) -> io::Result<TransportTcp> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(tcp_nodelay)?;

        let (read_half, write_half) = split(socket);
        Ok(TransportTcp {
            inner: AsyncTransport::new(addr, buffer_size, read_half, write_half),
        })
    }
}

impl CqlTransport for TransportTcp {
    #[inline]
    fn write_frame<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<Frame>> {
        self.inner.write_frame(frame).boxed()
    }

    #[inline]
    fn is_broken(&self) -> bool {
        self.inner.is_broken()
    }

    #[inline]
    fn address(&self) -> SocketAddr {
        self.inner.addr()
    }
}

struct AsyncTransport {
    addr: SocketAddr,
    write_sender: mpsc::Sender<Request>,
    response_handler_map: Arc<ResponseHandlerMap>,
    is_broken: Arc<AtomicBool>,
    processing_handle: JoinHandle<()>,
}

impl Drop for AsyncTransport {
    fn drop(&mut self) {
        self.processing_handle.abort();
    }
}

impl AsyncTransport {
    fn new<T: AsyncRead + AsyncWrite + Send + 'static>(
        addr: SocketAddr,
        buffer_size: usize,
        read_half: ReadHalf<T>,
        write_half: WriteHalf<T>,
    ) -> Self {
        let (write_sender, write_receiver) = mpsc::channel(buffer_size.max(1));
        let is_broken = Arc::new(AtomicBool::new(false));
        let response_handler_map = Arc::new(ResponseHandlerMap::new());

        let processing_handle = tokio::spawn(Self::start_processing(
            addr,
            write_receiver,
            read_half,
            write_half,
            response_handler_map.clone(),
            is_broken.clone(),
        ));

        AsyncTransport {
            addr,
            write_sender,
            response_handler_map,
            is_broken,
            processing_handle,
        }
    }

    #[inline]
    fn is_broken(&self) -> bool {
        self.is_broken.load(Ordering::Relaxed)
    }

    #[inline]
    fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn write_frame(&self, frame: &Frame) -> Result<Frame> {
        if self.is_broken() {
            return Err(Error::ConnectionClosed(format!(
                "Connection to {} is broken",
                self.addr
            )));
        }

        let (sender, receiver) = oneshot::channel();
        let Some(stream_id) = self.response_handler_map.reserve(sender) else {
            self.is_broken.store(true, Ordering::Relaxed);
            return Err(Error::ConnectionClosed(format!(
                "No free stream ids on {}",
                self.addr
            )));
        };

        let mut reservation = StreamReservation::new(self, stream_id);

        self.write_sender
            .send(Request::new(frame.encode(stream_id), stream_id))
            .await
            .map_err(|_| Error::ConnectionClosed("Connection closed when writing data!".into()))?;

        // from now on the id is released by the response, or by the connection failing
        reservation.state = ReservationState::Sent;

        let response = receiver.await;
        reservation.state = ReservationState::Completed;

        let response = response.map_err(|_| {
            Error::ConnectionClosed("Connection closed while waiting for response!".into())
        })??;

        convert_frame_into_result(response, self.addr)
    }

    fn orphan(&self, stream_id: StreamId) {
        let orphaned = self.response_handler_map.orphan(stream_id);
        if orphaned >= MAX_ORPHANED_STREAMS && !self.is_broken.swap(true, Ordering::Relaxed) {
            warn!(
                addr = %self.addr,
                orphaned,
                "Too many requests without response, closing connection"
            );
        }
    }

    async fn start_processing<T: AsyncRead + AsyncWrite>(
        addr: SocketAddr,
        write_receiver: mpsc::Receiver<Request>,
        read_half: ReadHalf<T>,
        write_half: WriteHalf<T>,
        response_handler_map: Arc<ResponseHandlerMap>,
        is_broken: Arc<AtomicBool>,
    ) {
        let writer = Self::start_writing(
            write_receiver,
            BufWriter::new(write_half),
            &response_handler_map,
        );

        let reader = Self::start_reading(read_half, &response_handler_map);

        let result = tokio::try_join!(writer, reader);
        if let Err(error) = result {
            error!(%error, %addr, "Transport error!");

            is_broken.store(true, Ordering::Relaxed);
            response_handler_map.signal_general_error(&error.to_string());
        }
    }

    async fn start_reading<T: AsyncRead>(
        mut read_half: ReadHalf<T>,
        response_handler_map: &ResponseHandlerMap,
    ) -> Result<()> {
        loop {
            let frame = parse_frame(&mut read_half).await?;
            if frame.stream >= 0 {
                response_handler_map.send_response(frame.stream, Ok(frame));
            } else if frame.stream == EVENT_STREAM_ID {
                debug!(opcode = %frame.opcode, "Ignoring server event");
            }
        }
    }

    async fn start_writing(
        mut write_receiver: mpsc::Receiver<Request>,
        mut write_half: impl AsyncWrite + Unpin,
        response_handler_map: &ResponseHandlerMap,
    ) -> Result<()> {
        while let Some(mut request) = write_receiver.recv().await {
            loop {
                if let Err(error) = write_half.write_all(&request.data).await {
                    response_handler_map.send_response(request.stream_id, Err(error.into()));
                    return Err(Error::ConnectionClosed("Write channel failure!".into()));
                }

                request = match write_receiver.try_recv() {
                    Ok(request) => request,
                    Err(_) => break,
                }
            }

            if let Err(error) = write_half.flush().await {
                response_handler_map.send_response(request.stream_id, Err(error.into()));
                return Err(Error::ConnectionClosed("Write channel failure!".into()));
            }
        }

        Ok(())
    }
}

type ResponseHandler = oneshot::Sender<Result<Frame>>;

#[derive(Default)]
struct HandlerState {
    handlers: FxHashMap<StreamId, ResponseHandler>,
    // ids whose requester is gone, still waiting for a response
    orphaned: FxHashSet<StreamId>,
    next_stream_id: StreamId,
}

/// In-flight requests by stream id. An id stays taken until a response for it arrives, even if
/// the requester is gone, so a late response can never be matched with a newer request.
#[derive(Default)]
struct ResponseHandlerMap {
    state: Mutex<HandlerState>,
}

impl ResponseHandlerMap {
    pub fn new() -> Self {
        Default::default()
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, HandlerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assigns a free stream id to the handler.
    pub fn reserve(&self, handler: ResponseHandler) -> Option<StreamId> {
        let mut state = self.lock();
        if state.handlers.len() > MAX_STREAM_ID as usize {
            return None;
        }

        loop {
            let stream_id = state.next_stream_id;
            state.next_stream_id = if stream_id == MAX_STREAM_ID {
                0
            } else {
                stream_id + 1
            };

            if let Entry::Vacant(entry) = state.handlers.entry(stream_id) {
                entry.insert(handler);
                return Some(stream_id);
            }
        }
    }

    #[inline]
    pub fn release(&self, stream_id: StreamId) {
        self.lock().handlers.remove(&stream_id);
    }

    /// Marks a written request as abandoned, unless its response already arrived. Returns the
    /// number of abandoned requests still waiting for a response.
    pub fn orphan(&self, stream_id: StreamId) -> usize {
        let mut state = self.lock();
        if state.handlers.contains_key(&stream_id) {
            state.orphaned.insert(stream_id);
        }

        state.orphaned.len()
    }

    pub fn send_response(&self, stream_id: StreamId, response: Result<Frame>) {
        let handler = {
            let mut state = self.lock();
            state.orphaned.remove(&stream_id);
            state.handlers.remove(&stream_id)
        };

        match handler {
            Some(handler) => {
                // the requester might have been cancelled in the meantime
                let _ = handler.send(response);
            }
            None => warn!(stream_id, "Dropping response for an unmatched stream id"),
        }
    }

    pub fn signal_general_error(&self, error: &str) {
        let handlers = {
            let mut state = self.lock();
            state.orphaned.clear();
            std::mem::take(&mut state.handlers)
        };

        for (_, handler) in handlers {
            let _ = handler.send(Err(Error::ConnectionClosed(error.to_string())));
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.lock().handlers.len()
    }

    #[cfg(test)]
    fn orphaned(&self) -> usize {
        self.lock().orphaned.len()
    }
}

enum ReservationState {
    Reserved,
    Sent,
    Completed,
}

/// Stream id held by a request. Dropped before the request was written, the id is released;
/// dropped while waiting for the response, the id is orphaned.
struct StreamReservation<'a> {
    transport: &'a AsyncTransport,
    stream_id: StreamId,
    state: ReservationState,
}

impl<'a> StreamReservation<'a> {
    fn new(transport: &'a AsyncTransport, stream_id: StreamId) -> Self {
        StreamReservation {
            transport,
            stream_id,
            state: ReservationState::Reserved,
        }
    }
}

impl Drop for StreamReservation<'_> {
    fn drop(&mut self) {
        match self.state {
            ReservationState::Reserved => {
                self.transport.response_handler_map.release(self.stream_id)
            }
            ReservationState::Sent => self.transport.orphan(self.stream_id),
            ReservationState::Completed => {}
        }
    }
}

#[derive(Constructor)]
struct Request {
    data: Vec<u8>,
    stream_id: StreamId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlink_protocol::frame::message_error::{AdditionalErrorInfo, ErrorBody};
    use cqlink_protocol::frame::{Direction, Flags, Opcode, Serialize, Version};
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    fn addr() -> SocketAddr {
        "127.0.0.1:9042".parse().unwrap()
    }

    fn connect() -> (AsyncTransport, DuplexStream) {
        let (client, server) = duplex(64 * 1024);
        let (read_half, write_half) = split(client);
        (AsyncTransport::new(addr(), 16, read_half, write_half), server)
    }

    fn options() -> Frame {
        Frame::new(
            Version::V4,
            Direction::Request,
            Flags::empty(),
            Opcode::Options,
            0,
            vec![],
        )
    }

    fn response(opcode: Opcode, stream: StreamId, body: Vec<u8>) -> Vec<u8> {
        Frame::new(
            Version::V4,
            Direction::Response,
            Flags::empty(),
            opcode,
            stream,
            body,
        )
        .encode(stream)
    }

    #[tokio::test]
    async fn should_match_response_by_stream_id() {
        let (transport, mut server) = connect();

        let node = async {
            let request = parse_frame(&mut server).await.unwrap();
            assert_eq!(request.opcode, Opcode::Options);
            server
                .write_all(&response(Opcode::Supported, request.stream, vec![0, 0]))
                .await
                .unwrap();
        };

        let request = options();
        let (result, _) = tokio::join!(transport.write_frame(&request), node);
        let frame = result.unwrap();

        assert_eq!(frame.opcode, Opcode::Supported);
        assert_eq!(transport.response_handler_map.in_flight(), 0);
    }

    #[tokio::test]
    async fn should_multiplex_out_of_order_responses() {
        let (transport, mut server) = connect();

        let first = options();
        let mut second = options();
        second.opcode = Opcode::Startup;

        let node = async {
            let a = parse_frame(&mut server).await.unwrap();
            let b = parse_frame(&mut server).await.unwrap();
            assert_ne!(a.stream, b.stream);

            // answer in reverse order, echoing the request opcode in the body
            for request in [b, a] {
                let body = vec![u8::from(request.opcode)];
                server
                    .write_all(&response(Opcode::Supported, request.stream, body))
                    .await
                    .unwrap();
            }
        };

        let (first, second, _) = tokio::join!(
            transport.write_frame(&first),
            transport.write_frame(&second),
            node
        );

        assert_eq!(first.unwrap().body, vec![u8::from(Opcode::Options)]);
        assert_eq!(second.unwrap().body, vec![u8::from(Opcode::Startup)]);
    }

    #[tokio::test]
    async fn should_return_server_errors() {
        let (transport, mut server) = connect();

        let node = async {
            let request = parse_frame(&mut server).await.unwrap();
            let body = ErrorBody {
                error_code: 0x1002,
                message: "bootstrapping".into(),
                additional_info: AdditionalErrorInfo::IsBootstrapping,
            };
            server
                .write_all(&response(
                    Opcode::Error,
                    request.stream,
                    body.serialize_to_vec(Version::V4),
                ))
                .await
                .unwrap();
        };

        let request = options();
        let (result, _) = tokio::join!(transport.write_frame(&request), node);
        assert!(matches!(result, Err(Error::Server { .. })));
        assert!(!transport.is_broken());
    }

    #[tokio::test]
    async fn should_fail_pending_requests_when_connection_drops() {
        let (transport, mut server) = connect();

        let node = async {
            parse_frame(&mut server).await.unwrap();
            drop(server);
        };

        let request = options();
        let (result, _) = tokio::join!(transport.write_frame(&request), node);
        assert!(matches!(result, Err(Error::ConnectionClosed(_))));
        assert!(transport.is_broken());

        let error = transport.write_frame(&options()).await.unwrap_err();
        assert!(error.is_connectivity());
    }

    #[tokio::test]
    async fn should_discard_late_response_of_cancelled_request() {
        let (transport, mut server) = connect();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), transport.write_frame(&options()))
                .await;
        assert!(cancelled.is_err());

        let abandoned = parse_frame(&mut server).await.unwrap();
        assert_eq!(transport.response_handler_map.in_flight(), 1);
        assert_eq!(transport.response_handler_map.orphaned(), 1);

        let node = async {
            let request = parse_frame(&mut server).await.unwrap();
            assert_ne!(request.stream, abandoned.stream);

            server
                .write_all(&response(Opcode::Ready, abandoned.stream, vec![]))
                .await
                .unwrap();
            server
                .write_all(&response(Opcode::Supported, request.stream, vec![]))
                .await
                .unwrap();
        };

        let request = options();
        let (result, _) = tokio::join!(transport.write_frame(&request), node);
        assert_eq!(result.unwrap().opcode, Opcode::Supported);
        assert_eq!(transport.response_handler_map.in_flight(), 0);
        assert_eq!(transport.response_handler_map.orphaned(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_break_connection_abandoned_too_often() {
        let (transport, _server) = connect();
        let request = options();

        for _ in 0..MAX_ORPHANED_STREAMS - 1 {
            let cancelled =
                tokio::time::timeout(Duration::from_secs(1), transport.write_frame(&request)).await;
            assert!(cancelled.is_err());
        }

        assert!(!transport.is_broken());

        let cancelled =
            tokio::time::timeout(Duration::from_secs(1), transport.write_frame(&request)).await;
        assert!(cancelled.is_err());
        assert!(transport.is_broken());

        let error = transport.write_frame(&request).await.unwrap_err();
        assert!(error.is_connectivity());
    }

    #[tokio::test]
    async fn should_break_connection_without_free_stream_ids() {
        let (transport, _server) = connect();
        for _ in 0..=MAX_STREAM_ID {
            assert!(transport
                .response_handler_map
                .reserve(oneshot::channel().0)
                .is_some());
        }

        let error = transport.write_frame(&options()).await.unwrap_err();

        assert!(matches!(error, Error::ConnectionClosed(_)));
        assert!(error.is_connectivity());
        assert!(transport.is_broken());
    }

    #[test]
    fn should_count_orphaned_stream_ids_until_answered() {
        let map = ResponseHandlerMap::new();
        let (first_sender, _first) = oneshot::channel();
        let (second_sender, _second) = oneshot::channel();

        let first = map.reserve(first_sender).unwrap();
        let second = map.reserve(second_sender).unwrap();

        assert_eq!(map.orphan(first), 1);

        // answered before its requester went away
        map.send_response(second, Err(Error::Timeout("late".into())));
        assert_eq!(map.orphan(second), 1);

        map.send_response(first, Err(Error::Timeout("late".into())));
        assert_eq!(map.orphaned(), 0);
        assert_eq!(map.in_flight(), 0);
    }

    #[test]
    fn should_wrap_stream_ids() {
        let map = ResponseHandlerMap::new();
        map.lock().next_stream_id = MAX_STREAM_ID;

        let (first, _) = oneshot::channel();
        let (second, _) = oneshot::channel();

        assert_eq!(map.reserve(first), Some(MAX_STREAM_ID));
        assert_eq!(map.reserve(second), Some(0));
    }

    #[test]
    fn should_skip_taken_stream_ids() {
        let map = ResponseHandlerMap::new();

        let ids: Vec<_> = (0..3)
            .map(|_| map.reserve(oneshot::channel().0).unwrap())
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);

        map.release(1);
        map.lock().next_stream_id = 0;

        assert_eq!(map.reserve(oneshot::channel().0), Some(1));
    }
}
