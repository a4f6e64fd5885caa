#![allow(dead_code)]

use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cqlink_tokio::cluster::session::{GenericSessionBuilder, Session};
use cqlink_tokio::cluster::ConnectionManager;
use cqlink_tokio::consistency::Consistency;
use cqlink_tokio::error::{Error, Result};
use cqlink_tokio::frame::message_error::{
    AdditionalErrorInfo, ErrorBody, ReadTimeoutError, UnavailableError, WriteTimeoutError,
    WriteType,
};
use cqlink_tokio::frame::message_result::{
    BodyResResultRows, ColSpec, ColType, ResResultBody, RowsMetadata, TableSpec,
};
use cqlink_tokio::frame::{Direction, Flags, Frame, Opcode, Serialize, Version};
use cqlink_tokio::future::BoxFuture;
use cqlink_tokio::load_balancing::LoadBalancingStrategy;
use cqlink_tokio::transport::CqlTransport;
use cqlink_tokio::types::CBytes;

/// What a fake node answers to the next query.
#[derive(Clone, Debug)]
pub enum Reply {
    Rows(Vec<i32>),
    ReadTimeout {
        received: i32,
        block_for: i32,
        data_present: bool,
    },
    WriteTimeout {
        write_type: WriteType,
        received: i32,
        block_for: i32,
    },
    Unavailable {
        required: i32,
        alive: i32,
    },
    Overloaded,
    Syntax,
    /// Never answers.
    Hang,
    /// Drops the connection.
    Disconnect,
}

pub const DEFAULT_ROWS: [i32; 2] = [1, 2];

#[derive(Debug)]
pub struct FakeNode {
    pub address: SocketAddr,
    reachable: AtomicBool,
    replies: Mutex<VecDeque<Reply>>,
    received: Mutex<Vec<Consistency>>,
    connections: AtomicUsize,
}

impl FakeNode {
    fn new(address: SocketAddr) -> Self {
        FakeNode {
            address,
            reachable: AtomicBool::new(true),
            replies: Default::default(),
            received: Default::default(),
            connections: Default::default(),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Consistency of every query received, in order.
    pub fn received(&self) -> Vec<Consistency> {
        self.received.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Rows(DEFAULT_ROWS.to_vec()))
    }
}

pub struct FakeTransport {
    node: Arc<FakeNode>,
    broken: AtomicBool,
}

fn rows_frame(ids: &[i32]) -> Frame {
    let metadata = RowsMetadata::with_global_table_spec(
        TableSpec::new("ks".into(), "t".into()),
        vec![ColSpec::simple("id", ColType::Int)],
    );
    let rows = ids
        .iter()
        .map(|id| vec![CBytes::new(id.to_be_bytes().to_vec())])
        .collect::<Vec<_>>();
    let body = ResResultBody::Rows(BodyResResultRows::from_rows(metadata, &rows, Version::V4));

    Frame::new(
        Version::V4,
        Direction::Response,
        Flags::empty(),
        Opcode::Result,
        1,
        body.serialize_to_vec(Version::V4),
    )
}

fn server_error(addr: SocketAddr, error_code: i32, additional_info: AdditionalErrorInfo) -> Error {
    Error::Server {
        body: ErrorBody {
            error_code,
            message: "scripted failure".into(),
            additional_info,
        },
        addr,
    }
}

impl CqlTransport for FakeTransport {
    fn write_frame<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<Frame>> {
        async move {
            if self.broken.load(Ordering::SeqCst) {
                return Err(Error::ConnectionClosed("connection reset".into()));
            }

            let cl = frame.query_consistency().unwrap_or_default();
            self.node.received.lock().unwrap().push(cl);

            let addr = self.node.address;
            match self.node.next_reply() {
                Reply::Rows(ids) => Ok(rows_frame(&ids)),
                Reply::ReadTimeout {
                    received,
                    block_for,
                    data_present,
                } => Err(server_error(
                    addr,
                    0x1200,
                    AdditionalErrorInfo::ReadTimeout(ReadTimeoutError::new(
                        cl,
                        received,
                        block_for,
                        data_present,
                    )),
                )),
                Reply::WriteTimeout {
                    write_type,
                    received,
                    block_for,
                } => Err(server_error(
                    addr,
                    0x1100,
                    AdditionalErrorInfo::WriteTimeout(WriteTimeoutError {
                        cl,
                        received,
                        block_for,
                        write_type,
                    }),
                )),
                Reply::Unavailable { required, alive } => Err(server_error(
                    addr,
                    0x1000,
                    AdditionalErrorInfo::Unavailable(UnavailableError {
                        cl,
                        required,
                        alive,
                    }),
                )),
                Reply::Overloaded => Err(server_error(addr, 0x1001, AdditionalErrorInfo::Overloaded)),
                Reply::Syntax => Err(server_error(addr, 0x2000, AdditionalErrorInfo::Syntax)),
                Reply::Hang => futures::future::pending().await,
                Reply::Disconnect => {
                    self.broken.store(true, Ordering::SeqCst);
                    Err(Error::ConnectionClosed("connection reset".into()))
                }
            }
        }
        .boxed()
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    fn address(&self) -> SocketAddr {
        self.node.address
    }
}

pub struct FakeConnectionManager {
    nodes: HashMap<SocketAddr, Arc<FakeNode>>,
}

impl ConnectionManager<FakeTransport> for FakeConnectionManager {
    fn connection(&self, addr: SocketAddr) -> BoxFuture<'_, Result<FakeTransport>> {
        async move {
            match self.nodes.get(&addr) {
                Some(node) if node.reachable.load(Ordering::SeqCst) => {
                    node.connections.fetch_add(1, Ordering::SeqCst);
                    Ok(FakeTransport {
                        node: node.clone(),
                        broken: AtomicBool::new(false),
                    })
                }
                _ => Err(Error::Io(io::ErrorKind::ConnectionRefused.into())),
            }
        }
        .boxed()
    }
}

pub type FakeSession<LB> = Session<FakeTransport, FakeConnectionManager, LB>;

pub fn address(last: u8) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, last], 9042))
}

/// Creates `count` fake nodes, all reachable, along with a session builder for them.
pub fn fake_cluster<LB: LoadBalancingStrategy + Send + Sync>(
    count: u8,
    load_balancing: LB,
) -> (
    Vec<Arc<FakeNode>>,
    GenericSessionBuilder<FakeTransport, FakeConnectionManager, LB>,
) {
    let nodes = (1..=count)
        .map(|last| Arc::new(FakeNode::new(address(last))))
        .collect::<Vec<_>>();

    let manager = FakeConnectionManager {
        nodes: nodes
            .iter()
            .map(|node| (node.address, node.clone()))
            .collect(),
    };

    let builder = GenericSessionBuilder::new(
        load_balancing,
        manager,
        nodes.iter().map(|node| node.address).collect(),
    );

    (nodes, builder)
}

/// Reads every `id` of a cursor.
pub fn collect_ids(rows: &mut cqlink_tokio::cluster::RowCursor) -> Vec<i32> {
    let mut ids = vec![];
    while rows.advance().unwrap() {
        ids.push(rows.get_i32(0).unwrap().unwrap());
    }

    ids
}
