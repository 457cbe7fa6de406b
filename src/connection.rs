//! Talking to the heat pump.
//!
//! The device transport itself is owned by a gateway process (a Tuya local bridge or similar).
//! We talk to it over TCP using newline delimited JSON:
//!
//! ```text
//! > {"id":7,"device":"heatpump","op":"set","dps":{"2":"heating","4":26}}
//! < {"id":7,"ok":true}
//! > {"id":8,"device":"heatpump","op":"query"}
//! < {"id":8,"ok":true,"dps":{"1":true,"2":"heating","4":26,"15":0,"16":25}}
//! < {"dps":{"16":26}}
//! ```
//!
//! Messages without an `id` are unsolicited state pushes from the device.

use crate::datapoints::{DatapointWrites, Datapoints};
use futures::{SinkExt as _, StreamExt as _};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{Notify, watch};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, trace, warn};

/// Longest line we are willing to buffer from the gateway.
const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no gateway address was specified (see `--gateway`)")]
    NoGateway,
    #[error("lookup of `{1}` failed")]
    LookupHost(#[source] std::io::Error, String),
    #[error("could not connect to `{1}` over TCP")]
    Connect(#[source] std::io::Error, String),
    #[error("scheduling a request failed")]
    ScheduleRequest(#[source] SendError<Request>),
    #[error("could not encode the request")]
    Encode(#[source] serde_json::Error),
    #[error("could not send out the request")]
    Send(#[source] LinesCodecError),
    #[error("could not read data from the gateway")]
    Receive(#[source] LinesCodecError),
    #[error("could not shut down the connection")]
    Shutdown(#[source] LinesCodecError),
    #[error("the gateway closed the connection")]
    Closed,
    #[error("connection was lost before request {0} was acknowledged")]
    ConnectionLost(u16),
    #[error("request {0} was not acknowledged within {1:?}")]
    AckTimeout(u16, Duration),
    #[error("the gateway rejected request {0}: {1}")]
    Rejected(u16, String),
    #[error("the connection worker has failed")]
    Worker(#[source] tokio::task::JoinError),
}

/// Something that owns the device transport and can apply datapoint writes.
#[allow(async_fn_in_trait)]
pub trait DeviceConnection {
    /// The last known state of the device.
    fn datapoints(&self) -> Datapoints;

    /// Submit `writes` as a single request and wait for the device to acknowledge it.
    async fn set_properties(&self, writes: DatapointWrites) -> Result<(), Error>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Request {
    pub id: u16,
    pub device: String,
    #[serde(flatten)]
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Set { dps: DatapointWrites },
    Query,
}

/// Anything the gateway may send to us.
#[derive(Debug, Default, serde::Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<u16>,
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub dps: Option<Datapoints>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub ok: bool,
    pub error: Option<String>,
}

/// Matches replies coming from the worker with the callers waiting for them.
#[derive(Default)]
pub struct ResponseTracker {
    responses: Mutex<Responses>,
    change_notify: Notify,
}

#[derive(Default)]
struct Responses {
    /// `None` marks a request that will never be answered.
    replies: BTreeMap<u16, Option<Reply>>,
    /// Requests nobody waits for anymore. Their replies are dropped on arrival.
    abandoned: BTreeSet<u16>,
}

impl ResponseTracker {
    /// Start tracking `transaction_id`, discarding anything left over from an earlier request
    /// that used the same id.
    pub fn register(&self, transaction_id: u16) {
        let mut guard = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        guard.replies.remove(&transaction_id);
        guard.abandoned.remove(&transaction_id);
    }

    pub fn mark_lost(&self, transaction_id: u16) {
        self.complete(transaction_id, None);
    }

    pub fn add_response(&self, transaction_id: u16, reply: Reply) {
        self.complete(transaction_id, Some(reply));
    }

    fn complete(&self, transaction_id: u16, reply: Option<Reply>) {
        let mut guard = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        if guard.abandoned.remove(&transaction_id) {
            debug!(message = "dropping reply to an abandoned request", transaction = transaction_id);
            return;
        }
        guard.replies.insert(transaction_id, reply);
        self.change_notify.notify_waiters();
        drop(guard);
    }

    /// Stop waiting for `transaction_id`. A reply arriving later is dropped.
    pub fn forget(&self, transaction_id: u16) {
        let mut guard = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        if guard.replies.remove(&transaction_id).is_none() {
            guard.abandoned.insert(transaction_id);
        }
    }

    pub async fn wait_for(&self, transaction_id: u16) -> Option<Reply> {
        loop {
            // Register interest before looking, otherwise a reply landing in between is missed.
            let notified = self.change_notify.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();
            {
                let mut guard = self.responses.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(v) = guard.replies.remove(&transaction_id) {
                    return v;
                }
            }
            notified.await;
        }
    }
}

#[derive(clap::Parser, Clone, Debug)]
#[group(id = "connection::Args")]
pub struct Args {
    /// Address (`host:port`) of the gateway relaying datapoints to and from the heat pump.
    #[arg(long)]
    pub gateway: Option<String>,

    /// The device ID as known to the gateway.
    #[arg(long, short = 'i', default_value = "heatpump")]
    pub device_id: String,

    /// Consider a request failed if the gateway does not acknowledge it in this amount of time.
    #[arg(long, default_value = "3s")]
    pub ack_timeout: humantime::Duration,
}

/// A connection to a heat pump via the gateway.
pub struct GatewayConnection {
    request_queue: UnboundedSender<Request>,
    worker: AbortOnDropHandle<Result<(), Error>>,
    response_tracker: Arc<ResponseTracker>,
    state: watch::Receiver<Datapoints>,
    transaction_id_generator: AtomicU16,
    args: Args,
}

impl GatewayConnection {
    pub async fn new(args: Args) -> Result<Self, Error> {
        let address = args.gateway.as_deref().ok_or(Error::NoGateway)?;
        let io = connect(address).await?;
        let (request_queue, jobs) = tokio::sync::mpsc::unbounded_channel();
        let (state_sender, state) = watch::channel(Datapoints::new());
        let response_tracker = Arc::new(ResponseTracker::default());
        let worker = GatewayWorker {
            responses: Arc::clone(&response_tracker),
            state: state_sender,
            inflight: Vec::with_capacity(4),
        };
        Ok(Self {
            request_queue,
            worker: AbortOnDropHandle::new(tokio::spawn(worker.main_loop(io, jobs))),
            response_tracker,
            state,
            transaction_id_generator: AtomicU16::new(0),
            args,
        })
    }

    pub fn new_transaction_id(&self) -> u16 {
        self.transaction_id_generator.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn send(&self, operation: Operation) -> Result<Reply, Error> {
        let id = self.new_transaction_id();
        let request = Request { id, device: self.args.device_id.clone(), operation };
        self.response_tracker.register(id);
        self.request_queue.send(request).map_err(Error::ScheduleRequest)?;
        let timeout = *self.args.ack_timeout;
        let reply = match tokio::time::timeout(timeout, self.response_tracker.wait_for(id)).await {
            Err(_) => {
                self.response_tracker.forget(id);
                return Err(Error::AckTimeout(id, timeout));
            }
            Ok(None) => return Err(Error::ConnectionLost(id)),
            Ok(Some(reply)) => reply,
        };
        if !reply.ok {
            return Err(Error::Rejected(id, reply.error.unwrap_or_default()));
        }
        Ok(reply)
    }

    /// Ask the gateway for the full device state.
    pub async fn refresh(&self) -> Result<Datapoints, Error> {
        self.send(Operation::Query).await?;
        Ok(self.datapoints())
    }

    /// Stop the worker after all queued requests have been sent out.
    pub async fn shutdown(self) -> Result<(), Error> {
        let Self { request_queue, worker, .. } = self;
        drop(request_queue);
        worker.await.map_err(Error::Worker)?
    }
}

impl DeviceConnection for GatewayConnection {
    fn datapoints(&self) -> Datapoints {
        self.state.borrow().clone()
    }

    async fn set_properties(&self, writes: DatapointWrites) -> Result<(), Error> {
        self.send(Operation::Set { dps: writes }).await.map(|_| ())
    }
}

type GatewayIo = Framed<TcpStream, LinesCodec>;

async fn connect(address: &str) -> Result<GatewayIo, Error> {
    info!(message = "connecting...", address);
    let addresses = tokio::net::lookup_host(address)
        .await
        .map_err(|e| Error::LookupHost(e, address.to_string()))?
        .collect::<Vec<_>>();
    debug!(message = "resolved", ?addresses);
    let socket = TcpStream::connect(&*addresses)
        .await
        .map_err(|e| Error::Connect(e, address.to_string()))?;
    let nodelay_result = socket.set_nodelay(true);
    trace!(message = "setting nodelay", is_error = ?nodelay_result.err());
    info!(message = "connected");
    Ok(Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)))
}

struct GatewayWorker {
    responses: Arc<ResponseTracker>,
    state: watch::Sender<Datapoints>,
    /// Requests sent out that have not been replied to yet.
    inflight: Vec<u16>,
}

impl GatewayWorker {
    async fn main_loop(mut self, io: GatewayIo, jobs: UnboundedReceiver<Request>) -> Result<(), Error> {
        let result = self.run(io, jobs).await;
        if let Err(e) = &result {
            warn!(message = "gateway connection failed", error = (e as &dyn std::error::Error));
        }
        for transaction_id in self.inflight.drain(..) {
            self.responses.mark_lost(transaction_id);
        }
        result
    }

    async fn run(&mut self, io: GatewayIo, mut jobs: UnboundedReceiver<Request>) -> Result<(), Error> {
        let (mut io_sink, mut io_source) = io.split();
        loop {
            tokio::select! {
                job = jobs.recv() => {
                    let Some(request) = job else {
                        return io_sink.close().await.map_err(Error::Shutdown);
                    };
                    let line = serde_json::to_string(&request).map_err(Error::Encode)?;
                    trace!(message = "sending request", transaction = request.id, %line);
                    self.inflight.push(request.id);
                    io_sink.send(line).await.map_err(Error::Send)?;
                }
                line = io_source.next() => {
                    match line {
                        None => return Err(Error::Closed),
                        Some(Err(e)) => return Err(Error::Receive(e)),
                        Some(Ok(line)) => self.handle_line(&line),
                    }
                }
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let message = match serde_json::from_str::<Message>(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(message = "ignoring malformed gateway message", line, error = %e);
                return;
            }
        };
        if let Some(dps) = message.dps {
            let mut changed = 0;
            self.state.send_modify(|state| changed = state.apply(dps));
            debug!(message = "datapoints updated", changed);
        }
        let Some(transaction_id) = message.id else {
            return;
        };
        let Some(index) = self.inflight.iter().position(|id| *id == transaction_id) else {
            debug!(message = "a reply we were not expecting", transaction = transaction_id);
            return;
        };
        self.inflight.swap_remove(index);
        let ok = message.ok.unwrap_or(message.error.is_none());
        trace!(message = "decoded a reply", transaction = transaction_id, ok);
        self.responses.add_response(transaction_id, Reply { ok, error: message.error });
    }
}
