//! gRPC service implementation for the commit log.
//!
//! Translates the four `Log` RPCs into storage-engine calls, with an
//! authorization check up front on every request. Domain errors map to
//! wire statuses here: an out-of-range offset becomes `OUT_OF_RANGE` with
//! the offset in the message, authorization failures become
//! `PERMISSION_DENIED` before the log is ever touched, and anything else is
//! an internal error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

use crate::auth::{Authorizer, ACTION_CONSUME, ACTION_PRODUCE, OBJECT_WILDCARD};
use crate::tls::peer_subject;
use keel_proto::v1::log_server::Log as LogRpc;
use keel_proto::v1::{ConsumeRequest, ConsumeResponse, ProduceRequest, ProduceResponse};
use keel_storage::{Error, Log};

/// How long `ConsumeStream` waits before re-checking for a record past the
/// end of the log. A deliberate poll rather than a wakeup: simple, bounded,
/// and cancellable on every iteration.
const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Buffered responses per open stream before backpressure kicks in.
const STREAM_BUFFER: usize = 64;

pub struct LogService {
    log: Arc<Log>,
    authorizer: Arc<dyn Authorizer>,
}

impl LogService {
    pub fn new(log: Arc<Log>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self { log, authorizer }
    }

    fn authorize<T>(&self, request: &Request<T>, action: &str) -> Result<(), Status> {
        let subject = peer_subject(request);
        self.authorizer
            .authorize(&subject, OBJECT_WILDCARD, action)
            .map_err(|err| Status::permission_denied(err.to_string()))
    }
}

/// Map a storage error onto the wire status for unary responses.
fn status_from(err: Error) -> Status {
    match err {
        Error::OffsetOutOfRange(offset) => {
            Status::out_of_range(format!("offset out of range: {offset}"))
        }
        Error::Closed => Status::unavailable("log is closed"),
        Error::Decode(err) => Status::data_loss(format!("stored record is corrupt: {err}")),
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl LogRpc for LogService {
    async fn produce(
        &self,
        request: Request<ProduceRequest>,
    ) -> Result<Response<ProduceResponse>, Status> {
        self.authorize(&request, ACTION_PRODUCE)?;
        let mut record = request
            .into_inner()
            .record
            .ok_or_else(|| Status::invalid_argument("produce request has no record"))?;
        let offset = self.log.append(&mut record).map_err(status_from)?;
        Ok(Response::new(ProduceResponse { offset }))
    }

    async fn consume(
        &self,
        request: Request<ConsumeRequest>,
    ) -> Result<Response<ConsumeResponse>, Status> {
        self.authorize(&request, ACTION_CONSUME)?;
        let offset = request.into_inner().offset;
        let record = self.log.read(offset).map_err(status_from)?;
        Ok(Response::new(ConsumeResponse {
            record: Some(record),
        }))
    }

    type ConsumeStreamStream = ReceiverStream<Result<ConsumeResponse, Status>>;

    async fn consume_stream(
        &self,
        request: Request<ConsumeRequest>,
    ) -> Result<Response<Self::ConsumeStreamStream>, Status> {
        self.authorize(&request, ACTION_CONSUME)?;
        let mut offset = request.into_inner().offset;
        let log = Arc::clone(&self.log);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            debug!(offset, "consume stream opened");
            loop {
                match log.read(offset) {
                    Ok(record) => {
                        let response = ConsumeResponse {
                            record: Some(record),
                        };
                        if tx.send(Ok(response)).await.is_err() {
                            break; // client went away
                        }
                        offset += 1;
                    }
                    // Past the end of the log: the record simply hasn't
                    // been written yet. Wait and try again. This is the
                    // one place an error is absorbed rather than surfaced.
                    Err(Error::OffsetOutOfRange(_)) => {
                        if tx.is_closed() {
                            break;
                        }
                        tokio::time::sleep(TAIL_POLL_INTERVAL).await;
                    }
                    Err(err) => {
                        let _ = tx.send(Err(status_from(err))).await;
                        break;
                    }
                }
            }
            debug!(offset, "consume stream closed");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type ProduceStreamStream = ReceiverStream<Result<ProduceResponse, Status>>;

    async fn produce_stream(
        &self,
        request: Request<Streaming<ProduceRequest>>,
    ) -> Result<Response<Self::ProduceStreamStream>, Status> {
        self.authorize(&request, ACTION_PRODUCE)?;
        let mut requests = request.into_inner();
        let log = Arc::clone(&self.log);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            loop {
                let result = match requests.message().await {
                    Ok(Some(req)) => match req.record {
                        Some(mut record) => log
                            .append(&mut record)
                            .map(|offset| ProduceResponse { offset })
                            .map_err(status_from),
                        None => Err(Status::invalid_argument("produce request has no record")),
                    },
                    Ok(None) => break, // client finished sending
                    Err(status) => {
                        let _ = tx.send(Err(status)).await;
                        break;
                    }
                };
                let failed = result.is_err();
                if tx.send(result).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
