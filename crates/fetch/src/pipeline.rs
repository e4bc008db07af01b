//! Pipelined fetch loop.
//!
//! One [`PipelinedFetch`] per endpoint. It owns the endpoint's transport and
//! pipeline depth, and runs one [`BatchOperation`] at a time. The
//! outstanding-request count belongs to the run, so a run dropped mid-flight
//! leaves nothing behind for the next one:
//!
//! 1. dispatch undispatched items until `depth` requests are in flight;
//! 2. wait until at most `min(depth - 1, outstanding - 1)` remain in flight,
//!    then drain whatever else already completed;
//! 3. feed each reply to the tracker; re-arm retryable failures in the
//!    worklist and hand successes to [`BatchOperation::process`].
//!
//! A fatal reply stops dispatch, but in-flight requests are always drained
//! before the loop returns.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use lotsync_core::DomainError;

use crate::decode::DecodeError;
use crate::query::QueryCode;
use crate::tracker::QueryTracker;
use crate::transport::{Completion, QueryFlags, ReplySender, Request, Response, Transport};
use crate::worklist::Worklist;

/// Failure of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("batch aborted at item {index}: {code}")]
    Aborted { index: usize, code: QueryCode },

    #[error("item {index} still failing after {attempts} attempts")]
    RetriesExhausted { index: usize, attempts: u32 },

    #[error("pipeline depth must be at least 1")]
    InvalidPipelineDepth,
}

/// Failure of [`BatchOperation::process`]. Always fatal for the batch.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("processing failed: {0}")]
    Process(String),
}

impl ReplyError {
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    /// Result code the tracker records for this failure.
    pub fn code(&self) -> QueryCode {
        match self {
            ReplyError::Decode(_) => QueryCode::ParseError,
            ReplyError::Process(_) => QueryCode::ProcessError,
        }
    }
}

impl From<DomainError> for ReplyError {
    fn from(value: DomainError) -> Self {
        Self::Process(value.to_string())
    }
}

/// N independent requests whose replies are processed one by one.
pub trait BatchOperation {
    /// Number of items; indices run over `0..len()`.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Request for item `index`. Called again on every retry.
    fn request(&self, index: usize) -> Request;

    /// Consume the successful reply for item `index`.
    fn process(&mut self, index: usize, response: Response) -> Result<(), ReplyError>;

    fn flags(&self) -> QueryFlags {
        QueryFlags::default()
    }

    /// Short name for logs.
    fn label(&self) -> &'static str {
        "batch"
    }
}

/// Counters of a completed batch.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub dispatched: usize,
    pub succeeded: usize,
    pub retried: usize,
}

pub struct PipelinedFetch {
    endpoint: String,
    transport: Arc<dyn Transport>,
    depth: usize,
    max_item_attempts: Option<u32>,
}

impl core::fmt::Debug for PipelinedFetch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PipelinedFetch")
            .field("endpoint", &self.endpoint)
            .field("depth", &self.depth)
            .field("max_item_attempts", &self.max_item_attempts)
            .finish_non_exhaustive()
    }
}

impl PipelinedFetch {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        depth: usize,
    ) -> Result<Self, FetchError> {
        if depth == 0 {
            return Err(FetchError::InvalidPipelineDepth);
        }
        Ok(Self {
            endpoint: endpoint.into(),
            transport,
            depth,
            max_item_attempts: None,
        })
    }

    /// Cap the dispatches of any single item; `None` retries forever.
    pub fn with_max_item_attempts(mut self, max: Option<u32>) -> Self {
        self.max_item_attempts = max.filter(|max| *max > 0);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Fetch and process every item of `op`.
    ///
    /// On error no item's side effects should be trusted by the caller.
    pub async fn run<B>(&mut self, op: &mut B) -> Result<FetchStats, FetchError>
    where
        B: BatchOperation + ?Sized,
    {
        let n = op.len();
        let flags = op.flags();
        let depth = if flags.pipelineable { self.depth } else { 1 };
        let operation = op.label();

        let (queue, mut completions) = mpsc::unbounded_channel::<Completion>();
        let mut tracker = QueryTracker::new();
        let mut worklist = Worklist::new(n);
        let mut attempts = vec![0u32; n];
        let mut stats = FetchStats::default();
        let mut abort: Option<FetchError> = None;
        let mut outstanding = 0usize;

        loop {
            if !tracker.failed() {
                for index in worklist.next_batch(depth.saturating_sub(outstanding)) {
                    worklist.mark_dispatched(index);
                    attempts[index] += 1;
                    stats.dispatched += 1;
                    outstanding += 1;
                    debug!(
                        endpoint = %self.endpoint,
                        operation,
                        index,
                        attempt = attempts[index],
                        "dispatching request"
                    );
                    self.transport.enqueue(
                        op.request(index),
                        flags,
                        ReplySender::new(index, queue.clone()),
                    );
                }
            }

            if outstanding == 0 {
                break;
            }

            let wait_count = (depth - 1).min(outstanding - 1);
            let mut drained = Vec::new();
            while outstanding - drained.len() > wait_count {
                // `queue` lives as long as this loop, so the channel stays open.
                let Some(completion) = completions.recv().await else {
                    error!(
                        endpoint = %self.endpoint,
                        operation,
                        outstanding,
                        "completion queue closed"
                    );
                    return Err(FetchError::Aborted {
                        index: n,
                        code: QueryCode::SystemError,
                    });
                };
                drained.push(completion);
            }
            while drained.len() < outstanding {
                match completions.try_recv() {
                    Ok(completion) => drained.push(completion),
                    Err(_) => break,
                }
            }
            outstanding -= drained.len();

            for Completion { index, outcome } in drained {
                let code = match outcome {
                    Ok(response) if response.is_success() => match op.process(index, response) {
                        Ok(()) => {
                            stats.succeeded += 1;
                            debug!(endpoint = %self.endpoint, operation, index, "reply processed");
                            QueryCode::Success
                        }
                        Err(err) => {
                            error!(
                                endpoint = %self.endpoint,
                                operation,
                                index,
                                error = %err,
                                "reply processing failed"
                            );
                            err.code()
                        }
                    },
                    Ok(response) => QueryCode::HttpError(response.status),
                    // A transport must not report success without a response.
                    Err(QueryCode::Success) => QueryCode::SystemError,
                    Err(code) => code,
                };

                if code.is_success() {
                    tracker.accumulate(&code, false);
                    continue;
                }

                let retryable = flags.allows_retry(&code);
                let exhausted = self
                    .max_item_attempts
                    .is_some_and(|max| attempts[index] >= max);

                if retryable && !exhausted {
                    tracker.accumulate(&code, true);
                    worklist.mark_failed(index);
                    stats.retried += 1;
                    warn!(
                        endpoint = %self.endpoint,
                        operation,
                        index,
                        attempt = attempts[index],
                        %code,
                        "request failed, re-queued"
                    );
                    continue;
                }

                tracker.accumulate(&code, false);
                let err = if retryable {
                    FetchError::RetriesExhausted {
                        index,
                        attempts: attempts[index],
                    }
                } else {
                    FetchError::Aborted {
                        index,
                        code: code.clone(),
                    }
                };
                if abort.is_none() {
                    error!(
                        endpoint = %self.endpoint,
                        operation,
                        index,
                        %code,
                        outstanding,
                        "fatal reply, draining batch"
                    );
                    abort = Some(err);
                }
            }
        }

        if let Some(err) = abort {
            return Err(err);
        }

        info!(
            endpoint = %self.endpoint,
            operation,
            items = n,
            dispatched = stats.dispatched,
            retried = stats.retried,
            "batch complete"
        );
        Ok(stats)
    }

    /// Run a single request through the loop, with the same retry rules.
    pub async fn fetch_one(
        &mut self,
        request: Request,
        flags: QueryFlags,
    ) -> Result<Response, FetchError> {
        let mut single = Single {
            request,
            flags,
            response: None,
        };
        self.run(&mut single).await?;
        single.response.ok_or(FetchError::Aborted {
            index: 0,
            code: QueryCode::SystemError,
        })
    }
}

struct Single {
    request: Request,
    flags: QueryFlags,
    response: Option<Response>,
}

impl BatchOperation for Single {
    fn len(&self) -> usize {
        1
    }

    fn request(&self, _index: usize) -> Request {
        self.request.clone()
    }

    fn process(&mut self, _index: usize, response: Response) -> Result<(), ReplyError> {
        self.response = Some(response);
        Ok(())
    }

    fn flags(&self) -> QueryFlags {
        self.flags
    }

    fn label(&self) -> &'static str {
        "single"
    }
}
