//! Pipelined request engine for rate-limited marketplace endpoints.
//!
//! A [`PipelinedFetch`] keeps up to `depth` requests in flight against one
//! [`Transport`], records per-reply outcomes in a [`QueryTracker`], and
//! re-dispatches failed items through a [`Worklist`] until every item of a
//! [`BatchOperation`] has been processed or a fatal reply aborts the batch.

pub mod decode;
pub mod pipeline;
pub mod query;
pub mod tracker;
pub mod transport;
pub mod worklist;

pub use decode::{Decode, DecodeError, JsonDecoder, decode_json};
pub use pipeline::{BatchOperation, FetchError, FetchStats, PipelinedFetch, ReplyError};
pub use query::{QueryCode, TransportFailure};
pub use tracker::QueryTracker;
pub use transport::{
    Completion, Execute, QueryFlags, ReplySender, Request, Response, SpawningTransport, Transport,
};
pub use worklist::Worklist;
