//! # relay-rest
//!
//! Rate-limit-aware REST dispatcher. Routes map to per-bucket queues keyed
//! on path template and major parameter; server headers drive bucket state,
//! 429s re-queue at the head of the line, and a global semaphore caps
//! concurrent requests. Successful entity responses feed the shared cache.

pub mod bucket;
pub mod dispatcher;
pub mod error;
pub mod headers;
pub mod route;

pub use bucket::{Bucket, GlobalLimiter};
pub use dispatcher::{RestDispatcher, ShutdownMode};
pub use error::RestError;
pub use headers::RateLimitInfo;
pub use route::{BucketKey, Route};
