pub mod aggregator;
pub mod audit;
pub mod consumer;
pub mod error;
pub mod publisher;
pub mod repository;
pub mod retry;
pub mod sink;
pub mod storage;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use error::{
    ConnectionError, CycleError, DecodeError, NotFoundError, PersistenceError, PublishError, SourceError,
    UpstreamQueryError,
};
