//! HTTP 中间件 / extractors

pub mod signature;

pub use signature::SignedRequest;
