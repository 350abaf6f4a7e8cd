//! One-shot JSON POST helper over reqwest with an in-memory mock transport for
//! fully deterministic tests.

#![allow(dead_code)]

pub mod adapter;
pub mod mock;

pub use adapter::{
    Client, DEFAULT_TIMEOUT, PostError, PostErrorKind, PostFuture, PostRequest, PostResponse,
    PostResult, PostTransport, ReqwestTransport,
};
pub use mock::{MockBehavior, MockResponse, MockTransport};
