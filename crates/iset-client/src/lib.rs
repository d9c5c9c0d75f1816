//! `ChatBackend` implementations.
//!
//! `HttpBackend` talks to the real assistant API over HTTP. `MockBackend` is
//! an in-memory stand-in with scripted failures and gated replies, used by
//! tests and by the console app's offline mode.

pub mod http;
pub mod mock;

pub use http::HttpBackend;
pub use mock::{MockBackend, MockOp};
