//! Error types for the server's fallible boundaries: socket setup and the
//! event loop itself. In-command failures never surface here — they travel
//! to the client as an `ERR` reply instead (see [`crate::wire::Value::Err`]).

use std::io;

/// Fatal errors that can stop the process. The binary exits non-zero on
/// any of these, per the bind/listen/poll failure contract.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind listen socket: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to configure listen socket: {0}")]
    Listen(#[source] io::Error),

    #[error("poll registry error: {0}")]
    Poll(#[source] io::Error),
}
