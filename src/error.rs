use std::io;

/// Pool error type
#[derive(Debug)]
pub enum ErrorKind {
    /// I/O error, e.g. a worker thread failed to spawn
    Io(std::io::Error),
    /// Pool configured with an out-of-range capacity
    CapacityTooLarge(usize),
    /// Other
    Other(String),
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> ErrorKind {
        ErrorKind::Io(err)
    }
}

/// A specialized `Result` type for pool operations.
pub type Result<T> = std::result::Result<T, ErrorKind>;
