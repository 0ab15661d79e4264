use std::fmt;

/// Constructs an [`Error`] variant from a format string, e.g.
/// `err!(Storage, "page {} not cached", page_num)`.
macro_rules! err {
    ($kind:ident, $($arg:tt)*) => {
        $crate::errors::Error::$kind(format!($($arg)*))
    };
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Storage(String),
    Transaction(String),
    Query(String),
    /// Every page-cache slot is occupied. Surfaced to the caller as a
    /// statement result rather than a hard failure.
    TableFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error. {}", e),
            Error::Storage(msg) => write!(f, "Storage Error. {}", msg),
            Error::Transaction(msg) => write!(f, "Transaction Error. {}", msg),
            Error::Query(msg) => write!(f, "Query Error. {}", msg),
            Error::TableFull => write!(f, "Table full."),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
