use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The reply source cannot serve requests right now.
    Unavailable,
    /// The reply did not arrive in time.
    TimedOut,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Unavailable => write!(f, "Reply source unavailable"),
            ErrorKind::TimedOut => write!(f, "Reply timed out"),
            ErrorKind::Other => write!(f, "Reply source failure"),
        }
    }
}
