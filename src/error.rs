use std::{borrow::Cow, error, fmt};

/**
An error produced by a [`Client`](crate::Client).

Only three variants ever reach callers of [`Client::append`](crate::Client::append):
[`Error::MissingAppName`] and [`Error::MissingHostName`] at construction time,
and [`Error::MissingService`] when an event payload cannot be normalized.
Transport failures are absorbed by the client's best-effort error reporting
and only surface from the escape hatches that opt out of that policy, like
[`Client::raw`](crate::Client::raw).
*/
#[derive(Debug)]
pub enum Error {
    /**
    The resolved application name was empty at construction time.
    */
    MissingAppName,
    /**
    The resolved reporting host was empty at construction time.
    */
    MissingHostName,
    /**
    An event payload had no usable `service` field.

    This is a bug in the calling code rather than a transport condition, so
    it propagates instead of being swallowed.
    */
    MissingService,
    /**
    The connection to the collector failed.
    */
    Transport(TransportError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingAppName => f.write_str("the resolved app name is empty"),
            Error::MissingHostName => f.write_str("the resolved reporting host is empty"),
            Error::MissingService => {
                f.write_str("the event payload is missing a non-empty service")
            }
            Error::Transport(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

/**
A failure to connect to the collector, or to write or read a frame on the
established stream.
*/
pub struct TransportError {
    msg: Cow<'static, str>,
    source: Option<Box<dyn error::Error + Send + Sync>>,
}

impl TransportError {
    pub(crate) fn new(
        msg: impl Into<Cow<'static, str>>,
        source: impl error::Error + Send + Sync + 'static,
    ) -> Self {
        TransportError {
            msg: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn msg(msg: impl Into<Cow<'static, str>>) -> Self {
        TransportError {
            msg: msg.into(),
            source: None,
        }
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("TransportError");

        debug.field("msg", &self.msg);

        if let Some(ref source) = self.source {
            debug.field("source", source);
        }

        debug.finish()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(ref source) => write!(f, "{}: {}", self.msg, source),
            None => f.write_str(&self.msg),
        }
    }
}

impl error::Error for TransportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn error::Error + 'static))
    }
}
