/// Why a dial failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialErrorKind {
    /// Network-level failure opening the connection.
    Connect,
    /// The endpoint rejected the configured credential.
    Auth,
    /// The connect step did not finish within the dial timeout.
    Timeout,
}

/// Failure creating a new connection. Returned to the borrower as-is;
/// the pool never retries a dial on its own.
#[derive(Debug, Clone)]
pub struct DialError {
    kind: DialErrorKind,
    message: String,
}

impl DialError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: DialErrorKind::Connect,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: DialErrorKind::Auth,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: DialErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> DialErrorKind {
        self.kind
    }
}

impl std::error::Error for DialError {}

impl std::fmt::Display for DialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            DialErrorKind::Connect => write!(f, "connect failed: {}", self.message),
            DialErrorKind::Auth => write!(f, "authentication rejected: {}", self.message),
            DialErrorKind::Timeout => write!(f, "dial timed out: {}", self.message),
        }
    }
}

/// A liveness check failed. Only ever seen inside the pool, which closes the
/// connection and moves on to the next candidate.
#[derive(Debug, Clone)]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::error::Error for ValidationError {}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed: {}", self.0)
    }
}

#[derive(Debug)]
pub enum PoolError {
    /// The pool has been closed; no further connections are handed out.
    Closed,
    Dial(DialError),
}

impl From<DialError> for PoolError {
    fn from(err: DialError) -> Self {
        PoolError::Dial(err)
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Closed => None,
            PoolError::Dial(e) => Some(e),
        }
    }
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Closed => write!(f, "pool closed"),
            PoolError::Dial(e) => write!(f, "{}", e),
        }
    }
}
