//! Crate-level error type. Hand-rolled `Display`/`std::error::Error` impls,
//! the way the teacher repo's `ProtocolError` is written, rather than a
//! `thiserror` derive.

/// The six error kinds from spec §7, each carrying the data needed to act on
/// it (log it usefully, retry it, or surface it to the caller).
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A distribution summed to outside `[1 - 1e-6, 1 + 1e-6]`, contained a
    /// negative entry, or (for a byte model) had a length other than 256.
    InvalidDistribution { detail: String },
    /// The byte-level model assigned non-zero probability to a byte that is
    /// illegal at the current UTF-8 boundary.
    IllegalUtf8 { byte: u8, boundary: String },
    /// Division by zero in `Rat` arithmetic, or a non-finite `f64` passed to
    /// `Rat::from_float`.
    ArithmeticError { detail: String },
    /// The external byte-level model's prediction failed (timeout, network,
    /// backend error). Carries the backend's message, not its error type,
    /// since the backend is an external collaborator this crate doesn't own.
    ModelFailure { detail: String },
    /// The operation was aborted via its cancellation handle. Per policy this
    /// is silent — callers should not normally see this variant surface from
    /// a stream (the stream simply ends), but it is kept as a value for
    /// callers that need to distinguish "ended" from "ended because
    /// cancelled".
    Cancelled,
    /// The normaliser or scene builder hit `maxDepth` without converging.
    /// Policy: the caller still receives the best partial result; this value
    /// accompanies it as a warning, it is not fatal.
    DepthExceeded { depth: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDistribution { detail } => {
                write!(f, "invalid distribution: {detail}")
            }
            Self::IllegalUtf8 { byte, boundary } => {
                write!(f, "illegal utf-8 byte 0x{byte:02x} at boundary {boundary}")
            }
            Self::ArithmeticError { detail } => write!(f, "arithmetic error: {detail}"),
            Self::ModelFailure { detail } => write!(f, "model failure: {detail}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::DepthExceeded { depth } => write!(f, "depth exceeded ({depth})"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
