//! Errors raised by constructors and facade operations.
//!
//! Every error is raised before the target table is touched, so a failed
//! write never leaves a partial entry behind.

/// Failure of a built-in operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A constructor was invoked as a plain call.
    #[error("Constructor {constructor} requires 'new'")]
    ConstructorMisuse { constructor: &'static str },

    /// A method was applied to an object of the wrong internal kind.
    #[error("Method {method} called on incompatible receiver {receiver}")]
    ReceiverMismatch {
        method: &'static str,
        receiver: String,
    },

    /// A write path was handed a non-object key.
    #[error("Invalid value used {usage}")]
    InvalidKey { usage: &'static str },

    /// A WeakMap construction item is not an indexable entry pair.
    #[error("Iterator value {item} is not an entry object")]
    TypeMismatch { item: String },

    /// The bound insertion method (or any invoked property) is not a method.
    #[error("'{property}' of {receiver} is not a function")]
    NotCallable { property: String, receiver: String },

    /// A construction source is neither nullish nor iterable.
    #[error("{value} is not iterable")]
    NotIterable { value: String },

    #[error("Invalid array buffer length")]
    InvalidBufferLength,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
