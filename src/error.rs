#![forbid(unsafe_code)]

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Crate-wide error for operations without a dedicated error type. Profile,
/// probe, and launch failures carry their own types.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn msg<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Self::Message(message.into())
    }
}

#[macro_export]
macro_rules! err {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        $crate::error::Error::msg(format!($fmt $(, $arg)*))
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn err_macro_formats_into_message() {
        let err = crate::err!("subscriber failed: {}", "busy");
        assert_eq!(err.to_string(), "subscriber failed: busy");
    }
}
