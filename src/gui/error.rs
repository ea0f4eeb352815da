use std::{error::Error, fmt::Display};

/// Errors from the terminal interface.
#[derive(Debug)]
pub enum GuiError {
    /// The terminal could not be set up, drawn to, or restored
    IOError(std::io::Error),
    /// A background thread panicked
    JoinError,
    /// There was nothing to choose from
    NoDevices,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::IOError(error) => write!(f, "terminal error: {}", error),
            GuiError::JoinError => write!(f, "background thread panicked"),
            GuiError::NoDevices => write!(f, "no serial ports found"),
        }
    }
}

impl Error for GuiError {}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_errors_convert() {
        let err: GuiError = io::Error::new(io::ErrorKind::Other, "no tty").into();
        assert!(matches!(err, GuiError::IOError(_)));
        assert_eq!(err.to_string(), "terminal error: no tty");
    }
}
