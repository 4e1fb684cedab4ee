use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by grainflow.
#[derive(Debug)]
pub enum Error {
    OutputDeviceError(Box<dyn error::Error + Send + Sync>),
    ParameterError(String),
    SnapshotSlotInvalid(usize),
    SnapshotNotInitialized(usize),
    SendError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputDeviceError(err) => err.fmt(f),
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SnapshotSlotInvalid(slot) => {
                write!(f, "Snapshot slot {slot} is out of range")
            }
            Self::SnapshotNotInitialized(slot) => {
                write!(f, "Snapshot slot {slot} is not initialized")
            }
            Self::SendError(str) => write!(f, "Failed to send channel message: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}
