use serde::{de, ser};
use std::fmt::{self, Display};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Message(String),
    ExpectedChar,
    ExpectedStr,
    ExpectedI64,
    ExpectedBool,
    ExpectedList,
    ExpectedAbsent,
}

impl std::error::Error for Error {}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Message(msg) => write!(f, "{}", msg),
            Error::ExpectedChar => write!(f, "Expected Char"),
            Error::ExpectedStr => write!(f, "Expected Str"),
            Error::ExpectedI64 => write!(f, "Expected I64"),
            Error::ExpectedBool => write!(f, "Expected Bool"),
            Error::ExpectedList => write!(f, "Expected List"),
            Error::ExpectedAbsent => write!(f, "Expected Absent"),
        }
    }
}
