use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("serial port error: {0}")]
    Serial(#[from] rppal::uart::Error),
    #[error("sink request failed: {0}")]
    Sink(#[from] reqwest::Error),
    #[error("sink rejected write ({status}): {body}")]
    SinkRejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid sink configuration: {0}")]
    SinkConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
