#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The stall timeout elapsed before the source produced the bytes
    /// required to complete the current frame.
    #[error("source stalled")]
    SourceStalled,

    /// The source reached end of stream mid-frame.
    #[error("source closed")]
    SourceClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
