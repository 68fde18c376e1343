#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A packet claims more bytes than remain in its source.
    #[error("truncated packet at byte {offset}: need {needed} bytes, {available} available")]
    TruncatedPacket {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A telemetry payload is too short for the layout it is decoded with.
    #[error("{record} payload too short: got {actual} bytes, need at least {minimum}")]
    SchemaMismatch {
        record: &'static str,
        actual: usize,
        minimum: usize,
    },

    #[error("variable {0} not present in product")]
    UnknownVariable(String),
    #[error("group or variable {0} not present in product")]
    UnknownTarget(String),
    #[error("dimension {0} not present in product")]
    UnknownDimension(String),

    #[error("product is closed")]
    ClosedProduct,
    #[error("product is opened read-only")]
    ReadOnlyProduct,

    #[error("shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("image size changed within measurement: expected {expected} samples, got {actual}")]
    ImageSize { expected: usize, actual: usize },

    /// Product file or schema content is not usable.
    #[error("invalid product: {0}")]
    Format(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
