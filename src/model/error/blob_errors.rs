#[derive(PartialEq, Debug)]
pub enum BlobError {
    /// no blob is stored under the handle
    NotFound,
    /// the handle isn't one this store could have produced
    InvalidHandle,
    /// the underlying storage failed
    Io(String),
}

impl std::fmt::Display for BlobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "blob not found"),
            Self::InvalidHandle => write!(f, "invalid blob handle"),
            Self::Io(message) => write!(f, "blob storage failure: {message}"),
        }
    }
}

impl From<std::io::Error> for BlobError {
    fn from(value: std::io::Error) -> Self {
        if value.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(value.to_string())
        }
    }
}
