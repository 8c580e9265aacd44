//! Error types and NFSv3 status translation for the nsbridge gateway

use thiserror::Error;

/// NFSv3 status: OK (success)
pub const NFS3_OK: u32 = 0;
/// NFSv3 status: no such file or directory
pub const NFS3ERR_NOENT: u32 = 2;
/// NFSv3 status: I/O error
pub const NFS3ERR_IO: u32 = 5;
/// NFSv3 status: permission denied
pub const NFS3ERR_ACCES: u32 = 13;
/// NFSv3 status: file exists
pub const NFS3ERR_EXIST: u32 = 17;
/// NFSv3 status: not a directory
pub const NFS3ERR_NOTDIR: u32 = 20;
/// NFSv3 status: is a directory
pub const NFS3ERR_ISDIR: u32 = 21;
/// NFSv3 status: invalid argument
pub const NFS3ERR_INVAL: u32 = 22;
/// NFSv3 status: filename too long
pub const NFS3ERR_NAMETOOLONG: u32 = 63;
/// NFSv3 status: directory not empty
pub const NFS3ERR_NOTEMPTY: u32 = 66;
/// NFSv3 status: READDIR cookie is stale or out of range
pub const NFS3ERR_BAD_COOKIE: u32 = 10003;

/// Failure kinds reported by a [`Namespace`](crate::namespace::Namespace) backend.
///
/// "Directory not empty" has no dedicated kind; backends report it through
/// [`NamespaceError::Other`] and it is recognized by message content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    /// The path does not exist
    #[error("file does not exist")]
    NotFound,
    /// The caller may not perform the operation
    #[error("permission denied")]
    PermissionDenied,
    /// The request was malformed for this object
    #[error("invalid argument")]
    InvalidArgument,
    /// The target already exists
    #[error("file already exists")]
    AlreadyExists,
    /// End of file reached after a partial transfer
    #[error("unexpected EOF after {transferred} bytes")]
    Eof {
        /// Bytes moved before the end of file was hit
        transferred: usize,
    },
    /// Any other backend failure
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for NamespaceError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => NamespaceError::NotFound,
            std::io::ErrorKind::PermissionDenied => NamespaceError::PermissionDenied,
            std::io::ErrorKind::InvalidInput => NamespaceError::InvalidArgument,
            std::io::ErrorKind::AlreadyExists => NamespaceError::AlreadyExists,
            std::io::ErrorKind::UnexpectedEof => NamespaceError::Eof { transferred: 0 },
            _ => NamespaceError::Other(e.to_string()),
        }
    }
}

/// Maps a backend outcome to an NFSv3 status code.
///
/// The second element is `false` when the error fell into the generic I/O
/// bucket, so the caller can log the full operation context.
pub fn translate(err: Option<&NamespaceError>) -> (u32, bool) {
    let err = match err {
        None => return (NFS3_OK, true),
        Some(e) => e,
    };
    match err {
        NamespaceError::NotFound => (NFS3ERR_NOENT, true),
        NamespaceError::PermissionDenied => (NFS3ERR_ACCES, true),
        NamespaceError::InvalidArgument => (NFS3ERR_INVAL, true),
        NamespaceError::AlreadyExists => (NFS3ERR_EXIST, true),
        other if other.to_string().contains("not empty") => (NFS3ERR_NOTEMPTY, true),
        _ => (NFS3ERR_IO, false),
    }
}

/// Error types for gateway-level failures.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// NFS: no such file or directory
    #[error("NFS: no such file or directory")]
    Nfs3NoEnt,
    /// NFS: not a directory
    #[error("NFS: not a directory")]
    Nfs3NotDir,
    /// NFS: is a directory
    #[error("NFS: is a directory")]
    Nfs3IsDir,
    /// NFS: invalid argument
    #[error("NFS: invalid argument: {reason}")]
    Nfs3Inval {
        /// What was wrong with the argument
        reason: String,
    },
    /// NFS: name does not fit the caller's name slot
    #[error("NFS: name too long: {name}")]
    Nfs3NameTooLong {
        /// The offending entry name
        name: String,
    },
    /// NFS: READDIR cookie beyond the end of the listing
    #[error("NFS: bad cookie {cookie} for listing of {len} entries")]
    Nfs3BadCookie {
        /// The requested resume position
        cookie: u64,
        /// Number of entries in the listing
        len: usize,
    },
    /// Configuration was rejected
    #[error("Config error: {reason}")]
    ConfigError {
        /// The configuration problem
        reason: String,
    },
    /// Backend namespace error
    #[error("Namespace error: {0}")]
    Namespace(#[from] NamespaceError),
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GatewayError {
    /// Converts the error to an NFSv3 status code for protocol responses.
    pub fn nfs3_status(&self) -> u32 {
        match self {
            GatewayError::Nfs3NoEnt => NFS3ERR_NOENT,
            GatewayError::Nfs3NotDir => NFS3ERR_NOTDIR,
            GatewayError::Nfs3IsDir => NFS3ERR_ISDIR,
            GatewayError::Nfs3Inval { .. } => NFS3ERR_INVAL,
            GatewayError::Nfs3NameTooLong { .. } => NFS3ERR_NAMETOOLONG,
            GatewayError::Nfs3BadCookie { .. } => NFS3ERR_BAD_COOKIE,
            GatewayError::ConfigError { .. } => NFS3ERR_INVAL,
            GatewayError::Namespace(e) => translate(Some(e)).0,
            GatewayError::IoError(e) => {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    NFS3ERR_ACCES
                } else {
                    NFS3ERR_IO
                }
            }
        }
    }
}

/// Result type alias using GatewayError as the error type.
pub type Result<T> = std::result::Result<T, GatewayError>;
