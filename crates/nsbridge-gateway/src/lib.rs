#![warn(missing_docs)]

//! nsbridge gateway: serves a path-addressed namespace to an NFSv3 daemon
//! that addresses objects by numeric handle

pub mod attr;
pub mod config;
pub mod error;
pub mod handle_cache;
#[cfg(unix)]
pub mod local_fs;
pub mod mount;
pub mod namespace;
pub mod ops;
pub mod path;
pub mod readdir;

pub use error::{GatewayError, Result};
pub use handle_cache::{Handle, HandleCache};
pub use namespace::{FileInfo, Namespace, NamespaceError};
pub use ops::Bridge;
