//! Core domain types for the lode Git LFS server.
//!
//! This crate defines the data model shared by every other crate:
//! - Repository names and their validation rules
//! - Object identifiers and the content-addressed storage layout
//! - Batch API request and response shapes
//! - Content hashing
//! - Application configuration

pub mod batch;
pub mod config;
pub mod error;
pub mod hash;
pub mod oid;
pub mod repo;

pub use batch::{
    BatchRequest, BatchResponse, ObjectAction, ObjectActions, ObjectError, ObjectResponse,
    ObjectSpec, Operation,
};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use oid::{Oid, object_key};
pub use repo::RepoName;

/// Name of the per-repository object directory. Reserved as a repository segment.
pub const OBJECTS_DIR: &str = "objects";

/// The only transfer adapter this server implements.
pub const BASIC_TRANSFER: &str = "basic";

/// Media type of Git LFS batch requests and responses.
pub const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";
