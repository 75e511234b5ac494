//! AWS transport for s3vfs.
//!
//! [`AwsObjectStore`] implements the core crate's
//! [`ObjectStoreClient`](s3vfs_core::store::ObjectStoreClient) with
//! `aws-sdk-s3`; [`AccountInfo`] validates the configuration and binds the
//! client to the bucket's region at startup.

pub mod account;
pub mod client;

pub use account::AccountInfo;
pub use client::AwsObjectStore;
