use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use hyper::body::Bytes;

use armoire_dav::types::{DeadProperty, Depth, PropIdent};

use crate::error::DavError;
use crate::path::DavPath;
use crate::time::{weak_etag, DavTime};

pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static>>;

/// Snapshot of a resource as a provider reports it. Paths are local to
/// the mount; the distributor glues the prefix back on for hrefs.
#[derive(Debug, Clone)]
pub struct Resource {
    pub path: DavPath,
    pub is_collection: bool,
    pub size: u64,
    pub content_type: String,
    pub modified: DavTime,
    pub created: DavTime,
    pub display_name: Option<String>,
}

impl Resource {
    pub fn etag(&self) -> String {
        weak_etag(self.size, &self.modified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Replaced,
}

impl WriteOutcome {
    pub fn status(self) -> http::StatusCode {
        match self {
            Self::Created => http::StatusCode::CREATED,
            Self::Replaced => http::StatusCode::NO_CONTENT,
        }
    }
}

/// Contract between the pipeline and a storage backend.
///
/// Implementations must tolerate concurrent calls on disjoint paths and
/// report failures through the shared taxonomy (`NotFound`, `Conflict`
/// for a missing parent, `MethodNotAllowed` for an existing collection,
/// `PreconditionFailed` for an overwrite refusal). Atomicity across
/// calls is not expected of them; the lock manager provides it.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn stat(&self, path: &DavPath) -> Result<Resource, DavError>;

    /// Immediate children of a collection.
    async fn list(&self, path: &DavPath) -> Result<Vec<Resource>, DavError>;

    async fn read(&self, path: &DavPath) -> Result<(Resource, ByteStream), DavError>;

    async fn write(
        &self,
        path: &DavPath,
        content: ByteStream,
        overwrite: bool,
    ) -> Result<WriteOutcome, DavError>;

    async fn mkcol(&self, path: &DavPath) -> Result<(), DavError>;

    /// Remove a resource, collections with their whole subtree.
    async fn delete(&self, path: &DavPath) -> Result<(), DavError>;

    async fn copy(
        &self,
        src: &DavPath,
        dst: &DavPath,
        depth: Depth,
        overwrite: bool,
    ) -> Result<WriteOutcome, DavError>;

    async fn relocate(
        &self,
        src: &DavPath,
        dst: &DavPath,
        overwrite: bool,
    ) -> Result<WriteOutcome, DavError>;

    async fn dead_props(&self, path: &DavPath) -> Result<Vec<DeadProperty>, DavError>;

    async fn set_dead_prop(&self, path: &DavPath, prop: DeadProperty) -> Result<(), DavError>;

    /// Removing an absent property is a no-op here; the property engine
    /// decides what that means for the request.
    async fn remove_dead_prop(&self, path: &DavPath, name: &PropIdent) -> Result<(), DavError>;
}
