use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use hyper::body::Bytes;
use tokio::sync::RwLock;

use armoire_dav::types::{DeadProperty, Depth, PropIdent};

use crate::error::DavError;
use crate::path::DavPath;
use crate::provider::{ByteStream, Provider, Resource, WriteOutcome};
use crate::time::DavTime;

const COLLECTION_TYPE: &str = "httpd/unix-directory";

#[derive(Debug, Clone)]
struct MemNode {
    is_collection: bool,
    data: Bytes,
    content_type: String,
    created: DavTime,
    modified: DavTime,
    display_name: Option<String>,
    dead: Vec<DeadProperty>,
}

impl MemNode {
    fn collection(stamp: DavTime) -> Self {
        Self {
            is_collection: true,
            data: Bytes::new(),
            content_type: COLLECTION_TYPE.into(),
            created: stamp,
            modified: stamp,
            display_name: None,
            dead: Vec::new(),
        }
    }

    fn file(data: Bytes, content_type: &str, stamp: DavTime) -> Self {
        Self {
            is_collection: false,
            data,
            content_type: content_type.into(),
            created: stamp,
            modified: stamp,
            display_name: None,
            dead: Vec::new(),
        }
    }
}

/// Ephemeral in-process backend: a flat map from path to node. The
/// reference implementation of [`Provider`] and the harness every
/// pipeline test runs against. Contents vanish with the process.
pub struct MemProvider {
    nodes: RwLock<HashMap<DavPath, MemNode>>,
}

impl MemProvider {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(DavPath::root(), MemNode::collection(DavTime::now()));
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Seeding helper for tests and demo setups.
    pub async fn seed_collection(&self, path: &DavPath) {
        let mut nodes = self.nodes.write().await;
        nodes.insert(path.clone(), MemNode::collection(DavTime::now()));
    }

    /// Seeding helper with a pinned modification time, so derived values
    /// like the ETag are predictable.
    pub async fn seed_file(&self, path: &DavPath, data: &[u8], content_type: &str, stamp: DavTime) {
        let mut nodes = self.nodes.write().await;
        nodes.insert(
            path.clone(),
            MemNode::file(Bytes::copy_from_slice(data), content_type, stamp),
        );
    }

    fn resource_of(path: &DavPath, node: &MemNode) -> Resource {
        Resource {
            path: path.clone(),
            is_collection: node.is_collection,
            size: node.data.len() as u64,
            content_type: node.content_type.clone(),
            modified: node.modified,
            created: node.created,
            display_name: node.display_name.clone(),
        }
    }

    async fn collect_stream(mut content: ByteStream) -> Result<Bytes, DavError> {
        let mut buffer = Vec::new();
        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(|e| DavError::Internal(e.into()))?;
            buffer.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buffer))
    }
}

impl Default for MemProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn subtree(nodes: &HashMap<DavPath, MemNode>, root: &DavPath) -> Vec<DavPath> {
    nodes
        .keys()
        .filter(|p| *p == root || root.is_ancestor_of(p))
        .cloned()
        .collect()
}

fn parent_collection_exists(nodes: &HashMap<DavPath, MemNode>, path: &DavPath) -> bool {
    match nodes.get(&path.parent()) {
        Some(node) => node.is_collection,
        None => false,
    }
}

#[async_trait]
impl Provider for MemProvider {
    async fn stat(&self, path: &DavPath) -> Result<Resource, DavError> {
        let nodes = self.nodes.read().await;
        let node = nodes.get(path).ok_or(DavError::NotFound)?;
        Ok(Self::resource_of(path, node))
    }

    async fn list(&self, path: &DavPath) -> Result<Vec<Resource>, DavError> {
        let nodes = self.nodes.read().await;
        let node = nodes.get(path).ok_or(DavError::NotFound)?;
        if !node.is_collection {
            return Err(DavError::Conflict);
        }
        let mut children: Vec<Resource> = nodes
            .iter()
            .filter(|(p, _)| !p.is_root() && p.parent() == *path)
            .map(|(p, n)| Self::resource_of(p, n))
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    async fn read(&self, path: &DavPath) -> Result<(Resource, ByteStream), DavError> {
        let nodes = self.nodes.read().await;
        let node = nodes.get(path).ok_or(DavError::NotFound)?;
        if node.is_collection {
            return Err(DavError::Conflict);
        }
        let data = node.data.clone();
        Ok((
            Self::resource_of(path, node),
            Box::pin(stream::once(async move { Ok(data) })),
        ))
    }

    async fn write(
        &self,
        path: &DavPath,
        content: ByteStream,
        overwrite: bool,
    ) -> Result<WriteOutcome, DavError> {
        let data = Self::collect_stream(content).await?;

        let mut nodes = self.nodes.write().await;
        if !parent_collection_exists(&nodes, path) {
            return Err(DavError::Conflict);
        }
        match nodes.get_mut(path) {
            Some(node) if node.is_collection => Err(DavError::MethodNotAllowed),
            Some(_) if !overwrite => Err(DavError::PreconditionFailed),
            Some(node) => {
                node.data = data;
                node.modified = DavTime::now();
                Ok(WriteOutcome::Replaced)
            }
            None => {
                nodes.insert(
                    path.clone(),
                    MemNode::file(data, "application/octet-stream", DavTime::now()),
                );
                Ok(WriteOutcome::Created)
            }
        }
    }

    async fn mkcol(&self, path: &DavPath) -> Result<(), DavError> {
        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(path) {
            return Err(DavError::MethodNotAllowed);
        }
        if !parent_collection_exists(&nodes, path) {
            return Err(DavError::Conflict);
        }
        nodes.insert(path.clone(), MemNode::collection(DavTime::now()));
        Ok(())
    }

    async fn delete(&self, path: &DavPath) -> Result<(), DavError> {
        let mut nodes = self.nodes.write().await;
        if !nodes.contains_key(path) {
            return Err(DavError::NotFound);
        }
        for doomed in subtree(&nodes, path) {
            nodes.remove(&doomed);
        }
        Ok(())
    }

    async fn copy(
        &self,
        src: &DavPath,
        dst: &DavPath,
        depth: Depth,
        overwrite: bool,
    ) -> Result<WriteOutcome, DavError> {
        let mut nodes = self.nodes.write().await;
        if !nodes.contains_key(src) {
            return Err(DavError::NotFound);
        }
        if !parent_collection_exists(&nodes, dst) {
            return Err(DavError::Conflict);
        }

        let outcome = match nodes.contains_key(dst) {
            true if !overwrite => return Err(DavError::PreconditionFailed),
            true => {
                for doomed in subtree(&nodes, dst) {
                    nodes.remove(&doomed);
                }
                WriteOutcome::Replaced
            }
            false => WriteOutcome::Created,
        };

        let members = match depth {
            // a depth 0 copy of a collection takes the collection alone
            Depth::Zero => vec![src.clone()],
            _ => subtree(&nodes, src),
        };
        let stamp = DavTime::now();
        for member in members {
            let mut node = match nodes.get(&member) {
                Some(node) => node.clone(),
                None => continue,
            };
            node.created = stamp;
            node.modified = stamp;
            let rest = match member.strip_prefix(src) {
                Some(rest) => rest,
                None => continue,
            };
            nodes.insert(dst.join(&rest), node);
        }
        Ok(outcome)
    }

    async fn relocate(
        &self,
        src: &DavPath,
        dst: &DavPath,
        overwrite: bool,
    ) -> Result<WriteOutcome, DavError> {
        let mut nodes = self.nodes.write().await;
        if !nodes.contains_key(src) {
            return Err(DavError::NotFound);
        }
        if !parent_collection_exists(&nodes, dst) {
            return Err(DavError::Conflict);
        }

        let outcome = match nodes.contains_key(dst) {
            true if !overwrite => return Err(DavError::PreconditionFailed),
            true => {
                for doomed in subtree(&nodes, dst) {
                    nodes.remove(&doomed);
                }
                WriteOutcome::Replaced
            }
            false => WriteOutcome::Created,
        };

        for member in subtree(&nodes, src) {
            let node = match nodes.remove(&member) {
                Some(node) => node,
                None => continue,
            };
            let rest = match member.strip_prefix(src) {
                Some(rest) => rest,
                None => continue,
            };
            nodes.insert(dst.join(&rest), node);
        }
        Ok(outcome)
    }

    async fn dead_props(&self, path: &DavPath) -> Result<Vec<DeadProperty>, DavError> {
        let nodes = self.nodes.read().await;
        let node = nodes.get(path).ok_or(DavError::NotFound)?;
        Ok(node.dead.clone())
    }

    async fn set_dead_prop(&self, path: &DavPath, prop: DeadProperty) -> Result<(), DavError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes.get_mut(path).ok_or(DavError::NotFound)?;
        node.dead.retain(|existing| existing.name != prop.name);
        node.dead.push(prop);
        Ok(())
    }

    async fn remove_dead_prop(&self, path: &DavPath, name: &PropIdent) -> Result<(), DavError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes.get_mut(path).ok_or(DavError::NotFound)?;
        node.dead.retain(|existing| existing.name != *name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> DavPath {
        DavPath::parse(raw).unwrap()
    }

    async fn fixture() -> MemProvider {
        let mem = MemProvider::new();
        mem.seed_collection(&path("/a")).await;
        mem.seed_file(
            &path("/a/b"),
            b"0123456789",
            "text/plain",
            DavTime::from_unix(1700000000),
        )
        .await;
        mem
    }

    #[tokio::test]
    async fn stat_and_list() {
        let mem = fixture().await;
        let root = mem.stat(&DavPath::root()).await.unwrap();
        assert!(root.is_collection);

        let children = mem.list(&path("/a")).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].size, 10);
        assert!(mem.list(&path("/a/b")).await.is_err());
    }

    #[tokio::test]
    async fn write_needs_a_parent_collection() {
        let mem = fixture().await;
        let err = mem
            .write(
                &path("/missing/file"),
                Box::pin(stream::once(async { Ok(Bytes::from_static(b"x")) })),
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DavError::Conflict));
    }

    #[tokio::test]
    async fn relocate_moves_the_subtree() {
        let mem = fixture().await;
        mem.seed_collection(&path("/c")).await;

        mem.relocate(&path("/a"), &path("/c/a2"), false)
            .await
            .unwrap();
        assert!(mem.stat(&path("/a")).await.is_err());
        assert_eq!(mem.stat(&path("/c/a2/b")).await.unwrap().size, 10);
    }

    #[tokio::test]
    async fn copy_depth_zero_takes_the_collection_alone() {
        let mem = fixture().await;
        mem.copy(&path("/a"), &path("/a2"), Depth::Zero, false)
            .await
            .unwrap();
        assert!(mem.stat(&path("/a2")).await.unwrap().is_collection);
        assert!(mem.stat(&path("/a2/b")).await.is_err());
        // source untouched
        assert!(mem.stat(&path("/a/b")).await.is_ok());
    }

    #[tokio::test]
    async fn dead_props_round_trip() {
        let mem = fixture().await;
        let name = PropIdent::new("urn:example", "color");
        mem.set_dead_prop(
            &path("/a/b"),
            DeadProperty {
                name: name.clone(),
                value: "red".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(mem.dead_props(&path("/a/b")).await.unwrap().len(), 1);
        mem.remove_dead_prop(&path("/a/b"), &name).await.unwrap();
        assert!(mem.dead_props(&path("/a/b")).await.unwrap().is_empty());
    }
}
