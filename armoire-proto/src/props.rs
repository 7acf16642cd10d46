use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use http::StatusCode;
use itertools::Itertools;
use tokio::time::Instant;

use armoire_dav::types as dav;

use crate::error::DavError;
use crate::lock::LockManager;
use crate::path::DavPath;
use crate::provider::{Provider, Resource};
use crate::request::PropPatch;

/// The canonical live set, in the order responses enumerate it.
pub const ALL_BASIC: [dav::PropertyRequest; 10] = [
    dav::PropertyRequest::CreationDate,
    dav::PropertyRequest::DisplayName,
    dav::PropertyRequest::GetContentLanguage,
    dav::PropertyRequest::GetContentLength,
    dav::PropertyRequest::GetContentType,
    dav::PropertyRequest::GetEtag,
    dav::PropertyRequest::GetLastModified,
    dav::PropertyRequest::LockDiscovery,
    dav::PropertyRequest::ResourceType,
    dav::PropertyRequest::SupportedLock,
];

/// Per-path serialization for PROPPATCH: the whole operation (read,
/// validate, apply) runs under the path's own mutex, so two updates to
/// one resource never interleave.
pub struct PathLocks {
    inner: Mutex<HashMap<DavPath, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn of(&self, path: &DavPath) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        map.entry(path.clone()).or_default().clone()
    }
}

impl Default for PathLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// PROPFIND: resolve, walk to the requested depth, enumerate properties
/// per resource, group per status.
pub async fn propfind(
    provider: &dyn Provider,
    locks: &LockManager,
    prefix: &DavPath,
    target: &DavPath,
    depth: dav::Depth,
    selector: &dav::PropFind,
) -> Result<dav::Multistatus, DavError> {
    let root = provider.stat(target).await?;

    let mut resources = Vec::new();
    match depth {
        dav::Depth::Zero => resources.push(root),
        dav::Depth::One => {
            let children = match root.is_collection {
                true => provider.list(target).await?,
                false => Vec::new(),
            };
            resources.push(root);
            resources.extend(children);
        }
        dav::Depth::Infinity => {
            let mut queue = VecDeque::new();
            if root.is_collection {
                queue.push_back(root.path.clone());
            }
            resources.push(root);
            while let Some(collection) = queue.pop_front() {
                for child in provider.list(&collection).await? {
                    if child.is_collection {
                        queue.push_back(child.path.clone());
                    }
                    resources.push(child);
                }
            }
        }
    }

    let mut responses = Vec::with_capacity(resources.len());
    for resource in &resources {
        responses.push(resource_response(provider, locks, prefix, resource, selector).await?);
    }
    Ok(dav::Multistatus {
        responses,
        responsedescription: None,
    })
}

async fn resource_response(
    provider: &dyn Provider,
    locks: &LockManager,
    prefix: &DavPath,
    resource: &Resource,
    selector: &dav::PropFind,
) -> Result<dav::Response, DavError> {
    let href = dav::Href(prefix.join(&resource.path).to_string());
    let dead = provider.dead_props(&resource.path).await?;

    let propstats = match selector {
        dav::PropFind::PropName => {
            let mut names: Vec<dav::AnyProperty> = ALL_BASIC
                .iter()
                .cloned()
                .map(dav::AnyProperty::Request)
                .collect();
            names.extend(
                dead.iter()
                    .map(|d| dav::AnyProperty::Request(dav::PropertyRequest::Dead(d.name.clone()))),
            );
            vec![propstat(names, StatusCode::OK)]
        }
        dav::PropFind::AllProp => {
            let mut found: Vec<dav::AnyProperty> = ALL_BASIC
                .iter()
                .filter_map(|request| live_value(locks, prefix, resource, request))
                .map(dav::AnyProperty::Value)
                .collect();
            found.extend(
                dead.iter()
                    .cloned()
                    .map(|d| dav::AnyProperty::Value(dav::Property::Dead(d))),
            );
            vec![propstat(found, StatusCode::OK)]
        }
        dav::PropFind::Prop(dav::PropName(requests)) => {
            let (mut found, mut missing) = (Vec::new(), Vec::new());
            for request in requests {
                match request {
                    dav::PropertyRequest::Dead(ident) => {
                        match dead.iter().find(|d| d.name == *ident) {
                            Some(d) => {
                                found.push(dav::AnyProperty::Value(dav::Property::Dead(d.clone())))
                            }
                            None => missing.push(dav::AnyProperty::Request(request.clone())),
                        }
                    }
                    live => match live_value(locks, prefix, resource, live) {
                        Some(value) => found.push(dav::AnyProperty::Value(value)),
                        None => missing.push(dav::AnyProperty::Request(live.clone())),
                    },
                }
            }

            let mut blocks = Vec::new();
            if !found.is_empty() {
                blocks.push(propstat(found, StatusCode::OK));
            }
            if !missing.is_empty() {
                blocks.push(propstat(missing, StatusCode::NOT_FOUND));
            }
            if blocks.is_empty() {
                blocks.push(propstat(Vec::new(), StatusCode::OK));
            }
            blocks
        }
    };

    Ok(dav::Response {
        status_or_propstat: dav::StatusOrPropstat::PropStat(href, propstats),
        error: None,
        responsedescription: None,
    })
}

fn propstat(props: Vec<dav::AnyProperty>, status: StatusCode) -> dav::PropStat {
    dav::PropStat {
        prop: dav::AnyProp(props),
        status: dav::Status(status),
        error: None,
        responsedescription: None,
    }
}

/// Value computation for the live set. `None` means the property has no
/// value on this resource and lands in the 404 block.
fn live_value(
    locks: &LockManager,
    prefix: &DavPath,
    resource: &Resource,
    request: &dav::PropertyRequest,
) -> Option<dav::Property> {
    use dav::PropertyRequest::*;
    match request {
        CreationDate => Some(dav::Property::CreationDate(resource.created.fixed())),
        DisplayName => Some(dav::Property::DisplayName(
            resource
                .display_name
                .clone()
                .or_else(|| resource.path.name().map(str::to_string))
                .unwrap_or_else(|| "/".into()),
        )),
        GetContentLanguage => None,
        GetContentLength => match resource.is_collection {
            true => None,
            false => Some(dav::Property::GetContentLength(resource.size)),
        },
        GetContentType => match resource.content_type.is_empty() {
            true => None,
            false => Some(dav::Property::GetContentType(resource.content_type.clone())),
        },
        GetEtag => match resource.is_collection {
            true => None,
            false => Some(dav::Property::GetEtag(resource.etag())),
        },
        GetLastModified => Some(dav::Property::GetLastModified(resource.modified.fixed())),
        LockDiscovery => {
            let now = Instant::now();
            let active = locks
                .covering(&prefix.join(&resource.path))
                .iter()
                .map(|lock| lock.to_active_lock(now))
                .collect();
            Some(dav::Property::LockDiscovery(active))
        }
        ResourceType => Some(dav::Property::ResourceType(match resource.is_collection {
            true => vec![dav::ResourceType::Collection],
            false => vec![],
        })),
        SupportedLock => Some(dav::Property::SupportedLock(vec![
            dav::LockEntry {
                lockscope: dav::LockScope::Exclusive,
                locktype: dav::LockType::Write,
            },
            dav::LockEntry {
                lockscope: dav::LockScope::Shared,
                locktype: dav::LockType::Write,
            },
        ])),
        Dead(_) => None,
    }
}

/// PROPPATCH: execute entries in document order, atomically per request.
/// When any entry cannot be applied (an absent property removed, a
/// protected property touched), nothing persists and every entry reports
/// 424 Failed Dependency.
pub async fn proppatch(
    provider: &dyn Provider,
    path_locks: &PathLocks,
    prefix: &DavPath,
    target: &DavPath,
    entries: &[PropPatch],
) -> Result<dav::Multistatus, DavError> {
    let full_path = prefix.join(target);
    let serial = path_locks.of(&full_path);
    let _guard = serial.lock().await;

    provider.stat(target).await?;
    let current = provider.dead_props(target).await?;

    // dry-run against a staged view first
    let mut staged: HashMap<dav::PropIdent, String> = current
        .into_iter()
        .map(|dead| (dead.name, dead.value))
        .collect();
    let mut all_ok = true;
    let mut protected_touched = false;
    for entry in entries {
        if entry.protected {
            all_ok = false;
            protected_touched = true;
            continue;
        }
        if entry.set {
            staged.insert(entry.name.clone(), entry.value.clone().unwrap_or_default());
        } else if staged.remove(&entry.name).is_none() {
            all_ok = false;
        }
    }

    if all_ok {
        for entry in entries {
            match entry.set {
                true => {
                    provider
                        .set_dead_prop(
                            target,
                            dav::DeadProperty {
                                name: entry.name.clone(),
                                value: entry.value.clone().unwrap_or_default(),
                            },
                        )
                        .await?
                }
                false => provider.remove_dead_prop(target, &entry.name).await?,
            }
        }
    }

    let status = match all_ok {
        true => StatusCode::OK,
        false => StatusCode::FAILED_DEPENDENCY,
    };
    let grouped = entries
        .iter()
        .map(|entry| {
            (
                status,
                dav::AnyProperty::Request(dav::PropertyRequest::Dead(entry.name.clone())),
            )
        })
        .into_group_map();

    let mut propstats: Vec<dav::PropStat> = grouped
        .into_iter()
        .map(|(code, props)| dav::PropStat {
            prop: dav::AnyProp(props),
            status: dav::Status(code),
            error: (code == StatusCode::FAILED_DEPENDENCY && protected_touched)
                .then(|| dav::Error(vec![dav::Violation::CannotModifyProtectedProperty])),
            responsedescription: None,
        })
        .collect();
    if propstats.is_empty() {
        propstats.push(propstat(Vec::new(), StatusCode::OK));
    }

    Ok(dav::Multistatus {
        responses: vec![dav::Response {
            status_or_propstat: dav::StatusOrPropstat::PropStat(
                dav::Href(full_path.to_string()),
                propstats,
            ),
            error: None,
            responsedescription: None,
        }],
        responsedescription: None,
    })
}
