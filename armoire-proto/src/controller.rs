use futures::stream::{self, StreamExt, TryStreamExt};
use http::{Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyStream, StreamBody};
use hyper::body::{Bytes, Frame};
use tokio::time::Instant;

use armoire_dav::types as dav;

use crate::codec::{self, HttpResponse};
use crate::error::DavError;
use crate::lock::{LockManager, LockRecord};
use crate::path::DavPath;
use crate::props::{self, PathLocks};
use crate::provider::{ByteStream, Provider};
use crate::request::{DavMethod, DavRequest};

pub(crate) const ALLOWED_METHODS: &str =
    "OPTIONS, HEAD, GET, PUT, DELETE, MKCOL, PROPFIND, PROPPATCH, COPY, MOVE, LOCK, UNLOCK";

/// Executes one routed request against its provider, consulting the lock
/// table before anything destructive.
pub(crate) struct Controller<'a> {
    pub provider: &'a dyn Provider,
    pub locks: &'a LockManager,
    pub path_locks: &'a PathLocks,
    pub pretty: bool,
}

impl<'a> Controller<'a> {
    pub(crate) async fn route(self, req: DavRequest) -> Result<HttpResponse, DavError> {
        match req.method {
            DavMethod::Options => self.options(),
            DavMethod::Head => self.get(req, false).await,
            DavMethod::Get => self.get(req, true).await,
            DavMethod::Put => self.put(req).await,
            DavMethod::Delete => self.delete(req).await,
            DavMethod::Mkcol => self.mkcol(req).await,
            DavMethod::Propfind => self.propfind(req).await,
            DavMethod::Proppatch => self.proppatch(req).await,
            DavMethod::Copy => self.copy_or_move(req, false).await,
            DavMethod::Move => self.copy_or_move(req, true).await,
            DavMethod::Lock => self.lock(req).await,
            DavMethod::Unlock => self.unlock(req).await,
        }
    }

    // --- per-method handlers ---

    fn options(&self) -> Result<HttpResponse, DavError> {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("DAV", "1, 2")
            .header("Allow", ALLOWED_METHODS)
            .body(codec::text_body(""))?)
    }

    async fn get(&self, req: DavRequest, include_body: bool) -> Result<HttpResponse, DavError> {
        let resource = self.provider.stat(&req.local_src).await?;

        if resource.is_collection {
            let mut listing = String::new();
            for child in self.provider.list(&req.local_src).await? {
                listing.push_str(child.path.name().unwrap_or("/"));
                if child.is_collection {
                    listing.push('/');
                }
                listing.push('\n');
            }
            let body = match include_body {
                true => codec::bytes_body(Bytes::from(listing)),
                false => codec::text_body(""),
            };
            return Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(body)?);
        }

        let (resource, content) = self.provider.read(&req.local_src).await?;
        let body = match include_body {
            true => BoxBody::new(StreamBody::new(content.map_ok(Frame::data))),
            false => codec::text_body(""),
        };
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", resource.content_type.clone())
            .header("Content-Length", resource.size.to_string())
            .header("ETag", resource.etag())
            .header("Last-Modified", resource.modified.rfc1123())
            .body(body)?)
    }

    async fn put(&self, mut req: DavRequest) -> Result<HttpResponse, DavError> {
        self.check_write(&req, &req.src_path, &req.local_src)
            .await?;

        let body = req.body.take().ok_or(DavError::BadRequest)?;
        let content = BodyStream::new(body)
            .map_ok(|frame| frame.into_data())
            .map(|chunk| match chunk {
                Ok(Ok(data)) => Ok(data),
                Ok(Err(_)) => Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "conversion error",
                )),
                Err(err) => Err(std::io::Error::new(std::io::ErrorKind::Other, err)),
            });
        let content: ByteStream = Box::pin(content);

        // PUT replaces whatever is there; Overwrite: only gates COPY/MOVE
        let outcome = self.provider.write(&req.local_src, content, true).await?;

        let mut builder = Response::builder().status(outcome.status());
        if let Ok(written) = self.provider.stat(&req.local_src).await {
            builder = builder.header("ETag", written.etag());
        }
        Ok(builder.body(codec::text_body(""))?)
    }

    async fn delete(&self, req: DavRequest) -> Result<HttpResponse, DavError> {
        self.check_write(&req, &req.src_path, &req.local_src).await?;
        self.provider.delete(&req.local_src).await?;
        Ok(Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(codec::text_body(""))?)
    }

    async fn mkcol(&self, req: DavRequest) -> Result<HttpResponse, DavError> {
        if req.body_present {
            // MKCOL bodies are not understood by this server
            return Ok(Response::builder()
                .status(StatusCode::UNSUPPORTED_MEDIA_TYPE)
                .body(codec::text_body(""))?);
        }
        self.check_write(&req, &req.src_path, &req.local_src).await?;
        self.provider.mkcol(&req.local_src).await?;
        Ok(Response::builder()
            .status(StatusCode::CREATED)
            .body(codec::text_body(""))?)
    }

    async fn propfind(&self, req: DavRequest) -> Result<HttpResponse, DavError> {
        if !req.body_parsed {
            return Err(DavError::BadRequest);
        }
        let selector = req.propfind.as_ref().ok_or(DavError::BadRequest)?;
        let multistatus = props::propfind(
            self.provider,
            self.locks,
            &req.prefix,
            &req.local_src,
            req.depth(),
            selector,
        )
        .await?;
        codec::serialize(StatusCode::MULTI_STATUS, multistatus, self.pretty)
    }

    async fn proppatch(&self, req: DavRequest) -> Result<HttpResponse, DavError> {
        if !req.body_parsed {
            return Err(DavError::BadRequest);
        }
        self.check_write(&req, &req.src_path, &req.local_src).await?;
        let multistatus = props::proppatch(
            self.provider,
            self.path_locks,
            &req.prefix,
            &req.local_src,
            &req.proppatch,
        )
        .await?;
        codec::serialize(StatusCode::MULTI_STATUS, multistatus, self.pretty)
    }

    async fn copy_or_move(&self, req: DavRequest, is_move: bool) -> Result<HttpResponse, DavError> {
        let dst_full = req.dst_path.clone().ok_or(DavError::BadRequest)?;
        let dst_local = req.local_dst.clone().ok_or(DavError::BadRequest)?;

        // COPY/MOVE know only 0 and infinity
        if matches!(req.depth(), dav::Depth::One) {
            return Err(DavError::BadRequest);
        }
        // no folding a tree into itself
        if req.src_path == dst_full || req.src_path.is_ancestor_of(&dst_full) {
            return Err(DavError::Conflict);
        }

        self.check_write(&req, &dst_full, &dst_local).await?;
        if is_move {
            self.check_write(&req, &req.src_path, &req.local_src).await?;
        }

        if self.provider.stat(&dst_local).await.is_ok() && !req.overwrite {
            return Err(DavError::PreconditionFailed);
        }

        let outcome = match is_move {
            true => {
                self.provider
                    .relocate(&req.local_src, &dst_local, req.overwrite)
                    .await?
            }
            false => {
                self.provider
                    .copy(&req.local_src, &dst_local, req.depth(), req.overwrite)
                    .await?
            }
        };
        Ok(Response::builder()
            .status(outcome.status())
            .body(codec::text_body(""))?)
    }

    async fn lock(&self, req: DavRequest) -> Result<HttpResponse, DavError> {
        if !req.body_parsed {
            return Err(DavError::BadRequest);
        }
        // a lock is rooted at one resource or a whole subtree
        if matches!(req.depth(), dav::Depth::One) {
            return Err(DavError::BadRequest);
        }

        match &req.lock_info {
            Some(info) => {
                let record = match self.locks.grant(
                    &req.src_path,
                    info.lockscope,
                    req.depth(),
                    info.owner.clone(),
                    req.timeout,
                ) {
                    Ok(record) => record,
                    Err(conflicts) => return self.lock_conflict(conflicts, &req.src_path),
                };

                // a lock on nothing makes a locked empty resource
                let existed = self.provider.stat(&req.local_src).await.is_ok();
                if !existed {
                    if let Err(e) = self
                        .provider
                        .write(&req.local_src, Box::pin(stream::empty()), false)
                        .await
                    {
                        self.locks.release(record.token);
                        return Err(e);
                    }
                }

                let status = match existed {
                    true => StatusCode::OK,
                    false => StatusCode::CREATED,
                };
                let body = dav::PropValue(vec![dav::Property::LockDiscovery(vec![
                    record.to_active_lock(Instant::now()),
                ])]);
                let mut response = codec::serialize(status, body, self.pretty)?;
                let header = format!("<{}>", record.coded_token());
                response.headers_mut().insert(
                    "Lock-Token",
                    header
                        .parse()
                        .map_err(|e: http::header::InvalidHeaderValue| {
                            DavError::Internal(e.into())
                        })?,
                );
                Ok(response)
            }
            None => {
                // empty body: refresh whichever submitted token holds a
                // lock rooted here
                for condition in &req.conditions {
                    if let Some(record) =
                        self.locks
                            .refresh(condition.token, &req.src_path, req.timeout)
                    {
                        let body = dav::PropValue(vec![dav::Property::LockDiscovery(vec![
                            record.to_active_lock(Instant::now()),
                        ])]);
                        return codec::serialize(StatusCode::OK, body, self.pretty);
                    }
                }
                Err(DavError::PreconditionFailed)
            }
        }
    }

    fn lock_conflict(
        &self,
        conflicts: Vec<LockRecord>,
        requested: &DavPath,
    ) -> Result<HttpResponse, DavError> {
        let held_elsewhere = conflicts.iter().any(|lock| lock.root != *requested);
        match held_elsewhere {
            // conflict sits on the requested resource itself
            false => {
                let hrefs = conflicts
                    .iter()
                    .map(|lock| dav::Href(lock.root.to_string()))
                    .collect();
                codec::serialize(
                    StatusCode::LOCKED,
                    dav::Error(vec![dav::Violation::NoConflictingLock(hrefs)]),
                    self.pretty,
                )
            }
            // conflict originates at another root: report it per-resource
            true => {
                let responses = conflicts
                    .iter()
                    .map(|lock| dav::Response {
                        status_or_propstat: dav::StatusOrPropstat::Status(
                            vec![dav::Href(lock.root.to_string())],
                            dav::Status(StatusCode::LOCKED),
                        ),
                        error: Some(dav::Error(vec![dav::Violation::NoConflictingLock(vec![])])),
                        responsedescription: None,
                    })
                    .collect();
                codec::serialize(
                    StatusCode::MULTI_STATUS,
                    dav::Multistatus {
                        responses,
                        responsedescription: None,
                    },
                    self.pretty,
                )
            }
        }
    }

    async fn unlock(&self, req: DavRequest) -> Result<HttpResponse, DavError> {
        if req.token_parse_failed {
            return Err(DavError::BadRequest);
        }
        let token = req.lock_token.ok_or(DavError::BadRequest)?;
        match self.locks.release(token) {
            Some(record) => {
                tracing::debug!(root=%record.root, "lock released");
                Ok(Response::builder()
                    .status(StatusCode::NO_CONTENT)
                    .body(codec::text_body(""))?)
            }
            None => Err(DavError::Conflict),
        }
    }

    /// Gate for anything that writes: the locks covering the target must
    /// be satisfied by a submitted token (and matching tag, when given).
    async fn check_write(
        &self,
        req: &DavRequest,
        full: &DavPath,
        local: &DavPath,
    ) -> Result<(), DavError> {
        let etag = match self.provider.stat(local).await {
            Ok(resource) if !resource.is_collection => Some(resource.etag()),
            _ => None,
        };
        self.locks
            .assert_submitted(full, &req.conditions, etag.as_deref())
    }
}
