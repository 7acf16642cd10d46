use std::sync::Arc;

use http::{Request, Response};
use tokio::time::Instant;
use uuid::Uuid;

use crate::codec::{self, BodyIn, HttpResponse};
use crate::controller::{Controller, ALLOWED_METHODS};
use crate::error::DavError;
use crate::lock::LockManager;
use crate::path::DavPath;
use crate::props::PathLocks;
use crate::provider::Provider;
use crate::request::DavRequest;
use crate::time::DavTime;

struct Mount {
    prefix: DavPath,
    provider: Arc<dyn Provider>,
}

/// Routes every exchange to the mount owning the longest prefix of the
/// request path, rewrites the request to provider-local paths and runs
/// the controller. This is the whole core behind one `dispatch` call.
pub struct Distributor {
    mounts: Vec<Mount>,
    locks: Arc<LockManager>,
    path_locks: PathLocks,
    pretty: bool,
}

impl Distributor {
    pub fn new(locks: Arc<LockManager>, pretty: bool) -> Self {
        Self {
            mounts: Vec::new(),
            locks,
            path_locks: PathLocks::new(),
            pretty,
        }
    }

    pub fn mount(&mut self, prefix: DavPath, provider: Arc<dyn Provider>) {
        self.mounts.push(Mount { prefix, provider });
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Expire overdue locks; the daemon calls this on its sweep tick,
    /// tests call it with a chosen `now`.
    pub fn sweep_locks(&self, now: Instant) {
        self.locks.sweep(now)
    }

    /// One HTTP exchange in, one response out. Never errors: everything
    /// internal is folded into a status code here.
    pub async fn dispatch(&self, req: Request<BodyIn>) -> HttpResponse {
        tracing::debug!("{} {}", req.method(), req.uri());
        let mut response = match self.handle(req).await {
            Ok(response) => response,
            Err(err) => self.error_response(err),
        };
        let headers = response.headers_mut();
        if !headers.contains_key("Date") {
            if let Ok(date) = DavTime::now().rfc1123().parse() {
                headers.insert("Date", date);
            }
        }
        response
    }

    async fn handle(&self, req: Request<BodyIn>) -> Result<HttpResponse, DavError> {
        let mut request = DavRequest::decode(req).await?;

        let mount = self.resolve(&request.src_path).ok_or(DavError::NotFound)?;
        request.prefix = mount.prefix.clone();
        request.local_src = request
            .src_path
            .strip_prefix(&mount.prefix)
            .ok_or(DavError::NotFound)?;
        if let Some(dst) = &request.dst_path {
            // COPY/MOVE may not hop across providers
            request.local_dst = Some(
                dst.strip_prefix(&mount.prefix)
                    .filter(|_| self.resolve(dst).map(|m| &m.prefix) == Some(&mount.prefix))
                    .ok_or(DavError::BadGateway)?,
            );
        }

        let controller = Controller {
            provider: mount.provider.as_ref(),
            locks: &self.locks,
            path_locks: &self.path_locks,
            pretty: self.pretty,
        };
        controller.route(request).await
    }

    fn resolve(&self, path: &DavPath) -> Option<&Mount> {
        self.mounts
            .iter()
            .filter(|mount| mount.prefix == *path || mount.prefix.is_ancestor_of(path))
            .max_by_key(|mount| mount.prefix.segments().len())
    }

    fn error_response(&self, err: DavError) -> HttpResponse {
        let status = err.status();
        let mut builder = Response::builder().status(status);
        if status == http::StatusCode::METHOD_NOT_ALLOWED {
            builder = builder.header("Allow", ALLOWED_METHODS);
        }
        if status == http::StatusCode::INTERNAL_SERVER_ERROR {
            let request_id = Uuid::new_v4();
            tracing::error!(err=?err, request_id=%request_id, "request failed");
            builder = builder.header("X-Request-Id", request_id.to_string());
        } else {
            tracing::debug!(err=?err, status=%status, "request refused");
        }
        let body = match status.canonical_reason() {
            Some(reason) => codec::text_body(reason),
            None => codec::text_body(""),
        };
        match builder.body(body) {
            Ok(response) => response,
            Err(_) => Response::new(codec::text_body("")),
        }
    }
}
