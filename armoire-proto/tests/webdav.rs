use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, Request, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use tokio::time::Instant;

use armoire_proto::codec::BodyIn;
use armoire_proto::dist::Distributor;
use armoire_proto::lock::{LockConfig, LockManager};
use armoire_proto::mem::MemProvider;
use armoire_proto::path::DavPath;
use armoire_proto::time::DavTime;

fn path(raw: &str) -> DavPath {
    DavPath::parse(raw).unwrap()
}

fn body_of(text: &str) -> BodyIn {
    BoxBody::new(Full::new(Bytes::from(text.to_string())).map_err(|e| match e {}))
}

/// One provider mounted at `/` with a small tree, a second empty one at
/// `/x` so cross-mount behavior is observable.
async fn fixture() -> Distributor {
    let locks = Arc::new(LockManager::new(LockConfig::default()));
    let mut dist = Distributor::new(locks, false);

    let main = MemProvider::new();
    main.seed_collection(&path("/a")).await;
    main.seed_file(
        &path("/a/b"),
        b"0123456789",
        "text/plain",
        DavTime::from_unix(1700000000),
    )
    .await;
    main.seed_collection(&path("/a/sub")).await;
    main.seed_file(
        &path("/a/sub/e"),
        b"e",
        "text/plain",
        DavTime::from_unix(1700000200),
    )
    .await;
    main.seed_collection(&path("/c")).await;
    main.seed_file(
        &path("/c/d"),
        b"old",
        "text/plain",
        DavTime::from_unix(1700000100),
    )
    .await;
    dist.mount(DavPath::root(), Arc::new(main));

    let other = MemProvider::new();
    dist.mount(path("/x"), Arc::new(other));

    dist
}

async fn exchange(
    dist: &Distributor,
    method: &str,
    target: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> (StatusCode, HeaderMap, String) {
    let mut builder = Request::builder().method(method).uri(target);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = dist.dispatch(builder.body(body_of(body)).unwrap()).await;
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    (
        parts.status,
        parts.headers,
        String::from_utf8_lossy(&bytes).into_owned(),
    )
}

const EXCLUSIVE_LOCKINFO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>me</D:href></D:owner>
</D:lockinfo>"#;

const SHARED_LOCKINFO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:shared/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
</D:lockinfo>"#;

const LOCKDISCOVERY_PROBE: &str =
    r#"<D:propfind xmlns:D="DAV:"><D:prop><D:lockdiscovery/></D:prop></D:propfind>"#;

#[tokio::test]
async fn propfind_allprop_depth_zero() {
    let dist = fixture().await;
    let (status, headers, body) = exchange(&dist, "PROPFIND", "/a/b", &[("Depth", "0")], "").await;

    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(headers
        .get("Content-Type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/xml"));
    assert_eq!(body.matches("<D:response>").count(), 1);
    assert!(body.contains("<D:href>/a/b</D:href>"));
    assert!(body.contains("<D:getcontentlength>10</D:getcontentlength>"));
    // weak etag over (size, mtime); the quotes travel xml-escaped
    assert!(body.contains("4df935c3af69471f993528ad791ff93b"));
    // getlastmodified is an HTTP-date
    assert!(body.contains("Tue, 14 Nov 2023 22:13:20 GMT"));
    // creationdate is RFC 3339
    assert!(body.contains("<D:creationdate>2023-11-14T22:13:20"));
}

#[tokio::test]
async fn propfind_depth_controls_the_response_count() {
    let dist = fixture().await;

    let (_, _, body) = exchange(&dist, "PROPFIND", "/a", &[("Depth", "0")], "").await;
    assert_eq!(body.matches("<D:response>").count(), 1);

    // the collection plus its two immediate members
    let (_, _, body) = exchange(&dist, "PROPFIND", "/a", &[("Depth", "1")], "").await;
    assert_eq!(body.matches("<D:response>").count(), 3);

    // a missing Depth header means infinity: the whole subtree
    let (_, _, body) = exchange(&dist, "PROPFIND", "/a", &[], "").await;
    assert_eq!(body.matches("<D:response>").count(), 4);
}

#[tokio::test]
async fn propfind_propname_lists_names_without_values() {
    let dist = fixture().await;
    let probe = r#"<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
    let (status, _, body) = exchange(&dist, "PROPFIND", "/a/b", &[("Depth", "0")], probe).await;

    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("<D:getetag/>"));
    assert!(body.contains("<D:supportedlock/>"));
    assert!(!body.contains("4df935c3af69471f993528ad791ff93b"));
}

#[tokio::test]
async fn propfind_missing_resource_is_not_found() {
    let dist = fixture().await;
    let (status, _, _) = exchange(&dist, "PROPFIND", "/nope", &[("Depth", "0")], "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lock_blocks_writes_without_the_token() {
    let dist = fixture().await;
    let (status, headers, body) = exchange(
        &dist,
        "LOCK",
        "/a",
        &[("Depth", "infinity"), ("Timeout", "Second-3600")],
        EXCLUSIVE_LOCKINFO,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let token = headers
        .get("Lock-Token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(token.starts_with("<opaquelocktoken:") && token.ends_with('>'));
    assert!(body.contains("<D:lockdiscovery>"));
    assert!(body.contains("<D:depth>infinity</D:depth>"));
    assert!(body.contains("<D:timeout>Second-3600</D:timeout>"));

    // a write below the lock root without the token is repelled
    let (status, _, _) = exchange(&dist, "PUT", "/a/b", &[], "new bytes").await;
    assert_eq!(status, StatusCode::LOCKED);

    // the same write with the token goes through
    let if_header = format!("({})", token);
    let (status, _, _) = exchange(&dist, "PUT", "/a/b", &[("If", &if_header)], "new bytes").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = exchange(&dist, "PUT", "/a/fresh", &[("If", &if_header)], "x").await;
    assert_eq!(status, StatusCode::CREATED);

    // the lock shows up in lockdiscovery on covered members
    let (_, _, body) =
        exchange(&dist, "PROPFIND", "/a/b", &[("Depth", "0")], LOCKDISCOVERY_PROBE).await;
    assert!(body.contains("opaquelocktoken:"));
    assert!(body.contains("<D:href>/a</D:href>"));
}

#[tokio::test]
async fn shared_locks_coexist_but_exclusive_conflicts() {
    let dist = fixture().await;
    let (status, _, _) = exchange(&dist, "LOCK", "/a/b", &[("Depth", "0")], SHARED_LOCKINFO).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = exchange(&dist, "LOCK", "/a/b", &[("Depth", "0")], SHARED_LOCKINFO).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) =
        exchange(&dist, "LOCK", "/a/b", &[("Depth", "0")], EXCLUSIVE_LOCKINFO).await;
    assert_eq!(status, StatusCode::LOCKED);
    assert!(body.contains("no-conflicting-lock"));
    assert!(body.contains("<D:href>/a/b</D:href>"));
}

#[tokio::test]
async fn lock_conflict_at_a_descendant_is_a_multistatus() {
    let dist = fixture().await;
    let (status, _, _) = exchange(
        &dist,
        "LOCK",
        "/a/b",
        &[("Depth", "0")],
        EXCLUSIVE_LOCKINFO,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // locking the whole tree trips over the lock rooted below
    let (status, _, body) = exchange(
        &dist,
        "LOCK",
        "/a",
        &[("Depth", "infinity")],
        EXCLUSIVE_LOCKINFO,
    )
    .await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("HTTP/1.1 423 Locked"));
    assert!(body.contains("<D:href>/a/b</D:href>"));
}

#[tokio::test]
async fn locked_null_resource_springs_into_existence() {
    let dist = fixture().await;
    let (status, headers, _) = exchange(
        &dist,
        "LOCK",
        "/a/ghost",
        &[("Depth", "0")],
        EXCLUSIVE_LOCKINFO,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = headers
        .get("Lock-Token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let (status, _, body) = exchange(&dist, "GET", "/a/ghost", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "");

    let (status, _, _) = exchange(&dist, "PUT", "/a/ghost", &[], "content").await;
    assert_eq!(status, StatusCode::LOCKED);
    let if_header = format!("({})", token);
    let (status, _, _) = exchange(&dist, "PUT", "/a/ghost", &[("If", &if_header)], "content").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test(start_paused = true)]
async fn lock_refresh_extends_then_expiry_hides() {
    let dist = fixture().await;
    let (status, headers, _) = exchange(
        &dist,
        "LOCK",
        "/a",
        &[("Depth", "infinity"), ("Timeout", "Second-60")],
        EXCLUSIVE_LOCKINFO,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = headers
        .get("Lock-Token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let if_header = format!("({})", token);

    // t=40: an empty-body LOCK with the matching token renews the lease
    tokio::time::advance(Duration::from_secs(40)).await;
    let (status, _, body) = exchange(
        &dist,
        "LOCK",
        "/a",
        &[("If", &if_header), ("Timeout", "Second-60")],
        "",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<D:timeout>Second-60</D:timeout>"));

    // t=80: past the original deadline, alive thanks to the refresh
    tokio::time::advance(Duration::from_secs(40)).await;
    dist.sweep_locks(Instant::now());
    let (_, _, body) =
        exchange(&dist, "PROPFIND", "/a", &[("Depth", "0")], LOCKDISCOVERY_PROBE).await;
    assert!(body.contains("opaquelocktoken:"));

    // t=120: past the refreshed deadline, gone
    tokio::time::advance(Duration::from_secs(40)).await;
    dist.sweep_locks(Instant::now());
    let (_, _, body) =
        exchange(&dist, "PROPFIND", "/a", &[("Depth", "0")], LOCKDISCOVERY_PROBE).await;
    assert!(!body.contains("opaquelocktoken:"));

    // an expired token no longer refreshes
    let (status, _, _) = exchange(&dist, "LOCK", "/a", &[("If", &if_header)], "").await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn unlock_lifecycle() {
    let dist = fixture().await;
    let (_, headers, _) = exchange(
        &dist,
        "LOCK",
        "/a/b",
        &[("Depth", "0")],
        EXCLUSIVE_LOCKINFO,
    )
    .await;
    let token = headers
        .get("Lock-Token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    // UNLOCK needs its Lock-Token header
    let (status, _, _) = exchange(&dist, "UNLOCK", "/a/b", &[], "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // a token that matches no live lock is a conflict
    let (status, _, _) = exchange(
        &dist,
        "UNLOCK",
        "/a/b",
        &[("Lock-Token", "<opaquelocktoken:11111111-2222-3333-4444-555555555555>")],
        "",
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = exchange(&dist, "UNLOCK", "/a/b", &[("Lock-Token", &token)], "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // the resource writes freely again
    let (status, _, _) = exchange(&dist, "PUT", "/a/b", &[], "free").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn proppatch_failure_rolls_everything_back() {
    let dist = fixture().await;
    let update = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:set><D:prop><Z:color>red</Z:color></D:prop></D:set>
  <D:remove><D:prop><Z:flavor/></D:prop></D:remove>
</D:propertyupdate>"#;

    let (status, _, body) = exchange(&dist, "PROPPATCH", "/a/b", &[], update).await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("HTTP/1.1 424 Failed Dependency"));
    assert!(body.contains("color"));
    assert!(body.contains("flavor"));
    assert!(!body.contains("HTTP/1.1 200 OK"));

    // the set was rolled back with the rest
    let probe = r#"<D:propfind xmlns:D="DAV:" xmlns:Z="urn:example:props"><D:prop><Z:color/></D:prop></D:propfind>"#;
    let (_, _, body) = exchange(&dist, "PROPFIND", "/a/b", &[("Depth", "0")], probe).await;
    assert!(body.contains("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn proppatch_set_remove_round_trip() {
    let dist = fixture().await;
    let set = r#"<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:set><D:prop><Z:color>red</Z:color></D:prop></D:set>
</D:propertyupdate>"#;
    let (status, _, body) = exchange(&dist, "PROPPATCH", "/a/b", &[], set).await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("HTTP/1.1 200 OK"));

    // readable through PROPFIND, both targeted and via allprop
    let probe = r#"<D:propfind xmlns:D="DAV:" xmlns:Z="urn:example:props"><D:prop><Z:color/></D:prop></D:propfind>"#;
    let (_, _, body) = exchange(&dist, "PROPFIND", "/a/b", &[("Depth", "0")], probe).await;
    assert!(body.contains(">red<"));
    let (_, _, body) = exchange(&dist, "PROPFIND", "/a/b", &[("Depth", "0")], "").await;
    assert!(body.contains(">red<"));

    let remove = r#"<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:remove><D:prop><Z:color/></D:prop></D:remove>
</D:propertyupdate>"#;
    let (status, _, body) = exchange(&dist, "PROPPATCH", "/a/b", &[], remove).await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("HTTP/1.1 200 OK"));
}

#[tokio::test]
async fn proppatch_refuses_protected_properties() {
    let dist = fixture().await;
    let update = r#"<D:propertyupdate xmlns:D="DAV:">
  <D:set><D:prop><D:getetag>"forged"</D:getetag></D:prop></D:set>
</D:propertyupdate>"#;
    let (status, _, body) = exchange(&dist, "PROPPATCH", "/a/b", &[], update).await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("HTTP/1.1 424 Failed Dependency"));
    assert!(body.contains("cannot-modify-protected-property"));
}

#[tokio::test]
async fn move_honors_overwrite() {
    let dist = fixture().await;
    let dst = [("Destination", "http://localhost/c/d"), ("Overwrite", "F")];
    let (status, _, _) = exchange(&dist, "MOVE", "/a/b", &dst, "").await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    let dst = [("Destination", "http://localhost/c/d"), ("Overwrite", "T")];
    let (status, _, _) = exchange(&dist, "MOVE", "/a/b", &dst, "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = exchange(&dist, "GET", "/c/d", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "0123456789");
    let (status, _, _) = exchange(&dist, "GET", "/a/b", &[], "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn copy_to_a_new_name_creates() {
    let dist = fixture().await;
    let (status, _, _) = exchange(
        &dist,
        "COPY",
        "/a/b",
        &[("Destination", "/c/b2")],
        "",
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // source still there
    let (status, _, body) = exchange(&dist, "GET", "/a/b", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "0123456789");
    let (_, _, body) = exchange(&dist, "GET", "/c/b2", &[], "").await;
    assert_eq!(body, "0123456789");
}

#[tokio::test]
async fn copy_across_mounts_is_a_bad_gateway() {
    let dist = fixture().await;
    let (status, _, _) = exchange(&dist, "COPY", "/a/b", &[("Destination", "/x/d")], "").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn mkcol_and_delete() {
    let dist = fixture().await;
    let (status, _, _) = exchange(&dist, "MKCOL", "/a/dir", &[], "").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, _) = exchange(&dist, "MKCOL", "/a/dir", &[], "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _, _) = exchange(&dist, "MKCOL", "/missing/dir", &[], "").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = exchange(&dist, "MKCOL", "/a/dir2", &[], "<not-understood/>").await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _, _) = exchange(&dist, "DELETE", "/a/dir", &[], "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = exchange(&dist, "DELETE", "/a/dir", &[], "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_on_a_collection_lists_members() {
    let dist = fixture().await;
    let (status, headers, body) = exchange(&dist, "GET", "/a", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers
        .get("Content-Type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert!(body.contains("b\n"));
    assert!(body.contains("sub/\n"));
}

#[tokio::test]
async fn get_file_headers() {
    let dist = fixture().await;
    let (status, headers, body) = exchange(&dist, "GET", "/a/b", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "0123456789");
    assert_eq!(headers.get("Content-Length").unwrap(), "10");
    assert_eq!(
        headers.get("ETag").unwrap(),
        &format!("W/\"{}\"", "4df935c3af69471f993528ad791ff93b")
    );
    assert_eq!(
        headers.get("Last-Modified").unwrap(),
        "Tue, 14 Nov 2023 22:13:20 GMT"
    );

    // HEAD mirrors the headers without the body
    let (status, headers, body) = exchange(&dist, "HEAD", "/a/b", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("Content-Length").unwrap(), "10");
    assert_eq!(body, "");
}

#[tokio::test]
async fn options_advertises_dav_capabilities() {
    let dist = fixture().await;
    let (status, headers, _) = exchange(&dist, "OPTIONS", "/", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("DAV").unwrap(), "1, 2");
    assert!(headers
        .get("Allow")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("PROPFIND"));
    assert!(headers.contains_key("Date"));
}

#[tokio::test]
async fn unknown_method_is_refused() {
    let dist = fixture().await;
    let (status, headers, _) = exchange(&dist, "REPORT", "/a", &[], "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(headers.contains_key("Allow"));
}

#[tokio::test]
async fn unmounted_prefix_is_not_found() {
    let locks = Arc::new(LockManager::new(LockConfig::default()));
    let mut dist = Distributor::new(locks, false);
    dist.mount(path("/data"), Arc::new(MemProvider::new()));

    let (status, _, _) = exchange(&dist, "GET", "/elsewhere", &[], "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // the mount itself resolves, rewritten to the provider's root
    let (status, _, body) = exchange(&dist, "PROPFIND", "/data", &[("Depth", "0")], "").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("<D:href>/data</D:href>"));
}

#[tokio::test]
async fn malformed_bodies_and_paths_are_bad_requests() {
    let dist = fixture().await;
    let (status, _, _) = exchange(&dist, "PROPFIND", "/a", &[("Depth", "0")], "<broken").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = exchange(&dist, "GET", "/a/../secret", &[], "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = exchange(&dist, "MOVE", "/a/b", &[], "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
