use http::header::HeaderMap;
use uuid::Uuid;

use armoire_dav::types as dav;

use crate::codec::{self, BodyIn};
use crate::error::DavError;
use crate::path::DavPath;

/// The protocol methods this pipeline understands. Anything else is
/// refused with 405 before a provider is ever consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DavMethod {
    Options,
    Head,
    Get,
    Put,
    Delete,
    Mkcol,
    Propfind,
    Proppatch,
    Copy,
    Move,
    Lock,
    Unlock,
}

impl DavMethod {
    pub fn parse(method: &http::Method) -> Option<Self> {
        match method.as_str() {
            "OPTIONS" => Some(Self::Options),
            "HEAD" => Some(Self::Head),
            "GET" => Some(Self::Get),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "MKCOL" => Some(Self::Mkcol),
            "PROPFIND" => Some(Self::Propfind),
            "PROPPATCH" => Some(Self::Proppatch),
            "COPY" => Some(Self::Copy),
            "MOVE" => Some(Self::Move),
            "LOCK" => Some(Self::Lock),
            "UNLOCK" => Some(Self::Unlock),
            _ => None,
        }
    }
}

/// One submitted clause harvested from `If:` or `Lock-Token:`: a state
/// token, optionally tied to an entity tag the resource must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub token: Uuid,
    pub etag: Option<String>,
    pub negated: bool,
}

/// A PROPPATCH instruction, in document order. `protected` marks an
/// attempt to touch one of the server-computed properties.
#[derive(Debug, Clone, PartialEq)]
pub struct PropPatch {
    pub name: dav::PropIdent,
    pub value: Option<String>,
    pub set: bool,
    pub protected: bool,
}

/// Everything the pipeline needs to know about one HTTP exchange,
/// decoded up front. The distributor later rewrites `prefix`/`local_*`
/// to be provider-relative.
pub struct DavRequest {
    pub method: DavMethod,
    pub src_path: DavPath,
    pub dst_path: Option<DavPath>,
    depth: Option<dav::Depth>,
    pub overwrite: bool,
    pub timeout: Option<dav::Timeout>,

    pub conditions: Vec<Condition>,
    pub tagged_path: Option<DavPath>,
    pub lock_token: Option<Uuid>,
    pub token_parse_failed: bool,

    pub body_parsed: bool,
    pub body_present: bool,
    pub propfind: Option<dav::PropFind>,
    pub proppatch: Vec<PropPatch>,
    pub lock_info: Option<dav::LockInfo>,
    /// PUT only: the raw body, left unread for the provider to stream.
    pub body: Option<BodyIn>,

    // filled in by the distributor
    pub prefix: DavPath,
    pub local_src: DavPath,
    pub local_dst: Option<DavPath>,
}

impl DavRequest {
    pub async fn decode(req: http::Request<BodyIn>) -> Result<DavRequest, DavError> {
        let (parts, body) = req.into_parts();

        let method = DavMethod::parse(&parts.method).ok_or(DavError::MethodNotAllowed)?;
        let src_path = DavPath::parse(parts.uri.path())?;

        let dst_path = match header_str(&parts.headers, "Destination")? {
            Some(raw) => Some(path_of_uri(raw)?),
            None => None,
        };
        let depth = parse_depth(header_str(&parts.headers, "Depth")?)?;
        // Overwrite = "T" | "F", absent means F; anything else than an
        // explicit F is taken as consent
        let overwrite = match header_str(&parts.headers, "Overwrite")? {
            None => false,
            Some(raw) => raw.trim() != "F",
        };
        let timeout = header_str(&parts.headers, "Timeout")?.and_then(parse_timeout);

        let mut token_parse_failed = false;
        let mut conditions = Vec::new();
        let mut tagged_path = None;
        if let Some(raw) = header_str(&parts.headers, "If")? {
            match parse_if_header(raw) {
                Ok((tagged, conds)) if !conds.is_empty() => {
                    tagged_path = tagged;
                    conditions = conds;
                }
                _ => token_parse_failed = true,
            }
        }
        let lock_token = match header_str(&parts.headers, "Lock-Token")? {
            Some(raw) => match coded_token(raw) {
                Some(uuid) => Some(uuid),
                None => {
                    token_parse_failed = true;
                    None
                }
            },
            None => None,
        };

        let mut request = DavRequest {
            method,
            local_src: src_path.clone(),
            src_path,
            local_dst: dst_path.clone(),
            dst_path,
            depth,
            overwrite,
            timeout,
            conditions,
            tagged_path,
            lock_token,
            token_parse_failed,
            body_parsed: true,
            body_present: false,
            propfind: None,
            proppatch: Vec::new(),
            lock_info: None,
            body: None,
            prefix: DavPath::root(),
        };

        match method {
            DavMethod::Put => {
                request.body = Some(body);
            }
            DavMethod::Propfind => {
                let raw = codec::read_body(body).await?;
                if is_blank(&raw) {
                    // An empty PROPFIND request body MUST be treated as
                    // an 'allprop' request.
                    request.propfind = Some(dav::PropFind::AllProp);
                } else {
                    match codec::deserialize::<dav::PropFind>(&raw).await {
                        Ok(propfind) => request.propfind = Some(propfind),
                        Err(e) => {
                            tracing::debug!(err=?e, "unable to decode PROPFIND body");
                            request.body_parsed = false;
                        }
                    }
                }
            }
            DavMethod::Proppatch => {
                let raw = codec::read_body(body).await?;
                match codec::deserialize::<dav::PropertyUpdate>(&raw).await {
                    Ok(update) => request.proppatch = flatten_update(update),
                    Err(e) => {
                        tracing::debug!(err=?e, "unable to decode PROPPATCH body");
                        request.body_parsed = false;
                    }
                }
            }
            DavMethod::Lock => {
                let raw = codec::read_body(body).await?;
                if !is_blank(&raw) {
                    match codec::deserialize::<dav::LockInfo>(&raw).await {
                        Ok(info) => request.lock_info = Some(info),
                        Err(e) => {
                            tracing::debug!(err=?e, "unable to decode LOCK body");
                            request.body_parsed = false;
                        }
                    }
                }
                // an empty body is a refresh
            }
            DavMethod::Mkcol => {
                let raw = codec::read_body(body).await?;
                request.body_present = !is_blank(&raw);
            }
            _ => {}
        }

        Ok(request)
    }

    /// Effective depth: a missing header defaults per RFC 4918, infinity
    /// for the methods that say so.
    pub fn depth(&self) -> dav::Depth {
        match (self.depth, self.method) {
            (Some(depth), _) => depth,
            (
                None,
                DavMethod::Propfind | DavMethod::Lock | DavMethod::Copy | DavMethod::Move,
            ) => dav::Depth::Infinity,
            (None, _) => dav::Depth::Zero,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, DavError> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| DavError::BadRequest),
        None => Ok(None),
    }
}

fn is_blank(raw: &[u8]) -> bool {
    raw.iter().all(u8::is_ascii_whitespace)
}

fn parse_depth(raw: Option<&str>) -> Result<Option<dav::Depth>, DavError> {
    match raw.map(str::trim) {
        None => Ok(None),
        Some("0") => Ok(Some(dav::Depth::Zero)),
        Some("1") => Ok(Some(dav::Depth::One)),
        Some(word) if word.eq_ignore_ascii_case("infinity") => Ok(Some(dav::Depth::Infinity)),
        Some(_) => Err(DavError::BadRequest),
    }
}

/// `Timeout: Second-3600` or `Timeout: Infinite`, first understandable
/// item of the list wins, the rest is ignored.
fn parse_timeout(raw: &str) -> Option<dav::Timeout> {
    for item in raw.split(',') {
        let item = item.trim();
        if item == "Infinite" {
            return Some(dav::Timeout::Infinite);
        }
        if let Some(seconds) = item.strip_prefix("Second-") {
            if let Ok(count) = seconds.parse::<u32>() {
                return Some(dav::Timeout::Seconds(count));
            }
        }
    }
    None
}

/// The path component of a Destination-style URI, absolute form or not.
fn path_of_uri(uri: &str) -> Result<DavPath, DavError> {
    let path = match uri.find("://") {
        Some(scheme_end) => {
            let after_authority = &uri[scheme_end + 3..];
            match after_authority.find('/') {
                Some(slash) => &after_authority[slash..],
                None => "/",
            }
        }
        None => uri,
    };
    DavPath::parse(path)
}

/// The UUID hiding at the end of a state token URI
/// (`opaquelocktoken:<uuid>`, `urn:uuid:<uuid>`, ...). Anything else is
/// not one of our locks.
fn uuid_of_token(raw: &str) -> Option<Uuid> {
    let tail = raw.rsplit(':').next()?;
    Uuid::parse_str(tail.trim()).ok()
}

/// `Lock-Token: <opaquelocktoken:uuid>`
fn coded_token(raw: &str) -> Option<Uuid> {
    let inner = raw.trim().strip_prefix('<')?.strip_suffix('>')?;
    uuid_of_token(inner)
}

/// RFC 4918 §10.4 `If:` header, reduced to what the lock manager
/// evaluates: an optional tagged `<URI>` scope, then parenthesized lists
/// of `Not`, `<state-token>` and `[etag]` items. Within a list, each
/// harvested token is paired with the list's entity tag, if any.
/// Unbalanced brackets make the whole header unparsable; the caller
/// flags the request instead of failing.
fn parse_if_header(raw: &str) -> Result<(Option<DavPath>, Vec<Condition>), ()> {
    let mut conditions = Vec::new();
    let mut tagged = None;
    let mut rest = raw.trim();

    if rest.starts_with('<') {
        let end = rest.find('>').ok_or(())?;
        tagged = path_of_uri(&rest[1..end]).ok();
        rest = rest[end + 1..].trim_start();
    }

    while !rest.is_empty() {
        if !rest.starts_with('(') {
            return Err(());
        }
        let close = rest.find(')').ok_or(())?;
        let mut items = rest[1..close].trim();

        let mut list_tokens: Vec<(Uuid, bool)> = Vec::new();
        let mut list_etag: Option<String> = None;
        let mut negate_next = false;
        while !items.is_empty() {
            if let Some(stripped) = items.strip_prefix("Not") {
                negate_next = true;
                items = stripped.trim_start();
                continue;
            }
            match items.as_bytes()[0] {
                b'<' => {
                    let end = items.find('>').ok_or(())?;
                    if let Some(token) = uuid_of_token(&items[1..end]) {
                        list_tokens.push((token, negate_next));
                    }
                    negate_next = false;
                    items = items[end + 1..].trim_start();
                }
                b'[' => {
                    let end = items.find(']').ok_or(())?;
                    list_etag = Some(items[1..end].to_string());
                    negate_next = false;
                    items = items[end + 1..].trim_start();
                }
                _ => return Err(()),
            }
        }

        for (token, negated) in list_tokens {
            conditions.push(Condition {
                token,
                etag: list_etag.clone(),
                negated,
            });
        }
        rest = rest[close + 1..].trim_start();
    }

    Ok((tagged, conditions))
}

/// Flatten a propertyupdate into the ordered instruction list the
/// property engine executes. Live properties survive the trip so the
/// engine can refuse them.
fn flatten_update(update: dav::PropertyUpdate) -> Vec<PropPatch> {
    let mut entries = Vec::new();
    for item in update.0 {
        match item {
            dav::PropertyUpdateItem::Set(dav::Set(dav::AnyProp(props))) => {
                for prop in props {
                    entries.push(match prop {
                        dav::AnyProperty::Value(dav::Property::Dead(dead)) => PropPatch {
                            name: dead.name,
                            value: Some(dead.value),
                            set: true,
                            protected: false,
                        },
                        dav::AnyProperty::Request(dav::PropertyRequest::Dead(ident)) => PropPatch {
                            name: ident,
                            value: Some(String::new()),
                            set: true,
                            protected: false,
                        },
                        dav::AnyProperty::Value(live) => PropPatch {
                            name: dav::PropIdent::new("DAV:", live.dav_name().unwrap_or("")),
                            value: None,
                            set: true,
                            protected: true,
                        },
                        dav::AnyProperty::Request(live) => PropPatch {
                            name: dav::PropIdent::new("DAV:", live.dav_name().unwrap_or("")),
                            value: None,
                            set: true,
                            protected: true,
                        },
                    });
                }
            }
            dav::PropertyUpdateItem::Remove(dav::Remove(dav::PropName(names))) => {
                for name in names {
                    entries.push(match name {
                        dav::PropertyRequest::Dead(ident) => PropPatch {
                            name: ident,
                            value: None,
                            set: false,
                            protected: false,
                        },
                        live => PropPatch {
                            name: dav::PropIdent::new("DAV:", live.dav_name().unwrap_or("")),
                            value: None,
                            set: false,
                            protected: true,
                        },
                    });
                }
            }
        }
    }
    entries
}
