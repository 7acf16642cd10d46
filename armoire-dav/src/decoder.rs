use chrono::DateTime;

use super::error::ParsingError;
use super::types::*;
use super::xml::{IRead, Name, Part, ReadXml, Scanner, DAV_URN};

// Every parser below works the same way: the caller has entered an
// element, children are pulled one by one and dispatched on their
// resolved name, anything unrecognized is dropped whole.

// ---- document roots ----

impl ReadXml for PropFind {
    async fn read_xml<R: IRead>(s: &mut Scanner<R>) -> Result<Self, ParsingError> {
        s.open_root("propfind").await?;
        let mut picked = None;
        while let Some(child) = s.next_child().await? {
            match child.dav() {
                Some("propname") => {
                    s.skip_child().await?;
                    picked = Some(PropFind::PropName);
                }
                Some("allprop") => {
                    s.skip_child().await?;
                    picked = Some(PropFind::AllProp);
                }
                Some("prop") => picked = Some(PropFind::Prop(PropName(name_list(s).await?))),
                _ => s.skip_child().await?,
            }
        }
        picked.ok_or(ParsingError::MissingChild)
    }
}

impl ReadXml for PropertyUpdate {
    async fn read_xml<R: IRead>(s: &mut Scanner<R>) -> Result<Self, ParsingError> {
        s.open_root("propertyupdate").await?;
        let mut items = Vec::new();
        while let Some(child) = s.next_child().await? {
            match child.dav() {
                Some("set") => {
                    items.push(PropertyUpdateItem::Set(Set(AnyProp(
                        contained_props(s).await?,
                    ))));
                }
                Some("remove") => {
                    items.push(PropertyUpdateItem::Remove(Remove(PropName(
                        contained_names(s).await?,
                    ))));
                }
                _ => s.skip_child().await?,
            }
        }
        Ok(PropertyUpdate(items))
    }
}

impl ReadXml for LockInfo {
    async fn read_xml<R: IRead>(s: &mut Scanner<R>) -> Result<Self, ParsingError> {
        s.open_root("lockinfo").await?;
        let (mut scope, mut kind, mut owner) = (None, None, None);
        while let Some(child) = s.next_child().await? {
            match child.dav() {
                Some("lockscope") => scope = Some(lock_scope(s).await?),
                Some("locktype") => kind = Some(lock_type(s).await?),
                Some("owner") => owner = Some(lock_owner(s).await?),
                _ => s.skip_child().await?,
            }
        }
        Ok(LockInfo {
            lockscope: scope.ok_or(ParsingError::MissingChild)?,
            locktype: kind.ok_or(ParsingError::MissingChild)?,
            owner,
        })
    }
}

impl ReadXml for Multistatus {
    async fn read_xml<R: IRead>(s: &mut Scanner<R>) -> Result<Self, ParsingError> {
        s.open_root("multistatus").await?;
        let mut responses = Vec::new();
        let mut description = None;
        while let Some(child) = s.next_child().await? {
            match child.dav() {
                Some("response") => responses.push(response(s).await?),
                Some("responsedescription") => {
                    description = Some(ResponseDescription(s.text().await?))
                }
                _ => s.skip_child().await?,
            }
        }
        Ok(Multistatus {
            responses,
            responsedescription: description,
        })
    }
}

impl ReadXml for Error {
    async fn read_xml<R: IRead>(s: &mut Scanner<R>) -> Result<Self, ParsingError> {
        s.open_root("error").await?;
        Ok(Error(violations(s).await?))
    }
}

impl ReadXml for PropValue {
    async fn read_xml<R: IRead>(s: &mut Scanner<R>) -> Result<Self, ParsingError> {
        s.open_root("prop").await?;
        let mut values = Vec::new();
        while let Some(child) = s.next_child().await? {
            if let AnyProperty::Value(value) = any_property(s, &child).await? {
                values.push(value);
            }
        }
        Ok(PropValue(values))
    }
}

impl ReadXml for AnyProp {
    async fn read_xml<R: IRead>(s: &mut Scanner<R>) -> Result<Self, ParsingError> {
        s.open_root("prop").await?;
        let mut props = Vec::new();
        while let Some(child) = s.next_child().await? {
            props.push(any_property(s, &child).await?);
        }
        Ok(AnyProp(props))
    }
}

impl ReadXml for ActiveLock {
    async fn read_xml<R: IRead>(s: &mut Scanner<R>) -> Result<Self, ParsingError> {
        s.open_root("activelock").await?;
        active_lock(s).await
    }
}

impl ReadXml for Href {
    async fn read_xml<R: IRead>(s: &mut Scanner<R>) -> Result<Self, ParsingError> {
        s.open_root("href").await?;
        Ok(Href(s.text().await?))
    }
}

// ---- property containers ----

/// Children of a name-only `<prop>`, as in PROPFIND and `<remove>`.
async fn name_list<R: IRead>(s: &mut Scanner<R>) -> Result<Vec<PropertyRequest>, ParsingError> {
    let mut names = Vec::new();
    while let Some(child) = s.next_child().await? {
        names.push(property_name(s, &child).await?);
    }
    Ok(names)
}

/// The `<prop>` wrapped inside `<set>`.
async fn contained_props<R: IRead>(s: &mut Scanner<R>) -> Result<Vec<AnyProperty>, ParsingError> {
    let mut props = Vec::new();
    while let Some(child) = s.next_child().await? {
        match child.is_dav("prop") {
            true => {
                while let Some(prop) = s.next_child().await? {
                    props.push(any_property(s, &prop).await?);
                }
            }
            false => s.skip_child().await?,
        }
    }
    Ok(props)
}

/// The `<prop>` wrapped inside `<remove>`.
async fn contained_names<R: IRead>(
    s: &mut Scanner<R>,
) -> Result<Vec<PropertyRequest>, ParsingError> {
    let mut names = Vec::new();
    while let Some(child) = s.next_child().await? {
        match child.is_dav("prop") {
            true => names.extend(name_list(s).await?),
            false => s.skip_child().await?,
        }
    }
    Ok(names)
}

fn name_only(local: &str) -> PropertyRequest {
    match local {
        "creationdate" => PropertyRequest::CreationDate,
        "displayname" => PropertyRequest::DisplayName,
        "getcontentlanguage" => PropertyRequest::GetContentLanguage,
        "getcontentlength" => PropertyRequest::GetContentLength,
        "getcontenttype" => PropertyRequest::GetContentType,
        "getetag" => PropertyRequest::GetEtag,
        "getlastmodified" => PropertyRequest::GetLastModified,
        "lockdiscovery" => PropertyRequest::LockDiscovery,
        "resourcetype" => PropertyRequest::ResourceType,
        "supportedlock" => PropertyRequest::SupportedLock,
        other => PropertyRequest::Dead(PropIdent::new(DAV_URN, other)),
    }
}

/// A property cited by name only; whatever content it has is dropped.
async fn property_name<R: IRead>(
    s: &mut Scanner<R>,
    child: &Name,
) -> Result<PropertyRequest, ParsingError> {
    let request = match child.dav() {
        Some(local) => name_only(local),
        None => PropertyRequest::Dead(PropIdent::new(
            child.ns.clone().unwrap_or_default(),
            child.local.clone(),
        )),
    };
    s.skip_child().await?;
    Ok(request)
}

/// A property as it appears in value-bearing positions: a self-closing
/// element is a name, everything else carries a value.
async fn any_property<R: IRead>(
    s: &mut Scanner<R>,
    name: &Name,
) -> Result<AnyProperty, ParsingError> {
    use AnyProperty::{Request, Value};

    let Some(local) = name.dav() else {
        let ident = PropIdent::new(name.ns.clone().unwrap_or_default(), name.local.clone());
        if s.is_hollow() {
            s.skip_child().await?;
            return Ok(Request(PropertyRequest::Dead(ident)));
        }
        let value = s.flat_text().await?;
        return Ok(Value(Property::Dead(DeadProperty { name: ident, value })));
    };

    if s.is_hollow() {
        s.skip_child().await?;
        return Ok(Request(name_only(local)));
    }

    let filled = match local {
        "creationdate" => {
            Property::CreationDate(DateTime::parse_from_rfc3339(s.text().await?.as_str())?)
        }
        "displayname" => Property::DisplayName(s.text().await?),
        "getcontentlanguage" => Property::GetContentLanguage(s.text().await?),
        "getcontentlength" => Property::GetContentLength(s.text().await?.trim().parse()?),
        "getcontenttype" => Property::GetContentType(s.text().await?),
        "getetag" => Property::GetEtag(s.text().await?),
        "getlastmodified" => {
            Property::GetLastModified(DateTime::parse_from_rfc2822(s.text().await?.as_str())?)
        }
        "lockdiscovery" => Property::LockDiscovery(active_locks(s).await?),
        "resourcetype" => Property::ResourceType(resource_types(s).await?),
        "supportedlock" => Property::SupportedLock(lock_entries(s).await?),
        other => {
            // an unknown DAV: property is somebody's dead property too
            let ident = PropIdent::new(DAV_URN, other);
            let value = s.flat_text().await?;
            Property::Dead(DeadProperty { name: ident, value })
        }
    };
    Ok(Value(filled))
}

// ---- multistatus internals ----

async fn response<R: IRead>(s: &mut Scanner<R>) -> Result<Response, ParsingError> {
    let mut hrefs = Vec::new();
    let mut status = None;
    let mut propstats = Vec::new();
    let mut error = None;
    let mut description = None;

    while let Some(child) = s.next_child().await? {
        match child.dav() {
            Some("href") => hrefs.push(Href(s.text().await?)),
            Some("status") => status = Some(status_text(&s.text().await?)?),
            Some("propstat") => propstats.push(prop_stat(s).await?),
            Some("error") => error = Some(Error(violations(s).await?)),
            Some("responsedescription") => {
                description = Some(ResponseDescription(s.text().await?))
            }
            _ => s.skip_child().await?,
        }
    }

    let status_or_propstat = match propstats.is_empty() {
        false => {
            let href = hrefs.into_iter().next().ok_or(ParsingError::MissingChild)?;
            StatusOrPropstat::PropStat(href, propstats)
        }
        true => {
            if hrefs.is_empty() {
                return Err(ParsingError::MissingChild);
            }
            StatusOrPropstat::Status(hrefs, status.ok_or(ParsingError::MissingChild)?)
        }
    };
    Ok(Response {
        status_or_propstat,
        error,
        responsedescription: description,
    })
}

async fn prop_stat<R: IRead>(s: &mut Scanner<R>) -> Result<PropStat, ParsingError> {
    let (mut prop, mut status, mut error, mut description) = (None, None, None, None);
    while let Some(child) = s.next_child().await? {
        match child.dav() {
            Some("prop") => {
                let mut props = Vec::new();
                while let Some(inner) = s.next_child().await? {
                    props.push(any_property(s, &inner).await?);
                }
                prop = Some(AnyProp(props));
            }
            Some("status") => status = Some(status_text(&s.text().await?)?),
            Some("error") => error = Some(Error(violations(s).await?)),
            Some("responsedescription") => {
                description = Some(ResponseDescription(s.text().await?))
            }
            _ => s.skip_child().await?,
        }
    }
    Ok(PropStat {
        prop: prop.ok_or(ParsingError::MissingChild)?,
        status: status.ok_or(ParsingError::MissingChild)?,
        error,
        responsedescription: description,
    })
}

fn status_text(line: &str) -> Result<Status, ParsingError> {
    let code = line
        .split_whitespace()
        .nth(1)
        .ok_or(ParsingError::InvalidValue)?;
    http::StatusCode::from_bytes(code.as_bytes())
        .map(Status)
        .map_err(|_| ParsingError::InvalidValue)
}

async fn violations<R: IRead>(s: &mut Scanner<R>) -> Result<Vec<Violation>, ParsingError> {
    let mut out = Vec::new();
    while let Some(child) = s.next_child().await? {
        match child.dav() {
            Some("lock-token-submitted") => {
                out.push(Violation::LockTokenSubmitted(href_list(s).await?))
            }
            Some("no-conflicting-lock") => {
                out.push(Violation::NoConflictingLock(href_list(s).await?))
            }
            Some("propfind-finite-depth") => {
                s.skip_child().await?;
                out.push(Violation::PropfindFiniteDepth);
            }
            Some("cannot-modify-protected-property") => {
                s.skip_child().await?;
                out.push(Violation::CannotModifyProtectedProperty);
            }
            _ => s.skip_child().await?,
        }
    }
    Ok(out)
}

async fn href_list<R: IRead>(s: &mut Scanner<R>) -> Result<Vec<Href>, ParsingError> {
    let mut hrefs = Vec::new();
    while let Some(child) = s.next_child().await? {
        match child.is_dav("href") {
            true => hrefs.push(Href(s.text().await?)),
            false => s.skip_child().await?,
        }
    }
    Ok(hrefs)
}

// ---- lock vocabulary ----

async fn lock_scope<R: IRead>(s: &mut Scanner<R>) -> Result<LockScope, ParsingError> {
    let mut found = None;
    while let Some(child) = s.next_child().await? {
        match child.dav() {
            Some("exclusive") => {
                s.skip_child().await?;
                found = Some(LockScope::Exclusive);
            }
            Some("shared") => {
                s.skip_child().await?;
                found = Some(LockScope::Shared);
            }
            _ => s.skip_child().await?,
        }
    }
    found.ok_or(ParsingError::MissingChild)
}

async fn lock_type<R: IRead>(s: &mut Scanner<R>) -> Result<LockType, ParsingError> {
    let mut found = None;
    while let Some(child) = s.next_child().await? {
        match child.is_dav("write") {
            true => {
                s.skip_child().await?;
                found = Some(LockType::Write);
            }
            false => s.skip_child().await?,
        }
    }
    found.ok_or(ParsingError::MissingChild)
}

/// Owner is client property soup: first non-blank text wins unless an
/// href shows up.
async fn lock_owner<R: IRead>(s: &mut Scanner<R>) -> Result<Owner, ParsingError> {
    let mut owner = Owner::Unknown;
    loop {
        match s.part().await? {
            Part::Text(chunk) if chunk.trim().is_empty() => continue,
            Part::Text(chunk) => {
                if matches!(owner, Owner::Unknown) {
                    owner = Owner::Txt(chunk);
                }
            }
            Part::Child(child) if child.is_dav("href") => {
                owner = Owner::Href(Href(s.text().await?))
            }
            Part::Child(_) => s.skip_child().await?,
            Part::Close => return Ok(owner),
        }
    }
}

fn depth_text(raw: &str) -> Result<Depth, ParsingError> {
    match raw.trim() {
        "0" => Ok(Depth::Zero),
        "1" => Ok(Depth::One),
        "infinity" => Ok(Depth::Infinity),
        _ => Err(ParsingError::InvalidValue),
    }
}

fn timeout_text(raw: &str) -> Result<Timeout, ParsingError> {
    let raw = raw.trim();
    if raw == "Infinite" {
        return Ok(Timeout::Infinite);
    }
    match raw.strip_prefix("Second-") {
        Some(seconds) => Ok(Timeout::Seconds(seconds.parse()?)),
        None => Err(ParsingError::InvalidValue),
    }
}

async fn sole_href<R: IRead>(s: &mut Scanner<R>) -> Result<Href, ParsingError> {
    let mut found = None;
    while let Some(child) = s.next_child().await? {
        match child.is_dav("href") {
            true => found = Some(Href(s.text().await?)),
            false => s.skip_child().await?,
        }
    }
    found.ok_or(ParsingError::MissingChild)
}

async fn active_locks<R: IRead>(s: &mut Scanner<R>) -> Result<Vec<ActiveLock>, ParsingError> {
    let mut locks = Vec::new();
    while let Some(child) = s.next_child().await? {
        match child.is_dav("activelock") {
            true => locks.push(active_lock(s).await?),
            false => s.skip_child().await?,
        }
    }
    Ok(locks)
}

async fn active_lock<R: IRead>(s: &mut Scanner<R>) -> Result<ActiveLock, ParsingError> {
    let mut scope = None;
    let mut kind = None;
    let mut depth = None;
    let mut owner = None;
    let mut timeout = None;
    let mut token = None;
    let mut root = None;

    while let Some(child) = s.next_child().await? {
        match child.dav() {
            Some("lockscope") => scope = Some(lock_scope(s).await?),
            Some("locktype") => kind = Some(lock_type(s).await?),
            Some("depth") => depth = Some(depth_text(&s.text().await?)?),
            Some("owner") => owner = Some(lock_owner(s).await?),
            Some("timeout") => timeout = Some(timeout_text(&s.text().await?)?),
            Some("locktoken") => token = Some(LockToken(sole_href(s).await?)),
            Some("lockroot") => root = Some(LockRoot(sole_href(s).await?)),
            _ => s.skip_child().await?,
        }
    }

    Ok(ActiveLock {
        lockscope: scope.ok_or(ParsingError::MissingChild)?,
        locktype: kind.ok_or(ParsingError::MissingChild)?,
        depth: depth.ok_or(ParsingError::MissingChild)?,
        owner,
        timeout,
        locktoken: token,
        lockroot: root.ok_or(ParsingError::MissingChild)?,
    })
}

async fn resource_types<R: IRead>(s: &mut Scanner<R>) -> Result<Vec<ResourceType>, ParsingError> {
    let mut kinds = Vec::new();
    while let Some(child) = s.next_child().await? {
        if child.is_dav("collection") {
            kinds.push(ResourceType::Collection);
        }
        s.skip_child().await?;
    }
    Ok(kinds)
}

async fn lock_entries<R: IRead>(s: &mut Scanner<R>) -> Result<Vec<LockEntry>, ParsingError> {
    let mut entries = Vec::new();
    while let Some(child) = s.next_child().await? {
        match child.is_dav("lockentry") {
            false => s.skip_child().await?,
            true => {
                let (mut scope, mut kind) = (None, None);
                while let Some(inner) = s.next_child().await? {
                    match inner.dav() {
                        Some("lockscope") => scope = Some(lock_scope(s).await?),
                        Some("locktype") => kind = Some(lock_type(s).await?),
                        _ => s.skip_child().await?,
                    }
                }
                entries.push(LockEntry {
                    lockscope: scope.ok_or(ParsingError::MissingChild)?,
                    locktype: kind.ok_or(ParsingError::MissingChild)?,
                });
            }
        }
    }
    Ok(entries)
}
