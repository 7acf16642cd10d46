use chrono::{DateTime, FixedOffset};

/// Identity of a property: namespace URI (possibly empty) plus local name.
///
/// The ten live properties of RFC 4918 are modeled as dedicated enum
/// variants; everything else a client sends travels as a `PropIdent`.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct PropIdent {
    pub ns: String,
    pub local: String,
}

impl PropIdent {
    pub fn new(ns: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            ns: ns.into(),
            local: local.into(),
        }
    }
}

/// A client-defined property persisted verbatim: identity plus an opaque
/// value. Nested markup inside the value is flattened to its character
/// data; the property's own namespace binding is preserved.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DeadProperty {
    pub name: PropIdent,
    pub value: String,
}

/// 14.1. activelock XML Element
///
/// `<!ELEMENT activelock (lockscope, locktype, depth, owner?, timeout?,
/// locktoken?, lockroot)>`
#[derive(Debug, PartialEq, Clone)]
pub struct ActiveLock {
    pub lockscope: LockScope,
    pub locktype: LockType,
    pub depth: Depth,
    pub owner: Option<Owner>,
    pub timeout: Option<Timeout>,
    pub locktoken: Option<LockToken>,
    pub lockroot: LockRoot,
}

/// 14.4. depth XML Element
///
/// Value: "0" | "1" | "infinity"
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

/// 14.5. error XML Element
///
/// Each child of 'error' is a precondition or postcondition code.
///
/// `<!ELEMENT error ANY>`
#[derive(Debug, PartialEq, Clone)]
pub struct Error(pub Vec<Violation>);

#[derive(Debug, PartialEq, Clone)]
pub enum Violation {
    /// Use with 423 Locked: the request could not succeed because a lock
    /// token should have been submitted; contains at least one URL of a
    /// locked resource that prevented the request.
    ///
    /// `<!ELEMENT lock-token-submitted (href+)>`
    LockTokenSubmitted(Vec<Href>),

    /// Use with 423 Locked: a LOCK request failed due to an already
    /// existing conflicting lock, possibly rooted at another resource.
    ///
    /// `<!ELEMENT no-conflicting-lock (href)*>`
    NoConflictingLock(Vec<Href>),

    /// Use with 403 Forbidden: this server does not allow infinite-depth
    /// PROPFIND requests on this collection.
    PropfindFiniteDepth,

    /// Use with 403 Forbidden: the client attempted to set a protected
    /// property in a PROPPATCH (such as DAV:getetag).
    CannotModifyProtectedProperty,
}

/// 14.7. href XML Element
///
/// `<!ELEMENT href (#PCDATA)>`
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Href(pub String);

/// 14.10. lockentry XML Element
///
/// `<!ELEMENT lockentry (lockscope, locktype)>`
#[derive(Debug, PartialEq, Clone)]
pub struct LockEntry {
    pub lockscope: LockScope,
    pub locktype: LockType,
}

/// 14.11. lockinfo XML Element
///
/// Used with a LOCK method to specify the type of lock the client wishes
/// to have created.
///
/// `<!ELEMENT lockinfo (lockscope, locktype, owner?)>`
#[derive(Debug, PartialEq, Clone)]
pub struct LockInfo {
    pub lockscope: LockScope,
    pub locktype: LockType,
    pub owner: Option<Owner>,
}

/// 14.12. lockroot XML Element
///
/// The URL through which the resource was addressed in the LOCK request.
///
/// `<!ELEMENT lockroot (href)>`
#[derive(Debug, PartialEq, Clone)]
pub struct LockRoot(pub Href);

/// 14.13. lockscope XML Element
///
/// `<!ELEMENT lockscope (exclusive | shared)>`
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// 14.14. locktoken XML Element
///
/// The href contains a single lock token URI.
///
/// `<!ELEMENT locktoken (href)>`
#[derive(Debug, PartialEq, Clone)]
pub struct LockToken(pub Href);

/// 14.15. locktype XML Element
///
/// This specification only defines one lock type, the write lock.
///
/// `<!ELEMENT locktype (write)>`
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum LockType {
    Write,
}

/// 14.16. multistatus XML Element
///
/// `<!ELEMENT multistatus (response*, responsedescription?)>`
#[derive(Debug, PartialEq, Clone)]
pub struct Multistatus {
    pub responses: Vec<Response>,
    pub responsedescription: Option<ResponseDescription>,
}

/// 14.17. owner XML Element
///
/// Holds client-supplied information about the creator of a lock. The
/// value is treated as a dead property: the server never alters it.
///
/// `<!ELEMENT owner ANY>`
#[derive(Debug, PartialEq, Clone)]
pub enum Owner {
    Txt(String),
    Href(Href),
    Unknown,
}

/// 14.18. prop XML Element, name-only flavor: lists properties without
/// values, as in propname responses, `<remove>` and PROPFIND `<prop>`.
#[derive(Debug, PartialEq, Clone)]
pub struct PropName(pub Vec<PropertyRequest>);

/// 14.18. prop XML Element, value-bearing flavor (LOCK responses).
#[derive(Debug, PartialEq, Clone)]
pub struct PropValue(pub Vec<Property>);

/// 14.18. prop XML Element holding any mix of names and values, as found
/// in multistatus bodies and `<set>`.
#[derive(Debug, PartialEq, Clone)]
pub struct AnyProp(pub Vec<AnyProperty>);

/// 14.19. propertyupdate XML Element
///
/// `<!ELEMENT propertyupdate (remove | set)+>`
///
/// Document order is preserved: it is the execution order.
#[derive(Debug, PartialEq, Clone)]
pub struct PropertyUpdate(pub Vec<PropertyUpdateItem>);

#[derive(Debug, PartialEq, Clone)]
pub enum PropertyUpdateItem {
    Remove(Remove),
    Set(Set),
}

/// 14.20. propfind XML Element
///
/// `<!ELEMENT propfind (propname | allprop | prop)>`
#[derive(Debug, PartialEq, Clone)]
pub enum PropFind {
    PropName,
    AllProp,
    Prop(PropName),
}

/// 14.22. propstat XML Element
///
/// Groups a prop and the status that applies to every property named in
/// it.
///
/// `<!ELEMENT propstat (prop, status, error?, responsedescription?)>`
#[derive(Debug, PartialEq, Clone)]
pub struct PropStat {
    pub prop: AnyProp,
    pub status: Status,
    pub error: Option<Error>,
    pub responsedescription: Option<ResponseDescription>,
}

/// 14.23. remove XML Element
///
/// Removing a property that does not exist is reported by the property
/// engine, not here.
///
/// `<!ELEMENT remove (prop)>`
#[derive(Debug, PartialEq, Clone)]
pub struct Remove(pub PropName);

/// 14.24. response XML Element
///
/// `<!ELEMENT response ((href+, status)|(href, propstat+),
/// responsedescription?)>`
#[derive(Debug, PartialEq, Clone)]
pub enum StatusOrPropstat {
    // One status, multiple hrefs...
    Status(Vec<Href>, Status),
    // A single href, multiple propstats...
    PropStat(Href, Vec<PropStat>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Response {
    pub status_or_propstat: StatusOrPropstat,
    pub error: Option<Error>,
    pub responsedescription: Option<ResponseDescription>,
}

/// 14.25. responsedescription XML Element
///
/// `<!ELEMENT responsedescription (#PCDATA)>`
#[derive(Debug, PartialEq, Clone)]
pub struct ResponseDescription(pub String);

/// 14.26. set XML Element
///
/// `<!ELEMENT set (prop)>`
///
/// Carries `AnyProp` rather than values only: a self-closed element in a
/// `<set>` is a property set to the empty value, and a protected live
/// property showing up here must survive parsing so it can be refused.
#[derive(Debug, PartialEq, Clone)]
pub struct Set(pub AnyProp);

/// 14.28. status XML Element
///
/// Holds a single HTTP status-line.
///
/// `<!ELEMENT status (#PCDATA)>`
#[derive(Debug, PartialEq, Clone)]
pub struct Status(pub http::status::StatusCode);

/// 14.29. timeout XML Element
///
/// `TimeType = ("Second-" DAVTimeOutVal | "Infinite")`
///
/// The timeout value for TimeType "Second" MUST NOT be greater than
/// 2^32-1.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Timeout {
    Seconds(u32),
    Infinite,
}

/// 15. DAV Properties
///
/// A property as it appears in a request or a name-only listing: just an
/// identity, no value.
#[derive(Debug, PartialEq, Clone)]
pub enum PropertyRequest {
    CreationDate,
    DisplayName,
    GetContentLanguage,
    GetContentLength,
    GetContentType,
    GetEtag,
    GetLastModified,
    LockDiscovery,
    ResourceType,
    SupportedLock,
    Dead(PropIdent),
}

/// 15. DAV Properties
///
/// A property with its value. The ten RFC 4918 live properties carry
/// typed values; dead properties carry their opaque payload.
#[derive(Debug, PartialEq, Clone)]
pub enum Property {
    /// 15.1. creationdate: RFC 3339 date-time.
    CreationDate(DateTime<FixedOffset>),

    /// 15.2. displayname: any text, suitable for presentation to a user.
    DisplayName(String),

    /// 15.3. getcontentlanguage: the Content-Language header value.
    GetContentLanguage(String),

    /// 15.4. getcontentlength: the Content-Length a GET would return.
    /// Computed, therefore protected.
    GetContentLength(u64),

    /// 15.5. getcontenttype: the Content-Type a GET would return.
    GetContentType(String),

    /// 15.6. getetag: created and controlled by the server, protected.
    GetEtag(String),

    /// 15.7. getlastmodified: rfc1123-date, as in the Last-Modified
    /// header.
    GetLastModified(DateTime<FixedOffset>),

    /// 15.8. lockdiscovery: one activelock per lock whose cover includes
    /// this resource. Protected; clients change it through LOCK/UNLOCK.
    LockDiscovery(Vec<ActiveLock>),

    /// 15.9. resourcetype: `<collection/>` for collections, empty
    /// otherwise.
    ResourceType(Vec<ResourceType>),

    /// 15.10. supportedlock: the scope/type combinations a lock request
    /// may use on this resource.
    SupportedLock(Vec<LockEntry>),

    /// Anything else: a dead property.
    Dead(DeadProperty),
}

impl PropertyRequest {
    /// Element name of the ten live properties; dead ones carry their
    /// own identity instead.
    pub fn dav_name(&self) -> Option<&'static str> {
        Some(match self {
            Self::CreationDate => "creationdate",
            Self::DisplayName => "displayname",
            Self::GetContentLanguage => "getcontentlanguage",
            Self::GetContentLength => "getcontentlength",
            Self::GetContentType => "getcontenttype",
            Self::GetEtag => "getetag",
            Self::GetLastModified => "getlastmodified",
            Self::LockDiscovery => "lockdiscovery",
            Self::ResourceType => "resourcetype",
            Self::SupportedLock => "supportedlock",
            Self::Dead(_) => return None,
        })
    }
}

impl Property {
    /// Element name of the ten live properties; dead ones carry their
    /// own identity instead.
    pub fn dav_name(&self) -> Option<&'static str> {
        Some(match self {
            Self::CreationDate(_) => "creationdate",
            Self::DisplayName(_) => "displayname",
            Self::GetContentLanguage(_) => "getcontentlanguage",
            Self::GetContentLength(_) => "getcontentlength",
            Self::GetContentType(_) => "getcontenttype",
            Self::GetEtag(_) => "getetag",
            Self::GetLastModified(_) => "getlastmodified",
            Self::LockDiscovery(_) => "lockdiscovery",
            Self::ResourceType(_) => "resourcetype",
            Self::SupportedLock(_) => "supportedlock",
            Self::Dead(_) => return None,
        })
    }
}

/// Either flavor, as multistatus bodies mix them.
#[derive(Debug, PartialEq, Clone)]
pub enum AnyProperty {
    Request(PropertyRequest),
    Value(Property),
}

/// 14.3. collection XML Element, the only resource type defined by RFC
/// 4918.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ResourceType {
    Collection,
}
