use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

/// Wall-clock stamp of a resource, with the two renderings WebDAV needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DavTime(DateTime<Utc>);

impl DavTime {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_unix(secs: i64) -> Self {
        Self(DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    pub fn unix(&self) -> i64 {
        self.0.timestamp()
    }

    /// RFC 3339 / W3C form, used by `creationdate`.
    pub fn iso_8601(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// HTTP-date (RFC 1123), used by `getlastmodified`, `Last-Modified`
    /// and `Date`.
    pub fn rfc1123(&self) -> String {
        self.0.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    pub fn fixed(&self) -> DateTime<FixedOffset> {
        self.0.fixed_offset()
    }
}

/// Weak entity tag derived from size and mtime. The literal form
/// `W/"<md5 hex of str(size) ++ str(mtime)>"` is observable by clients
/// and must stay stable across releases.
pub fn weak_etag(size: u64, modified: &DavTime) -> String {
    let digest = md5::compute(format!("{}{}", size, modified.unix()));
    format!("W/\"{:x}\"", digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_literal_is_stable() {
        let mtime = DavTime::from_unix(1700000000);
        assert_eq!(
            weak_etag(10, &mtime),
            "W/\"4df935c3af69471f993528ad791ff93b\""
        );
        // deterministic across re-reads
        assert_eq!(weak_etag(10, &mtime), weak_etag(10, &mtime));
        assert_ne!(weak_etag(11, &mtime), weak_etag(10, &mtime));
    }

    #[test]
    fn renders_both_date_forms() {
        let stamp = DavTime::from_unix(1700000000);
        assert_eq!(stamp.iso_8601(), "2023-11-14T22:13:20Z");
        assert_eq!(stamp.rfc1123(), "Tue, 14 Nov 2023 22:13:20 GMT");
    }
}
