use chrono::{DateTime, FixedOffset, Utc};
use quick_xml::Error as QError;

use super::types::*;
use super::xml::{Emitter, IWrite, WriteXml};

fn scope_label(scope: LockScope) -> &'static str {
    match scope {
        LockScope::Exclusive => "exclusive",
        LockScope::Shared => "shared",
    }
}

fn depth_label(depth: Depth) -> &'static str {
    match depth {
        Depth::Zero => "0",
        Depth::One => "1",
        Depth::Infinity => "infinity",
    }
}

fn timeout_label(timeout: Timeout) -> String {
    match timeout {
        Timeout::Seconds(count) => format!("Second-{}", count),
        Timeout::Infinite => "Infinite".into(),
    }
}

/// `getlastmodified` is an rfc1123-date, like the Last-Modified header.
fn http_date(stamp: &DateTime<FixedOffset>) -> String {
    stamp
        .with_timezone(&Utc)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

// ---- requests (mostly exercised by round-trip tests) ----

impl WriteXml for PropFind {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("propfind").await?;
        match self {
            Self::PropName => x.flag("propname").await?,
            Self::AllProp => x.flag("allprop").await?,
            Self::Prop(names) => names.write_xml(x).await?,
        }
        x.close("propfind").await
    }
}

impl WriteXml for PropertyUpdate {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("propertyupdate").await?;
        for item in &self.0 {
            match item {
                PropertyUpdateItem::Set(Set(props)) => {
                    x.open("set").await?;
                    props.write_xml(x).await?;
                    x.close("set").await?;
                }
                PropertyUpdateItem::Remove(Remove(names)) => {
                    x.open("remove").await?;
                    names.write_xml(x).await?;
                    x.close("remove").await?;
                }
            }
        }
        x.close("propertyupdate").await
    }
}

impl WriteXml for LockInfo {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("lockinfo").await?;
        x.nested_flag("lockscope", scope_label(self.lockscope)).await?;
        x.nested_flag("locktype", "write").await?;
        if let Some(owner) = &self.owner {
            owner.write_xml(x).await?;
        }
        x.close("lockinfo").await
    }
}

// ---- responses ----

impl WriteXml for Multistatus {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("multistatus").await?;
        for response in &self.responses {
            response.write_xml(x).await?;
        }
        if let Some(ResponseDescription(text)) = &self.responsedescription {
            x.leaf("responsedescription", text).await?;
        }
        x.close("multistatus").await
    }
}

impl WriteXml for Response {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("response").await?;
        match &self.status_or_propstat {
            StatusOrPropstat::Status(hrefs, status) => {
                for Href(uri) in hrefs {
                    x.leaf("href", uri).await?;
                }
                status.write_xml(x).await?;
            }
            StatusOrPropstat::PropStat(Href(uri), propstats) => {
                x.leaf("href", uri).await?;
                for propstat in propstats {
                    propstat.write_xml(x).await?;
                }
            }
        }
        if let Some(error) = &self.error {
            error.write_xml(x).await?;
        }
        if let Some(ResponseDescription(text)) = &self.responsedescription {
            x.leaf("responsedescription", text).await?;
        }
        x.close("response").await
    }
}

impl WriteXml for PropStat {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("propstat").await?;
        self.prop.write_xml(x).await?;
        self.status.write_xml(x).await?;
        if let Some(error) = &self.error {
            error.write_xml(x).await?;
        }
        if let Some(ResponseDescription(text)) = &self.responsedescription {
            x.leaf("responsedescription", text).await?;
        }
        x.close("propstat").await
    }
}

impl WriteXml for Status {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        let line = format!(
            "HTTP/1.1 {} {}",
            self.0.as_str(),
            self.0.canonical_reason().unwrap_or("Unknown")
        );
        x.leaf("status", &line).await
    }
}

impl WriteXml for Href {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.leaf("href", &self.0).await
    }
}

impl WriteXml for Error {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("error").await?;
        for violation in &self.0 {
            violation.write_xml(x).await?;
        }
        x.close("error").await
    }
}

impl WriteXml for Violation {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        async fn href_block<W: IWrite>(
            x: &mut Emitter<W>,
            name: &str,
            hrefs: &[Href],
        ) -> Result<(), QError> {
            x.open(name).await?;
            for Href(uri) in hrefs {
                x.leaf("href", uri).await?;
            }
            x.close(name).await
        }

        match self {
            Self::LockTokenSubmitted(hrefs) => href_block(x, "lock-token-submitted", hrefs).await,
            Self::NoConflictingLock(hrefs) if hrefs.is_empty() => {
                x.flag("no-conflicting-lock").await
            }
            Self::NoConflictingLock(hrefs) => href_block(x, "no-conflicting-lock", hrefs).await,
            Self::PropfindFiniteDepth => x.flag("propfind-finite-depth").await,
            Self::CannotModifyProtectedProperty => {
                x.flag("cannot-modify-protected-property").await
            }
        }
    }
}

// ---- properties ----

impl WriteXml for PropName {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("prop").await?;
        for name in &self.0 {
            name.write_xml(x).await?;
        }
        x.close("prop").await
    }
}

impl WriteXml for PropValue {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("prop").await?;
        for value in &self.0 {
            value.write_xml(x).await?;
        }
        x.close("prop").await
    }
}

impl WriteXml for AnyProp {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("prop").await?;
        for prop in &self.0 {
            prop.write_xml(x).await?;
        }
        x.close("prop").await
    }
}

impl WriteXml for AnyProperty {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        match self {
            Self::Request(name) => name.write_xml(x).await,
            Self::Value(value) => value.write_xml(x).await,
        }
    }
}

impl WriteXml for PropertyRequest {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        if let Self::Dead(ident) = self {
            return x.foreign_flag(&ident.ns, &ident.local).await;
        }
        match self.dav_name() {
            Some(name) => x.flag(name).await,
            None => Ok(()),
        }
    }
}

impl WriteXml for Property {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        match self {
            Self::CreationDate(stamp) => x.leaf("creationdate", &stamp.to_rfc3339()).await,
            Self::DisplayName(name) => x.leaf("displayname", name).await,
            Self::GetContentLanguage(language) => x.leaf("getcontentlanguage", language).await,
            Self::GetContentLength(length) => {
                x.leaf("getcontentlength", &length.to_string()).await
            }
            Self::GetContentType(media) => x.leaf("getcontenttype", media).await,
            Self::GetEtag(tag) => x.leaf("getetag", tag).await,
            Self::GetLastModified(stamp) => x.leaf("getlastmodified", &http_date(stamp)).await,
            Self::LockDiscovery(locks) if locks.is_empty() => x.flag("lockdiscovery").await,
            Self::LockDiscovery(locks) => {
                x.open("lockdiscovery").await?;
                for lock in locks {
                    lock.write_xml(x).await?;
                }
                x.close("lockdiscovery").await
            }
            Self::ResourceType(kinds) if kinds.is_empty() => x.flag("resourcetype").await,
            Self::ResourceType(kinds) => {
                x.open("resourcetype").await?;
                for kind in kinds {
                    match kind {
                        ResourceType::Collection => x.flag("collection").await?,
                    }
                }
                x.close("resourcetype").await
            }
            Self::SupportedLock(entries) if entries.is_empty() => x.flag("supportedlock").await,
            Self::SupportedLock(entries) => {
                x.open("supportedlock").await?;
                for entry in entries {
                    x.open("lockentry").await?;
                    x.nested_flag("lockscope", scope_label(entry.lockscope)).await?;
                    x.nested_flag("locktype", "write").await?;
                    x.close("lockentry").await?;
                }
                x.close("supportedlock").await
            }
            Self::Dead(dead) if dead.value.is_empty() => {
                x.foreign_flag(&dead.name.ns, &dead.name.local).await
            }
            Self::Dead(dead) => {
                x.foreign_leaf(&dead.name.ns, &dead.name.local, &dead.value).await
            }
        }
    }
}

// ---- lock vocabulary ----

impl WriteXml for ActiveLock {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("activelock").await?;
        x.nested_flag("locktype", "write").await?;
        x.nested_flag("lockscope", scope_label(self.lockscope)).await?;
        x.leaf("depth", depth_label(self.depth)).await?;
        if let Some(owner) = &self.owner {
            owner.write_xml(x).await?;
        }
        if let Some(timeout) = self.timeout {
            x.leaf("timeout", &timeout_label(timeout)).await?;
        }
        if let Some(LockToken(Href(uri))) = &self.locktoken {
            x.open("locktoken").await?;
            x.leaf("href", uri).await?;
            x.close("locktoken").await?;
        }
        let LockRoot(Href(root)) = &self.lockroot;
        x.open("lockroot").await?;
        x.leaf("href", root).await?;
        x.close("lockroot").await?;
        x.close("activelock").await
    }
}

impl WriteXml for Owner {
    async fn write_xml<W: IWrite>(&self, x: &mut Emitter<W>) -> Result<(), QError> {
        x.open("owner").await?;
        match self {
            Self::Txt(text) => x.text(text).await?,
            Self::Href(Href(uri)) => x.leaf("href", uri).await?,
            Self::Unknown => (),
        }
        x.close("owner").await
    }
}

#[cfg(test)]
mod tests {
    use super::super::xml::{ReadXml, Scanner};
    use super::*;
    use chrono::TimeZone;
    use tokio::io::AsyncWriteExt;

    async fn render(elem: &impl WriteXml) -> String {
        let mut buffer = Vec::new();
        let mut sink = tokio::io::BufWriter::new(&mut buffer);
        {
            let out = quick_xml::writer::Writer::new_with_indent(&mut sink, b' ', 4);
            let mut x = Emitter::new(out);
            elem.write_xml(&mut x).await.expect("xml serialization");
        }
        sink.flush().await.expect("flush");
        String::from_utf8(buffer).unwrap()
    }

    async fn reparse<T: ReadXml>(src: &str) -> T {
        let mut scanner = Scanner::new(quick_xml::reader::NsReader::from_reader(src.as_bytes()));
        T::read_xml(&mut scanner).await.unwrap()
    }

    #[tokio::test]
    async fn basic_href() {
        let orig = Href("/bucket/dir/".into());

        let got = render(&orig).await;
        let expected = r#"<D:href xmlns:D="DAV:">/bucket/dir/</D:href>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(reparse::<Href>(got.as_str()).await, orig)
    }

    #[tokio::test]
    async fn basic_multistatus() {
        let orig = Multistatus {
            responses: vec![],
            responsedescription: Some(ResponseDescription("Hello world".into())),
        };
        let got = render(&orig).await;

        let expected = r#"<D:multistatus xmlns:D="DAV:">
    <D:responsedescription>Hello world</D:responsedescription>
</D:multistatus>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(reparse::<Multistatus>(got.as_str()).await, orig)
    }

    #[tokio::test]
    async fn dead_property_roundtrip() {
        let orig = AnyProp(vec![
            AnyProperty::Value(Property::Dead(DeadProperty {
                name: PropIdent::new("http://example.com/ns", "color"),
                value: "red".into(),
            })),
            AnyProperty::Request(PropertyRequest::Dead(PropIdent::new(
                "http://example.com/ns",
                "flavor",
            ))),
        ]);
        let got = render(&orig).await;

        let expected = r#"<D:prop xmlns:D="DAV:">
    <color xmlns="http://example.com/ns">red</color>
    <flavor xmlns="http://example.com/ns"/>
</D:prop>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(reparse::<AnyProp>(got.as_str()).await, orig)
    }

    #[tokio::test]
    async fn getlastmodified_renders_rfc1123() {
        let date = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(1998, 1, 12, 9, 25, 56)
            .unwrap();
        let got = render(&Property::GetLastModified(date)).await;

        assert_eq!(
            &got,
            r#"<D:getlastmodified xmlns:D="DAV:">Mon, 12 Jan 1998 09:25:56 GMT</D:getlastmodified>"#
        );
    }

    #[tokio::test]
    async fn rfc_activelock() {
        let orig = ActiveLock {
            lockscope: LockScope::Exclusive,
            locktype: LockType::Write,
            depth: Depth::Infinity,
            owner: Some(Owner::Href(Href(
                "http://example.org/~ejw/contact.html".into(),
            ))),
            timeout: Some(Timeout::Seconds(604800)),
            locktoken: Some(LockToken(Href(
                "opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4".into(),
            ))),
            lockroot: LockRoot(Href("/workspace/webdav/proposal.doc".into())),
        };

        let got = render(&orig).await;
        let expected = r#"<D:activelock xmlns:D="DAV:">
    <D:locktype>
        <D:write/>
    </D:locktype>
    <D:lockscope>
        <D:exclusive/>
    </D:lockscope>
    <D:depth>infinity</D:depth>
    <D:owner>
        <D:href>http://example.org/~ejw/contact.html</D:href>
    </D:owner>
    <D:timeout>Second-604800</D:timeout>
    <D:locktoken>
        <D:href>opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4</D:href>
    </D:locktoken>
    <D:lockroot>
        <D:href>/workspace/webdav/proposal.doc</D:href>
    </D:lockroot>
</D:activelock>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(reparse::<ActiveLock>(got.as_str()).await, orig)
    }

    #[tokio::test]
    async fn rfc_error_delete_locked() {
        let orig = Error(vec![Violation::LockTokenSubmitted(vec![Href(
            "/locked/".into(),
        )])]);
        let got = render(&orig).await;

        let expected = r#"<D:error xmlns:D="DAV:">
    <D:lock-token-submitted>
        <D:href>/locked/</D:href>
    </D:lock-token-submitted>
</D:error>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(reparse::<Error>(got.as_str()).await, orig)
    }

    #[tokio::test]
    async fn propstat_roundtrip_keeps_identities() {
        let orig = Multistatus {
            responses: vec![Response {
                status_or_propstat: StatusOrPropstat::PropStat(
                    Href("/a/b".into()),
                    vec![PropStat {
                        prop: AnyProp(vec![
                            AnyProperty::Value(Property::DisplayName("b".into())),
                            AnyProperty::Value(Property::GetContentLength(10)),
                            AnyProperty::Value(Property::ResourceType(vec![])),
                            AnyProperty::Value(Property::Dead(DeadProperty {
                                name: PropIdent::new("urn:example:props", "owner"),
                                value: "alice".into(),
                            })),
                        ]),
                        status: Status(http::status::StatusCode::OK),
                        error: None,
                        responsedescription: None,
                    }],
                ),
                error: None,
                responsedescription: None,
            }],
            responsedescription: None,
        };

        let got = render(&orig).await;
        let reparsed = reparse::<Multistatus>(got.as_str()).await;

        // An empty resourcetype value reads back as a name-only entry;
        // everything else must survive byte-for-byte.
        let prop = match &reparsed.responses[0].status_or_propstat {
            StatusOrPropstat::PropStat(href, propstats) => {
                assert_eq!(href, &Href("/a/b".into()));
                &propstats[0].prop
            }
            other => panic!("expected propstat, got {:?}", other),
        };
        assert_eq!(
            prop.0[0],
            AnyProperty::Value(Property::DisplayName("b".into()))
        );
        assert_eq!(
            prop.0[1],
            AnyProperty::Value(Property::GetContentLength(10))
        );
        assert_eq!(
            prop.0[2],
            AnyProperty::Request(PropertyRequest::ResourceType)
        );
        assert_eq!(
            prop.0[3],
            AnyProperty::Value(Property::Dead(DeadProperty {
                name: PropIdent::new("urn:example:props", "owner"),
                value: "alice".into(),
            }))
        );
    }
}
