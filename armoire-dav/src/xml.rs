use futures::Future;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use tokio::io::{AsyncBufRead, AsyncWrite};

use super::error::ParsingError;

pub const DAV_URN: &str = "DAV:";

/// Sinks the emitter can write to.
pub trait IWrite: AsyncWrite + Unpin + Send {}
impl<T: AsyncWrite + Unpin + Send> IWrite for T {}

/// Sources the scanner can read from.
pub trait IRead: AsyncBufRead + Unpin {}
impl<T: AsyncBufRead + Unpin> IRead for T {}

/// A document the server reads off the wire.
pub trait ReadXml: Sized {
    fn read_xml<R: IRead>(s: &mut Scanner<R>) -> impl Future<Output = Result<Self, ParsingError>>;
}

/// A document the server writes to the wire.
pub trait WriteXml {
    fn write_xml<W: IWrite>(
        &self,
        x: &mut Emitter<W>,
    ) -> impl Future<Output = Result<(), quick_xml::Error>> + Send;
}

// ---------------

/// Resolved element name: namespace URI (when bound) plus local part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub ns: Option<String>,
    pub local: String,
}

impl Name {
    /// The local name, but only for elements in the `DAV:` namespace.
    pub fn dav(&self) -> Option<&str> {
        match self.ns.as_deref() {
            Some(DAV_URN) => Some(self.local.as_str()),
            _ => None,
        }
    }

    pub fn is_dav(&self, local: &str) -> bool {
        self.dav() == Some(local)
    }
}

/// One piece of an element's content.
#[derive(Debug)]
pub enum Part {
    Text(String),
    Child(Name),
    Close,
}

/// Forward-only pull parser over a namespace-aware XML stream.
///
/// There is no lookahead and no backtracking: callers enter an element,
/// consume its parts in order, and the element is closed for them when
/// [`Scanner::part`] yields [`Part::Close`]. A self-closing element is
/// entered "hollow": it closes on the very next read.
pub struct Scanner<R: IRead> {
    input: NsReader<R>,
    scratch: Vec<u8>,
    hollow: bool,
}

impl<R: IRead> Scanner<R> {
    pub fn new(input: NsReader<R>) -> Self {
        Self {
            input,
            scratch: Vec::new(),
            hollow: false,
        }
    }

    /// True right after entering a self-closing element: it has a name
    /// but no content of its own.
    pub fn is_hollow(&self) -> bool {
        self.hollow
    }

    /// Next piece of the currently open element. Entering a child
    /// happens implicitly by returning its name; the caller either
    /// consumes it or calls [`Scanner::skip_child`].
    pub async fn part(&mut self) -> Result<Part, ParsingError> {
        if self.hollow {
            self.hollow = false;
            return Ok(Part::Close);
        }
        loop {
            self.scratch.clear();
            match self.input.read_event_into_async(&mut self.scratch).await? {
                Event::Start(tag) => return Ok(Part::Child(resolved(&self.input, &tag))),
                Event::Empty(tag) => {
                    let name = resolved(&self.input, &tag);
                    self.hollow = true;
                    return Ok(Part::Child(name));
                }
                Event::End(_) => return Ok(Part::Close),
                Event::Text(data) => return Ok(Part::Text(data.unescape()?.into_owned())),
                Event::CData(data) => {
                    return Ok(Part::Text(std::str::from_utf8(data.as_ref())?.to_owned()))
                }
                Event::Eof => return Err(ParsingError::Eof),
                _ => continue,
            }
        }
    }

    /// Next child element, character data in between is let through.
    pub async fn next_child(&mut self) -> Result<Option<Name>, ParsingError> {
        loop {
            match self.part().await? {
                Part::Child(name) => return Ok(Some(name)),
                Part::Text(_) => continue,
                Part::Close => return Ok(None),
            }
        }
    }

    /// Character data of the entered element; nested markup is dropped.
    pub async fn text(&mut self) -> Result<String, ParsingError> {
        let mut content = String::new();
        loop {
            match self.part().await? {
                Part::Text(chunk) => content.push_str(&chunk),
                Part::Child(_) => self.skip_child().await?,
                Part::Close => return Ok(content),
            }
        }
    }

    /// Character data of the entered element and of every descendant,
    /// concatenated. Keeps opaque values opaque without keeping markup.
    pub async fn flat_text(&mut self) -> Result<String, ParsingError> {
        let mut content = String::new();
        let mut below = 0usize;
        loop {
            match self.part().await? {
                Part::Text(chunk) => content.push_str(&chunk),
                Part::Child(_) if self.hollow => self.hollow = false,
                Part::Child(_) => below += 1,
                Part::Close if below == 0 => return Ok(content),
                Part::Close => below -= 1,
            }
        }
    }

    /// Throw away the element just entered, content and all.
    pub async fn skip_child(&mut self) -> Result<(), ParsingError> {
        if self.hollow {
            self.hollow = false;
            return Ok(());
        }
        let mut below = 0usize;
        loop {
            self.scratch.clear();
            match self.input.read_event_into_async(&mut self.scratch).await? {
                Event::Start(_) => below += 1,
                Event::End(_) if below == 0 => return Ok(()),
                Event::End(_) => below -= 1,
                Event::Eof => return Err(ParsingError::Eof),
                _ => continue,
            }
        }
    }

    /// Scan the document prologue for the root element, which must be
    /// the given `DAV:` element. Anything else at the top level is
    /// noise and gets dropped.
    pub async fn open_root(&mut self, want: &str) -> Result<(), ParsingError> {
        loop {
            match self.part().await? {
                Part::Child(name) if name.is_dav(want) => return Ok(()),
                Part::Child(_) => self.skip_child().await?,
                Part::Text(_) => continue,
                Part::Close => return Err(ParsingError::Eof),
            }
        }
    }
}

fn resolved<R: IRead>(input: &NsReader<R>, tag: &BytesStart<'_>) -> Name {
    let (bound, local) = input.resolve_element(tag.name());
    Name {
        ns: match bound {
            ResolveResult::Bound(uri) => Some(String::from_utf8_lossy(uri.into_inner()).into_owned()),
            _ => None,
        },
        local: String::from_utf8_lossy(local.into_inner()).into_owned(),
    }
}

// ---------------

/// Streaming XML writer with the `DAV:` prefix baked in. The namespace
/// declaration lands on whichever element is written first; properties
/// from foreign namespaces bind theirs inline.
pub struct Emitter<W: IWrite> {
    out: quick_xml::Writer<W>,
    ns_pending: bool,
}

impl<W: IWrite> Emitter<W> {
    pub fn new(out: quick_xml::Writer<W>) -> Self {
        Self {
            out,
            ns_pending: true,
        }
    }

    pub async fn declaration(&mut self) -> Result<(), quick_xml::Error> {
        let decl = BytesDecl::new("1.0", Some("utf-8"), None);
        self.out.write_event_async(Event::Decl(decl)).await
    }

    fn dav_tag(&mut self, name: &str) -> BytesStart<'static> {
        let mut tag = BytesStart::new(format!("D:{}", name));
        if std::mem::take(&mut self.ns_pending) {
            tag.push_attribute(("xmlns:D", DAV_URN));
        }
        tag
    }

    /// `<D:name>`
    pub async fn open(&mut self, name: &str) -> Result<(), quick_xml::Error> {
        let tag = self.dav_tag(name);
        self.out.write_event_async(Event::Start(tag)).await
    }

    /// `</D:name>`
    pub async fn close(&mut self, name: &str) -> Result<(), quick_xml::Error> {
        self.out
            .write_event_async(Event::End(BytesEnd::new(format!("D:{}", name))))
            .await
    }

    pub async fn text(&mut self, content: &str) -> Result<(), quick_xml::Error> {
        self.out
            .write_event_async(Event::Text(BytesText::new(content)))
            .await
    }

    /// `<D:name>content</D:name>`
    pub async fn leaf(&mut self, name: &str, content: &str) -> Result<(), quick_xml::Error> {
        self.open(name).await?;
        self.text(content).await?;
        self.close(name).await
    }

    /// `<D:name/>`
    pub async fn flag(&mut self, name: &str) -> Result<(), quick_xml::Error> {
        let tag = self.dav_tag(name);
        self.out.write_event_async(Event::Empty(tag)).await
    }

    /// `<D:outer><D:inner/></D:outer>`
    pub async fn nested_flag(&mut self, outer: &str, inner: &str) -> Result<(), quick_xml::Error> {
        self.open(outer).await?;
        self.flag(inner).await?;
        self.close(outer).await
    }

    fn foreign_tag(ns: &str, local: &str) -> BytesStart<'static> {
        let mut tag = BytesStart::new(local.to_owned());
        if !ns.is_empty() {
            tag.push_attribute(("xmlns", ns));
        }
        tag
    }

    /// `<local xmlns="ns"/>`
    pub async fn foreign_flag(&mut self, ns: &str, local: &str) -> Result<(), quick_xml::Error> {
        let tag = Self::foreign_tag(ns, local);
        self.out.write_event_async(Event::Empty(tag)).await
    }

    /// `<local xmlns="ns">content</local>`
    pub async fn foreign_leaf(
        &mut self,
        ns: &str,
        local: &str,
        content: &str,
    ) -> Result<(), quick_xml::Error> {
        let tag = Self::foreign_tag(ns, local);
        self.out.write_event_async(Event::Start(tag)).await?;
        self.text(content).await?;
        self.out
            .write_event_async(Event::End(BytesEnd::new(local.to_owned())))
            .await
    }
}
