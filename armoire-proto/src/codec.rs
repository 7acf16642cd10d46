use std::io::{Error, ErrorKind};

use futures::sink::SinkExt;
use futures::stream::StreamExt;
use http::{Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use http_body_util::Full;
use http_body_util::StreamBody;
use hyper::body::{Bytes, Frame};
use tokio::io::AsyncWriteExt;
use tokio_util::io::{CopyToBytes, SinkWriter};
use tokio_util::sync::PollSender;

use armoire_dav::error::ParsingError;
use armoire_dav::xml as dxml;

use crate::error::DavError;
use crate::time::DavTime;

/// Request bodies as the pipeline consumes them and response bodies as it
/// produces them: boxed, byte-chunked, io-flavored errors.
pub type BodyIn = BoxBody<Bytes, std::io::Error>;
pub type HttpResponse = Response<BoxBody<Bytes, std::io::Error>>;

pub fn text_body(txt: &'static str) -> BoxBody<Bytes, std::io::Error> {
    BoxBody::new(Full::new(Bytes::from(txt)).map_err(|e| match e {}))
}

pub fn bytes_body(bytes: Bytes) -> BoxBody<Bytes, std::io::Error> {
    BoxBody::new(Full::new(bytes).map_err(|e| match e {}))
}

/// Receive the whole request body. XML bodies are parsed from the full
/// buffer; only PUT streams.
pub async fn read_body(body: BodyIn) -> Result<Bytes, DavError> {
    body.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|_| DavError::BadRequest)
}

/// Parse a buffered XML request body. An all-whitespace body surfaces as
/// `ParsingError::Eof`, which callers map to their method's empty-body
/// meaning.
pub async fn deserialize<T: dxml::ReadXml>(raw: &[u8]) -> Result<T, ParsingError> {
    let mut scanner = dxml::Scanner::new(quick_xml::reader::NsReader::from_reader(raw));
    T::read_xml(&mut scanner).await
}

/// Stream a 207-style XML body: the serializer runs in its own task and
/// hands chunks over a channel, so huge multistatus bodies never
/// materialize in memory.
pub fn serialize<T: dxml::WriteXml + Send + Sync + 'static>(
    status: StatusCode,
    elem: T,
    pretty: bool,
) -> Result<HttpResponse, DavError> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(1);

    // Build the writer
    tokio::task::spawn(async move {
        let sink = PollSender::new(tx).sink_map_err(|_| Error::from(ErrorKind::BrokenPipe));
        let mut writer = SinkWriter::new(CopyToBytes::new(sink));
        {
            let out = match pretty {
                true => quick_xml::writer::Writer::new_with_indent(&mut writer, b' ', 4),
                false => quick_xml::writer::Writer::new(&mut writer),
            };
            let mut emitter = dxml::Emitter::new(out);
            if let Err(e) = emitter.declaration().await {
                tracing::error!(err=?e, "unable to write XML declaration");
            }
            match elem.write_xml(&mut emitter).await {
                Ok(_) => tracing::debug!("fully serialized object"),
                Err(e) => tracing::error!(err=?e, "failed to serialize object"),
            }
        }
        let _ = writer.flush().await;
    });

    // Build the reader
    let recv = tokio_stream::wrappers::ReceiverStream::new(rx);
    let stream = StreamBody::new(recv.map(|v| Ok(Frame::data(v))));
    let boxed_body = BoxBody::new(stream);

    let response = Response::builder()
        .status(status)
        .header("Date", DavTime::now().rfc1123())
        .header("Content-Type", "application/xml; charset=\"utf-8\"")
        .body(boxed_body)?;

    Ok(response)
}
