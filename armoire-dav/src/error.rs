#[derive(Debug, thiserror::Error)]
pub enum ParsingError {
    #[error("required child element is missing")]
    MissingChild,
    #[error("invalid value")]
    InvalidValue,
    #[error("utf8 error")]
    Utf8Error(#[from] std::str::Utf8Error),
    #[error("quick-xml error")]
    QuickXml(#[from] quick_xml::Error),
    #[error("date parsing error")]
    Chrono(#[from] chrono::format::ParseError),
    #[error("number parsing error")]
    Int(#[from] std::num::ParseIntError),
    #[error("found EOF while expecting data")]
    Eof,
}
