//! `x-bdsk://` link parsing

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

pub const BIBDESK_SCHEME: &str = "x-bdsk";

lazy_static! {
    static ref URI_PATTERN: Regex =
        Regex::new(r"\s*([^:]+)://([^?]*)(\?(.*))?").expect("valid URI pattern");
}

#[derive(Debug, thiserror::Error)]
pub enum UriError {
    #[error("not a valid URI: {0}")]
    Malformed(String),
    #[error("invalid percent-encoding in {0}")]
    Encoding(String),
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
    #[error("document number is not a non-negative integer: {0}")]
    InvalidDocument(String),
    #[error("not an absolute file path: {0}")]
    RelativePath(String),
}

/// Query parameters; a key given without `=` maps to `None`
pub type Queries = HashMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
    pub scheme: String,
    pub address: String,
    pub queries: Queries,
}

/// Split `text` into scheme, percent-decoded address and query parameters
pub fn parse_uri(text: &str) -> Result<ParsedUri, UriError> {
    let captures = URI_PATTERN
        .captures(text)
        .ok_or_else(|| UriError::Malformed(text.to_string()))?;

    let scheme = captures[1].to_string();
    let address = decode(&captures[2])?;

    let mut queries = Queries::new();
    if let Some(query) = captures.get(4).filter(|query| !query.as_str().is_empty()) {
        for field in query.as_str().split('&') {
            match field.split_once('=') {
                Some((key, value)) if !value.is_empty() => {
                    queries.insert(key.to_string(), Some(decode(value)?));
                }
                Some((key, _)) => {
                    queries.insert(key.to_string(), None);
                }
                None => {
                    queries.insert(field.to_string(), None);
                }
            }
        }
    }

    Ok(ParsedUri {
        scheme,
        address,
        queries,
    })
}

fn decode(text: &str) -> Result<String, UriError> {
    urlencoding::decode(text)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| UriError::Encoding(text.to_string()))
}

/// A link to one attachment of a BibDesk entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibDeskLink {
    pub citekey: String,
    /// 1-based attachment index
    pub doc: u32,
}

impl BibDeskLink {
    pub fn new(citekey: impl Into<String>, doc: u32) -> Self {
        Self {
            citekey: citekey.into(),
            doc,
        }
    }

    pub fn from_uri(text: &str) -> Result<Self, UriError> {
        Self::try_from(parse_uri(text)?)
    }
}

impl TryFrom<ParsedUri> for BibDeskLink {
    type Error = UriError;

    fn try_from(uri: ParsedUri) -> Result<Self, Self::Error> {
        if uri.scheme != BIBDESK_SCHEME {
            return Err(UriError::UnsupportedScheme(uri.scheme));
        }
        let doc = match uri.queries.get("doc") {
            Some(Some(doc)) => doc
                .trim()
                .parse::<u32>()
                .map_err(|_| UriError::InvalidDocument(doc.clone()))?,
            _ => 1,
        };
        Ok(Self::new(uri.address, doc))
    }
}

impl fmt::Display for BibDeskLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{BIBDESK_SCHEME}://{}?doc={}",
            urlencoding::encode(&self.citekey),
            self.doc
        )
    }
}
