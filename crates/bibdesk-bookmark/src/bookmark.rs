//! BibDesk file reference decoding
//!
//! BibDesk stores file references in `bdsk-file-N` fields as base64-encoded
//! binary plists. The plist is a dictionary whose `bookmark` key holds a
//! macOS bookmark (opaque bytes that only the OS can resolve) and whose
//! `relativePath` key holds the path relative to the .bib file.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use bibdesk_bibtex::{bdsk_file_field, BibEntry};
use plist::Value;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("entry {citekey} has no field {field}")]
    MissingField { citekey: String, field: String },
    #[error("invalid base64 in bdsk-file field: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("not a valid plist in bdsk-file field: {0}")]
    Plist(#[from] plist::Error),
    #[error("plist in bdsk-file field is not a valid bookmark: {0}")]
    NotABookmark(&'static str),
}

/// The validated content of a `bdsk-file-N` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub bookmark: Vec<u8>,
    pub relative_path: Option<String>,
}

impl Bookmark {
    /// Decode the base64 value of a `bdsk-file-N` field
    pub fn decode(value: &str) -> Result<Self, DecodeError> {
        // BibDesk may wrap long values
        let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let data = STANDARD.decode(compact)?;
        let plist = Value::from_reader(Cursor::new(data))?;
        Self::try_from(plist)
    }

    /// Base64 form of the bookmark bytes, as handed to the resolver backends
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bookmark)
    }
}

impl TryFrom<Value> for Bookmark {
    type Error = DecodeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Dictionary(mut dict) = value else {
            return Err(DecodeError::NotABookmark("expected a dictionary"));
        };
        let bookmark = match dict.remove("bookmark") {
            Some(Value::Data(bytes)) => bytes,
            Some(_) => return Err(DecodeError::NotABookmark("'bookmark' is not binary data")),
            None => return Err(DecodeError::NotABookmark("missing 'bookmark' key")),
        };
        let relative_path = match dict.remove("relativePath") {
            Some(Value::String(path)) => Some(path),
            _ => None,
        };
        Ok(Self {
            bookmark,
            relative_path,
        })
    }
}

/// Decode the attachment with the given 1-based index of `entry`
pub fn decode_attachment(entry: &BibEntry, index: u32) -> Result<Bookmark, DecodeError> {
    let field = bdsk_file_field(index);
    let value = entry
        .field(&field)
        .ok_or_else(|| DecodeError::MissingField {
            citekey: entry.citekey.clone(),
            field,
        })?;
    Bookmark::decode(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plist::Dictionary;

    fn encode(dict: Dictionary) -> String {
        let mut buffer = Vec::new();
        plist::to_writer_binary(&mut buffer, &Value::Dictionary(dict)).unwrap();
        STANDARD.encode(&buffer)
    }

    fn bookmark_dict(bytes: &[u8]) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("bookmark".to_string(), Value::Data(bytes.to_vec()));
        dict.insert(
            "relativePath".to_string(),
            Value::String("Papers/A.pdf".to_string()),
        );
        dict
    }

    #[test]
    fn test_decode_valid_bookmark() {
        let bookmark = Bookmark::decode(&encode(bookmark_dict(b"opaque\x00bytes"))).unwrap();
        assert_eq!(bookmark.bookmark, b"opaque\x00bytes");
        assert_eq!(bookmark.relative_path.as_deref(), Some("Papers/A.pdf"));
        assert_eq!(bookmark.to_base64(), STANDARD.encode(b"opaque\x00bytes"));
    }

    #[test]
    fn test_decode_ignores_wrapped_whitespace() {
        let encoded = encode(bookmark_dict(b"abc"));
        let (head, tail) = encoded.split_at(10);
        let wrapped = format!("{head}\n\t {tail}");
        assert!(Bookmark::decode(&wrapped).is_ok());
    }

    #[test]
    fn test_decode_invalid_base64() {
        assert!(matches!(
            Bookmark::decode("not valid base64!!!"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn test_decode_invalid_plist() {
        let invalid = STANDARD.encode(b"not a plist");
        assert!(matches!(
            Bookmark::decode(&invalid),
            Err(DecodeError::Plist(_))
        ));
    }

    #[test]
    fn test_plist_without_bookmark_key_is_rejected() {
        let mut dict = Dictionary::new();
        dict.insert(
            "relativePath".to_string(),
            Value::String("Papers/A.pdf".to_string()),
        );
        assert!(matches!(
            Bookmark::decode(&encode(dict)),
            Err(DecodeError::NotABookmark(_))
        ));
    }

    #[test]
    fn test_bookmark_of_wrong_type_is_rejected() {
        let mut dict = Dictionary::new();
        dict.insert("bookmark".to_string(), Value::String("text".to_string()));
        assert!(matches!(
            Bookmark::decode(&encode(dict)),
            Err(DecodeError::NotABookmark(_))
        ));
    }

    #[test]
    fn test_non_dictionary_plist_is_rejected() {
        let mut buffer = Vec::new();
        plist::to_writer_binary(&mut buffer, &Value::Array(vec![])).unwrap();
        assert!(matches!(
            Bookmark::decode(&STANDARD.encode(&buffer)),
            Err(DecodeError::NotABookmark(_))
        ));
    }

    #[test]
    fn test_decode_attachment_missing_field() {
        let entry = BibEntry::new("Key", "article");
        match decode_attachment(&entry, 2) {
            Err(DecodeError::MissingField { field, .. }) => assert_eq!(field, "bdsk-file-2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_attachment_by_index() {
        let entry = BibEntry::new("Key", "article")
            .with_field("bdsk-file-1", encode(bookmark_dict(b"first")));
        assert_eq!(decode_attachment(&entry, 1).unwrap().bookmark, b"first");
    }
}
