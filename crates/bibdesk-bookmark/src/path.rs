//! Resolved attachment paths

use std::path::Path;

use serde::Serialize;
use url::Url;

use crate::uri::UriError;

/// A POSIX path split into its directory, file name and extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedPath {
    pub dir: String,
    /// File name including the extension
    pub base: String,
    /// File name without the extension
    pub filename: String,
    /// Extension including the leading dot, or empty
    pub ext: String,
    pub path: String,
}

impl ParsedPath {
    pub fn has_extension(&self, ext: &str) -> bool {
        self.ext.eq_ignore_ascii_case(ext)
    }

    pub fn file_url(&self) -> Result<String, UriError> {
        posix_to_file_url(&self.path)
    }
}

pub fn parse_file_path(path: &str) -> ParsedPath {
    let (dir, base) = match path.rfind('/') {
        Some(slash) => (&path[..slash], &path[slash + 1..]),
        None => ("", path),
    };
    let (filename, ext) = match base.rfind('.') {
        Some(dot) => (&base[..dot], &base[dot..]),
        None => (base, ""),
    };

    ParsedPath {
        dir: dir.to_string(),
        base: base.to_string(),
        filename: filename.to_string(),
        ext: ext.to_string(),
        path: path.to_string(),
    }
}

/// Escaped `file://` URL for an absolute path
pub fn posix_to_file_url(path: &str) -> Result<String, UriError> {
    Url::from_file_path(Path::new(path))
        .map(String::from)
        .map_err(|_| UriError::RelativePath(path.to_string()))
}

/// A resolved attachment together with its 1-based `bdsk-file-N` index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedPathWithIndex {
    pub index: u32,
    pub parsed_path: ParsedPath,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_full_path() {
        let parsed = parse_file_path("/Users/me/Papers/Einstein 1935.pdf");
        assert_eq!(parsed.dir, "/Users/me/Papers");
        assert_eq!(parsed.base, "Einstein 1935.pdf");
        assert_eq!(parsed.filename, "Einstein 1935");
        assert_eq!(parsed.ext, ".pdf");
        assert_eq!(parsed.path, "/Users/me/Papers/Einstein 1935.pdf");
    }

    #[rstest]
    #[case("notes", "", "notes", "notes", "")]
    #[case("archive.tar.gz", "", "archive.tar.gz", "archive.tar", ".gz")]
    #[case("/dir.d/README", "/dir.d", "README", "README", "")]
    #[case("/.hidden", "", ".hidden", "", ".hidden")]
    fn test_parse_path_edge_cases(
        #[case] path: &str,
        #[case] dir: &str,
        #[case] base: &str,
        #[case] filename: &str,
        #[case] ext: &str,
    ) {
        let parsed = parse_file_path(path);
        assert_eq!(parsed.dir, dir);
        assert_eq!(parsed.base, base);
        assert_eq!(parsed.filename, filename);
        assert_eq!(parsed.ext, ext);
    }

    #[test]
    fn test_extension_match_ignores_case() {
        assert!(parse_file_path("/a/B.PDF").has_extension(".pdf"));
        assert!(!parse_file_path("/a/B.txt").has_extension(".pdf"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_url_is_escaped() {
        assert_eq!(
            posix_to_file_url("/Users/me/My Papers/Gödel#1.pdf").unwrap(),
            "file:///Users/me/My%20Papers/G%C3%B6del%231.pdf"
        );
    }

    #[test]
    fn test_relative_path_has_no_file_url() {
        assert!(matches!(
            posix_to_file_url("Papers/A.pdf"),
            Err(UriError::RelativePath(_))
        ));
    }
}
