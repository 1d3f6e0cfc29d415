//! CSV export source with encoding and delimiter auto-detection.
//!
//! Reads a local export of the inventory sheet. Rows keep their raw shape:
//! short and long rows are passed through as-is for the normalizer to fix.

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use std::path::PathBuf;

use super::RowSource;
use crate::error::{FetchError, FetchResult};
use crate::models::RawRow;

/// Guess the encoding of an export.
///
/// The charset chardet reports is resolved through the WHATWG label table
/// (`"ISO-8859-1"` is windows-1252 there). ASCII and unrecognized names
/// decode as UTF-8.
pub fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    let (charset, _confidence, _language) = chardet::detect(bytes);
    if charset.eq_ignore_ascii_case("ascii") {
        return UTF_8;
    }
    Encoding::for_label(charset.as_bytes()).unwrap_or(UTF_8)
}

/// Decode an export; a byte-order mark wins over `encoding`
pub fn decode_content(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let mut best = b',';
    let mut best_count = 0;

    for sep in [b',', b';', b'\t', b'|'] {
        let count = first_line.matches(sep as char).count();
        if count > best_count {
            best_count = count;
            best = sep;
        }
    }

    best
}

/// Parse CSV text into raw rows.
///
/// Fully empty lines are skipped. Quoted cells (`"12,345"`) keep their
/// embedded delimiters.
pub fn parse_rows(content: &str, delimiter: u8, has_headers: bool) -> FetchResult<Vec<RawRow>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| FetchError::Csv(format!("record {}: {}", i + 1, e)))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(rows)
}

/// Local CSV file source
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
    has_headers: bool,
    delimiter: Option<u8>,
}

impl CsvFileSource {
    /// Source that skips a header row and detects the delimiter
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            has_headers: true,
            delimiter: None,
        }
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }
}

#[async_trait]
impl RowSource for CsvFileSource {
    async fn fetch_rows(&self) -> FetchResult<Vec<RawRow>> {
        let bytes = tokio::fs::read(&self.path).await?;

        let encoding = detect_encoding(&bytes);
        let content = decode_content(&bytes, encoding);
        let delimiter = self.delimiter.unwrap_or_else(|| detect_delimiter(&content));

        parse_rows(&content, delimiter, self.has_headers)
    }

    fn describe(&self) -> String {
        format!("CSV file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), b'\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), b'|');
        assert_eq!(detect_delimiter("single"), b',');
    }

    fn latin1() -> &'static Encoding {
        Encoding::for_label(b"iso-8859-1").unwrap()
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        assert_eq!(decode_content(bytes, latin1()), "Société");
    }

    #[test]
    fn test_latin1_currency_sign() {
        // 0xA4 is the generic currency sign in ISO-8859-1, not the euro sign
        assert_eq!(decode_content(&[0xA4], latin1()), "¤");
    }

    #[test]
    fn test_utf8_and_ascii() {
        let text = "Citroën, Škoda, Müller";
        assert_eq!(detect_encoding(b"plain ascii"), UTF_8);
        assert_eq!(decode_content(text.as_bytes(), UTF_8), text);
    }

    #[test]
    fn test_quoted_cells_keep_delimiters() {
        let csv = "vin,make,model,year,mileage\n1FA6P8TH5E5000001,Ford,Mustang,2014,\"12,345\"\n";
        let rows = parse_rows(csv, b',', true).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][4], "12,345");
    }

    #[test]
    fn test_ragged_rows_and_blank_lines() {
        let csv = "a;b;c\n1;2\n\n1;2;3;4\n";
        let rows = parse_rows(csv, b';', true).unwrap();
        assert_eq!(rows, vec![vec!["1", "2"], vec!["1", "2", "3", "4"]]);
    }

    #[test]
    fn test_without_header_row() {
        let rows = parse_rows("x,y\n", b',', false).unwrap();
        assert_eq!(rows, vec![vec!["x", "y"]]);
    }

    #[tokio::test]
    async fn test_file_source_detects_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "vin;make;model").unwrap();
        writeln!(file, "1FA6P8TH5E5000001;Ford;Mustang").unwrap();
        writeln!(file, "2T1BURHE0JC000002;Toyota").unwrap();

        let source = CsvFileSource::new(file.path());
        let rows = source.fetch_rows().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["1FA6P8TH5E5000001", "Ford", "Mustang"]);
        assert_eq!(rows[1].len(), 2);
        assert!(source.describe().starts_with("CSV file"));
    }

    #[tokio::test]
    async fn test_file_source_explicit_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // More commas than semicolons, so detection alone would split on ','
        writeln!(file, "1FA6P8TH5E5000001;Ford, Inc., Dearborn, MI;Mustang").unwrap();

        let rows = CsvFileSource::new(file.path())
            .with_headers(false)
            .with_delimiter(b';')
            .fetch_rows()
            .await
            .unwrap();

        assert_eq!(rows, vec![vec!["1FA6P8TH5E5000001", "Ford, Inc., Dearborn, MI", "Mustang"]]);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let source = CsvFileSource::new("/nonexistent/inventory.csv");
        assert!(matches!(source.fetch_rows().await, Err(FetchError::Io(_))));
    }
}
