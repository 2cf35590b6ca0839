//! CSV dialect detection for uploaded files.
//!
//! Uploads come from spreadsheet exports with unknown delimiters. The
//! sniffer parses a bounded sample with each candidate delimiter and
//! picks the first one under which the data rows are structurally
//! valid: enough columns, and every column the caller declared as
//! integer-valued actually parses as an integer. The header row is
//! detected by the inverse test on the first row.

use crate::error::CoreError;

/// Maximum number of sample characters the sniffer looks at.
pub const SAMPLE_LEN: usize = 1000;

/// Delimiters tried in order when the user did not force one.
pub const CANDIDATE_DELIMITERS: &[u8] = &[b';', b'\t', b','];

/// Output CSV surfaces always use this dialect.
pub const DEFAULT_DELIMITER: u8 = b';';

/// Result of a successful sniff. Quoting is always minimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub has_header: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect {
            delimiter: DEFAULT_DELIMITER,
            has_header: true,
        }
    }
}

/// Decode uploaded bytes: UTF-8 first, Latin-1 on failure.
///
/// Latin-1 maps every byte to a code point, so this never fails and
/// never silently produces mojibake from a truncated UTF-8 sequence.
pub fn decode_upload(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => encoding_rs::mem::decode_latin1(bytes).into_owned(),
    }
}

fn parse_rows(sample: &str, delimiter: u8, limit: usize) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(sample.as_bytes());
    reader
        .records()
        .take(limit)
        .filter_map(|record| record.ok())
        .map(|record| record.iter().map(str::to_string).collect())
        .collect()
}

fn int_columns_match(row: &[String], int_columns: &[usize]) -> bool {
    int_columns.iter().all(|&col| {
        row.get(col - 1)
            .map(|cell| cell.trim().parse::<i64>().is_ok())
            .unwrap_or(false)
    })
}

fn row_is_valid(row: &[String], int_columns: &[usize], min_columns: usize) -> bool {
    !row.is_empty() && row.len() >= min_columns && int_columns_match(row, int_columns)
}

/// Sniff the delimiter and header presence of a CSV sample.
///
/// `int_columns` holds the 1-based indices of columns the caller
/// declared as integer-valued (e.g. the item-number column); the
/// highest referenced index doubles as the minimum column count.
/// `forced_delimiter` narrows the candidate set to a single delimiter.
pub fn detect_dialect(
    data: &str,
    int_columns: &[usize],
    forced_delimiter: Option<u8>,
) -> Result<Dialect, CoreError> {
    let sample: String = data.chars().take(SAMPLE_LEN).collect();
    let min_columns = int_columns.iter().copied().max().unwrap_or(1);
    let candidates: Vec<u8> = match forced_delimiter {
        Some(delimiter) => vec![delimiter],
        None => CANDIDATE_DELIMITERS.to_vec(),
    };

    for delimiter in candidates {
        let rows = parse_rows(&sample, delimiter, 3);
        let Some((first_row, data_rows)) = rows.split_first() else {
            continue;
        };
        if data_rows.is_empty() && forced_delimiter.is_none() {
            return Err(CoreError::NotEnoughData);
        }
        // A forced delimiter skips the structural test; malformed
        // cells are then reported per row with their line number.
        let rows_valid = forced_delimiter.is_some()
            || data_rows
                .iter()
                .all(|row| row_is_valid(row, int_columns, min_columns));
        if rows_valid {
            let has_header = !int_columns_match(first_row, int_columns);
            return Ok(Dialect {
                delimiter,
                has_header,
            });
        }
    }
    Err(CoreError::UnsupportedDialect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn detects_semicolon_without_header() {
        let sample = "1;a;text\n2;a;text2\n3;a;text3\n";
        let dialect = detect_dialect(sample, &[1], None).unwrap();
        assert_eq!(dialect.delimiter, b';');
        assert!(!dialect.has_header);
    }

    #[test]
    fn detects_semicolon_with_header() {
        let sample = "num;cond;text\n1;a;text\n2;a;text2\n";
        let dialect = detect_dialect(sample, &[1], None).unwrap();
        assert_eq!(dialect.delimiter, b';');
        assert!(dialect.has_header);
    }

    #[test]
    fn detects_each_candidate_delimiter() {
        for &delimiter in CANDIDATE_DELIMITERS {
            let sep = delimiter as char;
            let sample = format!("1{sep}a{sep}x\n2{sep}a{sep}y\n3{sep}a{sep}z\n");
            let dialect = detect_dialect(&sample, &[1], None).unwrap();
            assert_eq!(dialect.delimiter, delimiter, "delimiter {sep:?}");
            assert!(!dialect.has_header);
        }
    }

    #[test]
    fn tab_separated() {
        let sample = "item\tcondition\tcontent\n1\ta\tThe cat sat.\n2\ta\tA dog ran.\n";
        let dialect = detect_dialect(sample, &[1], None).unwrap();
        assert_eq!(dialect.delimiter, b'\t');
        assert!(dialect.has_header);
    }

    #[test]
    fn too_few_rows() {
        assert_matches!(
            detect_dialect("1;a;text\n", &[1], None),
            Err(CoreError::NotEnoughData)
        );
    }

    #[test]
    fn forced_delimiter_tolerates_header_only() {
        let dialect = detect_dialect("num;cond;text\n", &[1], Some(b';')).unwrap();
        assert_eq!(dialect.delimiter, b';');
        assert!(dialect.has_header);
    }

    #[test]
    fn forced_delimiter_skips_structural_test() {
        let dialect = detect_dialect("num;cond\nx;a\n", &[1], Some(b';')).unwrap();
        assert_eq!(dialect.delimiter, b';');
        assert!(dialect.has_header);
    }

    #[test]
    fn unsupported_format() {
        let sample = "x|y|z\na|b|c\nd|e|f\n";
        assert_matches!(
            detect_dialect(sample, &[1], None),
            Err(CoreError::UnsupportedDialect)
        );
    }

    #[test]
    fn decode_utf8_and_latin1() {
        assert_eq!(decode_upload("héllo".as_bytes()), "héllo");
        // 0xE9 is é in Latin-1 but invalid UTF-8 on its own.
        assert_eq!(decode_upload(&[b'h', 0xE9]), "hé");
    }
}
