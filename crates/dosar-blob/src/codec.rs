//! Raw-block wire encoding: zstd (level 10) over the payload
//! `line₀\nline₁\n…lineₙ₋₁` with no trailing newline. Decoders read the whole
//! frame, apply replacement decoding for invalid UTF-8, then split on `\n`.

use crate::BlobError;

/// Compression level fixed for all raw-block objects.
const ZSTD_LEVEL: i32 = 10;

/// Encode a line array into a compressed raw-block frame.
pub fn encode_lines(lines: &[String]) -> Result<Vec<u8>, BlobError> {
    let joined = lines.join("\n");
    Ok(zstd::encode_all(joined.as_bytes(), ZSTD_LEVEL)?)
}

/// Decode a raw-block frame back into its line array.
pub fn decode_lines(bytes: &[u8]) -> Result<Vec<String>, BlobError> {
    let raw = zstd::decode_all(bytes)?;
    let text = String::from_utf8_lossy(&raw);
    Ok(text.split('\n').map(str::to_owned).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_identity() {
        let lines: Vec<String> = vec!["one".into(), "".into(), "trei 3".into()];
        let encoded = encode_lines(&lines).unwrap();
        assert_eq!(decode_lines(&encoded).unwrap(), lines);
    }

    #[test]
    fn empty_buffer_decodes_to_single_empty_line() {
        // join of zero lines is the empty string, which splits to [""].
        let encoded = encode_lines(&[]).unwrap();
        assert_eq!(decode_lines(&encoded).unwrap(), vec![String::new()]);
    }

    #[test]
    fn interior_newlines_are_the_separator() {
        let lines: Vec<String> = vec!["a".into(), "b".into()];
        let encoded = encode_lines(&lines).unwrap();
        let raw = zstd::decode_all(&encoded[..]).unwrap();
        assert_eq!(raw, b"a\nb");
    }
}
