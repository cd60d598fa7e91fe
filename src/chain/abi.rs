//! Just enough of the contract ABI to call zero-argument getters that return `string`.
//!
//! Call data is the 4-byte selector:
//!   selector = KECCAK256("<method>()")[0..4]
//!
//! A `string` return value is laid out as
//!   word 0          : offset of the string head (bytes)
//!   word @offset    : byte length `n`
//!   following bytes : `n` bytes of UTF-8, right-padded to a word boundary
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

/// Hex call data (with `0x` prefix) invoking `method()`.
pub fn call_data(method: &str) -> String {
    let digest = Keccak256::digest(format!("{method}()").as_bytes());
    format!("0x{}", hex::encode(&digest[..4]))
}

/// Decode a hex-encoded ABI `string` return value. An empty return (`0x`) decodes to
/// the empty string.
pub fn decode_string(ret: &str) -> Result<String, String> {
    let raw = ret.strip_prefix("0x").unwrap_or(ret);
    let bytes = hex::decode(raw).map_err(|e| format!("return data is not hex: {e}"))?;
    if bytes.is_empty() {
        return Ok(String::new());
    }

    let offset = read_word(&bytes, 0)?;
    let len = read_word(&bytes, offset)?;
    let start = offset
        .checked_add(WORD)
        .ok_or_else(|| "string offset overflows".to_string())?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| "string length overflows".to_string())?;
    let data = bytes
        .get(start..end)
        .ok_or_else(|| format!("string of {len} bytes runs past {} bytes of return data", bytes.len()))?;

    String::from_utf8(data.to_vec()).map_err(|e| format!("string is not UTF-8: {e}"))
}

/// Read a big-endian word at `at` as a `usize`; the upper 24 bytes must be zero.
fn read_word(bytes: &[u8], at: usize) -> Result<usize, String> {
    let word = at
        .checked_add(WORD)
        .and_then(|end| bytes.get(at..end))
        .ok_or_else(|| format!("no ABI word at offset {at}"))?;
    let (high, low) = word.split_at(WORD - 8);
    if high.iter().any(|b| *b != 0) {
        return Err(format!("ABI word at offset {at} does not fit in 64 bits"));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(buf)).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_string(s: &str) -> String {
        let mut out = Vec::new();
        let mut word = [0u8; WORD];
        word[WORD - 1] = 0x20;
        out.extend_from_slice(&word);
        let mut len = [0u8; WORD];
        len[WORD - 8..].copy_from_slice(&(s.len() as u64).to_be_bytes());
        out.extend_from_slice(&len);
        out.extend_from_slice(s.as_bytes());
        out.resize(out.len().div_ceil(WORD) * WORD, 0);
        format!("0x{}", hex::encode(out))
    }

    #[test]
    fn selector_matches_known_value() {
        // KECCAK256("get()") = 0x6d4ce63c…
        assert_eq!(call_data("get"), "0x6d4ce63c");
    }

    #[test]
    fn decodes_padded_string() {
        assert_eq!(decode_string(&encode_string("Alice")).unwrap(), "Alice");
        let long = "x".repeat(70);
        assert_eq!(decode_string(&encode_string(&long)).unwrap(), long);
    }

    #[test]
    fn empty_return_is_empty_string() {
        assert_eq!(decode_string("0x").unwrap(), "");
    }

    #[test]
    fn truncated_return_is_rejected() {
        let full = encode_string("Alice");
        let cut = &full[..full.len() - 64];
        assert!(decode_string(cut).is_err());
    }
}
