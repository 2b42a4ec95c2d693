//! Binary-body detection and the uuencode fallback (§4.6).
//!
//! Text insertion is tried first; only when the raw content can't survive a trip through the
//! line-oriented weave format unchanged does the engine fall back to uuencoding it. Both halves
//! are pure functions over bytes; the caller (`Admin::create`, `DeltaRecord::Apply`) is
//! responsible for the scratch-file spooling §4.6 describes and for setting the `encoded` flag.

const SOH: u8 = 0x01;
const CHUNK_LEN: usize = 45;

/// Split `raw` into lines suitable for text insertion, or report why it can't be represented as
/// text (the caller treats this as the recoverable `BodyIsBinary` signal, §7).
pub fn split_text_lines(raw: &[u8], max_line_len: usize) -> Result<Vec<Vec<u8>>, String> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    if raw.last() != Some(&b'\n') {
        return Err("final line has no trailing newline".to_string());
    }

    let mut lines = Vec::new();
    // `raw` is known to end in `\n`; drop it first so `split` doesn't yield a trailing empty
    // slice for it.
    for line in raw[..raw.len() - 1].split(|&b| b == b'\n') {
        if line.first() == Some(&SOH) {
            return Err("line begins with control byte 0x01 after a newline".to_string());
        }
        if line.len() > max_line_len {
            return Err(format!("line of {} bytes exceeds configured maximum {}", line.len(), max_line_len));
        }
        lines.push(line.to_vec());
    }
    Ok(lines)
}

/// Encode `raw` as classical 45-byte-chunk uuencode, one chunk per line, terminated by a single
/// space "zero-length" line.
pub fn uuencode(raw: &[u8]) -> Vec<Vec<u8>> {
    let mut out: Vec<Vec<u8>> = raw.chunks(CHUNK_LEN).map(uuencode_line).collect();
    out.push(b" ".to_vec());
    out
}

fn uuencode_line(chunk: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + (chunk.len() + 2) / 3 * 4);
    out.push(enc(chunk.len() as u8));
    for group in chunk.chunks(3) {
        let mut buf = [0u8; 3];
        buf[..group.len()].copy_from_slice(group);
        out.push(enc(buf[0] >> 2));
        out.push(enc(((buf[0] & 0x03) << 4) | (buf[1] >> 4)));
        out.push(enc(((buf[1] & 0x0f) << 2) | (buf[2] >> 6)));
        out.push(enc(buf[2] & 0x3f));
    }
    out
}

/// Decode a uuencoded body (the inverse of [`uuencode`]) back to the original bytes.
pub fn uudecode(lines: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let n = dec(line[0]) as usize;
        if n == 0 {
            break;
        }
        let mut produced = 0usize;
        for group in line[1..].chunks(4) {
            if group.len() < 4 {
                break;
            }
            let b0 = dec(group[0]);
            let b1 = dec(group[1]);
            let b2 = dec(group[2]);
            let b3 = dec(group[3]);
            let bytes = [(b0 << 2) | (b1 >> 4), (b1 << 4) | (b2 >> 2), (b2 << 6) | b3];
            for &b in &bytes {
                if produced >= n {
                    break;
                }
                out.push(b);
                produced += 1;
            }
        }
    }
    out
}

fn enc(b: u8) -> u8 {
    let v = b & 0x3f;
    if v == 0 {
        b'`'
    } else {
        v + 0x20
    }
}

fn dec(c: u8) -> u8 {
    if c == b'`' {
        0
    } else {
        (c.wrapping_sub(0x20)) & 0x3f
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_lines_round_trip() {
        let lines = split_text_lines(b"hello\nworld\n", 4096).unwrap();
        assert_eq!(lines, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn missing_trailing_newline_is_rejected() {
        assert!(split_text_lines(b"hello\nworld", 4096).is_err());
    }

    #[test]
    fn control_byte_after_newline_is_rejected() {
        let mut raw = b"hello\n".to_vec();
        raw.push(0x01);
        raw.extend_from_slice(b"oops\n");
        assert!(split_text_lines(&raw, 4096).is_err());
    }

    #[test]
    fn overlong_line_is_rejected() {
        let raw = vec![b'x'; 10];
        assert!(split_text_lines(&raw, 4).is_err());
    }

    #[test]
    fn uuencode_round_trips_binary_payload() {
        let raw: Vec<u8> = (0u8..=255).collect();
        let encoded = uuencode(&raw);
        assert_eq!(encoded.last().unwrap(), b" ");
        let decoded = uudecode(&encoded);
        assert_eq!(decoded, raw);
    }
}
