//! Byte-level scanners over a growing JSON buffer.
//!
//! All structural characters in JSON are ASCII, so every index returned here
//! sits on a UTF-8 character boundary and can be used to slice the buffer.

/// Returns the index just past the colon of the first `"name":` key.
///
/// Whitespace between the quoted key and the colon is tolerated. An
/// occurrence followed by anything other than a colon (for example a string
/// value that happens to equal the key) is skipped. Returns `None` when the
/// key has not appeared yet, or when the buffer ends before the colon.
pub(crate) fn find_key(buffer: &str, name: &str) -> Option<usize> {
    let pattern = format!("\"{name}\"");
    let bytes = buffer.as_bytes();
    let mut from = 0;

    while let Some(offset) = buffer[from..].find(&pattern) {
        let after = from + offset + pattern.len();
        let next = skip_whitespace(bytes, after);
        match bytes.get(next) {
            Some(b':') => return Some(next + 1),
            None => return None,
            Some(_) => from = after,
        }
    }
    None
}

/// Returns the first index at or after `pos` that is not JSON whitespace.
pub(crate) fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while let Some(b' ' | b'\t' | b'\n' | b'\r') = bytes.get(pos) {
        pos += 1;
    }
    pos
}

/// Returns the index of the closing quote of the string starting at `start`.
///
/// `bytes[start]` must be the opening quote.
pub(crate) fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            return Some(i);
        }
    }
    None
}

/// Returns the index of the delimiter closing the one at `start`.
///
/// Tracks nesting depth of `open`/`close` only; delimiters inside string
/// literals are ignored.
pub(crate) fn balanced_end(bytes: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        if b == b'"' {
            in_string = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Returns the index of the last byte of a scalar (number or literal).
///
/// A scalar is only known to be finished once a delimiter follows it; at the
/// end of the buffer a number may still be growing.
fn scalar_end(bytes: &[u8], start: usize) -> Option<usize> {
    bytes
        .iter()
        .enumerate()
        .skip(start)
        .find(|&(_, &b)| matches!(b, b',' | b']' | b'}' | b' ' | b'\t' | b'\n' | b'\r'))
        .and_then(|(i, _)| i.checked_sub(1))
        .filter(|&end| end >= start)
}

/// Returns the end index of the array element starting at `start`.
fn element_end(bytes: &[u8], start: usize) -> Option<usize> {
    match bytes.get(start)? {
        b'{' => balanced_end(bytes, start, b'{', b'}'),
        b'[' => balanced_end(bytes, start, b'[', b']'),
        b'"' => string_end(bytes, start),
        _ => scalar_end(bytes, start),
    }
}

/// Collects every complete element of the still-open array at `start`.
///
/// Stops at the first element that is incomplete or fails a strict parse,
/// so the result is always a prefix of the final array.
pub(crate) fn partial_array(buffer: &str, start: usize) -> Vec<serde_json::Value> {
    let bytes = buffer.as_bytes();
    let mut items = Vec::new();
    let mut pos = start + 1;

    loop {
        pos = skip_whitespace(bytes, pos);
        match bytes.get(pos) {
            None | Some(b']') => break,
            Some(b',') => {
                pos += 1;
                continue;
            }
            Some(_) => {}
        }

        let Some(end) = element_end(bytes, pos) else {
            break;
        };
        match serde_json::from_str::<serde_json::Value>(&buffer[pos..=end]) {
            Ok(value) => items.push(value),
            Err(_) => break,
        }
        pos = end + 1;
    }

    items
}
