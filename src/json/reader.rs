//! Relaxed JSON reader.
//!
//! Accepts a superset of standard JSON commonly produced by older REST
//! services: bare (unquoted) object keys, and strings delimited by either
//! single or double quotes with standard backslash escapes. Everything else
//! follows the standard grammar. serde_json rejects this superset, so the
//! reader is hand-written; serialization goes back out through serde_json.

use crate::error::{Error, ErrorKind, Result};
use crate::json::{JsonArray, JsonObject, JsonValue};

/// Parse text in the relaxed JSON grammar into a [`JsonValue`].
pub fn parse_relaxed(text: &str) -> Result<JsonValue> {
    let mut reader = Reader::new(text);
    reader.skip_whitespace();
    let value = reader.read_value()?;
    reader.skip_whitespace();
    if !reader.at_end() {
        return Err(reader.error("trailing characters after document"));
    }
    Ok(value)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::new(ErrorKind::Decode(format!(
            "{} at offset {}",
            message, self.pos
        )))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn read_value(&mut self) -> Result<JsonValue> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'{') => self.read_object().map(JsonValue::Object),
            Some(b'[') => self.read_array().map(JsonValue::Array),
            Some(b'"') | Some(b'\'') => self.read_string().map(JsonValue::String),
            Some(b'-') | Some(b'0'..=b'9') => self.read_number(),
            Some(b't') | Some(b'f') | Some(b'n') => self.read_keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of document")),
        }
    }

    fn read_keyword(&mut self) -> Result<JsonValue> {
        for (literal, value) in [
            ("true", JsonValue::Bool(true)),
            ("false", JsonValue::Bool(false)),
            ("null", JsonValue::Null),
        ] {
            if self.bytes[self.pos..].starts_with(literal.as_bytes()) {
                self.pos += literal.len();
                return Ok(value);
            }
        }
        Err(self.error("invalid literal"))
    }

    fn read_number(&mut self) -> Result<JsonValue> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' | b'+' | b'-' => {
                    is_float = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| self.error("invalid number"))?;
        if is_float {
            text.parse::<f64>()
                .map(JsonValue::Float)
                .map_err(|_| self.error("invalid number"))
        } else {
            text.parse::<i64>()
                .map(JsonValue::Int)
                // Integral but too wide for i64; keep the value as a float.
                .or_else(|_| text.parse::<f64>().map(JsonValue::Float))
                .map_err(|_| self.error("invalid number"))
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(b) if b == quote => return Ok(out),
                Some(b'\\') => {
                    let escape = self
                        .bump()
                        .ok_or_else(|| self.error("unterminated escape"))?;
                    match escape {
                        b'"' => out.push('"'),
                        b'\'' => out.push('\''),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{0008}'),
                        b'f' => out.push('\u{000C}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => out.push(self.read_unicode_escape()?),
                        _ => return Err(self.error("invalid escape sequence")),
                    }
                }
                Some(b) if b < 0x80 => out.push(b as char),
                Some(b) => {
                    // Multi-byte UTF-8 sequence; copy it through verbatim.
                    let len = utf8_sequence_len(b);
                    let start = self.pos - 1;
                    let end = start + len;
                    let slice = self
                        .bytes
                        .get(start..end)
                        .ok_or_else(|| self.error("invalid UTF-8 sequence"))?;
                    let s = std::str::from_utf8(slice)
                        .map_err(|_| self.error("invalid UTF-8 sequence"))?;
                    out.push_str(s);
                    self.pos = end;
                }
            }
        }
    }

    fn read_unicode_escape(&mut self) -> Result<char> {
        let code = self.read_hex4()?;
        // Non-BMP characters arrive as a UTF-16 surrogate pair of escapes.
        if (0xD800..=0xDBFF).contains(&code) {
            if self.bump() != Some(b'\\') || self.bump() != Some(b'u') {
                return Err(self.error("unpaired surrogate in \\u escape"));
            }
            let low = self.read_hex4()?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return Err(self.error("unpaired surrogate in \\u escape"));
            }
            let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
            return char::from_u32(combined).ok_or_else(|| self.error("invalid \\u code point"));
        }
        if (0xDC00..=0xDFFF).contains(&code) {
            return Err(self.error("unpaired surrogate in \\u escape"));
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid \\u code point"))
    }

    fn read_hex4(&mut self) -> Result<u32> {
        let hex = self
            .bytes
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| self.error("truncated \\u escape"))?;
        let hex = std::str::from_utf8(hex).map_err(|_| self.error("invalid \\u escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid \\u escape"))?;
        self.pos += 4;
        Ok(code)
    }

    fn read_bare_key(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'$' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected object key"));
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn read_object(&mut self) -> Result<JsonObject> {
        self.expect(b'{')?;
        let mut obj = JsonObject::new();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(obj);
        }
        loop {
            self.skip_whitespace();
            let key = match self.peek() {
                Some(b'"') | Some(b'\'') => self.read_string()?,
                _ => self.read_bare_key()?,
            };
            self.skip_whitespace();
            self.expect(b':')?;
            let value = self.read_value()?;
            obj.set(key, value);
            self.skip_whitespace();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => return Ok(obj),
                _ => return Err(self.error("expected ',' or '}' in object")),
            }
        }
    }

    fn read_array(&mut self) -> Result<JsonArray> {
        self.expect(b'[')?;
        let mut arr = JsonArray::new();
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(arr);
        }
        loop {
            let value = self.read_value()?;
            arr.push(value);
            self.skip_whitespace();
            match self.bump() {
                Some(b',') => continue,
                Some(b']') => return Ok(arr),
                _ => return Err(self.error("expected ',' or ']' in array")),
            }
        }
    }
}

fn utf8_sequence_len(first: u8) -> usize {
    match first {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}
