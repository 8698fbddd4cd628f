//! Decoder for PHP `serialize()` output as stored in WordPress meta tables.

use serde_json::{Map, Number, Value};

use crate::error::{MigrateError, Result};

/// Decode a meta value: serialized PHP becomes structured JSON, anything else
/// stays a plain string.
pub fn decode_meta_value(raw: &str) -> Value {
    if looks_serialized(raw)
        && let Ok(value) = unserialize(raw)
    {
        return value;
    }
    Value::String(raw.to_string())
}

fn looks_serialized(raw: &str) -> bool {
    let raw = raw.trim();
    if raw == "N;" {
        return true;
    }
    let bytes = raw.as_bytes();
    bytes.len() >= 4
        && matches!(bytes[0], b'a' | b'b' | b'i' | b'd' | b's' | b'O')
        && bytes[1] == b':'
        && matches!(bytes[bytes.len() - 1], b';' | b'}')
}

pub fn unserialize(raw: &str) -> Result<Value> {
    let mut parser = Parser {
        input: raw.trim().as_bytes(),
        pos: 0,
    };
    let value = parser.value()?;
    if parser.pos != parser.input.len() {
        return Err(parser.error("trailing data"));
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, what: &str) -> MigrateError {
        MigrateError::Unserialize(format!("{what} at byte {}", self.pos))
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.input.get(self.pos) == Some(&byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn until(&mut self, stop: u8) -> Result<&'a str> {
        let input = self.input;
        let start = self.pos;
        while input.get(self.pos).is_some_and(|b| *b != stop) {
            self.pos += 1;
        }
        let slice = &input[start..self.pos];
        self.expect(stop)?;
        std::str::from_utf8(slice).map_err(|_| self.error("invalid utf-8"))
    }

    fn length(&mut self) -> Result<usize> {
        self.until(b':')?
            .parse()
            .map_err(|_| self.error("invalid length"))
    }

    fn quoted(&mut self, len: usize) -> Result<String> {
        self.expect(b'"')?;
        let input = self.input;
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| self.error("length overflow"))?;
        let slice = input
            .get(self.pos..end)
            .ok_or_else(|| self.error("string runs past end"))?;
        // Legacy exports are frequently latin-1; keep them readable rather than failing.
        let text = String::from_utf8_lossy(slice).into_owned();
        self.pos = end;
        self.expect(b'"')?;
        Ok(text)
    }

    fn value(&mut self) -> Result<Value> {
        let tag = *self
            .input
            .get(self.pos)
            .ok_or_else(|| self.error("unexpected end"))?;
        self.pos += 1;
        if tag == b'N' {
            self.expect(b';')?;
            return Ok(Value::Null);
        }
        self.expect(b':')?;
        match tag {
            b'b' => match self.until(b';')? {
                "0" => Ok(Value::Bool(false)),
                "1" => Ok(Value::Bool(true)),
                _ => Err(self.error("invalid boolean")),
            },
            b'i' => {
                let n: i64 = self
                    .until(b';')?
                    .parse()
                    .map_err(|_| self.error("invalid integer"))?;
                Ok(Value::Number(n.into()))
            }
            b'd' => {
                let raw = self.until(b';')?;
                let f: f64 = raw.parse().map_err(|_| self.error("invalid float"))?;
                Ok(Number::from_f64(f).map_or(Value::Null, Value::Number))
            }
            b's' => {
                let len = self.length()?;
                let text = self.quoted(len)?;
                self.expect(b';')?;
                Ok(Value::String(text))
            }
            b'a' => {
                let count = self.length()?;
                self.entries(count)
            }
            b'O' => {
                let len = self.length()?;
                self.quoted(len)?;
                self.expect(b':')?;
                let count = self.length()?;
                self.entries(count)
            }
            _ => Err(self.error("unknown type tag")),
        }
    }

    fn entries(&mut self, count: usize) -> Result<Value> {
        self.expect(b'{')?;
        let mut pairs = Vec::with_capacity(count.min(self.input.len()));
        for _ in 0..count {
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                _ => return Err(self.error("invalid array key")),
            };
            let value = self.value()?;
            pairs.push((key, value));
        }
        self.expect(b'}')?;

        let is_list = pairs
            .iter()
            .enumerate()
            .all(|(i, (key, _))| key == &i.to_string());
        if is_list && !pairs.is_empty() {
            return Ok(Value::Array(pairs.into_iter().map(|(_, v)| v).collect()));
        }
        Ok(Value::Object(pairs.into_iter().collect::<Map<_, _>>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_nested_attachment_info() {
        let raw = r#"a:3:{s:6:"bucket";s:9:"cdn.media";s:3:"key";s:36:"wp-content/uploads/2014/01/photo.jpg";s:6:"region";s:14:"ap-southeast-2";}"#;
        let value = unserialize(raw).unwrap();
        assert_eq!(value["key"], "wp-content/uploads/2014/01/photo.jpg");
        assert_eq!(value["region"], "ap-southeast-2");
    }

    #[test]
    fn sequential_integer_keys_become_a_list() {
        let raw = r#"a:2:{i:0;s:1:"a";i:1;b:1;}"#;
        assert_eq!(unserialize(raw).unwrap(), json!(["a", true]));
    }

    #[test]
    fn string_length_counts_bytes() {
        let raw = "s:6:\"caf\u{e9}!\";";
        assert_eq!(unserialize(raw).unwrap(), json!("caf\u{e9}!"));
    }

    #[test]
    fn plain_text_meta_stays_a_string() {
        assert_eq!(decode_meta_value("2019/04/photo.jpg"), json!("2019/04/photo.jpg"));
        assert_eq!(decode_meta_value("s:99:\"short\";"), json!("s:99:\"short\";"));
        assert_eq!(decode_meta_value("i:42;"), json!(42));
        assert_eq!(decode_meta_value("N;"), Value::Null);
    }

    #[test]
    fn absurd_string_length_is_an_error() {
        let raw = format!("s:{}:\"x\";", usize::MAX);
        assert_eq!(unserialize(&raw).unwrap_err().code(), "unserialize_error");
        assert_eq!(decode_meta_value(&raw), json!(raw));
        assert!(unserialize(&format!("a:{}:{{}}", usize::MAX)).is_err());
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        assert!(unserialize("i:1;i:2;").is_err());
    }
}
