//! Ordered header collection.
//!
//! Headers keep their wire order and allow duplicates. Name lookups ignore
//! ASCII case and return the first match. Each header also carries the
//! `;`-delimited options that followed its main value, e.g. the `boundary`
//! of a `multipart/form-data` content type.

use bytes::{BufMut, BytesMut};

/// A single header line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Header name as received (case preserved)
    pub name: String,
    /// Full header value, options included, trimmed
    pub value: String,
    /// Parameters found after the main value (`name=value`), quotes stripped
    pub options: Vec<(String, String)>,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let options = parse_options(&value);
        Self {
            name: name.into(),
            value,
            options,
        }
    }

    /// Value up to the first `;`, trimmed.
    pub fn main_value(&self) -> &str {
        match self.value.find(';') {
            Some(idx) => self.value[..idx].trim(),
            None => self.value.trim(),
        }
    }

    /// Looks up an option by name, ignoring ASCII case.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Splits `main; a=1; b="two"` into `[("a","1"), ("b","two")]`.
pub fn parse_options(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .skip(1)
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            Some((k.trim().to_string(), unquote(v.trim()).to_string()))
        })
        .collect()
}

fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Ordered list of headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    items: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of the first header named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.find(name).map(|h| h.value.as_str())
    }

    /// Returns the first header named `name`.
    pub fn find(&self, name: &str) -> Option<&Header> {
        self.items.iter().find(|h| h.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Appends a header, keeping any existing one with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.items.push(Header::new(name, value));
    }

    /// Appends an already-built header.
    pub fn push(&mut self, header: Header) {
        self.items.push(header);
    }

    /// Replaces the first header named `name` or appends a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self
            .items
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(&name))
        {
            Some(header) => *header = Header::new(name, value),
            None => self.items.push(Header::new(name, value)),
        }
    }

    /// Removes every header named `name`.
    pub fn remove(&mut self, name: &str) {
        self.items.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    pub fn last_mut(&mut self) -> Option<&mut Header> {
        self.items.last_mut()
    }

    /// Removes and returns the most recently added header.
    pub fn pop(&mut self) -> Option<Header> {
        self.items.pop()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Writes `Name: value\r\n` for every header.
    pub fn write_to(&self, buf: &mut BytesMut) {
        for header in &self.items {
            buf.put_slice(header.name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(header.value.as_bytes());
            buf.put_slice(b"\r\n");
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_first_wins() {
        let mut headers = Headers::new();
        headers.add("X-Trace", "one");
        headers.add("x-trace", "two");

        assert_eq!(headers.get("X-TRACE"), Some("one"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn options_are_split_and_unquoted() {
        let header = Header::new("Content-Type", "multipart/form-data; boundary=\"----X\"");

        assert_eq!(header.main_value(), "multipart/form-data");
        assert_eq!(header.option("boundary"), Some("----X"));
    }
}
