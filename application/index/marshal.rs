//! A writer for the subset of Ruby's Marshal 4.8 format used by gem indexes.
//!
//! Only what `gem` clients need to load `specs.4.8` and quick gemspecs is
//! supported: nil, booleans, small integers, symbols, strings, arrays, hashes
//! and the three ways RubyGems classes serialize themselves (`marshal_dump`,
//! plain instance variables and `_dump`).
use std::collections::HashMap;

use byteorder::{LittleEndian, WriteBytesExt};
use time::Date;

pub const MARSHAL_VERSION: &str = "4.8";

const MAJOR: u8 = 4;
const MINOR: u8 = 8;

#[derive(Debug)]
pub struct MarshalWriter {
    buf: Vec<u8>,
    symbols: HashMap<String, usize>,
}

impl Default for MarshalWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarshalWriter {
    pub fn new() -> Self {
        Self {
            buf: vec![MAJOR, MINOR],
            symbols: HashMap::new(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn nil(&mut self) {
        self.buf.push(b'0');
    }

    pub fn bool(&mut self, value: bool) {
        self.buf.push(if value { b'T' } else { b'F' });
    }

    pub fn integer(&mut self, value: i32) {
        self.buf.push(b'i');
        self.long(value);
    }

    pub fn symbol(&mut self, name: &str) {
        if let Some(&index) = self.symbols.get(name) {
            self.buf.push(b';');
            self.long(index as i32);
            return;
        }
        let index = self.symbols.len();
        self.symbols.insert(name.to_string(), index);
        self.buf.push(b':');
        self.bytes(name.as_bytes());
    }

    /// A UTF-8 string.
    pub fn string(&mut self, value: &str) {
        self.encoded_string(value, true);
    }

    /// A string tagged with its encoding: UTF-8 when `utf8`, US-ASCII otherwise.
    fn encoded_string(&mut self, value: &str, utf8: bool) {
        self.buf.extend_from_slice(b"I\"");
        self.bytes(value.as_bytes());
        self.long(1);
        self.symbol("E");
        self.bool(utf8);
    }

    pub fn optional_string(&mut self, value: Option<&str>) {
        match value {
            Some(value) => self.string(value),
            None => self.nil(),
        }
    }

    /// Start an array of `len` elements; the caller writes each element.
    pub fn array_header(&mut self, len: usize) {
        self.buf.push(b'[');
        self.long(len as i32);
    }

    pub fn array<T>(&mut self, items: &[T], mut write: impl FnMut(&mut Self, &T)) {
        self.array_header(items.len());
        for item in items {
            write(self, item);
        }
    }

    pub fn string_array(&mut self, items: &[String]) {
        self.array(items, |w, item| w.string(item));
    }

    /// Start a hash of `len` pairs; the caller writes each key and value.
    pub fn hash_header(&mut self, len: usize) {
        self.buf.push(b'{');
        self.long(len as i32);
    }

    /// An object serialized through `marshal_dump`; the caller writes the
    /// dumped value next.
    pub fn user_marshal(&mut self, class: &str) {
        self.buf.push(b'U');
        self.symbol(class);
    }

    /// An object serialized as its instance variables; the caller writes
    /// `ivars` symbol/value pairs next.
    pub fn object(&mut self, class: &str, ivars: usize) {
        self.buf.push(b'o');
        self.symbol(class);
        self.long(ivars as i32);
    }

    /// An object serialized through `_dump` as an opaque byte string.
    pub fn user_dump(&mut self, class: &str, data: &[u8]) {
        self.buf.push(b'u');
        self.symbol(class);
        self.bytes(data);
    }

    /// Midnight UTC on `date`, as Ruby's `Time#_dump` writes it.
    pub fn utc_date(&mut self, date: Date) {
        let year = (date.year() - 1900) as u32;
        let month = u8::from(date.month()) as u32 - 1;
        let day = date.day() as u32;
        let high = 1 << 31 | 1 << 30 | (year & 0xffff) << 14 | month << 10 | day << 5;

        let mut data = Vec::with_capacity(8);
        // writing into a Vec cannot fail
        let _ = data.write_u32::<LittleEndian>(high);
        let _ = data.write_u32::<LittleEndian>(0);

        self.buf.push(b'I');
        self.user_dump("Time", &data);
        self.long(1);
        self.symbol("zone");
        self.encoded_string("UTC", false);
    }

    fn bytes(&mut self, data: &[u8]) {
        self.long(data.len() as i32);
        self.buf.extend_from_slice(data);
    }

    fn long(&mut self, value: i32) {
        match value {
            0 => self.buf.push(0),
            1..=122 => self.buf.push(value as u8 + 5),
            -123..=-1 => self.buf.push((value - 5) as u8),
            _ => {
                let mut rest = value;
                let mut encoded = Vec::with_capacity(4);
                loop {
                    encoded.push((rest & 0xff) as u8);
                    rest >>= 8;
                    if (value >= 0 && rest == 0) || (value < 0 && rest == -1) {
                        break;
                    }
                }
                let len = encoded.len() as i8;
                self.buf.push(if value >= 0 { len as u8 } else { (-len) as u8 });
                self.buf.extend_from_slice(&encoded);
            }
        }
    }
}
