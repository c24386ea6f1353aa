use std::borrow::Cow;
use std::str;

/// Largest number of bytes a 64-bit VLUINT can occupy.
pub const VLUINT_MAX_LEN: usize = 10;

/// Framing bits of a length-prefixed TLV element.
pub const LC_LENGTH: u64 = 2;

/// Framing bits of the terminal marker.
pub const LC_END: u64 = 3;

/// The one-byte marker that closes a TLV stream: `1 << 2 | 3`.
pub const TERMINAL: u8 = (1 << 2 | LC_END) as u8;

/// Returns the number of bytes `write_var_uint` produces for `value`.
pub fn vluint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value > 127 {
        value >>= 7;
        len += 1;
    }
    len
}

/// A TauSchema byte buffer meant for reading.
///
/// Example usage:
///
/// ```
/// use std::borrow::Cow;
/// let mut bb = tauschema_codec::ByteBuffer::new(&[240, 159, 141, 149, 0, 172, 2]);
/// assert_eq!(bb.read_string(), Ok(Cow::Borrowed("🍕")));
/// assert_eq!(bb.read_var_uint(), Ok(300));
/// ```
///
pub struct ByteBuffer<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> ByteBuffer<'a> {
    /// Create a new ByteBuffer that wraps the provided byte slice. The lifetime
    /// of the returned ByteBuffer must not outlive the lifetime of the byte
    /// slice.
    pub fn new(data: &'a [u8]) -> ByteBuffer<'a> {
        ByteBuffer { data, index: 0 }
    }

    /// Retrieves the underlying byte slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Retrieves the current index into the underlying byte slice. This starts
    /// off as 0 and ends up as `self.data().len()` when everything has been
    /// read.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Moves the read position. Positions past the end are clamped.
    pub fn seek(&mut self, index: usize) {
        self.index = index.min(self.data.len());
    }

    /// True once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.index >= self.data.len()
    }

    /// Try to read a byte starting at the current index.
    pub fn read_byte(&mut self) -> Result<u8, ()> {
        if self.index >= self.data.len() {
            Err(())
        } else {
            let value = self.data[self.index];
            self.index += 1;
            Ok(value)
        }
    }

    /// Try to read `len` raw bytes starting at the current index.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ()> {
        match self.index.checked_add(len) {
            Some(end) if end <= self.data.len() => {
                let value = &self.data[self.index..end];
                self.index = end;
                Ok(value)
            }
            _ => Err(()),
        }
    }

    /// Try to read a VLUINT starting at the current index.
    ///
    /// Fails on truncated input and on values that do not fit in 64 bits.
    pub fn read_var_uint(&mut self) -> Result<u64, ()> {
        let mut shift: u32 = 0;
        let mut result: u64 = 0;

        loop {
            let byte = self.read_byte()?;
            let bits = (byte & 127) as u64;
            if shift >= 64 || (shift == 63 && bits > 1) {
                return Err(());
            }
            result |= bits << shift;
            shift += 7;

            if (byte & 128) == 0 {
                return Ok(result);
            }
        }
    }

    /// Try to read a NUL-terminated UTF-8 string starting at the current
    /// index. This string is returned as a slice so it just aliases the
    /// underlying memory.
    pub fn read_string(&mut self) -> Result<Cow<'a, str>, ()> {
        let start = self.index;

        while self.index < self.data.len() {
            if self.data[self.index] == 0 {
                self.index += 1;
                return Ok(String::from_utf8_lossy(&self.data[start..self.index - 1]));
            }

            self.index += 1;
        }

        Err(())
    }
}

/// A TauSchema byte buffer meant for writing.
///
/// Example usage:
///
/// ```
/// let mut bb = tauschema_codec::ByteBufferMut::new();
/// bb.write_string("🍕");
/// bb.write_var_uint(300);
/// assert_eq!(bb.data(), [240, 159, 141, 149, 0, 172, 2]);
/// ```
///
#[derive(Default)]
pub struct ByteBufferMut {
    data: Vec<u8>,
}

impl ByteBufferMut {
    /// Creates an empty ByteBufferMut ready for writing.
    pub fn new() -> ByteBufferMut {
        ByteBufferMut { data: vec![] }
    }

    /// Consumes this buffer and returns the underlying backing store. Use this
    /// to get the data out when you're done writing to the buffer.
    pub fn data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write a byte to the end of the buffer.
    pub fn write_byte(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Write a raw byte slice to the end of the buffer.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.data.extend_from_slice(value);
    }

    /// Write a VLUINT to the end of the buffer. The encoding is the shortest
    /// one: only the last byte has its high bit clear.
    pub fn write_var_uint(&mut self, mut value: u64) {
        loop {
            let byte = value as u8 & 127;
            value >>= 7;

            if value == 0 {
                self.write_byte(byte);
                return;
            }

            self.write_byte(byte | 128);
        }
    }

    /// Write a UTF-8 string followed by a NUL terminator.
    pub fn write_string(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
    }

    /// Write a length-framed TLV section: `VLUINT(section << 2 | 2)`,
    /// `VLUINT(payload length)` and the payload itself.
    pub fn write_section(&mut self, section: u64, payload: &[u8]) {
        self.write_var_uint(section << 2 | LC_LENGTH);
        self.write_var_uint(payload.len() as u64);
        self.write_bytes(payload);
    }

    /// Write the zero-length terminal marker.
    pub fn write_terminal(&mut self) {
        self.write_byte(TERMINAL);
    }
}

#[cfg(test)]
fn write_once(cb: fn(&mut ByteBufferMut)) -> Vec<u8> {
    let mut bb = ByteBufferMut::new();
    cb(&mut bb);
    bb.data()
}

#[test]
fn read_byte() {
    let read = |bytes| ByteBuffer::new(bytes).read_byte();
    assert_eq!(read(&[]), Err(()));
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[1]), Ok(1));
    assert_eq!(read(&[254]), Ok(254));
    assert_eq!(read(&[255]), Ok(255));
}

#[test]
fn read_bytes() {
    let read = |bytes, len| ByteBuffer::new(bytes).read_bytes(len);
    assert_eq!(read(&[], 0), Ok(vec![].as_slice()));
    assert_eq!(read(&[], 1), Err(()));
    assert_eq!(read(&[0], 0), Ok(vec![].as_slice()));
    assert_eq!(read(&[0], 1), Ok(vec![0].as_slice()));
    assert_eq!(read(&[0], usize::MAX), Err(()));

    let mut bb = ByteBuffer::new(&[1, 2, 3, 4, 5]);
    assert_eq!(bb.read_bytes(3), Ok(vec![1, 2, 3].as_slice()));
    assert_eq!(bb.read_bytes(2), Ok(vec![4, 5].as_slice()));
    assert_eq!(bb.read_bytes(1), Err(()));
    assert!(bb.is_empty());
}

#[test]
fn read_var_uint() {
    let read = |bytes| ByteBuffer::new(bytes).read_var_uint();
    assert_eq!(read(&[]), Err(()));
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[1]), Ok(1));
    assert_eq!(read(&[127]), Ok(127));
    assert_eq!(read(&[128]), Err(()));
    assert_eq!(read(&[128, 1]), Ok(128));
    assert_eq!(read(&[172, 2]), Ok(300));
    assert_eq!(read(&[255, 127]), Ok(16383));
    assert_eq!(read(&[128, 128, 1]), Ok(16384));
    assert_eq!(
        read(&[255, 255, 255, 255, 255, 255, 255, 255, 255, 1]),
        Ok(u64::MAX)
    );
    assert_eq!(read(&[255, 255, 255, 255, 255, 255, 255, 255, 255, 2]), Err(()));
    assert_eq!(
        read(&[128, 128, 128, 128, 128, 128, 128, 128, 128, 128, 1]),
        Err(())
    );
}

#[test]
fn read_string() {
    let read = |bytes| ByteBuffer::new(bytes).read_string();
    assert_eq!(read(&[]), Err(()));
    assert_eq!(read(&[0]), Ok(Cow::Borrowed("")));
    assert_eq!(read(&[97]), Err(()));
    assert_eq!(read(&[97, 0]), Ok(Cow::Borrowed("a")));
    assert_eq!(read(&[97, 98, 99, 0]), Ok(Cow::Borrowed("abc")));

    let mut bb = ByteBuffer::new(&[105, 110, 102, 111, 0, 0, 111, 0]);
    assert_eq!(bb.read_string(), Ok(Cow::Borrowed("info")));
    assert_eq!(bb.read_string(), Ok(Cow::Borrowed("")));
    assert_eq!(bb.read_string(), Ok(Cow::Borrowed("o")));
}

#[test]
fn write_var_uint() {
    assert_eq!(write_once(|bb| bb.write_var_uint(0)), [0]);
    assert_eq!(write_once(|bb| bb.write_var_uint(1)), [1]);
    assert_eq!(write_once(|bb| bb.write_var_uint(127)), [127]);
    assert_eq!(write_once(|bb| bb.write_var_uint(128)), [128, 1]);
    assert_eq!(write_once(|bb| bb.write_var_uint(300)), [172, 2]);
    assert_eq!(write_once(|bb| bb.write_var_uint(16383)), [255, 127]);
    assert_eq!(write_once(|bb| bb.write_var_uint(16384)), [128, 128, 1]);
    assert_eq!(
        write_once(|bb| bb.write_var_uint(u64::MAX)),
        [255, 255, 255, 255, 255, 255, 255, 255, 255, 1]
    );
}

#[test]
fn vluint_len_matches_writer() {
    for value in [0, 1, 127, 128, 16383, 16384, 1 << 21, (1 << 28) - 1, u64::MAX] {
        let mut bb = ByteBufferMut::new();
        bb.write_var_uint(value);
        assert_eq!(vluint_len(value), bb.len(), "width of {}", value);
    }
    assert_eq!(vluint_len(u64::MAX), VLUINT_MAX_LEN);
}

#[test]
fn write_string() {
    assert_eq!(write_once(|bb| bb.write_string("")), [0]);
    assert_eq!(write_once(|bb| bb.write_string("123")), [49, 50, 51, 0]);
    assert_eq!(write_once(|bb| bb.write_string("🍕")), [240, 159, 141, 149, 0]);
}

#[test]
fn write_section_and_terminal() {
    let mut bb = ByteBufferMut::new();
    bb.write_section(3, &[0, 0, 0, 0, 0]);
    bb.write_section(1, &[]);
    bb.write_terminal();
    assert_eq!(bb.data(), [14, 5, 0, 0, 0, 0, 0, 6, 0, 7]);
}
