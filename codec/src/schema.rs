use crate::bb::{ByteBuffer, LC_END, LC_LENGTH};
use thiserror::Error;

/// Section numbers of a compiled schema TLV stream.
pub const SECTION_NAMES: u64 = 1;
pub const SECTION_DESCRIPTIONS: u64 = 2;
pub const SECTION_ROWS: u64 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("unsupported TLV framing {lc} for tag {tag} at byte {offset}")]
    Framing { tag: u64, lc: u64, offset: usize },

    #[error("schema has no rows section")]
    MissingRows,

    #[error("row offset {0} is outside of the rows section")]
    BadOffset(u64),
}

/// One decoded flat-tree row. `sub` and `next` are byte offsets into the
/// rows section, 0 when there is no link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatRecord {
    pub offset: u64,
    pub tag: u64,
    pub name: u64,
    pub ntype: u64,
    pub sub: u64,
    pub next: u64,
    pub description: Option<u64>,
}

/// Read-only view over a compiled schema. Nothing is copied: the pools and
/// the rows alias the input buffer.
///
/// ```
/// let blob = [14, 5, 0, 0, 0, 0, 0, 7];
/// let schema = tauschema_codec::SchemaReader::new(&blob).unwrap();
/// assert_eq!(schema.rows().unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SchemaReader<'a> {
    rows: &'a [u8],
    names: Option<&'a [u8]>,
    descriptions: Option<&'a [u8]>,
}

impl<'a> SchemaReader<'a> {
    pub fn new(tlv: &'a [u8]) -> Result<SchemaReader<'a>, CodecError> {
        let mut bb = ByteBuffer::new(tlv);
        let mut rows = None;
        let mut names = None;
        let mut descriptions = None;

        while !bb.is_empty() {
            let offset = bb.index();
            let head = bb.read_var_uint().map_err(|_| CodecError::Truncated("section tag"))?;
            let (tag, lc) = (head >> 2, head & 3);
            if lc == LC_END {
                break;
            }
            if lc != LC_LENGTH {
                return Err(CodecError::Framing { tag, lc, offset });
            }
            let len = bb.read_var_uint().map_err(|_| CodecError::Truncated("section length"))?;
            let len = usize::try_from(len).map_err(|_| CodecError::Truncated("section payload"))?;
            let payload = bb.read_bytes(len).map_err(|_| CodecError::Truncated("section payload"))?;
            match tag {
                SECTION_NAMES => names = Some(payload),
                SECTION_DESCRIPTIONS => descriptions = Some(payload),
                SECTION_ROWS => rows = Some(payload),
                // unknown sections are skipped
                _ => {}
            }
        }

        Ok(SchemaReader {
            rows: rows.ok_or(CodecError::MissingRows)?,
            names,
            descriptions,
        })
    }

    /// Raw rows payload.
    pub fn rows_payload(&self) -> &'a [u8] {
        self.rows
    }

    pub fn has_names(&self) -> bool {
        self.names.is_some()
    }

    /// Rows carry a sixth field only when descriptions were compiled in.
    pub fn has_descriptions(&self) -> bool {
        self.descriptions.is_some()
    }

    /// Decode the row starting at `offset` inside the rows section.
    pub fn row_at(&self, offset: u64) -> Result<FlatRecord, CodecError> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&o| o < self.rows.len())
            .ok_or(CodecError::BadOffset(offset))?;
        let mut bb = ByteBuffer::new(self.rows);
        bb.seek(start);
        self.decode_row(&mut bb)
    }

    /// Decode every row in order.
    pub fn rows(&self) -> Result<Vec<FlatRecord>, CodecError> {
        let mut bb = ByteBuffer::new(self.rows);
        let mut out = Vec::new();
        while !bb.is_empty() {
            out.push(self.decode_row(&mut bb)?);
        }
        Ok(out)
    }

    fn decode_row(&self, bb: &mut ByteBuffer<'a>) -> Result<FlatRecord, CodecError> {
        let offset = bb.index() as u64;
        let mut field = || bb.read_var_uint().map_err(|_| CodecError::Truncated("row"));
        Ok(FlatRecord {
            offset,
            tag: field()?,
            name: field()?,
            ntype: field()?,
            sub: field()?,
            next: field()?,
            description: if self.has_descriptions() { Some(field()?) } else { None },
        })
    }

    /// The children of a row, in declaration order.
    pub fn children(&self, row: &FlatRecord) -> Result<Vec<FlatRecord>, CodecError> {
        let mut out = Vec::new();
        let mut link = row.sub;
        while link != 0 {
            let child = self.row_at(link)?;
            link = child.next;
            out.push(child);
            if out.len() > self.rows.len() {
                // a well-formed table never links more rows than it has bytes
                return Err(CodecError::BadOffset(link));
            }
        }
        Ok(out)
    }

    /// Find the child of `row` that carries `tag`.
    pub fn child(&self, row: &FlatRecord, tag: u64) -> Result<Option<FlatRecord>, CodecError> {
        Ok(self.children(row)?.into_iter().find(|c| c.tag == tag))
    }

    /// Name at a byte position of the names pool.
    pub fn name(&self, position: u64) -> Option<&'a str> {
        pool_str(self.names?, position)
    }

    /// Description at a byte position of the descriptions pool.
    pub fn description(&self, position: u64) -> Option<&'a str> {
        pool_str(self.descriptions?, position)
    }

    /// Byte position of `name` in the sorted names pool.
    pub fn name_position(&self, name: &str) -> Option<u64> {
        let pool = self.names?;
        let starts = pool_starts(pool);
        starts
            .binary_search_by(|&start| {
                pool_str(pool, start as u64)
                    .unwrap_or_default()
                    .as_bytes()
                    .cmp(name.as_bytes())
            })
            .ok()
            .map(|i| starts[i] as u64)
    }
}

fn pool_starts(pool: &[u8]) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut start = 0;
    for (i, &b) in pool.iter().enumerate() {
        if b == 0 {
            starts.push(start);
            start = i + 1;
        }
    }
    starts
}

fn pool_str(pool: &[u8], position: u64) -> Option<&str> {
    let start = usize::try_from(position).ok().filter(|&p| p < pool.len())?;
    let len = pool[start..].iter().position(|&b| b == 0)?;
    std::str::from_utf8(&pool[start..start + len]).ok()
}
