use crate::{
    error::SchemaError,
    flatten::{FlatRow, TERMINAL},
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tauschema_codec::{
    vluint_len, ByteBufferMut, CodecError, SchemaReader, TypeCode, SECTION_DESCRIPTIONS, SECTION_NAMES,
    SECTION_ROWS,
};
use tracing::debug;

/// Which string pools are written to the compiled stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CompileOptions {
    /// Emit the NAMES section. Without it, name positions are ordinals.
    pub names:        bool,
    /// Emit the DESCRIPTIONS section and the per-row description field.
    pub descriptions: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            names:        true,
            descriptions: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledSchema {
    /// The TLV stream.
    pub bytes:        Vec<u8>,
    /// Largest tag times 4.
    pub max_tag:      u64,
    /// Byte offset of every row inside the ROWS payload.
    pub row_offsets:  Vec<u64>,
    pub names:        BTreeMap<String, u64>,
    /// Empty when descriptions are disabled.
    pub descriptions: BTreeMap<String, u64>,
    /// Fixed-point passes needed to settle the row offsets.
    pub passes:       usize,
}

/// A row read back from a compiled stream, links turned into row indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedRow {
    pub index:       usize,
    pub offset:      u64,
    pub tag:         u64,
    /// `None` for a type code outside the known table.
    pub ntype:       Option<TypeCode>,
    pub name:        Option<String>,
    pub description: Option<String>,
    pub sub:         usize,
    pub next:        usize,
}

/// Sorted set of distinct strings, always holding `""`.
#[derive(Debug, Default)]
struct StringPool {
    positions: BTreeMap<String, u64>,
    blob:      Vec<u8>,
}

impl StringPool {
    /// With `full`, positions are byte offsets into the NUL separated blob;
    /// otherwise they are ordinals and no blob is kept.
    fn build<'a>(strings: impl IntoIterator<Item = &'a str>, full: bool) -> StringPool {
        let mut sorted: BTreeSet<&str> = strings.into_iter().collect();
        sorted.insert("");

        let mut blob = ByteBufferMut::new();
        let mut positions = BTreeMap::new();
        for (ordinal, text) in sorted.into_iter().enumerate() {
            let position = if full { blob.len() as u64 } else { ordinal as u64 };
            positions.insert(text.to_string(), position);
            if full {
                blob.write_string(text);
            }
        }
        StringPool {
            positions,
            blob: blob.data(),
        }
    }

    fn position(&self, text: &str) -> u64 {
        self.positions.get(text).copied().unwrap_or(0)
    }
}

/// Row offsets settled to a fixed point.
struct Layout<'r> {
    rows:    &'r [FlatRow],
    /// Encoded width of the fields that do not depend on offsets.
    statics: Vec<usize>,
    offsets: Vec<u64>,
}

impl<'r> Layout<'r> {
    fn new(rows: &'r [FlatRow], statics: Vec<usize>) -> Layout<'r> {
        Layout {
            rows,
            statics,
            offsets: vec![0; rows.len()],
        }
    }

    /// Wire value of a link to row `target`.
    fn link(&self, target: usize) -> u64 {
        if target == 0 || target == TERMINAL {
            return 0;
        }
        self.offsets.get(target).copied().unwrap_or(0)
    }

    fn row_size(&self, i: usize) -> u64 {
        let row = &self.rows[i];
        (self.statics[i] + vluint_len(self.link(row.sub)) + vluint_len(self.link(row.next))) as u64
    }

    /// Re-measures every row until no offset moves. Offsets only grow, and a
    /// link only widens when its target crosses a power of 128, so this ends.
    fn resolve(&mut self) -> usize {
        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;
            let mut pos = 0;
            for i in 0..self.rows.len() {
                if self.offsets[i] != pos {
                    self.offsets[i] = pos;
                    changed = true;
                }
                pos += self.row_size(i);
            }
            if !changed {
                return passes;
            }
        }
    }
}

/// Encode flattened rows into the TLV stream.
pub fn compile_rows(rows: &[FlatRow], opts: CompileOptions) -> CompiledSchema {
    let names = StringPool::build(rows.iter().map(|r| r.name.as_str()), opts.names);
    let descriptions = if opts.descriptions {
        StringPool::build(rows.iter().map(|r| r.description.as_str()), true)
    } else {
        StringPool::default()
    };

    let statics = rows
        .iter()
        .map(|row| {
            let mut size = vluint_len(row.tag)
                + vluint_len(names.position(&row.name))
                + vluint_len(row.ntype.code() as u64);
            if opts.descriptions {
                size += vluint_len(descriptions.position(&row.description));
            }
            size
        })
        .collect();
    let mut layout = Layout::new(rows, statics);
    let passes = layout.resolve();

    let mut payload = ByteBufferMut::new();
    for (i, row) in rows.iter().enumerate() {
        debug_assert_eq!(payload.len() as u64, layout.offsets[i]);
        payload.write_var_uint(row.tag);
        payload.write_var_uint(names.position(&row.name));
        payload.write_var_uint(row.ntype.code() as u64);
        payload.write_var_uint(layout.link(row.sub));
        payload.write_var_uint(layout.link(row.next));
        if opts.descriptions {
            payload.write_var_uint(descriptions.position(&row.description));
        }
    }

    let mut bb = ByteBufferMut::new();
    bb.write_section(SECTION_ROWS, &payload.data());
    if opts.names {
        bb.write_section(SECTION_NAMES, &names.blob);
    }
    if opts.descriptions {
        bb.write_section(SECTION_DESCRIPTIONS, &descriptions.blob);
    }
    bb.write_terminal();
    let bytes = bb.data();

    let max_tag = rows.iter().map(|r| r.tag).max().unwrap_or(0).saturating_mul(4);
    debug!(rows = rows.len(), passes, bytes = bytes.len(), "compiled schema");

    CompiledSchema {
        bytes,
        max_tag,
        row_offsets: layout.offsets,
        names: names.positions,
        descriptions: descriptions.positions,
        passes,
    }
}

/// Read a compiled stream back into rows.
pub fn decode_compiled(bytes: &[u8]) -> Result<Vec<DecodedRow>, SchemaError> {
    let reader = SchemaReader::new(bytes)?;
    let records = reader.rows()?;
    let index_of: HashMap<u64, usize> = records.iter().enumerate().map(|(i, r)| (r.offset, i)).collect();
    let resolve = |offset: u64| -> Result<usize, SchemaError> {
        if offset == 0 {
            return Ok(0);
        }
        index_of
            .get(&offset)
            .copied()
            .ok_or(SchemaError::Decode(CodecError::BadOffset(offset)))
    };

    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let next = match (index, record.next) {
            (0, 0) => TERMINAL,
            (_, next) => resolve(next)?,
        };
        rows.push(DecodedRow {
            index,
            offset: record.offset,
            tag: record.tag,
            ntype: TypeCode::from_code(record.ntype),
            name: reader.name(record.name).map(String::from),
            description: record
                .description
                .and_then(|d| reader.description(d))
                .map(String::from),
            sub: resolve(record.sub)?,
            next,
        });
    }
    Ok(rows)
}
