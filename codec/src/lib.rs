//! Runtime helpers for the TauSchema binary format.
//!
//! - `bb`: VLUINT byte buffers and TLV framing,
//! - `ntype`: the fixed table of type codes,
//! - `value`: the dynamic data model checked by the validator,
//! - `schema`: a zero-copy reader for compiled schema tables.
//!
//! ```
//! use tauschema_codec::*;
//!
//! let mut bb = ByteBufferMut::new();
//! bb.write_section(SECTION_ROWS, &[0, 0, 0, 0, 0]);
//! bb.write_terminal();
//!
//! let blob = bb.data();
//! let schema = SchemaReader::new(&blob).unwrap();
//! let root = schema.row_at(0).unwrap();
//! assert_eq!(TypeCode::from_code(root.ntype), Some(TypeCode::None));
//! ```

pub mod bb;
pub mod ntype;
pub mod schema;
pub mod value;

pub use bb::*;
pub use ntype::*;
pub use schema::*;
pub use value::*;
