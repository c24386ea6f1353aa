//! tauschema
//!
//! Everything needed to load TauSchema files, validate data against them and
//! produce or read compiled schema tables.
//!
//! - `Schema` facade and the compiler API (re-exported from the compiler)
//! - `Value`, `SchemaReader` and the VLUINT buffers (re-exported from the codec)
//! - `decode_to_json` for inspecting a compiled table

pub use tauschema_codec::{ByteBuffer, ByteBufferMut, SchemaReader, TypeCode, Value};
pub use tauschema_compiler::error::SchemaError;
pub use tauschema_compiler::{
    CompileOptions, CompiledSchema, DecodedRow, FlatRow, Schema, ValidateOptions, Validation, Verdict,
};

/// Decode a compiled schema table into a pretty-printed JSON string.
pub fn decode_to_json(buffer: &[u8]) -> Result<String, SchemaError> {
    let rows = tauschema_compiler::decode_compiled(buffer)?;
    Ok(serde_json::to_string_pretty(&rows)?)
}

pub mod error {
    pub use tauschema_compiler::error::SchemaError;
    pub use tauschema_codec::CodecError;
}

pub mod codec {
    pub use tauschema_codec::*;
}

pub mod compiler {
    pub use tauschema_compiler::*;
}
