#![cfg(test)]

use proptest::prelude::*;
use tauschema_codec::{SchemaReader, TypeCode};
use tauschema_compiler::{decode_compiled, CompileOptions, FlatRow, Schema, SchemaError, TERMINAL};

const DEVICE_INFO: &str = "
# device identification record
name : COLLECTION
  orig : UINT-32 = 2
  data : BLOB = 1
END

info : COLLECTION = 1
  name : name = 1
  msglen : UINT-32 = 8
  version : name = 2
  serial : name = 3
  vendor : name = 4
  schtxt : name = 5
  schurl : name = 6
  schbin : VARIADIC = 7
    schrow : COLLECTION = 1
      item : UINT-16 = 1
      name : name = 2
      desc : name = 3
      type : UINT-8 = 4
      sub : UINT-16 = 5
      next : UINT-16 = 6
      idx : UINT-16 = 7
    END
  END
  demostring : UTF8 = 9
END
";

const DEVICE_INFO_BIN: [u8; 108] = [
    14, 105, //
    0, 0, 0, 5, 0, //
    1, 5, 17, 10, 0, //
    1, 8, 17, 15, 25, //
    2, 10, 5, 0, 20, //
    1, 1, 16, 0, 0, //
    8, 7, 5, 0, 30, //
    2, 19, 17, 15, 35, //
    3, 15, 17, 15, 40, //
    4, 18, 17, 15, 45, //
    5, 13, 17, 15, 50, //
    6, 14, 17, 15, 55, //
    7, 11, 18, 60, 100, //
    1, 12, 17, 65, 0, //
    1, 6, 4, 0, 70, //
    2, 8, 17, 15, 75, //
    3, 3, 17, 15, 80, //
    4, 17, 3, 0, 85, //
    5, 16, 4, 0, 90, //
    6, 9, 4, 0, 95, //
    7, 4, 4, 0, 0, //
    9, 2, 15, 0, 0, //
    7,
];

const COMPACT: CompileOptions = CompileOptions {
    names:        false,
    descriptions: false,
};

fn assert_round_trip(rows: &[FlatRow], bytes: &[u8]) {
    let decoded = decode_compiled(bytes).expect("decode_compiled failed");
    assert_eq!(decoded.len(), rows.len());
    for (flat, back) in rows.iter().zip(&decoded) {
        assert_eq!(back.index, flat.index);
        assert_eq!(back.tag, flat.tag);
        assert_eq!(back.ntype, Some(flat.ntype));
        assert_eq!(back.sub, flat.sub);
        assert_eq!(back.next, flat.next);
    }
}

#[test]
fn test_device_info_matches_reference_bytes() {
    let schema = Schema::parse(DEVICE_INFO).expect("parse failed");
    let compiled = schema.compile(COMPACT);

    assert_eq!(compiled.bytes, DEVICE_INFO_BIN.to_vec());
    assert_eq!(compiled.max_tag, 36);
    assert_eq!(compiled.row_offsets.len(), 21);
    assert_eq!(compiled.row_offsets[11], 55);

    // Compact names are ordinals in byte order
    assert_eq!(compiled.names.get(""), Some(&0));
    assert_eq!(compiled.names.get("schbin"), Some(&11));
    assert_eq!(compiled.names.get("version"), Some(&19));

    assert_round_trip(schema.flatten(), &compiled.bytes);
}

#[test]
fn test_device_info_shared_scope_rows() {
    let schema = Schema::parse(DEVICE_INFO).expect("parse failed");
    let rows = schema.flatten();

    // Every alias of `name` points at the single orig/data row pair
    let aliases: Vec<&FlatRow> = rows.iter().filter(|r| r.sub == 3).collect();
    assert_eq!(aliases.len(), 8);
    assert_eq!(rows.iter().filter(|r| r.name == "orig").count(), 1);
    assert_eq!(rows[0].next, TERMINAL);
    assert_eq!(rows[20].name, "demostring");
    assert_eq!(rows[20].ntype, TypeCode::Utf8);
}

#[test]
fn test_full_mode_pools() {
    let schema = Schema::parse(DEVICE_INFO).expect("parse failed");
    let compiled = schema.compile(CompileOptions::default());
    let reader = SchemaReader::new(&compiled.bytes).expect("reader failed");
    assert!(reader.has_names());
    assert!(reader.has_descriptions());

    for (name, &position) in &compiled.names {
        assert_eq!(reader.name(position), Some(name.as_str()));
        assert_eq!(reader.name_position(name), Some(position));
    }
    assert_eq!(reader.name_position("missing"), None);

    let decoded = decode_compiled(&compiled.bytes).expect("decode_compiled failed");
    for (flat, back) in schema.flatten().iter().zip(&decoded) {
        assert_eq!(back.name.as_deref(), Some(flat.name.as_str()));
        assert_eq!(back.description.as_deref(), Some(flat.description.as_str()));
    }
    assert_round_trip(schema.flatten(), &compiled.bytes);
}

#[test]
fn test_names_without_descriptions() {
    let schema = Schema::parse(DEVICE_INFO).expect("parse failed");
    let opts = CompileOptions { names: true, descriptions: false };
    let compiled = schema.compile(opts);
    let reader = SchemaReader::new(&compiled.bytes).expect("reader failed");
    assert!(reader.has_names());
    assert!(!reader.has_descriptions());
    assert!(compiled.descriptions.is_empty());

    let info = reader.row_at(compiled.row_offsets[1]).expect("row_at failed");
    assert_eq!(reader.name(info.name), Some("info"));
    let schbin = reader.child(&info, 7).expect("child failed").expect("no tag 7");
    assert_eq!(reader.name(schbin.name), Some("schbin"));
    assert_eq!(reader.children(&schbin).expect("children failed").len(), 1);
}

#[test]
fn test_descriptions_in_pool() {
    let text = "
reading : COLLECTION = 1 # one sample
  value : FLOAT = 1 # measured value
  # in volts
  when : UINT-64 = 2
END
";
    let schema = Schema::parse(text).expect("parse failed");
    let compiled = schema.compile(CompileOptions::default());
    assert!(compiled.descriptions.contains_key(" one sample"));
    assert!(compiled.descriptions.contains_key(" measured value\n in volts"));
    assert_eq!(compiled.descriptions.get(""), Some(&0));

    let decoded = decode_compiled(&compiled.bytes).expect("decode_compiled failed");
    assert_eq!(decoded[2].description.as_deref(), Some(" measured value\n in volts"));
    assert_eq!(decoded[3].description.as_deref(), Some(""));
}

#[test]
fn test_many_rows_reach_a_fixed_point() {
    let mut text = String::from("big : COLLECTION = 1\n");
    for i in 1..=300 {
        text.push_str(&format!("  field_{} : UINT = {}\n", i, i));
    }
    text.push_str("END\nlast : BOOL = 2\n");

    let schema = Schema::parse(&text).expect("parse failed");
    for opts in [COMPACT, CompileOptions::default()] {
        let compiled = schema.compile(opts);
        assert!(compiled.passes >= 2);
        assert_eq!(compiled.max_tag, 1200);
        assert_round_trip(schema.flatten(), &compiled.bytes);

        let reader = SchemaReader::new(&compiled.bytes).expect("reader failed");
        let offsets: Vec<u64> = reader.rows().expect("rows failed").iter().map(|r| r.offset).collect();
        assert_eq!(offsets, compiled.row_offsets);
        // `last` sits past the whole field list
        assert!(compiled.row_offsets[302] > 1_000);
    }
}

#[test]
fn test_recursive_schema_round_trip() {
    let text = "
tree : COLLECTION = 1
  label : UTF8 = 1
  left : tree = 2
  right : tree = 3
END
";
    let schema = Schema::parse(text).expect("parse failed");
    let rows = schema.flatten();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[3].sub, 2);
    assert_eq!(rows[4].sub, 2);
    assert_round_trip(rows, &schema.compile(CompileOptions::default()).bytes);
}

#[test]
fn test_largest_tag() {
    let schema = Schema::parse("a : UINT = 4611686018427387903\n").expect("parse failed");
    let compiled = schema.compile(CompileOptions::default());
    assert_eq!(compiled.max_tag, 18446744073709551612);
    let decoded = decode_compiled(&compiled.bytes).expect("decode failed");
    assert_eq!(decoded[1].tag, 4611686018427387903);

    match Schema::parse("a : UINT = 18446744073709551615\n") {
        Err(SchemaError::Grammar { line: 1, .. }) => {}
        other => panic!("unexpected {:?}", other.map(|s| s.flatten().len())),
    }
}

fn generated_schema(groups: &[usize]) -> String {
    let mut text = String::new();
    for (g, &size) in groups.iter().enumerate() {
        text.push_str(&format!("group_number_{} : COLLECTION = {}\n", g, g + 1));
        for f in 0..size {
            text.push_str(&format!("  member_of_group_{}_{} : SINT-32 = {}\n", g, f, f * 3 + 1));
        }
        text.push_str("END\n");
    }
    text
}

proptest! {
    #[test]
    fn compiled_rows_round_trip(groups in prop::collection::vec(0usize..40, 1..8)) {
        let schema = Schema::parse(&generated_schema(&groups)).expect("parse failed");
        let rows = schema.flatten();
        prop_assert_eq!(rows.len(), 1 + groups.len() + groups.iter().sum::<usize>());

        for opts in [COMPACT, CompileOptions::default()] {
            let compiled = schema.compile(opts);
            let decoded = decode_compiled(&compiled.bytes).expect("decode_compiled failed");
            for (flat, back) in rows.iter().zip(&decoded) {
                prop_assert_eq!((back.tag, back.sub, back.next), (flat.tag, flat.sub, flat.next));
                if opts.names {
                    prop_assert_eq!(back.name.as_deref(), Some(flat.name.as_str()));
                }
            }
        }
    }
}
