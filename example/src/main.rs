// example/src/main.rs

use serde_json::json;
use tauschema::*;

const DEVICE_INFO: &str = "
# shared shape of every identification string
name : COLLECTION
  orig : UINT-32 = 2  # where the string came from
  data : BLOB = 1
END

info : COLLECTION = 1 # device identification record
  name : name = 1
  msglen : UINT-32 = 8
  version : name = 2
  serial : name = 3
  vendor : name = 4
  demostring : UTF8 = 9
END
";

fn main() -> Result<(), SchemaError> {
    let schema = Schema::parse(DEVICE_INFO)?;

    // Data as it might arrive from a peer: one bad field, one unknown field.
    let data = Value::from(json!({
        "info": {
            "name": {"orig": 1, "data": "tau-dev"},
            "msglen": -12,
            "vendor": {"data": "acme", "origin": "lab"},
            "demostring": "hello"
        }
    }));

    let opts = ValidateOptions {
        report: true,
        ..Default::default()
    };
    let result = schema.validate(&data, &opts)?;
    println!("verdict     = {:?} ({})", result.verdict, result.verdict.code());
    for line in &result.diagnostics {
        println!("  {}", line);
    }
    if let Some(repaired) = data.to_json() {
        println!("repaired    = {}", repaired);
    }

    // Compile twice: compact for the wire, full for inspection.
    let compact = schema.compile(CompileOptions {
        names:        false,
        descriptions: false,
    });
    let full = schema.compile(CompileOptions::default());
    println!("rows        = {}", schema.flatten().len());
    println!("compact     = {} bytes, max tag {}", compact.bytes.len(), compact.max_tag);
    println!("full        = {} bytes in {} passes", full.bytes.len(), full.passes);

    let reader = SchemaReader::new(&full.bytes)?;
    for row in reader.rows()? {
        println!(
            "  @{:<3} tag={:<2} {:<10} {:<10} {}",
            row.offset,
            row.tag,
            reader.name(row.name).unwrap_or("?"),
            TypeCode::from_code(row.ntype).map_or("?", TypeCode::keyword),
            row.description.and_then(|d| reader.description(d)).unwrap_or("").trim()
        );
    }

    Ok(())
}
