use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use tauschema::{decode_to_json, CompileOptions, Schema, SchemaError, ValidateOptions, Value, Verdict};

#[derive(Parser, Debug)]
#[command(name = "tausch")]
#[command(about = "Check, compile and validate against TauSchema files", long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Reject scopes left open at the end of a file.
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a `.tsch` file and report any error
    Check {
        /// Input `.tsch` file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Compile a `.tsch` file to a binary `.tsch.bin` table
    Compile {
        /// Input `.tsch` file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to same name + `.tsch.bin`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Leave out the NAMES section
        #[arg(long)]
        no_names: bool,

        /// Leave out the DESCRIPTIONS section
        #[arg(long)]
        no_descriptions: bool,
    },

    /// Decode a compiled table to JSON (printed to stdout)
    Decode {
        /// Input `.tsch.bin` file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Validate a JSON document, printing the verdict and the repaired document
    Validate {
        /// Schema `.tsch` file
        #[arg(short, long)]
        schema: PathBuf,

        /// JSON document to validate
        #[arg(short, long)]
        data: PathBuf,

        /// Stop at the first defect instead of repairing
        #[arg(long)]
        throw: bool,

        /// Do not report individual defects
        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(1)
        }
    }
}

fn load(path: &Path, strict: bool) -> Result<Schema, SchemaError> {
    if strict {
        Schema::load_strict(path)
    } else {
        Schema::load(path)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SchemaError + '_ {
    move |source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Default output path: the input with `.tsch.bin` as extension.
fn output_path(input: &Path, output: Option<&PathBuf>) -> PathBuf {
    match output {
        Some(o) => o.clone(),
        None => input.with_extension("tsch.bin"),
    }
}

fn run(cli: &Cli) -> Result<u8, SchemaError> {
    match &cli.command {
        Commands::Check { input } => {
            let schema = load(input, cli.strict)?;
            println!("{}: ok, {} rows", input.display(), schema.flatten().len());
            Ok(0)
        }

        Commands::Compile {
            input,
            output,
            no_names,
            no_descriptions,
        } => {
            let schema = load(input, cli.strict)?;
            let compiled = schema.compile(CompileOptions {
                names:        !no_names,
                descriptions: !no_descriptions,
            });
            let out_path = output_path(input, output.as_ref());
            fs::write(&out_path, &compiled.bytes).map_err(io_error(&out_path))?;
            println!(
                "Compiled {} → {} ({} bytes, max tag {})",
                input.display(),
                out_path.display(),
                compiled.bytes.len(),
                compiled.max_tag
            );
            Ok(0)
        }

        Commands::Decode { input } => {
            let data = fs::read(input).map_err(io_error(input))?;
            println!("{}", decode_to_json(&data)?);
            Ok(0)
        }

        Commands::Validate {
            schema,
            data,
            throw,
            quiet,
        } => {
            let schema = load(schema, cli.strict)?;
            let text = fs::read_to_string(data).map_err(io_error(data))?;
            let value = Value::from(serde_json::from_str::<serde_json::Value>(&text)?);

            let opts = ValidateOptions {
                throw: *throw,
                report: !quiet,
                ..Default::default()
            };
            let result = schema.validate(&value, &opts)?;
            println!("{}", result.verdict.code());
            if let Some(json) = value.to_json() {
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            Ok(match result.verdict {
                Verdict::Trusted => 0,
                Verdict::Repaired => 2,
                Verdict::Distrusted => 3,
            })
        }
    }
}
