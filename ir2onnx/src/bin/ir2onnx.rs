//! `ir2onnx`: convert an IR graph and its weights into an ONNX build script.
//!
//! Usage:
//!   ir2onnx model.json --weights model_weights.json -o model_onnx.py
//!   ir2onnx model.json --weights model_weights.json --format json
//!   RUST_LOG=debug ir2onnx model.json --weights w.json --strict

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};

use ir2onnx::emit::{render_json, render_python};
use ir2onnx::{emit, parse, ConstantMode, EmitOptions, Error, Result, WeightStore};

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// Python script using onnx.helper
    Python,
    /// JSON dump of the lowered program
    Json,
}

#[derive(Parser)]
#[command(name = "ir2onnx")]
#[command(version)]
#[command(about = "Lower an IR graph into an ONNX model-building program")]
struct Cli {
    /// IR graph file (protobuf JSON)
    #[arg(value_name = "IR_FILE")]
    ir: PathBuf,

    /// Weight file (JSON, node -> role -> array)
    #[arg(short, long, value_name = "FILE")]
    weights: Option<PathBuf>,

    /// Output path (stdout when absent)
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "python")]
    format: Format,

    /// Name given to the emitted graph
    #[arg(long, default_value = ir2onnx::emit::DEFAULT_GRAPH_NAME)]
    graph_name: String,

    /// Emit weights as graph initializers instead of Constant nodes
    #[arg(long)]
    initializers: bool,

    /// Fail if any node could not be lowered
    #[arg(long)]
    strict: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let graph = parse::load_graph(&cli.ir)?;
    let weights = match &cli.weights {
        Some(path) => WeightStore::load(path)?,
        None => WeightStore::new(),
    };

    let options = EmitOptions {
        graph_name: cli.graph_name.clone(),
        constants: if cli.initializers {
            ConstantMode::Initializer
        } else {
            ConstantMode::Node
        },
    };
    let emitted = emit(&graph, &weights, &options)?;

    for skipped in &emitted.skipped {
        log::warn!("not lowered: {} [{}]: {}", skipped.name, skipped.op, skipped.reason);
    }
    for dangling in emitted.program.dangling_references() {
        log::warn!(
            "{} reads '{}', which the program never defines",
            dangling.statement,
            dangling.tensor
        );
    }

    let text = match cli.format {
        Format::Python => render_python(&emitted.program),
        Format::Json => render_json(&emitted.program)?,
    };

    match &cli.out {
        Some(path) => {
            fs::write(path, text).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            eprintln!("Generated {}", path.display());
        }
        None => print!("{text}"),
    }

    if cli.strict && !emitted.is_complete() {
        eprintln!(
            "error: {} node(s) could not be lowered",
            emitted.skipped.len()
        );
        process::exit(2);
    }
    Ok(())
}
