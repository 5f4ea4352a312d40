use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

use esl::demos::Demo;
use esl::memory::Memory;
use esl::model::{BuildReport, Layout, Model};
use esl::persist;

#[derive(Parser)]
#[command(
    name = "esl",
    version,
    about = "Compile step expressions into vectorized models with sparse adaptive memory"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a demo model and write it to disk (lists demos when no name is given)
    Demo {
        /// Demo name
        name: Option<Demo>,
        /// Output model file
        #[arg(short, long, required_unless_present = "list")]
        output: Option<PathBuf>,
        /// Also write the demo's initial memory
        #[arg(long, value_name = "PATH")]
        memory: Option<PathBuf>,
        /// List available demos
        #[arg(long)]
        list: bool,
    },
    /// Show the layout and stepper statistics of a model file
    Inspect {
        /// Model file
        model: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Step a model once per stdin line of comma-separated inputs
    Run {
        /// Model file
        model: PathBuf,
        /// Memory file to start from
        #[arg(long, value_name = "PATH")]
        memory: Option<PathBuf>,
        /// Initial states (restored models start at zero)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        states: Option<Vec<f32>>,
        /// Seed for the random taps
        #[arg(long)]
        seed: Option<u64>,
        /// Write the final memory here
        #[arg(long, value_name = "PATH")]
        save_memory: Option<PathBuf>,
    },
    /// Show statistics of a memory file
    Memory {
        /// Memory file
        file: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Increment and fetch a box of a memory file
    Probe {
        /// Memory file
        file: PathBuf,
        /// Box center, one value per position element
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        position: Vec<f32>,
        /// Box extent per axis as base-2 logarithms
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        size: Vec<f32>,
        /// Amount to add (defaults to zero)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        increment: Option<Vec<f32>>,
        /// Save the updated memory back to the file
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Demo {
            name,
            output,
            memory,
            list,
        } => cmd_demo(name, output, memory, list),
        Command::Inspect { model, json } => cmd_inspect(&model, json),
        Command::Run {
            model,
            memory,
            states,
            seed,
            save_memory,
        } => cmd_run(&model, memory, states, seed, save_memory),
        Command::Memory { file, json } => cmd_memory(&file, json),
        Command::Probe {
            file,
            position,
            size,
            increment,
            write,
        } => cmd_probe(&file, &position, &size, increment, write),
    }
}

// ─── Helpers ───────────────────────────────────────────────────────

fn or_exit<T>(result: esl::Result<T>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("error: cannot serialize report: {}", e);
            process::exit(1);
        }
    }
}

fn join(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_inputs(line: &str) -> Result<Vec<f32>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    line.split(',')
        .map(|field| {
            let field = field.trim();
            field
                .parse::<f32>()
                .map_err(|_| format!("'{}' is not a number", field))
        })
        .collect()
}

// ─── Commands ──────────────────────────────────────────────────────

fn cmd_demo(name: Option<Demo>, output: Option<PathBuf>, memory: Option<PathBuf>, list: bool) {
    let (Some(demo), Some(output), false) = (name, output, list) else {
        for demo in Demo::ALL {
            println!("{:<12} {}", demo.name(), demo.description());
        }
        return;
    };

    let model = or_exit(demo.build());
    or_exit(persist::save_model(&output, &model));
    eprintln!("Wrote {} -> {}", demo, output.display());

    match memory {
        Some(path) => {
            or_exit(persist::save_memory(&path, model.memory()));
            eprintln!("Wrote memory -> {}", path.display());
        }
        None if demo.programs_memory() => {
            eprintln!(
                "warning: '{}' starts from programmed memory; pass --memory to save it",
                demo
            );
        }
        None => {}
    }
}

#[derive(Serialize)]
struct ModelSummary {
    layout: Layout,
    report: BuildReport,
}

fn cmd_inspect(path: &Path, json: bool) {
    let model = or_exit(persist::load_model(path));
    let summary = ModelSummary {
        layout: *model.layout(),
        report: *model.report(),
    };
    if json {
        print_json(&summary);
        return;
    }
    let l = &summary.layout;
    let r = &summary.report;
    println!("Model: {}", path.display());
    println!("  random elements:   {}", l.random_elements);
    println!("  input elements:    {}", l.input_elements);
    println!("  output elements:   {}", l.output_elements);
    println!("  states:            {}", l.state_count);
    println!("  position elements: {}", l.position_elements);
    println!("  content elements:  {}", l.content_elements);
    println!("  combined input:    {}", l.input_count);
    println!("  combined output:   {}", l.output_count);
    println!("Stepper:");
    println!("  operations:        {}", r.operation_count);
    println!("  depth:             {}", r.stepper_depth);
    println!("  nodes:             {}", r.stepper_nodes);
}

fn cmd_run(
    path: &Path,
    memory: Option<PathBuf>,
    states: Option<Vec<f32>>,
    seed: Option<u64>,
    save_memory: Option<PathBuf>,
) {
    let mut model: Model = or_exit(persist::load_model(path));
    if let Some(memory) = memory {
        or_exit(persist::attach_memory(&memory, &mut model));
    }
    if let Some(states) = states {
        or_exit(model.set_states(&states));
    }
    if let Some(seed) = seed {
        model.reseed(seed);
    }

    let outputs = model.layout().output_elements;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (n, line) in io::stdin().lock().lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("error: cannot read input: {}", e);
                process::exit(1);
            }
        };
        let inputs = match parse_inputs(&line) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("error: line {}: {}", n + 1, e);
                process::exit(1);
            }
        };
        let result = or_exit(model.step(&inputs));
        if writeln!(out, "{}", join(&result[..outputs])).is_err() {
            process::exit(1);
        }
    }

    if let Some(path) = save_memory {
        or_exit(persist::save_memory(&path, model.memory()));
    }
}

#[derive(Serialize)]
struct MemorySummary {
    position_elements: usize,
    content_elements: usize,
    root_size: Vec<f32>,
    root_value: Vec<f32>,
    depth: usize,
    nodes: usize,
}

fn summarize(memory: &Memory) -> MemorySummary {
    MemorySummary {
        position_elements: memory.position_elements(),
        content_elements: memory.content_elements(),
        root_size: memory.root_size().to_vec(),
        root_value: memory.root().value().to_vec(),
        depth: memory.depth(),
        nodes: memory.node_count(),
    }
}

fn cmd_memory(path: &Path, json: bool) {
    let summary = summarize(&or_exit(persist::load_memory(path)));
    if json {
        print_json(&summary);
        return;
    }
    println!("Memory: {}", path.display());
    println!("  position elements: {}", summary.position_elements);
    println!("  content elements:  {}", summary.content_elements);
    println!("  root size:         {}", join(&summary.root_size));
    println!("  root value:        {}", join(&summary.root_value));
    println!("  depth:             {}", summary.depth);
    println!("  nodes:             {}", summary.nodes);
}

fn cmd_probe(
    path: &Path,
    position: &[f32],
    size: &[f32],
    increment: Option<Vec<f32>>,
    write: bool,
) {
    let mut memory = or_exit(persist::load_memory(path));
    let increment = increment.unwrap_or_else(|| vec![0.0; memory.content_elements()]);
    let fetched = or_exit(memory.increment_and_fetch(position, size, &increment));
    println!("{}", join(&fetched));
    if write {
        or_exit(persist::save_memory(path, &memory));
    }
}
