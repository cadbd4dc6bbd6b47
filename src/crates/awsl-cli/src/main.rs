//! `awsl` — verify and inspect AWSL workflow files.
//!
//! - `awsl verify <file>` checks parseability only and exits non-zero on
//!   a syntax error.
//! - `awsl show <file>` pretty-prints the parsed workflow hierarchy.
//! - `awsl mermaid <file>` compiles the workflow (with stub functions)
//!   and renders its dependency graph as mermaid.

use anyhow::Context;
use awsl_core::{compile, to_mermaid, FunctionRegistry, NodeResult};
use awsl_parser::{parse_workflow, Cycle, Node, PortDecl, Step, Workflow};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "awsl", about = "AWSL workflow tools", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a workflow file parses. Exits 1 on error.
    Verify { file: PathBuf },
    /// Print the parsed workflow structure.
    Show { file: PathBuf },
    /// Render the compiled dependency graph as mermaid.
    Mermaid { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Verify { file } => {
            let source = read(&file)?;
            match awsl_parser::verify(&source) {
                Ok(()) => {
                    println!("Syntax OK");
                    Ok(ExitCode::SUCCESS)
                }
                Err(error) => {
                    println!("Syntax error: {error}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Show { file } => {
            let source = read(&file)?;
            let workflow = parse_workflow(&source)?;
            print_workflow(&workflow);
            Ok(ExitCode::SUCCESS)
        }
        Command::Mermaid { file } => {
            let source = read(&file)?;
            let workflow = parse_workflow(&source)?;
            let registry = stub_registry(&workflow)?;
            let plan = compile(&workflow, &registry)?;
            println!("{}", to_mermaid(&plan));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Stub functions for every `call` in the workflow, so structural
/// inspection never needs the real registry.
fn stub_registry(workflow: &Workflow) -> anyhow::Result<FunctionRegistry> {
    let mut registry = FunctionRegistry::new();
    let mut register = |name: &str| -> anyhow::Result<()> {
        if !registry.contains(name) {
            registry.register_fn(name.to_string(), |_input, _config| {
                Box::pin(async { Ok(NodeResult::Empty) })
            })?;
        }
        Ok(())
    };
    for step in &workflow.steps {
        match step {
            Step::Node(node) => register(&node.call)?,
            Step::Cycle(cycle) => {
                for node in &cycle.nodes {
                    register(&node.call)?;
                }
            }
        }
    }
    Ok(registry)
}

fn print_workflow(workflow: &Workflow) {
    println!("Workflow: {}", workflow.name);
    if let Some(metadata) = &workflow.metadata {
        println!("  Metadata:");
        for (key, value) in &metadata.entries {
            println!("    {key}: {value}");
        }
    }
    print_ports("  Inputs", &workflow.inputs);
    print_ports("  Outputs", &workflow.outputs);
    println!("  Steps:");
    for step in &workflow.steps {
        match step {
            Step::Node(node) => print_node(node, 4),
            Step::Cycle(cycle) => print_cycle(cycle),
        }
    }
}

fn print_ports(label: &str, ports: &[PortDecl]) {
    if ports.is_empty() {
        return;
    }
    println!("{label}:");
    for port in ports {
        let default = match &port.default_value {
            Some(awsl_parser::PortValue::Ref(reference)) => format!(" = {reference}"),
            Some(awsl_parser::PortValue::Literal(scalar)) => {
                format!(" = {}", scalar.display_string())
            }
            None => String::new(),
        };
        let optional = if port.optional { "optional " } else { "" };
        println!("    {optional}{} {}{default}", port.ty, port.name);
    }
}

fn print_node(node: &Node, indent: usize) {
    let pad = " ".repeat(indent);
    println!("{pad}Node: {}", node.name);
    println!("{pad}  call: {}", node.call);
    if let Some(when) = &node.when {
        println!("{pad}  when: {when}");
    }
    print_node_ports(&node.inputs, "inputs", indent);
    print_node_ports(&node.outputs, "outputs", indent);
    if let Some(hitl) = &node.hitl {
        println!(
            "{pad}  hitl: correlation={}, timeout={}",
            hitl.correlation, hitl.timeout
        );
    }
    if let Some(retry) = &node.retry {
        println!(
            "{pad}  retry: attempts={}, backoff={}, policy={}",
            retry.attempts, retry.backoff, retry.policy
        );
    }
    for constant in &node.constants {
        println!(
            "{pad}  constant {}: {}",
            constant.name,
            constant.value.display_string()
        );
    }
}

fn print_node_ports(ports: &[PortDecl], label: &str, indent: usize) {
    if ports.is_empty() {
        return;
    }
    let pad = " ".repeat(indent);
    println!("{pad}  {label}:");
    for port in ports {
        let default = match &port.default_value {
            Some(awsl_parser::PortValue::Ref(reference)) => format!(" = {reference}"),
            Some(awsl_parser::PortValue::Literal(scalar)) => {
                format!(" = {}", scalar.display_string())
            }
            None => String::new(),
        };
        println!("{pad}    {} {}{default}", port.ty, port.name);
    }
}

fn print_cycle(cycle: &Cycle) {
    println!("    Cycle: {}", cycle.name);
    println!("      guard: {}", cycle.guard);
    println!("      max_iterations: {}", cycle.max_iterations);
    print_node_ports(&cycle.inputs, "inputs", 4);
    print_node_ports(&cycle.outputs, "outputs", 4);
    println!("      nodes:");
    for node in &cycle.nodes {
        print_node(node, 8);
    }
}
