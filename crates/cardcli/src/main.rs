use anyhow::Result;
use cardcore::{catalog, CipherAlgorithm, CipherConfig, Graph, Node, NodeKind, PipeConfig};
use cardruntime::{
    loader, BlockCipherProvider, ExecutionEvent, GraphExecutor, RunOptions, RunStatus,
};
use carddriver::{DriverClient, TcpDriverTransport};
use cardsession::ApduCardSession;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cardgraph")]
#[command(about = "Smart card operation graph runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a graph file against a card
    Run {
        /// Path to graph JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Reader driver address
        #[arg(short, long, default_value = "127.0.0.1:9025")]
        driver: String,

        /// Keep executing after a node fails
        #[arg(long)]
        continue_on_error: bool,

        /// Delay between nodes in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,

        /// Per-command driver timeout in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a graph file
    Validate {
        /// Path to graph JSON file
        file: PathBuf,
    },

    /// Convert a graph file between schema layouts
    Convert {
        /// Path to graph JSON file
        file: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Write the legacy layout instead of schema version 2
        #[arg(long)]
        legacy: bool,
    },

    /// Print the execution order of a graph file
    Order {
        /// Path to graph JSON file
        file: PathBuf,
    },

    /// List the quick command catalog
    Commands,

    /// Create a new example graph
    Init {
        /// Output file path
        #[arg(short, long, default_value = "graph.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            driver,
            continue_on_error,
            delay_ms,
            timeout_ms,
            verbose,
        } => {
            if verbose {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::DEBUG)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::INFO)
                    .init();
            }

            run_graph(file, driver, continue_on_error, delay_ms, timeout_ms).await?;
        }

        Commands::Validate { file } => {
            validate_graph(file)?;
        }

        Commands::Convert {
            file,
            output,
            legacy,
        } => {
            convert_graph(file, output, legacy)?;
        }

        Commands::Order { file } => {
            print_order(file)?;
        }

        Commands::Commands => {
            list_commands();
        }

        Commands::Init { output } => {
            create_example_graph(output)?;
        }
    }

    Ok(())
}

async fn run_graph(
    file: PathBuf,
    driver: String,
    continue_on_error: bool,
    delay_ms: u64,
    timeout_ms: u64,
) -> Result<()> {
    println!("🚀 Loading graph from: {}", file.display());

    let graph = loader::load_graph(&file)?;
    println!("📋 Nodes: {}", graph.nodes.len());
    println!("   Edges: {}", graph.edges.len());
    println!();

    let (transport, inbound) = TcpDriverTransport::connect(&driver).await?;
    let client = DriverClient::new(Arc::new(transport), inbound);
    let session = Arc::new(
        ApduCardSession::new(client).with_timeout(Duration::from_millis(timeout_ms)),
    );
    let executor = GraphExecutor::new(Arc::clone(&session), Arc::new(BlockCipherProvider));

    // Subscribe to events for real-time output
    let mut events = executor.subscribe();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { node_count, .. } => {
                    println!("▶️  Run started ({} nodes)", node_count);
                }
                ExecutionEvent::NodeStarted {
                    node_id,
                    kind,
                    label,
                    ..
                } => {
                    if label.is_empty() {
                        println!("  ⚡ Starting node {} ({:?})", node_id, kind);
                    } else {
                        println!("  ⚡ Starting node: {} ({:?})", label, kind);
                    }
                }
                ExecutionEvent::NodeCompleted {
                    node_id,
                    duration_ms,
                    ..
                } => {
                    println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::RunCompleted {
                    status,
                    duration_ms,
                    ..
                } => match status {
                    RunStatus::Completed => {
                        println!("✨ Run completed successfully in {}ms", duration_ms);
                    }
                    RunStatus::Stopped => {
                        println!("⏹️  Run stopped after {}ms", duration_ms);
                    }
                    _ => {
                        println!("💥 Run failed after {}ms", duration_ms);
                    }
                },
            }
        }
    });

    let options = RunOptions {
        stop_on_error: !continue_on_error,
        node_delay_ms: delay_ms,
    };
    let report = executor.run(&graph, &options).await?;

    // Wait for events to finish printing
    tokio::time::sleep(Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("📊 Execution Summary:");
    println!(
        "   Completed: {}/{} nodes",
        report.results.iter().filter(|r| r.success).count(),
        report.results.len()
    );
    for result in &report.results {
        let mark = if result.success { "✅" } else { "❌" };
        let name = if result.label.is_empty() {
            result.node_id.to_string()
        } else {
            result.label.clone()
        };
        match (&result.output_data, &result.error) {
            (_, Some(error)) => println!("   {} {}: {}", mark, name, error),
            (Some(data), None) => println!("   {} {}: {}", mark, name, data),
            (None, None) => println!("   {} {}", mark, name),
        }
    }

    session.disconnect().await?;

    if report.status != RunStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_graph(file: PathBuf) -> Result<()> {
    println!("🔍 Validating graph: {}", file.display());

    let graph = loader::load_graph(&file)?;
    let order = GraphExecutor::execution_order(&graph);

    println!("✅ Graph is valid:");
    println!("   Nodes: {}", graph.nodes.len());
    println!("   Edges: {}", graph.edges.len());
    if order.len() < graph.nodes.len() {
        println!(
            "   ⚠️  {} node(s) sit on a cycle and will not execute",
            graph.nodes.len() - order.len()
        );
    }

    Ok(())
}

fn convert_graph(file: PathBuf, output: PathBuf, legacy: bool) -> Result<()> {
    let graph = loader::load_graph(&file)?;
    let json = if legacy {
        loader::to_json_legacy(&graph)?
    } else {
        loader::to_json_typed(&graph)?
    };
    std::fs::write(&output, json)?;

    let layout = if legacy { "legacy" } else { "schema version 2" };
    println!("✨ Wrote {} graph: {}", layout, output.display());
    Ok(())
}

fn print_order(file: PathBuf) -> Result<()> {
    let graph = loader::load_graph(&file)?;
    let order = GraphExecutor::execution_order(&graph);

    println!("📋 Execution order:");
    for (i, id) in order.iter().enumerate() {
        let label = graph
            .node(*id)
            .map(|n| n.label.as_str())
            .filter(|l| !l.is_empty())
            .unwrap_or("(unnamed)");
        println!("  {}. {} ({})", i + 1, label, id);
    }
    if order.len() < graph.nodes.len() {
        println!(
            "  ⚠️  {} node(s) excluded (cycle)",
            graph.nodes.len() - order.len()
        );
    }
    Ok(())
}

fn list_commands() {
    println!("📦 Quick Commands:");
    println!();

    for cmd in catalog::QUICK_COMMANDS {
        println!("  • {} ({})", cmd.name, cmd.category);
        println!("    {}  [{}]", cmd.description, cmd.template);
    }
}

fn create_example_graph(output: PathBuf) -> Result<()> {
    let mut graph = Graph::new();

    let challenge = Node::new(NodeKind::Apdu)
        .with_label("Get Challenge")
        .with_position(100.0, 100.0)
        .with_param("CLA", "00")
        .with_param("INS", "84")
        .with_param("P1", "00")
        .with_param("P2", "00")
        .with_param("Le", "08");

    let encrypt = Node::new(NodeKind::CryptoEncrypt)
        .with_label("Encrypt Challenge")
        .with_position(300.0, 100.0)
        .with_cipher(CipherConfig::new(
            CipherAlgorithm::Aes,
            "000102030405060708090A0B0C0D0E0F",
            "00000000000000000000000000000000",
        ));

    let auth = Node::new(NodeKind::Apdu)
        .with_label("External Authenticate")
        .with_position(500.0, 100.0)
        .with_param("CLA", "00")
        .with_param("INS", "82")
        .with_param("P1", "00")
        .with_param("P2", "00")
        .with_pipe(PipeConfig::all_of(encrypt.id));

    let challenge_id = graph.add_node(challenge);
    let encrypt_id = graph.add_node(encrypt);
    let auth_id = graph.add_node(auth);

    graph.add_edge(challenge_id, encrypt_id)?;
    graph.add_edge(encrypt_id, auth_id)?;

    let json = loader::to_json_typed(&graph)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example graph: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  cardgraph run --file {}", output.display());

    Ok(())
}
