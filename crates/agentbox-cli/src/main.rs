//! Agentbox CLI: stdio tool server and one-shot agent calls.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes

mod server;

use agentbox::{run_tool, ToolKind, ToolParams};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use miette::{miette, IntoDiagnostic, Result};
use serde_json::{Map, Value};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(
    name = "agentbox",
    version,
    about = "Run CLI coding agents as supervised tools"
)]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    /// Increase log verbosity on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve tools over newline-delimited JSON-RPC on stdin/stdout
    Serve,
    /// Run one tool call and print its outcome as JSON
    Call {
        /// Tool name (claude, coder, codex, gemini)
        tool: String,
        /// Working directory for the agent
        #[arg(long)]
        cd: PathBuf,
        /// Prompt text; read from stdin when omitted
        #[arg(long)]
        prompt: Option<String>,
        /// Extra call arguments as a JSON object, e.g. '{"sandbox":"read-only"}'
        #[arg(long)]
        args: Option<String>,
    },
    /// List available tools
    Tools {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Install the miette handler and report whether stderr gets colors.
fn configure_colors(mode: ColorMode) -> bool {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            // Respect NO_COLOR environment variable
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                // Check if stderr supports color (where we output diagnostics)
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set
    use_color
}

/// Logs go to stderr; stdout carries the tool protocol.
fn init_tracing(verbose: u8, use_color: bool) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(use_color)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let use_color = configure_colors(cli.color);
    init_tracing(cli.verbose, use_color);
    match cli.command {
        Commands::Serve => cmd_serve(),
        Commands::Call {
            tool,
            cd,
            prompt,
            args,
        } => cmd_call(&tool, cd, prompt, args),
        Commands::Tools { json } => cmd_tools(json),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

fn cmd_serve() -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    server::serve(stdin.lock(), stdout.lock(), run_tool).into_diagnostic()
}

fn cmd_call(tool: &str, cd: PathBuf, prompt: Option<String>, args: Option<String>) -> Result<()> {
    let kind = ToolKind::from_name(tool).into_diagnostic()?;
    let mut arguments = match args {
        Some(raw) => match serde_json::from_str::<Value>(&raw).into_diagnostic()? {
            Value::Object(map) => map,
            _ => return Err(miette!("--args must be a JSON object")),
        },
        None => Map::new(),
    };
    let prompt = match prompt {
        Some(prompt) => prompt,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).into_diagnostic()?;
            buf
        }
    };
    arguments.insert("PROMPT".to_string(), Value::String(prompt));
    arguments.insert("cd".to_string(), Value::String(cd.display().to_string()));

    let params = ToolParams::from_value(kind, Value::Object(arguments)).into_diagnostic()?;
    let outcome = run_tool(kind, &params);
    let payload = serde_json::to_string_pretty(&outcome.to_value()).into_diagnostic()?;
    println!("{payload}");
    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_tools(json: bool) -> Result<()> {
    if json {
        let payload = serde_json::to_string_pretty(&server::list_tools()).into_diagnostic()?;
        println!("{payload}");
        return Ok(());
    }
    for kind in ToolKind::ALL {
        println!(
            "{:<8} sandbox={:<16} max_retries={}",
            kind.name(),
            kind.default_sandbox().as_str(),
            kind.default_max_retries()
        );
    }
    Ok(())
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}
