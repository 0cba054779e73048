mod commands;
mod output;
mod prompt;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use actguard_config::{config_dir, config_file_path, load_and_prepare, load_config, SecurityLevel};
use actguard_core::{ActionDescriptor, OperationKind};
use actguard_gateway::{ConfirmationHandler, Gateway, StaticConfirmation};
use actguard_logging::init_logger;
use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use prompt::TerminalPrompt;

#[derive(Parser)]
#[command(name = "actguard")]
#[command(about = "ActGuard — decide whether an agent action may run")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.actguard/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured security level
    #[arg(long, global = true)]
    level: Option<SecurityLevel>,

    /// Allow high-risk commands without confirmation
    #[arg(long, global = true)]
    allow_dangerous: bool,

    /// Workspace root (repeatable); replaces the configured roots
    #[arg(long = "workspace", global = true)]
    workspaces: Vec<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a command against the risk rules
    Assess {
        #[arg(long)]
        json: bool,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Run one action through the gateway
    Check(CheckArgs),
    /// Evaluate a file of JSON action descriptors, one per line
    Batch {
        file: PathBuf,
        /// Print the audit log as NDJSON afterwards
        #[arg(long)]
        audit: bool,
        #[command(flatten)]
        confirm: ConfirmArgs,
    },
    /// Print the security level table
    Levels {
        /// Also print the content-security header per level
        #[arg(long)]
        csp: bool,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// read, write, execute or delete
    #[arg(long)]
    kind: OperationKind,
    #[arg(long)]
    command: Option<String>,
    #[arg(long)]
    path: Option<PathBuf>,
    /// Content for a write
    #[arg(long)]
    content: Option<String>,
    /// A backup of the target file exists
    #[arg(long)]
    backup: bool,
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    confirm: ConfirmArgs,
}

#[derive(Args)]
struct ConfirmArgs {
    /// Approve every confirmation
    #[arg(long, conflicts_with = "no_prompt")]
    yes: bool,
    /// Never prompt; report confirmations instead
    #[arg(long)]
    no_prompt: bool,
}

impl ConfirmArgs {
    fn handler(&self) -> Option<Arc<dyn ConfirmationHandler>> {
        if self.yes {
            Some(Arc::new(StaticConfirmation(true)))
        } else if self.no_prompt || !std::io::stdin().is_terminal() {
            None
        } else {
            Some(Arc::new(TerminalPrompt))
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_file_path(&config_dir()));

    // Logging settings come from the raw file so that load warnings are visible.
    let raw = load_config(&path).await?;
    let level = cli
        .log_level
        .clone()
        .or(raw.log_level.clone())
        .unwrap_or_else(|| "warn".to_string());
    let _guard = init_logger(raw.log_dir.as_deref(), &level);

    let mut config = load_and_prepare(&path).await?;
    if let Some(level) = cli.level {
        config.security_level = level.as_str().to_string();
    }
    if cli.allow_dangerous {
        config.allow_dangerous_commands = true;
    }
    if !cli.workspaces.is_empty() {
        config.workspace.roots = cli.workspaces.clone();
    }
    debug!(level = %config.security_level, roots = config.workspace.roots.len(), "Config ready");

    let code = match cli.command {
        Commands::Assess { json, command } => commands::assess(&command.join(" "), json)?,
        Commands::Levels { csp } => {
            commands::levels(csp);
            commands::EXIT_OK
        }
        Commands::Check(args) => {
            let gateway = Gateway::from_config(&config);
            gateway.set_confirmation_handler(args.confirm.handler());
            let action = descriptor(&args)?;
            let code = commands::check(&gateway, &action, args.json).await?;
            gateway.shutdown().await;
            code
        }
        Commands::Batch {
            file,
            audit,
            confirm,
        } => {
            let gateway = Gateway::from_config(&config);
            gateway.set_confirmation_handler(confirm.handler());
            let code = commands::batch(&gateway, &file, audit).await?;
            gateway.shutdown().await;
            code
        }
    };

    Ok(ExitCode::from(code))
}

fn descriptor(args: &CheckArgs) -> Result<ActionDescriptor> {
    let path = args.path.as_ref().map(|p| p.display().to_string());
    if args.command.is_none() && path.is_none() {
        bail!("--kind {} needs --command or --path", args.kind);
    }
    if args.kind != OperationKind::Execute && path.is_none() {
        bail!("--kind {} needs --path", args.kind);
    }
    Ok(ActionDescriptor {
        kind: args.kind,
        path,
        content: args.content.clone(),
        command: args.command.clone(),
        has_backup: args.backup,
    })
}
