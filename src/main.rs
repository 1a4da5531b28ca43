//! `notebook-bridge` command line.
//!
//! Every command prints one JSON document on stdout. Failures print an
//! error report and exit with status 1.

use std::io::Read;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};

use notebook_bridge::{
    logging, AskRequest, BridgeConfig, ErrorReport, NotebookBridge, RpcCall,
};

#[derive(Parser, Debug)]
#[command(name = "notebook-bridge")]
#[command(about = "Talk to a notebook service through its batch-RPC gateway")]
struct Args {
    /// Override the data directory holding auth.json and conversations.json
    #[arg(long, global = true)]
    data_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store session cookies copied from a signed-in browser
    Login {
        /// Cookie header value; read from stdin when omitted
        #[arg(long)]
        cookies: Option<String>,

        /// Anti-forgery token, minted from the landing page when omitted
        #[arg(long)]
        csrf_token: Option<String>,

        #[arg(long)]
        session_id: Option<String>,
    },
    /// Show the credential state without contacting the service
    Status,
    /// Run credential recovery now
    Refresh,
    /// Forget stored credentials
    Logout,
    /// Issue one raw batched call
    Call {
        rpc_id: String,

        /// Parameters as JSON
        #[arg(default_value = "[]")]
        params: String,

        #[arg(long)]
        source_path: Option<String>,
    },
    /// Ask a question over one or more sources
    Ask {
        query: String,

        /// Source id; repeat for several sources
        #[arg(long = "source", required = true)]
        sources: Vec<String>,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut config = BridgeConfig::from_env();
    if let Some(data_dir) = args.data_dir {
        config = config.with_data_dir(data_dir);
    }
    logging::init(config.log_filter.as_deref());

    match run(&config, args.command).await {
        Ok(output) => {
            print_json(&output);
            ExitCode::SUCCESS
        }
        Err(report) => {
            tracing::debug!(code = %report.code, "command failed");
            print_json(&report);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &BridgeConfig, command: Command) -> Result<Value, ErrorReport> {
    let bridge = NotebookBridge::new(config)?;

    match command {
        Command::Login {
            cookies,
            csrf_token,
            session_id,
        } => {
            let cookies = match cookies {
                Some(cookies) => cookies,
                None => read_stdin()?,
            };
            let status = bridge
                .login(&cookies, csrf_token.as_deref(), session_id.as_deref())
                .await?;
            to_value(&status)
        }
        Command::Status => to_value(&bridge.status()),
        Command::Refresh => to_value(&bridge.refresh().await?),
        Command::Logout => {
            bridge.logout()?;
            Ok(json!({ "logged_out": true }))
        }
        Command::Call {
            rpc_id,
            params,
            source_path,
        } => {
            let params: Value = serde_json::from_str(&params).map_err(|error| {
                ErrorReport::invalid_input(format!("params are not valid JSON: {error}"))
            })?;
            let mut call = RpcCall::new(rpc_id, params);
            if let Some(source_path) = source_path {
                call = call.with_source_path(source_path);
            }
            let result = bridge.call(&call).await?;
            Ok(json!({ "result": result }))
        }
        Command::Ask {
            query,
            sources,
            conversation,
        } => {
            let request = AskRequest {
                query,
                source_ids: sources,
                conversation_id: conversation,
            };
            to_value(&bridge.ask(&request).await?)
        }
    }
}

fn read_stdin() -> Result<String, ErrorReport> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|error| ErrorReport::invalid_input(format!("failed to read stdin: {error}")))?;
    let input = input.trim();
    let input = input
        .strip_prefix("Cookie:")
        .or_else(|| input.strip_prefix("cookie:"))
        .unwrap_or(input);
    Ok(input.trim().to_owned())
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ErrorReport> {
    serde_json::to_value(value)
        .map_err(|error| ErrorReport::internal(format!("failed to serialize output: {error}")))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(error) => eprintln!("failed to serialize output: {error}"),
    }
}
