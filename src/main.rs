//! Relay CLI
//!
//! Entry point for the `relay` command-line tool.

use clap::{Parser, Subcommand};
use relay_runtime::config::{ConfigLoader, EffectiveConfig};
use relay_runtime::handler::{build_schema, GatewayResponse};
use relay_runtime::protocol::PROTOCOL_VERSION;
use relay_runtime::registry::{load_manifest, method_key, scan_directory};
use relay_runtime::{app, builtin, logging};
use serde_json::{json, Value};
use std::io::Read;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "RPC envelope runtime", version)]
struct Cli {
    /// Path to config file (default: relay.toml, if present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Directory to scan for method manifests
    #[arg(long, short = 'm', global = true)]
    methods: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error or 10..60)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a gateway event and print the gateway response
    Invoke {
        /// Event file (default: stdin)
        #[arg(long, short = 'e')]
        event: Option<PathBuf>,
    },

    /// Call one method
    Call {
        /// Method name
        method: String,

        /// Params as JSON (object or array)
        #[arg(long, short = 'p')]
        params: Option<String>,
    },

    /// Validate every manifest in the methods directory
    Check,

    /// Show the effective configuration
    Config {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match loader(&cli).load().await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.log_level(), config.log_format()) {
        eprintln!("Error initializing logging: {}", e);
        process::exit(1);
    }

    match cli.command {
        Commands::Invoke { event } => run_invoke(&config, event).await,
        Commands::Call { method, params } => run_call(&config, &method, params).await,
        Commands::Check => run_check(&config),
        Commands::Config { json } => run_config(&config, json),
    }
}

fn loader(cli: &Cli) -> ConfigLoader {
    let mut loader = match &cli.config {
        Some(path) => ConfigLoader::new().required_file(path),
        None => ConfigLoader::new().file("relay.toml"),
    };

    if let Some(ref dir) = cli.methods {
        loader = loader.cli(json!({"methods": {"dir": dir.to_string_lossy()}}));
    }
    if let Some(ref level) = cli.log_level {
        loader = loader.cli(json!({"log": {"level": level}}));
    }

    loader
}

async fn run_invoke(config: &EffectiveConfig, event_path: Option<PathBuf>) {
    let raw = match event_path {
        Some(ref path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map(|_| buf)
        }
    };

    let raw = match raw {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error reading event: {}", e);
            process::exit(1);
        }
    };

    let event: Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error parsing event: {}", e);
            process::exit(1);
        }
    };

    let response = dispatch(config, event).await;
    print_json(&response);

    if response.status_code >= 400 {
        process::exit(1);
    }
}

async fn run_call(config: &EffectiveConfig, method: &str, params: Option<String>) {
    let mut envelope = json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "protocolVersion": PROTOCOL_VERSION,
        "method": method,
    });

    if let Some(ref params) = params {
        match serde_json::from_str::<Value>(params) {
            Ok(p) => envelope["params"] = p,
            Err(e) => {
                eprintln!("Error parsing params: {}", e);
                process::exit(1);
            }
        }
    }

    let response = dispatch(config, json!({ "body": envelope })).await;

    let body: Value = serde_json::from_str(&response.body).unwrap_or(Value::String(response.body));
    print_json(&body);

    let failed = response.status_code >= 400 || body.get("error").is_some();
    if failed {
        process::exit(1);
    }
}

async fn dispatch(config: &EffectiveConfig, event: Value) -> GatewayResponse {
    let table = match builtin::methods() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error building method table: {}", e);
            process::exit(1);
        }
    };

    app::rpc_handler(config, table).handle(event).await
}

fn run_check(config: &EffectiveConfig) {
    let Some(dir) = config.methods_dir() else {
        eprintln!("No methods directory configured (use --methods or methods.dir).");
        process::exit(1);
    };

    let table = match builtin::methods() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error building method table: {}", e);
            process::exit(1);
        }
    };

    let files = match scan_directory(&dir, config.methods_prefix()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    println!("Checking {} ({} candidates)\n", dir.display(), files.len());

    let mut failures = 0;
    for path in &files {
        let Some(name) = method_key(path, config.methods_prefix()) else {
            continue;
        };

        let linked = if table.contains(&name) { "" } else { " (no runner linked)" };

        if path.extension().is_some_and(|ext| ext == "toml") {
            let result = load_manifest(path).and_then(|options| {
                build_schema(Some(&options.validation))
                    .map(|schema| schema.len())
                    .map_err(|source| relay_runtime::registry::RegistryError::Schema {
                        method: name.clone(),
                        source,
                    })
            });

            match result {
                Ok(fields) => println!("  ok    {} ({} validated fields){}", name, fields, linked),
                Err(e) => {
                    failures += 1;
                    println!("  FAIL  {}: {}", name, e);
                }
            }
        } else {
            println!("  ok    {}{}", name, linked);
        }
    }

    if failures > 0 {
        eprintln!("\n{} method(s) failed validation", failures);
        process::exit(1);
    }
}

fn run_config(config: &EffectiveConfig, json_output: bool) {
    let redacted = config.redacted();

    if json_output {
        match redacted.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Effective configuration ({}):\n", redacted.schema_id);
    println!("  Service: {}", redacted.service_name());
    println!("  Log: {} ({})", redacted.log_level(), redacted.log_format());
    match redacted.methods_dir() {
        Some(dir) => println!("  Methods: {} (prefix '{}')", dir.display(), redacted.methods_prefix()),
        None => println!("  Methods: built-in table"),
    }
    if let Some(prefix) = redacted.parameters_prefix() {
        println!("  Parameters: {}", prefix);
    }

    println!("\n  Sources:");
    for source in &redacted.sources {
        match source.path {
            Some(ref path) => println!("    {:?} {}", source.origin, path),
            None => println!("    {:?}", source.origin),
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
