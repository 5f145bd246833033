use crate::config::{FilterConfig, FilterSettings};
use crate::middleware::{FilterOutcome, OAuthFilter};
use crate::request::{GatewayRequest, ProxyInfo};
use crate::runtime_config::RuntimeConfig;
use crate::token;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use http::Method;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

/// Command-line interface for brrtgate
#[derive(Parser)]
#[command(name = "brrtgate")]
#[command(about = "OAuth bearer-token gateway filter", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a token without verifying it
    Decode {
        /// Compact JWS (three dot-separated segments)
        token: String,
    },
    /// Run the filter once against a synthetic request
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Filter configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Value of the authorization header, e.g. "Bearer eyJ..."; omit to send none
    #[arg(long)]
    pub header: Option<String>,

    /// Name of the proxy the request was routed to
    #[arg(long)]
    pub proxy: Option<String>,

    /// Base path of the proxy
    #[arg(long, default_value = "/")]
    pub base_path: String,

    /// Request path (defaults to the base path)
    #[arg(long)]
    pub path: Option<String>,

    /// HTTP method
    #[arg(long, default_value = "GET")]
    pub method: String,
}

pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let output = execute(&cli.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Run a command and return its JSON report
pub fn execute(command: &Commands) -> anyhow::Result<Value> {
    match command {
        Commands::Decode { token } => decode_token(token),
        Commands::Check(args) => {
            let config = FilterConfig::from_path(&args.config)?;
            check_request(&config, args, RuntimeConfig::from_env())
        }
    }
}

pub fn decode_token(raw: &str) -> anyhow::Result<Value> {
    let decoded = token::decode(raw.trim()).context("token could not be decoded")?;
    Ok(json!({
        "header": serde_json::to_value(&decoded.header)?,
        "claims": decoded.claims.to_value(),
    }))
}

pub fn check_request(
    config: &FilterConfig,
    args: &CheckArgs,
    runtime: RuntimeConfig,
) -> anyhow::Result<Value> {
    let settings = FilterSettings::from_config(config)?;
    let header_name = settings.header_name.clone();
    let filter = OAuthFilter::builder(settings)
        .runtime(runtime)
        .sweep(false)
        .build()?;

    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method '{}'", args.method))?;
    let path = args.path.clone().unwrap_or_else(|| args.base_path.clone());
    let mut req = GatewayRequest::new(method, path);
    if let Some(proxy) = &args.proxy {
        req = req.with_proxy(ProxyInfo::new(proxy.as_str(), args.base_path.as_str()));
    }
    if let Some(value) = &args.header {
        req.set_header(&header_name, value.clone());
    }

    let outcome = filter.on_request(&mut req);
    filter.shutdown();

    Ok(match outcome {
        FilterOutcome::Admit(admission) => {
            let headers: Map<String, Value> = req
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
                .collect();
            json!({
                "outcome": "admit",
                "admission": admission.as_str(),
                "request_id": req.request_id.to_string(),
                "forwarded_headers": headers,
                "claims": req.claims().cloned(),
                "verified": req.token.as_ref().map(|t| t.verified),
            })
        }
        FilterOutcome::Reject(res) => json!({
            "outcome": "reject",
            "request_id": req.request_id.to_string(),
            "status": res.status,
            "body": res.body,
        }),
    })
}
