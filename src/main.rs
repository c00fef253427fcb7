//! Zentinel Mock Transport - CLI Entry Point
//!
//! Validates route tables and dry-runs requests against them.

use anyhow::Result;
use clap::Parser;
use http::Method;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_mock_transport::{Interceptor, MockTransportConfig, OutboundRequest};

const DEFAULT_CONFIG: &str = r#"# Zentinel mock transport configuration
settings:
  case_sensitive: false
  pretty_json: false

routes:
  - name: hello
    uri: "*/hello"
    responses:
      - status: 200
        body:
          type: json
          content:
            message: "Hello, World!"

  - name: flaky
    uri: "*/flaky*"
    responses:
      - fault:
          type: error
          status: 503
          message: "Service Unavailable"
      - status: 200

fallback:
  status: 404
"#;

#[derive(Parser, Debug)]
#[command(
    name = "zentinel-mock-transport",
    about = "Mock HTTP transport - validate route tables and dry-run requests",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-transport.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Send one request with this URI through the configuration
    #[arg(long, value_name = "URI")]
    uri: Option<String>,

    /// Method for --uri
    #[arg(short = 'X', long, default_value = "GET")]
    method: Method,

    /// Body for --uri
    #[arg(short, long)]
    data: Option<String>,

    /// Header for --uri, as `name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        println!("{}", DEFAULT_CONFIG);
        return Ok(());
    }

    // Load configuration
    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockTransportConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no routes)");
        MockTransportConfig::default()
    };

    if args.validate {
        config.build()?;
        println!(
            "Configuration is valid ({} routes defined)",
            config.routes.len()
        );
        return Ok(());
    }

    let Some(uri) = args.uri else {
        for route in &config.routes {
            println!(
                "{:<40} {} response(s){}",
                route.uri,
                route.responses.len(),
                route
                    .name
                    .as_deref()
                    .map(|n| format!("  [{}]", n))
                    .unwrap_or_default()
            );
        }
        return Ok(());
    };

    let interceptor = Interceptor::from_config(&config)?;

    let mut request = OutboundRequest {
        method: args.method,
        uri: Some(uri.parse()?),
        body: args.data.unwrap_or_default().into(),
        ..Default::default()
    };
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("Invalid header (expected `name: value`): {}", header))?;
        request = request.with_header(name.trim(), value.trim());
    }

    let response = interceptor.send(request).await?;
    println!("{:?} {}", response.version, response.status);
    for (name, value) in &response.headers {
        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    println!();
    println!("{}", response.body_text());

    Ok(())
}
