//! Demo RPC server.
//!
//! Serves two greeters behind a shared interface and an account service whose
//! `Whoami` action requires a token issued by `Login`.
//!
//! ```text
//! curl -s localhost:8080/rpc -d '{"target":"EnglishGreeter","action":"Hello","params":["Ada"]}'
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use dynrpc_core::{FieldDef, ObjectShape, TypeShape};
use dynrpc_server::network::{NetworkConfig, NetworkModule};
use dynrpc_server::service::{
    Args, DispatchConfig, Dispatcher, MethodDescriptor, ParamDef, ServerOptions, ServiceLocator,
    TokenAuthFilter, TypeDescriptor,
};
use dynrpc_server::token::{CacheSweeper, TokenConfig, TokenService};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "test-server")]
#[command(about = "dynrpc demo server", long_about = None)]
#[command(version)]
struct Cli {
    /// Bind address
    #[arg(long, env = "DYNRPC_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Listen port; 0 picks a free one
    #[arg(long, env = "DYNRPC_PORT", default_value_t = 8080)]
    port: u16,

    /// Path RPC calls are posted to
    #[arg(long, env = "DYNRPC_PREFIX", default_value = "/rpc")]
    prefix: String,

    /// Include full error chains in failure messages
    #[arg(long, env = "DYNRPC_DEVELOPMENT")]
    development: bool,

    /// HMAC secret for token signatures
    #[arg(long, env = "DYNRPC_SIGNING_SECRET")]
    signing_secret: String,

    /// Secret the token payload key is derived from
    #[arg(long, env = "DYNRPC_ENCRYPTION_SECRET")]
    encryption_secret: String,

    /// Token lifetime in seconds
    #[arg(long, env = "DYNRPC_TOKEN_TTL_SECS", default_value_t = 7200)]
    token_ttl_secs: u64,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "DYNRPC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "DYNRPC_LOG_JSON")]
    log_json: bool,

    /// Expose Prometheus metrics on this port
    #[arg(long, env = "DYNRPC_METRICS_PORT")]
    metrics_port: Option<u16>,
}

// ---------------------------------------------------------------------------
// Demo services
// ---------------------------------------------------------------------------

trait Greeter: Send + Sync {
    fn greet(&self, name: &str) -> String;
}

struct EnglishGreeter;

impl Greeter for EnglishGreeter {
    fn greet(&self, name: &str) -> String {
        format!("Hello {name}")
    }
}

struct FrenchGreeter;

impl Greeter for FrenchGreeter {
    fn greet(&self, name: &str) -> String {
        format!("Bonjour {name}")
    }
}

fn greeter_type<G: Greeter + 'static>(make: fn() -> G) -> TypeDescriptor {
    TypeDescriptor::of::<G>()
        .implements_trait::<dyn Greeter>()
        .constructor(move |_| Ok(make()))
        .method(
            MethodDescriptor::new("Hello")
                .param(ParamDef::new("name", TypeShape::string()).description("who to greet"))
                .returns(TypeShape::string())
                .handler(|greeter: &G, args: Args| Ok(greeter.greet(&args.get::<String>(0)?))),
        )
}

#[derive(Debug, Serialize, Deserialize)]
struct Session {
    user: String,
    role: String,
}

struct Accounts {
    tokens: Arc<TokenService>,
}

fn accounts_type() -> TypeDescriptor {
    let credentials = ObjectShape::new("Credentials")
        .field(FieldDef::new("user", TypeShape::string()).required())
        .field(FieldDef::new("password", TypeShape::string()).required())
        .field(FieldDef::new("role", TypeShape::string()).default_value("member"))
        .into_shape();

    TypeDescriptor::named("demo.Accounts")
        .implements("demo.IAccounts")
        .constructor(|locator| {
            Ok(Accounts {
                tokens: locator.require::<TokenService>()?,
            })
        })
        .method(
            MethodDescriptor::new("Login")
                .param(ParamDef::new("credentials", credentials))
                .returns(TypeShape::string())
                .handler_async(|accounts: Arc<Accounts>, args: Args| async move {
                    let credentials: serde_json::Value = args.get(0)?;
                    let user = credentials["user"].as_str().unwrap_or_default();
                    if credentials["password"].as_str().unwrap_or_default().is_empty() {
                        anyhow::bail!("invalid credentials for `{user}`");
                    }
                    let session = Session {
                        user: user.to_string(),
                        role: credentials["role"].as_str().unwrap_or("member").to_string(),
                    };
                    Ok(accounts.tokens.issue(&session)?)
                }),
        )
        .method(
            MethodDescriptor::new("Whoami")
                .param(ParamDef::new("token", TypeShape::string()))
                .returns(TypeShape::nullable(TypeShape::string()))
                .filter(TokenAuthFilter::descriptor())
                .handler(|accounts: &Accounts, args: Args| {
                    let token: String = args.get(0)?;
                    Ok(accounts
                        .tokens
                        .retrieve::<Session>(&token)
                        .map(|session| format!("{} ({})", session.user, session.role)))
                }),
        )
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Some(port) = cli.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()?;
        info!(port, "prometheus exporter listening");
    }

    let tokens = Arc::new(TokenService::new(TokenConfig {
        signing_secret: cli.signing_secret,
        encryption_secret: cli.encryption_secret,
        ttl: Duration::from_secs(cli.token_ttl_secs),
        ..TokenConfig::default()
    })?);
    let locator = Arc::new(ServiceLocator::new());
    locator.provide_arc(Arc::clone(&tokens));

    let mut options = ServerOptions::new();
    options
        .add_type(greeter_type(|| EnglishGreeter))
        .add_type(greeter_type(|| FrenchGreeter))
        .add_type(accounts_type())
        .register_interface_of::<dyn Greeter>()
        .register_interface("IAccounts")
        .set_route_prefix(&cli.prefix)
        .enable_response_cache(["EnglishGreeter.Hello"]);
    options.set_default_interface("IAccounts")?;

    let dispatcher = Arc::new(Dispatcher::new(
        options.build(),
        locator,
        DispatchConfig {
            development: cli.development,
            ..DispatchConfig::default()
        },
    ));

    let mut sweeper = CacheSweeper::start(Arc::clone(&tokens), Duration::from_secs(60));

    let mut network = NetworkModule::new(
        NetworkConfig {
            host: cli.host,
            port: cli.port,
            ..NetworkConfig::default()
        },
        dispatcher,
    );
    let port = network.start().await?;
    info!(port, prefix = %cli.prefix, "test server ready");

    let host = Router::new().route("/", get(|| async { "dynrpc test server" }));
    network
        .serve(host, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    sweeper.stop().await;
    Ok(())
}
