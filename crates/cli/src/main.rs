//! `slcall` entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: `SL_*` environment variables via
//!    [`api::ClientConfig::from_env`], overridden by command-line flags.
//! 2. **Wire observability**: `tracing-subscriber` with an `EnvFilter`, plain
//!    or JSON output.
//! 3. **Construct the transport**: XML-RPC, REST or SOAP by protocol, wrapped
//!    in the debug and timing decorators.
//! 4. **Make the call**: one call, or a paged iteration with `--iter`, and print
//!    the result as JSON.
//!
//! ```text
//! slcall Account getVirtualGuests --mask 'id,hostname' --iter --chunk 50 -v
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use api::{
    CallOptions, Client, ClientConfig, DebugTransport, Protocol, TimingTransport, TlsVerify,
    Transport, Value, DEFAULT_CHUNK_SIZE,
};
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Call one API method and print the result as JSON.
#[derive(Parser, Debug)]
#[command(name = "slcall", version, about, long_about = None)]
struct Cli {
    /// Service name, e.g. `Account` or `SoftLayer_Account`
    service: String,

    /// Method name
    method: String,

    /// Positional parameters. Each is parsed as JSON; anything that is not
    /// valid JSON is sent as a string.
    params: Vec<String>,

    /// Init parameter (object id)
    #[arg(long)]
    id: Option<i64>,

    /// Object mask, e.g. `id,hostname` or `mask[id,hostname]`
    #[arg(long)]
    mask: Option<String>,

    /// Object filter as a JSON mapping
    #[arg(long)]
    filter: Option<String>,

    /// Result limit
    #[arg(long)]
    limit: Option<u32>,

    /// Result offset
    #[arg(long)]
    offset: Option<u32>,

    /// Page through the whole result set
    #[arg(long)]
    iter: bool,

    /// Page size used with --iter
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk: u32,

    /// API endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Wire protocol (xmlrpc, rest, soap); defaults to the one implied by the endpoint
    #[arg(long)]
    protocol: Option<Protocol>,

    /// API username
    #[arg(long)]
    username: Option<String>,

    /// API key
    #[arg(long)]
    api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// HTTP(S) proxy URL
    #[arg(long)]
    proxy: Option<String>,

    /// Skip server certificate verification
    #[arg(long, conflicts_with = "ca_bundle")]
    insecure: bool,

    /// Verify the server certificate against this PEM bundle
    #[arg(long)]
    ca_bundle: Option<PathBuf>,

    /// Ask for an uncompressed response
    #[arg(long)]
    no_compress: bool,

    /// -v prints call timings, -vv also prints reproducible requests
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[arg(long, env = "SLCALL_LOG", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    fn config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::from_env().context("failed to read SL_* environment")?;
        if let Some(endpoint) = &self.endpoint {
            config.endpoint_url = endpoint.clone();
        }
        if self.protocol.is_some() {
            config.protocol = self.protocol;
        }
        if self.username.is_some() {
            config.username = self.username.clone();
        }
        if self.api_key.is_some() {
            config.api_key = self.api_key.clone();
        }
        if self.timeout.is_some() {
            config.timeout_seconds = self.timeout;
        }
        if self.proxy.is_some() {
            config.proxy = self.proxy.clone();
        }
        if self.insecure {
            config.verify = TlsVerify::Disabled;
        } else if let Some(bundle) = &self.ca_bundle {
            config.verify = TlsVerify::CaBundle(bundle.clone());
        }
        Ok(config)
    }

    fn options(&self) -> Result<CallOptions> {
        let mut options = CallOptions::new().compress(!self.no_compress);
        if let Some(id) = self.id {
            options = options.id(id);
        }
        if let Some(mask) = &self.mask {
            options = options.mask(mask.as_str());
        }
        if let Some(filter) = &self.filter {
            let filter: serde_json::Value =
                serde_json::from_str(filter).context("--filter must be valid JSON")?;
            options = options.filter(Value::from(filter));
        }
        if let Some(limit) = self.limit {
            options = options.limit(limit);
        }
        if let Some(offset) = self.offset {
            options = options.offset(offset);
        }
        Ok(options)
    }
}

/// Parses a positional parameter: JSON when it parses, a string otherwise.
fn parse_param(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(raw))
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn build_transport(config: &ClientConfig) -> Box<dyn Transport> {
    let timeout = config.timeout();
    let endpoint = config.endpoint_url.clone();
    match config.protocol() {
        Protocol::XmlRpc => Box::new(
            xmlrpc::XmlRpcTransport::new(endpoint)
                .with_timeout(timeout)
                .with_proxy(config.proxy.clone())
                .with_verify(config.verify.clone())
                .with_user_agent(config.user_agent.clone()),
        ),
        Protocol::Rest => Box::new(
            rest::RestTransport::new(endpoint)
                .with_timeout(timeout)
                .with_proxy(config.proxy.clone())
                .with_verify(config.verify.clone())
                .with_user_agent(config.user_agent.clone()),
        ),
        Protocol::Soap => Box::new(
            soap::SoapTransport::new(endpoint)
                .with_timeout(timeout)
                .with_proxy(config.proxy.clone())
                .with_verify(config.verify.clone())
                .with_user_agent(config.user_agent.clone())
                .with_schema_ttl(config.schema_ttl()),
        ),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = cli.config()?;
    let protocol = config.protocol();
    let debug = Arc::new(DebugTransport::new(build_transport(&config)));
    let timing = Arc::new(TimingTransport::new(Arc::clone(&debug)));

    let mut client = Client::new(Arc::clone(&timing));
    if let Some(auth) = config
        .authentication(timing.credential_placement())
        .context("invalid credentials")?
    {
        client.set_auth(Some(Arc::from(auth)));
    }
    info!(endpoint = %config.endpoint_url, ?protocol, "client ready");

    let args: Vec<Value> = cli.params.iter().map(|p| parse_param(p)).collect();
    let options = cli.options()?;

    let outcome = if cli.iter {
        client
            .iter_call(&cli.service, &cli.method, args, &options, cli.chunk)
            .and_then(|pages| pages.collect::<Result<Vec<_>, _>>())
            .map(Value::Array)
    } else {
        client
            .call(&cli.service, &cli.method, args, &options)
            .map(|response| response.into_value())
    };

    if cli.verbose >= 1 {
        for call in timing.get_last_calls() {
            eprintln!(
                "{}::{} started {} took {:.3}s",
                call.request.service, call.request.method, call.start, call.elapsed_seconds
            );
        }
    }
    if cli.verbose >= 2 {
        for request in debug.get_last_calls() {
            eprintln!("{}", debug.print_reproducible(&request));
        }
    }

    let value = outcome.with_context(|| format!("{}::{} failed", cli.service, cli.method))?;
    let rendered = serde_json::to_string_pretty(&value).context("failed to render result")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_parse_as_json_with_string_fallback() {
        assert_eq!(parse_param("42"), Value::Int(42));
        assert_eq!(parse_param("true"), Value::Bool(true));
        assert_eq!(parse_param("\"quoted\""), Value::from("quoted"));
        assert_eq!(parse_param("hostname.example.com"), Value::from("hostname.example.com"));
        assert_eq!(
            parse_param(r#"{"hostname": "web"}"#).get("hostname"),
            Some(&Value::from("web"))
        );
    }

    #[test]
    fn flags_override_environment() {
        let cli = Cli::parse_from([
            "slcall",
            "Account",
            "getObject",
            "--endpoint",
            "https://api.example.com/rest/v3.1",
            "--username",
            "user",
            "--api-key",
            "key",
            "--insecure",
        ]);
        let config = cli.config().unwrap();
        assert_eq!(config.endpoint_url, "https://api.example.com/rest/v3.1");
        assert_eq!(config.protocol(), Protocol::Rest);
        assert_eq!(config.username.as_deref(), Some("user"));
        assert_eq!(config.verify, TlsVerify::Disabled);
    }

    #[test]
    fn bad_filter_is_reported() {
        let cli = Cli::parse_from(["slcall", "Account", "getObject", "--filter", "{nope"]);
        assert!(cli.options().is_err());
    }

    #[test]
    fn protocol_flag_accepts_names() {
        let cli = Cli::parse_from(["slcall", "Account", "getObject", "--protocol", "soap"]);
        assert_eq!(cli.protocol, Some(Protocol::Soap));
    }
}
