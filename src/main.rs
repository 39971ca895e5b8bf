use std::process::ExitCode;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use headless_oidc::{
    AuthFailure, LocalServerConfig, LoopbackUserAgent, OidcClient, OidcClientConfig, OidcError,
    UserAgent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_REDIRECT_URI: &str = "x-paperless://oidc-callback";
const DEFAULT_LOOPBACK_REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";
const LOOPBACK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Parser)]
#[command(
    name = "headless-oidc",
    about = "Log in to a headless-auth backend through one of its OpenID Connect providers."
)]
struct Cli {
    /// Backend root url, e.g. https://paperless.example.
    #[arg(long, env = "HEADLESS_OIDC_BASE_URL")]
    base_url: String,

    /// Redirect uri registered with the provider.
    #[arg(long, env = "HEADLESS_OIDC_REDIRECT_URI")]
    redirect_uri: Option<String>,

    /// Per-request HTTP timeout.
    #[arg(long, env = "HEADLESS_OIDC_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the providers usable for headless login as JSON.
    Providers,
    /// Log in with a provider and print the backend api token as JSON.
    Login {
        #[arg(long)]
        provider: String,
        /// Catch the redirect on a local listener instead of pasting it.
        #[arg(long)]
        loopback: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, OidcError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("headless_oidc=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let redirect_uri = match (&cli.redirect_uri, &cli.command) {
        (Some(uri), _) => uri.clone(),
        (None, Command::Login { loopback: true, .. }) => DEFAULT_LOOPBACK_REDIRECT_URI.to_string(),
        (None, _) => DEFAULT_REDIRECT_URI.to_string(),
    };
    let mut config = OidcClientConfig::new(cli.base_url, redirect_uri);
    if let Some(secs) = cli.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    let mut client = OidcClient::new(config)?;

    match cli.command {
        Command::Providers => run_providers(&mut client).await,
        Command::Login { provider, loopback } => run_login(&mut client, &provider, loopback).await,
    }
}

async fn run_providers(client: &mut OidcClient) -> Result<ExitCode, OidcError> {
    let providers = client.fetch_providers().await?;
    print_json(providers)?;
    Ok(ExitCode::SUCCESS)
}

async fn run_login(
    client: &mut OidcClient,
    provider_id: &str,
    loopback: bool,
) -> Result<ExitCode, OidcError> {
    client.fetch_providers().await?;
    let Some(provider) = client
        .providers()
        .iter()
        .find(|provider| provider.id == provider_id)
        .cloned()
    else {
        let offered: Vec<_> = client.providers().iter().map(|p| p.id.as_str()).collect();
        eprintln!("Provider {provider_id:?} is not offered (available: {offered:?})");
        return Ok(ExitCode::FAILURE);
    };

    let user_agent: Box<dyn UserAgent> = if loopback {
        let config = LocalServerConfig::from_redirect_uri(client.redirect_uri().as_str())?
            .with_timeout(LOOPBACK_TIMEOUT);
        Box::new(LoopbackUserAgent::from_config(config).with_launcher(open_browser))
    } else {
        Box::new(PastedCallback)
    };

    match client.login(&provider, user_agent.as_ref()).await {
        Ok(token) => {
            print_json(&serde_json::json!({ "provider": provider.id, "token": token }))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_cancelled() => {
            eprintln!("login cancelled");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), OidcError> {
    let output = serde_json::to_string_pretty(value).map_err(|err| OidcError::InvalidResponse {
        message: err.to_string(),
        body: String::new(),
    })?;
    println!("{output}");
    Ok(())
}

fn open_browser(url: &Url) -> Result<(), AuthFailure> {
    eprintln!("Authorization URL:\n{url}");
    if let Err(err) = webbrowser::open(url.as_str()) {
        eprintln!("Failed to open browser automatically: {err}");
    }
    Ok(())
}

/// Manual capture for redirect uris nothing local can serve: the user copies
/// the final url out of the browser.
struct PastedCallback;

#[async_trait]
impl UserAgent for PastedCallback {
    async fn authenticate(
        &self,
        authorization_url: &Url,
        callback_scheme: &str,
    ) -> Result<Url, AuthFailure> {
        open_browser(authorization_url)?;
        eprintln!("Paste the {callback_scheme}:// url the browser was sent to (empty to cancel):");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|err| AuthFailure::Failed(err.to_string()))?;

        let line = line.trim();
        if line.is_empty() {
            return Err(AuthFailure::Cancelled);
        }

        let callback =
            Url::parse(line).map_err(|err| AuthFailure::Failed(format!("not a url: {err}")))?;
        if callback.scheme() != callback_scheme {
            return Err(AuthFailure::Failed(format!(
                "expected a {callback_scheme}:// url, got {}://",
                callback.scheme()
            )));
        }
        Ok(callback)
    }
}
