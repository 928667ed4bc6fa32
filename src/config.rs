use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt, str::FromStr, time::Duration};
use url::Url;

use crate::services::store::MAX_PRESIGN_TTL;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_PRESIGN_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Which object-store implementation backs the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// S3-compatible service (MinIO in production).
    S3,
    /// Process-local store, contents are lost on exit.
    Memory,
}

/// A string that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// Connection settings for the S3-compatible backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `host[:port]`, optionally with an explicit `http://` or `https://` scheme.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: Secret,
    /// Use TLS when the endpoint carries no scheme.
    pub secure: bool,
    pub region: String,
}

impl StoreConfig {
    /// Endpoint as a full URL, as the AWS SDK expects it.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else if self.secure {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    /// Present when `backend` is `S3`.
    pub store: Option<StoreConfig>,
    pub presign_ttl: Duration,
    pub max_upload_bytes: usize,
    pub max_archive_bytes: Option<u64>,
    /// Base for the URLs handed out by the memory backend.
    pub public_url: Url,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "HTTP gateway for uploading, listing and zipping bucket objects")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides OBJECT_GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Object store endpoint (overrides MINIO_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_sources(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge parsed CLI args over values looked up through `env`.
    pub fn from_sources<F>(args: Args, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = args
            .host
            .or_else(|| env("OBJECT_GATEWAY_HOST"))
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = match args.port {
            Some(port) => port,
            None => parse_var(&env, "OBJECT_GATEWAY_PORT")?.unwrap_or(DEFAULT_PORT),
        };

        let backend = match args.backend {
            Some(backend) => backend,
            None => match env("OBJECT_GATEWAY_BACKEND") {
                Some(value) => <Backend as ValueEnum>::from_str(&value, true).map_err(|err| {
                    anyhow!("parsing OBJECT_GATEWAY_BACKEND value `{}`: {}", value, err)
                })?,
                None => Backend::S3,
            },
        };

        let store = match backend {
            Backend::S3 => Some(StoreConfig {
                endpoint: args
                    .endpoint
                    .or_else(|| env("MINIO_ENDPOINT"))
                    .context("MINIO_ENDPOINT is required for the s3 backend")?,
                access_key: env("MINIO_ACCESS_KEY")
                    .context("MINIO_ACCESS_KEY is required for the s3 backend")?,
                secret_key: Secret::new(
                    env("MINIO_SECRET_KEY")
                        .context("MINIO_SECRET_KEY is required for the s3 backend")?,
                ),
                secure: match env("MINIO_SECURE") {
                    Some(value) => parse_bool(&value)
                        .with_context(|| format!("parsing MINIO_SECURE value `{}`", value))?,
                    None => true,
                },
                region: env("MINIO_REGION").unwrap_or_else(|| "us-east-1".into()),
            }),
            Backend::Memory => None,
        };

        let presign_secs: u64 =
            parse_var(&env, "OBJECT_GATEWAY_PRESIGN_TTL_SECS")?.unwrap_or(DEFAULT_PRESIGN_TTL_SECS);
        let presign_ttl = Duration::from_secs(presign_secs);
        if presign_ttl.is_zero() || presign_ttl > MAX_PRESIGN_TTL {
            bail!(
                "OBJECT_GATEWAY_PRESIGN_TTL_SECS must be between 1 and {}",
                MAX_PRESIGN_TTL.as_secs()
            );
        }

        let max_upload_bytes = parse_var(&env, "OBJECT_GATEWAY_MAX_UPLOAD_BYTES")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let max_archive_bytes = parse_var(&env, "OBJECT_GATEWAY_MAX_ARCHIVE_BYTES")?;

        let public_url = match env("OBJECT_GATEWAY_PUBLIC_URL") {
            Some(value) => Url::parse(&value)
                .with_context(|| format!("parsing OBJECT_GATEWAY_PUBLIC_URL value `{}`", value))?,
            None => Url::parse(&format!("http://localhost:{}", port))
                .context("building default public url")?,
        };

        Ok(Self {
            host,
            port,
            backend,
            store,
            presign_ttl,
            max_upload_bytes,
            max_archive_bytes,
            public_url,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", key, value))
        })
        .transpose()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got `{}`", other),
    }
}
