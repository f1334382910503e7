use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bluegreen_models::{AddressKind, BackendSetRef, Strategy};
use bluegreen_orchestrations::{DatastoreConfig, DeployConfig, Provenance, Sizing, Timeouts};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },

    #[error("{what} not found: {}", .path.display())]
    MissingFile { what: &'static str, path: PathBuf },
}

/// Control-plane access settings
#[derive(Clone)]
pub struct ApiSettings {
    pub endpoint: String,
    pub token: String,
    pub compartment_id: String,
}

impl std::fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSettings")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("compartment_id", &self.compartment_id)
            .finish()
    }
}

/// Command-line values that take precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub image: Option<String>,
    pub strategy: Option<Strategy>,
    pub no_cleanup_duplicates: bool,
    pub no_fallback: bool,
    pub traffic_address: Option<AddressKind>,
    pub smoke_path: Option<String>,
}

/// Reads variables and remembers every required one that is missing, so
/// they can all be reported at once
struct Env<F> {
    lookup: F,
    missing: Vec<String>,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            missing: Vec::new(),
        }
    }

    fn optional(&self, var: &str) -> Option<String> {
        (self.lookup)(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&mut self, var: &str) -> String {
        self.optional(var).unwrap_or_else(|| {
            self.missing.push(var.to_string());
            String::new()
        })
    }

    fn parsed<T>(&self, var: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(var) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: var.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn seconds(&self, var: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parsed(var, default.as_secs()).map(Duration::from_secs)
    }

    fn finish(&mut self) -> Result<(), ConfigError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(std::mem::take(&mut self.missing)))
        }
    }
}

enum TokenSource {
    Inline(String),
    File(PathBuf),
}

impl TokenSource {
    fn resolve(self) -> Result<String, ConfigError> {
        match self {
            Self::Inline(token) => Ok(token),
            Self::File(path) => {
                if !path.is_file() {
                    return Err(ConfigError::MissingFile {
                        what: "API token file",
                        path,
                    });
                }
                std::fs::read_to_string(&path)
                    .map(|token| token.trim().to_string())
                    .map_err(|e| ConfigError::Invalid {
                        var: "BLUEGREEN_API_TOKEN_FILE".to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    }
}

fn token_source<F: Fn(&str) -> Option<String>>(env: &mut Env<F>) -> Option<TokenSource> {
    if let Some(token) = env.optional("BLUEGREEN_API_TOKEN") {
        return Some(TokenSource::Inline(token));
    }
    if let Some(path) = env.optional("BLUEGREEN_API_TOKEN_FILE") {
        return Some(TokenSource::File(PathBuf::from(path)));
    }
    env.missing
        .push("BLUEGREEN_API_TOKEN (or BLUEGREEN_API_TOKEN_FILE)".to_string());
    None
}

fn load_timeouts<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Timeouts, ConfigError> {
    let defaults = Timeouts::default();
    Ok(Timeouts {
        operation: env.seconds("BLUEGREEN_OPERATION_TIMEOUT_SECS", defaults.operation)?,
        target_state: env.seconds("BLUEGREEN_TARGET_TIMEOUT_SECS", defaults.target_state)?,
        health: env.seconds("BLUEGREEN_HEALTH_TIMEOUT_SECS", defaults.health)?,
        poll_interval: env.seconds("BLUEGREEN_POLL_INTERVAL_SECS", defaults.poll_interval)?,
        health_poll_interval: env.seconds(
            "BLUEGREEN_HEALTH_POLL_INTERVAL_SECS",
            defaults.health_poll_interval,
        )?,
        ..defaults
    })
}

/// Settings for the single-step commands (targets, retire, addresses)
#[derive(Debug, Clone)]
pub struct InspectSettings {
    pub api: ApiSettings,
    pub name: String,
    pub timeouts: Timeouts,
}

pub fn load_inspect(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<InspectSettings, ConfigError> {
    let mut env = Env::new(lookup);
    let name = env.required("BLUEGREEN_NAME");
    let endpoint = env.required("BLUEGREEN_API_ENDPOINT");
    let compartment_id = env.required("BLUEGREEN_COMPARTMENT_ID");
    let token = token_source(&mut env);
    env.finish()?;

    let timeouts = load_timeouts(&env)?;
    let api = ApiSettings {
        endpoint,
        token: token.map(TokenSource::resolve).transpose()?.unwrap_or_default(),
        compartment_id,
    };
    Ok(InspectSettings { api, name, timeouts })
}

/// Full configuration for a deployment run
pub fn load_deploy(
    lookup: impl Fn(&str) -> Option<String>,
    overrides: &Overrides,
) -> Result<(ApiSettings, DeployConfig), ConfigError> {
    let mut env = Env::new(lookup);

    let name = env.required("BLUEGREEN_NAME");
    let subnet_id = env.required("BLUEGREEN_SUBNET_ID");
    let image = match &overrides.image {
        Some(image) => image.clone(),
        None => env.required("BLUEGREEN_IMAGE"),
    };
    let load_balancer_id = env.required("BLUEGREEN_LOAD_BALANCER_ID");
    let backend_set = env.required("BLUEGREEN_BACKEND_SET");
    let datastore = DatastoreConfig {
        url: env.required("BLUEGREEN_DB_URL"),
        username: env.required("BLUEGREEN_DB_USERNAME"),
        password: env.required("BLUEGREEN_DB_PASSWORD"),
    };
    let endpoint = env.required("BLUEGREEN_API_ENDPOINT");
    let compartment_id = env.required("BLUEGREEN_COMPARTMENT_ID");
    let token = token_source(&mut env);
    env.finish()?;

    let strategy = match overrides.strategy {
        Some(strategy) => strategy,
        None => parse_strategy(env.optional("BLUEGREEN_STRATEGY").as_deref())?,
    };
    let traffic_address = match overrides.traffic_address {
        Some(kind) => kind,
        None => parse_address_kind(env.optional("BLUEGREEN_TRAFFIC_ADDRESS").as_deref())?,
    };

    let timeouts = load_timeouts(&env)?;

    let sizing_defaults = Sizing::default();
    let sizing = Sizing {
        shape: env.optional("BLUEGREEN_SHAPE").unwrap_or(sizing_defaults.shape),
        ocpus: env.parsed("BLUEGREEN_OCPUS", sizing_defaults.ocpus)?,
        memory_gb: env.parsed("BLUEGREEN_MEMORY_GB", sizing_defaults.memory_gb)?,
    };

    let spec_template = env.optional("BLUEGREEN_SPEC_TEMPLATE").map(PathBuf::from);
    if let Some(path) = &spec_template {
        if !path.is_file() {
            return Err(ConfigError::MissingFile {
                what: "spec template",
                path: path.clone(),
            });
        }
    }
    let api = ApiSettings {
        endpoint,
        token: token.map(TokenSource::resolve).transpose()?.unwrap_or_default(),
        compartment_id,
    };

    let config = DeployConfig {
        name,
        compartment_id: api.compartment_id.clone(),
        subnet_id,
        availability_domain: env.optional("BLUEGREEN_AVAILABILITY_DOMAIN"),
        image,
        container_port: env.parsed("BLUEGREEN_CONTAINER_PORT", 8080u16)?,
        backend_set: BackendSetRef {
            load_balancer_id,
            name: backend_set,
        },
        strategy,
        cleanup_duplicates: !overrides.no_cleanup_duplicates,
        fallback_to_replace: !overrides.no_fallback,
        sizing,
        datastore,
        traffic_address,
        timeouts,
        provenance: Provenance {
            run_id: Uuid::new_v4(),
            source_revision: env.optional("BLUEGREEN_SOURCE_REVISION"),
            deployed_by: env.optional("BLUEGREEN_DEPLOYED_BY").or_else(|| env.optional("USER")),
        },
        smoke_path: overrides
            .smoke_path
            .clone()
            .or_else(|| env.optional("BLUEGREEN_SMOKE_PATH")),
        spec_template,
    };

    Ok((api, config))
}

fn parse_strategy(raw: Option<&str>) -> Result<Strategy, ConfigError> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("update") => Ok(Strategy::Update),
        Some("replace") => Ok(Strategy::Replace),
        Some(other) => Err(ConfigError::Invalid {
            var: "BLUEGREEN_STRATEGY".to_string(),
            reason: format!("expected 'update' or 'replace', got '{}'", other),
        }),
    }
}

fn parse_address_kind(raw: Option<&str>) -> Result<AddressKind, ConfigError> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("private") => Ok(AddressKind::Private),
        Some("public") => Ok(AddressKind::Public),
        Some(other) => Err(ConfigError::Invalid {
            var: "BLUEGREEN_TRAFFIC_ADDRESS".to_string(),
            reason: format!("expected 'private' or 'public', got '{}'", other),
        }),
    }
}
