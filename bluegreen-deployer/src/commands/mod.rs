pub mod deploy;
pub mod inspect;

use anyhow::{Context, Result};
use bluegreen_orchestrations::HttpProvider;

use crate::config::ApiSettings;

pub(crate) fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

pub(crate) fn connect(api: &ApiSettings) -> Result<HttpProvider> {
    tracing::debug!(endpoint = %api.endpoint, "Connecting to control plane");
    HttpProvider::new(&api.endpoint, &api.token, &api.compartment_id)
        .context("Failed to create control-plane client")
}
