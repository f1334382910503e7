//! Render the create/update payload for a compute target

use bluegreen_models::TargetSpec;
use tera::{Context as TeraContext, Tera};

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};

const TEMPLATE_NAME: &str = "target-spec.yaml";
const DEFAULT_TEMPLATE: &str = include_str!("../../templates/target-spec.yaml");

/// Render the target spec for `config`, using the configured template
/// override when there is one.
pub fn render_target_spec(config: &DeployConfig) -> Result<TargetSpec> {
    let template = match &config.spec_template {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            DeployError::Configuration(format!(
                "Failed to read spec template {}: {}",
                path.display(),
                e
            ))
        })?,
        None => DEFAULT_TEMPLATE.to_string(),
    };

    let mut tera = Tera::default();
    tera.add_raw_template(TEMPLATE_NAME, &template)
        .map_err(|e| DeployError::Configuration(format!("Invalid spec template: {}", e)))?;

    let mut template_ctx = TeraContext::new();
    template_ctx.insert("name", &config.name);
    template_ctx.insert("compartment_id", &config.compartment_id);
    template_ctx.insert("availability_domain", &config.availability_domain);
    template_ctx.insert("subnet_id", &config.subnet_id);
    template_ctx.insert("shape", &config.sizing.shape);
    template_ctx.insert("ocpus", &config.sizing.ocpus);
    template_ctx.insert("memory_gb", &config.sizing.memory_gb);
    template_ctx.insert("image", &config.image);
    template_ctx.insert("container_port", &config.container_port);
    template_ctx.insert("environment", &config.datastore.environment());
    template_ctx.insert("tags", &config.tags());

    let yaml = tera
        .render(TEMPLATE_NAME, &template_ctx)
        .map_err(|e| DeployError::Configuration(format!("Failed to render spec template: {}", e)))?;

    serde_yaml::from_str(&yaml).map_err(|e| {
        DeployError::Configuration(format!("Rendered spec is not a valid target spec: {}", e))
    })
}
