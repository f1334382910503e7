//! Run configuration, built once at process start and passed by reference

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use bluegreen_models::{AddressKind, BackendSetRef, Strategy};
use uuid::Uuid;

/// Everything one orchestration run needs to know
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Logical deployment name; targets are matched on it
    pub name: String,
    pub compartment_id: String,
    pub subnet_id: String,
    pub availability_domain: Option<String>,
    /// Desired container image reference
    pub image: String,
    pub container_port: u16,
    pub backend_set: BackendSetRef,
    pub strategy: Strategy,
    /// Delete older duplicate targets after a verified update
    pub cleanup_duplicates: bool,
    /// Fall back to replace when an update cannot be verified
    pub fallback_to_replace: bool,
    pub sizing: Sizing,
    pub datastore: DatastoreConfig,
    pub traffic_address: AddressKind,
    pub timeouts: Timeouts,
    pub provenance: Provenance,
    /// When set, `GET http://{address}:{port}{path}` must answer 2xx before cutover
    pub smoke_path: Option<String>,
    /// Overrides the embedded target spec template
    pub spec_template: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sizing {
    pub shape: String,
    pub ocpus: f32,
    pub memory_gb: f32,
}

impl Default for Sizing {
    fn default() -> Self {
        Self {
            shape: "CI.Standard.E4.Flex".to_string(),
            ocpus: 1.0,
            memory_gb: 4.0,
        }
    }
}

/// Connection parameters handed to the application container
#[derive(Clone)]
pub struct DatastoreConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl DatastoreConfig {
    /// Container environment carrying the datastore connection
    pub fn environment(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("SPRING_DATASOURCE_URL".to_string(), self.url.clone()),
            ("SPRING_DATASOURCE_USERNAME".to_string(), self.username.clone()),
            ("SPRING_DATASOURCE_PASSWORD".to_string(), self.password.clone()),
        ])
    }
}

impl std::fmt::Debug for DatastoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastoreConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Per-wait-point deadlines and poll cadence
#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    /// Long-running operation completion
    pub operation: Duration,
    /// Target reaching ACTIVE or disappearing
    pub target_state: Duration,
    /// Backend visibility plus health gate
    pub health: Duration,
    pub poll_interval: Duration,
    pub health_poll_interval: Duration,
    pub verify_attempts: u32,
    /// Base delay between verification attempts, grows linearly
    pub verify_backoff: Duration,
    pub smoke_attempts: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            operation: Duration::from_secs(900),
            target_state: Duration::from_secs(600),
            health: Duration::from_secs(300),
            poll_interval: Duration::from_secs(10),
            health_poll_interval: Duration::from_secs(10),
            verify_attempts: 4,
            verify_backoff: Duration::from_secs(5),
            smoke_attempts: 5,
        }
    }
}

/// Who deployed what, stamped onto every target as free-form tags
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub run_id: Uuid,
    pub source_revision: Option<String>,
    pub deployed_by: Option<String>,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source_revision: None,
            deployed_by: None,
        }
    }
}

impl DeployConfig {
    pub fn tags(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert("deployment-name".to_string(), self.name.clone());
        tags.insert("deployment-run".to_string(), self.provenance.run_id.to_string());
        if let Some(revision) = &self.provenance.source_revision {
            tags.insert("source-revision".to_string(), revision.clone());
        }
        if let Some(who) = &self.provenance.deployed_by {
            tags.insert("deployed-by".to_string(), who.clone());
        }
        tags
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> DeployConfig {
    DeployConfig {
        name: "crud-app".to_string(),
        compartment_id: "ocid1.compartment.test".to_string(),
        subnet_id: "ocid1.subnet.test".to_string(),
        availability_domain: None,
        image: "registry.example.com/crud-app:new-2".to_string(),
        container_port: 8080,
        backend_set: BackendSetRef {
            load_balancer_id: "ocid1.loadbalancer.test".to_string(),
            name: "crud-backends".to_string(),
        },
        strategy: Strategy::Update,
        cleanup_duplicates: true,
        fallback_to_replace: true,
        sizing: Sizing::default(),
        datastore: DatastoreConfig {
            url: "jdbc:postgresql://db.internal:5432/app".to_string(),
            username: "app".to_string(),
            password: "secret".to_string(),
        },
        traffic_address: AddressKind::Private,
        timeouts: Timeouts {
            operation: Duration::from_secs(120),
            target_state: Duration::from_secs(120),
            health: Duration::from_secs(60),
            poll_interval: Duration::from_secs(10),
            health_poll_interval: Duration::from_secs(5),
            verify_attempts: 4,
            verify_backoff: Duration::from_secs(5),
            smoke_attempts: 3,
        },
        provenance: Provenance {
            run_id: Uuid::nil(),
            source_revision: Some("abc123".to_string()),
            deployed_by: Some("ci".to_string()),
        },
        smoke_path: None,
        spec_template: None,
    }
}
