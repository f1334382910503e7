//! Resolve the routable addresses of a compute target.
//!
//! Providers expose addresses inconsistently, so resolution walks an ordered
//! list of lookup tiers and stops once every wanted address kind is known:
//!
//! 1. the network-interface listing for the target
//! 2. address fields embedded in the target descriptor
//! 3. network interfaces referenced by id from the descriptor
//! 4. any IPv4 literal found anywhere in the raw descriptor
//!
//! Tiers fill address kinds independently: a private address found early does
//! not stop the search for a public one. Resolution never fails; missing
//! addresses are simply absent from the result.

use std::net::Ipv4Addr;

use bluegreen_models::{string_field, AddressKind, NetworkInterface, ResolvedAddresses};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::provider::Provider;

static IPV4_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("IPv4 token pattern is valid"));

const PRIVATE_KEYS: [&str; 4] =
    ["privateIp", "private_ip", "privateIpAddress", "private_ip_address"];
const PUBLIC_KEYS: [&str; 4] = ["publicIp", "public_ip", "publicIpAddress", "public_ip_address"];
const INTERFACE_ID_KEYS: [&str; 4] =
    ["vnicId", "vnic_id", "networkInterfaceId", "network_interface_id"];
const NESTED_INTERFACE_KEYS: [&str; 4] =
    ["vnics", "networkInterfaces", "network_interfaces", "primaryVnic"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressTier {
    InterfaceListing,
    DescriptorFields,
    AttachedInterface,
    DescriptorScan,
}

const TIERS: [AddressTier; 4] = [
    AddressTier::InterfaceListing,
    AddressTier::DescriptorFields,
    AddressTier::AttachedInterface,
    AddressTier::DescriptorScan,
];

#[derive(Debug)]
enum TierError {
    /// Nothing found here; the next tier may still help
    Recoverable(String),
    /// The target is gone; later tiers cannot help either
    Fatal(String),
}

struct Lookup<'a, P: ?Sized> {
    provider: &'a P,
    target_id: &'a str,
    descriptor: Option<Value>,
}

impl<'a, P: Provider + ?Sized> Lookup<'a, P> {
    async fn descriptor(&mut self) -> Result<&Value, TierError> {
        if self.descriptor.is_none() {
            let raw = self.provider.get_target(self.target_id).await.map_err(|e| {
                if e.is_not_found() {
                    TierError::Fatal(e.to_string())
                } else {
                    TierError::Recoverable(format!("descriptor unavailable: {}", e))
                }
            })?;
            self.descriptor = Some(raw);
        }
        self.descriptor
            .as_ref()
            .ok_or_else(|| TierError::Recoverable("descriptor unavailable".to_string()))
    }

    async fn run(&mut self, tier: AddressTier) -> Result<ResolvedAddresses, TierError> {
        match tier {
            AddressTier::InterfaceListing => {
                let interfaces = self
                    .provider
                    .list_network_interfaces_for_target(self.target_id)
                    .await
                    .map_err(|e| {
                        TierError::Recoverable(format!("interface listing failed: {}", e))
                    })?;
                if interfaces.is_empty() {
                    return Err(TierError::Recoverable("no interfaces listed".to_string()));
                }
                Ok(from_interfaces(&interfaces))
            }
            AddressTier::DescriptorFields => {
                let found = addresses_in_fields(self.descriptor().await?);
                if found == ResolvedAddresses::default() {
                    return Err(TierError::Recoverable(
                        "descriptor has no address fields".to_string(),
                    ));
                }
                Ok(found)
            }
            AddressTier::AttachedInterface => {
                let ids = interface_ids(self.descriptor().await?);
                if ids.is_empty() {
                    return Err(TierError::Recoverable(
                        "descriptor references no interface".to_string(),
                    ));
                }
                let mut interfaces = Vec::new();
                for id in &ids {
                    match self.provider.get_network_interface(id).await {
                        Ok(interface) => interfaces.push(interface),
                        Err(e) => {
                            tracing::debug!(interface_id = %id, "Interface lookup failed: {}", e)
                        }
                    }
                }
                if interfaces.is_empty() {
                    return Err(TierError::Recoverable(
                        "referenced interfaces could not be read".to_string(),
                    ));
                }
                Ok(from_interfaces(&interfaces))
            }
            AddressTier::DescriptorScan => Ok(scan_for_addresses(self.descriptor().await?)),
        }
    }
}

/// Resolve the `wanted` address kinds of a target, best effort
pub async fn resolve_addresses<P: Provider + ?Sized>(
    provider: &P,
    target_id: &str,
    wanted: &[AddressKind],
) -> ResolvedAddresses {
    let mut resolved = ResolvedAddresses::default();
    let mut lookup = Lookup {
        provider,
        target_id,
        descriptor: None,
    };

    for tier in TIERS {
        if wanted.iter().all(|kind| resolved.has(*kind)) {
            break;
        }
        match lookup.run(tier).await {
            Ok(found) => {
                for kind in wanted {
                    if !resolved.has(*kind) {
                        if let Some(address) = found.get(*kind) {
                            tracing::debug!(
                                target_id,
                                ?tier,
                                kind = %kind,
                                address,
                                "Address found"
                            );
                            resolved.fill(*kind, Some(address.to_string()));
                        }
                    }
                }
            }
            Err(TierError::Recoverable(reason)) => {
                tracing::debug!(target_id, ?tier, "Address tier produced nothing: {}", reason);
            }
            Err(TierError::Fatal(reason)) => {
                tracing::warn!(target_id, ?tier, "Stopping address resolution: {}", reason);
                break;
            }
        }
    }

    for kind in wanted {
        if !resolved.has(*kind) {
            tracing::warn!(target_id, kind = %kind, "No address resolved");
        }
    }
    resolved
}

fn from_interfaces(interfaces: &[NetworkInterface]) -> ResolvedAddresses {
    ResolvedAddresses {
        private_address: interfaces.iter().find_map(|i| i.private_ip.clone()),
        public_address: interfaces.iter().find_map(|i| i.public_ip.clone()),
    }
}

/// The descriptor itself plus any interface objects nested in it
fn address_carriers(raw: &Value) -> Vec<&Value> {
    let mut carriers = vec![raw];
    for key in NESTED_INTERFACE_KEYS {
        match raw.get(key) {
            Some(Value::Array(items)) => carriers.extend(items.iter()),
            Some(obj @ Value::Object(_)) => carriers.push(obj),
            _ => {}
        }
    }
    carriers
}

fn addresses_in_fields(raw: &Value) -> ResolvedAddresses {
    let carriers = address_carriers(raw);
    ResolvedAddresses {
        private_address: carriers.iter().find_map(|c| string_field(c, &PRIVATE_KEYS)),
        public_address: carriers.iter().find_map(|c| string_field(c, &PUBLIC_KEYS)),
    }
}

fn interface_ids(raw: &Value) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for carrier in address_carriers(raw) {
        if let Some(id) = string_field(carrier, &INTERFACE_ID_KEYS) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Last resort: classify every IPv4 literal in the descriptor
fn scan_for_addresses(raw: &Value) -> ResolvedAddresses {
    let text = raw.to_string();
    let mut found = ResolvedAddresses::default();
    for token in IPV4_TOKEN.find_iter(&text) {
        let Ok(ip) = token.as_str().parse::<Ipv4Addr>() else {
            continue;
        };
        if ip.is_private() {
            found.fill(AddressKind::Private, Some(ip.to_string()));
        } else if is_routable_public(&ip) {
            found.fill(AddressKind::Public, Some(ip.to_string()));
        }
    }
    found
}

fn is_routable_public(ip: &Ipv4Addr) -> bool {
    !(ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast())
}
