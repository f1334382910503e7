//! Activities: single provider-facing steps.
//!
//! Each activity does one thing against the control plane and is safe to
//! repeat. Orchestrations compose them into flows.

pub mod render_spec;
pub mod resolve_address;
pub mod resolve_targets;
pub mod retire_target;
pub mod verify_image;
pub mod wait_for_operation;
