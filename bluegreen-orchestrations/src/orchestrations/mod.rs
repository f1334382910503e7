//! Orchestrations: multi-step flows composed from activities

pub mod blue_green;
pub mod cutover;
pub mod deploy_target;
