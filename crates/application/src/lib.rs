//! Application services and ports.

#![forbid(unsafe_code)]

mod assignment_ports;
mod audit_log_writer;
mod engine_config;
mod governance_service;
mod lookups;
mod permission_engine;
mod point_in_time_service;
mod resolver;
mod revocation_service;

#[cfg(test)]
mod test_support;

pub use assignment_ports::{
    AssignmentHistory, AssignmentReader, AssignmentStore, AssignmentTransaction,
};
pub use audit_log_writer::AuditLogWriter;
pub use engine_config::{EngineConfig, MAX_SUPPORTED_DELEGATION_DEPTH};
pub use governance_service::{
    DelegationInput, GovernanceService, MutationContext, MutationReceipt, ResourceGrantInput,
};
pub use permission_engine::PermissionEngine;
pub use point_in_time_service::PointInTimeService;
pub use revocation_service::{CascadeReport, RevocationService};
