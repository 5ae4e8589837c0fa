//! Tracing domains.
//!
//! A domain is a tracing source category, each served by its own consumer
//! daemon process.

use serde::{Deserialize, Serialize};

use crate::health::HealthSubsystem;

/// A tracing source category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceDomain {
    /// Kernel tracepoints
    Kernel,
    /// User-space tracepoints, buffers shared per uid
    UserUid,
    /// User-space tracepoints, buffers owned per pid
    UserPid,
}

impl TraceDomain {
    /// All domains, in consumer-attach order.
    pub const ALL: [TraceDomain; 3] = [
        TraceDomain::Kernel,
        TraceDomain::UserUid,
        TraceDomain::UserPid,
    ];

    /// Health subsystem covering this domain's consumer.
    pub fn health_subsystem(self) -> HealthSubsystem {
        match self {
            TraceDomain::Kernel => HealthSubsystem::KernelConsumer,
            TraceDomain::UserUid => HealthSubsystem::UserUidConsumer,
            TraceDomain::UserPid => HealthSubsystem::UserPidConsumer,
        }
    }

    /// Short name used in socket paths and logs.
    pub fn short_name(self) -> &'static str {
        match self {
            TraceDomain::Kernel => "kernel",
            TraceDomain::UserUid => "ust-uid",
            TraceDomain::UserPid => "ust-pid",
        }
    }
}

impl std::fmt::Display for TraceDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}
