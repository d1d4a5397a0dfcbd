//! Backup orchestration for a single target and out-of-band verification
//! of the cluster state a backup leaves behind.

pub mod backup;
pub mod cluster;
pub mod executor;
pub mod hooks;
pub mod readiness;
pub mod resolver;
pub mod verify;
