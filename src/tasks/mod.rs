//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Maintenance: purges expired entries and runs smart eviction when over budget

mod maintenance;

pub use maintenance::{
    run_maintenance_pass, spawn_maintenance_task, MaintenanceBudget, MaintenanceReport,
};
