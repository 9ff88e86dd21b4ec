//! Audit infrastructure

mod writer;

pub use writer::AuditLogWriter;
