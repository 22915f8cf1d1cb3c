pub mod record;
pub mod runner;
pub mod score;
pub mod validator;

pub use record::AuditRecord;
pub use runner::AuditRunner;
