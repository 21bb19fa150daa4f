// ============================================================================
// Enterprise Domain
// ============================================================================
//
// - Value objects (Industry, CompanySize, EnterpriseStatus, ...)
// - Commands (CreateEnterprise, UpdateEnterprise)
// - Errors (EnterpriseError)
// - Record and rules (Enterprise, EnterpriseChanges)
// - Command handler (create / modify / remove / list with audit events)
//
// ============================================================================

pub mod value_objects;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

pub use value_objects::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
