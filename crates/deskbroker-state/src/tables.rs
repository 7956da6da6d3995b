//! redb table definitions for the deskbroker state store.
//!
//! Values are JSON-serialized `StoredAssignment` records.

use redb::TableDefinition;

/// Assignments keyed by `{user_id}`.
pub const ASSIGNMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("assignments");
