//! Persisted row shapes for registrants and account links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Audit, EntityId};

/// A registrant row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrantRecord {
    pub id: EntityId,
    pub name: String,
    /// Unique across registrants.
    pub email: String,
    pub audit: Audit,
}

/// Link between a local registrant and its account in the identity system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLink {
    /// Unique: at most one link per registrant.
    pub registrant_id: EntityId,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}
