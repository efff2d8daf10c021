//! Relation model: directed, labeled edges between graph assets.
//!
//! Relations are append-only; re-observing an existing edge refreshes its
//! `last_seen` timestamp instead of creating a duplicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The label on a directed relation between two assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationLabel {
    /// FQDN to its domain registration record.
    Registration,
    /// Registration record to the registrant contact entity.
    Registrant,
    /// Domain record to the registrant contact entity.
    RegistrantContact,
    /// Registration-mediated association between two records.
    AssociatedWith,
    /// FQDN to the address it resolves to.
    ResolvesTo,
    /// FQDN to its parent domain.
    SubdomainOf,
    /// Netblock to an address inside it.
    Contains,
    /// Autonomous system to a netblock it announces.
    Announces,
    /// Contact entity to a person.
    Person,
    /// Contact entity to an organization.
    Organization,
    /// Contact entity to a postal address.
    Location,
    /// Contact entity to a phone number.
    Phone,
    /// Contact entity to an email address.
    Email,
    /// Asset to the source it was discovered by.
    Source,
}

impl RelationLabel {
    /// Returns the stable string form used in logs and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationLabel::Registration => "registration",
            RelationLabel::Registrant => "registrant",
            RelationLabel::RegistrantContact => "registrant_contact",
            RelationLabel::AssociatedWith => "associated_with",
            RelationLabel::ResolvesTo => "resolves_to",
            RelationLabel::SubdomainOf => "subdomain_of",
            RelationLabel::Contains => "contains",
            RelationLabel::Announces => "announces",
            RelationLabel::Person => "person",
            RelationLabel::Organization => "organization",
            RelationLabel::Location => "location",
            RelationLabel::Phone => "phone",
            RelationLabel::Email => "email",
            RelationLabel::Source => "source",
        }
    }
}

impl fmt::Display for RelationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, labeled edge between two assets in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Unique identifier for this relation.
    pub id: Uuid,
    /// Source asset of the edge.
    pub from_id: Uuid,
    /// Target asset of the edge.
    pub to_id: Uuid,
    /// Edge label.
    pub label: RelationLabel,
    /// When the relation was first observed.
    pub created_at: DateTime<Utc>,
    /// When the relation was last observed.
    pub last_seen: DateTime<Utc>,
}

impl Relation {
    /// Creates a new relation observed now.
    pub fn new(from_id: Uuid, to_id: Uuid, label: RelationLabel) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            from_id,
            to_id,
            label,
            created_at: now,
            last_seen: now,
        }
    }

    /// Refreshes the `last_seen` timestamp.
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_strings() {
        assert_eq!(RelationLabel::AssociatedWith.as_str(), "associated_with");
        assert_eq!(
            RelationLabel::RegistrantContact.as_str(),
            "registrant_contact"
        );
    }

    #[test]
    fn test_touch_refreshes_last_seen() {
        let mut rel = Relation::new(Uuid::new_v4(), Uuid::new_v4(), RelationLabel::Source);
        let before = rel.last_seen;
        rel.touch();
        assert!(rel.last_seen >= before);
    }
}
