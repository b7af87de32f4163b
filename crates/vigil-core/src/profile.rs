use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::IdentityId;

/// Profile attribute value: scalar text or a list of items.
///
/// Lists render joined by `", "` wherever a single string is needed
/// (notification bodies, log output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    List(Vec<String>),
}

impl AttrValue {
    pub fn render(&self) -> String {
        match self {
            AttrValue::Text(text) => text.clone(),
            AttrValue::List(items) => items.join(", "),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One labeled profile detail, e.g. "Threat Level" = "High".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub label: String,
    pub value: AttrValue,
}

/// Enrolled identity with the free-form details shown in alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub id: IdentityId,
    pub name: String,
    /// Watch category, e.g. "Flagged" or "Staff". Alerting keys off this.
    pub category: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl IdentityProfile {
    /// Look up an attribute by label, case-insensitively.
    pub fn attribute(&self, label: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|attr| attr.label.eq_ignore_ascii_case(label))
            .map(|attr| attr.value.render())
    }
}

/// In-memory watchlist: id-to-profile map plus the category that alerts.
pub struct IdentityDirectory {
    profiles: HashMap<IdentityId, IdentityProfile>,
    alert_category: String,
}

impl IdentityDirectory {
    /// Build the directory. Duplicate ids keep the last entry and warn.
    pub fn new(entries: Vec<IdentityProfile>, alert_category: impl Into<String>) -> Self {
        let mut profiles = HashMap::with_capacity(entries.len());
        for profile in entries {
            if let Some(previous) = profiles.insert(profile.id, profile) {
                warn!(id = %previous.id, name = %previous.name, "duplicate profile id; keeping the later entry");
            }
        }
        Self { profiles, alert_category: alert_category.into() }
    }

    /// Profile for `id`, if enrolled. Missing ids are treated as unknown
    /// faces by the caller rather than errors.
    pub fn get(&self, id: IdentityId) -> Option<&IdentityProfile> {
        self.profiles.get(&id)
    }

    /// Whether this profile's category is the one that triggers alerts.
    /// Comparison ignores ASCII case.
    pub fn is_alert(&self, profile: &IdentityProfile) -> bool {
        profile.category.eq_ignore_ascii_case(&self.alert_category)
    }

    pub fn alert_category(&self) -> &str {
        &self.alert_category
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// All profiles, ordered by id for stable listings.
    pub fn iter_sorted(&self) -> Vec<&IdentityProfile> {
        let mut all: Vec<&IdentityProfile> = self.profiles.values().collect();
        all.sort_by_key(|profile| profile.id);
        all
    }
}
