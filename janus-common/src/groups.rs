//! Admin group mappings and list pagination.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Maps a human label to a code-host group and a UI tag class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub gitlab_id: u64,
    /// CSS class used to render the group tag (see bulma.io tag colors).
    #[serde(default)]
    pub tag_class: String,
}

impl Group {
    /// Resolve a label to its code-host group id.
    pub fn find<'a>(groups: &'a [Group], name: &str) -> Option<&'a Group> {
        groups.iter().find(|g| g.name == name)
    }

    /// Label to tag class lookup for rendering.
    pub fn tag_classes(groups: &[Group]) -> BTreeMap<String, String> {
        groups
            .iter()
            .map(|g| (g.name.clone(), g.tag_class.clone()))
            .collect()
    }

    /// Sorted labels of the groups a user belongs to.
    pub fn labels_for_user(members: &HashMap<String, HashSet<u64>>, user_id: u64) -> Vec<String> {
        let mut labels: Vec<String> = members
            .iter()
            .filter(|(_, ids)| ids.contains(&user_id))
            .map(|(label, _)| label.clone())
            .collect();
        labels.sort();
        labels
    }
}

/// Page position of a user listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub this: u32,
    pub last: u32,
    pub num_after: u32,
    pub show: u32,
}

impl Pagination {
    pub fn new(this: u32, last: u32, show: u32) -> Self {
        Self {
            this,
            last,
            num_after: last.saturating_sub(this),
            show,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.this > 1
    }

    pub fn has_next(&self) -> bool {
        self.num_after > 0
    }

    pub fn prev(&self) -> u32 {
        self.this.saturating_sub(1).max(1)
    }

    pub fn next(&self) -> u32 {
        self.this + 1
    }
}
