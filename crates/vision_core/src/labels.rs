use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Fixed mapping from class id to display name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelVocabulary {
    names: BTreeMap<u32, String>,
}

impl LabelVocabulary {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            names: entries.into_iter().map(|(id, s)| (id, s.into())).collect(),
        }
    }

    /// Display name, or `class_<id>` for ids missing from the table.
    pub fn name_for(&self, id: u32) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("class_{id}"))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Which class ids may appear in the filtered output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AllowedLabels {
    #[default]
    All,
    Only(BTreeSet<u32>),
}

impl AllowedLabels {
    pub fn only<I: IntoIterator<Item = u32>>(ids: I) -> Self {
        AllowedLabels::Only(ids.into_iter().collect())
    }

    pub fn contains(&self, id: u32) -> bool {
        match self {
            AllowedLabels::All => true,
            AllowedLabels::Only(ids) => ids.contains(&id),
        }
    }
}

impl From<Option<Vec<u32>>> for AllowedLabels {
    fn from(ids: Option<Vec<u32>>) -> Self {
        match ids {
            Some(ids) => AllowedLabels::only(ids),
            None => AllowedLabels::All,
        }
    }
}
