// src/operation.rs
use std::fmt;
use std::str::FromStr;

use crate::error::NodeError;

/// Which group of operations a kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Document,
    SearchIndexes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Aggregate,
    Find,
    Delete,
    Insert,
    Update,
    FindOneAndReplace,
    FindOneAndUpdate,
    ListSearchIndexes,
    CreateSearchIndex,
    UpdateSearchIndex,
    DropSearchIndex,
}

impl OperationKind {
    pub const ALL: [OperationKind; 11] = [
        OperationKind::Aggregate,
        OperationKind::Find,
        OperationKind::Delete,
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::FindOneAndReplace,
        OperationKind::FindOneAndUpdate,
        OperationKind::ListSearchIndexes,
        OperationKind::CreateSearchIndex,
        OperationKind::UpdateSearchIndex,
        OperationKind::DropSearchIndex,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::Find => "find",
            Self::Delete => "delete",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::FindOneAndReplace => "findOneAndReplace",
            Self::FindOneAndUpdate => "findOneAndUpdate",
            Self::ListSearchIndexes => "listSearchIndexes",
            Self::CreateSearchIndex => "createSearchIndex",
            Self::UpdateSearchIndex => "updateSearchIndex",
            Self::DropSearchIndex => "dropSearchIndex",
        }
    }

    pub const fn resource(&self) -> Resource {
        match self {
            Self::ListSearchIndexes
            | Self::CreateSearchIndex
            | Self::UpdateSearchIndex
            | Self::DropSearchIndex => Resource::SearchIndexes,
            _ => Resource::Document,
        }
    }

    /// Whole-batch kinds collect every result and tag each one with the full
    /// input provenance instead of the item that produced it.
    pub const fn is_whole_batch(&self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Update | Self::FindOneAndReplace | Self::FindOneAndUpdate
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| NodeError::validation(format!("The operation \"{}\" is not supported", s)))
    }
}

/// How many passes the dispatcher makes over the input.
///
/// Node versions before 1.1 ran a single pass no matter how many items came
/// in and tagged every result with all of them; later versions run once per
/// item. Both behaviours are kept for saved workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemMode {
    Legacy,
    PerItem,
}

impl ItemMode {
    pub const FIRST_PER_ITEM_VERSION: f64 = 1.1;

    pub fn for_type_version(version: f64) -> Self {
        if version >= Self::FIRST_PER_ITEM_VERSION {
            ItemMode::PerItem
        } else {
            ItemMode::Legacy
        }
    }

    /// Number of passes to make over `item_count` inputs.
    pub fn passes(&self, item_count: usize) -> usize {
        match self {
            ItemMode::Legacy => usize::from(item_count > 0),
            ItemMode::PerItem => item_count,
        }
    }
}
