use std::fmt;

use serde::{Deserialize, Serialize};

/// Operations the dispatchers execute against a resolved resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Index,
    New,
    Create,
    Show,
    Edit,
    Update,
    Destroy,
    Publish,
    Unpublish,
    Dashboard,
    Export,
    Import,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::New => "new",
            Self::Create => "create",
            Self::Show => "show",
            Self::Edit => "edit",
            Self::Update => "update",
            Self::Destroy => "destroy",
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
            Self::Dashboard => "dashboard",
            Self::Export => "export",
            Self::Import => "import",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "index" => Some(Self::Index),
            "new" => Some(Self::New),
            "create" => Some(Self::Create),
            "show" => Some(Self::Show),
            "edit" => Some(Self::Edit),
            "update" => Some(Self::Update),
            "destroy" => Some(Self::Destroy),
            "publish" => Some(Self::Publish),
            "unpublish" => Some(Self::Unpublish),
            "dashboard" => Some(Self::Dashboard),
            "export" => Some(Self::Export),
            "import" => Some(Self::Import),
            _ => None,
        }
    }

    /// Whether the action changes stored state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::Destroy | Self::Publish | Self::Unpublish
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a mutating action, used to pick flash messages and redirects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failure
        }
    }
}
