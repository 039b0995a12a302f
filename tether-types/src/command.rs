use crate::WindowId;
use serde::{Deserialize, Serialize};

/// Browser chrome requested for a newly opened window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenFeatures {
    pub menubar: bool,
    pub toolbar: bool,
    pub status: bool,
    pub location: bool,
    pub directories: bool,
}

impl OpenFeatures {
    /// Feature list in the form `window.open` takes, e.g. `toolbar=yes,status=no`
    pub fn to_feature_list(&self) -> String {
        let flag = |on: bool| if on { "yes" } else { "no" };
        format!(
            "directories={},toolbar={},status={},address={},menubar={}",
            flag(self.directories),
            flag(self.toolbar),
            flag(self.status),
            flag(self.location),
            flag(self.menubar),
        )
    }
}

/// Out-of-band instruction for the client, not tied to any node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Ask the main window's client to open a browser window for `window`
    OpenWindow {
        window: WindowId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default)]
        features: OpenFeatures,
    },
    /// Ask the client of a closing window to close itself
    CloseWindow,
    /// Application-defined command
    Custom {
        name: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl Command {
    pub fn custom(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Command::Custom {
            name: name.into(),
            payload,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Command::OpenWindow { .. } => "open_window",
            Command::CloseWindow => "close_window",
            Command::Custom { name, .. } => name,
        }
    }
}
