//! Plugin settings exchanged with replayers

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of a single setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

/// A named, documented setting
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSetting {
    pub key: String,
    pub description: String,
    pub value: SettingValue,
}

impl PluginSetting {
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        value: SettingValue,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            value,
        }
    }
}

/// Turn a configured key/value table into settings, sorted by key
pub fn settings_from_table(table: &HashMap<String, SettingValue>) -> Vec<PluginSetting> {
    let mut settings: Vec<PluginSetting> = table
        .iter()
        .map(|(key, value)| PluginSetting::new(key.clone(), String::new(), value.clone()))
        .collect();
    settings.sort_by(|a, b| a.key.cmp(&b.key));
    settings
}
