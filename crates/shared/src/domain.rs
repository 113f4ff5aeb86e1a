use std::{collections::HashSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(AgentId);
id_newtype!(CommandId);

/// Lifecycle status reported by the agent-command API.
///
/// `Pending < Ack < Running < Completed` form the linear lifecycle; `Failed` is a
/// terminal sibling of `Completed`. Strings this client does not know are kept
/// as `Unknown` so newer servers never break deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    Pending,
    Ack,
    Running,
    Completed,
    Failed,
    Unknown(String),
}

impl CommandStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "ack" => Self::Ack,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Ack => "ack",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown(raw) => raw,
        }
    }

    /// Position in the linear lifecycle. `None` for `Failed` and unknown values.
    pub fn lifecycle_index(&self) -> Option<usize> {
        match self {
            Self::Pending => Some(0),
            Self::Ack => Some(1),
            Self::Running => Some(2),
            Self::Completed => Some(3),
            Self::Failed | Self::Unknown(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for CommandStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CommandStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanParams {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub shield: bool,
}

impl ScanParams {
    /// Builds scan parameters with targets trimmed and deduplicated, first occurrence wins.
    pub fn new<I, T>(targets: I, shield: bool) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut seen = HashSet::new();
        let targets = targets
            .into_iter()
            .map(|target| target.into().trim().to_string())
            .filter(|target| !target.is_empty())
            .filter(|target| seen.insert(target.clone()))
            .collect();
        Self { targets, shield }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_discovered: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets_scanned: Option<u64>,
    pub errors: Vec<String>,
}

impl CommandResult {
    /// Reads a result payload field by field. Mistyped fields are treated as absent;
    /// anything other than a JSON object yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let errors = object
            .get("errors")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            step: object
                .get("step")
                .and_then(Value::as_str)
                .map(str::to_string),
            assets_discovered: object.get("assets_discovered").and_then(Value::as_u64),
            targets_scanned: object.get("targets_scanned").and_then(Value::as_u64),
            errors,
        })
    }
}

impl<'de> Deserialize<'de> for CommandResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value).unwrap_or_default())
    }
}

fn lenient_result<'de, D>(deserializer: D) -> Result<Option<CommandResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(CommandResult::from_value))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub status: CommandStatus,
    #[serde(default)]
    pub params: ScanParams,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_result",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<CommandResult>,
}

impl Command {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Errors reported by the agent, verbatim. Empty when no result is present.
    pub fn errors(&self) -> &[String] {
        self.result
            .as_ref()
            .map(|result| result.errors.as_slice())
            .unwrap_or_default()
    }
}
