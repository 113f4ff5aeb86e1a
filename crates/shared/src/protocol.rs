use serde::{Deserialize, Serialize};

use crate::domain::{CommandId, ScanParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    #[default]
    Scan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommandRequest {
    #[serde(rename = "type", default)]
    pub kind: CommandKind,
    #[serde(flatten)]
    pub params: ScanParams,
}

impl CreateCommandRequest {
    pub fn scan(params: ScanParams) -> Self {
        Self {
            kind: CommandKind::Scan,
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCommandResponse {
    pub command_id: CommandId,
}
