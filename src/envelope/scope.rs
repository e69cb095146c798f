//! Routing scopes
//!
//! A `Scope` decides who receives an envelope. On the wire it is a single
//! string: `"global"`, `"group:<id>"` or `"direct:<id>"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::HubError;

pub type ClientId = String;
pub type GroupId = String;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    #[default]
    Global,
    Group(GroupId),
    Direct(ClientId),
}

impl Scope {
    pub fn group(&self) -> Option<&GroupId> {
        match self {
            Scope::Group(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Group(id) => write!(f, "group:{id}"),
            Scope::Direct(id) => write!(f, "direct:{id}"),
        }
    }
}

impl FromStr for Scope {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global" {
            return Ok(Scope::Global);
        }
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| HubError::Decode(format!("invalid scope '{s}'")))?;
        if id.is_empty() {
            return Err(HubError::Decode(format!("scope '{s}' has an empty id")));
        }
        match kind {
            "group" => Ok(Scope::Group(id.to_string())),
            "direct" => Ok(Scope::Direct(id.to_string())),
            _ => Err(HubError::Decode(format!("invalid scope '{s}'"))),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = HubError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}
