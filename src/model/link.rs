//! Link (road segment) in the network.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use super::NodeId;
use crate::constants::Float;
use crate::{Error, Result};

/// Opaque link identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of travel on a link, relative to its a_node -> b_node drawing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Direction {
    /// a_node -> b_node only (1)
    AB,
    /// b_node -> a_node only (-1)
    BA,
    /// Two-way (0)
    Both,
}

impl TryFrom<i8> for Direction {
    type Error = Error;

    fn try_from(value: i8) -> Result<Self> {
        match value {
            1 => Ok(Direction::AB),
            -1 => Ok(Direction::BA),
            0 => Ok(Direction::Both),
            other => Err(Error::InvalidNetwork(format!("direction must be -1, 0 or 1, got {other}"))),
        }
    }
}

impl From<Direction> for i8 {
    fn from(dir: Direction) -> i8 {
        match dir {
            Direction::AB => 1,
            Direction::BA => -1,
            Direction::Both => 0,
        }
    }
}

/// A numeric link attribute, one value per direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub ab: Float,
    pub ba: Float,
}

/// A link of the road network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub a_node: NodeId,
    pub b_node: NodeId,
    pub direction: Direction,
    /// One character per mode allowed on the link (e.g. `"ct"`). Empty allows all.
    pub modes: String,
    pub fields: HashMap<String, FieldValue>,
}

impl Link {
    pub fn new(id: LinkId, a_node: NodeId, b_node: NodeId) -> Self {
        Self {
            id,
            a_node,
            b_node,
            direction: Direction::AB,
            modes: String::new(),
            fields: HashMap::new(),
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_modes(mut self, modes: impl Into<String>) -> Self {
        self.modes = modes.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, ab: Float, ba: Float) -> Self {
        self.fields.insert(name.into(), FieldValue { ab, ba });
        self
    }

    /// Same value in both directions.
    pub fn with_symmetric_field(self, name: impl Into<String>, value: Float) -> Self {
        self.with_field(name, value, value)
    }

    pub fn allows_mode(&self, mode: char) -> bool {
        self.modes.is_empty() || self.modes.contains(mode)
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}
