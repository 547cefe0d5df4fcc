//! Volume-delay functions: congested travel time as a function of flow.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::Float;
use crate::graph::Graph;
use crate::{Error, Result};

/// Supported volume-delay functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Vdf {
    /// Bureau of Public Roads: `fftt * (1 + alpha * (v/c)^beta)`.
    Bpr,
    /// Spiess' conical function.
    Conical,
}

impl Vdf {
    /// Names of the parameters this function reads.
    pub fn parameter_names(&self) -> &'static [&'static str] {
        &["alpha", "beta"]
    }

    fn time(&self, flow: Float, capacity: Float, fftt: Float, alpha: Float, beta: Float) -> Float {
        let x = flow / capacity;
        match self {
            Vdf::Bpr => fftt * (1.0 + alpha * x.powf(beta)),
            Vdf::Conical => {
                let y = 1.0 - x;
                fftt * (2.0 + (alpha * alpha * y * y + beta * beta).sqrt() - alpha * y - beta)
            }
        }
    }

    fn time_derivative(&self, flow: Float, capacity: Float, fftt: Float, alpha: Float, beta: Float) -> Float {
        let x = flow / capacity;
        match self {
            Vdf::Bpr => fftt * alpha * beta * x.powf(beta - 1.0) / capacity,
            Vdf::Conical => {
                let y = 1.0 - x;
                let root = (alpha * alpha * y * y + beta * beta).sqrt();
                fftt / capacity * (alpha - alpha * alpha * y / root)
            }
        }
    }

    /// `out[i] = vdf(flow[i], capacity[i], fftt[i], alpha[i], beta[i])`.
    pub fn apply_vdf(
        &self,
        out: &mut [Float],
        flow: &[Float],
        capacity: &[Float],
        fftt: &[Float],
        params: &ResolvedParameters,
    ) -> Result<()> {
        check_lengths(out.len(), &[flow.len(), capacity.len(), fftt.len(), params.alpha.len(), params.beta.len()])?;
        for i in 0..out.len() {
            out[i] = self.time(flow[i], capacity[i], fftt[i], params.alpha[i], params.beta[i]);
        }
        Ok(())
    }

    /// `out[i] = d vdf / d flow` at `flow[i]`.
    pub fn apply_derivative(
        &self,
        out: &mut [Float],
        flow: &[Float],
        capacity: &[Float],
        fftt: &[Float],
        params: &ResolvedParameters,
    ) -> Result<()> {
        check_lengths(out.len(), &[flow.len(), capacity.len(), fftt.len(), params.alpha.len(), params.beta.len()])?;
        for i in 0..out.len() {
            out[i] = self.time_derivative(flow[i], capacity[i], fftt[i], params.alpha[i], params.beta[i]);
        }
        Ok(())
    }
}

fn check_lengths(expected: usize, got: &[usize]) -> Result<()> {
    if let Some(&bad) = got.iter().find(|&&l| l != expected) {
        return Err(Error::DimensionMismatch { expected: format!("{expected} values"), got: bad.to_string() });
    }
    Ok(())
}

impl FromStr for Vdf {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bpr" => Ok(Vdf::Bpr),
            "conical" => Ok(Vdf::Conical),
            _ => Err(Error::UnknownVdf(s.to_string())),
        }
    }
}

impl TryFrom<String> for Vdf {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Vdf> for String {
    fn from(vdf: Vdf) -> String {
        vdf.to_string()
    }
}

impl fmt::Display for Vdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vdf::Bpr => write!(f, "BPR"),
            Vdf::Conical => write!(f, "CONICAL"),
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// A VDF parameter: one value for the whole network, or a link field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VdfParameter {
    Value(Float),
    Field(String),
}

impl From<Float> for VdfParameter {
    fn from(v: Float) -> Self {
        VdfParameter::Value(v)
    }
}

impl From<&str> for VdfParameter {
    fn from(field: &str) -> Self {
        VdfParameter::Field(field.to_string())
    }
}

impl VdfParameter {
    /// One value per graph edge.
    pub fn resolve(&self, graph: &Graph) -> Result<Vec<Float>> {
        match self {
            VdfParameter::Value(v) => Ok(vec![*v; graph.num_edges()]),
            VdfParameter::Field(name) => graph
                .field(name)
                .map(<[Float]>::to_vec)
                .ok_or_else(|| Error::UnknownField(name.clone())),
        }
    }
}

/// Parameters expanded to per-edge vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameters {
    pub alpha: Vec<Float>,
    pub beta: Vec<Float>,
}
