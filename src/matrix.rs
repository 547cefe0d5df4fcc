//! Dense zone-by-zone matrices: demand going in, skims coming out.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::constants::Float;
use crate::model::NodeId;
use crate::{Error, Result};

// ============================================================================
// DemandMatrix
// ============================================================================

/// Origin-destination demand with one or more named cores.
///
/// Layout is `[core][origin][destination]`, zones in centroid order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandMatrix {
    zones: Vec<NodeId>,
    cores: Vec<String>,
    #[serde(skip)]
    zone_index: HashMap<NodeId, usize>,
    data: Vec<Float>,
}

impl DemandMatrix {
    pub fn new(zones: Vec<NodeId>, cores: Vec<String>) -> Result<Self> {
        if zones.is_empty() {
            return Err(Error::InvalidDemand("matrix needs at least one zone".into()));
        }
        if cores.is_empty() {
            return Err(Error::InvalidDemand("matrix needs at least one core".into()));
        }
        for (i, c) in cores.iter().enumerate() {
            if cores[..i].contains(c) {
                return Err(Error::InvalidDemand(format!("core '{c}' listed twice")));
            }
        }
        let mut zone_index = HashMap::with_capacity(zones.len());
        for (i, &z) in zones.iter().enumerate() {
            if zone_index.insert(z, i).is_some() {
                return Err(Error::InvalidDemand(format!("zone {z} listed twice")));
            }
        }
        let data = vec![0.0; cores.len() * zones.len() * zones.len()];
        Ok(Self { zones, cores, zone_index, data })
    }

    pub fn zones(&self) -> &[NodeId] { &self.zones }
    pub fn cores(&self) -> &[String] { &self.cores }
    pub fn num_zones(&self) -> usize { self.zones.len() }
    pub fn num_cores(&self) -> usize { self.cores.len() }

    pub fn core_index(&self, core: &str) -> Result<usize> {
        self.cores
            .iter()
            .position(|c| c == core)
            .ok_or_else(|| Error::InvalidDemand(format!("unknown core '{core}'")))
    }

    pub fn zone_index(&self, zone: NodeId) -> Result<usize> {
        self.zone_index.get(&zone).copied().ok_or(Error::NodeNotFound(zone))
    }

    fn offset(&self, core: usize, o: usize, d: usize) -> usize {
        let n = self.zones.len();
        (core * n + o) * n + d
    }

    pub fn set(&mut self, core: &str, origin: NodeId, destination: NodeId, value: Float) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::InvalidDemand(format!("demand {origin}->{destination} must be finite and non-negative, got {value}")));
        }
        let c = self.core_index(core)?;
        let o = self.zone_index(origin)?;
        let d = self.zone_index(destination)?;
        let at = self.offset(c, o, d);
        self.data[at] = value;
        Ok(())
    }

    pub fn get(&self, core: &str, origin: NodeId, destination: NodeId) -> Result<Float> {
        let c = self.core_index(core)?;
        let o = self.zone_index(origin)?;
        let d = self.zone_index(destination)?;
        Ok(self.data[self.offset(c, o, d)])
    }

    /// Demand leaving zone position `origin` in core position `core`.
    pub fn row(&self, core: usize, origin: usize) -> &[Float] {
        let start = self.offset(core, origin, 0);
        &self.data[start..start + self.zones.len()]
    }

    /// True when any core has demand leaving `origin`.
    pub fn has_demand_from(&self, origin: usize) -> bool {
        (0..self.cores.len()).any(|c| self.row(c, origin).iter().any(|&v| v > 0.0))
    }

    pub fn total(&self, core: &str) -> Result<Float> {
        let c = self.core_index(core)?;
        let n = self.zones.len();
        Ok(self.data[c * n * n..(c + 1) * n * n].iter().sum())
    }
}

// ============================================================================
// SkimMatrix
// ============================================================================

/// Per-OD values accumulated along shortest paths.
///
/// Layout is `[origin][destination][field]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkimMatrix {
    zones: Vec<NodeId>,
    fields: Vec<String>,
    pub(crate) data: Vec<Float>,
}

impl SkimMatrix {
    pub fn new(zones: Vec<NodeId>, fields: Vec<String>) -> Self {
        let data = vec![0.0; zones.len() * zones.len() * fields.len()];
        Self { zones, fields, data }
    }

    pub fn zones(&self) -> &[NodeId] { &self.zones }
    pub fn fields(&self) -> &[String] { &self.fields }

    pub(crate) fn offset(&self, o: usize, d: usize, f: usize) -> usize {
        let n = self.zones.len();
        let k = self.fields.len();
        (o * n + d) * k + f
    }

    pub fn value(&self, o: usize, d: usize, f: usize) -> Float {
        self.data[self.offset(o, d, f)]
    }

    pub fn get(&self, field: &str, origin: NodeId, destination: NodeId) -> Result<Float> {
        let f = self.fields
            .iter()
            .position(|x| x == field)
            .ok_or_else(|| Error::UnknownField(field.to_string()))?;
        let o = self.zones.iter().position(|&z| z == origin).ok_or(Error::NodeNotFound(origin))?;
        let d = self.zones.iter().position(|&z| z == destination).ok_or(Error::NodeNotFound(destination))?;
        Ok(self.value(o, d, f))
    }

    /// Values for all destinations of one origin, `[destination][field]`.
    pub(crate) fn origin_block_mut(&mut self, o: usize) -> &mut [Float] {
        let width = self.zones.len() * self.fields.len();
        &mut self.data[o * width..(o + 1) * width]
    }
}
