//! Network configuration: the raw description handed over by the
//! (out-of-scope) YAML loader, and its validated form.
//!
//! Validation is all-or-nothing: the first offending field aborts
//! construction with a [`ConfigError`] naming the field and value.
//! Malformed fault rows are the one exception; they are skipped with a
//! warning and the rest of the model proceeds.

use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bandwidth::{Bandwidth, BandwidthTrait};
use crate::fault::FaultEntry;
use crate::Latency;

/// Tag of a basic (per-dimension) topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyKind {
    Ring,
    FullyConnected,
    Switch,
    Bus,
    BinaryTree,
    DoubleBinaryTree,
    Mesh,
    HyperCube,
    Torus2D,
    Mesh2D,
    KingMesh2D,
}

impl FromStr for TopologyKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "Ring" => Ok(TopologyKind::Ring),
            "FullyConnected" => Ok(TopologyKind::FullyConnected),
            "Switch" => Ok(TopologyKind::Switch),
            "Bus" => Ok(TopologyKind::Bus),
            "BinaryTree" => Ok(TopologyKind::BinaryTree),
            "DoubleBinaryTree" => Ok(TopologyKind::DoubleBinaryTree),
            "Mesh" => Ok(TopologyKind::Mesh),
            "HyperCube" => Ok(TopologyKind::HyperCube),
            "Torus2D" => Ok(TopologyKind::Torus2D),
            "Mesh2D" => Ok(TopologyKind::Mesh2D),
            "KingMesh2D" => Ok(TopologyKind::KingMesh2D),
            _ => Err(ConfigError::UnknownTopology(name.to_owned())),
        }
    }
}

impl std::fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("network config: topology name {0:?} is not supported")]
    UnknownTopology(String),
    #[error("network config: topology list is empty")]
    NoDimensions,
    #[error("network config: length of {field} ({got}) doesn't match dims_count ({dims})")]
    DimsMismatch {
        field: &'static str,
        got: usize,
        dims: usize,
    },
    #[error("network config: npus_count ({0}) should be larger than 1")]
    NpusCountTooSmall(usize),
    #[error("network config: bandwidth ({0}) should be larger than 0")]
    NonPositiveBandwidth(f64),
    #[error("network config: latency ({0}) should be non-negative")]
    NegativeLatency(f64),
    #[error("network config: non_recursive_from ({got}) must be between 0 and dims_count ({dims})")]
    CrossoverOutOfRange { got: usize, dims: usize },
    #[error("network config: non_recursive_topology values must be 0 or 1, got {got} at dimension {dim}")]
    MaskValue { got: i64, dim: usize },
    #[error("network config: non_recursive_topology must be consecutive 0s followed by 1s, found 0 at dimension {0} after seeing 1")]
    MaskShape(usize),
    #[error("network config: {kind} requires a square npus_count, got {got}")]
    NotSquare { kind: TopologyKind, got: usize },
    #[error("network config: HyperCube requires npus_count to be a power of two, got {0}")]
    NotPowerOfTwo(usize),
}

/// The parsed-but-unvalidated network description, one entry per
/// dimension. Mirrors the configuration file field for field so the
/// loader can deserialize straight into it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub topology: Vec<String>,
    pub npus_count: Vec<usize>,
    pub bandwidth: Vec<f64>,
    pub latency: Vec<f64>,
    /// Cluster-mode declaration, crossover form: dimensions at or
    /// above this index are non-recursive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_recursive_from: Option<usize>,
    /// Cluster-mode declaration, explicit-mask form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_recursive_topology: Option<Vec<i64>>,
    /// `[src, dst, health]` rows; malformed rows are skipped with a
    /// warning at validation time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faulty_links: Vec<Vec<f64>>,
}

/// A validated network description. Construction of the topology
/// trusts every invariant established here.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub topology_per_dim: Vec<TopologyKind>,
    pub npus_count_per_dim: Vec<usize>,
    pub bandwidth_per_dim: Vec<Bandwidth>,
    pub latency_per_dim: Vec<Latency>,
    /// Zeros-prefix / ones-suffix, one entry per dimension; `true`
    /// marks a non-recursive (cluster overlay) dimension.
    pub non_recursive_mask: Vec<bool>,
    pub faulty_links: Vec<FaultEntry>,
}

impl NetworkConfig {
    pub fn validate(spec: &NetworkSpec) -> Result<Self, ConfigError> {
        let topology_per_dim = spec
            .topology
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<TopologyKind>, _>>()?;

        let dims_count = topology_per_dim.len();
        if dims_count == 0 {
            return Err(ConfigError::NoDimensions);
        }

        let check_len = |field, got| {
            if got != dims_count {
                Err(ConfigError::DimsMismatch {
                    field,
                    got,
                    dims: dims_count,
                })
            } else {
                Ok(())
            }
        };
        check_len("npus_count", spec.npus_count.len())?;
        check_len("bandwidth", spec.bandwidth.len())?;
        check_len("latency", spec.latency.len())?;

        for &npus_count in &spec.npus_count {
            if npus_count <= 1 {
                return Err(ConfigError::NpusCountTooSmall(npus_count));
            }
        }
        for &bandwidth in &spec.bandwidth {
            if bandwidth <= 0.0 {
                return Err(ConfigError::NonPositiveBandwidth(bandwidth));
            }
        }
        for &latency in &spec.latency {
            if latency < 0.0 {
                return Err(ConfigError::NegativeLatency(latency));
            }
        }

        let non_recursive_mask = Self::validate_mask(spec, dims_count)?;
        let faulty_links = Self::validate_faults(&spec.faulty_links);

        Ok(NetworkConfig {
            topology_per_dim,
            npus_count_per_dim: spec.npus_count.clone(),
            bandwidth_per_dim: spec.bandwidth.iter().map(|&gb| gb.gbps()).collect(),
            latency_per_dim: spec.latency.clone(),
            non_recursive_mask,
            faulty_links,
        })
    }

    #[inline]
    pub fn dims_count(&self) -> usize {
        self.topology_per_dim.len()
    }

    /// Normalises the two accepted cluster-mode declarations into the
    /// mask form. The crossover form takes priority when both appear.
    fn validate_mask(spec: &NetworkSpec, dims_count: usize) -> Result<Vec<bool>, ConfigError> {
        if let Some(crossover) = spec.non_recursive_from {
            if spec.non_recursive_topology.is_some() {
                warn!("network config: both non_recursive_from and non_recursive_topology given; ignoring non_recursive_topology");
            }
            if crossover > dims_count {
                return Err(ConfigError::CrossoverOutOfRange {
                    got: crossover,
                    dims: dims_count,
                });
            }
            return Ok((0..dims_count).map(|d| d >= crossover).collect());
        }

        if let Some(raw_mask) = &spec.non_recursive_topology {
            check_mask_len(raw_mask.len(), dims_count)?;
            let mut mask = Vec::with_capacity(dims_count);
            let mut seen_one = false;
            for (dim, &value) in raw_mask.iter().enumerate() {
                if value != 0 && value != 1 {
                    return Err(ConfigError::MaskValue { got: value, dim });
                }
                if seen_one && value == 0 {
                    return Err(ConfigError::MaskShape(dim));
                }
                seen_one |= value == 1;
                mask.push(value == 1);
            }
            return Ok(mask);
        }

        // Default: fully recursive, no cluster mode.
        Ok(vec![false; dims_count])
    }

    /// Filters the raw fault rows, warn-and-skip on anything
    /// malformed. Extra elements beyond the third are ignored.
    fn validate_faults(rows: &[Vec<f64>]) -> Vec<FaultEntry> {
        let mut entries = Vec::new();
        for row in rows {
            if row.len() < 3 {
                warn!(
                    "network config: invalid faulty_links row {:?}, expected [src, dst, health]; skipped",
                    row
                );
                continue;
            }
            let (src, dst, health) = (row[0], row[1], row[2]);
            if src < 0.0 || dst < 0.0 || src.fract() != 0.0 || dst.fract() != 0.0 {
                warn!(
                    "network config: faulty_links endpoints ({}, {}) are not device ids; skipped",
                    src, dst
                );
                continue;
            }
            if !(0.0..=1.0).contains(&health) {
                warn!(
                    "network config: faulty_links health {} outside [0, 1]; skipped",
                    health
                );
                continue;
            }
            entries.push(FaultEntry::new(src as usize, dst as usize, health));
        }
        entries
    }
}

fn check_mask_len(got: usize, dims: usize) -> Result<(), ConfigError> {
    if got != dims {
        Err(ConfigError::DimsMismatch {
            field: "non_recursive_topology",
            got,
            dims,
        })
    } else {
        Ok(())
    }
}
