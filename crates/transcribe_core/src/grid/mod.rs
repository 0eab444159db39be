//! Segment and node layout of a transcribed phase.
//!
//! A [`GridData`] is computed once per phase from a [`GridConfig`] and is
//! read-only afterwards. All index arrays refer to the full (`all`) node array,
//! which is never compressed; compression only affects the `*_input` subsets.

pub mod cache;
pub mod matrices;
pub mod nodes;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigurationError, TranscriptionResult};
use matrices::{hermite_matrices, lagrange_matrices, HermiteMatrices};
use nodes::{lgl, lgr, NodeSet};

/// Pseudospectral transcription scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TranscriptionScheme {
    #[serde(rename = "gauss-lobatto")]
    GaussLobatto,
    #[serde(rename = "radau-ps")]
    Radau,
}

impl TranscriptionScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptionScheme::GaussLobatto => "gauss-lobatto",
            TranscriptionScheme::Radau => "radau-ps",
        }
    }

    /// Number of nodes in a segment of the given order.
    pub fn nodes_per_segment(&self, order: usize) -> usize {
        match self {
            TranscriptionScheme::GaussLobatto => order,
            TranscriptionScheme::Radau => order + 1,
        }
    }

    fn validate_order(&self, segment: usize, order: usize) -> TranscriptionResult<()> {
        let reason = match self {
            TranscriptionScheme::GaussLobatto if order < 3 => Some("must be at least 3"),
            TranscriptionScheme::GaussLobatto if order % 2 == 0 => Some("must be odd"),
            TranscriptionScheme::Radau if order < 1 => Some("must be at least 1"),
            _ => None,
        };
        match reason {
            Some(reason) => Err(ConfigurationError::InvalidOrder {
                scheme: self.as_str(),
                segment,
                order,
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for TranscriptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranscriptionScheme {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauss-lobatto" => Ok(TranscriptionScheme::GaussLobatto),
            "radau-ps" => Ok(TranscriptionScheme::Radau),
            other => Err(ConfigurationError::UnknownScheme(other.to_string())),
        }
    }
}

/// Named node subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeSubset {
    All,
    Disc,
    Col,
    StateDisc,
    StateInput,
    ControlDisc,
    ControlInput,
    SegmentEnds,
}

impl NodeSubset {
    pub const EVERY: [NodeSubset; 8] = [
        NodeSubset::All,
        NodeSubset::Disc,
        NodeSubset::Col,
        NodeSubset::StateDisc,
        NodeSubset::StateInput,
        NodeSubset::ControlDisc,
        NodeSubset::ControlInput,
        NodeSubset::SegmentEnds,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranscriptionOrder {
    Uniform(usize),
    PerSegment(Vec<usize>),
}

impl TranscriptionOrder {
    fn per_segment(&self, num_segments: usize) -> TranscriptionResult<Vec<usize>> {
        match self {
            TranscriptionOrder::Uniform(order) => Ok(vec![*order; num_segments]),
            TranscriptionOrder::PerSegment(orders) if orders.len() == num_segments => {
                Ok(orders.clone())
            }
            TranscriptionOrder::PerSegment(orders) => Err(ConfigurationError::OrderCount {
                expected: num_segments,
                found: orders.len(),
            }),
        }
    }
}

/// Everything that determines a grid. Also serves as the memoization key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub num_segments: usize,
    pub transcription_order: TranscriptionOrder,
    /// Segment boundaries in any units; equally spaced when omitted.
    #[serde(default)]
    pub segment_ends: Option<Vec<f64>>,
    pub scheme: TranscriptionScheme,
    #[serde(default)]
    pub compressed: bool,
}

impl GridConfig {
    pub fn new(num_segments: usize, order: usize, scheme: TranscriptionScheme) -> Self {
        Self {
            num_segments,
            transcription_order: TranscriptionOrder::Uniform(order),
            segment_ends: None,
            scheme,
            compressed: false,
        }
    }

    pub fn with_segment_ends(mut self, ends: Vec<f64>) -> Self {
        self.segment_ends = Some(ends);
        self
    }

    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }
}

/// Global layout of one node subset.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetLayout {
    /// Indices into the full node array, increasing.
    pub node_indices: Vec<usize>,
    /// Per segment, the `[start, end)` range into `node_indices`.
    pub segment_indices: Vec<[usize; 2]>,
    pub num_nodes_per_segment: Vec<usize>,
}

impl SubsetLayout {
    pub fn num_nodes(&self) -> usize {
        self.node_indices.len()
    }
}

/// Matrices turning discretization-node state values into collocation-node
/// estimates. Block diagonal by segment, in segment-local time.
#[derive(Debug, Clone, PartialEq)]
pub enum StateInterpMatrices {
    /// Radau: `dx/dstau` at col nodes is `differentiation · x_disc`.
    Lagrange { differentiation: DMatrix<f64> },
    /// Gauss-Lobatto: Hermite interpolation from disc values and slopes.
    Hermite(HermiteMatrices),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridData {
    config: GridConfig,
    scheme: TranscriptionScheme,
    num_segments: usize,
    transcription_order: Vec<usize>,
    compressed: bool,
    segment_ends: Vec<f64>,
    num_nodes: usize,
    num_nodes_per_segment: Vec<usize>,
    segment_indices: Vec<[usize; 2]>,
    subsets: BTreeMap<NodeSubset, SubsetLayout>,
    node_stau: Vec<f64>,
    node_ptau: Vec<f64>,
    node_dptau_dstau: Vec<f64>,
    node_weight: Vec<f64>,
    node_segment: Vec<usize>,
    state_input_to_disc: Vec<usize>,
    control_input_to_disc: Vec<usize>,
    interp: StateInterpMatrices,
}

fn normalized_segment_ends(num_segments: usize, ends: Option<&[f64]>) -> TranscriptionResult<Vec<f64>> {
    let Some(ends) = ends else {
        return Ok((0..=num_segments)
            .map(|i| -1.0 + 2.0 * i as f64 / num_segments as f64)
            .collect());
    };
    if ends.len() != num_segments + 1 {
        return Err(ConfigurationError::InvalidSegmentEnds(format!(
            "expected {} values for {} segments, got {}",
            num_segments + 1,
            num_segments,
            ends.len()
        )));
    }
    if ends.iter().any(|v| !v.is_finite()) {
        return Err(ConfigurationError::InvalidSegmentEnds(
            "values must be finite".to_string(),
        ));
    }
    if ends.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ConfigurationError::InvalidSegmentEnds(
            "values must be strictly increasing".to_string(),
        ));
    }
    let first = ends[0];
    let span = ends[num_segments] - first;
    Ok(ends.iter().map(|v| -1.0 + 2.0 * (v - first) / span).collect())
}

fn segment_nodes(scheme: TranscriptionScheme, order: usize) -> TranscriptionResult<NodeSet> {
    match scheme {
        TranscriptionScheme::GaussLobatto => lgl(order),
        TranscriptionScheme::Radau => {
            let mut set = lgr(order)?;
            set.nodes.push(1.0);
            set.weights.push(0.0);
            Ok(set)
        }
    }
}

/// Segment-local subset indices for a segment with `n` nodes.
fn segment_subsets(
    scheme: TranscriptionScheme,
    n: usize,
    first_segment: bool,
    compressed: bool,
) -> BTreeMap<NodeSubset, Vec<usize>> {
    let all: Vec<usize> = (0..n).collect();
    let drop_first = compressed && !first_segment;
    let input = |indices: &[usize]| -> Vec<usize> {
        if drop_first {
            indices.iter().copied().filter(|&i| i != 0).collect()
        } else {
            indices.to_vec()
        }
    };

    let (disc, col): (Vec<usize>, Vec<usize>) = match scheme {
        TranscriptionScheme::GaussLobatto => ((0..n).step_by(2).collect(), (1..n).step_by(2).collect()),
        TranscriptionScheme::Radau => (all.clone(), (0..n - 1).collect()),
    };

    let mut subsets = BTreeMap::new();
    subsets.insert(NodeSubset::StateInput, input(&disc));
    subsets.insert(NodeSubset::ControlInput, input(&all));
    subsets.insert(NodeSubset::StateDisc, disc.clone());
    subsets.insert(NodeSubset::ControlDisc, all.clone());
    subsets.insert(NodeSubset::SegmentEnds, vec![0, n - 1]);
    subsets.insert(NodeSubset::Disc, disc);
    subsets.insert(NodeSubset::Col, col);
    subsets.insert(NodeSubset::All, all);
    subsets
}

/// Maps each disc node of `subset` to the input variable that supplies it.
/// With compression, a segment's first node reuses the previous segment's
/// last input.
fn input_map(
    local: &[BTreeMap<NodeSubset, Vec<usize>>],
    disc: NodeSubset,
    compressed: bool,
) -> Vec<usize> {
    let mut map = Vec::new();
    let mut next_input = 0usize;
    for (iseg, subsets) in local.iter().enumerate() {
        let count = subsets[&disc].len();
        for k in 0..count {
            if compressed && iseg > 0 && k == 0 {
                map.push(next_input - 1);
            } else {
                map.push(next_input);
                next_input += 1;
            }
        }
    }
    map
}

impl GridData {
    pub fn new(config: GridConfig) -> TranscriptionResult<Self> {
        let num_segments = config.num_segments;
        if num_segments == 0 {
            return Err(ConfigurationError::NoSegments);
        }
        let scheme = config.scheme;
        let transcription_order = config.transcription_order.per_segment(num_segments)?;
        for (iseg, &order) in transcription_order.iter().enumerate() {
            scheme.validate_order(iseg, order)?;
        }
        let segment_ends = normalized_segment_ends(num_segments, config.segment_ends.as_deref())?;
        let compressed = config.compressed;

        let mut node_stau = Vec::new();
        let mut node_ptau = Vec::new();
        let mut node_dptau_dstau = Vec::new();
        let mut node_weight = Vec::new();
        let mut node_segment = Vec::new();
        let mut num_nodes_per_segment = Vec::with_capacity(num_segments);
        let mut segment_indices = Vec::with_capacity(num_segments);
        let mut local_subsets = Vec::with_capacity(num_segments);
        let mut segment_node_sets = Vec::with_capacity(num_segments);

        for (iseg, &order) in transcription_order.iter().enumerate() {
            let set = segment_nodes(scheme, order)?;
            let n = set.nodes.len();
            let (v0, v1) = (segment_ends[iseg], segment_ends[iseg + 1]);
            let start = node_stau.len();
            for (&stau, &w) in set.nodes.iter().zip(&set.weights) {
                node_stau.push(stau);
                node_ptau.push(v0 + 0.5 * (stau + 1.0) * (v1 - v0));
                node_dptau_dstau.push(0.5 * (v1 - v0));
                node_weight.push(w);
                node_segment.push(iseg);
            }
            num_nodes_per_segment.push(n);
            segment_indices.push([start, start + n]);
            local_subsets.push(segment_subsets(scheme, n, iseg == 0, compressed));
            segment_node_sets.push(set);
        }
        let num_nodes = node_stau.len();

        let mut subsets = BTreeMap::new();
        for name in NodeSubset::EVERY {
            let mut layout = SubsetLayout {
                node_indices: Vec::new(),
                segment_indices: Vec::with_capacity(num_segments),
                num_nodes_per_segment: Vec::with_capacity(num_segments),
            };
            for (iseg, local) in local_subsets.iter().enumerate() {
                let offset = segment_indices[iseg][0];
                let start = layout.node_indices.len();
                layout
                    .node_indices
                    .extend(local[&name].iter().map(|i| i + offset));
                layout.segment_indices.push([start, layout.node_indices.len()]);
                layout.num_nodes_per_segment.push(local[&name].len());
            }
            subsets.insert(name, layout);
        }

        let state_input_to_disc = input_map(&local_subsets, NodeSubset::StateDisc, compressed);
        let control_input_to_disc = input_map(&local_subsets, NodeSubset::ControlDisc, compressed);

        let interp = build_interp_matrices(scheme, &segment_node_sets, &local_subsets, &subsets);

        debug!(
            scheme = scheme.as_str(),
            num_segments,
            num_nodes,
            num_disc = subsets[&NodeSubset::Disc].num_nodes(),
            num_col = subsets[&NodeSubset::Col].num_nodes(),
            compressed,
            "built transcription grid"
        );

        Ok(Self {
            config,
            scheme,
            num_segments,
            transcription_order,
            compressed,
            segment_ends,
            num_nodes,
            num_nodes_per_segment,
            segment_indices,
            subsets,
            node_stau,
            node_ptau,
            node_dptau_dstau,
            node_weight,
            node_segment,
            state_input_to_disc,
            control_input_to_disc,
            interp,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn scheme(&self) -> TranscriptionScheme {
        self.scheme
    }

    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    pub fn transcription_order(&self) -> &[usize] {
        &self.transcription_order
    }

    pub fn compressed(&self) -> bool {
        self.compressed
    }

    /// Segment boundaries in phase-normalized time, from -1 to 1.
    pub fn segment_ends(&self) -> &[f64] {
        &self.segment_ends
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_nodes_per_segment(&self) -> &[usize] {
        &self.num_nodes_per_segment
    }

    /// `[start, end)` of each segment in the full node array.
    pub fn segment_indices(&self) -> &[[usize; 2]] {
        &self.segment_indices
    }

    pub fn subset(&self, subset: NodeSubset) -> &SubsetLayout {
        &self.subsets[&subset]
    }

    pub fn subset_node_indices(&self, subset: NodeSubset) -> &[usize] {
        &self.subsets[&subset].node_indices
    }

    pub fn subset_num_nodes(&self, subset: NodeSubset) -> usize {
        self.subsets[&subset].num_nodes()
    }

    pub fn node_stau(&self) -> &[f64] {
        &self.node_stau
    }

    pub fn node_ptau(&self) -> &[f64] {
        &self.node_ptau
    }

    pub fn node_dptau_dstau(&self) -> &[f64] {
        &self.node_dptau_dstau
    }

    /// Segment-local quadrature weight of each node (zero for the Radau
    /// endpoint, which is not a quadrature node).
    pub fn node_weight(&self) -> &[f64] {
        &self.node_weight
    }

    pub fn node_segment(&self) -> &[usize] {
        &self.node_segment
    }

    pub fn state_input_to_disc(&self) -> &[usize] {
        &self.state_input_to_disc
    }

    pub fn control_input_to_disc(&self) -> &[usize] {
        &self.control_input_to_disc
    }

    /// Number of state input variables per state element, after compression.
    pub fn num_state_inputs(&self) -> usize {
        self.subset_num_nodes(NodeSubset::StateInput)
    }

    pub fn state_interp_matrices(&self) -> &StateInterpMatrices {
        &self.interp
    }

    /// Physical time of every node in the phase.
    pub fn node_times(&self, t_initial: f64, t_duration: f64) -> Vec<f64> {
        self.node_ptau
            .iter()
            .map(|ptau| t_initial + 0.5 * (ptau + 1.0) * t_duration)
            .collect()
    }

    /// `dt/dstau` at the nodes of `subset`.
    pub fn dt_dstau(&self, t_duration: f64, subset: NodeSubset) -> Vec<f64> {
        self.subset_node_indices(subset)
            .iter()
            .map(|&i| 0.5 * t_duration * self.node_dptau_dstau[i])
            .collect()
    }

    /// Gathers the rows of a full-grid value matrix belonging to `subset`.
    pub fn subset_values(&self, subset: NodeSubset, values: &DMatrix<f64>) -> TranscriptionResult<DMatrix<f64>> {
        if values.nrows() != self.num_nodes {
            return Err(ConfigurationError::ShapeMismatch {
                name: format!("{subset:?} values"),
                expected: self.num_nodes,
                found: values.nrows(),
            });
        }
        Ok(values.select_rows(self.subset_node_indices(subset)))
    }
}

fn build_interp_matrices(
    scheme: TranscriptionScheme,
    node_sets: &[NodeSet],
    local: &[BTreeMap<NodeSubset, Vec<usize>>],
    global: &BTreeMap<NodeSubset, SubsetLayout>,
) -> StateInterpMatrices {
    let disc = &global[&NodeSubset::StateDisc];
    let col = &global[&NodeSubset::Col];
    let shape = (col.num_nodes(), disc.num_nodes());

    let local_taus = |iseg: usize, subset: NodeSubset| -> Vec<f64> {
        local[iseg][&subset]
            .iter()
            .map(|&i| node_sets[iseg].nodes[i])
            .collect()
    };

    let place = |target: &mut DMatrix<f64>, block: &DMatrix<f64>, iseg: usize| {
        let r0 = col.segment_indices[iseg][0];
        let c0 = disc.segment_indices[iseg][0];
        target
            .view_mut((r0, c0), (block.nrows(), block.ncols()))
            .copy_from(block);
    };

    match scheme {
        TranscriptionScheme::Radau => {
            let mut differentiation = DMatrix::zeros(shape.0, shape.1);
            for iseg in 0..node_sets.len() {
                let given = local_taus(iseg, NodeSubset::StateDisc);
                let eval = local_taus(iseg, NodeSubset::Col);
                let (_, d) = lagrange_matrices(&given, &eval);
                place(&mut differentiation, &d, iseg);
            }
            StateInterpMatrices::Lagrange { differentiation }
        }
        TranscriptionScheme::GaussLobatto => {
            let mut full = HermiteMatrices {
                ai: DMatrix::zeros(shape.0, shape.1),
                bi: DMatrix::zeros(shape.0, shape.1),
                ad: DMatrix::zeros(shape.0, shape.1),
                bd: DMatrix::zeros(shape.0, shape.1),
            };
            for iseg in 0..node_sets.len() {
                let given = local_taus(iseg, NodeSubset::StateDisc);
                let eval = local_taus(iseg, NodeSubset::Col);
                let block = hermite_matrices(&given, &eval);
                place(&mut full.ai, &block.ai, iseg);
                place(&mut full.bi, &block.bi, iseg);
                place(&mut full.ad, &block.ad, iseg);
                place(&mut full.bd, &block.bd, iseg);
            }
            StateInterpMatrices::Hermite(full)
        }
    }
}
