//! Sparse adaptive memory tree.
//!
//! A binary space partition over an N-dimensional coordinate space whose
//! nodes each hold a content vector. Queries are axis-aligned boxes given by
//! a center and a per-axis base-2 logarithm of the extent. Nodes subdivide
//! when a query is at most half their extent on some axis, and the root
//! grows (doubling along the axis of greatest overflow) whenever a query
//! reaches outside it. Values at every visited level contribute to a fetch,
//! weighted by how much of the node the query covers.

#[cfg(test)]
mod tests;

use crate::codec::{check_nesting, Reader, Writer};
use crate::error::{EslError, Result};
use crate::vector::Vector;

/// Weight of non-root contributions to a fetch. A node's parent has already
/// contributed part of the same region, so descendants are discounted.
pub const ANCESTOR_COMPENSATION: f32 = 0.75;

/// A node splits when a query covers at most this fraction of it.
const SUBDIVIDE_RATIO: f32 = 0.5;

/// Query box in absolute units.
struct Region<'a> {
    position: &'a [f32],
    extent: &'a [f32],
}

impl Region<'_> {
    fn bounds(&self, axis: usize) -> (f32, f32) {
        let half = self.extent[axis] * 0.5;
        (self.position[axis] - half, self.position[axis] + half)
    }

    /// `extent / node extent` per axis.
    fn ratios(&self, node: &Node) -> Vector {
        Vector::from_slice(self.extent).pointwise_divide(&node.size)
    }
}

// ─── Node ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    position: Vector,
    size: Vector,
    value: Vector,
    kind: NodeKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Leaf,
    /// Children each cover half the extent along `split`.
    Internal {
        split: usize,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn leaf(position: Vector, size: Vector, value: Vector) -> Self {
        Self {
            position,
            size,
            value,
            kind: NodeKind::Leaf,
        }
    }

    fn placeholder() -> Self {
        Self::leaf(Vector::default(), Vector::default(), Vector::default())
    }

    pub fn position(&self) -> &[f32] {
        &self.position
    }

    pub fn size(&self) -> &[f32] {
        &self.size
    }

    pub fn value(&self) -> &[f32] {
        &self.value
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf)
    }

    /// Levels in this subtree (a leaf is 1).
    pub fn depth(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf => 1,
            NodeKind::Internal { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn node_count(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf => 1,
            NodeKind::Internal { left, right, .. } => 1 + left.node_count() + right.node_count(),
        }
    }

    fn bounds(&self, axis: usize) -> (f32, f32) {
        let half = self.size[axis] * 0.5;
        (self.position[axis] - half, self.position[axis] + half)
    }

    fn intersects(&self, region: &Region<'_>, axis: usize) -> bool {
        let (q_min, q_max) = region.bounds(axis);
        let (min, max) = self.bounds(axis);
        q_max > min && q_min < max
    }

    /// Frame of the half along `axis`: `(position, size)`.
    fn half_frame(&self, axis: usize, right: bool) -> (Vector, Vector) {
        let extent = self.size[axis];
        let mut size = self.size.clone();
        size[axis] = extent * 0.5;
        let mut position = self.position.clone();
        if right {
            position[axis] += extent * 0.25;
        } else {
            position[axis] -= extent * 0.25;
        }
        (position, size)
    }

    fn clear(&mut self) {
        self.value.clear();
        self.clear_children();
    }

    fn clear_children(&mut self) {
        if let NodeKind::Internal { left, right, .. } = &mut self.kind {
            left.clear();
            right.clear();
        }
    }

    /// Divide into two halves along `axis`, each carrying half the value.
    /// A node already split along `axis` gives up its children.
    fn split(self, axis: usize) -> (Node, Node) {
        let (left_position, left_size) = self.half_frame(axis, false);
        let (right_position, right_size) = self.half_frame(axis, true);
        let half = self.value.scaled(0.5);
        match self.kind {
            NodeKind::Leaf => (
                Node::leaf(left_position, left_size, half.clone()),
                Node::leaf(right_position, right_size, half),
            ),
            NodeKind::Internal { split, left, right } if split == axis => (*left, *right),
            NodeKind::Internal { split, left, right } => {
                let (left_left, left_right) = left.split(axis);
                let (right_left, right_right) = right.split(axis);
                (
                    Node {
                        position: left_position,
                        size: left_size,
                        value: half.clone(),
                        kind: NodeKind::Internal {
                            split,
                            left: Box::new(left_left),
                            right: Box::new(right_left),
                        },
                    },
                    Node {
                        position: right_position,
                        size: right_size,
                        value: half,
                        kind: NodeKind::Internal {
                            split,
                            left: Box::new(left_right),
                            right: Box::new(right_right),
                        },
                    },
                )
            }
        }
    }

    /// Turn a leaf into an internal node when the query needs finer
    /// resolution. Returns whether the node is now internal.
    fn maybe_subdivide(&mut self, region: &Region<'_>, force: bool) -> bool {
        if !self.is_leaf() {
            return true;
        }
        let ratios = region.ratios(self);
        if !force && ratios.minimum() > SUBDIVIDE_RATIO {
            return false;
        }
        let axis = ratios.minimum_index();
        if !(self.size[axis] * 0.5).is_normal() {
            return false;
        }
        log::trace!(
            "subdividing memory node at {:?} (size {:?}) along axis {}",
            self.position.as_slice(),
            self.size.as_slice(),
            axis
        );
        let shell = Node::leaf(self.position.clone(), self.size.clone(), self.value.clone());
        let (left, right) = shell.split(axis);
        self.kind = NodeKind::Internal {
            split: axis,
            left: Box::new(left),
            right: Box::new(right),
        };
        true
    }

    /// Axis along which the query leaves this node furthest, if any.
    fn overflow_axis(&self, region: &Region<'_>) -> Option<usize> {
        let mut max_diff = 0.0;
        let mut max_axis = None;
        for axis in 0..self.size.len() {
            let (q_min, q_max) = region.bounds(axis);
            let (min, max) = self.bounds(axis);
            let diff = (min - q_min).max(q_max - max);
            if diff > max_diff {
                max_diff = diff;
                max_axis = Some(axis);
            }
        }
        max_axis
    }

    /// Grow until the query fits, keeping the center fixed.
    fn expand(self, region: &Region<'_>) -> Node {
        let mut node = self;
        while let Some(axis) = node.overflow_axis(region) {
            let extent = node.size[axis];
            log::trace!(
                "expanding memory root along axis {} from extent {}",
                axis,
                extent
            );
            let mut expanded = node.size.clone();
            expanded[axis] = extent * 2.0;
            let mut quarter = node.size.clone();
            quarter[axis] = extent * 0.5;

            let mut left_position = node.position.clone();
            left_position[axis] -= extent * 0.5;
            let mut outer_left = left_position.clone();
            outer_left[axis] -= extent * 0.25;
            let mut right_position = node.position.clone();
            right_position[axis] += extent * 0.5;
            let mut outer_right = right_position.clone();
            outer_right[axis] += extent * 0.25;

            let position = node.position.clone();
            let size = node.size.clone();
            let value = node.value.clone();
            let half = value.scaled(0.5);
            let empty = Vector::zeros(value.len());
            let (inner_left, inner_right) = node.split(axis);

            let left = Node {
                position: left_position,
                size: size.clone(),
                value: half.clone(),
                kind: NodeKind::Internal {
                    split: axis,
                    left: Box::new(Node::leaf(outer_left, quarter.clone(), empty.clone())),
                    right: Box::new(inner_left),
                },
            };
            let right = Node {
                position: right_position,
                size,
                value: half,
                kind: NodeKind::Internal {
                    split: axis,
                    left: Box::new(inner_right),
                    right: Box::new(Node::leaf(outer_right, quarter, empty)),
                },
            };
            node = Node {
                position,
                size: expanded,
                value,
                kind: NodeKind::Internal {
                    split: axis,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        node
    }

    fn set(&mut self, region: &Region<'_>, axis: usize, values: &[Vector], root: bool) {
        if self.is_leaf() {
            let force =
                region.extent[axis] / (values.len() as f32 * self.size[axis]) <= SUBDIVIDE_RATIO;
            if !self.maybe_subdivide(region, force) {
                self.set_scaled(region, axis, values, root);
                return;
            }
        }
        let mut ratios = region.ratios(self);
        ratios[axis] /= values.len() as f32;
        if ratios.minimum() > SUBDIVIDE_RATIO {
            self.set_scaled(region, axis, values, root);
            self.clear_children();
            return;
        }
        if let NodeKind::Internal { split, left, right } = &mut self.kind {
            if left.intersects(region, *split) {
                left.set(region, axis, values, false);
            }
            if right.intersects(region, *split) {
                right.set(region, axis, values, false);
            }
        }
        self.value.clear();
    }

    /// Interpolate `values`, laid out evenly across the query along `axis`,
    /// at this node's center.
    fn set_scaled(&mut self, region: &Region<'_>, axis: usize, values: &[Vector], root: bool) {
        let (left, _) = region.bounds(axis);
        let count = values.len();
        let scale = count as f32 / region.extent[axis];
        let index = (self.position[axis] - left) * scale - 0.5;
        if index <= 0.0 {
            self.value.copy_from(&values[0]);
        } else if index >= (count - 1) as f32 {
            self.value.copy_from(&values[count - 1]);
        } else {
            let lower = index as usize;
            let fraction = index - lower as f32;
            let (a, b) = (&values[lower], &values[lower + 1]);
            for (v, (&a, &b)) in self.value.iter_mut().zip(a.iter().zip(b.iter())) {
                *v = (b - a) * fraction + a;
            }
        }
        if !root {
            self.value.scale_assign(4.0 / 3.0);
        }
    }

    fn increment_and_fetch(
        &mut self,
        region: &Region<'_>,
        increment: &[f32],
        result: &mut [f32],
        root: bool,
    ) {
        if self.is_leaf() && !self.maybe_subdivide(region, false) {
            self.add_scaled_and_fetch(region, increment, result, root);
            return;
        }
        self.add_scaled_and_fetch(region, increment, result, root);
        if region.ratios(self).minimum() > SUBDIVIDE_RATIO {
            return;
        }
        if let NodeKind::Internal { split, left, right } = &mut self.kind {
            if left.intersects(region, *split) {
                left.increment_and_fetch(region, increment, result, false);
            }
            if right.intersects(region, *split) {
                right.increment_and_fetch(region, increment, result, false);
            }
        }
    }

    fn add_scaled_and_fetch(
        &mut self,
        region: &Region<'_>,
        increment: &[f32],
        result: &mut [f32],
        root: bool,
    ) {
        let mut coverage = 1.0;
        for axis in 0..self.size.len() {
            let (q_min, q_max) = region.bounds(axis);
            let (min, max) = self.bounds(axis);
            coverage *= (q_max.min(max) - q_min.max(min)) / self.size[axis];
        }
        let weight = coverage * if root { 1.0 } else { ANCESTOR_COMPENSATION };
        for ((v, &inc), out) in self.value.iter_mut().zip(increment).zip(result.iter_mut()) {
            *v += inc * coverage;
            *out += *v * weight;
        }
    }

    fn write(&self, w: &mut Writer) -> Result<()> {
        self.value.write(w);
        match &self.kind {
            NodeKind::Leaf => w.write_i32(0),
            NodeKind::Internal { split, left, right } => {
                w.write_len(split + 1)?;
                left.write(w)?;
                right.write(w)?;
            }
        }
        Ok(())
    }

    fn read(
        r: &mut Reader<'_>,
        position: Vector,
        size: Vector,
        content: usize,
        depth: usize,
    ) -> Result<Self> {
        check_nesting(depth, "memory tree")?;
        let value = Vector::read(r, content)?;
        let marker = r.read_len("split marker")?;
        if marker == 0 {
            return Ok(Node::leaf(position, size, value));
        }
        let split = marker - 1;
        if split >= size.len() {
            return Err(EslError::CorruptData(format!(
                "split axis {} out of range for {} position elements",
                split,
                size.len()
            )));
        }
        let half = size[split] * 0.5;
        if !half.is_normal() {
            return Err(EslError::CorruptData(format!(
                "cannot split extent {} along axis {}",
                size[split], split
            )));
        }
        let shell = Node::leaf(position, size, value);
        let (left_position, left_size) = shell.half_frame(split, false);
        let (right_position, right_size) = shell.half_frame(split, true);
        let left = Node::read(r, left_position, left_size, content, depth + 1)?;
        let right = Node::read(r, right_position, right_size, content, depth + 1)?;
        Ok(Node {
            kind: NodeKind::Internal {
                split,
                left: Box::new(left),
                right: Box::new(right),
            },
            ..shell
        })
    }
}

// ─── Memory ────────────────────────────────────────────────────────

/// Sparse memory rooted at the origin with an initial unit extent.
#[derive(Clone, Debug, PartialEq)]
pub struct Memory {
    position_elements: usize,
    content_elements: usize,
    root: Node,
}

impl Memory {
    pub fn new(position_elements: usize, content_elements: usize) -> Self {
        Self {
            position_elements,
            content_elements,
            root: Node::leaf(
                Vector::zeros(position_elements),
                Vector::filled(position_elements, 1.0),
                Vector::zeros(content_elements),
            ),
        }
    }

    pub fn position_elements(&self) -> usize {
        self.position_elements
    }

    pub fn content_elements(&self) -> usize {
        self.content_elements
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_size(&self) -> &[f32] {
        &self.root.size
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    /// Overwrite the box at `position` with `values` laid out evenly along
    /// `axis`. `size` holds base-2 logarithms of the extent per axis.
    pub fn set(
        &mut self,
        position: &[f32],
        size: &[f32],
        axis: usize,
        values: &[Vector],
    ) -> Result<()> {
        if axis >= self.position_elements {
            return Err(EslError::InvalidArgument(format!(
                "axis {} out of range for {} position elements",
                axis, self.position_elements
            )));
        }
        if values.is_empty() {
            return Err(EslError::InvalidArgument("no values to set".into()));
        }
        for v in values {
            EslError::check_len("memory value", self.content_elements, v.len())?;
            check_finite("memory value", v)?;
        }
        let extent = self.extent(position, size)?;
        let region = Region {
            position,
            extent: &extent,
        };
        let root = std::mem::replace(&mut self.root, Node::placeholder());
        self.root = root.expand(&region);
        self.root.set(&region, axis, values, true);
        Ok(())
    }

    /// Add `increment` over the box at `position` and return the
    /// coverage-weighted contents seen on the way down.
    pub fn increment_and_fetch(
        &mut self,
        position: &[f32],
        size: &[f32],
        increment: &[f32],
    ) -> Result<Vector> {
        let mut result = Vector::zeros(self.content_elements);
        self.increment_and_fetch_into(position, size, increment, &mut result)?;
        Ok(result)
    }

    /// As `increment_and_fetch`, overwriting `result`.
    pub fn increment_and_fetch_into(
        &mut self,
        position: &[f32],
        size: &[f32],
        increment: &[f32],
        result: &mut [f32],
    ) -> Result<()> {
        EslError::check_len("memory increment", self.content_elements, increment.len())?;
        EslError::check_len("memory result", self.content_elements, result.len())?;
        check_finite("memory increment", increment)?;
        let extent = self.extent(position, size)?;
        let region = Region {
            position,
            extent: &extent,
        };
        result.fill(0.0);
        let root = std::mem::replace(&mut self.root, Node::placeholder());
        self.root = root.expand(&region);
        self.root.increment_and_fetch(&region, increment, result, true);
        Ok(())
    }

    /// Validate a query and convert its log2 sizes into extents.
    fn extent(&self, position: &[f32], size: &[f32]) -> Result<Vector> {
        EslError::check_len("memory position", self.position_elements, position.len())?;
        EslError::check_len("memory size", self.position_elements, size.len())?;
        check_finite("memory position", position)?;
        let extent: Vector = size.iter().map(|s| s.exp2()).collect::<Vec<_>>().into();
        if let Some(bad) = extent.iter().find(|e| !e.is_finite() || **e <= 0.0) {
            return Err(EslError::InvalidArgument(format!(
                "memory extent {} is not a positive finite number",
                bad
            )));
        }
        Ok(extent)
    }

    // ─── Binary form ───────────────────────────────────────────────

    pub fn write(&self, w: &mut Writer) -> Result<()> {
        w.write_len(self.position_elements)?;
        w.write_len(self.content_elements)?;
        self.root.size.write(w);
        self.root.write(w)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new();
        self.write(&mut w)?;
        Ok(w.into_bytes())
    }

    /// Empty input yields a fresh one-dimensional memory.
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        if r.is_at_end() {
            return Ok(Memory::new(1, 1));
        }
        let position_elements = r.read_len("position elements")?;
        let content_elements = r.read_len("content elements")?;
        let size = Vector::read(r, position_elements)?;
        if size.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(EslError::CorruptData(format!(
                "invalid memory root size {:?}",
                size.as_slice()
            )));
        }
        let root = Node::read(
            r,
            Vector::zeros(position_elements),
            size,
            content_elements,
            1,
        )?;
        Ok(Self {
            position_elements,
            content_elements,
            root,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Memory::read(&mut Reader::new(bytes))
    }
}

fn check_finite(what: &str, values: &[f32]) -> Result<()> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(v) => Err(EslError::InvalidArgument(format!(
            "{} contains non-finite element {}",
            what, v
        ))),
        None => Ok(()),
    }
}
