use std::time::Instant;

use tracing::{debug, Level};

use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::particle::{Particle, Vector};
use crate::periodic::Periodic;

/// End-of-walk marker in the treewalk link arrays.
const NONE: usize = usize::MAX;

#[inline]
pub(crate) fn timer() -> Option<Instant> {
    tracing::enabled!(Level::DEBUG).then(Instant::now)
}

#[inline]
pub(crate) fn log_timing(label: &str, t0: Option<Instant>) {
    if let Some(t0) = t0 {
        debug!(target: "sphtree::timing", stage = label, ms = t0.elapsed().as_secs_f64() * 1e3);
    }
}

/// One cell of the tree: a cube of edge `2 * half_size`.
#[derive(Clone, Debug)]
pub struct Node<const D: usize> {
    pub center: Vector<D>,
    pub half_size: f64,
    /// Cached squared edge length for the opening test.
    pub size2: f64,
    pub level: usize,
    /// Range into the tree's particle permutation.
    pub start: usize,
    pub end: usize,
    /// Index of the first of `2^D` consecutive children, `None` for leaves.
    pub first_child: Option<usize>,
    pub mass: f64,
    pub com: Vector<D>,
    /// Largest smoothing length among the contained particles.
    pub hmax: f64,
}

impl<const D: usize> Node<D> {
    fn new(center: Vector<D>, half_size: f64, level: usize, start: usize, end: usize) -> Self {
        let s = 2.0 * half_size;
        Self {
            center,
            half_size,
            size2: s * s,
            level,
            start,
            end,
            first_child: None,
            mass: 0.0,
            com: Vector::zeros(),
            hmax: 0.0,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.first_child.is_none()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    #[inline]
    pub fn edge(&self) -> f64 {
        2.0 * self.half_size
    }
}

/// What a traversal hands to its visitor.
#[derive(Clone, Copy, Debug)]
pub enum Visit<'a, const D: usize> {
    /// A node accepted as a whole; its subtree is skipped.
    Node(&'a Node<D>),
    /// A particle index from an opened leaf.
    Particle(usize),
}

/// Binary tree, quadtree or octree over a particle slice, depending on `D`.
///
/// Membership is index based: every node owns a contiguous range of
/// `order`, a permutation of `0..count`. Nodes live in an arena in
/// creation order, so a parent always precedes its children and the
/// bottom-up passes are a single reverse sweep.
#[derive(Clone, Debug)]
pub struct SpatialTree<const D: usize> {
    config: TreeConfig,
    periodic: Option<Periodic<D>>,
    nodes: Vec<Node<D>>,
    order: Vec<usize>,
    /// Inverse of `order`: `order[slot[j]] == j`.
    slot: Vec<usize>,
    /// Treewalk links for stack-free depth-first traversal.
    ///
    /// For each node index `i`:
    /// - `first_subnode[i]` is the first child, or `NONE` for leaves.
    /// - `next_branch[i]` is the next node to visit after finishing `i`.
    first_subnode: Vec<usize>,
    next_branch: Vec<usize>,
    built_len: usize,
}

impl<const D: usize> SpatialTree<D> {
    const FANOUT: usize = 1 << D;

    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            periodic: None,
            nodes: Vec::new(),
            order: Vec::new(),
            slot: Vec::new(),
            first_subnode: Vec::new(),
            next_branch: Vec::new(),
            built_len: 0,
        }
    }

    /// Uses the periodic box as the root domain and measures every
    /// separation through the minimum image.
    pub fn with_periodic(mut self, periodic: Periodic<D>) -> Self {
        self.periodic = Some(periodic);
        self
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn periodic(&self) -> Option<&Periodic<D>> {
        self.periodic.as_ref()
    }

    /// Number of particles indexed by the last build.
    pub fn len(&self) -> usize {
        self.built_len
    }

    pub fn is_empty(&self) -> bool {
        self.built_len == 0
    }

    pub fn nodes(&self) -> &[Node<D>] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> Option<&Node<D>> {
        self.nodes.first()
    }

    /// Deepest level present in the tree.
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.level).max().unwrap_or(0)
    }

    /// Particle indices contained in `node`.
    pub fn particles_in(&self, node: &Node<D>) -> &[usize] {
        &self.order[node.start..node.end]
    }

    /// Whether particle `j` lies in `node`'s subtree.
    #[inline]
    pub fn contains(&self, node: &Node<D>, j: usize) -> bool {
        self.slot
            .get(j)
            .is_some_and(|&k| node.start <= k && k < node.end)
    }

    /// Particle index lists of all non-empty leaves.
    pub fn leaf_particles(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.nodes
            .iter()
            .filter(|n| n.is_leaf() && !n.is_empty())
            .map(move |n| self.particles_in(n))
    }

    /// Fails when `particles` no longer covers every indexed particle.
    pub fn check(&self, particles: &[Particle<D>]) -> Result<()> {
        if particles.len() < self.built_len {
            return Err(Error::StaleTree {
                built: self.built_len,
                given: particles.len(),
            });
        }
        Ok(())
    }

    /// Indexes the first `count` particles.
    ///
    /// Every buffer is cleared and regrown; nothing from a previous build
    /// survives. `count == 0` produces an empty tree.
    pub fn build(&mut self, particles: &[Particle<D>], count: usize) -> Result<()> {
        if count > particles.len() {
            return Err(Error::ParticleCount {
                count,
                len: particles.len(),
            });
        }
        let t_all = timer();

        self.nodes.clear();
        self.order.clear();
        self.slot.clear();
        self.first_subnode.clear();
        self.next_branch.clear();
        self.built_len = count;
        if count == 0 {
            return Ok(());
        }

        let t0 = timer();
        let (center, half) = self.root_cube(&particles[..count])?;
        log_timing("tree.root_cube", t0);

        self.order.extend(0..count);
        self.nodes.push(Node::new(center, half, 0, 0, count));

        let t0 = timer();
        self.build_recursive(particles, 0);
        log_timing("tree.build_recursive", t0);

        self.slot.resize(count, 0);
        for (k, &j) in self.order.iter().enumerate() {
            self.slot[j] = k;
        }

        let t0 = timer();
        self.build_treewalk_links();
        self.build_mass_payload(particles);
        self.refresh_kernel_sizes(particles)?;
        log_timing("tree.payloads", t0);

        debug!(
            particles = count,
            nodes = self.nodes.len(),
            depth = self.depth(),
            "tree built"
        );
        log_timing("tree.build.total", t_all);
        Ok(())
    }

    /// Smallest cube holding the particle extent and, if set, the periodic box.
    fn root_cube(&self, particles: &[Particle<D>]) -> Result<(Vector<D>, f64)> {
        let mut minp = Vector::<D>::repeat(f64::INFINITY);
        let mut maxp = Vector::<D>::repeat(f64::NEG_INFINITY);
        for (i, p) in particles.iter().enumerate() {
            if !p.pos.iter().all(|x| x.is_finite()) {
                return Err(Error::invalid(format!("particle {i} has a non-finite position")));
            }
            minp = minp.inf(&p.pos);
            maxp = maxp.sup(&p.pos);
        }
        if let Some(periodic) = &self.periodic {
            minp = minp.inf(periodic.min());
            maxp = maxp.sup(periodic.max());
        }
        let center = (minp + maxp) * 0.5;
        let half = (maxp - minp).max() * 0.5;
        Ok((center, half))
    }

    #[inline]
    fn child_of(pos: &Vector<D>, center: &Vector<D>) -> usize {
        let mut c = 0usize;
        for k in 0..D {
            if pos[k] >= center[k] {
                c |= 1 << k;
            }
        }
        c
    }

    fn is_degenerate(&self, particles: &[Particle<D>], node: &Node<D>) -> bool {
        if 0.5 * node.half_size == 0.0 {
            return true;
        }
        let range = &self.order[node.start..node.end];
        let first = &particles[range[0]].pos;
        range.iter().all(|&j| particles[j].pos == *first)
    }

    fn build_recursive(&mut self, particles: &[Particle<D>], node_idx: usize) {
        let should_subdivide = {
            let n = &self.nodes[node_idx];
            n.len() > self.config.leaf_particle_num
                && n.level < self.config.max_level
                && !self.is_degenerate(particles, n)
        };
        if !should_subdivide {
            return;
        }
        self.subdivide_node(particles, node_idx);
        if let Some(first) = self.nodes[node_idx].first_child {
            for c in first..first + Self::FANOUT {
                if !self.nodes[c].is_empty() {
                    self.build_recursive(particles, c);
                }
            }
        }
    }

    fn subdivide_node(&mut self, particles: &[Particle<D>], node_idx: usize) {
        let (center, half, level, start, end) = {
            let n = &self.nodes[node_idx];
            (n.center, n.half_size, n.level, n.start, n.end)
        };

        let slice = &mut self.order[start..end];
        slice.sort_unstable_by_key(|&j| Self::child_of(&particles[j].pos, &center));

        let mut counts = [0usize; 8];
        for &j in slice.iter() {
            counts[Self::child_of(&particles[j].pos, &center)] += 1;
        }

        let first = self.nodes.len();
        let offset = 0.5 * half;
        let mut cursor = start;
        for (c, &count) in counts.iter().enumerate().take(Self::FANOUT) {
            let mut child_center = center;
            for k in 0..D {
                child_center[k] += if c & (1 << k) != 0 { offset } else { -offset };
            }
            self.nodes
                .push(Node::new(child_center, offset, level + 1, cursor, cursor + count));
            cursor += count;
        }
        debug_assert_eq!(cursor, end);
        self.nodes[node_idx].first_child = Some(first);
    }

    fn build_treewalk_links(&mut self) {
        let n = self.nodes.len();
        self.first_subnode.resize(n, NONE);
        self.next_branch.resize(n, NONE);

        // Parents precede children, so a parent's next branch is final
        // before its children are linked.
        for idx in 0..n {
            let Some(first) = self.nodes[idx].first_child else {
                continue;
            };
            self.first_subnode[idx] = first;
            let last = first + Self::FANOUT - 1;
            for c in first..last {
                self.next_branch[c] = c + 1;
            }
            self.next_branch[last] = self.next_branch[idx];
        }
    }

    fn build_mass_payload(&mut self, particles: &[Particle<D>]) {
        for idx in (0..self.nodes.len()).rev() {
            let mut mass = 0.0f64;
            let mut com = Vector::<D>::zeros();
            match self.nodes[idx].first_child {
                None => {
                    let node = &self.nodes[idx];
                    for &j in &self.order[node.start..node.end] {
                        let p = &particles[j];
                        mass += p.mass;
                        com += p.pos * p.mass;
                    }
                }
                Some(first) => {
                    for child in &self.nodes[first..first + Self::FANOUT] {
                        if child.mass == 0.0 {
                            continue;
                        }
                        mass += child.mass;
                        com += child.com * child.mass;
                    }
                }
            }
            if mass > 0.0 {
                com /= mass;
            } else {
                com = self.nodes[idx].center;
            }
            let node = &mut self.nodes[idx];
            node.mass = mass;
            node.com = com;
        }
    }

    /// Recomputes every node's `hmax` from the current smoothing lengths
    /// without touching the geometry.
    pub fn refresh_kernel_sizes(&mut self, particles: &[Particle<D>]) -> Result<()> {
        self.check(particles)?;
        for idx in (0..self.nodes.len()).rev() {
            let hmax = match self.nodes[idx].first_child {
                None => {
                    let node = &self.nodes[idx];
                    self.order[node.start..node.end]
                        .iter()
                        .map(|&j| particles[j].sml)
                        .fold(0.0f64, f64::max)
                }
                Some(first) => self.nodes[first..first + Self::FANOUT]
                    .iter()
                    .map(|c| c.hmax)
                    .fold(0.0f64, f64::max),
            };
            self.nodes[idx].hmax = hmax;
        }
        Ok(())
    }

    /// Depth-first walk over the non-empty nodes.
    ///
    /// For each node, `accept` decides whether the node is handled as a
    /// whole: if so `visit(Visit::Node)` is called and the subtree is
    /// skipped. Otherwise a leaf yields `visit(Visit::Particle)` for each
    /// particle it holds and an internal node is descended into.
    pub fn traverse<A, V>(&self, mut accept: A, mut visit: V)
    where
        A: FnMut(&Node<D>) -> bool,
        V: FnMut(Visit<'_, D>),
    {
        let mut idx = if self.nodes.is_empty() { NONE } else { 0 };
        while idx != NONE {
            let node = &self.nodes[idx];
            if node.is_empty() {
                idx = self.next_branch[idx];
                continue;
            }
            if accept(node) {
                visit(Visit::Node(node));
                idx = self.next_branch[idx];
            } else if node.is_leaf() {
                for &j in &self.order[node.start..node.end] {
                    visit(Visit::Particle(j));
                }
                idx = self.next_branch[idx];
            } else {
                idx = self.first_subnode[idx];
            }
        }
    }
}
