//! Items related to expressions.

use fnv::FnvHashSet;
use log::trace;
use petgraph::stable_graph::{self, StableDiGraph};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::{Incoming, Outgoing};
use rand::Rng;
use std::fmt;

/// A node/expression type that can be evaluated to a single value.
pub trait Evaluate<E> {
    /// The type of the value produced by the node type.
    type Value;
    /// Evaluate this node in terms of the given inputs to produce the given value.
    ///
    /// `inputs` holds one value per child slot, in slot order.
    fn evaluate(&self, inputs: &[Self::Value], env: &E) -> Self::Value;
}

/// The graph type used to store the nodes of an expression.
///
/// Edges are directed from a parent to each of its children and are weighted by the index of
/// the child slot that they occupy. A slot with no edge is empty. A node's parent is the source
/// of its only `Incoming` edge.
///
/// A `StableDiGraph` is used so that indices remain valid as nodes are replaced by mutation.
pub type Graph<N> = StableDiGraph<N, Slot, u32>;

/// The node index type used within the expr graph type.
pub type NodeIndex = stable_graph::NodeIndex<u32>;

/// The index of a child slot within its parent.
pub type Slot = usize;

/// An expression tree.
///
/// Each node is either a `Function` with one or more child slots, or a `Terminal` with none.
/// A tree is *complete* once every slot of every node reachable from the root holds a node.
#[derive(Clone, Debug)]
pub struct Expr<N> {
    graph: Graph<N>,
    root: NodeIndex,
}

/// An expression flattened into post-order, ready for repeated evaluation.
///
/// Produced by `Expr::compile`. Evaluation walks the instructions once using a value stack, so
/// evaluating many inputs (e.g. every pixel of an image) does not allocate per node.
#[derive(Clone, Debug)]
pub struct Program<'a, N: 'a> {
    instructions: Vec<(&'a N, usize)>,
}

/// Iterates over the nodes of a subtree in pre-order (node, then its children left to right).
pub struct PreOrder<'a, N: 'a> {
    expr: &'a Expr<N>,
    stack: Vec<NodeIndex>,
}

/// Renders a subtree as fully parenthesised prefix notation.
pub struct Display<'a, N: 'a> {
    expr: &'a Expr<N>,
    nx: NodeIndex,
}

impl<N> Expr<N>
where
    N: gen::Arity,
{
    /// Create an expression consisting of only the given root node.
    pub fn new(root: N) -> Self {
        let mut graph = Graph::<N>::default();
        let root = graph.add_node(root);
        Expr { graph, root }
    }

    /// The index of the root node.
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Read-only access to the underlying graph.
    pub fn graph(&self) -> &Graph<N> {
        &self.graph
    }

    /// The node at the given index.
    pub fn node(&self, nx: NodeIndex) -> &N {
        &self.graph[nx]
    }

    /// Add a detached node to the expression's storage.
    ///
    /// The node does not become part of the tree until it is placed in a slot via `set_child`.
    pub fn insert(&mut self, node: N) -> NodeIndex {
        self.graph.add_node(node)
    }

    /// The parent of the given node, or `None` for the root and detached nodes.
    pub fn parent(&self, nx: NodeIndex) -> Option<NodeIndex> {
        self.parent_slot(nx).map(|(parent, _)| parent)
    }

    /// The parent of the given node along with the slot that holds it.
    pub fn parent_slot(&self, nx: NodeIndex) -> Option<(NodeIndex, Slot)> {
        self.graph
            .edges_directed(nx, Incoming)
            .next()
            .map(|e| (e.source(), *e.weight()))
    }

    /// The child held within the given slot of `nx`, if any.
    pub fn child(&self, nx: NodeIndex, slot: Slot) -> Option<NodeIndex> {
        self.graph
            .edges_directed(nx, Outgoing)
            .find(|e| *e.weight() == slot)
            .map(|e| e.target())
    }

    /// One entry per child slot of `nx` in slot order. Empty slots are `None`.
    pub fn children(&self, nx: NodeIndex) -> Vec<Option<NodeIndex>> {
        let mut children = vec![None; self.graph[nx].arity() as usize];
        for e in self.graph.edges_directed(nx, Outgoing) {
            children[*e.weight()] = Some(e.target());
        }
        children
    }

    /// Whether or not the node has any child slots at all.
    pub fn accepts_children(&self, nx: NodeIndex) -> bool {
        self.graph[nx].arity() > 0
    }

    /// Place `child` within the given slot of `nx`.
    ///
    /// `child` is first detached from its current parent (if any). Returns the node previously
    /// held by the slot, which is left detached within storage.
    ///
    /// **Panics** if `slot` is not below the arity of `nx` or if `child` is `nx` or the root.
    pub fn set_child(&mut self, nx: NodeIndex, slot: Slot, child: NodeIndex) -> Option<NodeIndex> {
        let arity = self.graph[nx].arity() as usize;
        assert!(slot < arity, "slot {} is out of range for a node of arity {}", slot, arity);
        assert!(child != nx, "node {:?} cannot be its own child", nx);
        assert!(child != self.root, "the root {:?} cannot become a child", child);
        self.detach(child);
        let displaced = self.take_child(nx, slot);
        self.graph.add_edge(nx, child, slot);
        displaced
    }

    /// Empty the given slot of `nx`, returning the detached child that it held.
    pub fn take_child(&mut self, nx: NodeIndex, slot: Slot) -> Option<NodeIndex> {
        let (edge, child) = self
            .graph
            .edges_directed(nx, Outgoing)
            .find(|e| *e.weight() == slot)
            .map(|e| (e.id(), e.target()))?;
        self.graph.remove_edge(edge);
        Some(child)
    }

    // Remove the edge from the node's parent, if it has one.
    fn detach(&mut self, nx: NodeIndex) {
        let edge = self.graph.edges_directed(nx, Incoming).next().map(|e| e.id());
        if let Some(edge) = edge {
            self.graph.remove_edge(edge);
        }
    }

    /// Remove the subtree rooted at `nx` from the tree and from storage.
    ///
    /// **Panics** if `nx` is the root.
    pub fn remove_subtree(&mut self, nx: NodeIndex) {
        assert!(nx != self.root, "cannot remove the root of an expression");
        self.detach(nx);
        let mut doomed = vec![];
        let mut dfs = Dfs::new(&self.graph, nx);
        while let Some(n) = dfs.next(&self.graph) {
            doomed.push(n);
        }
        for n in doomed {
            self.graph.remove_node(n);
        }
    }

    /// Attach `node` at a random empty slot.
    ///
    /// Starting at the root, a slot is chosen uniformly at random. If it is empty the node is
    /// placed there, otherwise the walk continues into the slot's occupant. If the walk reaches a
    /// node without slots, `node` cannot be placed and is dropped.
    pub fn add_random<R>(&mut self, rng: &mut R, node: N) -> Option<NodeIndex>
    where
        R: Rng,
    {
        let mut parent = self.root;
        loop {
            let arity = self.graph[parent].arity() as usize;
            if arity == 0 {
                trace!("random walk reached terminal {:?}, dropping node", parent);
                return None;
            }
            let slot = rng.gen_range(0..arity);
            match self.child(parent, slot) {
                Some(child) => parent = child,
                None => {
                    let nx = self.insert(node);
                    self.set_child(parent, slot, nx);
                    trace!("added {:?} at slot {} of {:?}", nx, slot, parent);
                    return Some(nx);
                }
            }
        }
    }

    /// Attach `leaf` within the first empty slot found in pre-order.
    ///
    /// Returns `false` if the tree has no empty slot, in which case `leaf` is dropped. Calling
    /// this until it returns `false` completes the tree.
    pub fn add_leaf(&mut self, leaf: N) -> bool {
        match self.first_empty_slot(self.root) {
            None => false,
            Some((parent, slot)) => {
                let nx = self.insert(leaf);
                self.set_child(parent, slot, nx);
                true
            }
        }
    }

    /// The first empty slot within the subtree at `nx`, searching slots in order and descending
    /// into each occupied slot before moving on to the next.
    pub fn first_empty_slot(&self, nx: NodeIndex) -> Option<(NodeIndex, Slot)> {
        for (slot, child) in self.children(nx).into_iter().enumerate() {
            match child {
                None => return Some((nx, slot)),
                Some(child) => {
                    if let Some(found) = self.first_empty_slot(child) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    /// The number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.subtree_node_count(self.root)
    }

    /// The number of nodes in the subtree at `nx`. Empty slots count for nothing.
    pub fn subtree_node_count(&self, nx: NodeIndex) -> usize {
        1 + self
            .children(nx)
            .into_iter()
            .flatten()
            .map(|child| self.subtree_node_count(child))
            .sum::<usize>()
    }

    /// Traverse the subtree at `nx` in pre-order.
    pub fn pre_order(&self, nx: NodeIndex) -> PreOrder<N> {
        PreOrder { expr: self, stack: vec![nx] }
    }

    /// The node at zero-based pre-order position `n`, where the root is at position `0`.
    ///
    /// Returns `None` if `n` is not below `node_count`.
    pub fn nth_node(&self, n: usize) -> Option<NodeIndex> {
        self.pre_order(self.root).nth(n)
    }

    /// Replace the node at `nx` with a freshly generated node.
    ///
    /// The replacement takes over `nx`'s slot within its parent. As many of `nx`'s children as
    /// the replacement has slots for are moved across index by index, the rest are removed. Any
    /// slots still empty are filled with new terminals. If `nx` was the root, the replacement
    /// becomes the root.
    ///
    /// Returns the index of the replacement. `nx` is no longer valid afterwards.
    pub fn mutate<R>(&mut self, rng: &mut R, nx: NodeIndex) -> NodeIndex
    where
        R: Rng,
        N: gen::Mutation + gen::Terminal,
    {
        let replacement = self.insert(gen::Mutation::generate(rng));

        if let Some((parent, slot)) = self.parent_slot(nx) {
            self.set_child(parent, slot, replacement);
        }

        // Move over the children that fit, discarding the rest.
        let arity = self.graph[replacement].arity() as usize;
        for (slot, child) in self.children(nx).into_iter().enumerate() {
            let child = match child {
                Some(child) => child,
                None => continue,
            };
            if slot < arity {
                self.set_child(replacement, slot, child);
            } else {
                self.remove_subtree(child);
            }
        }

        for slot in 0..arity {
            if self.child(replacement, slot).is_none() {
                let leaf = self.insert(gen::Terminal::generate(rng));
                self.set_child(replacement, slot, leaf);
            }
        }

        self.graph.remove_node(nx);
        if nx == self.root {
            self.root = replacement;
        }
        replacement
    }

    /// Whether or not every slot reachable from the root holds a node.
    pub fn is_complete(&self) -> bool {
        self.first_empty_slot(self.root).is_none()
    }

    /// Check the structural invariants of the tree.
    ///
    /// - The root has no parent.
    /// - No node is reachable twice and every stored node is reachable from the root.
    /// - Every child slot index is unique and below its node's arity.
    pub fn is_consistent(&self) -> bool {
        if !self.graph.contains_node(self.root) || self.parent(self.root).is_some() {
            return false;
        }
        let mut visited = FnvHashSet::default();
        let mut stack = vec![self.root];
        while let Some(nx) = stack.pop() {
            if !visited.insert(nx) {
                return false;
            }
            if nx != self.root && self.graph.edges_directed(nx, Incoming).count() != 1 {
                return false;
            }
            let arity = self.graph[nx].arity() as usize;
            let mut slots = FnvHashSet::default();
            for e in self.graph.edges_directed(nx, Outgoing) {
                if *e.weight() >= arity || !slots.insert(*e.weight()) {
                    return false;
                }
                stack.push(e.target());
            }
        }
        visited.len() == self.graph.node_count()
    }

    /// Render the subtree at `nx` in prefix notation.
    pub fn display_subtree(&self, nx: NodeIndex) -> Display<N> {
        Display { expr: self, nx }
    }

    /// Flatten the tree into a post-order `Program`.
    ///
    /// **Panics** if the tree is not complete.
    pub fn compile(&self) -> Program<N> {
        let mut instructions = Vec::with_capacity(self.graph.node_count());
        self.compile_subtree(self.root, &mut instructions);
        Program { instructions }
    }

    fn compile_subtree<'a>(&'a self, nx: NodeIndex, instructions: &mut Vec<(&'a N, usize)>) {
        let children = self.children(nx);
        for (slot, child) in children.iter().enumerate() {
            match *child {
                Some(child) => self.compile_subtree(child, instructions),
                None => panic!("cannot compile incomplete expression: slot {} of {:?} is empty", slot, nx),
            }
        }
        instructions.push((&self.graph[nx], children.len()));
    }

    /// Evaluate the expression within the given environment.
    ///
    /// Prefer `compile` when evaluating the same expression many times.
    pub fn eval<E>(&self, env: &E) -> N::Value
    where
        N: Evaluate<E>,
    {
        self.compile().eval(env, &mut Vec::new())
    }
}

impl<'a, N> Program<'a, N> {
    /// Evaluate the program within the given environment.
    ///
    /// `stack` is scratch space that may be reused between calls.
    pub fn eval<E>(&self, env: &E, stack: &mut Vec<N::Value>) -> N::Value
    where
        N: Evaluate<E>,
    {
        stack.clear();
        for &(node, arity) in &self.instructions {
            let start = stack.len() - arity;
            let value = node.evaluate(&stack[start..], env);
            stack.truncate(start);
            stack.push(value);
        }
        stack.pop().expect("a compiled program always has a root")
    }

    /// The number of instructions, equal to the number of nodes in the compiled tree.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }
}

impl<'a, N> Iterator for PreOrder<'a, N>
where
    N: gen::Arity,
{
    type Item = NodeIndex;
    fn next(&mut self) -> Option<Self::Item> {
        let nx = self.stack.pop()?;
        let children = self.expr.children(nx);
        self.stack.extend(children.into_iter().rev().flatten());
        Some(nx)
    }
}

impl<'a, N> fmt::Display for Display<'a, N>
where
    N: gen::Arity + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let node = self.expr.node(self.nx);
        if node.arity() == 0 {
            return write!(f, "{}", node);
        }
        write!(f, "( {}", node)?;
        for (slot, child) in self.expr.children(self.nx).into_iter().enumerate() {
            match child {
                Some(child) => write!(f, " {}", self.expr.display_subtree(child))?,
                None => panic!("cannot display incomplete expression: slot {} of {:?} is empty", slot, self.nx),
            }
        }
        write!(f, " )")
    }
}

impl<N> fmt::Display for Expr<N>
where
    N: gen::Arity + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.display_subtree(self.root), f)
    }
}

/// Functions for generating expression trees.
pub mod gen {
    use rand::Rng;
    use super::Expr;

    /// Node types that know their number of inputs / arguments.
    pub trait Arity {
        /// The number of arguments to the node.
        ///
        /// Function nodes will return 1 or more. Terminal nodes will return 0.
        fn arity(&self) -> u32;
    }

    /// Function types that may be generated for use within an expression.
    pub trait Function: Arity {
        /// Generate an instance of this Function type.
        fn generate<R>(rng: &mut R) -> Self where R: Rng;
    }

    /// Terminal types that may be generated for use within an expression.
    pub trait Terminal {
        /// Generate an instance of this Terminal type.
        fn generate<R>(rng: &mut R) -> Self where R: Rng;
    }

    /// Types that may be generated as the replacement for a node chosen for mutation.
    pub trait Mutation: Arity {
        /// Generate a replacement node, either a function or a terminal.
        fn generate<R>(rng: &mut R) -> Self where R: Rng;
    }

    /// Expression nodes that may be generated.
    pub trait Node: Function + Terminal {}

    impl<T> Node for T where T: Function + Terminal {}

    /// Generate an expression tree by random insertion.
    ///
    /// The root is a `Function`. `insertions` more `Function`s are each placed at a random empty
    /// slot via `Expr::add_random`, after which every remaining empty slot is filled with a
    /// `Terminal` in pre-order.
    ///
    /// The resulting tree is always complete.
    pub fn insertion_tree<R, N>(rng: &mut R, insertions: usize) -> Expr<N>
    where
        R: Rng,
        N: Node,
    {
        let root: N = Function::generate(rng);
        let mut expr = Expr::new(root);

        for _ in 0..insertions {
            let node: N = Function::generate(rng);
            expr.add_random(rng, node);
        }

        loop {
            let leaf: N = Terminal::generate(rng);
            if !expr.add_leaf(leaf) {
                break;
            }
        }

        expr
    }
}
