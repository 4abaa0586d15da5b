use std::{borrow::Cow, fmt::Debug, hash::Hash};

use crate::utils::index_set::{IndexMap, IndexSet, KeyIndex};

/// The seam between the graph analyses and whatever owns the nodes. A
/// function's CFG implements this; so does the reversed view used for
/// post-dominators. Nodes are dense integer handles.
pub trait Graph {
    type Node: Copy
        + Clone
        + PartialEq
        + Eq
        + PartialOrd
        + Ord
        + Hash
        + Debug
        + From<usize>
        + Into<usize>
        + KeyIndex;

    fn num_nodes(&self) -> usize;
    fn node(&self, index: usize) -> Option<Self::Node>;
    fn node_index(&self, node: Self::Node) -> usize;
    fn root(&self) -> Self::Node;
    fn successors(&self, node: Self::Node) -> Cow<[Self::Node]>;
    fn predecessors(&self, node: Self::Node) -> Cow<[Self::Node]>;

    fn display(&self, node: Option<Self::Node>) -> String {
        if let Some(node) = node {
            format!("{:?}", node)
        } else {
            "null".to_string()
        }
    }
}

pub struct GraphNodeWorklist<Node: KeyIndex> {
    seen: IndexSet<Node>,
    stack: Vec<Node>,
}

impl<Node: KeyIndex> GraphNodeWorklist<Node> {
    pub fn new() -> Self {
        Self {
            seen: IndexSet::new(),
            stack: Vec::new(),
        }
    }

    pub fn push(&mut self, node: Node) -> bool {
        if self.seen.insert(node) {
            self.stack.push(node);
            true
        } else {
            false
        }
    }

    pub fn saw(&self, node: Node) -> bool {
        self.seen.contains(&node)
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn pop(&mut self) -> Option<Node> {
        self.stack.pop()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum GraphVisitOrder {
    Pre,
    Post,
}

/// Depth-first reverse post-order from the graph's root. Uses an explicit
/// stack of (node, next successor slot) so deep graphs cannot overflow the
/// program stack. Nodes unreachable from the root do not appear.
pub fn reverse_post_order<G: Graph>(graph: &G) -> Vec<G::Node> {
    let mut order = Vec::with_capacity(graph.num_nodes());
    let mut seen = IndexSet::new();
    let mut stack: Vec<(G::Node, usize)> = Vec::new();

    seen.insert(graph.root());
    stack.push((graph.root(), 0));

    while let Some((node, successor_index)) = stack.pop() {
        let successors = graph.successors(node);

        if successor_index < successors.len() {
            stack.push((node, successor_index + 1));

            let successor = successors[successor_index];
            if seen.insert(successor) {
                stack.push((successor, 0));
            }
        } else {
            order.push(node);
        }
    }

    order.reverse();
    order
}

#[derive(Clone)]
struct DomData<N> {
    idom_parent: Option<N>,
    idom_kids: Vec<N>,
    pre_number: usize,
    post_number: usize,
}

impl<N> DomData<N> {
    fn new() -> Self {
        Self {
            idom_parent: None,
            idom_kids: Vec::new(),
            pre_number: usize::MAX,
            post_number: usize::MAX,
        }
    }
}

/// Immediate dominators computed by the iterative reverse-post-order
/// dataflow of Cooper, Harvey and Kennedy ("A Simple, Fast Dominance
/// Algorithm"). Dominance queries walk no pointers: once the tree is built we
/// assign pre and post numbers and use the range-inclusion check, so
/// `dominates` is two comparisons.
pub struct Dominators<G: Graph> {
    data: IndexMap<DomData<G::Node>, G::Node>,
}

impl<G: Graph> Dominators<G> {
    pub fn new(graph: &G) -> Self {
        let rpo = reverse_post_order(graph);

        let mut rpo_number: IndexMap<usize, G::Node> = IndexMap::with_capacity(graph.num_nodes());
        for (position, node) in rpo.iter().enumerate() {
            rpo_number.insert(*node, position);
        }

        let root = graph.root();
        let mut idom: IndexMap<G::Node, G::Node> = IndexMap::with_capacity(graph.num_nodes());
        idom.insert(root, root);

        let mut changed = true;
        while changed {
            changed = false;

            for &node in rpo.iter().skip(1) {
                let mut new_idom: Option<G::Node> = None;

                for &pred in graph.predecessors(node).iter() {
                    // Unreachable predecessors, and predecessors not yet
                    // assigned in this sweep, contribute nothing.
                    if !idom.contains_key(&pred) {
                        continue;
                    }

                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => Self::intersect(&idom, &rpo_number, pred, current),
                    });
                }

                if let Some(new_idom) = new_idom {
                    if idom.get(&node) != Some(&new_idom) {
                        idom.insert(node, new_idom);
                        changed = true;
                    }
                }
            }
        }

        // Materialize the tree, then number it depth-first for the
        // range-inclusion dominance check.
        let mut data: IndexMap<DomData<G::Node>, G::Node> =
            IndexMap::with_capacity(graph.num_nodes());

        for &node in rpo.iter() {
            let mut node_data = DomData::new();

            if node != root {
                node_data.idom_parent = idom.get(&node).copied();
            }

            data.insert(node, node_data);
        }

        for &node in rpo.iter().skip(1) {
            if let Some(&parent) = idom.get(&node) {
                data.get_mut(&parent).unwrap().idom_kids.push(node);
            }
        }

        let mut next_pre_number = 0;
        let mut next_post_number = 0;
        let mut worklist: Vec<(G::Node, GraphVisitOrder)> = vec![(root, GraphVisitOrder::Pre)];

        while let Some((node, order)) = worklist.pop() {
            match order {
                GraphVisitOrder::Pre => {
                    data.get_mut(&node).unwrap().pre_number = next_pre_number;
                    next_pre_number += 1;

                    worklist.push((node, GraphVisitOrder::Post));
                    for kid in data.get(&node).unwrap().idom_kids.clone() {
                        worklist.push((kid, GraphVisitOrder::Pre));
                    }
                }

                GraphVisitOrder::Post => {
                    data.get_mut(&node).unwrap().post_number = next_post_number;
                    next_post_number += 1;
                }
            }
        }

        Self { data }
    }

    fn intersect(
        idom: &IndexMap<G::Node, G::Node>,
        rpo_number: &IndexMap<usize, G::Node>,
        a: G::Node,
        b: G::Node,
    ) -> G::Node {
        let mut a = a;
        let mut b = b;

        // Both arguments are reachable, so both have reverse-post-order
        // numbers and idoms.
        while a != b {
            while rpo_number.get(&a).unwrap() > rpo_number.get(&b).unwrap() {
                a = *idom.get(&a).unwrap();
            }

            while rpo_number.get(&b).unwrap() > rpo_number.get(&a).unwrap() {
                b = *idom.get(&b).unwrap();
            }
        }

        a
    }

    pub fn strictly_dominates(&self, from: G::Node, to: G::Node) -> bool {
        match (self.numbers(from), self.numbers(to)) {
            (Some((from_pre, from_post)), Some((to_pre, to_post))) => {
                to_pre > from_pre && to_post < from_post
            }
            _ => false,
        }
    }

    pub fn dominates(&self, from: G::Node, to: G::Node) -> bool {
        from == to || self.strictly_dominates(from, to)
    }

    /// The immediate dominator, or `None` for the root and for nodes the
    /// root cannot reach.
    pub fn idom(&self, node: G::Node) -> Option<G::Node> {
        self.data.get(&node).and_then(|data| data.idom_parent)
    }

    pub(crate) fn numbers(&self, node: G::Node) -> Option<(usize, usize)> {
        self.data.get(&node).and_then(|data| {
            if data.pre_number == usize::MAX {
                None
            } else {
                Some((data.pre_number, data.post_number))
            }
        })
    }
}

/// A node of [`BackwardsGraph`]: either a real node of the underlying graph
/// or the synthetic root that precedes every exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SingleGraphNode<N: Copy> {
    node: N,
    is_root: bool,
}

impl<N: Copy + From<usize>> SingleGraphNode<N> {
    pub fn new(node: N) -> Self {
        Self {
            node,
            is_root: false,
        }
    }

    pub fn root() -> Self {
        Self {
            node: N::from(0usize),
            is_root: true,
        }
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn node(&self) -> N {
        self.node
    }
}

// The synthetic root takes index 0 and every real node shifts up by one, so
// the root and real node 0 never collide in index-keyed containers.
impl<N: Copy + From<usize> + KeyIndex> KeyIndex for SingleGraphNode<N> {
    fn index(&self) -> usize {
        if self.is_root {
            0
        } else {
            self.node.index() + 1
        }
    }
}

impl<N: Copy + From<usize>> From<usize> for SingleGraphNode<N> {
    fn from(index: usize) -> Self {
        if index == 0 {
            Self::root()
        } else {
            Self::new(N::from(index - 1))
        }
    }
}

impl<N: Copy + From<usize> + Into<usize>> From<SingleGraphNode<N>> for usize {
    fn from(node: SingleGraphNode<N>) -> Self {
        if node.is_root {
            0
        } else {
            node.node.into() + 1
        }
    }
}

/// The reversed view of a graph, with a synthetic root in front of every
/// node the reversed traversal has to start from: exit nodes first, then (in
/// descending index order) any node not already backwards-reachable, which
/// covers infinite loops and irreducible tails. Dominators of this graph are
/// post-dominators of the underlying one.
pub struct BackwardsGraph<'a, G: Graph> {
    graph: &'a G,
    root_successor_list: Vec<SingleGraphNode<G::Node>>,
    root_successor_set: IndexSet<G::Node>,
}

impl<'a, G: Graph> BackwardsGraph<'a, G> {
    pub fn new(graph: &'a G) -> Self {
        let mut this = Self {
            graph,
            root_successor_list: Vec::new(),
            root_successor_set: IndexSet::new(),
        };

        let mut worklist = GraphNodeWorklist::new();

        let mut add_root_successor = |this: &mut Self, node: G::Node| {
            if worklist.push(node) {
                this.root_successor_list.push(SingleGraphNode::new(node));
                this.root_successor_set.insert(node);

                while let Some(node) = worklist.pop() {
                    for predecessor in this.graph.predecessors(node).iter().copied() {
                        worklist.push(predecessor);
                    }
                }
            }
        };

        for index in 0..graph.num_nodes() {
            if let Some(node) = graph.node(index) {
                if graph.successors(node).is_empty() {
                    add_root_successor(&mut this, node);
                }
            }
        }

        for index in (0..graph.num_nodes()).rev() {
            if let Some(node) = graph.node(index) {
                add_root_successor(&mut this, node);
            }
        }

        this
    }
}

impl<'a, G: Graph> Graph for BackwardsGraph<'a, G> {
    type Node = SingleGraphNode<G::Node>;

    fn num_nodes(&self) -> usize {
        self.graph.num_nodes() + 1
    }

    fn node(&self, index: usize) -> Option<Self::Node> {
        if index == 0 {
            Some(SingleGraphNode::root())
        } else {
            self.graph.node(index - 1).map(SingleGraphNode::new)
        }
    }

    fn node_index(&self, node: Self::Node) -> usize {
        if node.is_root() {
            0
        } else {
            self.graph.node_index(node.node()) + 1
        }
    }

    fn root(&self) -> Self::Node {
        SingleGraphNode::root()
    }

    fn successors(&self, node: Self::Node) -> Cow<[Self::Node]> {
        if node.is_root() {
            Cow::Borrowed(&self.root_successor_list)
        } else {
            Cow::Owned(
                self.graph
                    .predecessors(node.node())
                    .iter()
                    .copied()
                    .map(SingleGraphNode::new)
                    .collect(),
            )
        }
    }

    fn predecessors(&self, node: Self::Node) -> Cow<[Self::Node]> {
        if node.is_root() {
            return Cow::Borrowed(&[]);
        }

        let mut result = Vec::new();

        if self.root_successor_set.contains(&node.node()) {
            result.push(SingleGraphNode::root());
        }

        for successor in self.graph.successors(node.node()).iter().copied() {
            result.push(SingleGraphNode::new(successor));
        }

        Cow::Owned(result)
    }

    fn display(&self, node: Option<Self::Node>) -> String {
        match node {
            Some(node) if node.is_root() => "#root".to_string(),
            Some(node) => self.graph.display(Some(node.node())),
            None => "null".to_string(),
        }
    }
}

/// Post-dominance for a graph, answered in O(1) per query. Built once per
/// function analysis; nodes with no path to any exit anchor report `false`
/// for everything, which makes the dependent heuristics decline rather than
/// guess.
pub struct PostDominators<G: Graph> {
    data: IndexMap<(usize, usize), G::Node>,
}

impl<G: Graph> PostDominators<G> {
    pub fn new(graph: &G) -> Self {
        let backwards = BackwardsGraph::new(graph);
        let dominators = Dominators::new(&backwards);

        let mut data = IndexMap::with_capacity(graph.num_nodes());

        for index in 0..graph.num_nodes() {
            if let Some(node) = graph.node(index) {
                if let Some(numbers) = dominators.numbers(SingleGraphNode::new(node)) {
                    data.insert(node, numbers);
                }
            }
        }

        Self { data }
    }

    /// True if every path from `b` to a function exit passes through `a`.
    pub fn post_dominates(&self, a: G::Node, b: G::Node) -> bool {
        if a == b {
            return true;
        }

        match (self.data.get(&a), self.data.get(&b)) {
            (Some(&(a_pre, a_post)), Some(&(b_pre, b_post))) => b_pre > a_pre && b_post < a_post,
            _ => false,
        }
    }
}
