use std::collections::{HashMap, HashSet, VecDeque};

use lambdaflow_config::WorkflowDef;

use crate::error::GraphError;
use crate::node::{Edge, Node};

/// Graph structure for traversal and analysis.
///
/// Adjacency lists keep edge declaration order; duplicate edges are collapsed.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
  nodes: Vec<Node>,
  edges: Vec<Edge>,
  /// node_id -> position in `nodes`.
  index: HashMap<String, usize>,
  /// Adjacency list: node_id -> list of downstream node_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: node_id -> list of upstream node_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no incoming edges, in declaration order.
  source_nodes: Vec<String>,
  /// node_id -> every node reachable from it (excluding itself).
  descendants: HashMap<String, HashSet<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  Unvisited,
  InProgress,
  Done,
}

impl WorkflowGraph {
  /// Build and validate a graph from nodes and edges.
  pub fn build(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, GraphError> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (position, node) in nodes.iter().enumerate() {
      if index.insert(node.id.clone(), position).is_some() {
        return Err(GraphError::DuplicateNodeId(node.id.clone()));
      }
    }

    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    // Initialize all nodes
    for node in &nodes {
      adjacency.entry(node.id.clone()).or_default();
      reverse_adjacency.entry(node.id.clone()).or_default();
    }

    let mut seen = HashSet::new();
    let mut unique_edges = Vec::with_capacity(edges.len());
    for edge in edges {
      if !index.contains_key(&edge.source) || !index.contains_key(&edge.target) {
        return Err(GraphError::UnknownNodeReference {
          from: edge.source,
          to: edge.target,
        });
      }
      if !seen.insert(edge.clone()) {
        continue;
      }
      adjacency
        .entry(edge.source.clone())
        .or_default()
        .push(edge.target.clone());
      reverse_adjacency
        .entry(edge.target.clone())
        .or_default()
        .push(edge.source.clone());
      unique_edges.push(edge);
    }

    let source_nodes = nodes
      .iter()
      .filter(|node| reverse_adjacency.get(&node.id).is_none_or(|v| v.is_empty()))
      .map(|node| node.id.clone())
      .collect();

    let mut graph = Self {
      nodes,
      edges: unique_edges,
      index,
      adjacency,
      reverse_adjacency,
      source_nodes,
      descendants: HashMap::new(),
    };

    if let Some(path) = graph.find_cycle() {
      return Err(GraphError::CycleDetected { path });
    }

    graph.descendants = graph.compute_descendants();
    Ok(graph)
  }

  /// Build a graph from an authored workflow definition.
  pub fn from_def(def: WorkflowDef) -> Result<Self, GraphError> {
    let nodes = def.nodes.into_iter().map(Node::from).collect();
    let edges = def.edges.into_iter().map(Edge::from).collect();
    Self::build(nodes, edges)
  }

  /// All nodes in declaration order.
  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  /// All distinct edges in declaration order.
  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  /// Get a node by ID.
  pub fn node(&self, node_id: &str) -> Option<&Node> {
    self.index.get(node_id).map(|&position| &self.nodes[position])
  }

  pub fn contains(&self, node_id: &str) -> bool {
    self.index.contains_key(node_id)
  }

  /// Get downstream nodes for a given node.
  pub fn forward_of(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn reverse_of(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get source nodes (nodes with no incoming edges).
  pub fn source_nodes(&self) -> &[String] {
    &self.source_nodes
  }

  /// Whether `node_id` is reachable from `ancestor` through at least one edge.
  pub fn is_descendant(&self, ancestor: &str, node_id: &str) -> bool {
    self
      .descendants
      .get(ancestor)
      .is_some_and(|reachable| reachable.contains(node_id))
  }

  /// First node (in declaration order) whose kind matches.
  pub fn find_by_kind(&self, kind: &str) -> Option<&Node> {
    self.nodes.iter().find(|node| node.kind == kind)
  }

  /// Three-colour DFS over every node. Returns the offending path, closed by
  /// repeating its first node, if a cycle exists.
  fn find_cycle(&self) -> Option<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = self
      .nodes
      .iter()
      .map(|node| (node.id.as_str(), Mark::Unvisited))
      .collect();

    for start in &self.nodes {
      if marks.get(start.id.as_str()) != Some(&Mark::Unvisited) {
        continue;
      }

      // (node, index of the next child to visit)
      let mut stack: Vec<(&str, usize)> = vec![(start.id.as_str(), 0)];
      marks.insert(start.id.as_str(), Mark::InProgress);

      while let Some(frame) = stack.last_mut() {
        let (node_id, position) = *frame;
        let children = self.forward_of(node_id);

        if position >= children.len() {
          marks.insert(node_id, Mark::Done);
          stack.pop();
          continue;
        }

        frame.1 += 1;
        let child = children[position].as_str();
        match marks.get(child).copied().unwrap_or(Mark::Unvisited) {
          Mark::Unvisited => {
            marks.insert(child, Mark::InProgress);
            stack.push((child, 0));
          }
          Mark::InProgress => {
            let from = stack.iter().position(|(id, _)| *id == child).unwrap_or(0);
            let mut path: Vec<String> = stack[from..]
              .iter()
              .map(|(id, _)| id.to_string())
              .collect();
            path.push(child.to_string());
            return Some(path);
          }
          Mark::Done => {}
        }
      }
    }

    None
  }

  fn compute_descendants(&self) -> HashMap<String, HashSet<String>> {
    self
      .nodes
      .iter()
      .map(|node| {
        let mut reachable = HashSet::new();
        let mut queue: VecDeque<&str> = self
          .forward_of(&node.id)
          .iter()
          .map(String::as_str)
          .collect();
        while let Some(next) = queue.pop_front() {
          if reachable.insert(next.to_string()) {
            queue.extend(self.forward_of(next).iter().map(String::as_str));
          }
        }
        (node.id.clone(), reachable)
      })
      .collect()
  }
}
