//! Basic blocks and control flow edges over a laid-out code body.

use crate::{
    instruction::{ExceptionCatch, Instruction, Label},
    ClassError, ClassResult,
};
use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::{Dfs, EdgeRef},
    Direction,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Range,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Edge {
    /// Execution runs off the end of the block into the next one.
    Fallthrough,
    /// A `goto` or the taken side of a conditional branch.
    Jump,
    Switch,
    /// The block lies inside a try range covered by this handler.
    Exception,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    /// Bytecode offsets covered by the block.
    pub range: Range<u32>,
    /// Indices into the instruction list the graph was built from.
    pub instructions: Range<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct ControlFlowGraph {
    graph: DiGraph<Block, Edge>,
    starts: BTreeMap<u32, NodeIndex>,
}

impl ControlFlowGraph {
    /// Builds the graph of a parsed body, where a label's id is its offset.
    pub fn build(instructions: &[(u32, Instruction)], catches: &[ExceptionCatch], code_len: u32) -> ClassResult<Self> {
        Self::build_with(instructions, catches, code_len, |label| Some(label.id()))
    }

    /// Builds the graph of a laid-out body, resolving labels through
    /// `resolve`.
    pub fn build_with<F>(
        instructions: &[(u32, Instruction)],
        catches: &[ExceptionCatch],
        code_len: u32,
        resolve: F,
    ) -> ClassResult<Self>
    where
        F: Fn(Label) -> Option<u32>,
    {
        if instructions.is_empty() {
            return Ok(ControlFlowGraph::default());
        }

        let offset = |label: Label| resolve(label).ok_or(ClassError::UnboundLabel(label));
        let index_of: BTreeMap<u32, usize> = instructions.iter().enumerate().map(|(idx, (pc, _))| (*pc, idx)).collect();

        // Offsets that start a basic block: the entry, jump targets, the
        // instruction after any jump, and exception range boundaries.
        let mut headers = BTreeSet::new();
        headers.insert(instructions[0].0);
        for (idx, (_, instruction)) in instructions.iter().enumerate() {
            let targets = instruction.targets();
            for target in &targets {
                headers.insert(offset(*target)?);
            }
            if !targets.is_empty() || instruction.is_unconditional() {
                if let Some((next, _)) = instructions.get(idx + 1) {
                    headers.insert(*next);
                }
            }
        }
        let mut handlers = vec![];
        for catch in catches {
            let (start, end, handler) = (offset(catch.start)?, offset(catch.end)?, offset(catch.handler)?);
            headers.insert(start);
            headers.insert(end);
            headers.insert(handler);
            handlers.push((start..end, handler));
        }
        headers.retain(|pc| *pc < code_len);

        let mut graph = DiGraph::new();
        let mut starts = BTreeMap::new();
        let header_list: Vec<u32> = headers.into_iter().collect();
        for (i, &start) in header_list.iter().enumerate() {
            let end = header_list.get(i + 1).copied().unwrap_or(code_len);
            let first = *index_of.get(&start).ok_or(ClassError::BadBranchTarget {
                offset: start as usize,
                target: start as i64,
            })?;
            let last = index_of.range(..end).next_back().map(|(_, idx)| idx + 1).unwrap_or(first + 1);
            let node = graph.add_node(Block {
                range: start..end,
                instructions: first..last,
            });
            starts.insert(start, node);
        }

        let mut cfg = ControlFlowGraph { graph, starts };
        let nodes: Vec<NodeIndex> = cfg.starts.values().copied().collect();
        for (i, &node) in nodes.iter().enumerate() {
            let block = cfg.graph[node].clone();
            let (_, last) = &instructions[block.instructions.end - 1];
            match last {
                Instruction::Branch { target, .. } | Instruction::Jsr { target, .. } => {
                    let to = cfg.node_at(offset(*target)?)?;
                    cfg.graph.add_edge(node, to, Edge::Jump);
                }
                Instruction::LookupSwitch { .. } | Instruction::TableSwitch { .. } => {
                    let targets: BTreeSet<u32> =
                        last.targets().into_iter().map(offset).collect::<ClassResult<_>>()?;
                    for target in targets {
                        let to = cfg.node_at(target)?;
                        cfg.graph.add_edge(node, to, Edge::Switch);
                    }
                }
                _ => {}
            }
            if !last.is_unconditional() {
                if let Some(&next) = nodes.get(i + 1) {
                    cfg.graph.add_edge(node, next, Edge::Fallthrough);
                }
            }
            for (range, handler) in &handlers {
                if range.start <= block.range.start && block.range.start < range.end {
                    let to = cfg.node_at(*handler)?;
                    cfg.graph.add_edge(node, to, Edge::Exception);
                }
            }
        }

        Ok(cfg)
    }

    fn node_at(&self, pc: u32) -> ClassResult<NodeIndex> {
        self.starts.get(&pc).copied().ok_or(ClassError::BadBranchTarget {
            offset: pc as usize,
            target: pc as i64,
        })
    }

    pub fn graph(&self) -> &DiGraph<Block, Edge> {
        &self.graph
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn entry(&self) -> Option<NodeIndex> {
        self.starts.values().next().copied()
    }

    /// The block containing bytecode offset `pc`.
    pub fn block_at(&self, pc: u32) -> Option<NodeIndex> {
        self.starts.range(..=pc).next_back().map(|(_, node)| *node).filter(|node| self.graph[*node].range.contains(&pc))
    }

    /// Blocks in bytecode order.
    pub fn blocks(&self) -> impl Iterator<Item = (NodeIndex, &Block)> + '_ {
        self.starts.values().map(move |&node| (node, &self.graph[node]))
    }

    pub fn successors(&self, node: NodeIndex) -> impl Iterator<Item = (NodeIndex, Edge)> + '_ {
        self.graph.edges_directed(node, Direction::Outgoing).map(|edge| (edge.target(), *edge.weight()))
    }

    pub fn predecessors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Incoming)
    }

    pub fn reachable(&self) -> BTreeSet<NodeIndex> {
        let mut seen = BTreeSet::new();
        if let Some(entry) = self.entry() {
            let mut dfs = Dfs::new(&self.graph, entry);
            while let Some(node) = dfs.next(&self.graph) {
                seen.insert(node);
            }
        }
        seen
    }

    /// Maximal runs of unreachable bytecode, in order.
    pub fn unreachable_ranges(&self) -> Vec<Range<u32>> {
        let reachable = self.reachable();
        let mut ranges: Vec<Range<u32>> = vec![];
        for (node, block) in self.blocks() {
            if reachable.contains(&node) {
                continue;
            }
            match ranges.last_mut() {
                Some(last) if last.end == block.range.start => last.end = block.range.end,
                _ => ranges.push(block.range.clone()),
            }
        }
        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    fn at(pc: u32) -> Label {
        Label::new(0, pc)
    }

    #[test]
    fn branches_split_blocks() {
        // 0: iload_0  1: ifeq 6  4: iconst_1  5: ireturn  6: iconst_0  7: ireturn
        let code = vec![
            (0, Instruction::Load { op: Opcode::Iload0, slot: 0 }),
            (1, Instruction::Branch { op: Opcode::Ifeq, target: at(6) }),
            (4, Instruction::Operator(Opcode::Iadd)),
            (5, Instruction::Return(Opcode::Ireturn)),
            (6, Instruction::Operator(Opcode::Iadd)),
            (7, Instruction::Return(Opcode::Ireturn)),
        ];
        let cfg = ControlFlowGraph::build(&code, &[], 8).unwrap();
        let ranges: Vec<_> = cfg.blocks().map(|(_, block)| block.range.clone()).collect();
        assert_eq!(ranges, vec![0..4, 4..6, 6..8]);

        let entry = cfg.entry().unwrap();
        let mut edges: Vec<_> = cfg.successors(entry).map(|(_, edge)| edge).collect();
        edges.sort_by_key(|edge| format!("{:?}", edge));
        assert_eq!(edges, vec![Edge::Fallthrough, Edge::Jump]);
        assert!(cfg.unreachable_ranges().is_empty());
    }

    #[test]
    fn code_after_return_is_unreachable() {
        let code = vec![
            (0, Instruction::Return(Opcode::Return)),
            (1, Instruction::Nop),
            (2, Instruction::Nop),
            (3, Instruction::Return(Opcode::Return)),
        ];
        let cfg = ControlFlowGraph::build(&code, &[], 4).unwrap();
        assert_eq!(cfg.unreachable_ranges(), vec![1..4]);
        assert_eq!(cfg.block_at(2), cfg.block_at(1));
    }

    #[test]
    fn handlers_are_reachable_through_exception_edges() {
        let code = vec![
            (0, Instruction::Nop),
            (1, Instruction::Return(Opcode::Return)),
            (2, Instruction::Throw),
        ];
        let catch = ExceptionCatch {
            start: at(0),
            end: at(1),
            handler: at(2),
            catch_type: None,
        };
        let cfg = ControlFlowGraph::build(&code, &[catch], 3).unwrap();
        assert!(cfg.unreachable_ranges().is_empty());
    }
}
