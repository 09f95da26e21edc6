//! Disassembly of code bodies, grouped into basic blocks with a gutter of
//! jump arrows.

use crate::{pad, style};
use classfile::{
    attribute::Attribute,
    flow::{ControlFlowGraph, Edge},
    CodeModel, ClassResult, Instruction,
};
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    fn low(&self) -> usize {
        self.start.min(self.end)
    }

    fn high(&self) -> usize {
        self.start.max(self.end)
    }

    pub fn is_backward(&self) -> bool {
        self.end < self.start
    }

    pub fn overlaps(&self, other: &Range) -> bool {
        self.low() <= other.high() && other.low() <= self.high()
    }

    pub fn contains(&self, point: usize) -> bool {
        self.low() <= point && point <= self.high()
    }
}

/// Split jump/branch ranges into layers where none of the ranges in a single
/// layer overlap.
pub fn partition_jumps(intervals: &[Range]) -> Vec<Vec<Range>> {
    let mut layers: Vec<Vec<Range>> = vec![];

    for &interval in intervals {
        // lowest layer where nothing overlaps
        match layers
            .iter_mut()
            .find(|layer| layer.iter().all(|other| !other.overlaps(&interval)))
        {
            Some(layer) => layer.push(interval),
            None => layers.push(vec![interval]),
        }
    }

    layers
}

/// One gutter column per layer, innermost on the right.
fn gutter(layers: &[Vec<Range>], pc: usize) -> String {
    let mut out = String::new();
    for layer in layers.iter().rev() {
        let cell = layer.iter().find(|range| range.contains(pc)).map(|range| {
            let path = if range.is_backward() {
                "flow.jump.backward"
            } else {
                "flow.jump.forward"
            };
            let ch = if pc == range.start {
                "+"
            } else if pc == range.end {
                ">"
            } else {
                "|"
            };
            style::get(path).paint(ch).to_string()
        });
        out.push_str(&cell.unwrap_or_else(|| " ".into()));
    }
    out
}

fn jumps(instructions: &[(u32, Instruction)]) -> Vec<Range> {
    let mut jumps = vec![];
    for (pc, instruction) in instructions {
        for target in instruction.targets() {
            jumps.push(Range {
                start: *pc as usize,
                end: target.id() as usize,
            });
        }
    }
    // short jumps take the inner columns
    jumps.sort_by_key(|range| range.high() - range.low());
    jumps
}

fn print_instruction(instruction: &Instruction) {
    let op = instruction.opcode();
    let text = instruction.to_string();
    let mnemonic = op.to_string();
    print!("{}", style::for_opcode(op.kind()).paint(&mnemonic));
    if let Some(operands) = text.strip_prefix(&mnemonic) {
        print!("{}", style::get("opcode.operand").paint(operands));
    }
}

fn describe_edges(cfg: &ControlFlowGraph, node: petgraph::graph::NodeIndex) -> String {
    let mut edges: Vec<String> = cfg
        .successors(node)
        .map(|(target, edge)| {
            let start = cfg.graph()[target].range.start;
            match edge {
                Edge::Fallthrough => format!("{}", start),
                Edge::Jump => format!("jump {}", start),
                Edge::Switch => format!("switch {}", start),
                Edge::Exception => format!("catch {}", start),
            }
        })
        .collect();
    edges.sort();
    edges.join(", ")
}

pub fn print_code(code: &CodeModel, depth: usize) -> ClassResult<()> {
    let instructions = code.instructions()?;
    let cfg = code.control_flow()?;
    let reachable = cfg.reachable();
    let layers = partition_jumps(&jumps(instructions));

    let lines: HashMap<u32, u16> = code
        .attributes()?
        .iter()
        .filter_map(|attribute| match attribute {
            Attribute::LineNumberTable(lines) => Some(lines),
            _ => None,
        })
        .flatten()
        .map(|info| (info.start_pc as u32, info.line))
        .collect();

    pad(depth);
    println!(
        "{}",
        style::get("comment").paint(format!(
            "// max stack {}, max locals {}, {} bytes",
            code.max_stack(),
            code.max_locals(),
            code.code_bytes().len()
        ))
    );

    for (node, block) in cfg.blocks() {
        pad(depth);
        let header = format!(
            "// block {}..{} -> [{}]",
            block.range.start,
            block.range.end,
            describe_edges(&cfg, node)
        );
        if reachable.contains(&node) {
            println!("{}", style::get("block").paint(header));
        } else {
            println!("{}", style::get("comment.unreachable").paint(format!("{} unreachable", header)));
        }

        for (pc, instruction) in &instructions[block.instructions.clone()] {
            pad(depth);
            print!(
                "{} {} ",
                gutter(&layers, *pc as usize),
                style::get("offset").paint(format!("{:5}:", pc))
            );
            print_instruction(instruction);
            if let Some(line) = lines.get(pc) {
                print!(" {}", style::get("comment").paint(format!("// line {}", line)));
            }
            println!();
        }
    }

    let catches = code.exception_table()?;
    if !catches.is_empty() {
        pad(depth);
        println!("{}", style::get("comment").paint("// exception table"));
        for catch in catches {
            pad(depth);
            println!(
                "{}",
                style::get("comment").paint(format!(
                    "//   {}..{} -> {} {}",
                    catch.start.id(),
                    catch.end.id(),
                    catch.handler.id(),
                    catch.catch_type.as_deref().unwrap_or("any")
                ))
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: usize, end: usize) -> Range {
        Range { start, end }
    }

    #[test]
    fn disjoint_jumps_share_a_layer() {
        let layers = partition_jumps(&[r(0, 4), r(6, 10), r(2, 8)]);
        assert_eq!(layers, vec![vec![r(0, 4), r(6, 10)], vec![r(2, 8)]]);
    }

    #[test]
    fn backward_jumps_overlap_by_extent() {
        assert!(r(10, 2).overlaps(&r(4, 6)));
        assert!(r(10, 2).contains(2));
        assert!(!r(10, 2).contains(11));
        assert!(r(10, 2).is_backward());
    }
}
