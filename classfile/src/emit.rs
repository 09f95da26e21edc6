//! Encoding of `Code` attributes from code elements.
//!
//! Labels become offsets here. Layout is iterative: a short branch whose
//! displacement does not fit in 16 bits is widened, which moves everything
//! after it, so offsets are recomputed until nothing else needs widening.

use crate::{
    access::AccessFlags,
    attribute::{Attribute, CharacterRange, LineNumberInfo, LocalVariable},
    builder::{BuiltCode, CodeOutput},
    constant::{MemberKind, Symbol},
    descriptor::MethodDescriptor,
    flow::ControlFlowGraph,
    instruction::{
        next_label_context, CharacterRangeInfo, CodeElement, ConstantInstruction, ExceptionCatch, Instruction, Label,
        LocalVariableInfo,
    },
    model::Version,
    opcode::Opcode,
    options::Options,
    stackmap::{self, MethodContext},
    writer::BufWriter,
    ClassError, ClassResult,
};
use std::{
    collections::{HashMap, HashSet},
    ops::Range,
};

/// The method a code body belongs to.
pub(crate) struct MethodInfo<'a> {
    pub this_class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub flags: AccessFlags,
    pub version: Version,
    pub options: &'a Options,
}

impl MethodInfo<'_> {
    fn is_static(&self) -> bool {
        self.flags.is(AccessFlags::STATIC)
    }

    fn needs_frames(&self) -> bool {
        self.options.generate_stack_maps && self.version.major >= 50
    }
}

/// Writes a complete `Code` attribute.
pub(crate) fn write_code(out: &mut BufWriter<'_>, method: &MethodInfo<'_>, code: &CodeOutput) -> ClassResult<()> {
    match code {
        CodeOutput::Model(model) if out.pool().is_shared_with(model.reader().pool()) => {
            let raw = model.raw_body();
            out.write_utf8_index("Code");
            out.write_u32(raw.len() as u32);
            out.write_bytes(raw);
            Ok(())
        }
        CodeOutput::Model(model) => {
            let built = BuiltCode {
                elements: model.elements()?.to_vec(),
                max_locals: model.max_locals(),
            };
            write_built(out, method, &built)
        }
        CodeOutput::Built(built) => write_built(out, method, built),
    }
}

/// Drops pseudo elements that refer to unbound labels when `tolerate` is
/// set, and fails on any other reference to an unbound label.
fn bound_elements(elements: &[CodeElement], tolerate: bool) -> ClassResult<Vec<&CodeElement>> {
    let bound: HashSet<Label> = elements
        .iter()
        .filter_map(|element| match element {
            CodeElement::Label(label) => Some(*label),
            _ => None,
        })
        .collect();

    let mut kept = Vec::with_capacity(elements.len());
    for element in elements {
        let missing = element.referenced_labels().into_iter().find(|label| !bound.contains(label));
        if let Some(missing) = missing {
            if tolerate && element.is_pseudo() {
                log::debug!("dropping {:?}, which refers to unbound label {}", element, missing);
                continue;
            }
            return Err(ClassError::UnboundLabel(missing));
        }
        kept.push(element);
    }
    Ok(kept)
}

#[derive(Default)]
struct Collected {
    instructions: Vec<Instruction>,
    /// Label to the index of the instruction it precedes.
    labels: HashMap<Label, usize>,
    lines: Vec<(usize, u16)>,
    catches: Vec<ExceptionCatch>,
    variables: Vec<LocalVariableInfo>,
    variable_types: Vec<LocalVariableInfo>,
    ranges: Vec<CharacterRangeInfo>,
    attributes: Vec<Attribute>,
}

impl Collected {
    fn new(elements: Vec<&CodeElement>) -> Self {
        let mut body = Collected::default();
        for element in elements {
            match element {
                CodeElement::Instruction(instruction) => body.instructions.push(instruction.clone()),
                CodeElement::Label(label) => {
                    body.labels.insert(*label, body.instructions.len());
                }
                CodeElement::LineNumber(line) => body.lines.push((body.instructions.len(), *line)),
                CodeElement::ExceptionCatch(catch) => body.catches.push(catch.clone()),
                CodeElement::LocalVariable(var) => body.variables.push(var.clone()),
                CodeElement::LocalVariableType(var) => body.variable_types.push(var.clone()),
                CodeElement::CharacterRange(range) => body.ranges.push(range.clone()),
                CodeElement::Attribute(attribute) => body.attributes.push(attribute.clone()),
            }
        }
        body
    }
}

fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

/// The opcode an instruction is written with: loads and stores of high
/// slots take their wide form, and `ldc` widens for high pool indices.
fn encoded_opcode(instruction: &Instruction, ldc_index: Option<u16>) -> Opcode {
    match instruction {
        Instruction::Load { op, slot } | Instruction::Store { op, slot } | Instruction::Ret { op, slot }
            if !op.is_wide() && op.implicit_slot().is_none() && *slot > 0xff =>
        {
            op.wide_form().unwrap_or(*op)
        }
        Instruction::Constant(ConstantInstruction::Load { op, .. }) if *op != Opcode::Ldc2W => match ldc_index {
            Some(index) if index > 0xff => Opcode::LdcW,
            _ => Opcode::Ldc,
        },
        other => other.opcode(),
    }
}

fn encoded_size(instruction: &Instruction, op: Opcode, offset: usize, widened: bool) -> usize {
    match instruction {
        Instruction::LookupSwitch { cases, .. } => 1 + switch_padding(offset) + 8 + 8 * cases.len(),
        Instruction::TableSwitch { low, high, .. } => {
            let entries = (*high as i64 - *low as i64 + 1).max(0) as usize;
            1 + switch_padding(offset) + 12 + 4 * entries
        }
        Instruction::Branch { op, .. } if widened => {
            if *op == Opcode::Goto {
                5
            } else {
                8
            }
        }
        Instruction::Jsr { .. } if widened => 5,
        _ => op.size().unwrap_or(1),
    }
}

/// The label of a short branch that may need widening.
fn short_target(instruction: &Instruction) -> Option<Label> {
    match instruction {
        Instruction::Branch { op, target } if *op != Opcode::GotoW => Some(*target),
        Instruction::Jsr { op, target } if *op != Opcode::JsrW => Some(*target),
        _ => None,
    }
}

struct Layout {
    ops: Vec<Opcode>,
    /// One offset per instruction, followed by the code length.
    offsets: Vec<usize>,
    widened: Vec<bool>,
}

impl Layout {
    fn compute(body: &Collected, ldc: &[Option<u16>], fix_short_jumps: bool) -> ClassResult<Layout> {
        let ops: Vec<Opcode> = body
            .instructions
            .iter()
            .zip(ldc)
            .map(|(instruction, index)| encoded_opcode(instruction, *index))
            .collect();
        let mut widened = vec![false; ops.len()];

        loop {
            let mut offsets = Vec::with_capacity(ops.len() + 1);
            let mut offset = 0;
            for (i, instruction) in body.instructions.iter().enumerate() {
                offsets.push(offset);
                offset += encoded_size(instruction, ops[i], offset, widened[i]);
            }
            offsets.push(offset);

            let mut grew = false;
            for (i, instruction) in body.instructions.iter().enumerate() {
                let target = match short_target(instruction) {
                    Some(target) if !widened[i] => target,
                    _ => continue,
                };
                let index = *body.labels.get(&target).ok_or(ClassError::UnboundLabel(target))?;
                let displacement = offsets[index] as i64 - offsets[i] as i64;
                if i16::try_from(displacement).is_err() {
                    if !fix_short_jumps {
                        return Err(ClassError::BranchOutOfRange {
                            offset: offsets[i],
                            displacement,
                        });
                    }
                    log::debug!("widening {} at offset {}", instruction.opcode(), offsets[i]);
                    widened[i] = true;
                    grew = true;
                }
            }

            if !grew {
                let len = offsets[ops.len()];
                if len > u16::MAX as usize {
                    return Err(ClassError::CodeTooLarge(len));
                }
                return Ok(Layout { ops, offsets, widened });
            }
        }
    }

    fn code_len(&self) -> u32 {
        self.offsets[self.ops.len()] as u32
    }
}

fn encode(
    out: &mut BufWriter<'_>,
    pc: u32,
    instruction: &Instruction,
    op: Opcode,
    widened: bool,
    offset_of: &dyn Fn(Label) -> ClassResult<u32>,
) -> ClassResult<()> {
    let displacement = |target: Label| -> ClassResult<i64> { Ok(offset_of(target)? as i64 - pc as i64) };

    match instruction {
        Instruction::Load { slot, .. } | Instruction::Store { slot, .. } | Instruction::Ret { slot, .. } => {
            if op.is_wide() {
                out.write_u16(op.code());
                out.write_u16(*slot);
            } else {
                out.write_u8(op.code() as u8);
                if op.implicit_slot().is_none() {
                    out.write_u8(*slot as u8);
                }
            }
        }
        Instruction::Increment { slot, value } => {
            if op.is_wide() {
                out.write_u16(op.code());
                out.write_u16(*slot);
                out.write_i16(*value);
            } else {
                out.write_u8(op.code() as u8);
                out.write_u8(*slot as u8);
                out.write_i8(*value as i8);
            }
        }
        Instruction::Branch { op: branch, target } => {
            let displacement = displacement(*target)?;
            if *branch == Opcode::GotoW || (widened && *branch == Opcode::Goto) {
                out.write_u8(Opcode::GotoW.code() as u8);
                out.write_i32(displacement as i32);
            } else if widened {
                // if<cond> L  =>  if<!cond> +8; goto_w L
                let reversed = branch
                    .reversed_branch()
                    .ok_or_else(|| ClassError::illegal(format!("cannot widen {}", branch)))?;
                out.write_u8(reversed.code() as u8);
                out.write_i16(8);
                out.write_u8(Opcode::GotoW.code() as u8);
                out.write_i32((displacement - 3) as i32);
            } else {
                out.write_u8(branch.code() as u8);
                out.write_i16(displacement as i16);
            }
        }
        Instruction::Jsr { op: jsr, target } => {
            let displacement = displacement(*target)?;
            if *jsr == Opcode::JsrW || widened {
                out.write_u8(Opcode::JsrW.code() as u8);
                out.write_i32(displacement as i32);
            } else {
                out.write_u8(jsr.code() as u8);
                out.write_i16(displacement as i16);
            }
        }
        Instruction::LookupSwitch { default, cases } => {
            out.write_u8(op.code() as u8);
            for _ in 0..switch_padding(pc as usize) {
                out.write_u8(0);
            }
            out.write_i32(displacement(*default)? as i32);
            out.write_i32(cases.len() as i32);
            let mut sorted: Vec<_> = cases.iter().collect();
            sorted.sort_by_key(|case| case.value);
            for case in sorted {
                out.write_i32(case.value);
                out.write_i32(displacement(case.target)? as i32);
            }
        }
        Instruction::TableSwitch {
            low,
            high,
            default,
            cases,
        } => {
            out.write_u8(op.code() as u8);
            for _ in 0..switch_padding(pc as usize) {
                out.write_u8(0);
            }
            out.write_i32(displacement(*default)? as i32);
            out.write_i32(*low);
            out.write_i32(*high);
            let targets: HashMap<i32, Label> = cases.iter().map(|case| (case.value, case.target)).collect();
            for value in *low as i64..=*high as i64 {
                let target = targets.get(&(value as i32)).copied().unwrap_or(*default);
                out.write_i32(displacement(target)? as i32);
            }
        }
        Instruction::Field { field, .. } => {
            out.write_u8(op.code() as u8);
            let index = out.pool().member(MemberKind::Field, field);
            out.write_index(index);
        }
        Instruction::Invoke { method, interface, .. } => {
            let kind = if *interface {
                MemberKind::InterfaceMethod
            } else {
                MemberKind::Method
            };
            out.write_u8(op.code() as u8);
            let index = out.pool().member(kind, method);
            out.write_index(index);
            if op == Opcode::Invokeinterface {
                let count = MethodDescriptor::parse(&method.descriptor)?.parameter_slots() + 1;
                out.write_u8(count as u8);
                out.write_u8(0);
            }
        }
        Instruction::InvokeDynamic(call_site) => {
            out.write_u8(op.code() as u8);
            let index = out.pool().invoke_dynamic(call_site);
            out.write_index(index);
            out.write_u16(0);
        }
        Instruction::NewObject(class) | Instruction::NewReferenceArray(class) | Instruction::TypeCheck { class, .. } => {
            out.write_u8(op.code() as u8);
            out.write_class_index(class);
        }
        Instruction::NewPrimitiveArray(kind) => {
            let code = kind
                .array_type_code()
                .ok_or_else(|| ClassError::illegal(format!("no primitive array of {}", kind.name())))?;
            out.write_u8(op.code() as u8);
            out.write_u8(code);
        }
        Instruction::NewMultiArray { class, dimensions } => {
            out.write_u8(op.code() as u8);
            out.write_class_index(class);
            out.write_u8(*dimensions);
        }
        Instruction::Constant(ConstantInstruction::Argument { value, .. }) => {
            out.write_u8(op.code() as u8);
            if op == Opcode::Bipush {
                out.write_i8(*value as i8);
            } else {
                out.write_i16(*value as i16);
            }
        }
        Instruction::Constant(ConstantInstruction::Load { value, .. }) => {
            out.write_u8(op.code() as u8);
            let index = out.pool().loadable(value);
            if op == Opcode::Ldc {
                out.write_u8(index as u8);
            } else {
                out.write_index(index);
            }
        }
        _ => out.write_u8(op.code() as u8),
    }
    Ok(())
}

/// An exception table entry with its labels resolved.
#[derive(Clone, Debug)]
struct ResolvedCatch {
    range: Range<u32>,
    handler: u32,
    catch_type: Option<Symbol>,
}

/// Removes the dead ranges from every protected range, splitting entries
/// where a dead range falls inside one.
fn exclude_dead(catches: Vec<ResolvedCatch>, dead: &[Range<u32>]) -> Vec<ResolvedCatch> {
    let mut out = vec![];
    for catch in catches {
        if dead.iter().any(|range| range.contains(&catch.handler)) {
            continue;
        }
        let mut pieces = vec![catch.range.clone()];
        for range in dead {
            pieces = pieces
                .into_iter()
                .flat_map(|piece| {
                    let before = piece.start..piece.end.min(range.start);
                    let after = piece.start.max(range.end)..piece.end;
                    [before, after]
                })
                .filter(|piece| piece.start < piece.end)
                .collect();
        }
        out.extend(pieces.into_iter().map(|range| ResolvedCatch {
            range,
            handler: catch.handler,
            catch_type: catch.catch_type.clone(),
        }));
    }
    out
}

/// Operand stack high-water mark, by walking every path from the entry and
/// every handler.
fn count_max_stack(
    laid: &[(u32, Instruction)],
    catches: &[ResolvedCatch],
    resolve: &dyn Fn(Label) -> Option<u32>,
) -> ClassResult<u16> {
    let index_of: HashMap<u32, usize> = laid.iter().enumerate().map(|(i, (pc, _))| (*pc, i)).collect();
    let mut depths: Vec<Option<u16>> = vec![None; laid.len()];
    let mut work = vec![];
    let mut max = 0;

    if !laid.is_empty() {
        depths[0] = Some(0);
        work.push(0);
    }
    for catch in catches {
        if let Some(&index) = index_of.get(&catch.handler) {
            max = max.max(1);
            if depths[index].is_none() {
                depths[index] = Some(1);
                work.push(index);
            }
        }
    }

    while let Some(index) = work.pop() {
        let (pc, instruction) = &laid[index];
        let depth = depths[index].unwrap_or(0);
        let (pop, push) = instruction.stack_effect()?;
        let after = depth.saturating_sub(pop) + push;
        max = max.max(depth).max(after);

        let mut successors = vec![];
        for target in instruction.targets() {
            let offset = resolve(target).ok_or(ClassError::UnboundLabel(target))?;
            let next = *index_of.get(&offset).ok_or(ClassError::BadBranchTarget {
                offset: *pc as usize,
                target: offset as i64,
            })?;
            successors.push(next);
        }
        if !instruction.is_unconditional() && index + 1 < laid.len() {
            successors.push(index + 1);
        }
        for next in successors {
            if depths[next].is_none() {
                depths[next] = Some(after);
                work.push(next);
            }
        }
    }
    Ok(max)
}

fn variable_size(descriptor: &str) -> u16 {
    match descriptor.as_bytes().first() {
        Some(b'J') | Some(b'D') => 2,
        _ => 1,
    }
}

fn write_built(out: &mut BufWriter<'_>, method: &MethodInfo<'_>, code: &BuiltCode) -> ClassResult<()> {
    let options = method.options;
    let body = Collected::new(bound_elements(&code.elements, options.filter_unbound_labels)?);
    if body.instructions.is_empty() {
        return Err(ClassError::illegal(format!(
            "method {}{} has an empty code body",
            method.name, method.descriptor
        )));
    }

    // Constants go into the pool first so that `ldc` knows its width.
    let ldc: Vec<Option<u16>> = body
        .instructions
        .iter()
        .map(|instruction| match instruction {
            Instruction::Constant(ConstantInstruction::Load { op, value }) if *op != Opcode::Ldc2W => {
                Some(out.pool().loadable(value))
            }
            _ => None,
        })
        .collect();

    let layout = Layout::compute(&body, &ldc, options.fix_short_jumps)?;
    let code_len = layout.code_len();
    let labels = &body.labels;
    let offsets = &layout.offsets;
    let offset_of = |label: Label| -> ClassResult<u32> {
        labels
            .get(&label)
            .map(|&index| offsets[index] as u32)
            .ok_or(ClassError::UnboundLabel(label))
    };

    let mut bytes = {
        let mut code_out = BufWriter::new(out.pool());
        for (i, instruction) in body.instructions.iter().enumerate() {
            encode(
                &mut code_out,
                offsets[i] as u32,
                instruction,
                layout.ops[i],
                layout.widened[i],
                &offset_of,
            )?;
        }
        code_out.into_bytes()
    };

    let mut catches = vec![];
    for catch in &body.catches {
        let range = offset_of(catch.start)?..offset_of(catch.end)?;
        if range.start >= range.end {
            log::debug!("dropping empty exception range {:?}", range);
            continue;
        }
        catches.push(ResolvedCatch {
            range,
            handler: offset_of(catch.handler)?,
            catch_type: catch.catch_type.clone(),
        });
    }

    // Offsets that no label stands for, such as split exception ranges or
    // the skip over a widened jump, are expressed in a private label context.
    let raw = next_label_context();

    let mut laid: Vec<(u32, Instruction)> = Vec::with_capacity(body.instructions.len());
    for (i, instruction) in body.instructions.iter().enumerate() {
        let pc = offsets[i] as u32;
        match instruction {
            Instruction::Branch { op, target } if layout.widened[i] && *op != Opcode::Goto => {
                let reversed = op
                    .reversed_branch()
                    .ok_or_else(|| ClassError::illegal(format!("cannot widen {}", op)))?;
                laid.push((
                    pc,
                    Instruction::Branch {
                        op: reversed,
                        target: Label::new(raw, pc + 8),
                    },
                ));
                laid.push((
                    pc + 3,
                    Instruction::Branch {
                        op: Opcode::GotoW,
                        target: *target,
                    },
                ));
            }
            _ => laid.push((pc, instruction.clone())),
        }
    }
    let resolve = |label: Label| -> Option<u32> {
        if label.context() == raw {
            Some(label.id())
        } else {
            offset_of(label).ok()
        }
    };

    let generated = if method.needs_frames() {
        let as_labels = |catches: &[ResolvedCatch]| -> Vec<ExceptionCatch> {
            catches
                .iter()
                .map(|catch| ExceptionCatch {
                    start: Label::new(raw, catch.range.start),
                    end: Label::new(raw, catch.range.end),
                    handler: Label::new(raw, catch.handler),
                    catch_type: catch.catch_type.clone(),
                })
                .collect()
        };

        let cfg = ControlFlowGraph::build_with(&laid, &as_labels(&catches), code_len, resolve)?;
        let dead = cfg.unreachable_ranges();
        if let Some(first) = dead.first() {
            if !options.patch_dead_code {
                return Err(ClassError::DeadCode(first.start as usize));
            }
            for range in &dead {
                log::debug!("patching dead code at {:?} in {}{}", range, method.name, method.descriptor);
                let (start, end) = (range.start as usize, range.end as usize);
                for byte in &mut bytes[start..end - 1] {
                    *byte = Opcode::Nop.code() as u8;
                }
                bytes[end - 1] = Opcode::Athrow.code() as u8;
            }
            laid.retain(|(pc, _)| !dead.iter().any(|range| range.contains(pc)));
            for range in &dead {
                laid.extend((range.start..range.end - 1).map(|pc| (pc, Instruction::Nop)));
                laid.push((range.end - 1, Instruction::Throw));
            }
            laid.sort_by_key(|(pc, _)| *pc);
            catches = exclude_dead(catches, &dead);
        }

        let descriptor = MethodDescriptor::parse(method.descriptor)?;
        let context = MethodContext {
            this_class: method.this_class,
            method_name: method.name,
            descriptor: &descriptor,
            is_static: method.is_static(),
            resolver: &*options.hierarchy,
        };
        Some(stackmap::generate(&context, &laid, &as_labels(&catches), code_len, resolve)?)
    } else {
        None
    };

    let max_stack = match &generated {
        Some(frames) => frames.max_stack,
        None => count_max_stack(&laid, &catches, &resolve)?,
    };

    let receiver = if method.is_static() { 0 } else { 1 };
    let mut max_locals = code
        .max_locals
        .max(MethodDescriptor::parse(method.descriptor)?.parameter_slots() + receiver);
    for instruction in &body.instructions {
        if let Some(extent) = instruction.locals_extent() {
            max_locals = max_locals.max(extent);
        }
    }
    for var in body.variables.iter().chain(&body.variable_types) {
        max_locals = max_locals.max(var.slot + variable_size(&var.descriptor));
    }
    if let Some(frames) = &generated {
        max_locals = max_locals.max(frames.max_locals);
    }

    let mut attributes = vec![];
    if !body.lines.is_empty() {
        let lines = body
            .lines
            .iter()
            .map(|&(index, line)| LineNumberInfo {
                start_pc: offsets[index] as u16,
                line,
            })
            .collect();
        attributes.push(Attribute::LineNumberTable(lines));
    }
    let variables = |vars: &[LocalVariableInfo]| -> ClassResult<Vec<LocalVariable>> {
        vars.iter()
            .map(|var| {
                let start = offset_of(var.start)?;
                Ok(LocalVariable {
                    start_pc: start as u16,
                    length: offset_of(var.end)?.saturating_sub(start) as u16,
                    name: var.name.clone(),
                    descriptor: var.descriptor.clone(),
                    slot: var.slot,
                })
            })
            .collect()
    };
    if !body.variables.is_empty() {
        attributes.push(Attribute::LocalVariableTable(variables(&body.variables)?));
    }
    if !body.variable_types.is_empty() {
        attributes.push(Attribute::LocalVariableTypeTable(variables(&body.variable_types)?));
    }
    if !body.ranges.is_empty() {
        let mut ranges = vec![];
        for range in &body.ranges {
            ranges.push(CharacterRange {
                start_pc: offset_of(range.start)? as u16,
                end_pc: offset_of(range.end)?.saturating_sub(1) as u16,
                range_start: range.range_start,
                range_end: range.range_end,
                flags: range.flags,
            });
        }
        attributes.push(Attribute::CharacterRangeTable(ranges));
    }
    if let Some(frames) = &generated {
        if !frames.frames.is_empty() {
            attributes.push(Attribute::StackMapTable(frames.frames.clone()));
        }
    }
    for attribute in &body.attributes {
        if generated.is_some() && matches!(attribute, Attribute::StackMapTable(_)) {
            continue;
        }
        attributes.push(attribute.clone());
    }

    out.write_utf8_index("Code");
    let at = out.reserve_u32();
    out.write_u16(max_stack);
    out.write_u16(max_locals);
    out.write_u32(code_len);
    out.write_bytes(&bytes);
    out.write_count(catches.len(), "exception handlers")?;
    for catch in &catches {
        out.write_u16(catch.range.start as u16);
        out.write_u16(catch.range.end as u16);
        out.write_u16(catch.handler as u16);
        out.write_optional_class_index(catch.catch_type.as_deref());
    }
    out.write_attributes(&attributes)?;
    log::trace!(
        "wrote {} bytes of code for {}{}, max stack {}, max locals {}",
        code_len,
        method.name,
        method.descriptor,
        max_stack,
        max_locals
    );
    out.patch_length(at)
}

#[cfg(test)]
mod tests {
    use crate::{
        access::AccessFlags, attribute::Attribute, descriptor::TypeKind, instruction::Instruction, opcode::Opcode,
        ClassError, ClassFile, ClassResult, CodeBuilder, Options,
    };

    const STATIC: AccessFlags = AccessFlags(AccessFlags::PUBLIC.0 | AccessFlags::STATIC.0);

    fn build<F>(options: Options, body: F) -> ClassResult<Vec<u8>>
    where
        F: FnOnce(&mut CodeBuilder) -> ClassResult<()>,
    {
        ClassFile::with_options(options).build("demo/Emit", |class| {
            class.with_method_body("run", "(I)V", STATIC, body)?;
            Ok(())
        })
    }

    fn first_method_code(bytes: Vec<u8>) -> crate::CodeModel {
        let model = ClassFile::new().parse(bytes).unwrap();
        model.methods()[0].code().unwrap().unwrap()
    }

    fn long_forward_jump(code: &mut CodeBuilder, op: Opcode) -> ClassResult<()> {
        let end = code.new_label();
        code.load_local(TypeKind::Int, 0)?;
        code.branch(op, end)?;
        for _ in 0..33_000 {
            code.nop()?;
        }
        code.bind(end)?;
        code.return_void()?;
        Ok(())
    }

    #[test]
    fn out_of_range_goto_is_widened() {
        let bytes = build(Options::new(), |code| {
            let end = code.new_label();
            code.goto_(end)?;
            for _ in 0..33_000 {
                code.nop()?;
            }
            code.bind(end)?.return_void()?;
            Ok(())
        })
        .unwrap();
        let code = first_method_code(bytes);
        let instructions = code.instructions().unwrap();
        assert_eq!(instructions[0].1.opcode(), Opcode::GotoW);
    }

    #[test]
    fn out_of_range_condition_is_inverted_around_goto_w() {
        let bytes = build(Options::new(), |code| long_forward_jump(code, Opcode::Ifeq)).unwrap();
        let code = first_method_code(bytes);
        let instructions = code.instructions().unwrap();
        assert_eq!(instructions[1].1.opcode(), Opcode::Ifne);
        assert_eq!(instructions[2].1.opcode(), Opcode::GotoW);
        match &instructions[1].1 {
            Instruction::Branch { target, .. } => assert_eq!(target.id(), instructions[3].0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn short_jump_fixing_can_be_disabled() {
        let result = build(Options::new().fix_short_jumps(false), |code| long_forward_jump(code, Opcode::Ifeq));
        assert!(matches!(result, Err(ClassError::BranchOutOfRange { offset: 1, .. })));
    }

    fn dead_tail(code: &mut CodeBuilder) -> ClassResult<()> {
        code.return_void()?.nop()?.nop()?.return_void()?;
        Ok(())
    }

    #[test]
    fn dead_code_is_patched() {
        let code = first_method_code(build(Options::new(), dead_tail).unwrap());
        assert_eq!(code.code_bytes(), &[0xb1, 0x00, 0x00, 0xbf]);
        let frames = code
            .attributes()
            .unwrap()
            .iter()
            .find_map(|attribute| match attribute {
                Attribute::StackMapTable(frames) => Some(frames.len()),
                _ => None,
            });
        assert_eq!(frames, Some(1));
    }

    #[test]
    fn dead_code_patching_can_be_disabled() {
        let result = build(Options::new().patch_dead_code(false), dead_tail);
        assert!(matches!(result, Err(ClassError::DeadCode(1))));
    }

    #[test]
    fn unbound_branch_target_fails() {
        let result = build(Options::new(), |code| {
            let nowhere = code.new_label();
            code.goto_(nowhere)?;
            Ok(())
        });
        assert!(matches!(result, Err(ClassError::UnboundLabel(_))));
    }

    #[test]
    fn unbound_debug_entries_can_be_dropped() {
        let body = |code: &mut CodeBuilder| -> ClassResult<()> {
            let start = code.new_bound_label()?;
            let end = code.new_label();
            code.local_variable(0, "x", "I", start, end)?;
            code.line_number(7)?;
            code.return_void()?;
            Ok(())
        };
        assert!(matches!(build(Options::new(), body), Err(ClassError::UnboundLabel(_))));

        let code = first_method_code(build(Options::new().filter_unbound_labels(true), body).unwrap());
        let names: Vec<&str> = code.attributes().unwrap().iter().map(Attribute::name).collect();
        assert_eq!(names, vec!["LineNumberTable"]);
    }

    #[test]
    fn high_slots_use_wide_forms() {
        let code = first_method_code(
            build(Options::new(), |code| {
                code.load_constant(1)?.store_local(TypeKind::Int, 300)?.iinc(300, 1000)?.return_void()?;
                Ok(())
            })
            .unwrap(),
        );
        let ops: Vec<Opcode> = code.instructions().unwrap().iter().map(|(_, i)| i.opcode()).collect();
        assert_eq!(ops, vec![Opcode::Iconst1, Opcode::IstoreW, Opcode::IincW, Opcode::Return]);
        assert_eq!(code.max_locals(), 301);
    }

    #[test]
    fn old_versions_get_a_stack_count_instead_of_frames() {
        let bytes = ClassFile::new()
            .build("demo/Old", |class| {
                class.with_version(49, 0)?;
                class.with_method_body("run", "()I", STATIC, |code| {
                    let other = code.new_label();
                    code.load_constant(1)?.load_constant(2)?.branch(Opcode::IfIcmpeq, other)?;
                    code.load_constant(3)?.ireturn()?;
                    code.bind(other)?.load_constant(4)?.ireturn()?;
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();
        let code = first_method_code(bytes);
        assert_eq!(code.max_stack(), 2);
        assert!(code.attributes().unwrap().is_empty());
    }
}
