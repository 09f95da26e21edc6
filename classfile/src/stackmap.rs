//! Stack map frame generation.
//!
//! A forward dataflow pass over the basic blocks of a laid-out body infers
//! the verification types of every local and stack slot at each block entry.
//! Where control flow merges, reference types are joined through the class
//! hierarchy resolver. Frames are emitted at every branch target, exception
//! handler and block that follows an unconditional transfer, then compressed
//! into the smallest encoding that describes them.
//!
//! Values are tracked at slot granularity: a `long` or `double` occupies its
//! own entry followed by `Top`. Frame encoding collapses those pairs again.

use crate::{
    attribute::{StackMapFrame, VerificationType},
    constant::{LoadableConstant, Symbol},
    descriptor::{FieldDescriptor, MethodDescriptor, ReturnDescriptor, TypeKind},
    flow::ControlFlowGraph,
    hierarchy::{common_superclass, ClassHierarchyResolver, OBJECT},
    instruction::{ConstantInstruction, ExceptionCatch, Instruction, Label},
    opcode::Opcode,
    ClassError, ClassResult,
};
use petgraph::graph::NodeIndex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

const THROWABLE: &str = "java/lang/Throwable";

type VType = VerificationType;

/// What frame generation needs to know about the method being written.
pub struct MethodContext<'a> {
    pub this_class: &'a str,
    pub method_name: &'a str,
    pub descriptor: &'a MethodDescriptor,
    pub is_static: bool,
    pub resolver: &'a dyn ClassHierarchyResolver,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratedFrames {
    pub frames: Vec<StackMapFrame>,
    pub max_stack: u16,
    pub max_locals: u16,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct Frame {
    locals: Vec<VType>,
    stack: Vec<VType>,
}

fn error(offset: u32, reason: impl Into<String>) -> ClassError {
    ClassError::StackMap {
        offset: offset as usize,
        reason: reason.into(),
    }
}

fn slots_of(descriptor: &FieldDescriptor) -> Vec<VType> {
    if let Some(name) = descriptor.class_name() {
        return vec![VType::Object(name.into())];
    }
    slots_of_kind(descriptor.type_kind())
}

fn slots_of_kind(kind: TypeKind) -> Vec<VType> {
    match kind {
        TypeKind::Long => vec![VType::Long, VType::Top],
        TypeKind::Double => vec![VType::Double, VType::Top],
        TypeKind::Float => vec![VType::Float],
        TypeKind::Reference => vec![VType::Object(OBJECT.into())],
        TypeKind::Void => vec![],
        _ => vec![VType::Integer],
    }
}

fn slots_of_return(ret: &ReturnDescriptor) -> Vec<VType> {
    match ret {
        ReturnDescriptor::Void => vec![],
        ReturnDescriptor::Type(ty) => slots_of(ty),
    }
}

fn slots_of_constant(value: &LoadableConstant) -> ClassResult<Vec<VType>> {
    Ok(match value {
        LoadableConstant::String(_) => vec![VType::Object("java/lang/String".into())],
        LoadableConstant::Class(_) => vec![VType::Object("java/lang/Class".into())],
        LoadableConstant::MethodType(_) => vec![VType::Object("java/lang/invoke/MethodType".into())],
        LoadableConstant::MethodHandle(_) => vec![VType::Object("java/lang/invoke/MethodHandle".into())],
        LoadableConstant::Dynamic(dynamic) => slots_of(&FieldDescriptor::parse(&dynamic.descriptor)?),
        other => slots_of_kind(other.type_kind()),
    })
}

/// `[I` for `newarray int`, `[Ljava/lang/String;` for `anewarray
/// java/lang/String`, `[[I` for `anewarray [I`.
fn array_of(component: &str) -> Symbol {
    if component.starts_with('[') {
        format!("[{}", component).into()
    } else {
        format!("[L{};", component).into()
    }
}

fn component_of(array: &VType) -> VType {
    match array {
        VType::Object(name) if name.starts_with('[') => {
            let component = &name[1..];
            match FieldDescriptor::parse(component) {
                Ok(descriptor) => slots_of(&descriptor).remove(0),
                Err(_) => VType::Object(OBJECT.into()),
            }
        }
        VType::Null => VType::Null,
        _ => VType::Object(OBJECT.into()),
    }
}

impl Frame {
    fn initial(method: &MethodContext<'_>) -> Frame {
        let mut locals = vec![];
        if !method.is_static {
            if method.method_name == "<init>" && method.this_class != OBJECT {
                locals.push(VType::UninitializedThis);
            } else {
                locals.push(VType::Object(method.this_class.into()));
            }
        }
        for arg in method.descriptor.args.iter() {
            locals.extend(slots_of(arg));
        }
        Frame { locals, stack: vec![] }
    }

    fn pop(&mut self, pc: u32, count: usize) -> ClassResult<Vec<VType>> {
        if self.stack.len() < count {
            return Err(error(pc, "operand stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn pop_one(&mut self, pc: u32) -> ClassResult<VType> {
        self.stack.pop().ok_or_else(|| error(pc, "operand stack underflow"))
    }

    fn push(&mut self, values: Vec<VType>) {
        self.stack.extend(values);
    }

    fn local(&self, pc: u32, slot: u16) -> ClassResult<VType> {
        self.locals
            .get(slot as usize)
            .cloned()
            .ok_or_else(|| error(pc, format!("local {} is not initialized", slot)))
    }

    fn store(&mut self, slot: u16, values: Vec<VType>) {
        let slot = slot as usize;
        if self.locals.len() < slot + values.len() {
            self.locals.resize(slot + values.len(), VType::Top);
        }
        if slot > 0 && self.locals[slot - 1].is_wide() {
            self.locals[slot - 1] = VType::Top;
        }
        for (i, value) in values.into_iter().enumerate() {
            self.locals[slot + i] = value;
        }
    }

    /// Replaces every occurrence of an uninitialized value once its
    /// constructor has run.
    fn initialize(&mut self, from: &VType, to: VType) {
        for slot in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if slot == from {
                *slot = to.clone();
            }
        }
    }
}

struct Interpreter<'a, 'm> {
    method: &'a MethodContext<'m>,
    /// The class created by each `new`, by bytecode offset.
    allocations: HashMap<u32, Symbol>,
}

impl Interpreter<'_, '_> {
    fn merge_type(&self, a: &VType, b: &VType) -> VType {
        match (a, b) {
            _ if a == b => a.clone(),
            (VType::Null, VType::Object(_)) => b.clone(),
            (VType::Object(_), VType::Null) => a.clone(),
            (VType::Object(x), VType::Object(y)) => {
                if x.starts_with('[') || y.starts_with('[') {
                    VType::Object(OBJECT.into())
                } else {
                    VType::Object(common_superclass(self.method.resolver, x, y))
                }
            }
            _ => VType::Top,
        }
    }

    /// Joins `incoming` into `existing`, returning whether anything changed.
    fn merge(&self, pc: u32, existing: &mut Frame, incoming: &Frame) -> ClassResult<bool> {
        if existing.stack.len() != incoming.stack.len() {
            return Err(error(
                pc,
                format!(
                    "stack heights {} and {} meet here",
                    existing.stack.len(),
                    incoming.stack.len()
                ),
            ));
        }

        let mut changed = false;
        for (slot, value) in existing.stack.iter_mut().zip(&incoming.stack) {
            let merged = self.merge_type(slot, value);
            if merged == VType::Top && *slot != VType::Top {
                return Err(error(pc, format!("incompatible stack values {} and {}", slot, value)));
            }
            changed |= merged != *slot;
            *slot = merged;
        }

        let len = existing.locals.len().min(incoming.locals.len());
        if existing.locals.len() > len {
            existing.locals.truncate(len);
            changed = true;
        }
        for (slot, value) in existing.locals.iter_mut().zip(&incoming.locals) {
            let merged = self.merge_type(slot, value);
            changed |= merged != *slot;
            *slot = merged;
        }
        // A wide value whose second half was lost is no longer usable.
        for i in 0..existing.locals.len() {
            if existing.locals[i].is_wide() && existing.locals.get(i + 1) != Some(&VType::Top) {
                existing.locals[i] = VType::Top;
                changed = true;
            }
        }
        Ok(changed)
    }

    fn execute(&self, pc: u32, frame: &mut Frame, instruction: &Instruction) -> ClassResult<()> {
        match instruction {
            Instruction::Load { op, slot } => {
                let value = frame.local(pc, *slot)?;
                match op.primary_type() {
                    TypeKind::Reference => frame.push(vec![value]),
                    kind => frame.push(slots_of_kind(kind)),
                }
            }
            Instruction::Store { op, slot } => {
                let size = op.primary_type().slot_size() as usize;
                let values = frame.pop(pc, size)?;
                frame.store(*slot, values);
            }
            Instruction::Increment { .. } | Instruction::Nop => {}
            Instruction::Branch { .. }
            | Instruction::LookupSwitch { .. }
            | Instruction::TableSwitch { .. }
            | Instruction::Return(_)
            | Instruction::Throw
            | Instruction::Monitor(_)
            | Instruction::ArrayStore(_) => {
                let (pop, _) = instruction.stack_effect()?;
                frame.pop(pc, pop as usize)?;
            }
            Instruction::Field { op, field } => {
                let value = slots_of(&FieldDescriptor::parse(&field.descriptor)?);
                match op {
                    Opcode::Getstatic => frame.push(value),
                    Opcode::Getfield => {
                        frame.pop_one(pc)?;
                        frame.push(value);
                    }
                    Opcode::Putstatic => {
                        frame.pop(pc, value.len())?;
                    }
                    _ => {
                        frame.pop(pc, value.len() + 1)?;
                    }
                }
            }
            Instruction::Invoke { op, method, .. } => {
                let descriptor = MethodDescriptor::parse(&method.descriptor)?;
                frame.pop(pc, descriptor.parameter_slots() as usize)?;
                if *op != Opcode::Invokestatic {
                    let receiver = frame.pop_one(pc)?;
                    if *op == Opcode::Invokespecial && &*method.name == "<init>" {
                        let initialized = match &receiver {
                            VType::UninitializedThis => VType::Object(self.method.this_class.into()),
                            VType::Uninitialized(at) => {
                                let class = self.allocations.get(&(*at as u32)).ok_or_else(|| {
                                    error(pc, format!("no new instruction at offset {}", at))
                                })?;
                                VType::Object(class.clone())
                            }
                            _ => receiver.clone(),
                        };
                        frame.initialize(&receiver, initialized);
                    }
                }
                frame.push(slots_of_return(&descriptor.ret));
            }
            Instruction::InvokeDynamic(call_site) => {
                let descriptor = MethodDescriptor::parse(&call_site.descriptor)?;
                frame.pop(pc, descriptor.parameter_slots() as usize)?;
                frame.push(slots_of_return(&descriptor.ret));
            }
            Instruction::NewObject(_) => {
                let offset = u16::try_from(pc).map_err(|_| error(pc, "offset out of range"))?;
                frame.push(vec![VType::Uninitialized(offset)]);
            }
            Instruction::NewPrimitiveArray(kind) => {
                frame.pop_one(pc)?;
                frame.push(vec![VType::Object(format!("[{}", kind.descriptor_char()).into())]);
            }
            Instruction::NewReferenceArray(class) => {
                frame.pop_one(pc)?;
                frame.push(vec![VType::Object(array_of(class))]);
            }
            Instruction::NewMultiArray { class, dimensions } => {
                frame.pop(pc, *dimensions as usize)?;
                frame.push(vec![VType::Object(class.clone())]);
            }
            Instruction::ArrayLoad(op) => {
                frame.pop_one(pc)?;
                let array = frame.pop_one(pc)?;
                match op {
                    Opcode::Aaload => frame.push(vec![component_of(&array)]),
                    _ => frame.push(slots_of_kind(op.primary_type())),
                }
            }
            Instruction::TypeCheck { op, class } => {
                frame.pop_one(pc)?;
                if *op == Opcode::Checkcast {
                    frame.push(vec![VType::Object(class.clone())]);
                } else {
                    frame.push(vec![VType::Integer]);
                }
            }
            Instruction::Convert(op) => {
                frame.pop(pc, op.primary_type().slot_size() as usize)?;
                frame.push(slots_of_kind(op.secondary_type()));
            }
            Instruction::Operator(op) => {
                let (pop, push) = instruction.stack_effect()?;
                frame.pop(pc, pop as usize)?;
                match (op, push) {
                    (Opcode::Arraylength, _)
                    | (Opcode::Lcmp, _)
                    | (Opcode::Fcmpl, _)
                    | (Opcode::Fcmpg, _)
                    | (Opcode::Dcmpl, _)
                    | (Opcode::Dcmpg, _) => frame.push(vec![VType::Integer]),
                    _ => frame.push(slots_of_kind(op.primary_type())),
                }
            }
            Instruction::Constant(constant) => match constant {
                ConstantInstruction::Intrinsic(Opcode::AconstNull) => frame.push(vec![VType::Null]),
                ConstantInstruction::Intrinsic(op) => frame.push(slots_of_kind(op.primary_type())),
                ConstantInstruction::Argument { .. } => frame.push(vec![VType::Integer]),
                ConstantInstruction::Load { value, .. } => frame.push(slots_of_constant(value)?),
            },
            Instruction::Stack(op) => {
                let (pop, _) = instruction.stack_effect()?;
                let top = frame.pop(pc, pop as usize)?;
                let shuffled = match op {
                    Opcode::Pop | Opcode::Pop2 => vec![],
                    Opcode::Dup => vec![top[0].clone(), top[0].clone()],
                    Opcode::DupX1 => vec![top[1].clone(), top[0].clone(), top[1].clone()],
                    Opcode::DupX2 => vec![top[2].clone(), top[0].clone(), top[1].clone(), top[2].clone()],
                    Opcode::Dup2 => vec![top[0].clone(), top[1].clone(), top[0].clone(), top[1].clone()],
                    Opcode::Dup2X1 => {
                        vec![top[1].clone(), top[2].clone(), top[0].clone(), top[1].clone(), top[2].clone()]
                    }
                    Opcode::Dup2X2 => vec![
                        top[2].clone(),
                        top[3].clone(),
                        top[0].clone(),
                        top[1].clone(),
                        top[2].clone(),
                        top[3].clone(),
                    ],
                    _ => vec![top[1].clone(), top[0].clone()],
                };
                frame.push(shuffled);
            }
            Instruction::Jsr { .. } | Instruction::Ret { .. } => {
                return Err(error(pc, "jsr and ret cannot be described by stack map frames"));
            }
        }
        Ok(())
    }
}

/// Collapses slot-level values into the list form frames use.
fn compress(values: &[VType]) -> Vec<VType> {
    let mut out = vec![];
    let mut i = 0;
    while i < values.len() {
        out.push(values[i].clone());
        i += if values[i].is_wide() { 2 } else { 1 };
    }
    while out.last() == Some(&VType::Top) {
        out.pop();
    }
    out
}

fn encode(offset_delta: u16, previous: &[VType], locals: Vec<VType>, mut stack: Vec<VType>) -> StackMapFrame {
    if locals == previous {
        match stack.len() {
            0 if offset_delta <= 63 => return StackMapFrame::Same { offset_delta },
            0 => return StackMapFrame::SameExtended { offset_delta },
            1 if offset_delta <= 63 => {
                return StackMapFrame::SameLocalsOneStackItem {
                    offset_delta,
                    stack: stack.remove(0),
                }
            }
            1 => {
                return StackMapFrame::SameLocalsOneStackItemExtended {
                    offset_delta,
                    stack: stack.remove(0),
                }
            }
            _ => {}
        }
    } else if stack.is_empty() {
        if locals.len() > previous.len() && locals.len() - previous.len() <= 3 && locals.starts_with(previous) {
            return StackMapFrame::Append {
                offset_delta,
                locals: locals[previous.len()..].to_vec(),
            };
        }
        if locals.len() < previous.len() && previous.len() - locals.len() <= 3 && previous.starts_with(&locals) {
            return StackMapFrame::Chop {
                offset_delta,
                chopped: (previous.len() - locals.len()) as u8,
            };
        }
    }
    StackMapFrame::Full {
        offset_delta,
        locals,
        stack,
    }
}

/// Infers frames for a laid-out body whose labels resolve through
/// `resolve`. Blocks unreachable from the entry must already have been
/// patched to end in `athrow`; they are described as holding just a
/// `Throwable` on the stack.
pub fn generate<F>(
    method: &MethodContext<'_>,
    instructions: &[(u32, Instruction)],
    catches: &[ExceptionCatch],
    code_len: u32,
    resolve: F,
) -> ClassResult<GeneratedFrames>
where
    F: Fn(Label) -> Option<u32>,
{
    let resolve = &resolve;
    let cfg = ControlFlowGraph::build_with(instructions, catches, code_len, resolve)?;
    let initial = Frame::initial(method);
    let mut max_locals = initial.locals.len();
    let mut max_stack = 0;
    if cfg.is_empty() {
        return Ok(GeneratedFrames {
            frames: vec![],
            max_stack: 0,
            max_locals: max_locals as u16,
        });
    }

    let interpreter = Interpreter {
        method,
        allocations: instructions
            .iter()
            .filter_map(|(pc, instruction)| match instruction {
                Instruction::NewObject(class) => Some((*pc, class.clone())),
                _ => None,
            })
            .collect(),
    };

    let offset = |label: Label| resolve(label).ok_or(ClassError::UnboundLabel(label));
    let mut handlers = vec![];
    for catch in catches {
        handlers.push((
            offset(catch.start)?..offset(catch.end)?,
            offset(catch.handler)?,
            catch.catch_type.clone().unwrap_or_else(|| THROWABLE.into()),
        ));
    }

    // Offsets that need an explicit frame.
    let mut targets = BTreeSet::new();
    for (idx, (_, instruction)) in instructions.iter().enumerate() {
        for target in instruction.targets() {
            targets.insert(offset(target)?);
        }
        if instruction.is_unconditional() {
            if let Some((next, _)) = instructions.get(idx + 1) {
                targets.insert(*next);
            }
        }
    }
    targets.extend(handlers.iter().map(|(_, handler, _)| *handler));

    let entry = cfg.entry().ok_or_else(|| error(0, "empty body"))?;
    let mut states: BTreeMap<NodeIndex, Frame> = BTreeMap::new();
    states.insert(entry, initial.clone());
    let mut worklist = VecDeque::from([entry]);
    let mut queued: BTreeSet<NodeIndex> = worklist.iter().copied().collect();

    let propagate = |states: &mut BTreeMap<NodeIndex, Frame>,
                         worklist: &mut VecDeque<NodeIndex>,
                         queued: &mut BTreeSet<NodeIndex>,
                         pc: u32,
                         target: u32,
                         frame: &Frame|
     -> ClassResult<()> {
        let node = cfg.block_at(target).ok_or_else(|| error(pc, format!("no block at {}", target)))?;
        let changed = match states.get_mut(&node) {
            Some(existing) => interpreter.merge(target, existing, frame)?,
            None => {
                states.insert(node, frame.clone());
                true
            }
        };
        if changed && queued.insert(node) {
            worklist.push_back(node);
        }
        Ok(())
    };

    while let Some(node) = worklist.pop_front() {
        queued.remove(&node);
        let block = cfg.graph()[node].clone();
        let mut frame = match states.get(&node) {
            Some(frame) => frame.clone(),
            None => continue,
        };

        for (pc, instruction) in &instructions[block.instructions.clone()] {
            let pc = *pc;
            let before = frame.locals.clone();
            interpreter.execute(pc, &mut frame, instruction)?;
            max_stack = max_stack.max(frame.stack.len());
            max_locals = max_locals.max(frame.locals.len());
            if let Some(extent) = instruction.locals_extent() {
                max_locals = max_locals.max(extent as usize);
            }

            for (range, handler, catch_type) in &handlers {
                if range.contains(&pc) {
                    let stack = vec![VType::Object(catch_type.clone())];
                    for locals in [&before, &frame.locals] {
                        let caught = Frame {
                            locals: locals.clone(),
                            stack: stack.clone(),
                        };
                        propagate(&mut states, &mut worklist, &mut queued, pc, *handler, &caught)?;
                    }
                    max_stack = max_stack.max(1);
                }
            }

            for target in instruction.targets() {
                propagate(&mut states, &mut worklist, &mut queued, pc, offset(target)?, &frame)?;
            }
        }

        if let Some((last_pc, last)) = instructions[block.instructions.clone()].last() {
            if !last.is_unconditional() && block.range.end < code_len {
                propagate(&mut states, &mut worklist, &mut queued, *last_pc, block.range.end, &frame)?;
            }
        }
    }

    let dead = Frame {
        locals: vec![],
        stack: vec![VType::Object(THROWABLE.into())],
    };
    let mut frames = vec![];
    let mut previous_locals = compress(&initial.locals);
    let mut previous_offset: Option<u32> = None;
    for target in targets {
        let node = cfg.block_at(target).ok_or_else(|| error(target, "frame target is not a block"))?;
        let frame = match states.get(&node) {
            Some(frame) => frame,
            None => {
                max_stack = max_stack.max(1);
                &dead
            }
        };
        let delta = match previous_offset {
            None => target,
            Some(prev) => target - prev - 1,
        };
        let offset_delta = u16::try_from(delta).map_err(|_| error(target, "frame offset out of range"))?;
        let locals = compress(&frame.locals);
        frames.push(encode(offset_delta, &previous_locals, locals.clone(), compress(&frame.stack)));
        previous_locals = locals;
        previous_offset = Some(target);
    }

    log::trace!("generated {} frames, max stack {}, max locals {}", frames.len(), max_stack, max_locals);
    Ok(GeneratedFrames {
        frames,
        max_stack: max_stack as u16,
        max_locals: max_locals as u16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constant::MemberRef, hierarchy::default_resolver};

    fn at(pc: u32) -> Label {
        Label::new(0, pc)
    }

    fn run(descriptor: &str, is_static: bool, code: &[(u32, Instruction)], catches: &[ExceptionCatch], len: u32) -> GeneratedFrames {
        let descriptor = MethodDescriptor::parse(descriptor).unwrap();
        let resolver = default_resolver();
        let method = MethodContext {
            this_class: "demo/Test",
            method_name: "run",
            descriptor: &descriptor,
            is_static,
            resolver: &resolver,
        };
        generate(&method, code, catches, len, |label| Some(label.id())).unwrap()
    }

    #[test]
    fn straight_line_code_needs_no_frames() {
        let code = vec![
            (0, Instruction::Load { op: Opcode::Iload0, slot: 0 }),
            (1, Instruction::Load { op: Opcode::Iload1, slot: 1 }),
            (2, Instruction::Operator(Opcode::Iadd)),
            (3, Instruction::Return(Opcode::Ireturn)),
        ];
        let result = run("(II)I", true, &code, &[], 4);
        assert!(result.frames.is_empty());
        assert_eq!(result.max_stack, 2);
        assert_eq!(result.max_locals, 2);
    }

    #[test]
    fn branch_merge_produces_same_frame() {
        // 0: iload_0  1: ifeq 8  4: iconst_1  5: goto 9  8: iconst_0  9: ireturn
        let code = vec![
            (0, Instruction::Load { op: Opcode::Iload0, slot: 0 }),
            (1, Instruction::Branch { op: Opcode::Ifeq, target: at(8) }),
            (4, Instruction::Constant(ConstantInstruction::Intrinsic(Opcode::Iconst1))),
            (5, Instruction::Branch { op: Opcode::Goto, target: at(9) }),
            (8, Instruction::Constant(ConstantInstruction::Intrinsic(Opcode::Iconst0))),
            (9, Instruction::Return(Opcode::Ireturn)),
        ];
        let result = run("(Z)I", true, &code, &[], 10);
        assert_eq!(
            result.frames,
            vec![
                StackMapFrame::Same { offset_delta: 8 },
                StackMapFrame::SameLocalsOneStackItem {
                    offset_delta: 0,
                    stack: VType::Integer
                },
            ]
        );
    }

    #[test]
    fn references_merge_to_common_superclass() {
        let code = vec![
            (0, Instruction::Load { op: Opcode::Iload0, slot: 0 }),
            (1, Instruction::Branch { op: Opcode::Ifeq, target: at(10) }),
            (
                4,
                Instruction::Field {
                    op: Opcode::Getstatic,
                    field: MemberRef::new("demo/Test", "a", "Ljava/lang/Integer;"),
                },
            ),
            (7, Instruction::Branch { op: Opcode::Goto, target: at(13) }),
            (
                10,
                Instruction::Field {
                    op: Opcode::Getstatic,
                    field: MemberRef::new("demo/Test", "b", "Ljava/lang/Long;"),
                },
            ),
            (13, Instruction::Return(Opcode::Areturn)),
        ];
        let result = run("(Z)Ljava/lang/Number;", true, &code, &[], 14);
        assert_eq!(
            result.frames[1],
            StackMapFrame::SameLocalsOneStackItem {
                offset_delta: 2,
                stack: VType::Object("java/lang/Number".into())
            }
        );
    }

    #[test]
    fn handlers_see_the_caught_type() {
        // 0: aload_0 1: athrow 2: astore_1 3: return, handler at 2 covering 0..2
        let code = vec![
            (0, Instruction::Load { op: Opcode::Aload0, slot: 0 }),
            (1, Instruction::Throw),
            (2, Instruction::Store { op: Opcode::Astore1, slot: 1 }),
            (3, Instruction::Return(Opcode::Return)),
        ];
        let catch = ExceptionCatch {
            start: at(0),
            end: at(2),
            handler: at(2),
            catch_type: Some("java/lang/RuntimeException".into()),
        };
        let result = run("()V", false, &code, &[catch], 4);
        assert_eq!(
            result.frames,
            vec![StackMapFrame::SameLocalsOneStackItem {
                offset_delta: 2,
                stack: VType::Object("java/lang/RuntimeException".into())
            }]
        );
        assert_eq!(result.max_locals, 2);
    }

    #[test]
    fn patched_dead_code_gets_throwable_frame() {
        let code = vec![
            (0, Instruction::Return(Opcode::Return)),
            (1, Instruction::Nop),
            (2, Instruction::Throw),
        ];
        let result = run("()V", true, &code, &[], 3);
        assert_eq!(
            result.frames,
            vec![StackMapFrame::SameLocalsOneStackItem {
                offset_delta: 1,
                stack: VType::Object(THROWABLE.into())
            }]
        );
    }

    #[test]
    fn appended_and_chopped_locals() {
        let previous = vec![VType::Integer];
        let appended = encode(3, &previous, vec![VType::Integer, VType::Long], vec![]);
        assert_eq!(
            appended,
            StackMapFrame::Append {
                offset_delta: 3,
                locals: vec![VType::Long]
            }
        );
        let chopped = encode(70, &previous, vec![], vec![]);
        assert_eq!(chopped, StackMapFrame::Chop { offset_delta: 70, chopped: 1 });
        assert_eq!(compress(&[VType::Long, VType::Top, VType::Top]), vec![VType::Long]);
    }
}
