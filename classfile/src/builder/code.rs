//! Building code bodies.
//!
//! A [`CodeBuilder`] accumulates an ordered list of code elements. Branch
//! targets, exception ranges and variable scopes refer to [`Label`]s, which
//! are only turned into offsets when the enclosing class is written, so
//! forward jumps can be emitted before their target exists.
//!
//! While elements arrive the builder keeps a running estimate of the operand
//! stack depth. It is `None` where the code cannot be reached by falling
//! through, which is how the structured helpers ([`CodeBuilder::block`],
//! [`CodeBuilder::if_then_else`], [`CodeBuilder::trying`]) decide whether a
//! closing jump is needed.

use crate::{
    constant::{DynamicRef, LoadableConstant, MemberRef, Symbol},
    descriptor::{MethodDescriptor, TypeKind},
    instruction::{
        next_label_context, CharacterRangeInfo, CodeElement, ConstantInstruction, ExceptionCatch, Instruction, Label,
        LocalVariableInfo, SwitchCase,
    },
    opcode::Opcode,
    transform::{self, ElementBuilder, Pipeline, Transform},
    ClassError, ClassResult,
};
use std::{
    collections::{HashMap, HashSet},
    ops::{Deref, DerefMut, Range},
};

/// The output of a finished code builder.
#[derive(Clone, Debug)]
pub(crate) struct BuiltCode {
    pub elements: Vec<CodeElement>,
    /// Locals the builder knows are in use, parameters included.
    pub max_locals: u16,
}

pub struct CodeBuilder {
    context: u32,
    /// Label context of the code model being transformed, whose labels are
    /// accepted alongside our own.
    source_context: Option<u32>,
    next_label: u32,
    bound: HashSet<Label>,
    elements: Vec<CodeElement>,
    pipeline: Pipeline<CodeBuilder>,
    descriptor: MethodDescriptor,
    is_static: bool,
    next_local: u16,
    max_locals: u16,
    depth: Option<u16>,
    label_depths: HashMap<Label, u16>,
    instruction_count: usize,
}

impl CodeBuilder {
    pub(crate) fn new(descriptor: &str, is_static: bool) -> ClassResult<Self> {
        let descriptor = MethodDescriptor::parse(descriptor)?;
        let next_local = descriptor.parameter_slots() + if is_static { 0 } else { 1 };
        Ok(CodeBuilder {
            context: next_label_context(),
            source_context: None,
            next_label: 0,
            bound: HashSet::new(),
            elements: vec![],
            pipeline: Pipeline::new(),
            descriptor,
            is_static,
            next_local,
            max_locals: next_local,
            depth: Some(0),
            label_depths: HashMap::new(),
            instruction_count: 0,
        })
    }

    /// Accepts labels of the code model with label context `context`.
    pub(crate) fn with_source(mut self, context: u32) -> Self {
        self.source_context = Some(context);
        self
    }

    pub(crate) fn reserve_locals(&mut self, count: u16) {
        self.max_locals = self.max_locals.max(count);
    }

    pub(crate) fn finish(self) -> BuiltCode {
        BuiltCode {
            elements: self.elements,
            max_locals: self.max_locals,
        }
    }

    /// Elements accepted so far, in order.
    pub fn elements(&self) -> &[CodeElement] {
        &self.elements
    }

    /// Operand stack depth after the last instruction, or `None` when the
    /// current position cannot be reached.
    pub fn stack_depth(&self) -> Option<u16> {
        self.depth
    }

    /// Whether execution can fall through to the current position.
    pub fn is_reachable(&self) -> bool {
        self.depth.is_some()
    }

    fn check_label(&self, label: Label) -> ClassResult<()> {
        let own = label.context() == self.context && label.id() < self.next_label;
        if own || Some(label.context()) == self.source_context {
            Ok(())
        } else {
            Err(ClassError::ForeignLabel(label))
        }
    }

    fn track(&mut self, instruction: &Instruction) -> ClassResult<()> {
        let (pop, push) = instruction.stack_effect()?;
        let after = self.depth.map(|depth| depth.saturating_sub(pop) + push);
        if let Some(after) = after {
            for target in instruction.targets() {
                self.label_depths.entry(target).or_insert(after);
            }
        }
        self.depth = if instruction.is_unconditional() { None } else { after };
        if let Some(extent) = instruction.locals_extent() {
            self.max_locals = self.max_locals.max(extent);
        }
        Ok(())
    }

    // Labels

    pub fn new_label(&mut self) -> Label {
        let label = Label::new(self.context, self.next_label);
        self.next_label += 1;
        label
    }

    /// Creates a label bound to the current position.
    pub fn new_bound_label(&mut self) -> ClassResult<Label> {
        let label = self.new_label();
        self.bind(label)?;
        Ok(label)
    }

    pub fn bind(&mut self, label: Label) -> ClassResult<&mut Self> {
        self.with(CodeElement::Label(label))
    }

    // Locals

    /// The slot of `this`.
    pub fn receiver_slot(&self) -> ClassResult<u16> {
        if self.is_static {
            return Err(ClassError::illegal("a static method has no receiver"));
        }
        Ok(0)
    }

    pub fn parameter_slot(&self, index: usize) -> ClassResult<u16> {
        self.descriptor
            .parameter_slot(index, self.is_static)
            .ok_or_else(|| ClassError::illegal(format!("no parameter {}", index)))
    }

    /// Reserves a fresh local slot. Slots allocated inside a block are
    /// reused once the block ends.
    pub fn allocate_local(&mut self, kind: TypeKind) -> u16 {
        let slot = self.next_local;
        self.next_local += kind.slot_size().max(1);
        self.max_locals = self.max_locals.max(self.next_local);
        slot
    }

    // Instructions

    pub fn instruction(&mut self, instruction: Instruction) -> ClassResult<&mut Self> {
        self.with(CodeElement::Instruction(instruction))
    }

    pub fn nop(&mut self) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Nop)
    }

    /// Pushes `value` with the shortest instruction able to: an implicit
    /// constant, `bipush`, `sipush`, then `ldc`.
    pub fn load_constant<C: Into<LoadableConstant>>(&mut self, value: C) -> ClassResult<&mut Self> {
        use ConstantInstruction::*;
        let value = value.into();
        let constant = match value {
            LoadableConstant::Integer(v) => match v {
                -1 => Intrinsic(Opcode::IconstM1),
                0 => Intrinsic(Opcode::Iconst0),
                1 => Intrinsic(Opcode::Iconst1),
                2 => Intrinsic(Opcode::Iconst2),
                3 => Intrinsic(Opcode::Iconst3),
                4 => Intrinsic(Opcode::Iconst4),
                5 => Intrinsic(Opcode::Iconst5),
                v if i8::try_from(v).is_ok() => Argument { op: Opcode::Bipush, value: v },
                v if i16::try_from(v).is_ok() => Argument { op: Opcode::Sipush, value: v },
                v => Load {
                    op: Opcode::Ldc,
                    value: LoadableConstant::Integer(v),
                },
            },
            LoadableConstant::Long(0) => Intrinsic(Opcode::Lconst0),
            LoadableConstant::Long(1) => Intrinsic(Opcode::Lconst1),
            // Compared by bits so that -0.0 still goes through the pool.
            LoadableConstant::Float(v) if v.to_bits() == 0f32.to_bits() => Intrinsic(Opcode::Fconst0),
            LoadableConstant::Float(v) if v.to_bits() == 1f32.to_bits() => Intrinsic(Opcode::Fconst1),
            LoadableConstant::Float(v) if v.to_bits() == 2f32.to_bits() => Intrinsic(Opcode::Fconst2),
            LoadableConstant::Double(v) if v.to_bits() == 0f64.to_bits() => Intrinsic(Opcode::Dconst0),
            LoadableConstant::Double(v) if v.to_bits() == 1f64.to_bits() => Intrinsic(Opcode::Dconst1),
            other => Load {
                op: if other.is_wide() { Opcode::Ldc2W } else { Opcode::Ldc },
                value: other,
            },
        };
        self.instruction(Instruction::Constant(constant))
    }

    pub fn aconst_null(&mut self) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Constant(ConstantInstruction::Intrinsic(Opcode::AconstNull)))
    }

    pub fn load_local(&mut self, kind: TypeKind, slot: u16) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Load {
            op: Opcode::load_for_slot(kind, slot),
            slot,
        })
    }

    pub fn store_local(&mut self, kind: TypeKind, slot: u16) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Store {
            op: Opcode::store_for_slot(kind, slot),
            slot,
        })
    }

    pub fn iinc(&mut self, slot: u16, value: i16) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Increment { slot, value })
    }

    pub fn operator(&mut self, op: Opcode) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Operator(op))
    }

    pub fn return_(&mut self, kind: TypeKind) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Return(Opcode::return_for(kind)))
    }

    pub fn return_void(&mut self) -> ClassResult<&mut Self> {
        self.return_(TypeKind::Void)
    }

    pub fn ireturn(&mut self) -> ClassResult<&mut Self> {
        self.return_(TypeKind::Int)
    }

    pub fn areturn(&mut self) -> ClassResult<&mut Self> {
        self.return_(TypeKind::Reference)
    }

    pub fn athrow(&mut self) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Throw)
    }

    /// Emits a conditional or unconditional branch to `target`.
    pub fn branch(&mut self, op: Opcode, target: Label) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Branch { op, target })
    }

    pub fn goto_(&mut self, target: Label) -> ClassResult<&mut Self> {
        self.branch(Opcode::Goto, target)
    }

    pub fn lookup_switch(&mut self, default: Label, cases: &[(i32, Label)]) -> ClassResult<&mut Self> {
        let cases = cases
            .iter()
            .map(|&(value, target)| SwitchCase { value, target })
            .collect();
        self.instruction(Instruction::LookupSwitch { default, cases })
    }

    /// A `tableswitch` over `low..=high` with one target per value.
    pub fn table_switch(&mut self, low: i32, high: i32, default: Label, targets: &[Label]) -> ClassResult<&mut Self> {
        if high < low || (high as i64 - low as i64 + 1) != targets.len() as i64 {
            return Err(ClassError::illegal(format!(
                "tableswitch over {}..={} needs {} targets, got {}",
                low,
                high,
                high as i64 - low as i64 + 1,
                targets.len()
            )));
        }
        let cases = targets
            .iter()
            .enumerate()
            .map(|(i, &target)| SwitchCase {
                value: low + i as i32,
                target,
            })
            .collect();
        self.instruction(Instruction::TableSwitch {
            low,
            high,
            default,
            cases,
        })
    }

    pub fn field_access(&mut self, op: Opcode, owner: &str, name: &str, descriptor: &str) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Field {
            op,
            field: MemberRef::new(owner, name, descriptor),
        })
    }

    pub fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) -> ClassResult<&mut Self> {
        self.field_access(Opcode::Getfield, owner, name, descriptor)
    }

    pub fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) -> ClassResult<&mut Self> {
        self.field_access(Opcode::Putfield, owner, name, descriptor)
    }

    pub fn get_static(&mut self, owner: &str, name: &str, descriptor: &str) -> ClassResult<&mut Self> {
        self.field_access(Opcode::Getstatic, owner, name, descriptor)
    }

    pub fn put_static(&mut self, owner: &str, name: &str, descriptor: &str) -> ClassResult<&mut Self> {
        self.field_access(Opcode::Putstatic, owner, name, descriptor)
    }

    pub fn invoke(
        &mut self,
        op: Opcode,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Invoke {
            op,
            method: MemberRef::new(owner, name, descriptor),
            interface,
        })
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> ClassResult<&mut Self> {
        self.invoke(Opcode::Invokevirtual, owner, name, descriptor, false)
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> ClassResult<&mut Self> {
        self.invoke(Opcode::Invokestatic, owner, name, descriptor, false)
    }

    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> ClassResult<&mut Self> {
        self.invoke(Opcode::Invokespecial, owner, name, descriptor, false)
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> ClassResult<&mut Self> {
        self.invoke(Opcode::Invokeinterface, owner, name, descriptor, true)
    }

    pub fn invoke_dynamic(&mut self, call_site: DynamicRef) -> ClassResult<&mut Self> {
        self.instruction(Instruction::InvokeDynamic(call_site))
    }

    pub fn new_object(&mut self, class: &str) -> ClassResult<&mut Self> {
        self.instruction(Instruction::NewObject(class.into()))
    }

    pub fn dup(&mut self) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Stack(Opcode::Dup))
    }

    pub fn pop(&mut self) -> ClassResult<&mut Self> {
        self.instruction(Instruction::Stack(Opcode::Pop))
    }

    pub fn checkcast(&mut self, class: &str) -> ClassResult<&mut Self> {
        self.instruction(Instruction::TypeCheck {
            op: Opcode::Checkcast,
            class: class.into(),
        })
    }

    pub fn instanceof(&mut self, class: &str) -> ClassResult<&mut Self> {
        self.instruction(Instruction::TypeCheck {
            op: Opcode::Instanceof,
            class: class.into(),
        })
    }

    // Pseudo elements

    pub fn line_number(&mut self, line: u16) -> ClassResult<&mut Self> {
        self.with(CodeElement::LineNumber(line))
    }

    pub fn exception_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> ClassResult<&mut Self> {
        self.with(CodeElement::ExceptionCatch(ExceptionCatch {
            start,
            end,
            handler,
            catch_type: catch_type.map(Symbol::from),
        }))
    }

    pub fn exception_catch_all(&mut self, start: Label, end: Label, handler: Label) -> ClassResult<&mut Self> {
        self.exception_catch(start, end, handler, None)
    }

    pub fn local_variable(
        &mut self,
        slot: u16,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
    ) -> ClassResult<&mut Self> {
        self.with(CodeElement::LocalVariable(LocalVariableInfo {
            slot,
            name: name.into(),
            descriptor: descriptor.into(),
            start,
            end,
        }))
    }

    /// Records the generic signature of a local variable.
    pub fn local_variable_type(
        &mut self,
        slot: u16,
        name: &str,
        signature: &str,
        start: Label,
        end: Label,
    ) -> ClassResult<&mut Self> {
        self.with(CodeElement::LocalVariableType(LocalVariableInfo {
            slot,
            name: name.into(),
            descriptor: signature.into(),
            start,
            end,
        }))
    }

    pub fn character_range(
        &mut self,
        start: Label,
        end: Label,
        range_start: u32,
        range_end: u32,
        flags: u16,
    ) -> ClassResult<&mut Self> {
        self.with(CodeElement::CharacterRange(CharacterRangeInfo {
            start,
            end,
            range_start,
            range_end,
            flags,
        }))
    }

    // Structured code

    /// Runs `handler` in a nested block. The block's break label is bound
    /// right after it, and locals allocated inside are released.
    pub fn block<F>(&mut self, handler: F) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
    {
        let start = self.new_label();
        let end = self.new_label();
        self.run_block(start, end, handler)?;
        Ok(self)
    }

    /// Binds `start`, runs the block and binds `end`. Returns whether code
    /// after the block is reachable.
    fn run_block<F>(&mut self, start: Label, end: Label, handler: F) -> ClassResult<bool>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
    {
        let locals = self.next_local;
        self.bind(start)?;
        handler(&mut BlockCodeBuilder { code: self, start, end })?;
        self.next_local = locals;
        self.bind(end)?;
        Ok(self.is_reachable())
    }

    fn skip_branch(op: Opcode) -> ClassResult<Opcode> {
        op.reversed_branch()
            .ok_or_else(|| ClassError::illegal(format!("{} is not a conditional branch", op)))
    }

    /// Runs `then` when the condition tested by `op` holds.
    pub fn if_then<F>(&mut self, op: Opcode, then: F) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
    {
        let skip = Self::skip_branch(op)?;
        let start = self.new_label();
        let end = self.new_label();
        self.branch(skip, end)?;
        self.run_block(start, end, then)?;
        Ok(self)
    }

    /// Runs `then` when the condition tested by `op` holds, and `otherwise`
    /// when it does not. A jump over `otherwise` is only added when `then`
    /// can complete normally.
    pub fn if_then_else<F, G>(&mut self, op: Opcode, then: F, otherwise: G) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
        G: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
    {
        let skip = Self::skip_branch(op)?;
        let then_start = self.new_label();
        let then_end = self.new_label();
        let else_start = self.new_label();
        let end = self.new_label();

        self.branch(skip, else_start)?;
        if self.run_block(then_start, then_end, then)? {
            self.goto_(end)?;
        }
        self.run_block(else_start, end, otherwise)?;
        Ok(self)
    }

    /// [`CodeBuilder::if_then`] on an `int` treated as a boolean.
    pub fn if_true<F>(&mut self, then: F) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
    {
        self.if_then(Opcode::Ifne, then)
    }

    pub fn if_true_else<F, G>(&mut self, then: F, otherwise: G) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
        G: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
    {
        self.if_then_else(Opcode::Ifne, then, otherwise)
    }

    /// Emits a try block and its handlers. The try block must contain at
    /// least one instruction.
    pub fn trying<F, C>(&mut self, body: F, catches: C) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
        C: FnOnce(&mut CatchBuilder<'_>) -> ClassResult<()>,
    {
        let try_start = self.new_label();
        let try_end = self.new_label();
        let end = self.new_label();

        let before = self.instruction_count;
        let locals = self.next_local;
        self.bind(try_start)?;
        handler_scope(self, try_start, try_end, body)?;
        self.next_local = locals;
        if self.instruction_count == before {
            return Err(ClassError::EmptyTryBlock);
        }
        self.bind(try_end)?;
        if self.is_reachable() {
            self.goto_(end)?;
        }

        catches(&mut CatchBuilder {
            code: self,
            try_start,
            try_end,
            end,
            caught: HashSet::new(),
            catch_all: false,
        })?;
        self.bind(end)?;
        Ok(self)
    }

    /// Runs `handler` with `transform` spliced into this builder's pipeline,
    /// so that everything emitted inside passes through it first.
    pub fn transforming<T, F>(&mut self, transform: T, handler: F) -> ClassResult<&mut Self>
    where
        T: Transform<CodeBuilder>,
        F: FnOnce(&mut CodeBuilder) -> ClassResult<()>,
    {
        let stages = self.pipeline.insert_here(transform);
        let result = run_transforming(self, stages.clone(), handler);
        self.pipeline.remove(stages);
        result?;
        Ok(self)
    }
}

fn handler_scope<F>(code: &mut CodeBuilder, start: Label, end: Label, handler: F) -> ClassResult<()>
where
    F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
{
    handler(&mut BlockCodeBuilder { code, start, end })
}

fn run_transforming<F>(code: &mut CodeBuilder, stages: Range<usize>, handler: F) -> ClassResult<()>
where
    F: FnOnce(&mut CodeBuilder) -> ClassResult<()>,
{
    transform::run_start_in(code, stages.clone())?;
    handler(code)?;
    transform::run_end_in(code, stages)
}

impl ElementBuilder for CodeBuilder {
    type Element = CodeElement;

    fn pipeline(&mut self) -> &mut Pipeline<Self> {
        &mut self.pipeline
    }

    fn accept_terminal(&mut self, element: CodeElement) -> ClassResult<()> {
        for label in element.referenced_labels() {
            self.check_label(label)?;
        }

        match &element {
            CodeElement::Label(label) => {
                self.check_label(*label)?;
                if !self.bound.insert(*label) {
                    return Err(ClassError::LabelAlreadyBound(*label));
                }
                self.depth = self.label_depths.get(label).copied().or(self.depth);
            }
            CodeElement::Instruction(instruction) => {
                instruction.validate()?;
                self.track(instruction)?;
                self.instruction_count += 1;
            }
            CodeElement::ExceptionCatch(catch) => {
                self.label_depths.insert(catch.handler, 1);
            }
            CodeElement::LocalVariable(var) => {
                let size = if matches!(var.descriptor.as_bytes().first(), Some(b'J' | b'D')) { 2 } else { 1 };
                self.max_locals = self.max_locals.max(var.slot + size);
            }
            _ => {}
        }

        self.elements.push(element);
        Ok(())
    }
}

/// A code builder scoped to a nested block, with labels for its start and
/// end. Jumping to [`BlockCodeBuilder::break_label`] leaves the block.
pub struct BlockCodeBuilder<'a> {
    code: &'a mut CodeBuilder,
    start: Label,
    end: Label,
}

impl BlockCodeBuilder<'_> {
    pub fn start_label(&self) -> Label {
        self.start
    }

    pub fn end_label(&self) -> Label {
        self.end
    }

    pub fn break_label(&self) -> Label {
        self.end
    }

    pub fn reachable(&self) -> bool {
        self.code.is_reachable()
    }
}

impl Deref for BlockCodeBuilder<'_> {
    type Target = CodeBuilder;

    fn deref(&self) -> &CodeBuilder {
        self.code
    }
}

impl DerefMut for BlockCodeBuilder<'_> {
    fn deref_mut(&mut self) -> &mut CodeBuilder {
        self.code
    }
}

/// Adds handlers to a try block. Each exception type may be caught once.
pub struct CatchBuilder<'a> {
    code: &'a mut CodeBuilder,
    try_start: Label,
    try_end: Label,
    end: Label,
    caught: HashSet<String>,
    catch_all: bool,
}

impl CatchBuilder<'_> {
    pub fn catching<F>(&mut self, class: &str, handler: F) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
    {
        self.catching_multi(&[class], handler)
    }

    /// One handler for several exception types.
    pub fn catching_multi<F>(&mut self, classes: &[&str], handler: F) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
    {
        if classes.is_empty() {
            return Err(ClassError::illegal("a catch clause needs an exception type"));
        }
        for class in classes {
            if self.catch_all || !self.caught.insert(class.to_string()) {
                return Err(ClassError::DuplicateCatch(class.to_string()));
            }
        }
        let types: Vec<Option<Symbol>> = classes.iter().map(|class| Some(Symbol::from(*class))).collect();
        self.catch_block(types, handler)
    }

    pub fn catching_all<F>(&mut self, handler: F) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
    {
        if self.catch_all {
            return Err(ClassError::DuplicateCatch("any exception".into()));
        }
        self.catch_all = true;
        self.catch_block(vec![None], handler)
    }

    fn catch_block<F>(&mut self, types: Vec<Option<Symbol>>, handler: F) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> ClassResult<()>,
    {
        let code = &mut *self.code;
        let handler_start = code.new_label();
        let handler_end = code.new_label();
        for catch_type in types {
            code.with(CodeElement::ExceptionCatch(ExceptionCatch {
                start: self.try_start,
                end: self.try_end,
                handler: handler_start,
                catch_type,
            }))?;
        }
        if code.run_block(handler_start, handler_end, handler)? {
            code.goto_(self.end)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> CodeBuilder {
        CodeBuilder::new("(I)I", true).unwrap()
    }

    fn instructions(code: &CodeBuilder) -> Vec<Instruction> {
        code.elements()
            .iter()
            .filter_map(|element| match element {
                CodeElement::Instruction(instruction) => Some(instruction.clone()),
                _ => None,
            })
            .collect()
    }

    fn gotos(code: &CodeBuilder) -> usize {
        instructions(code)
            .iter()
            .filter(|instruction| instruction.opcode() == Opcode::Goto)
            .count()
    }

    #[test]
    fn constants_use_the_narrowest_form() {
        let mut code = builder();
        code.load_constant(3).unwrap();
        code.load_constant(-100).unwrap();
        code.load_constant(200).unwrap();
        code.load_constant(70000).unwrap();
        code.load_constant(1i64).unwrap();
        code.load_constant(-0.0f32).unwrap();
        let ops: Vec<Opcode> = instructions(&code).iter().map(Instruction::opcode).collect();
        assert_eq!(
            ops,
            vec![Opcode::Iconst3, Opcode::Bipush, Opcode::Sipush, Opcode::Ldc, Opcode::Lconst1, Opcode::Ldc]
        );
        assert_eq!(code.stack_depth(), Some(7));
    }

    #[test]
    fn depth_follows_the_stack() {
        let mut code = builder();
        code.load_constant(200).unwrap();
        assert_eq!(code.stack_depth(), Some(1));
        code.ireturn().unwrap();
        assert_eq!(code.stack_depth(), None);
        assert!(!code.is_reachable());
    }

    #[test]
    fn labels_bind_once() {
        let mut code = builder();
        let label = code.new_bound_label().unwrap();
        assert!(matches!(code.bind(label), Err(ClassError::LabelAlreadyBound(l)) if l == label));
    }

    #[test]
    fn foreign_labels_are_rejected() {
        let mut other = builder();
        let foreign = other.new_label();
        let mut code = builder();
        assert!(matches!(code.goto_(foreign), Err(ClassError::ForeignLabel(_))));
        assert!(code.elements().is_empty());
    }

    #[test]
    fn branch_targets_carry_depth() {
        let mut code = builder();
        let target = code.new_label();
        code.load_constant(1).unwrap().load_constant(2).unwrap();
        code.branch(Opcode::IfIcmpeq, target).unwrap();
        code.load_constant(7).unwrap().goto_(target).unwrap();
        assert!(!code.is_reachable());
        code.bind(target).unwrap();
        assert_eq!(code.stack_depth(), Some(0));
    }

    #[test]
    fn if_else_skips_jump_after_return() {
        let mut code = builder();
        code.load_local(TypeKind::Int, 0).unwrap();
        code.if_true_else(
            |then| {
                then.load_constant(1)?.ireturn()?;
                Ok(())
            },
            |otherwise| {
                otherwise.load_constant(2)?.ireturn()?;
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(gotos(&code), 0);
        assert_eq!(instructions(&code)[1].opcode(), Opcode::Ifeq);
    }

    #[test]
    fn if_else_jumps_over_else_when_then_falls_through() {
        let mut code = builder();
        code.load_local(TypeKind::Int, 0).unwrap();
        code.if_true_else(
            |then| {
                then.load_constant(1)?.store_local(TypeKind::Int, 0)?;
                Ok(())
            },
            |otherwise| {
                otherwise.load_constant(2)?.store_local(TypeKind::Int, 0)?;
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(gotos(&code), 1);
        assert!(code.is_reachable());
    }

    #[test]
    fn non_branches_are_rejected_up_front() {
        let mut code = builder();
        let result = code.if_then(Opcode::Goto, |_| Ok(()));
        assert!(matches!(result, Err(ClassError::IllegalArgument(_))));
        assert!(code.elements().is_empty());
    }

    #[test]
    fn empty_try_is_rejected() {
        let mut code = builder();
        let result = code.trying(
            |_| Ok(()),
            |catches| {
                catches.catching_all(|handler| {
                    handler.athrow()?;
                    Ok(())
                })?;
                Ok(())
            },
        );
        assert!(matches!(result, Err(ClassError::EmptyTryBlock)));
        assert!(!code
            .elements()
            .iter()
            .any(|element| matches!(element, CodeElement::ExceptionCatch(_))));
    }

    #[test]
    fn catches_cover_the_try_body() {
        let mut code = builder();
        code.trying(
            |body| {
                body.load_local(TypeKind::Int, 0)?.ireturn()?;
                Ok(())
            },
            |catches| {
                catches.catching("java/lang/RuntimeException", |handler| {
                    handler.pop()?.load_constant(0)?.ireturn()?;
                    Ok(())
                })?;
                let duplicate = catches.catching("java/lang/RuntimeException", |_| Ok(()));
                assert!(matches!(duplicate, Err(ClassError::DuplicateCatch(_))));
                Ok(())
            },
        )
        .unwrap();

        let catches: Vec<_> = code
            .elements()
            .iter()
            .filter_map(|element| match element {
                CodeElement::ExceptionCatch(catch) => Some(catch.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(catches.len(), 1);
        assert_eq!(catches[0].catch_type.as_deref(), Some("java/lang/RuntimeException"));
        assert_eq!(gotos(&code), 0);
    }

    #[test]
    fn block_locals_are_released() {
        let mut code = builder();
        let outer = code.allocate_local(TypeKind::Long);
        assert_eq!(outer, 1);
        code.block(|block| {
            assert_eq!(block.allocate_local(TypeKind::Int), 3);
            Ok(())
        })
        .unwrap();
        assert_eq!(code.allocate_local(TypeKind::Int), 3);
        assert_eq!(code.parameter_slot(0).unwrap(), 0);
        assert!(code.receiver_slot().is_err());
    }

    #[test]
    fn transforming_rewrites_nested_output() {
        let mut code = builder();
        let double = |code: &mut CodeBuilder, element: CodeElement| -> ClassResult<()> {
            code.with(element.clone())?.with(element)?;
            Ok(())
        };
        code.transforming(double, |inner| {
            inner.nop()?;
            Ok(())
        })
        .unwrap();
        code.nop().unwrap();
        assert_eq!(instructions(&code).len(), 3);
    }
}
