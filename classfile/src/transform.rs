//! Composable element transforms.
//!
//! Every builder owns a [`Pipeline`] of transform stages. An element handed
//! to [`ElementBuilder::with`] goes to the first stage that is not already
//! running; anything that stage passes on with `builder.with(..)` continues
//! to the stage after it, and elements leaving the last stage are applied to
//! the builder itself. A stage that does not forward an element drops it.
//!
//! ```no_run
//! use classfile::{ClassResult, CodeBuilder, CodeElement, ElementBuilder};
//!
//! let strip_lines = |code: &mut CodeBuilder, element: CodeElement| -> ClassResult<()> {
//!     if !matches!(element, CodeElement::LineNumber(_)) {
//!         code.with(element)?;
//!     }
//!     Ok(())
//! };
//! # let _ = strip_lines;
//! ```

use crate::{
    builder::{ClassBuilder, CodeBuilder, FieldBuilder, MethodBuilder},
    model::{ClassElement, MethodElement, MethodModel},
    ClassError, ClassResult,
};
use std::ops::Range;

/// A builder that consumes a stream of elements.
pub trait ElementBuilder: Sized + 'static {
    type Element;

    fn pipeline(&mut self) -> &mut Pipeline<Self>;

    /// Applies an element to the builder's own state.
    fn accept_terminal(&mut self, element: Self::Element) -> ClassResult<()>;

    /// Sends an element down the remaining transform stages.
    fn with(&mut self, element: Self::Element) -> ClassResult<&mut Self> {
        match self.pipeline().enter() {
            Some((index, mut stage)) => {
                let result = stage.accept(self, element);
                self.pipeline().leave(index, stage);
                result?;
            }
            None => self.accept_terminal(element)?,
        }
        Ok(self)
    }
}

pub trait Transform<B: ElementBuilder>: 'static {
    fn accept(&mut self, builder: &mut B, element: B::Element) -> ClassResult<()>;

    /// Runs before the first element. Elements sent here reach the later
    /// stages ahead of any streamed element.
    fn at_start(&mut self, _builder: &mut B) -> ClassResult<()> {
        Ok(())
    }

    /// Runs after the last element.
    fn at_end(&mut self, _builder: &mut B) -> ClassResult<()> {
        Ok(())
    }

    fn into_stages(self) -> Vec<Box<dyn Transform<B>>>
    where
        Self: Sized,
    {
        vec![Box::new(self)]
    }

    /// Runs `self`, then `next` on whatever `self` passes on.
    fn and_then<T: Transform<B>>(self, next: T) -> AndThen<Self, T>
    where
        Self: Sized,
    {
        AndThen { first: self, second: next }
    }
}

impl<B, F> Transform<B> for F
where
    B: ElementBuilder,
    F: FnMut(&mut B, B::Element) -> ClassResult<()> + 'static,
{
    fn accept(&mut self, builder: &mut B, element: B::Element) -> ClassResult<()> {
        self(builder, element)
    }
}

pub struct AndThen<A, T> {
    first: A,
    second: T,
}

impl<B: ElementBuilder, A: Transform<B>, T: Transform<B>> Transform<B> for AndThen<A, T> {
    fn accept(&mut self, _: &mut B, _: B::Element) -> ClassResult<()> {
        // Pipelines flatten chains into separate stages, so a chain only sees
        // elements when driven by hand.
        Err(ClassError::illegal("chained transforms must run inside a pipeline"))
    }

    fn into_stages(self) -> Vec<Box<dyn Transform<B>>> {
        let mut stages = self.first.into_stages();
        stages.extend(self.second.into_stages());
        stages
    }
}

/// The transform stages of one builder, and how far an element in flight has
/// travelled through them.
pub struct Pipeline<B> {
    stages: Vec<Option<Box<dyn Transform<B>>>>,
    depth: usize,
}

impl<B> Default for Pipeline<B> {
    fn default() -> Self {
        Pipeline {
            stages: vec![],
            depth: 0,
        }
    }
}

impl<B: ElementBuilder> Pipeline<B> {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Appends a transform, splitting chains into their stages.
    pub fn push<T: Transform<B>>(&mut self, transform: T) {
        self.stages.extend(transform.into_stages().into_iter().map(Some));
    }

    /// Splices a transform in at the current depth, ahead of the stages an
    /// element produced here would visit next. Returns the new stages'
    /// positions.
    pub(crate) fn insert_here<T: Transform<B>>(&mut self, transform: T) -> Range<usize> {
        let at = self.depth;
        let stages: Vec<_> = transform.into_stages().into_iter().map(Some).collect();
        let range = at..at + stages.len();
        self.stages.splice(at..at, stages);
        range
    }

    pub(crate) fn remove(&mut self, range: Range<usize>) {
        self.stages.drain(range);
    }

    fn enter(&mut self) -> Option<(usize, Box<dyn Transform<B>>)> {
        let index = self.depth;
        let stage = self.stages.get_mut(index)?.take()?;
        self.depth = index + 1;
        Some((index, stage))
    }

    fn leave(&mut self, index: usize, stage: Box<dyn Transform<B>>) {
        self.stages[index] = Some(stage);
        self.depth = index;
    }
}

/// Runs every stage's `at_start` hook, in order.
pub fn run_start<B: ElementBuilder>(builder: &mut B) -> ClassResult<()> {
    let all = 0..builder.pipeline().len();
    run_start_in(builder, all)
}

/// Runs every stage's `at_end` hook, in order.
pub fn run_end<B: ElementBuilder>(builder: &mut B) -> ClassResult<()> {
    let all = 0..builder.pipeline().len();
    run_end_in(builder, all)
}

pub(crate) fn run_start_in<B: ElementBuilder>(builder: &mut B, stages: Range<usize>) -> ClassResult<()> {
    run_hooks(builder, stages, |stage, builder| stage.at_start(builder))
}

pub(crate) fn run_end_in<B: ElementBuilder>(builder: &mut B, stages: Range<usize>) -> ClassResult<()> {
    run_hooks(builder, stages, |stage, builder| stage.at_end(builder))
}

fn run_hooks<B, F>(builder: &mut B, stages: Range<usize>, mut hook: F) -> ClassResult<()>
where
    B: ElementBuilder,
    F: FnMut(&mut Box<dyn Transform<B>>, &mut B) -> ClassResult<()>,
{
    for index in stages {
        let pipeline = builder.pipeline();
        let previous = pipeline.depth;
        let mut stage = match pipeline.stages[index].take() {
            Some(stage) => stage,
            None => continue,
        };
        pipeline.depth = index + 1;
        let result = hook(&mut stage, builder);
        let pipeline = builder.pipeline();
        pipeline.stages[index] = Some(stage);
        pipeline.depth = previous;
        result?;
    }
    Ok(())
}

/// Streams `elements` through the builder's pipeline, bracketed by the start
/// and end hooks.
pub fn feed<B, I>(builder: &mut B, elements: I) -> ClassResult<()>
where
    B: ElementBuilder,
    I: IntoIterator<Item = B::Element>,
{
    run_start(builder)?;
    for element in elements {
        builder.with(element)?;
    }
    run_end(builder)
}

/// Passes every element on unchanged.
pub fn accept_all<B: ElementBuilder>() -> impl Transform<B> {
    |builder: &mut B, element: B::Element| builder.with(element).map(|_| ())
}

/// Drops the elements matching `predicate`.
pub fn drop_if<B, P>(mut predicate: P) -> impl Transform<B>
where
    B: ElementBuilder,
    P: FnMut(&B::Element) -> bool + 'static,
{
    move |builder: &mut B, element: B::Element| -> ClassResult<()> {
        if !predicate(&element) {
            builder.with(element)?;
        }
        Ok(())
    }
}

/// Runs a fresh code transform, made by `factory`, over the body of every
/// method that has one.
pub fn code_in_methods<F, T>(factory: F) -> impl Transform<ClassBuilder>
where
    F: FnMut() -> T + 'static,
    T: Transform<CodeBuilder>,
{
    methods_where(|_: &MethodModel| true, factory)
}

/// Like [`code_in_methods`], limited to methods matching `filter`.
pub fn methods_where<P, F, T>(mut filter: P, mut factory: F) -> impl Transform<ClassBuilder>
where
    P: FnMut(&MethodModel) -> bool + 'static,
    F: FnMut() -> T + 'static,
    T: Transform<CodeBuilder>,
{
    move |class: &mut ClassBuilder, element: ClassElement| -> ClassResult<()> {
        match element {
            ClassElement::Method(method) if filter(&method) => {
                class.transform_method(&method, code_in_method(factory()))?;
            }
            other => {
                class.with(other)?;
            }
        }
        Ok(())
    }
}

/// A method transform that rewrites the method's code with `transform` and
/// passes everything else on.
pub fn code_in_method<T: Transform<CodeBuilder>>(transform: T) -> impl Transform<MethodBuilder> {
    let mut transform = Some(transform);
    move |method: &mut MethodBuilder, element: MethodElement| -> ClassResult<()> {
        match (element, transform.take()) {
            (MethodElement::Code(code), Some(transform)) => {
                method.transform_code(&code, transform)?;
            }
            (other, pending) => {
                transform = pending;
                method.with(other)?;
            }
        }
        Ok(())
    }
}

/// Adapts a field transform into a class transform applied to every field.
pub fn fields<F, T>(mut factory: F) -> impl Transform<ClassBuilder>
where
    F: FnMut() -> T + 'static,
    T: Transform<FieldBuilder>,
{
    move |class: &mut ClassBuilder, element: ClassElement| -> ClassResult<()> {
        match element {
            ClassElement::Field(field) => {
                class.transform_field(&field, factory())?;
            }
            other => {
                class.with(other)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<u32>,
        pipeline: Pipeline<Recorder>,
    }

    impl ElementBuilder for Recorder {
        type Element = u32;

        fn pipeline(&mut self) -> &mut Pipeline<Self> {
            &mut self.pipeline
        }

        fn accept_terminal(&mut self, element: u32) -> ClassResult<()> {
            self.seen.push(element);
            Ok(())
        }
    }

    fn stage<F>(f: F) -> impl Transform<Recorder>
    where
        F: FnMut(&mut Recorder, u32) -> ClassResult<()> + 'static,
    {
        f
    }

    fn map(f: fn(u32) -> u32) -> impl Transform<Recorder> {
        stage(move |b, e| b.with(f(e)).map(|_| ()))
    }

    fn run<T: Transform<Recorder>>(transform: T, input: &[u32]) -> ClassResult<Vec<u32>> {
        let mut recorder = Recorder::default();
        recorder.pipeline().push(transform);
        feed(&mut recorder, input.iter().copied())?;
        Ok(recorder.seen)
    }

    #[test]
    fn stages_run_in_order() {
        assert_eq!(run(map(|e| e * 2).and_then(map(|e| e + 1)), &[1, 2]).unwrap(), vec![3, 5]);
        assert_eq!(run(map(|e| e + 1).and_then(map(|e| e * 2)), &[1, 2]).unwrap(), vec![4, 6]);
    }

    #[test]
    fn stages_can_expand_and_drop() {
        let repeat = stage(|b, e| {
            b.with(e)?.with(e)?;
            Ok(())
        });
        let odd_only = drop_if::<Recorder, _>(|e: &u32| e % 2 == 0);
        assert_eq!(run(repeat.and_then(odd_only), &[1, 2, 3]).unwrap(), vec![1, 1, 3, 3]);
    }

    struct Bracket;

    impl Transform<Recorder> for Bracket {
        fn accept(&mut self, builder: &mut Recorder, element: u32) -> ClassResult<()> {
            builder.with(element).map(|_| ())
        }

        fn at_start(&mut self, builder: &mut Recorder) -> ClassResult<()> {
            builder.with(0).map(|_| ())
        }

        fn at_end(&mut self, builder: &mut Recorder) -> ClassResult<()> {
            builder.with(99).map(|_| ())
        }
    }

    #[test]
    fn hooks_feed_later_stages() {
        assert_eq!(run(Bracket.and_then(map(|e| e + 1)), &[5]).unwrap(), vec![1, 6, 100]);
        assert_eq!(run(accept_all::<Recorder>(), &[7]).unwrap(), vec![7]);
    }

    #[test]
    fn errors_propagate_and_restore_the_pipeline() {
        let fail = stage(|_, e| {
            if e == 2 {
                Err(ClassError::illegal("two"))
            } else {
                Ok(())
            }
        });
        let mut recorder = Recorder::default();
        recorder.pipeline().push(fail);
        assert!(recorder.with(2).is_err());
        assert!(recorder.with(1).is_ok());
        assert_eq!(recorder.pipeline().len(), 1);
        assert!(recorder.seen.is_empty());
    }
}
