use ansi_term::{Color, Style};
use classfile::opcode::OpcodeKind;
use std::{borrow::Cow, collections::HashMap};

pub const DEFAULT: Style = Style {
    foreground: None,
    background: None,
    is_bold: false,
    is_dimmed: false,
    is_italic: false,
    is_underline: false,
    is_blink: false,
    is_reverse: false,
    is_hidden: false,
    is_strikethrough: false,
};

lazy_static::lazy_static! {
    /// Styles by dotted path. A child path that inherits takes its parent's
    /// style with some fields overridden.
    pub static ref STYLE_MAP: HashMap<String, Style> = {
        let entries = &[
            ("comment", StyleNode::Base(Color::Cyan.normal())),
            ("comment.unreachable", StyleNode::Inherit(Overrides::fg(Some(Color::Red)))),
            ("error", StyleNode::Base(Color::Red.bold())),
            ("extends", StyleNode::Base(Color::Yellow.bold())),
            ("access", StyleNode::Base(Color::Yellow.normal())),
            ("access.class", StyleNode::Base(Color::Blue.bold())),

            ("type", StyleNode::Base(Color::Green.normal())),
            ("type.object", StyleNode::Inherit(Overrides::default().bold(true))),
            ("type.primitive", StyleNode::Inherit(Overrides::default())),

            ("pool.index", StyleNode::Base(Color::Cyan.bold())),
            ("pool.val", StyleNode::Base(Color::Green.bold())),
            ("pool.val.string", StyleNode::Base(DEFAULT)),
            ("pool.ref", StyleNode::Base(Color::Yellow.bold())),
            ("pool.ref.name_and_type", StyleNode::Base(Color::Blue.bold())),
            ("pool.ref.dynamic", StyleNode::Base(Color::Purple.normal())),

            ("block", StyleNode::Base(Color::Cyan.normal().dimmed())),
            ("offset", StyleNode::Base(DEFAULT.dimmed())),

            ("flow.jump.forward", StyleNode::Base(Color::Yellow.normal())),
            ("flow.jump.backward", StyleNode::Base(Color::Red.bold())),

            ("opcode", StyleNode::Base(DEFAULT)),
            ("opcode.load", StyleNode::Base(Color::Cyan.normal())),
            ("opcode.load.const", StyleNode::Inherit(Overrides::default().bold(true))),
            ("opcode.store", StyleNode::Base(Color::Cyan.normal())),
            ("opcode.stack", StyleNode::Base(Color::Yellow.normal())),
            ("opcode.object", StyleNode::Base(Color::Green.normal())),
            ("opcode.arith", StyleNode::Base(Color::Green.normal())),
            ("opcode.conversion", StyleNode::Inherit(Overrides::default().dimmed(true))),
            ("opcode.flow", StyleNode::Base(Color::Yellow.normal().underline())),
            ("opcode.flow.invocation", StyleNode::Inherit(Overrides::default().underline(false))),

            ("opcode.operand", StyleNode::Base(Color::Yellow.normal())),
        ];

        let entries = entries.iter().map(|&(name, node)| (Cow::from(name), node)).collect::<HashMap<_, _>>();
        let mut resolved = HashMap::new();

        for path in entries.keys() {
            resolved.insert(path.to_string(), compute_node(&entries, path).unwrap_or(DEFAULT));
        }

        resolved
    };
}

/// The style at `path`, or the nearest styled ancestor.
pub fn get(path: &str) -> Style {
    let mut path = path;
    loop {
        if let Some(style) = STYLE_MAP.get(path) {
            return *style;
        }
        match path.rfind('.') {
            Some(pos) => path = &path[..pos],
            None => return DEFAULT,
        }
    }
}

pub fn for_opcode(kind: OpcodeKind) -> Style {
    get(match kind {
        OpcodeKind::Load | OpcodeKind::ArrayLoad => "opcode.load",
        OpcodeKind::Constant => "opcode.load.const",
        OpcodeKind::Store | OpcodeKind::ArrayStore | OpcodeKind::Increment => "opcode.store",
        OpcodeKind::Stack | OpcodeKind::Nop => "opcode.stack",
        OpcodeKind::FieldAccess
        | OpcodeKind::NewObject
        | OpcodeKind::NewPrimitiveArray
        | OpcodeKind::NewReferenceArray
        | OpcodeKind::NewMultiArray
        | OpcodeKind::TypeCheck
        | OpcodeKind::Monitor => "opcode.object",
        OpcodeKind::Operator => "opcode.arith",
        OpcodeKind::Convert => "opcode.conversion",
        OpcodeKind::Invoke | OpcodeKind::InvokeDynamic | OpcodeKind::Return => "opcode.flow.invocation",
        OpcodeKind::Branch
        | OpcodeKind::LookupSwitch
        | OpcodeKind::TableSwitch
        | OpcodeKind::Throw
        | OpcodeKind::DiscontinuedJsr
        | OpcodeKind::DiscontinuedRet => "opcode.flow",
    })
}

fn compute_node(ctx: &HashMap<Cow<'_, str>, StyleNode>, name: &str) -> Option<Style> {
    match *ctx.get(name)? {
        StyleNode::Base(style) => Some(style),
        StyleNode::Inherit(overrides) => {
            let (pos, _) = name.rmatch_indices('.').next()?;
            compute_node(ctx, &name[..pos]).map(|style| overrides.apply(style))
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Overrides {
    pub foreground: Option<Option<Color>>,
    pub is_bold: Option<bool>,
    pub is_dimmed: Option<bool>,
    pub is_underline: Option<bool>,
}

impl Overrides {
    pub fn fg(color: Option<Color>) -> Self {
        Overrides {
            foreground: Some(color),
            ..Default::default()
        }
    }

    pub fn bold(self, bold: bool) -> Self {
        Overrides {
            is_bold: Some(bold),
            ..self
        }
    }

    pub fn dimmed(self, dimmed: bool) -> Self {
        Overrides {
            is_dimmed: Some(dimmed),
            ..self
        }
    }

    pub fn underline(self, underline: bool) -> Self {
        Overrides {
            is_underline: Some(underline),
            ..self
        }
    }

    fn apply(self, style: Style) -> Style {
        Style {
            foreground: self.foreground.unwrap_or(style.foreground),
            is_bold: self.is_bold.unwrap_or(style.is_bold),
            is_dimmed: self.is_dimmed.unwrap_or(style.is_dimmed),
            is_underline: self.is_underline.unwrap_or(style.is_underline),
            ..style
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StyleNode {
    Base(Style),
    Inherit(Overrides),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_inherit_their_parent() {
        let constant = get("opcode.load.const");
        assert_eq!(constant.foreground, Some(Color::Cyan));
        assert!(constant.is_bold);
        assert_eq!(get("comment.unreachable").foreground, Some(Color::Red));
        assert!(!get("opcode.flow.invocation").is_underline);
    }

    #[test]
    fn unknown_paths_fall_back_to_an_ancestor() {
        assert_eq!(get("pool.index.extra"), get("pool.index"));
        assert_eq!(get("nothing.here"), DEFAULT);
    }
}
