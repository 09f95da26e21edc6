use classfile::{
    constant::MemberRef,
    transform::{self, Transform},
    ClassBuilder, ClassResult, CodeBuilder, CodeElement, ElementBuilder, Instruction,
};
use std::{collections::HashMap, str::FromStr, sync::Arc};

/// `Owner=NewOwner`: calls to methods of `Owner` go to `NewOwner` instead.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvokeRewrite {
    pub from: String,
    pub to: String,
}

#[derive(Debug, thiserror::Error)]
#[error("expected `Owner=NewOwner`, got `{0}`")]
pub struct BadRewrite(String);

impl FromStr for InvokeRewrite {
    type Err = BadRewrite;

    fn from_str(s: &str) -> Result<Self, BadRewrite> {
        match s.split_once('=') {
            Some((from, to)) if !from.is_empty() && !to.is_empty() => Ok(InvokeRewrite {
                from: from.replace('.', "/"),
                to: to.replace('.', "/"),
            }),
            _ => Err(BadRewrite(s.into())),
        }
    }
}

/// A code transform that renames the owner of invoked methods.
pub fn invocations(rewrites: &[InvokeRewrite]) -> impl Transform<ClassBuilder> {
    let owners: Arc<HashMap<String, String>> =
        Arc::new(rewrites.iter().map(|r| (r.from.clone(), r.to.clone())).collect());

    transform::code_in_methods(move || {
        let owners = owners.clone();
        move |code: &mut CodeBuilder, element: CodeElement| -> ClassResult<()> {
            match element {
                CodeElement::Instruction(Instruction::Invoke { op, method, interface })
                    if owners.contains_key(&*method.owner) =>
                {
                    let owner = &owners[&*method.owner];
                    log::debug!("{}.{} -> {}.{}", method.owner, method.name, owner, method.name);
                    code.with(CodeElement::Instruction(Instruction::Invoke {
                        op,
                        method: MemberRef::new(owner, &method.name, &method.descriptor),
                        interface,
                    }))?;
                }
                other => {
                    code.with(other)?;
                }
            }
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_and_internal_names() {
        let rewrite: InvokeRewrite = "java.io.PrintStream=demo/Out".parse().unwrap();
        assert_eq!(rewrite.from, "java/io/PrintStream");
        assert_eq!(rewrite.to, "demo/Out");
        assert!("Foo".parse::<InvokeRewrite>().is_err());
        assert!("=Bar".parse::<InvokeRewrite>().is_err());
    }

    #[test]
    fn bad_rewrites_name_the_input() {
        let err = "Foo".parse::<InvokeRewrite>().unwrap_err();
        assert_eq!(err.to_string(), "expected `Owner=NewOwner`, got `Foo`");
        let _: &dyn std::error::Error = &err;
    }
}
