mod code;
mod constant;
mod resolver;
mod rewrite;
mod style;

use crate::{resolver::DirectoryResolver, rewrite::InvokeRewrite};
use classfile::{
    access::FlagLocation,
    attribute::Attribute,
    descriptor::{FieldDescriptor, MethodDescriptor, ReturnDescriptor},
    hierarchy::ClassHierarchyResolver,
    signature::{ClassSignature, MethodSignature},
    ClassFile, ClassModel, ClassResult, Options,
};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "pretty-class", about = "Prints and rewrites JVM class files")]
struct Opt {
    /// The class file to read.
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Print the constant pool instead of the class.
    #[structopt(short = "c", long = "constant-pool")]
    constant_pool: bool,

    /// Disassemble method bodies.
    #[structopt(short = "d", long = "disassemble")]
    disassemble: bool,

    /// Redirect invocations of methods on `Owner` to `NewOwner` and write the
    /// result. May be repeated.
    #[structopt(long = "rewrite-invoke", number_of_values = 1)]
    rewrite_invoke: Vec<InvokeRewrite>,

    /// Where a rewritten class goes; defaults to overwriting the input.
    #[structopt(short = "o", long = "output", parse(from_os_str))]
    output: Option<PathBuf>,

    /// Directories of class files consulted when frames need a common
    /// superclass.
    #[structopt(long = "classpath", parse(from_os_str), number_of_values = 1)]
    classpath: Vec<PathBuf>,

    #[structopt(long = "no-stack-maps")]
    no_stack_maps: bool,
    #[structopt(long = "no-debug")]
    no_debug: bool,
    #[structopt(long = "no-line-numbers")]
    no_line_numbers: bool,
    #[structopt(long = "drop-unknown-attributes")]
    drop_unknown_attributes: bool,
    #[structopt(long = "no-shared-pool")]
    no_shared_pool: bool,
    #[structopt(long = "no-fix-jumps")]
    no_fix_jumps: bool,
    #[structopt(long = "no-patch-dead-code")]
    no_patch_dead_code: bool,
    #[structopt(long = "filter-unbound-labels")]
    filter_unbound_labels: bool,
    #[structopt(long = "strict")]
    strict: bool,
}

impl Opt {
    fn options(&self) -> Options {
        let options = Options::new()
            .generate_stack_maps(!self.no_stack_maps)
            .debug_elements(!self.no_debug)
            .line_numbers(!self.no_line_numbers)
            .unknown_attributes(!self.drop_unknown_attributes)
            .share_constant_pool(!self.no_shared_pool)
            .fix_short_jumps(!self.no_fix_jumps)
            .patch_dead_code(!self.no_patch_dead_code)
            .filter_unbound_labels(self.filter_unbound_labels)
            .strict_attributes(self.strict);

        if self.classpath.is_empty() {
            options
        } else {
            options.hierarchy_resolver(DirectoryResolver::new(self.classpath.clone()).cached())
        }
    }
}

pub(crate) fn pad(count: usize) {
    for _ in 0..count {
        print!("  ");
    }
}

fn comment(depth: usize, text: String) {
    pad(depth);
    println!("{}", style::get("comment").paint(format!("// {}", text)));
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}

fn print_attribute(attribute: &Attribute, depth: usize) {
    let name = attribute.name();
    match attribute {
        Attribute::Code(_) | Attribute::BootstrapMethods(_) => {}
        Attribute::SourceFile(file) => comment(depth, format!("{}: {}", name, file)),
        Attribute::Signature(signature) => comment(depth, format!("{}: {}", name, signature)),
        Attribute::NestHost(host) => comment(depth, format!("{}: {}", name, host)),
        Attribute::Exceptions(classes) | Attribute::NestMembers(classes) | Attribute::PermittedSubclasses(classes) => {
            comment(depth, format!("{}: {}", name, classes.join(", ")))
        }
        Attribute::ConstantValue(value) => comment(depth, format!("{}: {}", name, value)),
        Attribute::Module(module) => comment(depth, format!("{}: {}", name, module.name)),
        Attribute::Record(components) => {
            let components: Vec<String> = components
                .iter()
                .map(|component| format!("{} {}", component.descriptor, component.name))
                .collect();
            comment(depth, format!("{}: {}", name, components.join(", ")))
        }
        Attribute::Unknown { data, .. } => comment(depth, format!("?{}: {}", name, hex(data))),
        _ => comment(depth, name.to_string()),
    }
}

fn print_type(descriptor: &FieldDescriptor) -> String {
    let path = if descriptor.class_name().is_some() {
        "type.object"
    } else {
        "type.primitive"
    };
    style::get(path).paint(descriptor.to_string()).to_string()
}

fn signature_of(attributes: &[Attribute]) -> Option<&str> {
    attributes.iter().find_map(|attribute| match attribute {
        Attribute::Signature(signature) => Some(&**signature),
        _ => None,
    })
}

fn print_class_decl(model: &ClassModel) -> ClassResult<()> {
    print!(
        "{} {}",
        style::get("access.class").paint(model.flags().display(FlagLocation::Class).to_string()),
        style::get("type.object").paint(model.this_class().replace('/', "."))
    );

    if let Some(signature) = signature_of(model.attributes()?).and_then(|s| ClassSignature::parse(s).ok()) {
        print!(" {}", style::get("comment").paint(format!("/* {} */", signature)));
    }

    match model.superclass().as_deref() {
        None | Some("java/lang/Object") | Some("java/lang/Enum") => {}
        Some(superclass) => print!(
            " {} {}",
            style::get("extends").paint("extends"),
            style::get("type.object").paint(superclass.replace('/', "."))
        ),
    }

    if !model.interfaces().is_empty() {
        let names: Vec<String> = model.interfaces().iter().map(|name| name.replace('/', ".")).collect();
        print!(
            " {} {}",
            style::get("extends").paint("implements"),
            style::get("type.object").paint(names.join(", "))
        );
    }
    Ok(())
}

fn print_class(model: &ClassModel, disassemble: bool) -> ClassResult<()> {
    for attribute in model.attributes()? {
        print_attribute(attribute, 0);
    }
    comment(0, format!("Version {}", model.version()));
    print_class_decl(model)?;
    println!(" {{");

    for field in model.fields() {
        for attribute in field.attributes()? {
            print_attribute(attribute, 1);
        }
        pad(1);
        let access = field.flags().display(FlagLocation::Field).to_string();
        if !access.is_empty() {
            print!("{} ", style::get("access").paint(access));
        }
        println!("{} {};", print_type(&FieldDescriptor::parse(&field.descriptor())?), field.name());
    }

    println!();

    for method in model.methods() {
        for attribute in method.attributes()? {
            print_attribute(attribute, 1);
        }
        if let Some(signature) = signature_of(method.attributes()?) {
            if let Err(err) = MethodSignature::parse(signature) {
                log::warn!("bad signature on {}: {}", method.name(), err);
            }
        }

        pad(1);
        let access = method.flags().display(FlagLocation::Method).to_string();
        if !access.is_empty() {
            print!("{} ", style::get("access").paint(access));
        }
        let descriptor = MethodDescriptor::parse(&method.descriptor())?;
        let ret = match &descriptor.ret {
            ReturnDescriptor::Void => style::get("type.primitive").paint("void").to_string(),
            ReturnDescriptor::Type(ty) => print_type(ty),
        };
        let args: Vec<String> = descriptor.args.iter().map(print_type).collect();
        print!("{} {}({})", ret, method.name(), args.join(", "));

        match method.code()? {
            Some(code) if disassemble => {
                println!(" {{");
                code::print_code(&code, 2)?;
                pad(1);
                println!("}}");
            }
            _ => println!(";"),
        }
    }
    println!("}}");
    Ok(())
}

fn run(opt: &Opt) -> ClassResult<()> {
    let cf = ClassFile::with_options(opt.options());
    let model = cf.read_file(&opt.input)?;

    if !opt.rewrite_invoke.is_empty() {
        let output = opt.output.as_ref().unwrap_or(&opt.input);
        let bytes = cf.transform(&model, rewrite::invocations(&opt.rewrite_invoke))?;
        cf.write_file(output, &bytes)?;
        log::info!("wrote {} bytes to {}", bytes.len(), output.display());
        return Ok(());
    }

    if opt.constant_pool {
        constant::print_pool(model.pool());
        Ok(())
    } else {
        print_class(&model, opt.disassemble)
    }
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    if let Err(err) = run(&opt) {
        eprintln!("{}: {}", style::get("error").paint("error"), err);
        std::process::exit(1);
    }
}
