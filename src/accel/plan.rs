//! Plan build strategy
//!
//! The descriptor is rendered as a small member plan, which is then compiled
//! back into an instruction list driving the marshaler. The rendered text is
//! logged at trace level:
//!
//! ```text
//! type "com.example.Foo"
//! dynamic
//! member 0 "a" Integer
//! member 1 "b" String
//! ```
//!
//! Names are quoted with `\\`, `\"`, `\n` and `\r` escaped, so any AMF
//! member name survives the text form.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::trace;

use super::coerce::{coerce, TypeLookup};
use super::compiled::{CompiledType, Layout, Marshaler};
use super::descriptor::{MemberKind, TypeDescriptor};
use crate::amf::{ClassDefinition, Object, Value};
use crate::config::CompilerStrategy;
use crate::error::{AmfError, CoercionError};

/// Render the member plan of a descriptor
pub(crate) fn render(desc: &TypeDescriptor) -> String {
    let mut source = String::new();
    let _ = writeln!(source, "type {}", quote(desc.name()));
    if desc.is_dynamic() {
        source.push_str("dynamic\n");
    }
    for (i, member) in desc.members().iter().enumerate() {
        let _ = writeln!(
            source,
            "member {} {} {}",
            i,
            quote(&member.name),
            render_kind(&member.kind)
        );
    }
    source
}

fn render_kind(kind: &MemberKind) -> String {
    match kind {
        MemberKind::Array(inner) => format!("Array<{}>", render_kind(inner)),
        MemberKind::Object(Some(name)) => format!("Object<{}>", quote(name)),
        other => other.to_string(),
    }
}

fn parse_kind(text: &str) -> Result<MemberKind, CoercionError> {
    if let Some(inner) = text.strip_prefix("Array<").and_then(|r| r.strip_suffix('>')) {
        return Ok(MemberKind::array_of(parse_kind(inner)?));
    }
    if let Some(rest) = text.strip_prefix("Object<") {
        return match unquote(rest) {
            Some((name, ">")) => Ok(MemberKind::object_of(&name)),
            _ => Err(CoercionError::new("member kind", text)),
        };
    }
    text.parse()
}

fn quote(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for c in name.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Split a leading quoted name off `input`, returning the name and the rest
fn unquote(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('"')?;
    let mut name = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((name, &body[i + 1..])),
            '\\' => match chars.next()?.1 {
                'n' => name.push('\n'),
                'r' => name.push('\r'),
                escaped @ ('\\' | '"') => name.push(escaped),
                _ => return None,
            },
            c => name.push(c),
        }
    }
    None
}

struct Instruction {
    name: Arc<str>,
    kind: MemberKind,
}

pub(crate) struct Program {
    type_name: Arc<str>,
    dynamic: bool,
    instructions: Vec<Instruction>,
}

fn malformed(line: &str) -> CoercionError {
    CoercionError::new("plan instruction", line)
}

/// Compile a rendered plan into an instruction list
pub(crate) fn compile(source: &str) -> Result<Program, CoercionError> {
    let mut type_name = None;
    let mut dynamic = false;
    let mut instructions = Vec::new();

    for line in source.lines().filter(|l| !l.trim().is_empty()) {
        if let Some(rest) = line.strip_prefix("type ") {
            let (name, tail) = unquote(rest).ok_or_else(|| malformed(line))?;
            if !tail.is_empty() {
                return Err(malformed(line));
            }
            type_name = Some(Arc::<str>::from(name));
        } else if line == "dynamic" {
            dynamic = true;
        } else if let Some(rest) = line.strip_prefix("member ") {
            let (index, rest) = rest.split_once(' ').ok_or_else(|| malformed(line))?;
            if index.parse::<usize>().ok() != Some(instructions.len()) {
                return Err(malformed(line));
            }
            let (name, kind) = unquote(rest).ok_or_else(|| malformed(line))?;
            let kind = kind.strip_prefix(' ').ok_or_else(|| malformed(line))?;
            instructions.push(Instruction {
                name: name.into(),
                kind: parse_kind(kind)?,
            });
        } else {
            return Err(malformed(line));
        }
    }

    let type_name = type_name.ok_or_else(|| malformed("type"))?;
    Ok(Program {
        type_name,
        dynamic,
        instructions,
    })
}

struct PlanMarshaler {
    layout: Layout,
    kinds: Vec<MemberKind>,
}

impl PlanMarshaler {
    fn convert<'t>(
        &'t self,
        types: &'t dyn TypeLookup,
    ) -> impl Fn(usize, Value) -> Result<Value, CoercionError> + 't {
        move |slot, value| coerce(value, &self.kinds[slot], types)
    }
}

impl Marshaler for PlanMarshaler {
    fn construct(&self) -> Object {
        self.layout.construct()
    }

    fn read(
        &self,
        wire: &Arc<ClassDefinition>,
        sealed: Vec<Value>,
        dynamic: Vec<(Arc<str>, Value)>,
        types: &dyn TypeLookup,
    ) -> Result<Object, AmfError> {
        self.layout.read(wire, sealed, dynamic, &self.convert(types))
    }

    fn write<'a>(
        &self,
        obj: &'a Object,
        types: &dyn TypeLookup,
    ) -> Result<Cow<'a, Object>, AmfError> {
        self.layout.write(obj, &self.convert(types))
    }

    fn conform(&self, obj: &Object, types: &dyn TypeLookup) -> Result<Object, AmfError> {
        self.layout.conform(obj, &self.convert(types))
    }
}

/// Build a compiled type through a rendered plan
pub(crate) fn build(desc: &TypeDescriptor) -> Result<CompiledType, CoercionError> {
    let source = render(desc);
    trace!(type_name = desc.name(), %source, "Rendered member plan");

    let program = compile(&source)?;
    let members = program.instructions.iter().map(|i| i.name.clone()).collect();
    let kinds: Vec<MemberKind> = program.instructions.into_iter().map(|i| i.kind).collect();
    let class = Arc::new(ClassDefinition::new(
        program.type_name,
        members,
        false,
        program.dynamic,
    ));

    let marshaler = PlanMarshaler {
        layout: Layout::new(class.clone(), kinds.clone()),
        kinds,
    };
    Ok(CompiledType::compiled(
        class,
        CompilerStrategy::Plan,
        Box::new(marshaler),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foo() -> TypeDescriptor {
        TypeDescriptor::new("com.example.Foo")
            .member("a", MemberKind::Integer)
            .member("tags", MemberKind::array_of(MemberKind::String))
            .dynamic()
    }

    #[test]
    fn test_render() {
        let source = render(&foo());
        assert_eq!(
            source,
            "type \"com.example.Foo\"\ndynamic\nmember 0 \"a\" Integer\nmember 1 \"tags\" Array<String>\n"
        );
    }

    #[test]
    fn test_compile_roundtrip() {
        let program = compile(&render(&foo())).unwrap();
        assert_eq!(program.type_name.as_ref(), "com.example.Foo");
        assert!(program.dynamic);
        assert_eq!(program.instructions.len(), 2);
        assert_eq!(
            program.instructions[1].kind,
            MemberKind::array_of(MemberKind::String)
        );
    }

    #[test]
    fn test_compile_rejects_malformed() {
        assert!(compile("member 0 \"a\" Integer\n").is_err());
        assert!(compile("type \"Foo\"\nmember 1 \"a\" Integer\n").is_err());
        assert!(compile("type \"Foo\"\nmember 0 \"a\" Float\n").is_err());
        assert!(compile("type \"Foo\"\nmember 0 \"a Integer\n").is_err());
        assert!(compile("type Foo\n").is_err());
        assert!(compile("type \"Foo\"\nfield a\n").is_err());
    }

    #[test]
    fn test_names_with_separators() {
        let desc = TypeDescriptor::new("odd \"type\"")
            .member("first name", MemberKind::String)
            .member("line\nbreak\\", MemberKind::Integer);
        let program = compile(&render(&desc)).unwrap();
        assert_eq!(program.type_name.as_ref(), "odd \"type\"");
        assert_eq!(program.instructions[0].name.as_ref(), "first name");
        assert_eq!(program.instructions[0].kind, MemberKind::String);
        assert_eq!(program.instructions[1].name.as_ref(), "line\nbreak\\");
        assert_eq!(program.instructions[1].kind, MemberKind::Integer);
    }

    #[test]
    fn test_typed_kinds_are_quoted() {
        let desc = TypeDescriptor::new("Holder")
            .member("owner", MemberKind::object_of("my type"))
            .member("all", MemberKind::array_of(MemberKind::object_of("a<b>")));
        let source = render(&desc);
        assert!(source.contains("member 0 \"owner\" Object<\"my type\">\n"));

        let program = compile(&source).unwrap();
        assert_eq!(program.instructions[0].kind, MemberKind::object_of("my type"));
        assert_eq!(
            program.instructions[1].kind,
            MemberKind::array_of(MemberKind::object_of("a<b>"))
        );
    }

    #[test]
    fn test_build_shape() {
        let compiled = build(&foo()).unwrap();
        let class = compiled.class_definition().unwrap();
        assert_eq!(class.name(), "com.example.Foo");
        assert_eq!(class.member_index("tags"), Some(1));
        assert!(class.is_dynamic());

        let obj = compiled.construct();
        assert_eq!(obj.get("a"), Some(&Value::Integer(0)));
        assert_eq!(obj.get("tags"), Some(&Value::Null));
    }
}
