//! Registration source generation.
//!
//! Output depends only on the registry contents: every map is ordered and
//! nothing time- or host-dependent is written, so identical input yields
//! byte-identical output.

use crate::config::Config;
use crate::merge::GlobalRegistry;
use crate::meta::{ClassRecord, EnumRecord};

const INDENT: &str = "    ";

/// Knobs for the generated unit.
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Header declaring `Class`, `Enum`, and the registries.
    pub runtime_header: String,
    /// Namespace the registrations live in.
    pub namespace: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            runtime_header: "rain/rain.h".to_string(),
            namespace: "rain::rtti".to_string(),
        }
    }
}

impl CodegenOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            runtime_header: config.runtime_header.clone(),
            namespace: config.namespace.clone(),
        }
    }
}

struct Writer {
    out: String,
    depth: usize,
}

impl Writer {
    fn line(&mut self, text: &str) {
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }
}

/// Render the registration unit for a linked registry.
pub fn render(registry: &GlobalRegistry, options: &CodegenOptions) -> String {
    let mut w = Writer {
        out: String::new(),
        depth: 0,
    };

    w.line("// Autogenerated by rain-rtti. Do not edit.");
    w.line(&format!("#include <{}>", options.runtime_header));
    w.blank();
    for include in &registry.includes {
        w.line(&format!("#include {}", quote(include)));
    }

    // offsetof on non-standard-layout types
    w.blank();
    w.line("#ifdef __GNUC__");
    w.line("#pragma GCC diagnostic ignored \"-Winvalid-offsetof\"");
    w.line("#endif");

    w.blank();
    w.line(&format!("namespace {}", options.namespace));
    w.line("{");
    w.nested(|w| {
        w.line("// One Definition Rule: Ensure registries are initialized first.");
        w.line("static const auto& _class = Registry<Class>::registry;");
        w.line("static const auto& _enums = Registry<Enum>::registry;");
        w.blank();

        for (key, class) in &registry.classes {
            write_class(w, registry, key, class);
        }
        for (key, record) in &registry.enums {
            write_enum(w, key, record);
        }
    });
    w.line("}");

    w.out
}

fn write_class(w: &mut Writer, registry: &GlobalRegistry, key: &str, class: &ClassRecord) {
    w.line(&format!("// {}", class.location));
    w.line("template <>");
    w.line(&format!("Class& ClassDef<{}> = Class::Register(Class {{", key));
    w.nested(|w| {
        w.line(&format!(".name = {},", quote(&class.name)));
        w.line(&format!(".displayName = {},", quote(&class.display_name)));
        w.line(&format!(".type = {},", class.type_id));
        w.line(&format!(".size = {},", class.size));

        if !class.fields.is_empty() {
            w.line(".fields = {");
            w.nested(|w| {
                for field in &class.fields {
                    w.line(&format!(
                        "{{ {}, {}, {}, {} }},",
                        quote(&field.name),
                        quote(&field.display_name),
                        field.type_id,
                        field.offset
                    ));
                }
            });
            w.line("},");
        }

        let methods: Vec<_> = class.methods.iter().filter(|m| !m.is_operator()).collect();
        if !methods.is_empty() {
            w.line(".methods = {");
            w.nested(|w| {
                for method in methods {
                    let args: Vec<String> =
                        method.args.iter().map(|a| format!("TypeID<{}>", a)).collect();
                    w.line(&format!(
                        "Method {{ {}, {}, MEMBER_FUNCTION({}), TypeID<{}>, {{{}}} }},",
                        quote(&method.name),
                        quote(&method.display_name),
                        method.pointer,
                        method.result,
                        args.join(", ")
                    ));
                }
            });
            w.line("},");
        }

        let bases: Vec<String> = match registry.bases.get(key) {
            Some(links) => links.iter().map(|l| type_hash(l.type_name())).collect(),
            None => class.bases.iter().map(|b| type_hash(b)).collect(),
        };
        if !bases.is_empty() {
            w.line(&format!(".bases = {{ {} }},", bases.join(", ")));
        }

        if !class.derived.is_empty() {
            let derived: Vec<String> = class.derived.iter().map(|d| type_hash(d)).collect();
            w.line(&format!(".derived = {{ {} }},", derived.join(", ")));
        }
    });
    w.line("});");
    w.blank();
}

fn write_enum(w: &mut Writer, key: &str, record: &EnumRecord) {
    w.line(&format!("// {}", record.location));
    w.line("template <>");
    w.line(&format!("Enum& EnumDef<{}> = Enum::Register(Enum {{", key));
    w.nested(|w| {
        w.line(&format!(".name = {},", quote(&record.name)));
        w.line(&format!(".displayName = {},", quote(&record.display_name)));
        w.line(&format!(".type = {},", record.type_id));
        w.line(&format!(".size = {},", record.size));
        w.line(&format!(".underlyingType = {},", record.underlying_type));
        w.line(&format!(".scoped = {},", record.scoped));

        w.line(".values = {");
        w.nested(|w| {
            for value in &record.values {
                w.line(&format!("{{ {}, uintmax({}::{}) }},", quote(&value.name), key, value.name));
            }
        });
        w.line("},");

        w.line(".names = {");
        w.nested(|w| {
            for name in record.reverse_index().values() {
                w.line(&format!("{{ uintmax({}::{}), {} }},", key, name, quote(name)));
            }
        });
        w.line("}");
    });
    w.line("});");
    w.blank();
}

fn type_hash(name: &str) -> String {
    format!("TypeHash<{}>", name)
}

/// A C++ string literal.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
