use std::collections::{BTreeMap, HashMap, HashSet};

use derivative::Derivative;
use error_stack::{report, Result, ResultExt};

use crate::{ClassData, LayoutError, MemberNames, PatchItem, Shape, VersionList};

/// Placeholder for the method name in a rendered accessor
pub const METHOD: &str = "@METHOD@";

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut",
    "pub", "ref", "return", "static", "struct", "trait", "true", "type", "unsafe", "use",
    "where", "while", "abstract", "become", "box", "do", "final", "gen", "macro", "override",
    "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Turn a schema name into a Rust identifier
pub fn ident(name: &str) -> String {
    let mut out = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    match out.as_str() {
        "self" | "Self" | "super" | "crate" => out.push('_'),
        s if KEYWORDS.contains(&s) => out.insert_str(0, "r#"),
        _ => {}
    }
    out
}

fn bare(name: &str) -> &str {
    name.strip_prefix("r#").unwrap_or(name)
}

/// Methods every generated `Interface` defines besides the accessors
pub const INTERFACE_HELPERS: &[&str] = &[
    "new",
    "layout_data",
    "layout_size",
    "layout_version",
    "slot_offset",
    "slot_ptr",
    "slot_deref",
];

/// Identifiers taken in one generated scope
#[derive(Derivative, Debug, Clone)]
#[derivative(Default(new = "true"))]
pub struct IdentSet {
    used: HashSet<String>,
}

impl IdentSet {
    pub fn with_reserved(reserved: &[&str]) -> Self {
        Self {
            used: reserved.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Identifier for `wanted`, with `_` appended until it is not taken
    pub fn claim(&mut self, wanted: &str) -> String {
        let mut name = ident(wanted);
        while self.used.contains(bare(&name)) {
            name = format!("{}_", bare(&name));
        }
        self.used.insert(bare(&name).to_string());
        name
    }
}

/// Constant of every slot in the generated `member` module
#[derive(Debug, Clone)]
pub struct SlotIdents {
    idents: Vec<String>,
    slots: HashMap<String, usize>,
}

impl SlotIdents {
    pub fn new(names: &MemberNames) -> Self {
        let mut used = IdentSet::with_reserved(&["COUNT"]);
        let idents = names.iter().map(|n| used.claim(n)).collect();
        let slots = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), i))
            .collect();
        Self { idents, slots }
    }

    /// Constant names in slot order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.idents.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.idents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idents.is_empty()
    }

    /// Path of the slot constant from inside the generated class module
    pub fn slot_ref(&self, name: &str) -> Result<String, LayoutError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| report!(LayoutError::UnknownSlot(name.to_string())))?;
        Ok(format!("member::{}", self.idents[*slot]))
    }
}

/// Accessor bodies keyed by method name.
///
/// The first distinct rendering of a method keeps the plain name. Every later
/// rendering that differs gets the name of the version it first appeared in
/// as suffix. Registration order decides which rendering is plain.
#[derive(Derivative, Debug, Clone)]
#[derivative(Default(new = "true"))]
pub struct MethodRegistry {
    order: Vec<String>,
    /// (version, template) per method, distinct templates only
    renderings: HashMap<String, Vec<(String, String)>>,
}

impl MethodRegistry {
    /// Register a rendering. `template` uses [`METHOD`] for the method name
    pub fn add(&mut self, method: &str, version: &str, template: String) {
        if !self.renderings.contains_key(method) {
            self.order.push(method.to_string());
        }
        let list = self.renderings.entry(method.to_string()).or_default();
        if list.iter().any(|(_, t)| *t == template) {
            return;
        }
        list.push((version.to_string(), template));
    }

    /// Final (name, body) pairs, in registration order
    pub fn methods(&self) -> Vec<(String, String)> {
        name_methods(&[self], &mut IdentSet::new())
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Name and render the methods of several registries sharing one scope.
///
/// Plain names are claimed for every registry before any suffixed name, so
/// a suffixed overload never takes the name of a plain method.
pub fn name_methods(registries: &[&MethodRegistry], used: &mut IdentSet) -> Vec<(String, String)> {
    let plain = registries
        .iter()
        .map(|r| r.order.iter().map(|m| used.claim(m)).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    let later = registries
        .iter()
        .map(|r| {
            r.order
                .iter()
                .map(|m| match r.renderings.get(m) {
                    Some(list) => list
                        .iter()
                        .skip(1)
                        .map(|(version, _)| used.claim(&format!("{m}_{version}")))
                        .collect::<Vec<_>>(),
                    None => Vec::new(),
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let mut out = Vec::new();
    for ((registry, plain), later) in registries.iter().zip(plain).zip(later) {
        for ((method, name), later) in registry.order.iter().zip(plain).zip(later) {
            let Some(list) = registry.renderings.get(method) else {
                continue;
            };
            let names = std::iter::once(name).chain(later);
            for ((_, template), name) in list.iter().zip(names) {
                let body = template.replace(METHOD, &name);
                out.push((name, body));
            }
        }
    }
    out
}

/// Every distinct entry (member or base) a name has across the versions, in
/// version order, keyed by slot name
pub type UniqueEntries = BTreeMap<String, Vec<(String, PatchItem)>>;

pub fn collect_unique_entries(
    class: &ClassData,
    versions: &VersionList,
) -> Result<UniqueEntries, LayoutError> {
    let mut out = UniqueEntries::new();
    for (id, version) in versions.iter() {
        let (bases, members) = class
            .entries_at(versions, id)
            .attach_printable_lazy(|| format!("While collecting accessors of `{}`", class.name))?;
        let items = bases
            .into_iter()
            .map(|b| (b.slot_name(), PatchItem::Base(b)))
            .chain(
                members
                    .into_iter()
                    .map(|m| (m.name.clone(), PatchItem::Member(m))),
            );
        for (name, item) in items {
            let list = out.entry(name).or_default();
            if !list.iter().any(|(_, seen)| *seen == item) {
                list.push((version.to_string(), item));
            }
        }
    }
    Ok(out)
}

/// Getters and setters of one class
#[derive(Derivative, Debug, Clone)]
#[derivative(Default(new = "true"))]
pub struct Accessors {
    pub getters: MethodRegistry,
    pub setters: MethodRegistry,
}

impl Accessors {
    pub fn collect(
        class: &ClassData,
        versions: &VersionList,
        slots: &SlotIdents,
    ) -> Result<Self, LayoutError> {
        let mut out = Self::new();
        for (name, entries) in collect_unique_entries(class, versions)? {
            let slot = slots.slot_ref(&name)?;
            for (version, item) in entries {
                match item {
                    PatchItem::Base(base) => {
                        out.getters.add(
                            &format!("base_{}", base.name()),
                            &version,
                            render_class_get(&slot, base.name()),
                        );
                    }
                    PatchItem::Member(member) => {
                        out.add_member(&name, &slot, &version, &member.shape);
                    }
                }
            }
        }
        Ok(out)
    }

    fn add_member(&mut self, name: &str, slot: &str, version: &str, shape: &Shape) {
        match shape {
            Shape::Prim(_) | Shape::Named(_) => {
                let ty = rust_type(shape);
                self.getters.add(name, version, render_plain_get(slot, &ty));
                self.setters
                    .add(&format!("set_{name}"), version, render_plain_set(slot, &ty));
            }
            Shape::Class(class) => {
                self.getters
                    .add(name, version, render_class_get(slot, &class.name));
            }
            Shape::Template(_) => {
                self.getters
                    .add(name, version, render_template_get(slot, &rust_type(shape)));
            }
            Shape::Pointer(to) => {
                self.getters.add(
                    &format!("{name}_ptr"),
                    version,
                    render_pointer_get(slot, &rust_type(to)),
                );
                self.getters.add(name, version, render_deref_get(slot, to));
            }
            Shape::InlineArray(elem, count) => {
                let body = if elem.is_plain() {
                    render_slice_get(slot, &rust_type(elem), *count)
                } else {
                    render_span_get(slot, &rust_type(elem), *count)
                };
                self.getters.add(name, version, body);
            }
        }
    }

    /// Final (name, body) pairs, getters first. Names never repeat and never
    /// take one of the [`INTERFACE_HELPERS`]
    pub fn methods(&self) -> Vec<(String, String)> {
        let mut used = IdentSet::with_reserved(INTERFACE_HELPERS);
        name_methods(&[&self.getters, &self.setters], &mut used)
    }
}

/// Rust type of a shape, as seen from inside a generated class module
pub fn rust_type(shape: &Shape) -> String {
    match shape {
        Shape::Prim(p) if p.is_scalar() => p.to_string(),
        Shape::Prim(p) => format!("rt::{p}"),
        Shape::Named(n) => format!("super::{}", ident(&n.name)),
        Shape::Pointer(to) => format!("rt::Pointer<{}>", rust_type(to)),
        Shape::InlineArray(elem, count) => format!("[{}; {count}]", rust_type(elem)),
        Shape::Template(link) => {
            let args = link.args.iter().map(rust_type).collect::<Vec<_>>();
            format!("super::{}<{}>", ident(&link.name), args.join(", "))
        }
        Shape::Class(class) => format!("super::{}::Interface", ident(&class.name)),
    }
}

fn render_plain_get(slot: &str, ty: &str) -> String {
    let mut s = format!("    pub fn {METHOD}(&self) -> {ty} {{\n");
    s.push_str(&format!("        let p = self.slot_ptr({slot});\n"));
    s.push_str("        if p.is_null() {\n");
    s.push_str("            return Default::default();\n");
    s.push_str("        }\n");
    s.push_str(&format!(
        "        unsafe {{ rt::read::<{ty}>(p, self.layout.swap({slot}), &self.lookup) }}\n"
    ));
    s.push_str("    }\n");
    s
}

fn render_plain_set(slot: &str, ty: &str) -> String {
    let mut s = format!("    pub fn {METHOD}(&mut self, value: {ty}) {{\n");
    s.push_str(&format!("        let p = self.slot_ptr({slot});\n"));
    s.push_str("        if p.is_null() {\n");
    s.push_str("            return;\n");
    s.push_str("        }\n");
    s.push_str(&format!(
        "        unsafe {{ rt::write::<{ty}>(p, value, self.layout.swap({slot}), &self.lookup) }}\n"
    ));
    s.push_str("    }\n");
    s
}

fn render_class_get(slot: &str, class: &str) -> String {
    let class = ident(class);
    let mut s = format!("    pub fn {METHOD}(&self) -> Option<super::{class}::Interface> {{\n");
    s.push_str(&format!("        let p = self.slot_ptr({slot});\n"));
    s.push_str("        if p.is_null() {\n");
    s.push_str("            return None;\n");
    s.push_str("        }\n");
    s.push_str(&format!(
        "        super::{class}::Interface::new(p, self.lookup)\n"
    ));
    s.push_str("    }\n");
    s
}

fn render_template_get(slot: &str, decl: &str) -> String {
    let mut s = format!("    pub fn {METHOD}(&self) -> {decl} {{\n");
    s.push_str(&format!(
        "        <{decl}>::new(self.slot_ptr({slot}), self.lookup)\n"
    ));
    s.push_str("    }\n");
    s
}

fn render_pointer_get(slot: &str, target: &str) -> String {
    let mut s = format!("    pub fn {METHOD}(&self) -> rt::Pointer<{target}> {{\n");
    s.push_str(&format!(
        "        rt::Pointer::new(self.slot_ptr({slot}), self.lookup)\n"
    ));
    s.push_str("    }\n");
    s
}

fn render_deref_get(slot: &str, to: &Shape) -> String {
    match to {
        Shape::Prim(_) | Shape::Named(_) => {
            let ty = rust_type(to);
            let mut s = format!("    pub fn {METHOD}(&self) -> *mut {ty} {{\n");
            s.push_str(&format!("        self.slot_deref({slot}) as *mut {ty}\n"));
            s.push_str("    }\n");
            s
        }
        Shape::Class(class) => {
            let class = ident(&class.name);
            let mut s =
                format!("    pub fn {METHOD}(&self) -> Option<super::{class}::Interface> {{\n");
            s.push_str(&format!("        let p = self.slot_deref({slot});\n"));
            s.push_str("        if p.is_null() {\n");
            s.push_str("            return None;\n");
            s.push_str("        }\n");
            s.push_str(&format!(
                "        super::{class}::Interface::new(p, self.lookup)\n"
            ));
            s.push_str("    }\n");
            s
        }
        _ => {
            let mut s = format!("    pub fn {METHOD}(&self) -> *mut u8 {{\n");
            s.push_str(&format!("        self.slot_deref({slot})\n"));
            s.push_str("    }\n");
            s
        }
    }
}

fn render_slice_get(slot: &str, ty: &str, count: usize) -> String {
    let mut s = format!("    pub fn {METHOD}(&self) -> &[{ty}] {{\n");
    s.push_str(&format!("        let p = self.slot_ptr({slot});\n"));
    s.push_str("        if p.is_null() {\n");
    s.push_str("            return &[];\n");
    s.push_str("        }\n");
    s.push_str(&format!(
        "        unsafe {{ std::slice::from_raw_parts(p as *const {ty}, {count}) }}\n"
    ));
    s.push_str("    }\n");
    s
}

fn render_span_get(slot: &str, decl: &str, count: usize) -> String {
    let mut s = format!("    pub fn {METHOD}(&self) -> rt::LayoutedSpan<{decl}> {{\n");
    s.push_str(&format!(
        "        rt::LayoutedSpan::<{decl}>::new(self.slot_ptr({slot}), self.lookup, {count})\n"
    ));
    s.push_str("    }\n");
    s
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{ClassPatch, NamedType, SwapClass, TypePrim};

    fn names(registry: &MethodRegistry) -> Vec<String> {
        registry.methods().into_iter().map(|(n, _)| n).collect()
    }

    fn accessors(class: &ClassData, versions: &VersionList) -> Accessors {
        let slots = SlotIdents::new(&MemberNames::collect(class));
        Accessors::collect(class, versions, &slots).unwrap()
    }

    #[test]
    fn identifiers_are_escaped() {
        assert_eq!(ident("foo"), "foo");
        assert_eq!(ident("type"), "r#type");
        assert_eq!(ident("self"), "self_");
        assert_eq!(ident("1.5.0"), "_1_5_0");
        assert_eq!(ident("a-b"), "a_b");
    }

    #[test]
    fn claimed_identifiers_never_repeat() {
        let mut used = IdentSet::with_reserved(&["COUNT"]);
        assert_eq!(used.claim("a_b"), "a_b");
        assert_eq!(used.claim("a-b"), "a_b_");
        assert_eq!(used.claim("a b"), "a_b__");
        assert_eq!(used.claim("COUNT"), "COUNT_");
        assert_eq!(used.claim("type"), "r#type");
        assert_eq!(used.claim("type"), "type_");
        assert_eq!(used.claim("self"), "self_");
        assert_eq!(used.claim("self"), "self__");
    }

    #[test]
    fn slot_constants_are_unique() {
        let class = ClassData::new("Foo")
            .with_member("a_b", TypePrim::U8)
            .with_member("a-b", TypePrim::U8)
            .with_member("COUNT", TypePrim::U8);
        let slots = SlotIdents::new(&MemberNames::collect(&class));
        assert_eq!(slots.iter().collect::<Vec<_>>(), ["COUNT_", "a_b", "a_b_"]);
        assert_eq!(slots.slot_ref("a-b").unwrap(), "member::a_b");
        assert_eq!(slots.slot_ref("a_b").unwrap(), "member::a_b_");
        let err = slots.slot_ref("nope").unwrap_err();
        assert!(matches!(err.current_context(), LayoutError::UnknownSlot(n) if n == "nope"));
    }

    #[test]
    fn registry_suffixes_divergent_renderings() {
        let mut registry = MethodRegistry::new();
        registry.add("x", "V1", format!("fn {METHOD}() -> u8"));
        registry.add("x", "V2", format!("fn {METHOD}() -> u8"));
        registry.add("x", "V3", format!("fn {METHOD}() -> u16"));
        registry.add("a", "V1", format!("fn {METHOD}()"));
        let methods = registry.methods();
        assert_eq!(
            methods,
            vec![
                ("x".to_string(), "fn x() -> u8".to_string()),
                ("x_V3".to_string(), "fn x_V3() -> u16".to_string()),
                ("a".to_string(), "fn a()".to_string()),
            ]
        );
    }

    #[test]
    fn unique_entries_keep_each_shape_once() {
        let versions = VersionList::new(["V1", "V2", "V3"]).unwrap();
        let class = ClassData::new("Foo")
            .with_member("a", TypePrim::U8)
            .with_member("b", TypePrim::U32)
            .with_patch(ClassPatch::new("V2").replace([PatchItem::member("a", TypePrim::U16)]))
            .with_patch(ClassPatch::new("V3").delete_member("b"));
        let entries = collect_unique_entries(&class, &versions).unwrap();
        let a = &entries["a"];
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].0, "V1");
        assert_eq!(a[1].0, "V2");
        assert_eq!(entries["b"].len(), 1);
    }

    #[test]
    fn changed_member_gets_versioned_accessor() {
        let versions = VersionList::new(["V1", "V2"]).unwrap();
        let class = ClassData::new("Foo")
            .with_member("a", TypePrim::U8)
            .with_member("b", TypePrim::F32)
            .with_patch(ClassPatch::new("V2").replace([PatchItem::member("a", TypePrim::U16)]));
        let accessors = accessors(&class, &versions);
        assert_eq!(names(&accessors.getters), ["a", "a_V2", "b"]);
        assert_eq!(names(&accessors.setters), ["set_a", "set_a_V2", "set_b"]);
        let methods = accessors.getters.methods();
        assert!(methods[0].1.contains("pub fn a(&self) -> u8"));
        assert!(methods[1].1.contains("pub fn a_V2(&self) -> u16"));
        assert!(methods[1].1.contains("return Default::default();"));
    }

    #[test]
    fn accessor_names_do_not_collide() {
        let versions = VersionList::new(["V1", "V2"]).unwrap();
        let class = ClassData::new("Foo")
            .with_member("data", TypePrim::U64)
            .with_member("size", TypePrim::U32)
            .with_member("m", TypePrim::U8)
            .with_member("slot_ptr", TypePrim::U8)
            .with_member("a", TypePrim::U8)
            .with_member("a_V2", TypePrim::U8)
            .with_member("b", TypePrim::U8)
            .with_member("set_b", TypePrim::U8)
            .with_patch(ClassPatch::new("V2").replace([PatchItem::member("a", TypePrim::U16)]));
        let methods = accessors(&class, &versions).methods();
        let names = methods.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "a", "a_V2_", "a_V2", "b", "data", "m", "set_b", "size", "slot_ptr_",
                "set_a", "set_a_V2_", "set_a_V2", "set_b_", "set_data", "set_m", "set_set_b",
                "set_size", "set_slot_ptr",
            ]
        );
        let unique = names.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), names.len());
        assert!(names.iter().all(|n| !INTERFACE_HELPERS.contains(n)));
        assert!(methods[1].1.contains("pub fn a_V2_(&self) -> u16"));
        assert!(methods[8].1.contains("pub fn slot_ptr_(&self) -> u8"));
        assert!(methods[12].1.contains("pub fn set_b_(&mut self, value: u8)"));
    }

    #[test]
    fn setter_skips_absent_member() {
        let versions = VersionList::new(["V1"]).unwrap();
        let class = ClassData::new("Foo").with_member("x", TypePrim::U32);
        let methods = accessors(&class, &versions).setters.methods();
        let expected = [
            "    pub fn set_x(&mut self, value: u32) {",
            "        let p = self.slot_ptr(member::x);",
            "        if p.is_null() {",
            "            return;",
            "        }",
            "        unsafe { rt::write::<u32>(p, value, self.layout.swap(member::x), &self.lookup) }",
            "    }",
        ];
        assert_eq!(methods[0].1.lines().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn pointer_gets_raw_and_deref_accessors() {
        let versions = VersionList::new(["V1"]).unwrap();
        let inner = Arc::new(ClassData::new("Inner").with_member("x", TypePrim::U8));
        let class = ClassData::new("Foo")
            .with_member("p", Shape::pointer(TypePrim::U32))
            .with_member("q", Shape::pointer(inner.clone()))
            .with_member("r", Shape::pointer(Shape::pointer(TypePrim::U8)));
        let accessors = accessors(&class, &versions);
        let methods = accessors.getters.methods();
        let find = |name: &str| {
            methods
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, b)| b.clone())
                .unwrap()
        };
        assert!(find("p_ptr").contains("-> rt::Pointer<u32>"));
        assert!(find("p").contains("-> *mut u32"));
        assert!(find("q").contains("-> Option<super::Inner::Interface>"));
        assert!(find("r").contains("-> *mut u8"));
        assert!(accessors.setters.is_empty());
    }

    #[test]
    fn arrays_templates_and_bases() {
        let versions = VersionList::new(["V1"]).unwrap();
        let base = Arc::new(ClassData::new("Base"));
        let half = NamedType::new("Half", 2, 2, SwapClass::S16).unwrap();
        let class = ClassData::new("Foo")
            .with_base(base)
            .with_member("plain", Shape::array(TypePrim::F32, 3))
            .with_member("nested", Shape::array(Shape::pointer(TypePrim::U8), 2))
            .with_member("t", Shape::template("Wrapper", vec![half.clone().into()]))
            .with_member("h", half);
        let accessors = accessors(&class, &versions);
        let methods = accessors.getters.methods();
        let body = |name: &str| {
            methods
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, b)| b.clone())
                .unwrap()
        };
        assert!(body("base_Base").contains("self.slot_ptr(member::baseBase)"));
        assert!(body("plain").contains("-> &[f32]"));
        assert!(body("plain").contains("from_raw_parts(p as *const f32, 3)"));
        assert!(body("nested").contains("rt::LayoutedSpan::<rt::Pointer<u8>>::new"));
        assert!(body("t").contains("<super::Wrapper<super::Half>>::new(self.slot_ptr(member::t), self.lookup)"));
        assert!(body("h").contains("rt::read::<super::Half>"));
        assert_eq!(names(&accessors.setters), ["set_h"]);
    }
}
