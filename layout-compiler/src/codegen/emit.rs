use error_stack::{Result, ResultExt};

use super::{ident, Accessors, IdentSet, SlotIdents};
use crate::{
    BaseLayout, ClassData, LayoutError, LayoutTable, LookupFlags, MemberNames, Settings,
    VersionList,
};

/// Put the generated class modules together under the runtime import and
/// the version constants
pub fn emit_file(versions: &VersionList, settings: &Settings, classes: &[String]) -> String {
    let mut s = String::from("// Generated layout tables and accessors. Do not edit.\n\n");
    s.push_str(&format!("use {} as rt;\n\n", settings.runtime_path));
    s.push_str("/// Version markers, as indices into the layout tables\n");
    s.push_str("#[allow(non_upper_case_globals)]\n");
    s.push_str("pub mod version {\n");
    let mut used = IdentSet::new();
    for (id, name) in versions.iter() {
        s.push_str(&format!("    pub const {}: usize = {};\n", used.claim(name), id.index()));
    }
    s.push_str("}\n");
    for class in classes {
        s.push('\n');
        s.push_str(class);
    }
    s
}

/// Emit the module of one class: slot constants, the compiled table and the
/// accessor interface
pub fn emit_class(
    class: &ClassData,
    names: &MemberNames,
    versions: &VersionList,
    table: &LayoutTable,
) -> Result<String, LayoutError> {
    let slots = SlotIdents::new(names);
    let accessors = Accessors::collect(class, versions, &slots)
        .attach_printable_lazy(|| format!("While emitting `{}`", class.name))?;

    let mut body = String::new();
    body.push_str("#![allow(non_snake_case, non_upper_case_globals, dead_code)]\n");
    body.push_str("use super::rt;\n\n");
    body.push_str(&emit_members(&slots));
    body.push('\n');
    body.push_str(&emit_table(table, names, versions));
    body.push('\n');
    body.push_str(&emit_interface(&accessors));

    let mut s = format!("/// Layouts and accessors of `{}`\n", class.name);
    s.push_str(&format!("pub mod {} {{\n", ident(&class.name)));
    for line in body.lines() {
        if !line.is_empty() {
            s.push_str("    ");
            s.push_str(line);
        }
        s.push('\n');
    }
    s.push_str("}\n");
    Ok(s)
}

fn emit_members(slots: &SlotIdents) -> String {
    let mut s = String::from("/// Slot of each member name in the layout rows\n");
    s.push_str("pub mod member {\n");
    for (slot, name) in slots.iter().enumerate() {
        s.push_str(&format!("    pub const {name}: usize = {slot};\n"));
    }
    s.push_str(&format!("    pub const COUNT: usize = {};\n", slots.len()));
    s.push_str("}\n");
    s
}

fn flags_expr(flags: LookupFlags) -> &'static str {
    match (
        flags.contains(LookupFlags::PTR),
        flags.contains(LookupFlags::PADDING),
    ) {
        (false, false) => "rt::LookupFlags::empty()",
        (true, false) => "rt::LookupFlags::PTR",
        (false, true) => "rt::LookupFlags::PADDING",
        (true, true) => "rt::LookupFlags::PTR.union(rt::LookupFlags::PADDING)",
    }
}

fn emit_table(table: &LayoutTable, names: &MemberNames, versions: &VersionList) -> String {
    let groups = crate::swap_group_count(names.len());
    let mut s = format!("pub const SWAP_GROUPS: usize = {groups};\n");
    s.push_str(&format!(
        "pub const LOOKUP_FLAGS: rt::LookupFlags = {};\n",
        flags_expr(table.flags)
    ));
    s.push_str("pub type Layout = rt::ClassLayout<{ member::COUNT }, SWAP_GROUPS>;\n\n");
    s.push_str(&format!(
        "pub static LAYOUTS: [Layout; {}] = [\n",
        table.rows.len()
    ));
    for row in &table.rows {
        s.push_str(&format!(
            "    // {}..={} ({}-{})\n",
            versions.name(row.version_begin),
            versions.name(row.version_end),
            row.base_layout,
            row.pointer_width
        ));
        s.push_str("    Layout {\n");
        s.push_str(&format!(
            "        version_begin: {},\n",
            row.version_begin.index()
        ));
        s.push_str(&format!("        version_end: {},\n", row.version_end.index()));
        s.push_str(&format!("        ptr_size: {},\n", row.pointer_width.size()));
        s.push_str(&format!(
            "        gnu_layout: {},\n",
            row.base_layout == BaseLayout::Gnu
        ));
        s.push_str(&format!("        total_size: 0x{:x},\n", row.total_size));
        let offsets = row
            .offsets
            .iter()
            .map(|o| o.to_string())
            .collect::<Vec<_>>();
        s.push_str(&format!("        offsets: [{}],\n", offsets.join(", ")));
        let swaps = row
            .packed_swaps()
            .iter()
            .map(|g| format!("0x{:04x}", g))
            .collect::<Vec<_>>();
        s.push_str(&format!("        swaps: [{}],\n", swaps.join(", ")));
        s.push_str("    },\n");
    }
    s.push_str("];\n");
    s
}

fn emit_interface(accessors: &Accessors) -> String {
    let mut s = String::from(
        "\
pub struct Interface {
    data: *mut u8,
    layout: &'static Layout,
    lookup: rt::LayoutLookup,
}

impl Interface {
    /// Wrap `data` with the layout matching `lookup`, None if no layout matches
    pub fn new(data: *mut u8, lookup: rt::LayoutLookup) -> Option<Self> {
        let layout = rt::find_layout(&LAYOUTS, LOOKUP_FLAGS, &lookup)?;
        Some(Self { data, layout, lookup })
    }

    pub fn layout_data(&self) -> *mut u8 {
        self.data
    }

    pub fn layout_size(&self) -> usize {
        self.layout.total_size
    }

    /// Version index the layout was looked up with
    pub fn layout_version(&self) -> usize {
        self.lookup.version
    }

    /// Offset of the slot in the active layout, None if absent
    pub fn slot_offset(&self, slot: usize) -> Option<usize> {
        let off = self.layout.offsets[slot];
        if off < 0 {
            None
        } else {
            Some(off as usize)
        }
    }

    fn slot_ptr(&self, slot: usize) -> *mut u8 {
        match self.slot_offset(slot) {
            Some(off) if !self.data.is_null() => unsafe { self.data.add(off) },
            _ => std::ptr::null_mut(),
        }
    }

    fn slot_deref(&self, slot: usize) -> *mut u8 {
        let p = self.slot_ptr(slot);
        if p.is_null() {
            return p;
        }
        unsafe { rt::read_pointer(p, &self.lookup) }
    }
",
    );
    for (_, body) in accessors.methods() {
        s.push('\n');
        s.push_str(&body);
    }
    s.push_str("}\n");
    s
}
