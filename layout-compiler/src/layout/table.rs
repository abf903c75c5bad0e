use std::sync::Arc;

use bitflags::bitflags;
use error_stack::{Result, ResultExt};

use super::{resolve, MemberNames, Pool, ResolvedLayout};
use crate::{
    Abi, BaseLayout, ClassData, LayoutCtx, LayoutError, PointerWidth, Settings, SwapClass,
    VersionId, VersionList,
};

/// Number of swap codes packed into one group
pub const SWAP_GROUP: usize = 8;

bitflags! {
    /// Axes besides the version that a table lookup has to match on
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LookupFlags: u8 {
        /// Rows differ by pointer width
        const PTR = 1;
        /// Rows differ by base class layout
        const PADDING = 2;
    }
}

/// One compiled layout, shared by a range of versions under one ABI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutRow {
    pub version_begin: VersionId,
    /// Last version of the range, inclusive
    pub version_end: VersionId,
    pub pointer_width: PointerWidth,
    pub base_layout: BaseLayout,
    pub total_size: usize,
    /// Begin offset per name slot, -1 if absent
    pub offsets: Vec<i32>,
    pub swaps: Vec<SwapClass>,
}

impl LayoutRow {
    fn new(version: VersionId, abi: Abi, resolved: ResolvedLayout) -> Self {
        Self {
            version_begin: version,
            version_end: version,
            pointer_width: abi.pointer_width,
            base_layout: abi.base_layout,
            total_size: resolved.total_size,
            offsets: resolved.offsets,
            swaps: resolved.swaps,
        }
    }

    /// If both rows describe the same bytes, regardless of versions and ABI
    pub fn same_layout(&self, other: &Self) -> bool {
        self.total_size == other.total_size
            && self.offsets == other.offsets
            && self.swaps == other.swaps
    }

    #[inline]
    pub fn covers(&self, version: VersionId) -> bool {
        self.version_begin <= version && version <= self.version_end
    }

    /// Offset of the slot, None if absent
    pub fn offset(&self, slot: usize) -> Option<usize> {
        let off = *self.offsets.get(slot)?;
        usize::try_from(off).ok()
    }

    pub fn packed_swaps(&self) -> Vec<u16> {
        pack_swaps(&self.swaps)
    }
}

/// Runtime query for a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutLookup {
    pub version: VersionId,
    pub pointer_width: PointerWidth,
    pub base_layout: BaseLayout,
}

/// Compiled offset table of one class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTable {
    /// Ordered by (version_begin, pointer_width, base_layout)
    pub rows: Vec<LayoutRow>,
    pub flags: LookupFlags,
}

impl LayoutTable {
    /// Resolve every version under every requested ABI and compile the rows
    pub fn build(
        class: &Arc<ClassData>,
        names: &Arc<MemberNames>,
        versions: &Arc<VersionList>,
        settings: &Settings,
    ) -> Result<Self, LayoutError> {
        let groups = RowGroups::resolve(class, names, versions, settings)
            .attach_printable_lazy(|| format!("While building table for `{}`", class.name))?;
        let table = groups.into_table();
        tracing::info!(
            "table for `{}`: {} slots, {} rows, flags {:?}",
            class.name,
            names.len(),
            table.rows.len(),
            table.flags
        );
        Ok(table)
    }

    /// Find the row for the query. Pointer width and base layout are only
    /// compared if the table depends on them
    pub fn find(&self, lookup: &LayoutLookup) -> Option<&LayoutRow> {
        self.rows.iter().find(|row| {
            row.covers(lookup.version)
                && (!self.flags.contains(LookupFlags::PTR)
                    || row.pointer_width == lookup.pointer_width)
                && (!self.flags.contains(LookupFlags::PADDING)
                    || row.base_layout == lookup.base_layout)
        })
    }
}

/// Per-version rows of every requested (base layout, pointer width) pair,
/// before deduplication and compaction
struct RowGroups {
    /// Indexed by [base layout][pointer width][version]
    rows: Vec<Vec<Vec<LayoutRow>>>,
}

struct RowJob {
    group: (usize, usize),
    class: Arc<ClassData>,
    names: Arc<MemberNames>,
    versions: Arc<VersionList>,
    abi: Abi,
}

fn resolve_group(job: RowJob) -> ((usize, usize), Result<Vec<LayoutRow>, LayoutError>) {
    let rows = (|| -> Result<Vec<LayoutRow>, LayoutError> {
        let mut rows = Vec::with_capacity(job.versions.len());
        for (version, _) in job.versions.iter() {
            let ctx = LayoutCtx {
                versions: &job.versions,
                version,
                abi: job.abi,
            };
            let resolved = resolve(&job.class, &job.names, &ctx)?;
            rows.push(LayoutRow::new(version, job.abi, resolved));
        }
        Ok(rows)
    })();
    (job.group, rows)
}

impl RowGroups {
    fn resolve(
        class: &Arc<ClassData>,
        names: &Arc<MemberNames>,
        versions: &Arc<VersionList>,
        settings: &Settings,
    ) -> Result<Self, LayoutError> {
        let layouts = settings.base_layouts();
        let widths = settings.pointer_widths();
        let mut jobs = Vec::with_capacity(layouts.len() * widths.len());
        for (li, &layout) in layouts.iter().enumerate() {
            for (wi, &width) in widths.iter().enumerate() {
                let mut abi = Abi::new(width, layout);
                abi.swap_pointers = !settings.ignore_pointer_endianness;
                jobs.push(RowJob {
                    group: (li, wi),
                    class: Arc::clone(class),
                    names: Arc::clone(names),
                    versions: Arc::clone(versions),
                    abi,
                });
            }
        }

        let mut rows = Vec::with_capacity(layouts.len());
        let mut outputs = Pool::run(jobs, resolve_group)?.into_iter();
        for _ in &layouts {
            let mut group = Vec::with_capacity(widths.len());
            for ((li, wi), result) in outputs.by_ref().take(widths.len()) {
                group.push(
                    result.attach_printable_lazy(|| format!("Under {}-{}", layouts[li], widths[wi]))?,
                );
            }
            rows.push(group);
        }
        Ok(Self { rows })
    }

    /// Drop copies that do not depend on an axis, then compact
    fn into_table(self) -> LayoutTable {
        let mut rows = self.rows;
        let mut flags = LookupFlags::empty();

        // pointer width, decided across every base layout at once so that
        // all remaining groups agree on whether the width is part of the key
        if rows.iter().all(|g| g.len() == 2) && !rows.is_empty() {
            if rows.iter().all(|g| same_rows(&g[0], &g[1])) {
                for group in &mut rows {
                    group.truncate(1);
                }
            } else {
                flags |= LookupFlags::PTR;
            }
        }

        if rows.len() == 2 {
            let independent = rows[0].len() == rows[1].len()
                && rows[0]
                    .iter()
                    .zip(rows[1].iter())
                    .all(|(a, b)| same_rows(a, b));
            if independent {
                rows.truncate(1);
            } else {
                flags |= LookupFlags::PADDING;
            }
        }

        let mut rows = compact(rows.into_iter().flatten().flatten());
        rows.sort_by_key(|r| (r.version_begin, r.pointer_width, r.base_layout));
        LayoutTable { rows, flags }
    }
}

fn same_rows(a: &[LayoutRow], b: &[LayoutRow]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_layout(y))
}

/// Merge each row into the previous one when their version ranges touch
/// and their layouts are the same.
///
/// Only looks at the previous output row, so the input must be sorted by
/// version within each ABI group.
fn compact(rows: impl IntoIterator<Item = LayoutRow>) -> Vec<LayoutRow> {
    let mut out: Vec<LayoutRow> = Vec::new();
    for row in rows {
        if let Some(last) = out.last_mut() {
            if last.offsets.len() != row.offsets.len() || last.swaps.len() != row.swaps.len() {
                panic!(
                    "Rows with different slot counts in one table: {} != {}",
                    last.offsets.len(),
                    row.offsets.len()
                );
            }
            let touches = row.version_begin >= last.version_end
                && row.version_begin.index() <= last.version_end.index() + 1;
            if touches
                && last.pointer_width == row.pointer_width
                && last.base_layout == row.base_layout
                && last.same_layout(&row)
            {
                #[cfg(feature = "debug-compact")]
                {
                    tracing::trace!(
                        "merge version {} into row {}..={} ({}-{})",
                        row.version_begin.index(),
                        last.version_begin.index(),
                        last.version_end.index(),
                        last.base_layout,
                        last.pointer_width
                    );
                }
                last.version_end = last.version_end.max(row.version_end);
                continue;
            }
        }
        tracing::debug!(
            "new row at version {} ({}-{}), size=0x{:x}",
            row.version_begin.index(),
            row.base_layout,
            row.pointer_width,
            row.total_size
        );
        out.push(row);
    }
    out
}

/// Number of packed groups for `count` slots
pub fn swap_group_count(count: usize) -> usize {
    count.div_ceil(SWAP_GROUP)
}

/// Pack swap classes eight to a group, 2 bits each, slot `i` of a group at bit `i * 2`
pub fn pack_swaps(swaps: &[SwapClass]) -> Vec<u16> {
    swaps
        .chunks(SWAP_GROUP)
        .map(|group| {
            group
                .iter()
                .enumerate()
                .fold(0u16, |acc, (i, s)| acc | (s.bits() << (i * 2)))
        })
        .collect()
}

/// Reverse of [`pack_swaps`]
pub fn unpack_swaps(packed: &[u16], count: usize) -> Vec<SwapClass> {
    (0..count)
        .map(|slot| {
            let group = packed.get(slot / SWAP_GROUP).copied().unwrap_or_default();
            SwapClass::from_bits(group >> ((slot % SWAP_GROUP) * 2))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassPatch, PatchItem, Shape, TypePrim};

    fn build(class: ClassData, settings: &Settings) -> (Arc<MemberNames>, LayoutTable) {
        let class = Arc::new(class);
        let names = Arc::new(MemberNames::collect(&class));
        let versions = Arc::new(settings.validate().unwrap());
        let table = LayoutTable::build(&class, &names, &versions, settings).unwrap();
        (names, table)
    }

    fn all_axes(versions: &[&str]) -> Settings {
        Settings {
            x86: true,
            x64: true,
            msvc: true,
            gnu: true,
            ..Settings::with_versions(versions.iter().copied())
        }
    }

    #[test]
    fn pack_places_two_bits_per_slot() {
        let packed = pack_swaps(&[SwapClass::S16, SwapClass::None, SwapClass::S64]);
        assert_eq!(packed, vec![0b11_00_01]);
        let nine = vec![SwapClass::S32; 9];
        assert_eq!(pack_swaps(&nine), vec![0xaaaa, 0x2]);
        assert_eq!(swap_group_count(9), 2);
        assert_eq!(swap_group_count(8), 1);
        assert_eq!(swap_group_count(0), 0);
    }

    #[test]
    fn pack_then_unpack_restores_classes() {
        let classes = [
            SwapClass::None,
            SwapClass::S16,
            SwapClass::S32,
            SwapClass::S64,
        ];
        let swaps = (0..19).map(|i| classes[(i * 7) % 4]).collect::<Vec<_>>();
        let packed = pack_swaps(&swaps);
        assert_eq!(packed.len(), 3);
        assert_eq!(unpack_swaps(&packed, swaps.len()), swaps);
    }

    #[test]
    fn gnu_copy_dropped_without_reusable_padding() {
        let base = Arc::new(ClassData::new("Base").with_member("a", TypePrim::U32));
        let derived = ClassData::new("Derived")
            .with_base(base)
            .with_member("b", TypePrim::U16);
        let settings = Settings {
            gnu: true,
            ..Settings::with_versions(["V1"])
        };
        let (names, table) = build(derived, &settings);
        assert!(!table.flags.contains(LookupFlags::PADDING));
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.base_layout, BaseLayout::Msvc);
        assert_eq!(row.total_size, 8);
        assert_eq!(row.offset(names.slot("baseBase").unwrap()), Some(0));
        assert_eq!(row.offset(names.slot("b").unwrap()), Some(4));
    }

    #[test]
    fn gnu_copy_kept_when_padding_is_reused() {
        let base = Arc::new(
            ClassData::new("Base")
                .with_member("a", TypePrim::U32)
                .with_member("b", TypePrim::U8),
        );
        let derived = ClassData::new("Derived")
            .with_base(base)
            .with_member("c", TypePrim::U8);
        let settings = Settings {
            gnu: true,
            ..Settings::with_versions(["V1"])
        };
        let (_, table) = build(derived, &settings);
        assert_eq!(table.flags, LookupFlags::PADDING);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].base_layout, BaseLayout::Msvc);
        assert_eq!(table.rows[1].base_layout, BaseLayout::Gnu);
    }

    #[test]
    fn pointer_widths_produce_distinct_rows() {
        let class = ClassData::new("Foo")
            .with_member("a", TypePrim::U8)
            .with_member("p", Shape::pointer(TypePrim::U32));
        let settings = Settings {
            x86: true,
            ignore_pointer_endianness: true,
            ..Settings::with_versions(["V1"])
        };
        let (names, table) = build(class, &settings);
        assert_eq!(table.flags, LookupFlags::PTR);
        assert_eq!(table.rows.len(), 2);
        let x86 = &table.rows[0];
        let x64 = &table.rows[1];
        assert_eq!(x86.pointer_width, PointerWidth::X86);
        assert_eq!(x64.pointer_width, PointerWidth::X64);
        let p = names.slot("p").unwrap();
        assert_eq!(x86.offset(p), Some(4));
        assert_eq!(x64.offset(p), Some(8));
        assert_eq!(x86.total_size, 8);
        assert_eq!(x64.total_size, 16);
        assert_eq!(x86.swaps, x64.swaps);
    }

    #[test]
    fn width_independent_schema_collapses() {
        let class = ClassData::new("Foo").with_member("a", TypePrim::F32);
        let (_, table) = build(class, &all_axes(&["V1", "V2"]));
        assert_eq!(table.flags, LookupFlags::empty());
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].version_begin.index(), 0);
        assert_eq!(table.rows[0].version_end.index(), 1);
    }

    #[test]
    fn unchanged_versions_share_a_row() {
        let class = ClassData::new("Foo")
            .with_member("a", TypePrim::U32)
            .with_patch(ClassPatch::new("V3").append([PatchItem::member("b", TypePrim::U8)]));
        let settings = Settings::with_versions(["V1", "V2", "V3", "V4"]);
        let (_, table) = build(class, &settings);
        let ranges = table
            .rows
            .iter()
            .map(|r| (r.version_begin.index(), r.version_end.index()))
            .collect::<Vec<_>>();
        assert_eq!(ranges, [(0, 1), (2, 3)]);
    }

    #[test]
    fn every_row_has_one_entry_per_slot() {
        let class = ClassData::new("Foo")
            .with_member("a", TypePrim::U32)
            .with_member("p", Shape::pointer(TypePrim::U8))
            .with_patch(ClassPatch::new("V2").delete_member("a"));
        let (names, table) = build(class, &all_axes(&["V1", "V2"]));
        for row in &table.rows {
            assert_eq!(row.offsets.len(), names.len());
            assert_eq!(row.swaps.len(), names.len());
        }
    }

    #[test]
    fn compaction_is_lossless() {
        let base = Arc::new(
            ClassData::new("Base")
                .with_member("a", TypePrim::U32)
                .with_member("b", TypePrim::U8),
        );
        let class = Arc::new(
            ClassData::new("Foo")
                .with_base(base)
                .with_member("c", TypePrim::U8)
                .with_member("p", Shape::pointer(TypePrim::U16))
                .with_patch(ClassPatch::new("V2").append([PatchItem::member("d", TypePrim::U16)]))
                .with_patch(ClassPatch::new("V4").delete_member("c")),
        );
        let settings = all_axes(&["V1", "V2", "V3", "V4", "V5"]);
        let names = Arc::new(MemberNames::collect(&class));
        let versions = Arc::new(settings.validate().unwrap());

        let groups = RowGroups::resolve(&class, &names, &versions, &settings).unwrap();
        let raw = groups.rows.iter().flatten().flatten().cloned().collect::<Vec<_>>();
        let table = groups.into_table();
        assert!(table.rows.len() < raw.len());

        for raw_row in &raw {
            let lookup = LayoutLookup {
                version: raw_row.version_begin,
                pointer_width: raw_row.pointer_width,
                base_layout: raw_row.base_layout,
            };
            let found = table.find(&lookup).unwrap();
            assert!(found.same_layout(raw_row), "mismatch for {:?}", lookup);
        }
    }

    #[test]
    fn lookup_ignores_axes_without_flags() {
        let class = ClassData::new("Foo").with_member("a", TypePrim::U8);
        let (_, table) = build(class, &Settings::with_versions(["V1"]));
        let lookup = LayoutLookup {
            version: VersionId::default(),
            pointer_width: PointerWidth::X86,
            base_layout: BaseLayout::Gnu,
        };
        assert!(table.find(&lookup).is_some());
    }
}
