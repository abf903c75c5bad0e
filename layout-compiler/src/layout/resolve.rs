use error_stack::{report, Result, ResultExt};

use super::MemberNames;
use crate::{
    align_up, ClassData, ClassMember, Inheritable, LayoutCtx, LayoutError, Location, SwapClass,
};

/// Offsets and swap classes of one class for one version under one ABI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLayout {
    pub total_size: usize,
    /// Begin offset per name slot, -1 if absent
    pub offsets: Vec<i32>,
    /// Swap class per name slot, none if absent
    pub swaps: Vec<SwapClass>,
}

/// Resolve the layout of `class` for the version and ABI in `ctx`.
///
/// Every base and member present in the version writes its offset and swap
/// class into its slot in `names`. Slots for names that are not present stay
/// absent.
pub fn resolve(
    class: &ClassData,
    names: &MemberNames,
    ctx: &LayoutCtx,
) -> Result<ResolvedLayout, LayoutError> {
    let mut offsets = vec![-1; names.len()];
    let mut swaps = vec![SwapClass::None; names.len()];
    let (bases, members) = class
        .entries_at(ctx.versions, ctx.version)
        .attach_printable_lazy(|| format!("While resolving `{}`", class.name))?;
    let location = walk(&bases, &members, ctx, |name, loc, swap| {
        let slot = names
            .slot(name)
            .ok_or_else(|| report!(LayoutError::UnknownSlot(name.to_string())))?;
        offsets[slot] = i32::try_from(loc.begin)
            .map_err(|_| report!(LayoutError::OffsetOverflow(name.to_string())))?;
        swaps[slot] = swap;
        Ok(())
    })
    .attach_printable_lazy(|| {
        format!(
            "While resolving `{}` for version `{}` ({})",
            class.name,
            ctx.version_name(),
            ctx.abi
        )
    })?;
    tracing::debug!(
        "resolved `{}` version `{}` ({}): size=0x{:x}, align={}",
        class.name,
        ctx.version_name(),
        ctx.abi,
        location.end,
        location.alignment
    );
    Ok(ResolvedLayout {
        total_size: location.end,
        offsets,
        swaps,
    })
}

/// Place a class at the first offset at or after `offset` that satisfies
/// its alignment
pub fn locate_class(
    class: &ClassData,
    offset: usize,
    ctx: &LayoutCtx,
) -> Result<Location, LayoutError> {
    let (bases, members) = class
        .entries_at(ctx.versions, ctx.version)
        .attach_printable_lazy(|| format!("While locating `{}`", class.name))?;
    let natural = walk(&bases, &members, ctx, |_, _, _| Ok(()))
        .attach_printable_lazy(|| format!("While locating `{}`", class.name))?;
    Ok(natural.rebase(offset))
}

/// Lay out bases then members from offset 0, calling `visit` for each.
///
/// Under the GNU base layout the next entry may start inside the trailing
/// padding of a base. The returned location is padded up to the largest
/// alignment seen; a class with no entries has size 0 and alignment 0.
fn walk<F>(
    bases: &[Inheritable],
    members: &[ClassMember],
    ctx: &LayoutCtx,
    mut visit: F,
) -> Result<Location, LayoutError>
where
    F: FnMut(&str, &Location, SwapClass) -> Result<(), LayoutError>,
{
    let mut cursor = 0;
    let mut alignment = 0;
    for base in bases {
        let loc = locate_class(&base.0, cursor, ctx)?;
        #[cfg(feature = "debug-layout")]
        {
            tracing::trace!(
                "  base `{}`: 0x{:x}..0x{:x} align={} pad={}",
                base.name(),
                loc.begin,
                loc.end,
                loc.alignment,
                loc.trailing_padding
            );
        }
        visit(&base.slot_name(), &loc, SwapClass::None)?;
        cursor = if ctx.abi.is_gnu() {
            loc.end - loc.trailing_padding
        } else {
            loc.end
        };
        alignment = alignment.max(loc.alignment);
    }
    for member in members {
        let loc = member
            .shape
            .locate(cursor, ctx)
            .attach_printable_lazy(|| format!("While locating member `{}`", member.name))?;
        #[cfg(feature = "debug-layout")]
        {
            tracing::trace!(
                "  member `{}`: 0x{:x}..0x{:x} align={}",
                member.name,
                loc.begin,
                loc.end,
                loc.alignment
            );
        }
        visit(&member.name, &loc, member.shape.swap_class(&ctx.abi))?;
        cursor = loc.end;
        alignment = alignment.max(loc.alignment);
    }
    let end = align_up(cursor, alignment);
    Ok(Location {
        begin: 0,
        end,
        alignment,
        trailing_padding: end - cursor,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{Abi, BaseLayout, ClassPatch, PatchItem, PointerWidth, TypePrim, VersionList};

    fn resolve_at(
        class: &ClassData,
        versions: &VersionList,
        version: &str,
        abi: Abi,
    ) -> (MemberNames, ResolvedLayout) {
        let names = MemberNames::collect(class);
        let ctx = LayoutCtx {
            versions,
            version: versions.index_of(version).unwrap(),
            abi,
        };
        let layout = resolve(class, &names, &ctx).unwrap();
        (names, layout)
    }

    fn offset_of(names: &MemberNames, layout: &ResolvedLayout, name: &str) -> i32 {
        layout.offsets[names.slot(name).unwrap()]
    }

    #[test]
    fn derived_with_padding_msvc_x64() {
        let versions = VersionList::new(["V1"]).unwrap();
        let base = Arc::new(ClassData::new("Base").with_member("a", TypePrim::U32));
        let derived = ClassData::new("Derived")
            .with_base(base)
            .with_member("b", TypePrim::U16);
        let abi = Abi::new(PointerWidth::X64, BaseLayout::Msvc);
        let (names, layout) = resolve_at(&derived, &versions, "V1", abi);
        assert_eq!(offset_of(&names, &layout, "baseBase"), 0);
        assert_eq!(offset_of(&names, &layout, "b"), 4);
        assert_eq!(layout.total_size, 8);
        assert_eq!(layout.swaps[names.slot("b").unwrap()], SwapClass::S16);
        assert_eq!(layout.swaps[names.slot("baseBase").unwrap()], SwapClass::None);
    }

    #[test]
    fn gnu_reuses_base_tail_padding() {
        let versions = VersionList::new(["V1"]).unwrap();
        // Base: u32 at 0, u8 at 4, padded to 8
        let base = Arc::new(
            ClassData::new("Base")
                .with_member("a", TypePrim::U32)
                .with_member("b", TypePrim::U8),
        );
        let derived = ClassData::new("Derived")
            .with_base(base)
            .with_member("c", TypePrim::U8);

        let msvc = Abi::new(PointerWidth::X64, BaseLayout::Msvc);
        let (names, layout) = resolve_at(&derived, &versions, "V1", msvc);
        assert_eq!(offset_of(&names, &layout, "c"), 8);
        assert_eq!(layout.total_size, 12);

        let gnu = Abi::new(PointerWidth::X64, BaseLayout::Gnu);
        let (names, layout) = resolve_at(&derived, &versions, "V1", gnu);
        assert_eq!(offset_of(&names, &layout, "c"), 5);
        assert_eq!(layout.total_size, 8);
    }

    #[test]
    fn absent_names_are_marked() {
        let versions = VersionList::new(["V1", "V2"]).unwrap();
        let class = ClassData::new("Foo")
            .with_member("a", TypePrim::U8)
            .with_patch(ClassPatch::new("V2").append([PatchItem::member("b", TypePrim::U64)]));
        let abi = Abi::new(PointerWidth::X64, BaseLayout::Msvc);

        let (names, v1) = resolve_at(&class, &versions, "V1", abi);
        assert_eq!(offset_of(&names, &v1, "b"), -1);
        assert_eq!(v1.swaps[names.slot("b").unwrap()], SwapClass::None);
        assert_eq!(v1.total_size, 1);

        let (names, v2) = resolve_at(&class, &versions, "V2", abi);
        assert_eq!(offset_of(&names, &v2, "b"), 8);
        assert_eq!(v2.swaps[names.slot("b").unwrap()], SwapClass::S64);
        assert_eq!(v2.total_size, 16);
        assert_eq!(v1.offsets.len(), v2.offsets.len());
    }

    #[test]
    fn empty_version_has_zero_size() {
        let versions = VersionList::new(["V1", "V2"]).unwrap();
        let class = ClassData::new("Foo")
            .with_member("a", TypePrim::U32)
            .with_patch(ClassPatch::new("V2").delete_member("a"));
        let abi = Abi::new(PointerWidth::X86, BaseLayout::Gnu);
        let (_, layout) = resolve_at(&class, &versions, "V2", abi);
        assert_eq!(layout.total_size, 0);
        assert!(layout.offsets.iter().all(|o| *o == -1));
    }

    #[test]
    fn nested_class_is_aligned_and_versioned() {
        let versions = VersionList::new(["V1", "V2"]).unwrap();
        let inner = Arc::new(
            ClassData::new("Inner")
                .with_member("x", TypePrim::U8)
                .with_patch(ClassPatch::new("V2").append([PatchItem::member("y", TypePrim::F64)])),
        );
        let outer = ClassData::new("Outer")
            .with_member("flag", TypePrim::U8)
            .with_member("inner", inner)
            .with_member("tail", TypePrim::U8);
        let abi = Abi::new(PointerWidth::X64, BaseLayout::Msvc);

        let (names, v1) = resolve_at(&outer, &versions, "V1", abi);
        assert_eq!(offset_of(&names, &v1, "inner"), 1);
        assert_eq!(offset_of(&names, &v1, "tail"), 2);
        assert_eq!(v1.total_size, 3);

        let (names, v2) = resolve_at(&outer, &versions, "V2", abi);
        assert_eq!(offset_of(&names, &v2, "inner"), 8);
        assert_eq!(offset_of(&names, &v2, "tail"), 24);
        assert_eq!(v2.total_size, 32);
    }

    #[test]
    fn second_base_is_aligned() {
        let versions = VersionList::new(["V1"]).unwrap();
        let a = Arc::new(ClassData::new("A").with_member("a", TypePrim::U8));
        let b = Arc::new(ClassData::new("B").with_member("b", TypePrim::U32));
        let class = ClassData::new("C").with_base(a).with_base(b);
        let abi = Abi::new(PointerWidth::X64, BaseLayout::Msvc);
        let (names, layout) = resolve_at(&class, &versions, "V1", abi);
        assert_eq!(offset_of(&names, &layout, "baseA"), 0);
        assert_eq!(offset_of(&names, &layout, "baseB"), 4);
        assert_eq!(layout.total_size, 8);
    }

    #[test]
    fn resolution_is_repeatable() {
        let versions = VersionList::new(["V1", "V2"]).unwrap();
        let class = ClassData::new("Foo")
            .with_member("a", TypePrim::U16)
            .with_member("p", crate::Shape::pointer(TypePrim::U8))
            .with_patch(ClassPatch::new("V2").prepend([PatchItem::member("z", TypePrim::U8)]));
        let abi = Abi::new(PointerWidth::X86, BaseLayout::Msvc);
        let (_, first) = resolve_at(&class, &versions, "V2", abi);
        let (_, again) = resolve_at(&class, &versions, "V2", abi);
        assert_eq!(first, again);
    }
}
