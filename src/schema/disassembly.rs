//! Recursive disassembly of a type shape into a forest of table definitions.
//!
//! Pure derivation, no I/O. The root's definition comes first, followed by
//! every distinct dependent type in discovery order; a type reached via
//! multiple paths appears only once. Recursion depth is bounded by the
//! registry's `max_depth` and exceeding it fails the whole derivation, so a
//! cyclic type graph can never produce a schema.

use std::collections::HashSet;

use crate::model::{ElementType, FieldKind, TypeShape, UnionAlt};
use crate::schema::table::{RESERVED_COLUMNS, TableDefinition};
use crate::{Error, Result};

/// Derive the table forest for `root`.
pub fn disassemble(root: TypeShape, max_depth: u32) -> Result<Vec<TableDefinition>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    walk(root, 0, max_depth, &mut seen, &mut out)?;
    Ok(out)
}

fn walk(
    shape: TypeShape,
    depth: u32,
    max_depth: u32,
    seen: &mut HashSet<&'static str>,
    out: &mut Vec<TableDefinition>,
) -> Result<()> {
    if depth > max_depth {
        return Err(Error::Disassembly(format!(
            "surpassed max depth {} while disassembling type {}",
            max_depth, shape.name
        )));
    }

    let table = TableDefinition::new(shape);
    validate_fields(&table)?;
    if seen.insert(shape.name) {
        out.push(table);
    }

    // Recurse every path even through already-collected types: only the depth
    // bound rejects cyclic shapes.
    for field in (shape.fields)() {
        match field.kind {
            FieldKind::Reference(child) | FieldKind::OptionalReference(child) => {
                walk(child, depth + 1, max_depth, seen, out)?;
            }
            FieldKind::MultiReference(alts) => {
                // primitive alternatives were rejected by validate_fields
                for alt in alts {
                    if let UnionAlt::Shape(child) = alt {
                        walk(child, depth + 1, max_depth, seen, out)?;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn validate_fields(table: &TableDefinition) -> Result<()> {
    for field in table.fields() {
        if RESERVED_COLUMNS.contains(&field.name) {
            return Err(Error::Disassembly(format!(
                "field {} of type {} collides with a reserved column",
                field.name,
                table.name()
            )));
        }

        match &field.kind {
            FieldKind::Container(ElementType::Custom(elem))
            | FieldKind::OptionalContainer(ElementType::Custom(elem)) => {
                return Err(Error::Disassembly(format!(
                    "unsupported nesting: field {} of type {} is a container of custom type {}",
                    field.name,
                    table.name(),
                    elem
                )));
            }
            FieldKind::MultiReference(alts) => {
                if alts.is_empty() {
                    return Err(Error::Disassembly(format!(
                        "field {} of type {} is a union with no alternatives",
                        field.name,
                        table.name()
                    )));
                }
                if alts.iter().any(|a| matches!(a, UnionAlt::Primitive(_))) {
                    return Err(Error::MixedTypes(format!(
                        "field {} of type {} mixes primitive and custom type alternatives",
                        field.name,
                        table.name()
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}
