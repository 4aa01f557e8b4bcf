//! Redefinition validation and generation construction.
//!
//! Validation runs against the current generation before anything is
//! published, so a rejected redefinition has no observable effect.

use super::classfile::ParsedClass;
use super::metadata::{ClassGeneration, ClassId, MethodVersion};
use super::RedefineError;
use itertools::Itertools;
use std::sync::Arc;

/// Check that `parsed` is an acceptable replacement for `current`.
///
/// Redefinition may change method bodies and line tables, and nothing else:
/// the method set, every method's modifiers, the superclass and the field
/// layout must all be preserved. Anything looser would let an executing frame
/// resume into a method whose calling convention or receiver layout changed
/// under it.
pub fn validate(current: &ClassGeneration, parsed: &ParsedClass) -> Result<(), RedefineError> {
    if parsed.name != current.name.as_ref() {
        return Err(RedefineError::Incompatible(format!(
            "class name changed from '{}' to '{}'",
            current.name, parsed.name
        )));
    }
    if parsed.super_class != current.super_class {
        return Err(RedefineError::Incompatible(format!(
            "superclass changed from {:?} to {:?}",
            current.super_class, parsed.super_class
        )));
    }
    if parsed.num_ref_fields != current.num_ref_fields {
        return Err(RedefineError::Incompatible(format!(
            "field layout changed from {} to {} reference fields",
            current.num_ref_fields, parsed.num_ref_fields
        )));
    }
    if parsed.methods.len() != current.methods.len() {
        return Err(RedefineError::Incompatible(format!(
            "method count changed from {} to {}",
            current.methods.len(),
            parsed.methods.len()
        )));
    }
    for new_method in parsed.methods.iter() {
        let old_method = current.method(&new_method.name).ok_or_else(|| {
            RedefineError::Incompatible(format!("method '{}' was added", new_method.name))
        })?;
        if new_method.modifiers != old_method.modifiers {
            return Err(RedefineError::Incompatible(format!(
                "modifiers of '{}' changed from {:#06x} to {:#06x}",
                new_method.name, old_method.modifiers.0, new_method.modifiers.0
            )));
        }
    }
    Ok(())
}

/// Build the immutable generation that `define` or `redefine` will publish.
pub fn build_generation(
    id: ClassId,
    generation: u16,
    parsed: &ParsedClass,
) -> Result<ClassGeneration, RedefineError> {
    let methods: Box<[Arc<MethodVersion>]> = parsed
        .methods
        .iter()
        .sorted_by(|a, b| a.name.cmp(&b.name))
        .map(|m| {
            Arc::new(MethodVersion {
                class: id,
                generation,
                name: m.name.clone().into_boxed_str(),
                modifiers: m.modifiers,
                bytecode: m.bytecode.clone().into_boxed_slice(),
                line_table: m.line_table.clone().into_boxed_slice(),
            })
        })
        .collect();
    if let Some((a, _)) = methods.iter().tuple_windows().find(|(a, b)| a.name == b.name) {
        return Err(RedefineError::ClassFormat(format!(
            "duplicate method '{}'",
            a.name
        )));
    }
    Ok(ClassGeneration {
        id,
        generation,
        name: parsed.name.clone().into_boxed_str(),
        super_class: parsed.super_class,
        num_ref_fields: parsed.num_ref_fields,
        methods,
    })
}
