//! Class definition, redefinition and backtrace pinning through the public
//! API.

use relic::klass::classfile::testing::{line_table_payload, ClassBytesBuilder};
use relic::klass::classfile::LINE_NUMBER_TABLE;
use relic::klass::{ClassId, MethodModifiers, RedefineError};
use relic::memory_manager;
use relic::RelicBuilder;

fn heap() -> std::sync::Arc<relic::Relic> {
    let mut builder = RelicBuilder::new();
    builder.set_option("heap_size", "1m");
    memory_manager::relic_init(builder)
}

fn widget(lines: &[(u16, u16)]) -> Vec<u8> {
    ClassBytesBuilder::new("test/Widget")
        .ref_fields(1)
        .method_with_attrs(
            "run",
            MethodModifiers::STATIC,
            &[0, 1, 2, 3],
            &[(LINE_NUMBER_TABLE, line_table_payload(lines))],
        )
        .build()
}

#[test]
fn define_resolve_and_duplicate() {
    let relic = heap();
    let class = memory_manager::define_class(&relic, &widget(&[(0, 10)])).unwrap();
    assert_eq!(memory_manager::resolve_class(&relic, "test/Widget"), Some(class));
    assert_eq!(memory_manager::resolve_class(&relic, "test/Other"), None);
    assert!(matches!(
        memory_manager::define_class(&relic, &widget(&[(0, 10)])),
        Err(RedefineError::DuplicateClass(_))
    ));
}

#[test]
fn redefinition_swaps_method_versions() {
    let relic = heap();
    let class = memory_manager::define_class(&relic, &widget(&[(0, 10)])).unwrap();
    let mut mutator = memory_manager::bind_mutator(relic.clone());

    // A frame entered before the redefinition keeps executing the old
    // version; its line numbers do not change under it.
    assert!(mutator.push_frame(class, "run"));
    mutator.set_bci(2);

    memory_manager::redefine(&relic, class, &widget(&[(0, 99)])).unwrap();

    let old = mutator.capture_backtrace();
    assert_eq!(old.frames()[0].line(), Some(10));

    // A frame entered after sees the new version.
    mutator.pop_frame();
    assert!(mutator.push_frame(class, "run"));
    mutator.set_bci(2);
    let new = mutator.capture_backtrace();
    assert_eq!(new.frames()[0].line(), Some(99));

    memory_manager::destroy_mutator(mutator);
}

#[test]
fn incompatible_redefinitions_are_rejected() {
    let relic = heap();
    let class = memory_manager::define_class(&relic, &widget(&[(0, 10)])).unwrap();

    // Changing a method's modifiers.
    let changed_modifiers = ClassBytesBuilder::new("test/Widget")
        .ref_fields(1)
        .method("run", MethodModifiers::STATIC | MethodModifiers::FINAL, &[0])
        .build();
    assert!(matches!(
        memory_manager::redefine(&relic, class, &changed_modifiers),
        Err(RedefineError::Incompatible(_))
    ));

    // Changing the instance layout.
    let changed_fields = ClassBytesBuilder::new("test/Widget")
        .ref_fields(2)
        .method("run", MethodModifiers::STATIC, &[0])
        .build();
    assert!(matches!(
        memory_manager::redefine(&relic, class, &changed_fields),
        Err(RedefineError::Incompatible(_))
    ));

    // Renaming the class.
    let renamed = ClassBytesBuilder::new("test/Renamed")
        .ref_fields(1)
        .method("run", MethodModifiers::STATIC, &[0])
        .build();
    assert!(matches!(
        memory_manager::redefine(&relic, class, &renamed),
        Err(RedefineError::Incompatible(_))
    ));

    // Dropping a method.
    let dropped = ClassBytesBuilder::new("test/Widget").ref_fields(1).build();
    assert!(matches!(
        memory_manager::redefine(&relic, class, &dropped),
        Err(RedefineError::Incompatible(_))
    ));

    // A failed redefinition leaves the current generation in place.
    let mut mutator = memory_manager::bind_mutator(relic.clone());
    assert!(mutator.push_frame(class, "run"));
    assert_eq!(mutator.capture_backtrace().frames()[0].line(), Some(10));
    memory_manager::destroy_mutator(mutator);
}

#[test]
fn redefining_an_unknown_class_fails() {
    let relic = heap();
    assert!(matches!(
        memory_manager::redefine(&relic, ClassId(17), &widget(&[(0, 10)])),
        Err(RedefineError::UnknownClass(_))
    ));
}

#[test]
fn attribute_policy_depends_on_classfile_version() {
    let relic = heap();
    let class = memory_manager::define_class(&relic, &widget(&[(0, 10)])).unwrap();

    // Version 51: unknown attributes are ignored with a warning.
    let lenient = ClassBytesBuilder::new("test/Widget")
        .version(51)
        .ref_fields(1)
        .method_with_attrs("run", MethodModifiers::STATIC, &[0], &[("Synthetic", vec![])])
        .build();
    memory_manager::redefine(&relic, class, &lenient).unwrap();

    // Version 52 onwards: unknown attributes are an error.
    let strict = ClassBytesBuilder::new("test/Widget")
        .version(52)
        .ref_fields(1)
        .method_with_attrs("run", MethodModifiers::STATIC, &[0], &[("Synthetic", vec![])])
        .build();
    assert!(matches!(
        memory_manager::redefine(&relic, class, &strict),
        Err(RedefineError::MalformedAttribute(_))
    ));
}

#[test]
fn backtraces_pin_old_versions_until_dropped() {
    let relic = heap();
    let class = memory_manager::define_class(&relic, &widget(&[(0, 10)])).unwrap();
    let mut mutator = memory_manager::bind_mutator(relic.clone());

    assert!(mutator.push_frame(class, "run"));
    let trace = mutator.capture_backtrace();
    mutator.pop_frame();

    memory_manager::redefine(&relic, class, &widget(&[(0, 20)])).unwrap();
    memory_manager::redefine(&relic, class, &widget(&[(0, 30)])).unwrap();

    // The capture still names the class and resolves against generation 0.
    assert_eq!(memory_manager::query_backtrace_references(&relic, class), 1);
    assert_eq!(trace.frames()[0].line(), Some(10));
    assert_eq!(trace.frames()[0].method_name(), "run");

    drop(trace);
    assert_eq!(memory_manager::query_backtrace_references(&relic, class), 0);

    memory_manager::destroy_mutator(mutator);
}

#[test]
fn subclasses_reference_defined_superclasses() {
    let relic = heap();
    let base = memory_manager::define_class(&relic, &widget(&[(0, 10)])).unwrap();
    let sub = ClassBytesBuilder::new("test/Gadget")
        .super_class(base)
        .ref_fields(1)
        .build();
    assert!(memory_manager::define_class(&relic, &sub).is_ok());

    let orphan = ClassBytesBuilder::new("test/Orphan")
        .super_class(ClassId(999))
        .build();
    assert!(matches!(
        memory_manager::define_class(&relic, &orphan),
        Err(RedefineError::UnknownClass(_))
    ));
}
