//! The class table.
//!
//! Readers resolve the current generation of a class through an epoch
//! protected pointer and never block. Writers (define and redefine) are
//! serialized by a single lock that is held only around validation of an
//! already parsed classfile and the pointer swap itself.

use super::classfile;
use super::metadata::{ClassGeneration, ClassId, MethodVersion};
use super::redefine;
use super::RedefineError;
use crossbeam::epoch::{self, Atomic, Owned};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

struct Slot {
    /// Null until the slot is defined. Replaced wholesale on redefinition;
    /// superseded generations are reclaimed through the epoch.
    current: Atomic<ClassGeneration>,
    /// Method versions of superseded generations, kept until nothing
    /// references them. Drained by [`super::Reclaimer`].
    retired: Mutex<Vec<Arc<MethodVersion>>>,
}

pub struct ClassTable {
    slots: Box<[Slot]>,
    names: Mutex<HashMap<String, ClassId>>,
    /// Serializes define and redefine. Readers never take it.
    swap_lock: Mutex<()>,
}

impl ClassTable {
    pub fn new(capacity: usize) -> Self {
        ClassTable {
            slots: (0..capacity)
                .map(|_| Slot {
                    current: Atomic::null(),
                    retired: Mutex::new(Vec::new()),
                })
                .collect(),
            names: Mutex::new(HashMap::new()),
            swap_lock: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn class_count(&self) -> usize {
        self.names.lock().unwrap().len()
    }

    pub fn resolve(&self, name: &str) -> Option<ClassId> {
        self.names.lock().unwrap().get(name).copied()
    }

    /// Run `f` against the current generation of `class`. The generation
    /// cannot be freed while `f` runs; anything that must outlive the call
    /// (method versions) is `Arc` and can be cloned out.
    pub fn with_current<R>(
        &self,
        class: ClassId,
        f: impl FnOnce(&ClassGeneration) -> R,
    ) -> Option<R> {
        let slot = self.slots.get(class.0 as usize)?;
        let guard = epoch::pin();
        let shared = slot.current.load(Ordering::Acquire, &guard);
        let generation = unsafe { shared.as_ref() }?;
        Some(f(generation))
    }

    pub fn generation_of(&self, class: ClassId) -> Option<u16> {
        self.with_current(class, |g| g.generation)
    }

    /// Define a new class from raw class bytes.
    pub fn define(&self, bytes: &[u8]) -> Result<ClassId, RedefineError> {
        let parsed = classfile::parse(bytes)?;
        let _swap = self.swap_lock.lock().unwrap();

        let mut names = self.names.lock().unwrap();
        if names.contains_key(&parsed.name) {
            return Err(RedefineError::DuplicateClass(parsed.name));
        }
        if let Some(super_class) = parsed.super_class {
            if self.generation_of(super_class).is_none() {
                return Err(RedefineError::UnknownClass(format!(
                    "superclass {}",
                    super_class
                )));
            }
        }
        let id = ClassId(names.len() as u32);
        if id.0 as usize >= self.slots.len() {
            return Err(RedefineError::TableFull);
        }

        let generation = redefine::build_generation(id, 0, &parsed)?;
        info!("defined {} '{}'", id, generation.name);
        names.insert(parsed.name, id);
        self.slots[id.0 as usize]
            .current
            .store(Owned::new(generation), Ordering::Release);
        Ok(id)
    }

    /// Replace the current generation of `class` with one built from
    /// `bytes`. All-or-nothing: any rejection leaves the class untouched.
    pub fn redefine(&self, class: ClassId, bytes: &[u8]) -> Result<(), RedefineError> {
        // Parsing and preparation stay outside the exclusive section.
        let parsed = classfile::parse(bytes)?;
        let _swap = self.swap_lock.lock().unwrap();

        let slot = self
            .slots
            .get(class.0 as usize)
            .ok_or_else(|| RedefineError::UnknownClass(format!("{}", class)))?;
        let guard = epoch::pin();
        let shared = slot.current.load(Ordering::Acquire, &guard);
        let current = unsafe { shared.as_ref() }
            .ok_or_else(|| RedefineError::UnknownClass(format!("{}", class)))?;

        redefine::validate(current, &parsed)?;
        let next_generation = current.generation.checked_add(1).ok_or_else(|| {
            RedefineError::Incompatible("generation counter exhausted".to_owned())
        })?;
        let next = redefine::build_generation(class, next_generation, &parsed)?;
        info!(
            "redefining {} '{}' g{} -> g{}",
            class, current.name, current.generation, next.generation
        );

        // Keep the superseded method versions alive for frames and
        // backtraces that still hold them.
        slot.retired
            .lock()
            .unwrap()
            .extend(current.methods.iter().cloned());

        let old = slot.current.swap(Owned::new(next), Ordering::AcqRel, &guard);
        unsafe { guard.defer_destroy(old) };
        // Hand the deferred destruction to the global epoch queue; left in
        // this thread's local bag it would only run on a later pin here.
        guard.flush();
        Ok(())
    }

    /// Drop retired method versions no frame or backtrace references any
    /// more. A retired version's only owner outside live frames and
    /// backtraces is the retired list itself, so a strong count of one means
    /// unreferenced. Returns how many were freed.
    pub fn reclaim_retired(&self) -> usize {
        // A superseded generation still owns its method Arcs until the
        // epoch destroys it. Each pin-and-flush can advance the global
        // epoch one step and collect expired garbage; a deferred
        // destruction becomes collectable two epochs after it was queued.
        for _ in 0..4 {
            epoch::pin().flush();
        }
        let mut freed = 0;
        for slot in self.slots.iter() {
            let mut retired = slot.retired.lock().unwrap();
            let before = retired.len();
            retired.retain(|version| Arc::strong_count(version) > 1);
            freed += before - retired.len();
        }
        if freed > 0 {
            debug!("reclaimed {} retired method versions", freed);
        }
        freed
    }

    /// How many superseded method versions of `class` are still pinned.
    pub fn retired_count(&self, class: ClassId) -> usize {
        self.slots
            .get(class.0 as usize)
            .map_or(0, |slot| slot.retired.lock().unwrap().len())
    }
}

impl Drop for ClassTable {
    fn drop(&mut self) {
        // No reader can hold a guard into a table being dropped.
        let guard = unsafe { epoch::unprotected() };
        for slot in self.slots.iter() {
            let shared = slot.current.load(Ordering::Relaxed, guard);
            if !shared.is_null() {
                drop(unsafe { shared.into_owned() });
            }
        }
    }
}
