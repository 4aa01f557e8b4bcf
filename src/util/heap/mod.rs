pub mod gc_trigger;

pub use self::gc_trigger::GcTrigger;
