//! Runtime options.
//!
//! Every option has a default and can be overridden by an environment variable
//! with the `RELIC_` prefix (e.g. `RELIC_THREADS=4`, `RELIC_HEAP_SIZE=512m`),
//! or programmatically through [`crate::RelicBuilder`] before the instance is
//! built.

use crate::util::constants::*;
use std::fmt;
use std::str::FromStr;
use strum_macros::EnumString;

/// Which collection mode the controller runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString)]
pub enum CollectorSelector {
    /// Concurrent mark and relocate with short pauses. The default.
    Concurrent,
    /// Every collection is a full stop-the-world cycle. Deterministic, mainly
    /// useful for debugging and tests.
    StopTheWorld,
}

/// A heap size in bytes. Parses either a plain byte count or a value with a
/// `k`/`m`/`g` suffix.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeapSize(pub usize);

impl FromStr for HeapSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref SIZE_RE: regex::Regex =
                regex::Regex::new(r"^(\d+)\s*([kKmMgG]?)$").unwrap();
        }
        let caps = SIZE_RE
            .captures(s.trim())
            .ok_or_else(|| format!("'{}' is not a valid heap size", s))?;
        let num: usize = caps[1]
            .parse()
            .map_err(|_| format!("'{}' is out of range", &caps[1]))?;
        let shift = match &caps[2] {
            "k" | "K" => LOG_BYTES_IN_KBYTE,
            "m" | "M" => LOG_BYTES_IN_MBYTE,
            "g" | "G" => LOG_BYTES_IN_GBYTE,
            _ => 0,
        };
        num.checked_shl(shift as u32)
            .map(HeapSize)
            .ok_or_else(|| format!("'{}' overflows", s))
    }
}

impl fmt::Display for HeapSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", crate::util::conversions::bytes_to_formatted_string(self.0))
    }
}

/// Default heap size: a quarter of the currently available system memory,
/// clamped to [64 MiB, 4 GiB].
fn default_heap_size() -> HeapSize {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    let available = system.available_memory() as usize;
    HeapSize((available / 4).clamp(64 * BYTES_IN_MBYTE, 4 * BYTES_IN_GBYTE))
}

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($(#[$outer:meta])*$name:ident: $type:ty [$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])*$name: $type [$validator] = $default),*);
    ];
    ($($(#[$outer:meta])*$name:ident: $type:ty [$validator:expr] = $default:expr),*) => [
        /// The set of options for a Relic instance.
        pub struct Options {
            $($(#[$outer])* pub $name: $type),*
        }
        impl Options {
            /// Set an option from a string value. Returns true if the value
            /// parsed and validated.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            self.$name = val.clone();
                        } else {
                            eprintln!("Warn: unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        eprintln!("Warn: unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    },)*
                    _ => {
                        eprintln!("Warn: unknown option '{}'.", s);
                        false
                    }
                }
            }
        }
        impl Default for Options {
            /// Built with defaults, then overridden by any matching
            /// `RELIC_`-prefixed environment variable.
            fn default() -> Self {
                let mut options = Options {
                    $($name: $default),*
                };

                const PREFIX: &str = "RELIC_";
                for (key, val) in std::env::vars() {
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    /// The collection mode.
    collector:             CollectorSelector [always_valid] = CollectorSelector::Concurrent,
    /// Number of GC worker threads used for parallel marking and evacuation.
    threads:               usize  [|v: &usize| *v > 0] = num_cpus::get(),
    /// Total heap size. Rounded up to a whole number of regions.
    heap_size:             HeapSize [|v: &HeapSize| v.0 >= 4 * BYTES_IN_REGION] = default_heap_size(),
    /// Regions whose live-byte ratio after marking falls below this threshold
    /// become relocation candidates.
    evac_threshold:        f32    [|v: &f32| *v > 0.0 && *v <= 1.0] = 0.5,
    /// Heap occupancy (used regions / total regions) above which a concurrent
    /// collection is requested.
    trigger_occupancy:     f32    [|v: &f32| *v > 0.0 && *v <= 1.0] = 0.75,
    /// If the mark worklist ever holds more than this many entries the cycle
    /// escalates to stop-the-world.
    mark_escalation_limit: usize  [|v: &usize| *v > 0] = 1 << 20,
    /// How frequent (every X allocated bytes) should we force a collection
    /// request? Used by stress tests.
    stress_factor:         usize  [|v: &usize| *v > 0] = DEFAULT_STRESS_FACTOR,
    /// Capacity of the class table.
    max_classes:           usize  [|v: &usize| *v > 0] = 16384,
    /// Scan period of the background method-version reclaimer, in milliseconds.
    reclaim_interval_ms:   u64    [|v: &u64| *v > 0] = 50,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::{serial_test, with_cleanup};

    #[test]
    fn no_env_var() {
        serial_test(|| {
            let options = Options::default();
            assert_eq!(options.stress_factor, DEFAULT_STRESS_FACTOR);
            assert_eq!(options.collector, CollectorSelector::Concurrent);
        })
    }

    #[test]
    fn with_valid_env_var() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("RELIC_STRESS_FACTOR", "4096");

                    let options = Options::default();
                    assert_eq!(options.stress_factor, 4096);
                },
                || {
                    std::env::remove_var("RELIC_STRESS_FACTOR");
                },
            )
        })
    }

    #[test]
    fn with_invalid_env_var_value() {
        serial_test(|| {
            with_cleanup(
                || {
                    // We cannot parse the value, so use the default.
                    std::env::set_var("RELIC_THREADS", "abc");

                    let options = Options::default();
                    assert_eq!(options.threads, num_cpus::get());
                },
                || {
                    std::env::remove_var("RELIC_THREADS");
                },
            )
        })
    }

    #[test]
    fn with_invalid_env_var_key() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("RELIC_ABC", "42");

                    let options = Options::default();
                    assert_eq!(options.stress_factor, DEFAULT_STRESS_FACTOR);
                },
                || {
                    std::env::remove_var("RELIC_ABC");
                },
            )
        })
    }

    #[test]
    fn heap_size_suffixes() {
        assert_eq!("4096".parse::<HeapSize>(), Ok(HeapSize(4096)));
        assert_eq!("16k".parse::<HeapSize>(), Ok(HeapSize(16 * BYTES_IN_KBYTE)));
        assert_eq!("512M".parse::<HeapSize>(), Ok(HeapSize(512 * BYTES_IN_MBYTE)));
        assert_eq!("2g".parse::<HeapSize>(), Ok(HeapSize(2 * BYTES_IN_GBYTE)));
        assert!("2x".parse::<HeapSize>().is_err());
        assert!("".parse::<HeapSize>().is_err());
    }

    #[test]
    fn collector_selector_from_env() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("RELIC_COLLECTOR", "StopTheWorld");

                    let options = Options::default();
                    assert_eq!(options.collector, CollectorSelector::StopTheWorld);
                },
                || {
                    std::env::remove_var("RELIC_COLLECTOR");
                },
            )
        })
    }
}
