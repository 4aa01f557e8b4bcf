//! Word, region and object-layout constants.

/// log2 of the number of bits in a byte
pub const LOG_BITS_IN_BYTE: u8 = 3;
/// The number of bits in a byte
pub const BITS_IN_BYTE: usize = 1 << LOG_BITS_IN_BYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a gigabyte
pub const LOG_BYTES_IN_GBYTE: u8 = 30;
/// The number of bytes in a gigabyte
pub const BYTES_IN_GBYTE: usize = 1 << LOG_BYTES_IN_GBYTE;

#[cfg(target_pointer_width = "32")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 2;
#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 3;
/// The number of bytes in an address
pub const BYTES_IN_ADDRESS: usize = 1 << LOG_BYTES_IN_ADDRESS;

/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = LOG_BYTES_IN_ADDRESS;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;
/// log2 of the number of bits in a word
pub const LOG_BITS_IN_WORD: usize = LOG_BITS_IN_BYTE as usize + LOG_BYTES_IN_WORD as usize;
/// The number of bits in a word
pub const BITS_IN_WORD: usize = 1 << LOG_BITS_IN_WORD;

/// log2 of the number of bytes in a region
pub const LOG_BYTES_IN_REGION: usize = 18;
/// The number of bytes in a region (256 KiB)
pub const BYTES_IN_REGION: usize = 1 << LOG_BYTES_IN_REGION;
/// Mask selecting the in-region offset of an address
pub const REGION_MASK: usize = BYTES_IN_REGION - 1;
/// The number of words in a region
pub const WORDS_IN_REGION: usize = BYTES_IN_REGION >> LOG_BYTES_IN_WORD;

/// The size of a thread-local allocation buffer carved out of a region.
pub const BYTES_IN_TLAB: usize = 32 << LOG_BYTES_IN_KBYTE;

/// Objects are word aligned.
pub const OBJECT_ALIGNMENT: usize = BYTES_IN_WORD;

/// The largest single allocation the region allocator will accept. Larger
/// requests fail with `AllocationError::OversizedObject`.
pub const MAX_OBJECT_BYTES: usize = BYTES_IN_REGION / 4;

/// The default period (in allocated bytes) for stress collections. The default
/// effectively disables stress GC.
pub const DEFAULT_STRESS_FACTOR: usize = usize::MAX;

/// Classfiles at or above this version treat unexpected structural attributes
/// as an error; older classfiles ignore them.
pub const STRICT_ATTRIBUTE_VERSION: u16 = 52;
