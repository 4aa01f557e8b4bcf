use crate::util::constants::*;

/* Alignment */

pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/e620d0f337d0643c757bab791fc7d88d63217704/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

pub const fn raw_align_down(val: usize, align: usize) -> usize {
    val & !align.wrapping_sub(1)
}

pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

/* Sizes */

pub const fn words_to_bytes(words: usize) -> usize {
    words << LOG_BYTES_IN_WORD
}

pub const fn bytes_to_words(bytes: usize) -> usize {
    bytes >> LOG_BYTES_IN_WORD
}

pub const fn bytes_to_regions_up(bytes: usize) -> usize {
    raw_align_up(bytes, BYTES_IN_REGION) >> LOG_BYTES_IN_REGION
}

/// Format a byte count with a binary suffix, for log output.
pub fn bytes_to_formatted_string(bytes: usize) -> String {
    if bytes >= BYTES_IN_GBYTE {
        format!("{}G", bytes >> LOG_BYTES_IN_GBYTE)
    } else if bytes >= BYTES_IN_MBYTE {
        format!("{}M", bytes >> LOG_BYTES_IN_MBYTE)
    } else if bytes >= BYTES_IN_KBYTE {
        format!("{}K", bytes >> LOG_BYTES_IN_KBYTE)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_align_up() {
        assert_eq!(raw_align_up(0, 8), 0);
        assert_eq!(raw_align_up(1, 8), 8);
        assert_eq!(raw_align_up(8, 8), 8);
        assert_eq!(raw_align_up(9, 8), 16);
    }

    #[test]
    fn test_bytes_to_regions_up() {
        assert_eq!(bytes_to_regions_up(1), 1);
        assert_eq!(bytes_to_regions_up(BYTES_IN_REGION), 1);
        assert_eq!(bytes_to_regions_up(BYTES_IN_REGION + 1), 2);
    }

    #[test]
    fn test_formatted_string() {
        assert_eq!(bytes_to_formatted_string(512), "512B");
        assert_eq!(bytes_to_formatted_string(64 * BYTES_IN_MBYTE), "64M");
    }
}
