//! Script-ratio scoring used by the join and message classifiers.
//!
//! Both functions return the share of characters (not bytes) in the given
//! script, in `[0, 1]`. Blank input scores `0`.

fn script_ratio(text: &str, in_script: impl Fn(char) -> bool) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }

    let (hits, total) = text.chars().fold((0usize, 0usize), |(hits, total), c| {
        (hits + usize::from(in_script(c)), total + 1)
    });

    hits as f64 / total as f64
}

/// Characters whose Unicode script is Arabic. Shared punctuation (comma,
/// semicolon, question mark), the tatweel and combining marks belong to
/// Common or Inherited and do not count.
fn is_arabic(c: char) -> bool {
    matches!(c as u32,
        0x0600..=0x0604
        | 0x0606..=0x060B
        | 0x060D..=0x061A
        | 0x061D..=0x061E
        | 0x0620..=0x063F
        | 0x0641..=0x064A
        | 0x0656..=0x066F
        | 0x0671..=0x06DC
        | 0x06DE..=0x06FF
        | 0x0750..=0x077F
        | 0x0870..=0x088E
        | 0x0890..=0x0891
        | 0x0898..=0x08E1
        | 0x08E3..=0x08FF
        | 0xFB50..=0xFBC2
        | 0xFBD3..=0xFD3D
        | 0xFD40..=0xFD8F
        | 0xFD92..=0xFDC7
        | 0xFDCF
        | 0xFDF0..=0xFDFF
        | 0xFE70..=0xFE74
        | 0xFE76..=0xFEFC
        | 0x10E60..=0x10E7E
        | 0x10EFD..=0x10EFF
        | 0x1EE00..=0x1EEFF)
}

fn is_han(c: char) -> bool {
    matches!(c as u32,
        0x2E80..=0x2E99
        | 0x2E9B..=0x2EF3
        | 0x2F00..=0x2FD5
        | 0x3005
        | 0x3007
        | 0x3021..=0x3029
        | 0x3038..=0x303B
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xF900..=0xFAFF
        | 0x20000..=0x2FA1F
        | 0x30000..=0x3134F)
}

pub fn arabic_ratio(text: &str) -> f64 {
    script_ratio(text, is_arabic)
}

pub fn chinese_ratio(text: &str) -> f64 {
    script_ratio(text, is_han)
}
