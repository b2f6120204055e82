use std::cmp::Ordering;

pub use pod_types::clean_version;

/// Compare two version strings component by component.
///
/// Numeric components compare as numbers so `1.9.0 < 1.10.0`; a missing
/// component counts as zero; non-numeric components fall back to a
/// case-insensitive text comparison. Build suffixes are ignored.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = clean_version(a).split('.');
    let mut right = clean_version(b).split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => {
                let ord = compare_component(l.unwrap_or("0"), r.unwrap_or("0"));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_component(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}
