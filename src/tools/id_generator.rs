//! Random ID generation over a lowercase alphanumeric alphabet.

/// Lowercase letters and digits. Keys built from this alphabet survive
/// case-folding URLs and spreadsheets unchanged.
pub const ID_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r',
    's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Generates a random ID of the specified length using [`ID_ALPHABET`].
pub fn generate_id(len: usize) -> String {
    nanoid::format(nanoid::rngs::default, &ID_ALPHABET, len)
}

/// Generates `groups` random blocks of `group_len` characters joined by `-`.
///
/// `generate_grouped_id(2, 5)` yields values like `k3f9a-0zq1m`.
pub fn generate_grouped_id(groups: usize, group_len: usize) -> String {
    (0..groups)
        .map(|_| generate_id(group_len))
        .collect::<Vec<_>>()
        .join("-")
}
