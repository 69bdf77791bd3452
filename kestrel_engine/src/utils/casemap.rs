/// Fold a nickname or channel name to its RFC 1459 lower-case form, which is
/// how servers compare names unless told otherwise.
pub fn irc_lower(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Case-insensitive name comparison under RFC 1459 casemapping
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && irc_lower(a) == irc_lower(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_brackets() {
        assert_eq!(irc_lower("Nick[Away]"), "nick{away}");
        assert!(irc_eq("Foo\\Bar", "foo|bar"));
        assert!(!irc_eq("Bob", "Bobby"));
    }
}
