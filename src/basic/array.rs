//! Associative arrays stored in plain string values
//!
//! An array is the string `key=value;key=value;...;` where `\`, `=` and `;`
//! inside keys and values are escaped with a backslash. A nested array is
//! stored as a value, so its own escapes get escaped once more for every level
//! of nesting. Decoding strips exactly one level.
//!
//! Decoding is permissive: segments without `=` and an unterminated trailing
//! fragment are skipped. When a key repeats, the last value wins and the key
//! keeps the position of its first occurrence.

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        if matches!(c, '\\' | '=' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Encode ordered pairs as an array string
pub fn encode<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = String::new();
    for (key, value) in pairs {
        escape_into(&mut out, key.as_ref());
        out.push('=');
        escape_into(&mut out, value.as_ref());
        out.push(';');
    }
    out
}

/// Encode values as an array indexed from 1
pub fn from_list<V: AsRef<str>>(values: impl IntoIterator<Item = V>) -> String {
    encode(
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| ((i + 1).to_string(), v)),
    )
}

/// Read one escaped segment up to an unescaped terminator.
/// Returns the unescaped text and the terminator, or `None` at end of input.
fn read_segment(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    stop: &[char],
) -> (String, Option<char>) {
    let mut text = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => text.push(escaped),
                None => return (text, None),
            },
            c if stop.contains(&c) => return (text, Some(c)),
            c => text.push(c),
        }
    }
    (text, None)
}

/// Decode one level of an array string into ordered pairs
pub fn decode(array: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut chars = array.chars().peekable();

    while chars.peek().is_some() {
        let (key, stop) = read_segment(&mut chars, &['=', ';']);
        match stop {
            Some('=') => {}
            // segment without '='
            Some(_) => continue,
            None => break,
        }

        let (value, stop) = read_segment(&mut chars, &[';']);
        if stop.is_none() {
            break;
        }

        match pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => pairs.push((key, value)),
        }
    }

    pairs
}

/// Value at a key path; missing keys at any level give ""
pub fn get(array: &str, keys: &[String]) -> String {
    let mut current = array.to_string();
    for key in keys {
        match decode(&current).into_iter().find(|(k, _)| k == key) {
            Some((_, value)) => current = value,
            None => return String::new(),
        }
    }
    current
}

/// New array string with `value` stored at the key path.
/// With no keys the value replaces the array outright.
pub fn set(array: &str, keys: &[String], value: &str) -> String {
    let Some((key, rest)) = keys.split_first() else {
        return value.to_string();
    };

    let mut pairs = decode(array);
    match pairs.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = set(&entry.1, rest, value),
        None => pairs.push((key.clone(), set("", rest, value))),
    }
    encode(pairs)
}

/// Array string without `key`
pub fn remove(array: &str, key: &str) -> String {
    encode(decode(array).into_iter().filter(|(k, _)| k != key))
}

pub fn contains_key(array: &str, key: &str) -> bool {
    decode(array).iter().any(|(k, _)| k == key)
}

pub fn contains_value(array: &str, value: &str) -> bool {
    decode(array).iter().any(|(_, v)| v == value)
}

/// The keys of `array` as a new array indexed from 1
pub fn all_keys(array: &str) -> String {
    from_list(decode(array).into_iter().map(|(k, _)| k))
}

/// Number of distinct keys
pub fn item_count(array: &str) -> usize {
    decode(array).len()
}

pub fn is_array(array: &str) -> bool {
    !decode(array).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_encode_simple() {
        assert_eq!(encode([("1", "a"), ("2", "b")]), "1=a;2=b;");
    }

    #[test]
    fn test_round_trip_with_delimiters() {
        let pairs = vec![
            ("a=b".to_string(), "x;y".to_string()),
            ("back\\slash".to_string(), "\\=;".to_string()),
            ("".to_string(), "".to_string()),
            ("plain".to_string(), "é ünïcode".to_string()),
        ];
        assert_eq!(decode(&encode(pairs.clone())), pairs);
    }

    #[test]
    fn test_nested_set_and_get() {
        let arr = set("", &keys(&["1", "2"]), "x");
        let arr = set(&arr, &keys(&["1", "3"]), "y;z");
        let arr = set(&arr, &keys(&["name"]), "n=1");
        assert_eq!(get(&arr, &keys(&["1", "2"])), "x");
        assert_eq!(get(&arr, &keys(&["1", "3"])), "y;z");
        assert_eq!(get(&arr, &keys(&["name"])), "n=1");
        assert_eq!(item_count(&arr), 2);
        assert_eq!(item_count(&get(&arr, &keys(&["1"]))), 2);
    }

    #[test]
    fn test_missing_keys_are_empty() {
        let arr = encode([("a", "1")]);
        assert_eq!(get(&arr, &keys(&["b"])), "");
        assert_eq!(get(&arr, &keys(&["a", "deeper"])), "");
        assert_eq!(get("not an array", &keys(&["a"])), "");
    }

    #[test]
    fn test_set_without_keys_replaces() {
        assert_eq!(set("1=a;", &[], "plain"), "plain");
        assert_eq!(get("plain", &[]), "plain");
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let arr = set("a=1;b=2;", &keys(&["a"]), "3");
        assert_eq!(arr, "a=3;b=2;");
    }

    #[test]
    fn test_permissive_decode() {
        assert_eq!(decode("junk;a=1;b=2"), vec![("a".into(), "1".into())]);
        assert_eq!(decode("a=1;a=2;"), vec![("a".into(), "2".into())]);
        assert!(!is_array("hello"));
        assert!(!is_array(""));
        assert!(is_array("k=v;"));
    }

    #[test]
    fn test_queries() {
        let arr = encode([("x", "10"), ("y", "20")]);
        assert!(contains_key(&arr, "x"));
        assert!(!contains_key(&arr, "X"));
        assert!(contains_value(&arr, "20"));
        assert!(!contains_value(&arr, "30"));
        assert_eq!(all_keys(&arr), "1=x;2=y;");
        assert_eq!(remove(&arr, "x"), "y=20;");
    }
}
