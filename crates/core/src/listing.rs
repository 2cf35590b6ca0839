//! Escape-aware comma-separated list handling.
//!
//! Values are separated by `,`; a literal comma inside a value is
//! escaped as `\,`. Used wherever permutations, scale labels, or URL
//! lists are stored as a single string.

/// Parse a comma-separated list, honoring `\,` escapes.
///
/// An empty input yields an empty list (not a single empty value).
pub fn split_list_string(value: &str) -> Vec<String> {
    let mut values = Vec::new();
    if value.is_empty() {
        return values;
    }
    let mut current = String::new();
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(&next) = chars.peek() {
                    chars.next();
                    current.push(next);
                }
            }
            ',' => {
                values.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    values.push(current.trim().to_string());
    values
}

/// Join values with `,`, escaping literal commas as `\,`.
pub fn to_list_string<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| value.as_ref().replace(',', "\\,"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-joined permutation of integers, e.g. `"2,0,1"`.
pub fn split_int_list(value: &str) -> Option<Vec<usize>> {
    value
        .split(',')
        .map(|part| part.trim().parse::<usize>().ok())
        .collect()
}

/// Emit a permutation of integers as a comma-joined string.
pub fn to_int_list(values: &[usize]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_plain() {
        assert_eq!(split_list_string("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn split_escaped_comma() {
        assert_eq!(split_list_string("a\\,b,c"), vec!["a,b", "c"]);
    }

    #[test]
    fn split_empty() {
        assert!(split_list_string("").is_empty());
    }

    #[test]
    fn split_strips_final_value() {
        assert_eq!(split_list_string("a,b, c "), vec!["a", "b", "c"]);
    }

    #[test]
    fn round_trip() {
        let values = vec!["yes, definitely".to_string(), "no".to_string()];
        assert_eq!(split_list_string(&to_list_string(&values)), values);
    }

    #[test]
    fn int_list_round_trip() {
        let order = vec![2, 0, 1];
        assert_eq!(split_int_list(&to_int_list(&order)), Some(order));
    }

    #[test]
    fn int_list_rejects_garbage() {
        assert_eq!(split_int_list("1,x,2"), None);
    }
}
