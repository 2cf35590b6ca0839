//! Unique slug generation.
//!
//! Slugs are globally unique within their entity kind. Uniqueness is
//! checked against the caller-supplied set of taken slugs, excluding
//! the row's own current slug so re-saving an entity is a no-op.

/// Lowercase, hyphenated form of a display string.
///
/// Alphanumeric runs are kept, everything else collapses to a single
/// hyphen, leading/trailing hyphens are trimmed.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_hyphen = false;
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Slugify `value` and append `-1`, `-2`, ... until the result is not
/// in `taken`. `own` is the entity's current slug and never counts as
/// a collision.
pub fn slugify_unique<'a, I>(value: &str, taken: I, own: Option<&str>) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: Vec<&str> = taken
        .into_iter()
        .filter(|slug| Some(*slug) != own)
        .collect();
    let base = slugify(value);
    let mut unique = base.clone();
    let mut i = 1;
    while taken.contains(&unique.as_str()) {
        unique = format!("{base}-{i}");
        i += 1;
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("My Study"), "my-study");
        assert_eq!(slugify("  Ümläut Test!  "), "ümläut-test");
        assert_eq!(slugify("a--b"), "a-b");
    }

    #[test]
    fn unique_without_collision() {
        assert_eq!(slugify_unique("My Study", ["other"], None), "my-study");
    }

    #[test]
    fn unique_appends_counter() {
        let taken = ["my-study", "my-study-1"];
        assert_eq!(slugify_unique("My Study", taken, None), "my-study-2");
    }

    #[test]
    fn own_slug_is_not_a_collision() {
        let taken = ["my-study"];
        assert_eq!(
            slugify_unique("My Study", taken, Some("my-study")),
            "my-study"
        );
    }
}
