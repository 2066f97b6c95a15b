//! Identifier helpers: StudlyCase -> snake_case, English plurals, slugs, path base names.

/// Convert an identifier from StudlyCase/camelCase to snake_case.
/// e.g. "BlogPosts" -> "blog_posts", "publicationStatus" -> "publication_status"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert snake_case (or space separated words) to StudlyCase.
/// e.g. "blog_post" -> "BlogPost"
pub fn to_studly_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

const UNCOUNTABLE: &[&str] = &[
    "audio", "data", "equipment", "feedback", "fish", "information", "media", "metadata", "money",
    "news", "rice", "series", "sheep", "species", "staff",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("child", "children"),
    ("foot", "feet"),
    ("goose", "geese"),
    ("man", "men"),
    ("mouse", "mice"),
    ("person", "people"),
    ("tooth", "teeth"),
    ("woman", "women"),
];

/// Pluralize the last word of an identifier, preserving the case of what precedes it.
/// e.g. "Article" -> "Articles", "BlogCategory" -> "BlogCategories", "Person" -> "People"
pub fn pluralize(word: &str) -> String {
    let split = last_word_start(word);
    let (head, last) = word.split_at(split);
    let lower = last.to_lowercase();
    if lower.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == lower) {
        let starts_upper = last.chars().next().map(char::is_uppercase).unwrap_or(false);
        let plural = if starts_upper {
            to_studly_case(plural)
        } else {
            (*plural).to_string()
        };
        return format!("{}{}", head, plural);
    }
    let suffix = if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        "es"
    } else if lower.ends_with('y') && !ends_with_vowel_y(&lower) {
        return format!("{}{}ies", head, &last[..last.len() - 1]);
    } else {
        "s"
    };
    format!("{}{}{}", head, last, suffix)
}

fn ends_with_vowel_y(lower: &str) -> bool {
    let mut rev = lower.chars().rev();
    rev.next();
    matches!(rev.next(), Some('a' | 'e' | 'i' | 'o' | 'u'))
}

/// Byte index where the last StudlyCase/snake_case word begins.
fn last_word_start(word: &str) -> usize {
    word.char_indices()
        .filter(|(i, c)| *i > 0 && (c.is_uppercase() || *c == '_'))
        .map(|(i, c)| if c == '_' { i + 1 } else { i })
        .last()
        .unwrap_or(0)
}

/// Last segment of a `::`-separated type path.
/// e.g. "app::models::BlogPost" -> "BlogPost"
pub fn base_name(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Lowercase slug: every run of characters that are not ASCII letters or digits becomes one '-'.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}
