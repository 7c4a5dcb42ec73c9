//! Text rendering for diagnostics.
//!
//! Container errors mention Rust type names, which are long and full of
//! module paths. These helpers turn them into something a person can scan.

/// Joins a dependency chain with arrows.
///
/// # Examples
/// ```
/// use anbar_support::rendering::render_chain;
///
/// let chain = ["Mailer", "Transport", "Mailer"];
/// assert_eq!(render_chain(&chain), "Mailer → Transport → Mailer");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    let mut out = String::new();
    for (i, link) in chain.iter().enumerate() {
        if i > 0 {
            out.push_str(" → ");
        }
        out.push_str(link.as_ref());
    }
    out
}

/// Renders one item per line, each prefixed with `    - `.
///
/// Every line starts with a newline so the result can be appended
/// directly after a heading.
///
/// ```
/// use anbar_support::rendering::render_bullets;
///
/// assert_eq!(render_bullets(&["a", "b"]), "\n    - a\n    - b");
/// assert_eq!(render_bullets::<&str>(&[]), "");
/// ```
pub fn render_bullets<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("\n    - {}", item.as_ref()))
        .collect()
}

/// Strips module paths from a type name, keeping generic structure.
///
/// ```
/// use anbar_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("app::log::ConsoleLogger"), "ConsoleLogger");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn app::log::Logger + Send>"),
///     "Arc<dyn Logger + Send>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut out = String::with_capacity(full_name.len());
    let mut segment_start = 0;
    let bytes = full_name.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b':' if bytes.get(i + 1) == Some(&b':') => {
                i += 2;
                segment_start = i;
                continue;
            }
            b'<' | b'>' | b',' | b' ' | b'(' | b')' | b'[' | b']' | b'&' | b';' => {
                out.push_str(&full_name[segment_start..i]);
                out.push(bytes[i] as char);
                segment_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    out.push_str(&full_name[segment_start..]);
    out
}

/// Picks registered names that look like the requested one.
///
/// Matching is case-insensitive on shortened names. Substring hits rank
/// above shared prefixes; a prefix must be at least three characters to
/// count. At most `limit` names are returned, best first.
pub fn suggest_similar(requested: &str, available: &[&str], limit: usize) -> Vec<String> {
    let wanted = shorten_type_name(requested).to_lowercase();
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<(usize, &str)> = available
        .iter()
        .filter_map(|&candidate| {
            let short = shorten_type_name(candidate).to_lowercase();
            if short == wanted {
                return None;
            }
            if short.contains(&wanted) || wanted.contains(&short) {
                return Some((1000, candidate));
            }
            let prefix = short
                .chars()
                .zip(wanted.chars())
                .take_while(|(a, b)| a == b)
                .count();
            (prefix >= 3).then_some((prefix, candidate))
        })
        .collect();

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, name)| name.to_string())
        .collect()
}
