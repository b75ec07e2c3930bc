//! Text formatting helpers for terminal tables.

use unicode_width::UnicodeWidthChar;

/// Truncate text to fit within the specified width using unicode-aware truncation.
///
/// Returns a string that fits within `max_width` columns, appending an
/// ellipsis if truncation occurred.
///
/// # Examples
///
/// ```
/// use elephant::utils::truncate_with_ellipsis;
///
/// assert_eq!(truncate_with_ellipsis("Hello World", 8), "Hello...");
/// assert_eq!(truncate_with_ellipsis("Hi", 8), "Hi");
/// ```
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }

    let char_widths: Vec<(char, usize)> = text
        .chars()
        .map(|c| (c, c.width().unwrap_or(1)))
        .collect();

    let total_width: usize = char_widths.iter().map(|(_, w)| *w).sum();
    if total_width <= max_width {
        return text.to_string();
    }

    let mut current_width = 0;
    let mut end_idx = 0;
    for (i, (_, w)) in char_widths.iter().enumerate() {
        if current_width + w > max_width.saturating_sub(3) {
            break;
        }
        current_width += w;
        end_idx = i + 1;
    }

    if end_idx == 0 {
        return "...".to_string();
    }

    let truncated: String = char_widths[..end_idx].iter().map(|(c, _)| *c).collect();
    format!("{}...", truncated.trim_end())
}

/// Truncate text at word boundaries to fit within the specified width.
///
/// Falls back to [`truncate_with_ellipsis`] when the first word alone is too long.
pub fn truncate_at_word(text: &str, max_width: usize) -> String {
    if display_width(text) <= max_width {
        return text.to_string();
    }

    let budget = max_width.saturating_sub(3);
    let mut out = String::new();
    for word in text.split_whitespace() {
        let candidate_width = display_width(&out) + usize::from(!out.is_empty()) + display_width(word);
        if candidate_width > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }

    if out.is_empty() {
        truncate_with_ellipsis(text, max_width)
    } else {
        format!("{}...", out)
    }
}

fn display_width(text: &str) -> usize {
    text.chars().map(|c| c.width().unwrap_or(1)).sum()
}

/// "First Author, Second Author et al." within `max_width`
pub fn format_authors(authors: &[String], max_width: usize) -> String {
    let joined = match authors.len() {
        0 => return String::new(),
        1 | 2 => authors.join(", "),
        _ => format!("{}, {} et al.", authors[0], authors[1]),
    };
    truncate_with_ellipsis(&joined, max_width)
}

/// Signed change, e.g. `+12`, `-3`, `0`
pub fn format_delta(delta: i64) -> String {
    if delta > 0 {
        format!("+{}", delta)
    } else {
        delta.to_string()
    }
}
