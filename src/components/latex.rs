use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PAREN_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\\((.*?)\\\)").expect("valid inline math pattern"));
static BRACKET_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\\[(.*?)\\\]").expect("valid block math pattern"));

/// Rewrites `\( … \)` and `\[ … \]` math delimiters to `$ … $`, the only
/// form the markdown renderer understands. Everything else is left alone.
///
/// Runs to a fixed point so that applying it again is always a no-op, even
/// for nested delimiters. Each rewrite shortens the text, so it terminates.
pub fn clean_latex(text: &str) -> String {
    let mut current = rewrite_once(text);
    loop {
        let next = rewrite_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn rewrite_once(text: &str) -> String {
    let step = PAREN_MATH.replace_all(text, dollars);
    BRACKET_MATH.replace_all(&step, dollars).into_owned()
}

fn dollars(caps: &Captures) -> String {
    format!("${}$", &caps[1])
}
