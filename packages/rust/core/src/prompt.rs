//! Instruction rendering and text bounding.

use std::borrow::Cow;

/// Substitute `{name}` placeholders in `template` with values from `vars`.
///
/// Single pass over the template: substituted values are copied verbatim and
/// never re-scanned, so braces inside document text or memory cannot inject
/// placeholders. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let extra: usize = vars.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let substituted = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });

        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// The first `max_chars` characters of `text`, with a marker line when cut.
///
/// Cuts on a char boundary, so multi-byte text is never split mid-character.
pub fn excerpt(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => Cow::Owned(format!(
            "{}\n[... excerpt truncated at {max_chars} characters ...]",
            &text[..cut]
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholders() {
        let out = render(
            "Read {handle}.\n\n[History]\n{memory}",
            &[("handle", "doc1"), ("memory", "earlier chat")],
        );
        assert_eq!(out, "Read doc1.\n\n[History]\nearlier chat");
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let out = render("{greeting}, {name}!", &[("name", "Ada")]);
        assert_eq!(out, "{greeting}, Ada!");
    }

    #[test]
    fn values_are_not_rescanned() {
        let out = render(
            "Q: {question}\nM: {memory}",
            &[("question", "what is {memory}?"), ("memory", "secret")],
        );
        assert_eq!(out, "Q: what is {memory}?\nM: secret");
    }

    #[test]
    fn unbalanced_braces_are_kept() {
        assert_eq!(render("a { b", &[("b", "x")]), "a { b");
        assert_eq!(render("{{memory}}", &[("memory", "m")]), "{m}");
    }

    #[test]
    fn short_text_is_borrowed() {
        let text = "short text";
        assert!(matches!(excerpt(text, 100), Cow::Borrowed("short text")));
        assert!(matches!(excerpt(text, 10), Cow::Borrowed(_)));
    }

    #[test]
    fn long_text_is_cut_with_marker() {
        let text = "a".repeat(200);
        let out = excerpt(&text, 100);
        assert!(out.starts_with(&"a".repeat(100)));
        assert!(!out.starts_with(&"a".repeat(101)));
        assert!(out.contains("truncated at 100 characters"));
    }

    #[test]
    fn cut_respects_char_boundaries() {
        let text = "日本語のテキスト";
        let out = excerpt(text, 3);
        assert!(out.starts_with("日本語\n"));
    }
}
