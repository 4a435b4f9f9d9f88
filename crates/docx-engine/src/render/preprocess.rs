//! Template XML preparation
//!
//! Word freely splits typed text across runs, so a placeholder typed as
//! `{{ name }}` can be stored as `{{</w:t></w:r><w:r><w:t> name }}`. Before
//! rendering, each part is patched so that every Jinja tag is contiguous
//! text again, and structural statement tags (`{%p`, `{%tr`, `{%tc`, `{%r`)
//! take the place of the paragraph, table row, cell or run that contains them.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Markup between `{` and the second delimiter character
    static ref SPLIT_OPENER: Regex = Regex::new(r"\{((?:<[^>]*>)+)([{%#])").unwrap();

    /// Markup between the first closing character and `}`
    static ref SPLIT_CLOSER: Regex = Regex::new(r"([}%#])((?:<[^>]*>)+)\}").unwrap();

    /// A text-run boundary inside a tag
    static ref RUN_BREAK: Regex = Regex::new(r"(?s)</w:t>.*?(?:<w:t>|<w:t [^>]*>)").unwrap();
}

/// Elements that structural tags can replace, outermost first
const STRUCTURAL_ELEMENTS: [&str; 4] = ["tr", "tc", "p", "r"];

/// Make a Word XML part renderable
pub fn prepare(xml: &str) -> String {
    let merged = SPLIT_OPENER.replace_all(xml, "{${2}");
    let merged = SPLIT_CLOSER.replace_all(&merged, "${1}}");
    let mut prepared = clean_tags(&merged);
    for element in STRUCTURAL_ELEMENTS {
        prepared = collapse_structural(&prepared, element);
    }
    prepared
}

/// Whether a prepared part contains anything for the template engine
pub fn has_template_syntax(xml: &str) -> bool {
    xml.contains("{{") || xml.contains("{%") || xml.contains("{#")
}

/// Find the next tag opener (`{{`, `{%` or `{#`) and its matching closer
fn next_tag(xml: &str) -> Option<(usize, &'static str)> {
    let bytes = xml.as_bytes();
    xml.match_indices('{').find_map(|(idx, _)| match bytes.get(idx + 1) {
        Some(b'{') => Some((idx, "}}")),
        Some(b'%') => Some((idx, "%}")),
        Some(b'#') => Some((idx, "#}")),
        _ => None,
    })
}

/// Strip run breaks and normalise entities inside every tag
fn clean_tags(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;

    while let Some((start, closer)) = next_tag(rest) {
        out.push_str(&rest[..start]);
        let tag = &rest[start..];
        match tag[2..].find(closer) {
            Some(offset) => {
                let end = 2 + offset + closer.len();
                out.push_str(&clean_tag(&tag[..end]));
                rest = &tag[end..];
            }
            None => {
                out.push_str(tag);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

fn clean_tag(tag: &str) -> String {
    let joined = RUN_BREAK.replace_all(tag, "");
    joined
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'")
        .replace('\u{201C}', "\"")
        .replace('\u{201D}', "\"")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Replace each element holding a `{%el ...%}` tag with the bare statement
///
/// Only statement tags collapse. An expression such as `{{r name }}` is left
/// untouched and fails to parse at render time.
fn collapse_structural(xml: &str, element: &str) -> String {
    let open_plain = format!("<w:{}>", element);
    let open_attrs = format!("<w:{} ", element);
    let close = format!("</w:{}>", element);
    let statement = format!("{{%{} ", element);

    let mut xml = xml.to_string();
    let mut cursor = 0;

    while let Some(offset) = xml[cursor..].find(&statement) {
        let tag_start = cursor + offset;
        let body_start = tag_start + statement.len();
        let Some(body_len) = xml[body_start..].find("%}") else {
            break;
        };
        let tag_end = body_start + body_len + 2;

        let before = &xml[cursor..tag_start];
        let element_start = [before.rfind(&open_plain), before.rfind(&open_attrs)]
            .into_iter()
            .flatten()
            .max()
            .map(|i| cursor + i);
        let element_end = xml[tag_end..]
            .find(&close)
            .map(|i| tag_end + i + close.len());

        match (element_start, element_end) {
            (Some(start), Some(end)) => {
                let replacement = format!("{{% {}", xml[body_start..tag_end].trim_start());
                xml.replace_range(start..end, &replacement);
                cursor = start + replacement.len();
            }
            // No enclosing element: leave the tag as-is and move on
            _ => cursor = tag_end,
        }
    }

    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_tag_untouched() {
        let xml = r#"<w:p><w:r><w:t>Hello {{ name }}</w:t></w:r></w:p>"#;
        assert_eq!(prepare(xml), xml);
    }

    #[test]
    fn test_split_opener_merged() {
        let xml = r#"<w:r><w:t>{</w:t></w:r><w:r><w:t>{ name }}</w:t></w:r>"#;
        assert_eq!(prepare(xml), r#"<w:r><w:t>{{ name }}</w:t></w:r>"#);
    }

    #[test]
    fn test_split_closer_merged() {
        let xml = r#"<w:r><w:t>{{ name }</w:t></w:r><w:r><w:t>}</w:t></w:r>"#;
        assert_eq!(prepare(xml), r#"<w:r><w:t>{{ name }}</w:t></w:r>"#);
    }

    #[test]
    fn test_runs_inside_tag_joined() {
        let xml = concat!(
            r#"<w:r><w:t>{{ na</w:t></w:r>"#,
            r#"<w:proofErr w:type="spellStart"/>"#,
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">me }}</w:t></w:r>"#
        );
        assert_eq!(prepare(xml), r#"<w:r><w:t>{{ name }}</w:t></w:r>"#);
    }

    #[test]
    fn test_entities_and_smart_quotes_normalised() {
        let xml = "<w:t>{% if role == \u{201C}dev\u{201D} and n &gt; 1 %}x{% endif %}</w:t>";
        assert_eq!(
            prepare(xml),
            "<w:t>{% if role == \"dev\" and n > 1 %}x{% endif %}</w:t>"
        );
    }

    #[test]
    fn test_entities_outside_tags_kept() {
        let xml = "<w:t>A &amp; B {{ x }}</w:t>";
        assert_eq!(prepare(xml), xml);
    }

    #[test]
    fn test_paragraph_tag_replaces_paragraph() {
        let xml = concat!(
            r#"<w:body><w:p w:rsidR="1"><w:r><w:t>{%p if show %}</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>Shown</w:t></w:r></w:p>"#,
            r#"<w:p><w:pPr/><w:r><w:t>{%p endif %}</w:t></w:r></w:p></w:body>"#
        );
        assert_eq!(
            prepare(xml),
            r#"<w:body>{% if show %}<w:p><w:r><w:t>Shown</w:t></w:r></w:p>{% endif %}</w:body>"#
        );
    }

    #[test]
    fn test_row_tag_replaces_row() {
        let xml = concat!(
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>{%tr for s in skills %}</w:t></w:r></w:p></w:tc></w:tr>"#,
            r#"<w:tr><w:tc><w:p><w:r><w:t>{{ s }}</w:t></w:r></w:p></w:tc></w:tr>"#,
            r#"<w:tr><w:tc><w:p><w:r><w:t>{%tr endfor %}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#
        );
        assert_eq!(
            prepare(xml),
            concat!(
                r#"<w:tbl>{% for s in skills %}"#,
                r#"<w:tr><w:tc><w:p><w:r><w:t>{{ s }}</w:t></w:r></w:p></w:tc></w:tr>"#,
                r#"{% endfor %}</w:tbl>"#
            )
        );
    }

    #[test]
    fn test_run_statement_tag() {
        let xml = r#"<w:p><w:r><w:rPr/><w:t>{%r if bold %}</w:t></w:r><w:r><w:t>x</w:t></w:r></w:p>"#;
        assert_eq!(prepare(xml), r#"<w:p>{% if bold %}<w:r><w:t>x</w:t></w:r></w:p>"#);
    }

    #[test]
    fn test_element_expression_not_collapsed() {
        let xml = r#"<w:p><w:r><w:t>{{r rich }}</w:t></w:r></w:p>"#;
        assert_eq!(prepare(xml), xml);
    }

    #[test]
    fn test_structural_tag_without_element_left_alone() {
        let xml = "{%p if x %}";
        assert_eq!(prepare(xml), xml);
    }

    #[test]
    fn test_unterminated_tag_left_alone() {
        let xml = "<w:t>{{ name</w:t>";
        assert_eq!(prepare(xml), xml);
    }

    #[test]
    fn test_has_template_syntax() {
        assert!(has_template_syntax("a {{ b }}"));
        assert!(has_template_syntax("{% if %}"));
        assert!(!has_template_syntax("<w:t>{plain}</w:t>"));
    }
}
