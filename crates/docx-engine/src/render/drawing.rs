//! DrawingML markup for inline pictures

/// Relationship type for embedded images
pub const IMAGE_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// `wp:docPr` opener written by [`inline_picture`] until ids are assigned
const PENDING_DOC_PR: &str = r#"<wp:docPr id="docgen-pending""#;

/// Escape text for use in XML attributes and character data
pub fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Markup for an inline picture placed where a `{{ field }}` tag stood
///
/// The tag sits inside a `<w:t>`, so the markup closes the current text run,
/// emits the drawing in its own run and reopens a text run for whatever
/// follows the tag.
///
/// The same markup can be emitted many times by a loop, so the `wp:docPr` id
/// is left pending; [`assign_picture_ids`] numbers every copy after rendering.
pub fn inline_picture(rel_id: &str, name: &str, extent: (u64, u64)) -> String {
    let (cx, cy) = extent;
    let name = xml_escape(name);
    format!(
        concat!(
            r#"</w:t></w:r><w:r><w:drawing>"#,
            r#"<wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"{pending} name="{name}"/>"#,
            r#"<wp:cNvGraphicFramePr>"#,
            r#"<a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/>"#,
            r#"</wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="0" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline>"#,
            r#"</w:drawing></w:r><w:r><w:t xml:space="preserve">"#,
        ),
        cx = cx,
        cy = cy,
        pending = PENDING_DOC_PR,
        name = name,
        rel_id = rel_id,
    )
}

/// Give every pending picture in a rendered part its own `wp:docPr` id
///
/// Ids continue from `next_id`, which is advanced past the last one used.
pub fn assign_picture_ids(xml: &str, next_id: &mut u32) -> String {
    let mut pieces = xml.split(PENDING_DOC_PR);
    let mut numbered = String::with_capacity(xml.len());
    numbered.push_str(pieces.next().unwrap_or_default());
    for piece in pieces {
        *next_id += 1;
        numbered.push_str(&format!(r#"<wp:docPr id="{}""#, next_id));
        numbered.push_str(piece);
    }
    numbered
}

/// A `<Relationship>` element pointing at an image part
pub fn image_relationship(rel_id: &str, target: &str) -> String {
    format!(
        r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
        rel_id,
        IMAGE_RELATIONSHIP_TYPE,
        xml_escape(target)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape(r#"a<b>&"c'"#), "a&lt;b&gt;&amp;&quot;c&apos;");
    }

    #[test]
    fn test_inline_picture_closes_and_reopens_run() {
        let xml = inline_picture("rIdDocgen1", "photo", (1_440_000, 720_000));
        assert!(xml.starts_with("</w:t></w:r><w:r><w:drawing>"));
        assert!(xml.ends_with(r#"<w:r><w:t xml:space="preserve">"#));
        assert!(xml.contains(r#"<wp:extent cx="1440000" cy="720000"/>"#));
        assert!(xml.contains(r#"r:embed="rIdDocgen1""#));
        assert!(xml.contains(r#"<wp:docPr id="docgen-pending" name="photo"/>"#));
    }

    #[test]
    fn test_each_copy_gets_its_own_id() {
        let picture = inline_picture("rIdDocgen1", "photo", (10, 10));
        let xml = format!("<w:t>{}a{}b</w:t>", picture, picture);
        let mut next_id = 7;
        let numbered = assign_picture_ids(&xml, &mut next_id);

        assert_eq!(next_id, 9);
        assert!(numbered.contains(r#"<wp:docPr id="8" name="photo"/>"#));
        assert!(numbered.contains(r#"<wp:docPr id="9" name="photo"/>"#));
        assert!(!numbered.contains("docgen-pending"));
    }

    #[test]
    fn test_part_without_pictures_is_unchanged() {
        let mut next_id = 3;
        let xml = r#"<w:p><wp:docPr id="1" name="logo"/></w:p>"#;
        assert_eq!(assign_picture_ids(xml, &mut next_id), xml);
        assert_eq!(next_id, 3);
    }

    #[test]
    fn test_relationship_markup() {
        assert_eq!(
            image_relationship("rIdDocgen2", "media/docgen_image2.png"),
            concat!(
                r#"<Relationship Id="rIdDocgen2" "#,
                r#"Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" "#,
                r#"Target="media/docgen_image2.png"/>"#
            )
        );
    }
}
