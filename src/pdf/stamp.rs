//! Page-number drawing using lopdf
//!
//! Numbers are written straight into each page's content: the existing
//! content is wrapped in `q`/`Q` so any transformation it leaves behind is
//! undone before our text is drawn in default user space.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::Result;
use crate::layout::Anchor;

/// Resource name of the page-number font inside each page's Font dictionary
const FONT_RESOURCE: &str = "PdfBinderNum";

/// Use Helvetica (standard PDF font - no embedding needed)
pub fn use_helvetica_font(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Draw `label` at `anchor` (absolute page coordinates) on one page
pub fn stamp_page(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
    anchor: Anchor,
    label: &str,
    font_size: f32,
) -> Result<()> {
    add_font_to_page_resources(doc, page_id, font_id)?;

    let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    prepend_content_to_page(doc, page_id, save_id)?;

    let content = page_number_content(label, anchor, font_size);
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
    append_content_to_page(doc, page_id, content_id)?;

    Ok(())
}

/// Content stream that restores the wrapped state and draws the number
fn page_number_content(label: &str, anchor: Anchor, font_size: f32) -> String {
    let mut content = String::from("Q\n");
    content.push_str("q\n");
    content.push_str("0 g\n"); // gray fill color (0 = black)
    content.push_str("BT\n");
    content.push_str(&format!("/{} {} Tf\n", FONT_RESOURCE, pdf_number(font_size)));
    content.push_str(&format!(
        "1 0 0 1 {} {} Tm\n",
        pdf_number(anchor.x),
        pdf_number(anchor.y)
    ));
    content.push_str(&format!("({}) Tj\n", escape_pdf_string(label)));
    content.push_str("ET\n");
    content.push_str("Q\n");
    content
}

/// Format a coordinate without a trailing `.0` for whole numbers
fn pdf_number(value: f32) -> String {
    if (value - value.round()).abs() < 0.005 {
        format!("{}", value.round() as i64)
    } else {
        let s = format!("{value:.2}");
        s.trim_end_matches('0').to_string()
    }
}

/// Escape special characters in PDF strings
fn escape_pdf_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

/// Add font reference to page's Resources dictionary
///
/// Resources held by reference are copied onto the page so pages sharing
/// one Resources object are not affected.
fn add_font_to_page_resources(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> Result<()> {
    let mut resources = match doc.get_dictionary(page_id)?.get(b"Resources") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(res_id)) => doc
            .get_dictionary(*res_id)
            .cloned()
            .unwrap_or_default(),
        _ => Dictionary::new(),
    };

    // The Font subdictionary may itself be indirect
    let mut fonts = match resources.get(b"Font") {
        Ok(Object::Dictionary(f)) => f.clone(),
        Ok(Object::Reference(font_dict_id)) => doc
            .get_dictionary(*font_dict_id)
            .cloned()
            .unwrap_or_default(),
        _ => Dictionary::new(),
    };

    fonts.set(FONT_RESOURCE, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    doc.get_dictionary_mut(page_id)?
        .set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Prepend a content stream to a page's Contents
fn prepend_content_to_page(doc: &mut Document, page_id: ObjectId, new_content_id: ObjectId) -> Result<()> {
    let page_dict = doc.get_dictionary_mut(page_id)?;
    let existing_content = page_dict.get(b"Contents").ok().cloned();

    match existing_content {
        Some(Object::Reference(content_id)) => {
            // Convert single reference to array, PREPEND our content
            page_dict.set(
                "Contents",
                Object::Array(vec![
                    Object::Reference(new_content_id),
                    Object::Reference(content_id),
                ]),
            );
        }
        Some(Object::Array(mut content_array)) => {
            content_array.insert(0, Object::Reference(new_content_id));
            page_dict.set("Contents", Object::Array(content_array));
        }
        _ => {
            page_dict.set("Contents", Object::Array(vec![Object::Reference(new_content_id)]));
        }
    }

    Ok(())
}

/// Append a content stream to a page's Contents
///
/// Appended content is drawn last, on top of any background fills.
fn append_content_to_page(doc: &mut Document, page_id: ObjectId, new_content_id: ObjectId) -> Result<()> {
    let page_dict = doc.get_dictionary_mut(page_id)?;
    let existing_content = page_dict.get(b"Contents").ok().cloned();

    match existing_content {
        Some(Object::Reference(content_id)) => {
            page_dict.set(
                "Contents",
                Object::Array(vec![
                    Object::Reference(content_id),
                    Object::Reference(new_content_id),
                ]),
            );
        }
        Some(Object::Array(mut content_array)) => {
            content_array.push(Object::Reference(new_content_id));
            page_dict.set("Contents", Object::Array(content_array));
        }
        _ => {
            page_dict.set("Contents", Object::Array(vec![Object::Reference(new_content_id)]));
        }
    }

    Ok(())
}
