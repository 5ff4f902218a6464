use super::validation::extension_of;

const INLINE_TEXT_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain;charset=utf-8"),
    ("json", "application/json;charset=utf-8"),
    ("csv", "text/csv;charset=utf-8"),
    ("xml", "application/xml;charset=utf-8"),
    ("html", "text/html;charset=utf-8"),
    ("css", "text/css;charset=utf-8"),
    ("js", "application/javascript;charset=utf-8"),
];

pub fn resolve_view_content_type(original_name: &str, stored_content_type: &str) -> String {
    if let Some(ext) = extension_of(original_name) {
        let ext = ext.to_lowercase();
        if let Some((_, content_type)) = INLINE_TEXT_TYPES.iter().find(|(known, _)| *known == ext) {
            return content_type.to_string();
        }
    }

    if stored_content_type.trim().is_empty() {
        mime::APPLICATION_OCTET_STREAM.to_string()
    } else {
        stored_content_type.to_string()
    }
}

pub fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}
