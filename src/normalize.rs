/// Ensures a user-supplied host or URL carries an `http(s)://` scheme.
///
/// Returns an empty string for missing or blank input; callers treat an empty
/// result as "no target" and must not navigate.
pub fn normalize_url(input: Option<&str>) -> String {
    let Some(raw) = input else {
        return String::new();
    };
    if raw.is_empty() {
        return String::new();
    }

    if has_http_scheme(raw) {
        raw.to_owned()
    } else {
        format!("https://{raw}")
    }
}

fn has_http_scheme(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    [b"http://".as_slice(), b"https://".as_slice()]
        .iter()
        .any(|scheme| {
            bytes.len() >= scheme.len() && bytes[..scheme.len()].eq_ignore_ascii_case(scheme)
        })
}
