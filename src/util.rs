use http::header::{HeaderMap, HeaderName};

/// Overlay `src` onto `dst`, header tier semantics: a name present in
/// `src` replaces every value `dst` held for it, while multiple values
/// within `src` itself are all kept.
pub(crate) fn replace_headers(dst: &mut HeaderMap, src: HeaderMap) {
    // HeaderMap::into_iter yields the name only for the first value of a
    // run; further values of the same name arrive with None.
    let mut current: Option<HeaderName> = None;
    for (name, value) in src {
        match name {
            Some(name) => {
                dst.insert(name.clone(), value);
                current = Some(name);
            }
            None => {
                let name = current.as_ref().expect("a value run starts with its name");
                dst.append(name.clone(), value);
            }
        }
    }
}
