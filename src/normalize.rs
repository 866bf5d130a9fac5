use url::Url;

/// Comparable page key: lowercase `scheme://host/path`, no query, no fragment,
/// no trailing slash (`/` for an empty path).
pub type NormalizedUrl = String;

/// Canonicalizes any string into a [`NormalizedUrl`].
///
/// Never fails: input that is not a URL degrades to a lowercased, trimmed path,
/// which is still fine for equality checks. `normalize(normalize(u)) == normalize(u)`.
pub fn normalize(raw: &str) -> NormalizedUrl {
    let raw = raw.split('#').next().unwrap_or_default();
    let raw = raw.split('?').next().unwrap_or_default();

    let (scheme, rest) = match raw.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, raw),
    };

    let (netloc, path) = match scheme {
        Some(_) => match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        },
        None => ("", rest),
    };

    let path = path.to_lowercase();
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    match scheme {
        Some(scheme) => format!(
            "{}://{}{}",
            scheme.to_lowercase(),
            netloc.to_lowercase(),
            path
        ),
        None => path.to_owned(),
    }
}

/// Lowercased `host[:port]` of a parsed URL, empty when it has no host.
pub fn netloc(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host.to_lowercase(), port),
        (Some(host), None) => host.to_lowercase(),
        _ => String::new(),
    }
}
