//! URL authority rule used before fetching sitemapindex members.
//!
//! A master document has authority over a derived URI when both share a
//! scheme and the derived host either equals the master host (in which case
//! the master's directory path must prefix the derived path) or is a
//! subdomain of it.

/// Reports whether `master` has authority over `derived`.
///
/// Unparseable URIs never grant authority.
#[must_use]
pub fn has_authority(master: &str, derived: &str) -> bool {
    let (Some(master), Some(derived)) = (split_url(master), split_url(derived)) else {
        return false;
    };
    if master.scheme != derived.scheme {
        return false;
    }
    if master.host == derived.host {
        derived.path.starts_with(&directory_of(master.path))
    } else {
        derived
            .host
            .strip_suffix(master.host)
            .is_some_and(|head| head.ends_with('.'))
    }
}

struct UrlParts<'a> {
    scheme: &'a str,
    host: &'a str,
    path: &'a str,
}

fn split_url(url: &str) -> Option<UrlParts<'_>> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme.is_empty() {
        return None;
    }
    let (host, path) = match rest.split_once('/') {
        Some((host, path)) => (host, path),
        None => (rest, ""),
    };
    if host.is_empty() {
        return None;
    }
    Some(UrlParts {
        scheme,
        host,
        path,
    })
}

/// Chops a path to its directory part: everything up to and including the
/// last `/`, or the empty string for a single-segment path.
fn directory_of(path: &str) -> String {
    match path.rfind('/') {
        Some(index) => path[..=index].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::has_authority;

    #[test]
    fn same_directory_is_authorized() {
        assert!(has_authority(
            "http://example.com/rs/capability.xml",
            "http://example.com/rs/resourcelist.xml"
        ));
    }

    #[test]
    fn deeper_path_is_authorized() {
        assert!(has_authority(
            "http://example.com/rs/index.xml",
            "http://example.com/rs/parts/sitemap00000.xml"
        ));
    }

    #[test]
    fn sibling_directory_is_not_authorized() {
        assert!(!has_authority(
            "http://example.com/rs/index.xml",
            "http://example.com/other/sitemap.xml"
        ));
    }

    #[test]
    fn shallower_path_is_not_authorized() {
        assert!(!has_authority(
            "http://example.com/rs/deep/index.xml",
            "http://example.com/rs/sitemap.xml"
        ));
    }

    #[test]
    fn subdomain_is_authorized_but_parent_is_not() {
        assert!(has_authority(
            "http://example.com/index.xml",
            "http://data.example.com/sitemap.xml"
        ));
        assert!(!has_authority(
            "http://data.example.com/index.xml",
            "http://example.com/sitemap.xml"
        ));
    }

    #[test]
    fn unrelated_host_suffix_is_not_a_subdomain() {
        assert!(!has_authority(
            "http://example.com/index.xml",
            "http://notexample.com/sitemap.xml"
        ));
    }

    #[test]
    fn scheme_must_match() {
        assert!(!has_authority(
            "https://example.com/index.xml",
            "http://example.com/sitemap.xml"
        ));
    }

    #[test]
    fn unparseable_urls_grant_nothing() {
        assert!(!has_authority("not-a-url", "http://example.com/x"));
        assert!(!has_authority("http://example.com/x", "not-a-url"));
    }
}
