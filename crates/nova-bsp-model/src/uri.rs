/// Last path segment of a URI (`file:///a/b/c-sources.jar` -> `c-sources.jar`).
pub fn uri_file_name(uri: &str) -> &str {
    let without_query = uri.split_once(['?', '#']).map_or(uri, |(head, _)| head);
    let trimmed = without_query.trim_end_matches('/');
    trimmed
        .rsplit_once('/')
        .map_or(trimmed, |(_, name)| name)
}

/// Parent "directory" of a URI (`file:///a/b/C.java` -> `file:///a/b`).
pub fn uri_parent(uri: &str) -> Option<&str> {
    let trimmed = uri.trim_end_matches('/');
    let (parent, _) = trimmed.rsplit_once('/')?;
    let bare = parent.trim_end_matches('/');
    (!bare.is_empty() && !bare.ends_with(':')).then_some(parent)
}

/// Returns `true` when `uri` equals `root` or lies underneath it.
pub fn uri_is_within(uri: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    match uri.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
