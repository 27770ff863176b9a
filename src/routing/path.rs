//! URL path composition.

/// Join path fragments with `/`, collapse repeated slashes and strip the trailing slash.
/// Empty fragments contribute nothing; a path made only of empty fragments is `""`.
pub fn format_path<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut path = String::new();
    for part in parts {
        for segment in part.as_ref().split('/').filter(|s| !s.is_empty()) {
            path.push('/');
            path.push_str(segment);
        }
    }
    path
}

/// Path with every `{param}` segment replaced by `{}`. Two routes with the same shape match the
/// same requests.
pub fn shape(path: &str) -> String {
    path.split('/')
        .map(|segment| if is_param(segment) { "{}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

/// Names of the `{param}` segments in declaration order.
pub fn params(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| is_param(s))
        .map(|s| s.trim_start_matches('{').trim_end_matches('}').trim_start_matches('*'))
        .collect()
}

/// Router syntax: `{id}` becomes `:id`, `{*rest}` becomes `*rest`. The root is `/`.
pub fn to_router_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| {
            if !is_param(segment) {
                return segment.to_string();
            }
            let name = &segment[1..segment.len() - 1];
            match name.strip_prefix('*') {
                Some(rest) => format!("*{}", rest),
                None => format!(":{}", name),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_param(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}')
}

/// Check the parameter syntax of a route path. Parameters are written `{name}`; a `{*name}`
/// catch-all may only be the last segment. Router syntax (`:id`, `*rest`) is refused since the
/// route table would treat it as literal text.
pub fn check_route(path: &str) -> Result<(), String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut names: Vec<&str> = Vec::new();
    for (index, segment) in segments.iter().enumerate() {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err(format!("segment '{}' uses router syntax, write {{name}} instead", segment));
        }
        if !segment.contains(['{', '}']) {
            continue;
        }
        if !is_param(segment) {
            return Err(format!("malformed parameter segment '{}'", segment));
        }
        let inner = &segment[1..segment.len() - 1];
        let (catch_all, name) = match inner.strip_prefix('*') {
            Some(name) => (true, name),
            None => (false, inner),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid parameter name in '{}'", segment));
        }
        if catch_all && index + 1 != segments.len() {
            return Err(format!("catch-all '{}' must be the last segment", segment));
        }
        if names.contains(&name) {
            return Err(format!("parameter '{}' appears twice", name));
        }
        names.push(name);
    }
    Ok(())
}
