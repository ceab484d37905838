use crate::variant::Variant;

/// Replace `%key%` tokens in `template` with resolved values.
///
/// A token is a `%`, a non-empty key without whitespace, and a closing
/// `%`. Anything else keeps its `%` literally. Tokens that resolve to
/// nothing (or to null) become the empty string. Maps and lists are
/// written as JSON text.
pub fn expand_tokens(template: &str, resolve: &dyn Fn(&str) -> Option<Variant>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('%') {
            Some(end) if is_token_key(&after[..end]) => {
                if let Some(value) = resolve(&after[..end]) {
                    out.push_str(&render(&value));
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Expand tokens in every string inside `value`, recursing through maps and lists
pub fn expand_variant(value: &Variant, resolve: &dyn Fn(&str) -> Option<Variant>) -> Variant {
    match value {
        Variant::String(s) => Variant::String(expand_tokens(s, resolve)),
        Variant::Map(map) => Variant::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_variant(v, resolve)))
                .collect(),
        ),
        Variant::List(items) => {
            Variant::List(items.iter().map(|v| expand_variant(v, resolve)).collect())
        }
        other => other.clone(),
    }
}

fn is_token_key(key: &str) -> bool {
    !key.is_empty() && !key.chars().any(char::is_whitespace)
}

fn render(value: &Variant) -> String {
    match value {
        Variant::Map(_) | Variant::List(_) | Variant::Object(_) => value.to_json().to_string(),
        other => other.convert_to_string().unwrap_or_default(),
    }
}
