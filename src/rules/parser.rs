use super::condition::{LogicalOp, Matcher, MatcherOp, RuleCondition};
use super::{Consequence, Rule, RuleError, RuleScope};
use crate::event::{EventSource, EventType};
use crate::variant::{Variant, VariantMap};

/// Result of parsing a rules document
#[derive(Debug, Default)]
pub struct ParsedBundle {
    /// Rules that parsed, in document order
    pub rules: Vec<Rule>,
    /// One entry per rejected rule
    pub errors: Vec<RuleError>,
    /// The document's own `version` field, if any
    pub document_version: Option<i64>,
}

/// Parse a rules document.
///
/// Accepts `{"version": n, "rules": [...]}` or a bare list of rules. Only
/// a document of the wrong shape is an error; a rule that fails to parse
/// is recorded in [`ParsedBundle::errors`] and skipped.
pub fn parse_bundle(document: &Variant) -> Result<ParsedBundle, RuleError> {
    let (definitions, document_version) = match document {
        Variant::List(items) => (items.as_slice(), None),
        Variant::Map(map) => {
            let rules = match map.get("rules") {
                Some(Variant::List(items)) => items.as_slice(),
                Some(other) => {
                    return Err(RuleError::InvalidDocument(format!(
                        "\"rules\" must be a list, found {}",
                        other.kind()
                    )))
                }
                None => &[][..],
            };
            let version = map.get("version").and_then(as_i64);
            (rules, version)
        }
        other => {
            return Err(RuleError::InvalidDocument(format!(
                "expected a map or list, found {}",
                other.kind()
            )))
        }
    };

    let mut bundle = ParsedBundle {
        document_version,
        ..ParsedBundle::default()
    };

    for (index, definition) in definitions.iter().enumerate() {
        match parse_rule(definition) {
            Ok(rule) => bundle.rules.push(rule),
            Err(reason) => bundle.errors.push(RuleError::Parse { index, reason }),
        }
    }

    Ok(bundle)
}

fn parse_rule(definition: &Variant) -> Result<Rule, String> {
    let map = as_map(definition, "rule")?;

    let scope = match map.get("scope") {
        Some(scope) => parse_scope(scope)?,
        None => RuleScope::default(),
    };

    let condition = parse_condition(
        map.get("condition")
            .ok_or_else(|| "missing \"condition\"".to_string())?,
    )?;

    let consequences = match map.get("consequences") {
        Some(Variant::List(items)) => items
            .iter()
            .map(parse_consequence)
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(format!("\"consequences\" must be a list, found {}", other.kind())),
        None => return Err("missing \"consequences\"".to_string()),
    };
    if consequences.is_empty() {
        return Err("rule has no consequences".to_string());
    }

    Ok(Rule {
        scope,
        condition,
        consequences,
    })
}

fn parse_scope(value: &Variant) -> Result<RuleScope, String> {
    let map = as_map(value, "scope")?;

    let event_type = match optional_string(map, "type")? {
        Some(name) => Some(EventType::get(name).ok_or("scope type is blank")?),
        None => None,
    };
    let source = match optional_string(map, "source")? {
        Some(name) => Some(EventSource::get(name).ok_or("scope source is blank")?),
        None => None,
    };

    Ok(RuleScope { event_type, source })
}

fn parse_condition(value: &Variant) -> Result<RuleCondition, String> {
    let map = as_map(value, "condition")?;
    let kind = required_string(map, "type")?;
    let definition = as_map(
        map.get("definition")
            .ok_or_else(|| "condition is missing \"definition\"".to_string())?,
        "definition",
    )?;

    match kind.to_ascii_lowercase().as_str() {
        "group" => {
            let logic = match required_string(definition, "logic")?.to_ascii_lowercase().as_str() {
                "and" => LogicalOp::And,
                "or" => LogicalOp::Or,
                other => return Err(format!("unknown group logic \"{}\"", other)),
            };
            let conditions = match definition.get("conditions") {
                Some(Variant::List(items)) => items
                    .iter()
                    .map(parse_condition)
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
                Some(other) => {
                    return Err(format!("\"conditions\" must be a list, found {}", other.kind()))
                }
            };
            Ok(RuleCondition::Group { logic, conditions })
        }
        "matcher" => parse_matcher(definition).map(RuleCondition::Matcher),
        other => Err(format!("unknown condition type \"{}\"", other)),
    }
}

fn parse_matcher(definition: &VariantMap) -> Result<Matcher, String> {
    let key = required_string(definition, "key")?;
    if key.trim().is_empty() {
        return Err("matcher key is blank".to_string());
    }

    let op_name = required_string(definition, "matcher")?;
    let op = MatcherOp::parse(op_name).ok_or_else(|| format!("unknown matcher \"{}\"", op_name))?;

    let values = match definition.get("values") {
        Some(Variant::List(items)) => items.clone(),
        Some(Variant::Null) | None => Vec::new(),
        Some(single) => vec![single.clone()],
    };
    if op.takes_values() && values.is_empty() {
        return Err(format!("matcher \"{}\" on \"{}\" has no values", op, key));
    }

    Ok(Matcher {
        key: key.to_string(),
        op,
        values,
    })
}

fn parse_consequence(value: &Variant) -> Result<Consequence, String> {
    let map = as_map(value, "consequence")?;

    let detail = match map.get("detail") {
        Some(Variant::Map(detail)) => detail.clone(),
        Some(Variant::Null) | None => VariantMap::new(),
        Some(other) => return Err(format!("consequence detail must be a map, found {}", other.kind())),
    };

    Ok(Consequence {
        id: optional_string(map, "id")?.map(str::to_string),
        kind: optional_string(map, "type")?.map(str::to_string),
        name: optional_string(map, "name")?.map(str::to_string),
        event_type: optional_string(map, "eventType")?.map(str::to_string),
        detail,
    })
}

fn as_map<'a>(value: &'a Variant, what: &str) -> Result<&'a VariantMap, String> {
    match value {
        Variant::Map(map) => Ok(map),
        other => Err(format!("{} must be a map, found {}", what, other.kind())),
    }
}

fn required_string<'a>(map: &'a VariantMap, key: &str) -> Result<&'a str, String> {
    optional_string(map, key)?.ok_or_else(|| format!("missing \"{}\"", key))
}

fn optional_string<'a>(map: &'a VariantMap, key: &str) -> Result<Option<&'a str>, String> {
    match map.get(key) {
        Some(Variant::String(s)) => Ok(Some(s.as_str())),
        Some(Variant::Null) | None => Ok(None),
        Some(other) => Err(format!("\"{}\" must be a string, found {}", key, other.kind())),
    }
}

fn as_i64(value: &Variant) -> Option<i64> {
    match value {
        Variant::Integer(i) => Some(i64::from(*i)),
        Variant::Long(l) => Some(*l),
        _ => None,
    }
}
