use crate::variant::Variant;
use std::cmp::Ordering;
use std::fmt;

/// Boolean combinator for condition groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Comparison applied by a leaf matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Exists,
    NotExists,
}

impl MatcherOp {
    /// Parse the short (`eq`) or long (`equals`) operator name
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name.trim().to_ascii_lowercase().as_str() {
            "eq" | "equals" => MatcherOp::Equals,
            "ne" | "notequals" => MatcherOp::NotEquals,
            "gt" | "greaterthan" => MatcherOp::GreaterThan,
            "ge" | "greaterequal" | "greaterthanorequals" => MatcherOp::GreaterEqual,
            "lt" | "lessthan" => MatcherOp::LessThan,
            "le" | "lessequal" | "lessthanorequals" => MatcherOp::LessEqual,
            "co" | "contains" => MatcherOp::Contains,
            "nc" | "notcontains" => MatcherOp::NotContains,
            "sw" | "startswith" => MatcherOp::StartsWith,
            "ew" | "endswith" => MatcherOp::EndsWith,
            "ex" | "exists" => MatcherOp::Exists,
            "nx" | "notexists" => MatcherOp::NotExists,
            _ => return None,
        };
        Some(op)
    }

    /// Whether the operator compares against literal values
    pub fn takes_values(self) -> bool {
        !matches!(self, MatcherOp::Exists | MatcherOp::NotExists)
    }
}

impl fmt::Display for MatcherOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatcherOp::Equals => "eq",
            MatcherOp::NotEquals => "ne",
            MatcherOp::GreaterThan => "gt",
            MatcherOp::GreaterEqual => "ge",
            MatcherOp::LessThan => "lt",
            MatcherOp::LessEqual => "le",
            MatcherOp::Contains => "co",
            MatcherOp::NotContains => "nc",
            MatcherOp::StartsWith => "sw",
            MatcherOp::EndsWith => "ew",
            MatcherOp::Exists => "ex",
            MatcherOp::NotExists => "nx",
        };
        f.write_str(name)
    }
}

/// Leaf condition: compare the value at `key` with literal `values`
#[derive(Debug, Clone, PartialEq)]
pub struct Matcher {
    pub key: String,
    pub op: MatcherOp,
    pub values: Vec<Variant>,
}

impl Matcher {
    /// Evaluate against the resolved value for `key` (`None` if it did not resolve).
    ///
    /// A comparison between kinds that cannot be compared is false, for
    /// negated operators too: `ne` holds only when every literal is
    /// comparable and different.
    pub fn matches(&self, actual: Option<&Variant>) -> bool {
        let actual = actual.filter(|v| !v.is_null());

        match self.op {
            MatcherOp::Exists => actual.is_some(),
            MatcherOp::NotExists => actual.is_none(),
            op => {
                let Some(actual) = actual else {
                    return false;
                };
                match op {
                    MatcherOp::NotEquals => self
                        .values
                        .iter()
                        .all(|lit| equals(actual, lit) == Some(false)),
                    MatcherOp::NotContains => self
                        .values
                        .iter()
                        .all(|lit| contains(actual, lit) == Some(false)),
                    _ => self.values.iter().any(|lit| compare(op, actual, lit)),
                }
            }
        }
    }
}

fn compare(op: MatcherOp, actual: &Variant, literal: &Variant) -> bool {
    match op {
        MatcherOp::Equals => equals(actual, literal) == Some(true),
        MatcherOp::GreaterThan => order(actual, literal) == Some(Ordering::Greater),
        MatcherOp::GreaterEqual => matches!(
            order(actual, literal),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        MatcherOp::LessThan => order(actual, literal) == Some(Ordering::Less),
        MatcherOp::LessEqual => {
            matches!(order(actual, literal), Some(Ordering::Less | Ordering::Equal))
        }
        MatcherOp::Contains => contains(actual, literal) == Some(true),
        MatcherOp::StartsWith => match (actual, literal) {
            (Variant::String(a), Variant::String(b)) => a.to_lowercase().starts_with(&b.to_lowercase()),
            _ => false,
        },
        MatcherOp::EndsWith => match (actual, literal) {
            (Variant::String(a), Variant::String(b)) => a.to_lowercase().ends_with(&b.to_lowercase()),
            _ => false,
        },
        MatcherOp::NotEquals | MatcherOp::NotContains | MatcherOp::Exists | MatcherOp::NotExists => {
            false
        }
    }
}

/// `None` when the kinds cannot be compared
fn equals(actual: &Variant, literal: &Variant) -> Option<bool> {
    match (actual, literal) {
        (Variant::String(a), Variant::String(b)) => Some(a.to_lowercase() == b.to_lowercase()),
        (Variant::Boolean(a), Variant::Boolean(b)) => Some(a == b),
        _ => order(actual, literal).map(|o| o == Ordering::Equal),
    }
}

/// Numeric ordering across Integer/Long/Double; `None` for anything else or NaN
fn order(actual: &Variant, literal: &Variant) -> Option<Ordering> {
    match (as_integral(actual), as_integral(literal)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => as_number(actual)?.partial_cmp(&as_number(literal)?),
    }
}

fn contains(actual: &Variant, literal: &Variant) -> Option<bool> {
    match (actual, literal) {
        (Variant::String(a), Variant::String(b)) => {
            Some(a.to_lowercase().contains(&b.to_lowercase()))
        }
        (Variant::List(items), _) => Some(items.iter().any(|item| equals(item, literal) == Some(true))),
        _ => None,
    }
}

fn as_integral(value: &Variant) -> Option<i64> {
    match value {
        Variant::Integer(i) => Some(i64::from(*i)),
        Variant::Long(l) => Some(*l),
        _ => None,
    }
}

fn as_number(value: &Variant) -> Option<f64> {
    match value {
        Variant::Integer(_) | Variant::Long(_) | Variant::Double(_) => value.convert_to_double().ok(),
        _ => None,
    }
}

/// Condition tree: matchers combined by short-circuiting AND/OR groups
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
    Group {
        logic: LogicalOp,
        conditions: Vec<RuleCondition>,
    },
    Matcher(Matcher),
}

impl RuleCondition {
    /// Evaluate left to right, resolving matcher keys through `resolve`.
    ///
    /// An empty AND group is true, an empty OR group is false.
    pub fn evaluate(&self, resolve: &dyn Fn(&str) -> Option<Variant>) -> bool {
        match self {
            RuleCondition::Matcher(matcher) => matcher.matches(resolve(&matcher.key).as_ref()),
            RuleCondition::Group {
                logic: LogicalOp::And,
                conditions,
            } => conditions.iter().all(|c| c.evaluate(resolve)),
            RuleCondition::Group {
                logic: LogicalOp::Or,
                conditions,
            } => conditions.iter().any(|c| c.evaluate(resolve)),
        }
    }
}
