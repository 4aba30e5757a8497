//! Compiled schema nodes.
//!
//! The first segment of a chain picks the base [`Kind`]; every later
//! segment is applied, left to right, as a method call on the schema built
//! so far.

use regex_lite::Regex;
use serde_json::Value;

use crate::date::{self, DateFormat, TimestampUnit};
use crate::error::SchemaError;
use crate::parser::{self, number_value, Literal, Segment};

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.[A-Za-z]{2,}$";

/// Base validator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Any,
    String,
    Number,
    Boolean,
    Array,
    Object,
    Date,
}

impl Kind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "any" => Some(Kind::Any),
            "string" => Some(Kind::String),
            "number" => Some(Kind::Number),
            "boolean" | "bool" => Some(Kind::Boolean),
            "array" => Some(Kind::Array),
            "object" => Some(Kind::Object),
            "date" => Some(Kind::Date),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Any => "any",
            Kind::String => "string",
            Kind::Number => "number",
            Kind::Boolean => "boolean",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::Date => "date",
        }
    }
}

/// Whether a field must, may, or must not be present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Presence {
    #[default]
    Optional,
    Required,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Case {
    Lower,
    Upper,
}

/// Bound used by date comparisons.
#[derive(Debug, Clone, PartialEq)]
enum DateBound {
    Now,
    At(chrono::DateTime<chrono::Utc>),
}

impl DateBound {
    fn resolve(&self) -> chrono::DateTime<chrono::Utc> {
        match self {
            DateBound::Now => chrono::Utc::now(),
            DateBound::At(dt) => *dt,
        }
    }

    fn describe(&self) -> String {
        match self {
            DateBound::Now => "\"now\"".to_string(),
            DateBound::At(dt) => format!("\"{}\"", date::render(dt)),
        }
    }
}

#[derive(Debug, Clone)]
enum Rule {
    Min(f64),
    Max(f64),
    Length(f64),
    Greater(f64),
    Less(f64),
    Integer,
    Positive,
    Negative,
    Multiple(f64),
    Port,
    Email(Regex),
    Guid,
    Alphanum,
    Token,
    Hex,
    Pattern(Regex, String),
    IsoDate,
    Unique,
    DateMin(DateBound),
    DateMax(DateBound),
    DateGreater(DateBound),
    DateLess(DateBound),
}

/// Why a single segment could not be applied.
enum ApplyError {
    Unknown,
    Arguments(String),
}

/// A compiled validator for one value.
#[derive(Debug, Clone)]
pub struct Schema {
    kind: Kind,
    presence: Presence,
    label: Option<String>,
    allow: Vec<Value>,
    only: bool,
    invalid: Vec<Value>,
    default: Option<Value>,
    convert: bool,
    trim: bool,
    case: Option<Case>,
    truthy: Vec<Value>,
    falsy: Vec<Value>,
    iso: bool,
    timestamp: Option<TimestampUnit>,
    formats: Vec<DateFormat>,
    rules: Vec<Rule>,
}

impl Schema {
    /// A schema of the given kind with no rules.
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            presence: Presence::Optional,
            label: None,
            allow: Vec::new(),
            only: false,
            invalid: Vec::new(),
            default: None,
            convert: true,
            trim: false,
            case: None,
            truthy: Vec::new(),
            falsy: Vec::new(),
            iso: false,
            timestamp: None,
            formats: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Compile a DSL expression such as `string.email.required`.
    pub fn compile(input: &str) -> Result<Self, SchemaError> {
        let segments = parser::parse(input)?;
        let (base, rest) = match segments.split_first() {
            Some(split) => split,
            None => {
                return Err(SchemaError::Parse {
                    input: input.to_string(),
                    position: 0,
                    message: "empty expression".to_string(),
                })
            }
        };

        let kind = Kind::from_name(&base.name).ok_or_else(|| SchemaError::UnknownKind {
            input: input.to_string(),
            kind: base.name.clone(),
        })?;

        if !base.args.is_empty() {
            return Err(SchemaError::InvalidArguments {
                input: input.to_string(),
                method: base.name.clone(),
                message: "base types take no arguments".to_string(),
            });
        }

        rest.iter().try_fold(Schema::new(kind), |schema, segment| {
            schema.apply(segment).map_err(|e| match e {
                ApplyError::Unknown => SchemaError::UnknownMethod {
                    input: input.to_string(),
                    kind: kind.as_str().to_string(),
                    method: segment.name.clone(),
                },
                ApplyError::Arguments(message) => SchemaError::InvalidArguments {
                    input: input.to_string(),
                    method: segment.name.clone(),
                    message,
                },
            })
        })
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }

    /// Mark the value as required.
    pub fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    fn apply(mut self, segment: &Segment) -> Result<Self, ApplyError> {
        let args = &segment.args;

        match segment.name.as_str() {
            "required" | "exist" => {
                no_args(args)?;
                self.presence = Presence::Required;
            }
            "optional" => {
                no_args(args)?;
                self.presence = Presence::Optional;
            }
            "forbidden" => {
                no_args(args)?;
                self.presence = Presence::Forbidden;
            }
            "allow" => self.allow.extend(values(args)?),
            "valid" | "only" | "equal" => {
                self.allow.extend(values(args)?);
                self.only = true;
            }
            "invalid" | "disallow" | "not" => self.invalid.extend(values(args)?),
            "default" => {
                if args.len() > 1 {
                    return Err(ApplyError::Arguments("expected at most one value".into()));
                }
                self.default = Some(args.first().map(Literal::to_value).unwrap_or(Value::Null));
            }
            "strict" => {
                no_args(args)?;
                self.convert = false;
            }
            "label" => self.label = Some(string_arg(args)?.to_string()),
            _ => return self.apply_kind(segment),
        }

        Ok(self)
    }

    fn apply_kind(mut self, segment: &Segment) -> Result<Self, ApplyError> {
        let args = &segment.args;

        let rule = match (self.kind, segment.name.as_str()) {
            (Kind::String, "min") | (Kind::Array, "min") | (Kind::Object, "min") => {
                Rule::Min(limit_arg(args)?)
            }
            (Kind::String, "max") | (Kind::Array, "max") | (Kind::Object, "max") => {
                Rule::Max(limit_arg(args)?)
            }
            (Kind::String, "length") | (Kind::Array, "length") | (Kind::Object, "length") => {
                Rule::Length(limit_arg(args)?)
            }
            (Kind::String, "email") => {
                no_args(args)?;
                let regex = Regex::new(EMAIL_PATTERN)
                    .map_err(|e| ApplyError::Arguments(e.to_string()))?;
                Rule::Email(regex)
            }
            (Kind::String, "guid" | "uuid") => {
                no_args(args)?;
                Rule::Guid
            }
            (Kind::String, "alphanum") => {
                no_args(args)?;
                Rule::Alphanum
            }
            (Kind::String, "token") => {
                no_args(args)?;
                Rule::Token
            }
            (Kind::String, "hex") => {
                no_args(args)?;
                Rule::Hex
            }
            (Kind::String, "isoDate") => {
                no_args(args)?;
                Rule::IsoDate
            }
            (Kind::String, "pattern" | "regex") => {
                let source = string_arg(args)?.to_string();
                let regex = Regex::new(&source)
                    .map_err(|e| ApplyError::Arguments(format!("invalid pattern: {}", e)))?;
                Rule::Pattern(regex, source)
            }
            (Kind::String, "trim") => {
                no_args(args)?;
                self.trim = true;
                return Ok(self);
            }
            (Kind::String, "lowercase") => {
                no_args(args)?;
                self.case = Some(Case::Lower);
                return Ok(self);
            }
            (Kind::String, "uppercase") => {
                no_args(args)?;
                self.case = Some(Case::Upper);
                return Ok(self);
            }
            (Kind::Number, "min") => Rule::Min(number_arg(args)?),
            (Kind::Number, "max") => Rule::Max(number_arg(args)?),
            (Kind::Number, "greater") => Rule::Greater(number_arg(args)?),
            (Kind::Number, "less") => Rule::Less(number_arg(args)?),
            (Kind::Number, "integer") => {
                no_args(args)?;
                Rule::Integer
            }
            (Kind::Number, "positive") => {
                no_args(args)?;
                Rule::Positive
            }
            (Kind::Number, "negative") => {
                no_args(args)?;
                Rule::Negative
            }
            (Kind::Number, "port") => {
                no_args(args)?;
                Rule::Port
            }
            (Kind::Number, "multiple") => {
                let base = number_arg(args)?;
                if base <= 0.0 {
                    return Err(ApplyError::Arguments("base must be positive".into()));
                }
                Rule::Multiple(base)
            }
            (Kind::Array, "unique") => {
                no_args(args)?;
                Rule::Unique
            }
            (Kind::Boolean, "truthy") => {
                self.truthy.extend(values(args)?);
                return Ok(self);
            }
            (Kind::Boolean, "falsy") => {
                self.falsy.extend(values(args)?);
                return Ok(self);
            }
            (Kind::Date, "min") => Rule::DateMin(date_arg(args)?),
            (Kind::Date, "max") => Rule::DateMax(date_arg(args)?),
            (Kind::Date, "greater") => Rule::DateGreater(date_arg(args)?),
            (Kind::Date, "less") => Rule::DateLess(date_arg(args)?),
            (Kind::Date, "iso") => {
                no_args(args)?;
                self.iso = true;
                return Ok(self);
            }
            (Kind::Date, "timestamp") => {
                let unit = match args.as_slice() {
                    [] => TimestampUnit::Javascript,
                    [Literal::Str(name)] => TimestampUnit::from_name(name).ok_or_else(|| {
                        ApplyError::Arguments(format!("unknown timestamp unit '{}'", name))
                    })?,
                    _ => return Err(ApplyError::Arguments("expected a unit name".into())),
                };
                self.timestamp = Some(unit);
                return Ok(self);
            }
            (Kind::Date, "format") => {
                if args.is_empty() {
                    return Err(ApplyError::Arguments("expected at least one format".into()));
                }
                for arg in args {
                    let Literal::Str(source) = arg else {
                        return Err(ApplyError::Arguments("formats must be strings".into()));
                    };
                    self.formats
                        .push(DateFormat::parse(source).map_err(ApplyError::Arguments)?);
                }
                return Ok(self);
            }
            _ => return Err(ApplyError::Unknown),
        };

        self.rules.push(rule);
        Ok(self)
    }

    /// Validate one field value.
    ///
    /// `None` means the field is absent. Returns the coerced value (or the
    /// default for an absent optional field), or one message per failing rule.
    pub fn validate(&self, field: &str, value: Option<&Value>) -> Result<Option<Value>, Vec<String>> {
        let label = self.label.as_deref().unwrap_or(field);

        let value = match value {
            Some(value) => value,
            None if self.presence == Presence::Required => {
                return Err(vec![format!("\"{}\" is required", label)]);
            }
            None => return Ok(self.default.clone()),
        };

        if self.presence == Presence::Forbidden {
            return Err(vec![format!("\"{}\" is not allowed", label)]);
        }

        if self.allow.contains(value) {
            return Ok(Some(value.clone()));
        }

        if self.only {
            let listed: Vec<String> = self.allow.iter().map(display_value).collect();
            return Err(vec![format!("\"{}\" must be one of [{}]", label, listed.join(", "))]);
        }

        if self.invalid.contains(value) {
            return Err(vec![format!("\"{}\" contains an invalid value", label)]);
        }

        let converted = self.coerce(label, value).map_err(|message| vec![message])?;

        let mut errors = Vec::new();
        if let Some(message) = self.check_strict_string(label, &converted) {
            errors.push(message);
        }
        for rule in &self.rules {
            if let Some(message) = self.check(rule, label, &converted) {
                errors.push(message);
            }
        }

        if errors.is_empty() {
            Ok(Some(converted))
        } else {
            Err(errors)
        }
    }

    fn coerce(&self, label: &str, value: &Value) -> Result<Value, String> {
        match self.kind {
            Kind::Any => Ok(value.clone()),
            Kind::String => {
                let Value::String(s) = value else {
                    return Err(format!("\"{}\" must be a string", label));
                };

                let mut s = if self.trim && self.convert {
                    s.trim().to_string()
                } else {
                    s.clone()
                };

                if s.is_empty() && !self.allow.contains(&Value::String(String::new())) {
                    return Err(format!("\"{}\" is not allowed to be empty", label));
                }

                if self.convert {
                    match self.case {
                        Some(Case::Lower) => s = s.to_lowercase(),
                        Some(Case::Upper) => s = s.to_uppercase(),
                        None => {}
                    }
                }

                Ok(Value::String(s))
            }
            Kind::Number => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(s) if self.convert => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(number_value)
                    .ok_or_else(|| format!("\"{}\" must be a number", label)),
                _ => Err(format!("\"{}\" must be a number", label)),
            },
            Kind::Boolean => {
                if self.truthy.contains(value) {
                    return Ok(Value::Bool(true));
                }
                if self.falsy.contains(value) {
                    return Ok(Value::Bool(false));
                }
                match value {
                    Value::Bool(_) => Ok(value.clone()),
                    Value::String(s) if self.convert && s.eq_ignore_ascii_case("true") => {
                        Ok(Value::Bool(true))
                    }
                    Value::String(s) if self.convert && s.eq_ignore_ascii_case("false") => {
                        Ok(Value::Bool(false))
                    }
                    _ => Err(format!("\"{}\" must be a boolean", label)),
                }
            }
            Kind::Array => match value {
                Value::Array(_) => Ok(value.clone()),
                _ => Err(format!("\"{}\" must be an array", label)),
            },
            Kind::Object => match value {
                Value::Object(_) => Ok(value.clone()),
                _ => Err(format!("\"{}\" must be of type object", label)),
            },
            Kind::Date => self.coerce_date(label, value),
        }
    }

    fn coerce_date(&self, label: &str, value: &Value) -> Result<Value, String> {
        let parsed = if !self.formats.is_empty() {
            let found = match value {
                Value::String(s) => self.formats.iter().find_map(|f| f.read(s)),
                _ => None,
            };
            found.ok_or_else(|| {
                let listed: Vec<&str> = self.formats.iter().map(|f| f.source.as_str()).collect();
                format!("\"{}\" must be in [{}] format", label, listed.join(", "))
            })?
        } else if let Some(unit) = self.timestamp {
            date::timestamp_number(value, self.convert)
                .and_then(|n| date::from_timestamp(n, unit))
                .ok_or_else(|| {
                    format!(
                        "\"{}\" must be in timestamp or number of milliseconds format",
                        label
                    )
                })?
        } else if self.iso {
            match value {
                Value::String(s) => date::parse_iso(s),
                _ => None,
            }
            .ok_or_else(|| format!("\"{}\" must be in ISO 8601 date format", label))?
        } else {
            let parsed = match value {
                Value::Number(n) => n
                    .as_f64()
                    .and_then(|n| date::from_timestamp(n, TimestampUnit::Javascript)),
                Value::String(s) => date::parse_iso(s).or_else(|| {
                    date::timestamp_number(value, self.convert)
                        .filter(|_| !s.trim().is_empty())
                        .and_then(|n| date::from_timestamp(n, TimestampUnit::Javascript))
                }),
                _ => None,
            };
            parsed.ok_or_else(|| format!("\"{}\" must be a valid date", label))?
        };

        Ok(Value::String(date::render(&parsed)))
    }

    /// In strict mode `trim`/`lowercase`/`uppercase` verify instead of rewrite.
    fn check_strict_string(&self, label: &str, value: &Value) -> Option<String> {
        if self.convert || self.kind != Kind::String {
            return None;
        }
        let s = value.as_str()?;

        if self.trim && s.trim() != s {
            return Some(format!("\"{}\" must not have leading or trailing whitespace", label));
        }
        match self.case {
            Some(Case::Lower) if s.to_lowercase() != s => {
                Some(format!("\"{}\" must only contain lowercase characters", label))
            }
            Some(Case::Upper) if s.to_uppercase() != s => {
                Some(format!("\"{}\" must only contain uppercase characters", label))
            }
            _ => None,
        }
    }

    fn check(&self, rule: &Rule, label: &str, value: &Value) -> Option<String> {
        match self.kind {
            Kind::String => check_string(rule, label, value.as_str()?),
            Kind::Number => check_number(rule, label, value.as_f64()?),
            Kind::Array => check_array(rule, label, value.as_array()?),
            Kind::Object => check_object(rule, label, value.as_object()?.len()),
            Kind::Date => {
                let dt = date::parse_iso(value.as_str()?)?;
                check_date(rule, label, &dt)
            }
            Kind::Any | Kind::Boolean => None,
        }
    }
}

fn check_string(rule: &Rule, label: &str, s: &str) -> Option<String> {
    let length = s.chars().count() as f64;

    let failed = match rule {
        Rule::Min(n) if length < *n => {
            format!("\"{}\" length must be at least {} characters long", label, n)
        }
        Rule::Max(n) if length > *n => format!(
            "\"{}\" length must be less than or equal to {} characters long",
            label, n
        ),
        Rule::Length(n) if length != *n => {
            format!("\"{}\" length must be {} characters long", label, n)
        }
        Rule::Email(regex) if !regex.is_match(s) => {
            format!("\"{}\" must be a valid email", label)
        }
        Rule::Guid if uuid::Uuid::parse_str(s).is_err() => {
            format!("\"{}\" must be a valid GUID", label)
        }
        Rule::Alphanum if !s.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!("\"{}\" must only contain alpha-numeric characters", label)
        }
        Rule::Token if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => format!(
            "\"{}\" must only contain alpha-numeric and underscore characters",
            label
        ),
        Rule::Hex if !s.chars().all(|c| c.is_ascii_hexdigit()) => {
            format!("\"{}\" must only contain hexadecimal characters", label)
        }
        Rule::Pattern(regex, source) if !regex.is_match(s) => format!(
            "\"{}\" with value \"{}\" fails to match the required pattern: /{}/",
            label, s, source
        ),
        Rule::IsoDate if date::parse_iso(s).is_none() => {
            format!("\"{}\" must be in iso format", label)
        }
        _ => return None,
    };

    Some(failed)
}

fn check_number(rule: &Rule, label: &str, n: f64) -> Option<String> {
    let failed = match rule {
        Rule::Min(limit) if n < *limit => {
            format!("\"{}\" must be greater than or equal to {}", label, limit)
        }
        Rule::Max(limit) if n > *limit => {
            format!("\"{}\" must be less than or equal to {}", label, limit)
        }
        Rule::Greater(limit) if n <= *limit => {
            format!("\"{}\" must be greater than {}", label, limit)
        }
        Rule::Less(limit) if n >= *limit => format!("\"{}\" must be less than {}", label, limit),
        Rule::Integer if n.fract() != 0.0 => format!("\"{}\" must be an integer", label),
        Rule::Positive if n <= 0.0 => format!("\"{}\" must be a positive number", label),
        Rule::Negative if n >= 0.0 => format!("\"{}\" must be a negative number", label),
        Rule::Multiple(base) if (n % base).abs() > f64::EPSILON => {
            format!("\"{}\" must be a multiple of {}", label, base)
        }
        Rule::Port if n.fract() != 0.0 || !(0.0..=65535.0).contains(&n) => {
            format!("\"{}\" must be a valid port", label)
        }
        _ => return None,
    };

    Some(failed)
}

fn check_array(rule: &Rule, label: &str, items: &[Value]) -> Option<String> {
    let length = items.len() as f64;

    let failed = match rule {
        Rule::Min(n) if length < *n => format!("\"{}\" must contain at least {} items", label, n),
        Rule::Max(n) if length > *n => format!(
            "\"{}\" must contain less than or equal to {} items",
            label, n
        ),
        Rule::Length(n) if length != *n => format!("\"{}\" must contain {} items", label, n),
        Rule::Unique => {
            let duplicate = items
                .iter()
                .enumerate()
                .position(|(i, item)| items[..i].contains(item))?;
            format!("\"{}[{}]\" contains a duplicate value", label, duplicate)
        }
        _ => return None,
    };

    Some(failed)
}

fn check_object(rule: &Rule, label: &str, keys: usize) -> Option<String> {
    let keys = keys as f64;

    let failed = match rule {
        Rule::Min(n) if keys < *n => format!("\"{}\" must have at least {} keys", label, n),
        Rule::Max(n) if keys > *n => {
            format!("\"{}\" must have less than or equal to {} keys", label, n)
        }
        Rule::Length(n) if keys != *n => format!("\"{}\" must have {} keys", label, n),
        _ => return None,
    };

    Some(failed)
}

fn check_date(rule: &Rule, label: &str, dt: &chrono::DateTime<chrono::Utc>) -> Option<String> {
    let failed = match rule {
        Rule::DateMin(bound) if *dt < bound.resolve() => format!(
            "\"{}\" must be greater than or equal to {}",
            label,
            bound.describe()
        ),
        Rule::DateMax(bound) if *dt > bound.resolve() => format!(
            "\"{}\" must be less than or equal to {}",
            label,
            bound.describe()
        ),
        Rule::DateGreater(bound) if *dt <= bound.resolve() => {
            format!("\"{}\" must be greater than {}", label, bound.describe())
        }
        Rule::DateLess(bound) if *dt >= bound.resolve() => {
            format!("\"{}\" must be less than {}", label, bound.describe())
        }
        _ => return None,
    };

    Some(failed)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn no_args(args: &[Literal]) -> Result<(), ApplyError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ApplyError::Arguments("takes no arguments".into()))
    }
}

fn values(args: &[Literal]) -> Result<Vec<Value>, ApplyError> {
    if args.is_empty() {
        return Err(ApplyError::Arguments("expected at least one value".into()));
    }
    Ok(args.iter().map(Literal::to_value).collect())
}

fn number_arg(args: &[Literal]) -> Result<f64, ApplyError> {
    match args {
        [Literal::Num(n)] => Ok(*n),
        _ => Err(ApplyError::Arguments("expected one number".into())),
    }
}

fn limit_arg(args: &[Literal]) -> Result<f64, ApplyError> {
    let n = number_arg(args)?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(ApplyError::Arguments("limit must be a non-negative integer".into()));
    }
    Ok(n)
}

fn string_arg(args: &[Literal]) -> Result<&str, ApplyError> {
    match args {
        [Literal::Str(s)] => Ok(s.as_str()),
        _ => Err(ApplyError::Arguments("expected one string".into())),
    }
}

fn date_arg(args: &[Literal]) -> Result<DateBound, ApplyError> {
    let parsed = match args {
        [Literal::Str(s)] if s == "now" => return Ok(DateBound::Now),
        [Literal::Str(s)] => date::parse_iso(s),
        [Literal::Num(n)] => date::from_timestamp(*n, TimestampUnit::Javascript),
        _ => None,
    };
    parsed
        .map(DateBound::At)
        .ok_or_else(|| ApplyError::Arguments("expected a date or 'now'".into()))
}
