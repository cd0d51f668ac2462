//! CSL-JSON references.
//!
//! A [`Reference`] is deserialized from a CSL-JSON object. Fields are sorted
//! into three typed maps by variable name: name lists, dates, and everything
//! else that is a string or a number. Fields that fit none of these are kept
//! in [`Reference::other`] and never rendered.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Variables whose value is a list of names.
pub const NAME_VARIABLES: &[&str] = &[
    "author",
    "chair",
    "collection-editor",
    "compiler",
    "composer",
    "container-author",
    "contributor",
    "curator",
    "director",
    "editor",
    "editor-translator",
    "editorial-director",
    "executive-producer",
    "guest",
    "host",
    "illustrator",
    "interviewer",
    "narrator",
    "organizer",
    "original-author",
    "performer",
    "producer",
    "recipient",
    "reviewed-author",
    "script-writer",
    "series-creator",
    "translator",
];

/// Variables whose value is a date.
pub const DATE_VARIABLES: &[&str] = &[
    "accessed",
    "available-date",
    "event-date",
    "issued",
    "original-date",
    "submitted",
];

/// Legacy field names accepted as aliases.
const ALIASES: &[(&str, &str)] = &[
    ("journalAbbreviation", "container-title-short"),
    ("shortTitle", "title-short"),
    ("chapter", "chapter-number"),
];

/// A bibliographic item.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawReference")]
pub struct Reference {
    pub id: String,
    /// CSL item type such as `book` or `article-journal`. Empty if absent.
    pub ref_type: String,
    variables: BTreeMap<String, String>,
    names: BTreeMap<String, Vec<Name>>,
    dates: BTreeMap<String, DateVariable>,
    other: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct RawReference {
    #[serde(deserialize_with = "deserialize_string_or_int")]
    id: String,
    #[serde(rename = "type", default)]
    ref_type: String,
    #[serde(flatten)]
    fields: serde_json::Map<String, Value>,
}

/// CSL-JSON allows both string and integer ids.
fn deserialize_string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(D::Error::custom("expected string or number for id")),
    }
}

impl TryFrom<RawReference> for Reference {
    type Error = String;

    fn try_from(raw: RawReference) -> Result<Self, Self::Error> {
        let mut reference = Reference::new(raw.id, raw.ref_type);

        for (key, value) in raw.fields {
            let key = ALIASES
                .iter()
                .find(|(alias, _)| *alias == key)
                .map(|(_, canonical)| canonical.to_string())
                .unwrap_or(key);

            if NAME_VARIABLES.contains(&key.as_str()) {
                let names: Vec<Name> = serde_json::from_value(value)
                    .map_err(|e| format!("field '{}': {}", key, e))?;
                reference.names.insert(key, names);
            } else if DATE_VARIABLES.contains(&key.as_str()) {
                let date = DateVariable::from_json(value)
                    .map_err(|e| format!("field '{}': {}", key, e))?;
                reference.dates.insert(key, date);
            } else {
                match value {
                    Value::String(s) => {
                        reference.set_variable(key, s);
                    }
                    Value::Number(n) => {
                        reference.set_variable(key, n.to_string());
                    }
                    other => {
                        reference.other.insert(key, other);
                    }
                }
            }
        }

        Ok(reference)
    }
}

impl Reference {
    pub fn new(id: impl Into<String>, ref_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ref_type: ref_type.into(),
            ..Self::default()
        }
    }

    /// Parse a single CSL-JSON object.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set a text or number variable. Empty values are treated as absent.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if value.is_empty() {
            self.variables.remove(&name);
        } else {
            self.variables.insert(name, value);
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_variable(name, value);
        self
    }

    pub fn with_names(mut self, name: impl Into<String>, names: Vec<Name>) -> Self {
        self.names.insert(name.into(), names);
        self
    }

    pub fn with_date(mut self, name: impl Into<String>, date: DateVariable) -> Self {
        self.dates.insert(name.into(), date);
        self
    }

    /// A text or number variable. `page-first` is derived from `page` when
    /// not given explicitly.
    pub fn variable(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.variables.get(name) {
            return Some(value.as_str());
        }
        if name == "page-first" {
            let page = self.variables.get("page")?;
            let end = page
                .find(|c: char| !c.is_alphanumeric())
                .unwrap_or(page.len());
            return (end > 0).then(|| &page[..end]);
        }
        None
    }

    /// A non-empty name list.
    pub fn names(&self, name: &str) -> Option<&[Name]> {
        self.names
            .get(name)
            .map(Vec::as_slice)
            .filter(|names| !names.is_empty())
    }

    /// A date with at least one usable part or a literal.
    pub fn date(&self, name: &str) -> Option<&DateVariable> {
        self.dates.get(name).filter(|d| !d.is_empty())
    }

    /// Whether any kind of value exists for `name`.
    pub fn has_variable(&self, name: &str) -> bool {
        self.variable(name).is_some() || self.names(name).is_some() || self.date(name).is_some()
    }

    /// Fields that are neither names, dates, strings nor numbers.
    pub fn other(&self) -> &BTreeMap<String, Value> {
        &self.other
    }
}

/// A personal or institutional name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Name {
    pub family: Option<String>,
    pub given: Option<String>,
    /// "de" in "Ludwig de Beethoven"; dropped when only the family name shows.
    pub dropping_particle: Option<String>,
    /// "van" in "Vincent van Gogh"; kept with the family name.
    pub non_dropping_particle: Option<String>,
    pub suffix: Option<String>,
    /// Institutional or otherwise unstructured name.
    pub literal: Option<String>,
    pub comma_suffix: Option<bool>,
    pub parse_names: Option<bool>,
}

impl Name {
    pub fn personal(family: &str, given: &str) -> Self {
        Self {
            family: Some(family.to_string()),
            given: Some(given.to_string()).filter(|g| !g.is_empty()),
            ..Self::default()
        }
    }

    pub fn literal(name: &str) -> Self {
        Self {
            literal: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// The unstructured form: `literal`, or a lone family or given name.
    pub fn as_literal(&self) -> Option<&str> {
        if let Some(literal) = self.literal.as_deref() {
            return Some(literal);
        }
        match (self.family.as_deref(), self.given.as_deref()) {
            (Some(family), None) if self.non_dropping_particle.is_none() => Some(family),
            (None, Some(given)) => Some(given),
            _ => None,
        }
    }
}

/// One end of a date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateParts {
    /// Negative years are BC.
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    /// 1 = spring through 4 = winter.
    pub season: Option<u32>,
}

impl DateParts {
    pub fn year(year: i32) -> Self {
        Self {
            year,
            ..Self::default()
        }
    }

    pub fn ymd(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month: Some(month),
            day: Some(day),
            season: None,
        }
    }

    fn from_values(values: &[Option<i32>]) -> Option<Self> {
        let mut iter = values.iter().map_while(|v| *v);
        let year = iter.next()?;
        let mut parts = DateParts::year(year);
        if let Some(month) = iter.next().and_then(|m| u32::try_from(m).ok()) {
            match month {
                1..=12 => {
                    parts.month = Some(month);
                    parts.day = iter.next().and_then(|d| u32::try_from(d).ok()).filter(|d| *d > 0);
                }
                13..=16 => parts.season = Some(month - 12),
                21..=24 => parts.season = Some(month - 20),
                _ => {}
            }
        }
        Some(parts)
    }
}

/// A date value: one or two [`DateParts`] (a range), or a literal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateVariable {
    pub parts: Vec<DateParts>,
    pub literal: Option<String>,
    pub circa: bool,
}

#[derive(Deserialize)]
struct RawDate {
    #[serde(rename = "date-parts", default, deserialize_with = "deserialize_date_parts")]
    date_parts: Vec<Vec<Option<i32>>>,
    literal: Option<String>,
    raw: Option<String>,
    season: Option<Value>,
    circa: Option<Value>,
}

static RAW_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(-?[0-9]{1,4})(?:-([0-9]{1,2})(?:-([0-9]{1,2}))?)?\s*$")
        .expect("raw date pattern is valid")
});

impl DateVariable {
    pub fn single(parts: DateParts) -> Self {
        Self {
            parts: vec![parts],
            ..Self::default()
        }
    }

    pub fn range(start: DateParts, end: DateParts) -> Self {
        Self {
            parts: vec![start, end],
            ..Self::default()
        }
    }

    pub fn literal(text: &str) -> Self {
        Self {
            literal: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn start(&self) -> Option<&DateParts> {
        self.parts.first()
    }

    /// The end of a range, if it differs from the start.
    pub fn end(&self) -> Option<&DateParts> {
        self.parts.get(1).filter(|end| Some(*end) != self.parts.first())
    }

    pub fn is_range(&self) -> bool {
        self.end().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty() && self.literal.is_none()
    }

    /// Parse `2020`, `2020-05`, `2020-05-17` and ranges of these joined
    /// with `/`.
    pub fn parse_raw(raw: &str) -> Option<Self> {
        let mut parts = Vec::new();
        for piece in raw.split('/') {
            let caps = RAW_DATE.captures(piece)?;
            let values: Vec<Option<i32>> = (1..=3)
                .map(|i| caps.get(i).and_then(|m| m.as_str().parse().ok()))
                .collect();
            parts.push(DateParts::from_values(&values)?);
        }
        (parts.len() <= 2).then(|| DateVariable::range_or_single(parts))
    }

    fn range_or_single(parts: Vec<DateParts>) -> Self {
        Self {
            parts,
            ..Self::default()
        }
    }

    fn from_json(value: Value) -> Result<Self, String> {
        if let Value::String(raw) = value {
            return Ok(Self::parse_raw(&raw).unwrap_or_else(|| Self::literal(&raw)));
        }

        let raw: RawDate = serde_json::from_value(value).map_err(|e| e.to_string())?;
        let mut date = DateVariable {
            parts: raw
                .date_parts
                .iter()
                .take(2)
                .filter_map(|values| DateParts::from_values(values))
                .collect(),
            literal: raw.literal.filter(|l| !l.is_empty()),
            circa: raw.circa.as_ref().is_some_and(is_truthy),
        };

        if date.parts.is_empty()
            && date.literal.is_none()
            && let Some(raw_text) = raw.raw.as_deref()
        {
            match Self::parse_raw(raw_text) {
                Some(parsed) => date.parts = parsed.parts,
                None => date.literal = Some(raw_text.to_string()),
            }
        }

        if let Some(season) = raw.season.as_ref().and_then(season_number)
            && let Some(first) = date.parts.first_mut()
            && first.month.is_none()
        {
            first.season = Some(season);
        }

        Ok(date)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => !s.is_empty() && s != "0" && s != "false",
        _ => false,
    }
}

fn season_number(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok())?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    match n {
        1..=4 => Some(n),
        13..=16 => Some(n - 12),
        21..=24 => Some(n - 20),
        _ => None,
    }
}

/// `date-parts` values may be integers or numeric strings; anything else
/// ends the row.
fn deserialize_date_parts<'de, D>(deserializer: D) -> Result<Vec<Vec<Option<i32>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows: Option<Vec<Vec<DatePartValue>>> = Option::deserialize(deserializer)?;
    Ok(rows
        .unwrap_or_default()
        .into_iter()
        .map(|row| row.into_iter().map(|v| v.0).collect())
        .collect())
}

struct DatePartValue(Option<i32>);

impl<'de> Deserialize<'de> for DatePartValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct DatePartValueVisitor;

        impl<'de> Visitor<'de> for DatePartValueVisitor {
            type Value = DatePartValue;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an integer or string representing a date part")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(DatePartValue(i32::try_from(v).ok()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(DatePartValue(i32::try_from(v).ok()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(DatePartValue(Some(v as i32)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(DatePartValue(v.trim().parse().ok()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(DatePartValue(None))
            }
        }

        deserializer.deserialize_any(DatePartValueVisitor)
    }
}
