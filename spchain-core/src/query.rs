//! Query modifiers attached to a resource node before its terminal operation.
//!
//! Rendering order is fixed: `$select`, `$expand`, `$filter`, `$orderby`, `$top`,
//! `$skip`, then custom parameters sorted by key. A custom parameter whose key
//! matches a structured modifier that is set is dropped.

use crate::error::{CompositionError, SpError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const SELECT: &str = "$select";
const EXPAND: &str = "$expand";
const FILTER: &str = "$filter";
const ORDER_BY: &str = "$orderby";
const TOP: &str = "$top";
const SKIP: &str = "$skip";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderField {
    pub field: String,
    pub ascending: bool,
}

impl OrderField {
    pub fn asc(field: impl Into<String>) -> Self {
        OrderField {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderField {
            field: field.into(),
            ascending: false,
        }
    }

    fn render(&self) -> String {
        format!("{} {}", self.field, if self.ascending { "asc" } else { "desc" })
    }
}

/// A single modifier, as attached through `ResourceNode::with_modifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    Select(Vec<String>),
    Expand(Vec<String>),
    Filter(String),
    OrderBy(Vec<OrderField>),
    Top(u32),
    Skip(u32),
    Param(String, String),
}

impl Modifier {
    pub fn select<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Modifier::Select(fields.into_iter().map(Into::into).collect())
    }

    pub fn expand<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Modifier::Expand(paths.into_iter().map(Into::into).collect())
    }

    pub fn param(key: impl Into<String>, value: impl Into<String>) -> Self {
        Modifier::Param(key.into(), value.into())
    }

    fn validate(&self) -> Result<(), CompositionError> {
        let blank = |s: &String| s.trim().is_empty();
        match self {
            Modifier::Select(fields) if fields.iter().any(blank) => Err(
                CompositionError::InvalidModifier("$select contains an empty field name".into()),
            ),
            Modifier::Expand(paths) if paths.iter().any(blank) => Err(
                CompositionError::InvalidModifier("$expand contains an empty path".into()),
            ),
            Modifier::Filter(expr) if blank(expr) => Err(CompositionError::InvalidModifier(
                "$filter expression is empty".into(),
            )),
            Modifier::OrderBy(fields) if fields.is_empty() || fields.iter().any(|o| blank(&o.field)) => {
                Err(CompositionError::InvalidModifier(
                    "$orderby needs at least one named field".into(),
                ))
            }
            Modifier::Param(key, _) if blank(key) => Err(CompositionError::InvalidModifier(
                "custom query parameter has an empty key".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Selection, expansion, filter, paging and custom-parameter state of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryModifiers {
    pub select: BTreeSet<String>,
    pub expand: BTreeSet<String>,
    pub filter: Option<String>,
    pub order_by: Option<Vec<OrderField>>,
    pub top: Option<u32>,
    pub skip: Option<u32>,
    pub custom: BTreeMap<String, String>,
}

impl QueryModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Validated conversion of a single modifier.
    pub fn from_modifier(modifier: Modifier) -> Result<Self, SpError> {
        modifier.validate()?;
        let mut set = QueryModifiers::new();
        match modifier {
            Modifier::Select(fields) => set.select.extend(fields),
            Modifier::Expand(paths) => set.expand.extend(paths),
            Modifier::Filter(expr) => set.filter = Some(expr),
            Modifier::OrderBy(fields) => set.order_by = Some(fields),
            Modifier::Top(n) => set.top = Some(n),
            Modifier::Skip(n) => set.skip = Some(n),
            Modifier::Param(key, value) => {
                set.custom.insert(key, value);
            }
        }
        Ok(set)
    }

    /// Combine with a set attached later: scalars from `other` win when present,
    /// set-valued keys are unioned, custom parameters are last-write-wins per key.
    pub fn merge(&self, other: &QueryModifiers) -> QueryModifiers {
        let mut custom = self.custom.clone();
        custom.extend(other.custom.iter().map(|(k, v)| (k.clone(), v.clone())));

        QueryModifiers {
            select: self.select.union(&other.select).cloned().collect(),
            expand: self.expand.union(&other.expand).cloned().collect(),
            filter: other.filter.clone().or_else(|| self.filter.clone()),
            order_by: other.order_by.clone().or_else(|| self.order_by.clone()),
            top: other.top.or(self.top),
            skip: other.skip.or(self.skip),
            custom,
        }
    }

    /// Ordered, unencoded key/value pairs in the documented rendering order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if !self.select.is_empty() {
            pairs.push((SELECT.to_string(), join(&self.select)));
        }
        if !self.expand.is_empty() {
            pairs.push((EXPAND.to_string(), join(&self.expand)));
        }
        if let Some(filter) = &self.filter {
            pairs.push((FILTER.to_string(), filter.clone()));
        }
        if let Some(order_by) = &self.order_by {
            let rendered: Vec<String> = order_by.iter().map(OrderField::render).collect();
            pairs.push((ORDER_BY.to_string(), rendered.join(",")));
        }
        if let Some(top) = self.top {
            pairs.push((TOP.to_string(), top.to_string()));
        }
        if let Some(skip) = self.skip {
            pairs.push((SKIP.to_string(), skip.to_string()));
        }

        for (key, value) in &self.custom {
            if !self.shadows(key) {
                pairs.push((key.clone(), value.clone()));
            }
        }
        pairs
    }

    /// Encoded query string without the leading `?`; empty when nothing is set.
    pub fn to_query_string(&self) -> String {
        self.pairs()
            .iter()
            .map(|(key, value)| format!("{}={}", encode_key(key), encode_value(key, value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn shadows(&self, key: &str) -> bool {
        match key {
            SELECT => !self.select.is_empty(),
            EXPAND => !self.expand.is_empty(),
            FILTER => self.filter.is_some(),
            ORDER_BY => self.order_by.is_some(),
            TOP => self.top.is_some(),
            SKIP => self.skip.is_some(),
            _ => false,
        }
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

fn encode_key(key: &str) -> String {
    // `$` and `@` lead OData system and alias parameters and stay literal
    urlencoding::encode(key)
        .replace("%24", "$")
        .replace("%40", "@")
}

fn encode_value(key: &str, value: &str) -> String {
    match key {
        SELECT | EXPAND | ORDER_BY => value
            .split(',')
            .map(|item| urlencoding::encode(item).into_owned())
            .collect::<Vec<_>>()
            .join(","),
        _ => urlencoding::encode(value).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(modifier: Modifier) -> QueryModifiers {
        QueryModifiers::from_modifier(modifier).unwrap()
    }

    #[test]
    fn test_render_order_is_fixed() {
        let q = set(Modifier::param("@target", "'https://x'"))
            .merge(&set(Modifier::Top(5)))
            .merge(&set(Modifier::Filter("Title eq 'A'".into())))
            .merge(&set(Modifier::select(["Title", "Id"])))
            .merge(&set(Modifier::Skip(10)))
            .merge(&set(Modifier::expand(["Author"])))
            .merge(&set(Modifier::OrderBy(vec![OrderField::desc("Created")])));

        let keys: Vec<String> = q.pairs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec!["$select", "$expand", "$filter", "$orderby", "$top", "$skip", "@target"]
        );
        assert_eq!(
            q.to_query_string(),
            "$select=Id,Title&$expand=Author&$filter=Title%20eq%20%27A%27&$orderby=Created%20desc&$top=5&$skip=10&@target=%27https%3A%2F%2Fx%27"
        );
    }

    #[test]
    fn test_structured_modifier_beats_custom_parameter() {
        let q = set(Modifier::param("$select", "Everything")).merge(&set(Modifier::select(["Title"])));
        assert_eq!(q.to_query_string(), "$select=Title");

        let q = set(Modifier::select(["Title"])).merge(&set(Modifier::param("$select", "Everything")));
        assert_eq!(q.to_query_string(), "$select=Title");

        // no structured select: the custom value is rendered as given
        let q = set(Modifier::param("$select", "Everything"));
        assert_eq!(q.to_query_string(), "$select=Everything");
    }

    #[test]
    fn test_later_scalar_wins() {
        let a = set(Modifier::Top(1));
        let b = set(Modifier::Top(2));
        assert_eq!(a.merge(&b).top, Some(2));
        assert_eq!(b.merge(&a).top, Some(1));
        assert_eq!(a.merge(&QueryModifiers::new()).top, Some(1));
    }

    #[test]
    fn test_invalid_modifiers_rejected() {
        assert!(QueryModifiers::from_modifier(Modifier::select(["Title", " "])).is_err());
        assert!(QueryModifiers::from_modifier(Modifier::Filter(String::new())).is_err());
        assert!(QueryModifiers::from_modifier(Modifier::OrderBy(vec![])).is_err());
        assert!(QueryModifiers::from_modifier(Modifier::param("", "x")).is_err());
    }

    #[test]
    fn test_empty_set_renders_nothing() {
        let q = QueryModifiers::new();
        assert!(q.is_empty());
        assert_eq!(q.to_query_string(), "");
    }
}
