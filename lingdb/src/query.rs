//! Vocabulary of compiled search descriptors.
//!
//! A compiled search is pure data: a predicate tree over validated
//! model/attribute coordinates, the joins the predicate requires, and
//! one ordering clause.  Consumers (a storage layer, the bundled SQL
//! renderer) walk these values; nothing here touches a database.

use crate::result::LdbResult;
use crate::schema::RelType;
use crate::util;
use chrono::{NaiveDate, NaiveDateTime};
use json::JsonValue;
use std::fmt;

/// The closed set of comparison operators a search may apply.
///
/// Searches name these by their canonical spelling or by a conventional
/// alias ("=", "!=", "regex", "<", ">", "<=", ">=").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Ne,
    Like,
    Regexp,
    Lt,
    Gt,
    Le,
    Ge,
    In,
}

impl Relation {
    pub const ALL: [Relation; 9] = [
        Relation::Eq,
        Relation::Ne,
        Relation::Like,
        Relation::Regexp,
        Relation::Lt,
        Relation::Gt,
        Relation::Le,
        Relation::Ge,
        Relation::In,
    ];

    /// Map a submitted relation name to its operator, accepting both
    /// canonical names and aliases.  Unknown names are None.
    pub fn parse(name: &str) -> Option<Relation> {
        let relation = match name {
            "eq" | "=" => Relation::Eq,
            "ne" | "!=" => Relation::Ne,
            "like" => Relation::Like,
            "regexp" | "regex" => Relation::Regexp,
            "lt" | "<" => Relation::Lt,
            "gt" | ">" => Relation::Gt,
            "le" | "<=" => Relation::Le,
            "ge" | ">=" => Relation::Ge,
            "in" => Relation::In,
            _ => return None,
        };
        Some(relation)
    }
}

impl From<&Relation> for &str {
    fn from(relation: &Relation) -> &'static str {
        match *relation {
            Relation::Eq => "eq",
            Relation::Ne => "ne",
            Relation::Like => "like",
            Relation::Regexp => "regexp",
            Relation::Lt => "lt",
            Relation::Gt => "gt",
            Relation::Le => "le",
            Relation::Ge => "ge",
            Relation::In => "in",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", <&str>::from(self))
    }
}

/// A search value after normalization and type coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    Datetime(NaiveDateTime),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match *self {
            Value::Null => true,
            _ => false,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => (*b).into(),
            Value::Int(n) => (*n).into(),
            Value::Float(n) => (*n).into(),
            Value::Str(s) => s.as_str().into(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string().into(),
            Value::Datetime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string().into(),
            Value::List(values) => {
                let mut arr = JsonValue::new_array();
                for value in values {
                    // Descriptor dumps are best-effort; a full array
                    // cannot happen with our building code.
                    arr.push(value.to_json()).ok();
                }
                arr
            }
        }
    }
}

/// Collation override attached to a comparison or ordering on a text
/// attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collation {
    /// Compare bytes even on a store that defaults to case-folding.
    Binary,
    /// Fold case even on a store that defaults to byte comparison.
    CaseInsensitive,
}

impl From<&Collation> for &str {
    fn from(collation: &Collation) -> &'static str {
        match *collation {
            Collation::Binary => "binary",
            Collation::CaseInsensitive => "nocase",
        }
    }
}

impl fmt::Display for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", <&str>::from(self))
    }
}

/// One attribute-level test: `model.attribute <relation> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    model: String,
    attribute: String,
    alias: Option<String>,
    relation: Relation,
    value: Value,
    collation: Option<Collation>,
}

impl Comparison {
    pub fn new(
        model: &str,
        attribute: &str,
        alias: Option<&str>,
        relation: Relation,
        value: Value,
        collation: Option<Collation>,
    ) -> Comparison {
        Comparison {
            model: model.to_string(),
            attribute: attribute.to_string(),
            alias: alias.map(|a| a.to_string()),
            relation,
            value,
            collation,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
    /// Join alias the comparison applies under, when the attribute
    /// belongs to a joined model rather than the search target.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
    pub fn relation(&self) -> Relation {
        self.relation
    }
    pub fn value(&self) -> &Value {
        &self.value
    }
    pub fn collation(&self) -> Option<Collation> {
        self.collation
    }

    pub fn to_json(&self) -> JsonValue {
        let mut obj = json::object! {
            model: self.model.as_str(),
            attribute: self.attribute.as_str(),
            relation: <&str>::from(&self.relation),
            value: self.value.to_json(),
        };
        if let Some(alias) = self.alias.as_deref() {
            obj["alias"] = alias.into();
        }
        if let Some(collation) = self.collation.as_ref() {
            obj["collation"] = <&str>::from(collation).into();
        }
        obj
    }
}

/// A test against a linked model: does the related record (scalar) or
/// any related record (collection) satisfy `test`?
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedTest {
    model: String,
    attribute: String,
    alias: Option<String>,
    reltype: RelType,
    test: Comparison,
}

impl RelatedTest {
    pub fn new(
        model: &str,
        attribute: &str,
        alias: Option<&str>,
        reltype: RelType,
        test: Comparison,
    ) -> RelatedTest {
        RelatedTest {
            model: model.to_string(),
            attribute: attribute.to_string(),
            alias: alias.map(|a| a.to_string()),
            reltype,
            test,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Set when the owning model was joined into the query under an
    /// alias, i.e. when it is not the search target itself.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn reltype(&self) -> RelType {
        self.reltype
    }
    pub fn test(&self) -> &Comparison {
        &self.test
    }

    pub fn to_json(&self) -> JsonValue {
        let mut obj = json::object! {
            model: self.model.as_str(),
            attribute: self.attribute.as_str(),
            "type": <&str>::from(&self.reltype),
            test: self.test.to_json(),
        };
        if let Some(alias) = self.alias.as_deref() {
            obj["alias"] = alias.into();
        }
        obj
    }
}

/// The filter half of a compiled search.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row; the compilation of an absent filter.
    Always,
    /// Matches no row; the sentinel left behind by an errored branch.
    Invalid,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare(Box<Comparison>),
    Related(Box<RelatedTest>),
}

impl Predicate {
    pub fn to_json(&self) -> JsonValue {
        match self {
            Predicate::Always => JsonValue::Boolean(true),
            Predicate::Invalid => JsonValue::Boolean(false),
            Predicate::And(members) => {
                json::object! { and: Self::members_to_json(members) }
            }
            Predicate::Or(members) => {
                json::object! { or: Self::members_to_json(members) }
            }
            Predicate::Not(inner) => {
                json::object! { not: inner.to_json() }
            }
            Predicate::Compare(cmp) => {
                json::object! { compare: cmp.to_json() }
            }
            Predicate::Related(test) => {
                json::object! { related: test.to_json() }
            }
        }
    }

    fn members_to_json(members: &[Predicate]) -> JsonValue {
        let mut arr = JsonValue::new_array();
        for member in members {
            arr.push(member.to_json()).ok();
        }
        arr
    }
}

/// One join a compiled search requires: the target entity, the alias
/// assigned for this compile, and the attribute of the search target
/// the join travels through.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    model: String,
    alias: String,
    path: String,
}

impl JoinSpec {
    pub fn new(model: &str, alias: &str, path: &str) -> JoinSpec {
        JoinSpec {
            model: model.to_string(),
            alias: alias.to_string(),
            path: path.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
    pub fn alias(&self) -> &str {
        &self.alias
    }
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn to_json(&self) -> JsonValue {
        json::object! {
            model: self.model.as_str(),
            alias: self.alias.as_str(),
            path: self.path.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByDir {
    Asc,
    Desc,
}

impl fmt::Display for OrderByDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Asc => write!(f, "ASC"),
            _ => write!(f, "DESC"),
        }
    }
}

/// The ordering half of a compiled search.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    model: String,
    attribute: String,
    alias: Option<String>,
    dir: OrderByDir,
    collation: Option<Collation>,
}

impl OrderBy {
    pub fn new(
        model: &str,
        attribute: &str,
        alias: Option<&str>,
        dir: OrderByDir,
        collation: Option<Collation>,
    ) -> OrderBy {
        OrderBy {
            model: model.to_string(),
            attribute: attribute.to_string(),
            alias: alias.map(|a| a.to_string()),
            dir,
            collation,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
    pub fn dir(&self) -> OrderByDir {
        self.dir
    }
    pub fn collation(&self) -> Option<Collation> {
        self.collation
    }

    pub fn to_json(&self) -> JsonValue {
        let mut obj = json::object! {
            model: self.model.as_str(),
            attribute: self.attribute.as_str(),
            direction: self.dir.to_string(),
        };
        if let Some(alias) = self.alias.as_deref() {
            obj["alias"] = alias.into();
        }
        if let Some(collation) = self.collation.as_ref() {
            obj["collation"] = <&str>::from(collation).into();
        }
        obj
    }
}

/// Result-set slicing from the request envelope's "paginator" value.
///
/// ```
/// use lingdb::query::Pager;
///
/// let pager = Pager::from_json(&json::object! {page: 3, items_per_page: 20})
///     .expect("Parse OK");
/// assert_eq!(pager.limit(), 20);
/// assert_eq!(pager.offset(), 40);
///
/// assert!(Pager::from_json(&json::object! {page: 0, items_per_page: 20}).is_err());
/// assert!(Pager::from_json(&json::object! {page: 1}).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Pager {
    page: usize,
    items_per_page: usize,
}

impl Pager {
    pub fn new(page: usize, items_per_page: usize) -> Self {
        Pager {
            page,
            items_per_page,
        }
    }

    /// Both values must be present and positive.
    pub fn from_json(paginator: &JsonValue) -> LdbResult<Pager> {
        let page = util::json_int(&paginator["page"])
            .or_else(|_| Err("The paginator requires an integer page value"))?;
        let items = util::json_int(&paginator["items_per_page"])
            .or_else(|_| Err("The paginator requires an integer items_per_page value"))?;

        if page < 1 || items < 1 {
            return Err("Paginator values must be 1 or greater".into());
        }

        Ok(Pager::new(page as usize, items as usize))
    }

    pub fn page(&self) -> usize {
        self.page
    }
    pub fn items_per_page(&self) -> usize {
        self.items_per_page
    }
    pub fn limit(&self) -> usize {
        self.items_per_page
    }
    pub fn offset(&self) -> usize {
        (self.page - 1) * self.items_per_page
    }
}

/// Everything a storage layer needs to run one search.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSearch {
    predicate: Predicate,
    joins: Vec<JoinSpec>,
    order_by: OrderBy,
}

impl CompiledSearch {
    pub fn new(predicate: Predicate, joins: Vec<JoinSpec>, order_by: OrderBy) -> CompiledSearch {
        CompiledSearch {
            predicate,
            joins,
            order_by,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
    pub fn joins(&self) -> &[JoinSpec] {
        &self.joins
    }
    pub fn order_by(&self) -> &OrderBy {
        &self.order_by
    }

    pub fn to_json(&self) -> JsonValue {
        let mut joins = JsonValue::new_array();
        for join in self.joins.iter() {
            joins.push(join.to_json()).ok();
        }

        json::object! {
            filter: self.predicate.to_json(),
            joins: joins,
            order_by: self.order_by.to_json(),
        }
    }
}
