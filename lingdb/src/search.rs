//! Search-expression compiler.
//!
//! Translates client-submitted filter expressions (nested JSON lists)
//! into [`CompiledSearch`] descriptors, validating every model name,
//! attribute, relation, and value along the way.
//!
//! Validation is best-effort: a single compile pass collects every
//! problem it can find and reports them together, keyed by the
//! coordinate of the offending piece ("Form", "Form.transcription",
//! "Form.transcription.like", or the bad date literal itself), so a
//! client can fix a whole search form in one round trip.

use crate::date;
use crate::norm::Normalizer;
use crate::query::{
    Collation, CompiledSearch, Comparison, JoinSpec, OrderBy, OrderByDir, Predicate, RelatedTest,
    Relation, Value,
};
use crate::result::LdbResult;
use crate::schema::{Attribute, DataType, Model, Registry};
use json::JsonValue;
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Hard ceiling on expression nesting.
pub const MAX_EXPR_DEPTH: usize = 64;

const MALFORMED_KEY: &str = "Malformed query error";
const MALFORMED_MSG: &str = "The submitted query was malformed";

const DATE_LITERAL_MSG: &str = "Date search parameters must be valid ISO 8601 date strings.";
const DATETIME_LITERAL_MSG: &str =
    "Datetime search parameters must be valid ISO 8601 datetime strings.";

const INVALID_QUERY_MSG: &str =
    "The specified search parameters generated an invalid database query";

const ORDER_BY_MSG: &str = "The provided order by expression was invalid.";

/// Aggregate of every problem found while compiling one search.
///
/// Errors are keyed by coordinate so repeated problems at one spot
/// collapse into a single entry; a later message for the same key
/// replaces the earlier one.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParseError {
    errors: HashMap<String, String>,
}

impl SearchParseError {
    pub fn new() -> SearchParseError {
        SearchParseError {
            errors: HashMap::new(),
        }
    }

    pub fn add(&mut self, key: &str, msg: &str) {
        self.errors.insert(key.to_string(), msg.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.errors.get(key).map(|msg| msg.as_str())
    }

    pub fn errors(&self) -> &HashMap<String, String> {
        &self.errors
    }

    pub fn into_errors(self) -> HashMap<String, String> {
        self.errors
    }

    /// The response-body shape clients see: `{"errors": {...}}`.
    pub fn to_json(&self) -> JsonValue {
        let mut errors = JsonValue::new_object();
        for (key, msg) in self.errors.iter() {
            errors[key.as_str()] = msg.as_str().into();
        }
        json::object! { errors: errors }
    }
}

impl Default for SearchParseError {
    fn default() -> SearchParseError {
        SearchParseError::new()
    }
}

impl fmt::Display for SearchParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<String> = self
            .errors
            .iter()
            .map(|(key, msg)| format!("{key}: {msg}"))
            .collect();
        pairs.sort();
        write!(f, "{}", pairs.join("; "))
    }
}

/// Joins collected over one compile pass.
///
/// Each joined entity gets exactly one alias, allocated on first
/// request and reused thereafter.  Aliases are `{tablename}_{n}` with
/// n counting from 1 in join order, so compiling the same expression
/// always produces the same names.
struct JoinSet {
    list: Vec<JoinSpec>,
    index: HashMap<String, usize>,
}

impl JoinSet {
    fn new() -> JoinSet {
        JoinSet {
            list: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Alias for joining `model`, allocating one on first use.
    fn request(&mut self, model: &str, tablename: &str, path: &str) -> String {
        if let Some(pos) = self.index.get(model) {
            return self.list[*pos].alias().to_string();
        }
        let alias = format!("{}_{}", tablename, self.list.len() + 1);
        self.index.insert(model.to_string(), self.list.len());
        self.list.push(JoinSpec::new(model, &alias, path));
        alias
    }

    fn into_list(self) -> Vec<JoinSpec> {
        self.list
    }
}

/// Mutable state for a single compile() call.  The compiler itself
/// stays immutable so concurrent searches never see each other's
/// errors or joins.
struct CompileCtx {
    errors: SearchParseError,
    joins: JoinSet,
}

impl CompileCtx {
    fn new() -> CompileCtx {
        CompileCtx {
            errors: SearchParseError::new(),
            joins: JoinSet::new(),
        }
    }

    /// Record the generic malformed-query pair plus a failure-class
    /// entry with the specific message.
    fn malformed(&mut self, class: &str, msg: &str) -> Predicate {
        self.errors.add(MALFORMED_KEY, MALFORMED_MSG);
        self.errors.add(class, msg);
        Predicate::Invalid
    }
}

/// Compiles client search expressions against one target model.
///
/// A compiler is built once per (registry, target model, collation
/// policy) and may then serve any number of compile() calls, from any
/// number of threads when shared behind an Arc.
pub struct SearchCompiler {
    registry: Arc<Registry>,
    model_name: String,
    pkey: String,
    case_sensitive: bool,
    normalizer: Normalizer,
}

impl fmt::Display for SearchCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compiler for model={}", self.model_name)
    }
}

impl SearchCompiler {
    /// `case_sensitive` describes the string store: true means the
    /// database compares strings byte-wise (SQLite-style), false means
    /// it folds case by default (MySQL-style).  The flag decides where
    /// collation overrides land; see [`CompiledSearch`].
    pub fn new(
        registry: Arc<Registry>,
        model_name: &str,
        case_sensitive: bool,
    ) -> LdbResult<SearchCompiler> {
        let pkey = match registry.get_model(model_name) {
            Some(model) => model.pkey().to_string(),
            None => return Err(format!("No such model: {model_name}").into()),
        };

        Ok(SearchCompiler {
            registry,
            model_name: model_name.to_string(),
            pkey,
            case_sensitive,
            normalizer: Normalizer::new(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn pkey(&self) -> &str {
        &self.pkey
    }

    /// Override the column the default ordering falls back to.
    pub fn set_pkey(&mut self, pkey: &str) {
        self.pkey = pkey.to_string();
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Compile one query object into a search descriptor.
    ///
    /// `query` is `{"filter": <expression>, "order_by": [...]}`.  An
    /// absent or null filter constrains nothing.  Any problem found in
    /// either part fails the whole compile with a [`SearchParseError`]
    /// carrying every error discovered.
    pub fn compile(&self, query: &JsonValue) -> LdbResult<CompiledSearch> {
        if !query.is_object() {
            return Err(INVALID_QUERY_MSG.into());
        }

        let target = self
            .registry
            .get_model(&self.model_name)
            .ok_or_else(|| format!("No such model: {}", self.model_name))?;

        debug!("compiling a search on {target}");

        let mut ctx = CompileCtx::new();

        let filter = &query["filter"];
        let predicate = if filter.is_null() {
            Predicate::Always
        } else {
            self.compile_expr(&mut ctx, target, filter, 0)
        };

        let order_by = self.compile_order_by(&mut ctx, target, &query["order_by"]);

        if !ctx.errors.is_empty() {
            warn!(
                "rejecting search on {}: {} error(s)",
                self.model_name,
                ctx.errors.len()
            );
            return Err(ctx.errors.into());
        }

        Ok(CompiledSearch::new(
            predicate,
            ctx.joins.into_list(),
            order_by,
        ))
    }

    /// Client-facing description of what may be searched on the target
    /// model: attribute metadata plus the canonical relation names.
    pub fn search_parameters(&self) -> JsonValue {
        let mut attributes = JsonValue::new_object();
        if let Some(model) = self.registry.get_model(&self.model_name) {
            for name in model.attribute_names_sorted() {
                if let Some(attribute) = model.get_attribute(name) {
                    attributes[name] = attribute.to_json();
                }
            }
        }

        let mut relations = JsonValue::new_array();
        for relation in Relation::ALL.iter() {
            relations.push(<&str>::from(relation)).ok();
        }

        json::object! {
            attributes: attributes,
            relations: relations,
        }
    }

    // ------------------------------------------------------------------
    // Expression recursion
    // ------------------------------------------------------------------

    fn compile_expr(
        &self,
        ctx: &mut CompileCtx,
        target: &Model,
        expr: &JsonValue,
        depth: usize,
    ) -> Predicate {
        if depth > MAX_EXPR_DEPTH {
            return ctx.malformed(
                "DepthError",
                &format!("Expression nesting exceeds {MAX_EXPR_DEPTH} levels"),
            );
        }

        if !expr.is_array() {
            return ctx.malformed(
                "TypeError",
                &format!("Expected an expression list, found {}", expr.dump()),
            );
        }

        match expr[0].as_str() {
            Some("and") => self.compile_boolean(ctx, target, expr, depth, true),
            Some("or") => self.compile_boolean(ctx, target, expr, depth, false),
            Some("not") => self.compile_negation(ctx, target, expr, depth),
            _ => self.compile_leaf(ctx, target, expr),
        }
    }

    fn compile_boolean(
        &self,
        ctx: &mut CompileCtx,
        target: &Model,
        expr: &JsonValue,
        depth: usize,
        conjunction: bool,
    ) -> Predicate {
        if expr.len() < 2 {
            return ctx.malformed(
                "IndexError",
                "A boolean operator requires a list of operand expressions",
            );
        }

        let operands = &expr[1];
        if !operands.is_array() {
            return ctx.malformed(
                "TypeError",
                &format!(
                    "Expected a list of operand expressions, found {}",
                    operands.dump()
                ),
            );
        }

        let mut members = Vec::new();
        for operand in operands.members() {
            members.push(self.compile_expr(ctx, target, operand, depth + 1));
        }

        // Conjoining or disjoining nothing constrains nothing.
        if members.is_empty() {
            return Predicate::Always;
        }

        if conjunction {
            Predicate::And(members)
        } else {
            Predicate::Or(members)
        }
    }

    fn compile_negation(
        &self,
        ctx: &mut CompileCtx,
        target: &Model,
        expr: &JsonValue,
        depth: usize,
    ) -> Predicate {
        if expr.len() < 2 {
            return ctx.malformed("IndexError", "The not operator requires an operand expression");
        }

        // Elements past the operand are ignored.
        let inner = self.compile_expr(ctx, target, &expr[1], depth + 1);
        Predicate::Not(Box::new(inner))
    }

    // ------------------------------------------------------------------
    // Leaves
    // ------------------------------------------------------------------

    fn compile_leaf(&self, ctx: &mut CompileCtx, target: &Model, expr: &JsonValue) -> Predicate {
        if expr.len() < 4 || expr.len() > 5 {
            return ctx.malformed(
                "ArityError",
                &format!(
                    "A filter expression requires 4 or 5 elements, found {}",
                    expr.len()
                ),
            );
        }

        let mut names = Vec::new();
        for part in 0..(expr.len() - 1) {
            match expr[part].as_str() {
                Some(name) => names.push(name),
                None => {
                    return ctx.malformed(
                        "TypeError",
                        &format!(
                            "Expected a name string, found {}",
                            expr[part].dump()
                        ),
                    );
                }
            }
        }

        if expr.len() == 4 {
            self.compile_simple_leaf(ctx, target, &names, &expr[3])
        } else {
            self.compile_relational_leaf(ctx, target, &names, &expr[4])
        }
    }

    /// `[model, attribute, relation, value]`
    fn compile_simple_leaf(
        &self,
        ctx: &mut CompileCtx,
        target: &Model,
        names: &[&str],
        value: &JsonValue,
    ) -> Predicate {
        let (model_name, attr_name, relation_name) = (names[0], names[1], names[2]);

        let model = match self.lookup_model(ctx, model_name) {
            Some(model) => model,
            None => return Predicate::Invalid,
        };

        let attribute = match self.lookup_attribute(ctx, model, attr_name) {
            Some(attribute) => attribute,
            None => return Predicate::Invalid,
        };

        // The remaining checks all run before any of them stops the
        // leaf, so one pass reports as much as possible.
        let relation = self.lookup_relation(ctx, model, attribute, attr_name, relation_name);
        let value = self.compile_value(ctx, attribute, value);
        let alias = self.request_join(ctx, target, model_name);

        let relation = match relation {
            Some(relation) => relation,
            None => return Predicate::Invalid,
        };

        // Linked attributes support emptiness tests only; anything
        // richer must spell out the foreign attribute.
        if attribute.link().is_some() && !value.is_null() {
            return self.invalid_expression(ctx, model.name(), attr_name, relation, &value);
        }

        if relation == Relation::In {
            match value {
                Value::List(_) => (),
                _ => return self.invalid_expression(ctx, model.name(), attr_name, relation, &value),
            }
        }

        Predicate::Compare(Box::new(Comparison::new(
            model.name(),
            attribute.name(),
            alias.as_deref(),
            relation,
            value,
            self.comparison_collation(attribute),
        )))
    }

    /// `[model, attribute, foreign attribute, relation, value]`
    ///
    /// The attribute must be a link; the relation and value are
    /// validated against the foreign model and the whole leaf becomes
    /// a related-record test.  The foreign model is never joined, the
    /// test compiles to subquery semantics.
    fn compile_relational_leaf(
        &self,
        ctx: &mut CompileCtx,
        target: &Model,
        names: &[&str],
        value: &JsonValue,
    ) -> Predicate {
        let (model_name, attr_name, fattr_name, relation_name) =
            (names[0], names[1], names[2], names[3]);

        let model = match self.lookup_model(ctx, model_name) {
            Some(model) => model,
            None => return Predicate::Invalid,
        };

        let attribute = match self.lookup_attribute(ctx, model, attr_name) {
            Some(attribute) => attribute,
            None => return Predicate::Invalid,
        };

        let link = match attribute.link() {
            Some(link) => link,
            None => {
                ctx.errors.add(
                    &format!("{}.{}", model.name(), attr_name),
                    &format!(
                        "The {} attribute of the {} model does not represent a many-to-one relation.",
                        attr_name,
                        model.name()
                    ),
                );
                return Predicate::Invalid;
            }
        };

        let foreign = match self.lookup_model(ctx, link.class()) {
            Some(foreign) => foreign,
            None => return Predicate::Invalid,
        };

        let foreign_attr = match self.lookup_attribute(ctx, foreign, fattr_name) {
            Some(attribute) => attribute,
            None => return Predicate::Invalid,
        };

        let relation = self.lookup_relation(ctx, foreign, foreign_attr, fattr_name, relation_name);
        let value = self.compile_value(ctx, foreign_attr, value);

        // The owning model itself still needs to be reachable from the
        // search target.
        let alias = self.request_join(ctx, target, model_name);

        let relation = match relation {
            Some(relation) => relation,
            None => return Predicate::Invalid,
        };

        if foreign_attr.link().is_some() && !value.is_null() {
            return self.invalid_expression(ctx, foreign.name(), fattr_name, relation, &value);
        }

        if relation == Relation::In {
            match value {
                Value::List(_) => (),
                _ => {
                    return self.invalid_expression(ctx, foreign.name(), fattr_name, relation, &value)
                }
            }
        }

        let test = Comparison::new(
            foreign.name(),
            foreign_attr.name(),
            None,
            relation,
            value,
            self.comparison_collation(foreign_attr),
        );

        Predicate::Related(Box::new(RelatedTest::new(
            model.name(),
            attribute.name(),
            alias.as_deref(),
            link.reltype(),
            test,
        )))
    }

    // ------------------------------------------------------------------
    // Leaf pieces
    // ------------------------------------------------------------------

    fn lookup_model(&self, ctx: &mut CompileCtx, name: &str) -> Option<&Model> {
        match self.registry.get_model(name) {
            Some(model) => Some(model),
            None => {
                ctx.errors
                    .add(name, &format!("Searching on the {name} model is not permitted"));
                None
            }
        }
    }

    fn lookup_attribute<'a>(
        &self,
        ctx: &mut CompileCtx,
        model: &'a Model,
        name: &str,
    ) -> Option<&'a Attribute> {
        match model.get_attribute(name) {
            Some(attribute) => Some(attribute),
            None => {
                ctx.errors.add(
                    &format!("{}.{}", model.name(), name),
                    &format!("Searching on {}.{} is not permitted", model.name(), name),
                );
                None
            }
        }
    }

    /// Resolve and whitelist-check the relation.  Failure records an
    /// error keyed by the submitted spelling and returns None; the
    /// caller keeps validating the rest of the leaf first.
    fn lookup_relation(
        &self,
        ctx: &mut CompileCtx,
        model: &Model,
        attribute: &Attribute,
        attr_name: &str,
        submitted: &str,
    ) -> Option<Relation> {
        let mut relation = Relation::parse(submitted);
        if let Some(found) = relation {
            if !attribute.relation_permitted(found) {
                relation = None;
            }
        }

        if relation.is_none() {
            ctx.errors.add(
                &format!("{}.{}.{}", model.name(), attr_name, submitted),
                &format!(
                    "The relation {} is not permitted for {}.{}",
                    submitted,
                    model.name(),
                    attr_name
                ),
            );
        }

        relation
    }

    /// Normalize and coerce one search value per the attribute's
    /// datatype.  A list value coerces member-wise.  Bad date and
    /// datetime literals record an error keyed by the literal and
    /// coerce to null.
    fn compile_value(&self, ctx: &mut CompileCtx, attribute: &Attribute, value: &JsonValue) -> Value {
        if value.is_array() {
            let mut list = Vec::new();
            for member in value.members() {
                list.push(self.compile_scalar(ctx, attribute, member));
            }
            return Value::List(list);
        }
        self.compile_scalar(ctx, attribute, value)
    }

    fn compile_scalar(&self, ctx: &mut CompileCtx, attribute: &Attribute, value: &JsonValue) -> Value {
        // Null passes through untouched; it is meaningful for
        // emptiness tests.
        if value.is_null() {
            return Value::Null;
        }

        match attribute.datatype() {
            DataType::Date => {
                let literal = self.literal_of(value);
                match date::parse_date(&literal) {
                    Ok(parsed) => Value::Date(parsed),
                    Err(_) => {
                        ctx.errors.add(&format!("date {literal}"), DATE_LITERAL_MSG);
                        Value::Null
                    }
                }
            }
            DataType::Datetime => {
                let literal = self.literal_of(value);
                match date::parse_datetime(&literal) {
                    Ok(parsed) => Value::Datetime(parsed),
                    Err(_) => {
                        ctx.errors
                            .add(&format!("datetime {literal}"), DATETIME_LITERAL_MSG);
                        Value::Null
                    }
                }
            }
            _ => {
                if let Some(text) = value.as_str() {
                    Value::Str(self.normalizer.nfd(text))
                } else if let Some(num) = value.as_i64() {
                    Value::Int(num)
                } else if let Some(num) = value.as_f64() {
                    Value::Float(num)
                } else if let Some(flag) = value.as_bool() {
                    Value::Bool(flag)
                } else {
                    // Objects and nested lists have no scalar reading.
                    ctx.malformed(
                        "TypeError",
                        &format!("Expected a scalar search value, found {}", value.dump()),
                    );
                    Value::Null
                }
            }
        }
    }

    /// The submitted literal as the date parsers and error keys see
    /// it: strings unquoted and NFD-normalized, everything else in
    /// JSON notation.
    fn literal_of(&self, value: &JsonValue) -> String {
        match value.as_str() {
            Some(text) => self.normalizer.nfd(text),
            None => value.dump(),
        }
    }

    /// When a leaf names a model other than the search target, pull
    /// that model into the query.  Unjoinable models record an error;
    /// the leaf still compiles, unaliased.
    fn request_join(&self, ctx: &mut CompileCtx, target: &Model, model_name: &str) -> Option<String> {
        if model_name == target.name() {
            return None;
        }

        let path = match target.join_path(model_name) {
            Some(path) => path.to_string(),
            None => {
                ctx.errors.add(
                    model_name,
                    &format!(
                        "Searching the {} model by joining on the {} model is not possible",
                        target.name(),
                        model_name
                    ),
                );
                return None;
            }
        };

        // Join the entity the name resolves to; "Memorizer" data lives
        // in the user table.
        let entity = self.registry.resolve_alias(model_name);
        match self.registry.get_model(entity) {
            Some(joined) => Some(ctx.joins.request(joined.name(), joined.tablename(), &path)),
            None => {
                ctx.errors.add(
                    model_name,
                    &format!(
                        "Searching the {} model by joining on the {} model is not possible",
                        target.name(),
                        model_name
                    ),
                );
                None
            }
        }
    }

    /// Record the catch-all error for a leaf whose pieces validated
    /// individually but cannot combine.
    fn invalid_expression(
        &self,
        ctx: &mut CompileCtx,
        model_name: &str,
        attr_name: &str,
        relation: Relation,
        value: &Value,
    ) -> Predicate {
        let coordinate = format!("{}.{}.{}", model_name, attr_name, relation);
        ctx.errors.add(
            &coordinate,
            &format!(
                "Invalid filter expression: {}({})",
                coordinate,
                value.to_json().dump()
            ),
        );
        Predicate::Invalid
    }

    fn comparison_collation(&self, attribute: &Attribute) -> Option<Collation> {
        // A case-folding store needs binary collation for comparisons
        // to see exact bytes.
        if !self.case_sensitive && attribute.datatype().is_text() {
            Some(Collation::Binary)
        } else {
            None
        }
    }

    fn ordering_collation(&self, attribute: &Attribute) -> Option<Collation> {
        // A byte-wise store needs nocase collation for ordering to
        // read alphabetically.
        if self.case_sensitive && attribute.datatype().is_text() {
            Some(Collation::CaseInsensitive)
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Ordering
    // ------------------------------------------------------------------

    /// Compile the order_by value.  Invalid input records its errors
    /// and degrades to the default ordering, target primary key
    /// ascending, so a descriptor always carries a total order.
    fn compile_order_by(&self, ctx: &mut CompileCtx, target: &Model, order_by: &JsonValue) -> OrderBy {
        if order_by.is_null() {
            return self.default_order_by(target);
        }

        match self.try_order_by(ctx, target, order_by) {
            Some(order_by) => order_by,
            None => {
                ctx.errors.add("OrderByError", ORDER_BY_MSG);
                self.default_order_by(target)
            }
        }
    }

    fn default_order_by(&self, target: &Model) -> OrderBy {
        OrderBy::new(target.name(), &self.pkey, None, OrderByDir::Asc, None)
    }

    fn try_order_by(
        &self,
        ctx: &mut CompileCtx,
        target: &Model,
        order_by: &JsonValue,
    ) -> Option<OrderBy> {
        if !order_by.is_array() || order_by.len() < 2 {
            return None;
        }

        let model_name = order_by[0].as_str()?;
        let attr_name = order_by[1].as_str()?;

        let model = self.lookup_model(ctx, model_name)?;
        let attribute = self.lookup_attribute(ctx, model, attr_name)?;

        // Links have no ordering column.
        if attribute.link().is_some() {
            return None;
        }

        // Ordering on another model joins it exactly like a filter
        // leaf would, sharing any join the filter already made.
        let alias = self.request_join(ctx, target, model_name);

        // Only an explicit "desc" descends.
        let dir = match order_by[2].as_str() {
            Some("desc") => OrderByDir::Desc,
            _ => OrderByDir::Asc,
        };

        Some(OrderBy::new(
            model.name(),
            attribute.name(),
            alias.as_deref(),
            dir,
            self.ordering_collation(attribute),
        ))
    }
}
