//! SQL rendering for compiled search descriptors.
//!
//! Turns a [`CompiledSearch`] into a single parameterized SELECT:
//! `$N` placeholders in the text, values delivered alongside in
//! placeholder order.  Every table, column, and alias name is checked
//! against [`is_identifier`] before it reaches the statement, so the
//! schema registry is the only source of interpolated text.

use crate::query::{
    Collation, CompiledSearch, Comparison, JoinSpec, OrderBy, Pager, Predicate, RelatedTest,
    Relation, Value,
};
use crate::result::LdbResult;
use crate::schema::{Link, Model, Registry, RelType};
use json::JsonValue;
use log::debug;
use std::sync::Arc;

/// Verify the provided string may act as a valid SQL identifier.
pub fn is_identifier(s: &str) -> bool {
    let s = s.trim();
    for c in s.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return false;
        }
    }
    !s.is_empty()
}

/// A rendered statement: SQL text plus the values for its `$N`
/// placeholders, in placeholder order ($1 is params()[0]).
#[derive(Debug)]
pub struct SqlQuery {
    sql: String,
    params: Vec<Value>,
}

impl SqlQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    pub fn to_json(&self) -> JsonValue {
        let mut params = JsonValue::new_array();
        for param in self.params.iter() {
            params.push(param.to_json()).ok();
        }
        json::object! {
            sql: self.sql.as_str(),
            params: params,
        }
    }
}

fn collation_keyword(collation: Collation) -> &'static str {
    match collation {
        Collation::Binary => "BINARY",
        Collation::CaseInsensitive => "NOCASE",
    }
}

fn relation_operator(relation: Relation) -> &'static str {
    match relation {
        Relation::Eq => "=",
        Relation::Ne => "!=",
        Relation::Like => "LIKE",
        Relation::Regexp => "REGEXP",
        Relation::Lt => "<",
        Relation::Gt => ">",
        Relation::Le => "<=",
        Relation::Ge => ">=",
        Relation::In => "IN",
    }
}

/// Adds a query parameter to the pile and increments the param index.
fn add_param(param_index: &mut usize, params: &mut Vec<Value>, value: Value) -> usize {
    let index = *param_index;
    *param_index += 1;
    params.push(value);
    index
}

/// Renders descriptors against one schema registry.
pub struct SqlRenderer {
    registry: Arc<Registry>,
}

impl SqlRenderer {
    pub fn new(registry: Arc<Registry>) -> SqlRenderer {
        SqlRenderer { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render one SELECT for `search` against the named target model.
    ///
    /// Joins to collection-valued links multiply rows, so those
    /// queries select DISTINCT; with a pager that keeps LIMIT/OFFSET
    /// counting records rather than join rows.
    pub fn render(
        &self,
        search: &CompiledSearch,
        model_name: &str,
        pager: Option<&Pager>,
    ) -> LdbResult<SqlQuery> {
        let target = self
            .registry
            .get_model(model_name)
            .ok_or_else(|| format!("No such model: {model_name}"))?;

        let ttable = self.ident(target.tablename())?;

        let mut distinct = false;
        for join in search.joins() {
            if self.join_multiplies_rows(target, join) {
                distinct = true;
            }
        }

        let mut sql = if distinct {
            format!("SELECT DISTINCT {ttable}.* FROM {ttable}")
        } else {
            format!("SELECT {ttable}.* FROM {ttable}")
        };

        for join in search.joins() {
            sql += &self.join_sql(target, join)?;
        }

        let mut params: Vec<Value> = Vec::new();
        let mut param_index = 1;

        let where_sql = self.predicate_sql(search.predicate(), &mut param_index, &mut params)?;
        sql += &format!(" WHERE {where_sql}");

        sql += &self.order_by_sql(search.order_by())?;

        if let Some(pager) = pager {
            sql += &format!(" LIMIT {} OFFSET {}", pager.limit(), pager.offset());
        }

        debug!("rendered search on {model_name}: {sql}");

        Ok(SqlQuery { sql, params })
    }

    fn join_multiplies_rows(&self, target: &Model, join: &JoinSpec) -> bool {
        if let Some(attribute) = target.get_attribute(join.path()) {
            if let Some(link) = attribute.link() {
                return link.reltype() == RelType::Collection;
            }
        }
        false
    }

    /// LEFT JOIN clause(s) for one join spec.  The join path names a
    /// linked attribute on the target; junction links join the map
    /// table first, then the far table under the spec's alias.
    fn join_sql(&self, target: &Model, join: &JoinSpec) -> LdbResult<String> {
        let attribute = target
            .get_attribute(join.path())
            .ok_or_else(|| format!("No join path {} on {}", join.path(), target.name()))?;

        let link = attribute
            .link()
            .ok_or_else(|| format!("Join path {} is not a linked attribute", join.path()))?;

        let foreign = self
            .registry
            .get_model(link.class())
            .ok_or_else(|| format!("No such model: {}", link.class()))?;

        let ttable = self.ident(target.tablename())?;
        let tpkey = self.ident(target.pkey())?;
        let ftable = self.ident(foreign.tablename())?;
        let fpkey = self.ident(foreign.pkey())?;
        let alias = self.ident(join.alias())?;
        let key = self.ident(link.key())?;

        match link.reltype() {
            RelType::Scalar => Ok(format!(
                " LEFT JOIN {ftable} AS {alias} ON ({alias}.{fpkey} = {ttable}.{key})"
            )),
            RelType::Collection => match link.map() {
                Some(map) => {
                    let map = self.ident(map)?;
                    let remote = format!("{}_id", foreign.tablename());
                    let remote = self.ident(&remote)?;
                    let mut sql =
                        format!(" LEFT JOIN {map} ON ({map}.{key} = {ttable}.{tpkey})");
                    sql += &format!(
                        " LEFT JOIN {ftable} AS {alias} ON ({alias}.{fpkey} = {map}.{remote})"
                    );
                    Ok(sql)
                }
                None => Ok(format!(
                    " LEFT JOIN {ftable} AS {alias} ON ({alias}.{key} = {ttable}.{tpkey})"
                )),
            },
        }
    }

    fn predicate_sql(
        &self,
        predicate: &Predicate,
        param_index: &mut usize,
        params: &mut Vec<Value>,
    ) -> LdbResult<String> {
        match predicate {
            Predicate::Always => Ok("TRUE".to_string()),
            Predicate::Invalid => Ok("FALSE".to_string()),
            Predicate::And(members) => self.boolean_sql("AND", members, param_index, params),
            Predicate::Or(members) => self.boolean_sql("OR", members, param_index, params),
            Predicate::Not(inner) => Ok(format!(
                "NOT ({})",
                self.predicate_sql(inner, param_index, params)?
            )),
            Predicate::Compare(cmp) => self.comparison_sql(cmp, None, param_index, params),
            Predicate::Related(related) => self.related_sql(related, param_index, params),
        }
    }

    fn boolean_sql(
        &self,
        op: &str,
        members: &[Predicate],
        param_index: &mut usize,
        params: &mut Vec<Value>,
    ) -> LdbResult<String> {
        let mut parts = Vec::new();
        for member in members {
            parts.push(self.predicate_sql(member, param_index, params)?);
        }
        Ok(format!("({})", parts.join(&format!(" {op} "))))
    }

    /// One comparison.  `prefix_override` replaces the row prefix when
    /// the comparison runs inside a related-test subquery.
    fn comparison_sql(
        &self,
        cmp: &Comparison,
        prefix_override: Option<&str>,
        param_index: &mut usize,
        params: &mut Vec<Value>,
    ) -> LdbResult<String> {
        let model = self
            .registry
            .get_model(cmp.model())
            .ok_or_else(|| format!("No such model: {}", cmp.model()))?;

        let prefix = match prefix_override {
            Some(prefix) => prefix,
            None => cmp.alias().unwrap_or(model.tablename()),
        };
        let prefix = self.ident(prefix)?;

        let attribute = model
            .get_attribute(cmp.attribute())
            .ok_or_else(|| format!("No such attribute: {}.{}", cmp.model(), cmp.attribute()))?;

        // Linked attributes compile only to emptiness tests; resolve
        // them through the link.
        if let Some(link) = attribute.link() {
            return self.link_null_sql(model, prefix, link, cmp.relation());
        }

        let mut column = format!("{prefix}.{}", self.ident(attribute.name())?);
        if let Some(collation) = cmp.collation() {
            column += " COLLATE ";
            column += collation_keyword(collation);
        }

        match cmp.relation() {
            Relation::In => {
                let members = match cmp.value() {
                    Value::List(members) => members,
                    _ => {
                        return Err(format!(
                            "The in relation requires a list of values: {}.{}",
                            cmp.model(),
                            cmp.attribute()
                        )
                        .into())
                    }
                };

                // IN of nothing matches nothing.
                if members.is_empty() {
                    return Ok(format!("{column} IN (NULL)"));
                }

                let mut placeholders = Vec::new();
                for member in members {
                    let index = add_param(param_index, params, member.clone());
                    placeholders.push(format!("${index}"));
                }
                Ok(format!("{column} IN ({})", placeholders.join(",")))
            }
            Relation::Eq if cmp.value().is_null() => Ok(format!("{column} IS NULL")),
            Relation::Ne if cmp.value().is_null() => Ok(format!("{column} IS NOT NULL")),
            _ => {
                let index = add_param(param_index, params, cmp.value().clone());
                Ok(format!(
                    "{column} {} ${index}",
                    relation_operator(cmp.relation())
                ))
            }
        }
    }

    /// A null test against a linked attribute.  Scalar links test the
    /// local foreign key column; collection links test for member
    /// rows.
    fn link_null_sql(
        &self,
        model: &Model,
        prefix: &str,
        link: &Link,
        relation: Relation,
    ) -> LdbResult<String> {
        match link.reltype() {
            RelType::Scalar => {
                let key = self.ident(link.key())?;
                match relation {
                    Relation::Eq => Ok(format!("{prefix}.{key} IS NULL")),
                    Relation::Ne => Ok(format!("{prefix}.{key} IS NOT NULL")),
                    _ => Err(format!(
                        "Relation {relation} cannot be rendered against a link"
                    )
                    .into()),
                }
            }
            RelType::Collection => {
                let exists = self.collection_exists_sql(model, prefix, link)?;
                match relation {
                    Relation::Eq => Ok(format!("NOT {exists}")),
                    Relation::Ne => Ok(exists),
                    _ => Err(format!(
                        "Relation {relation} cannot be rendered against a link"
                    )
                    .into()),
                }
            }
        }
    }

    /// EXISTS test for membership in a collection link, correlated to
    /// the `prefix` row of `model`.
    fn collection_exists_sql(&self, model: &Model, prefix: &str, link: &Link) -> LdbResult<String> {
        let pkey = self.ident(model.pkey())?;
        let key = self.ident(link.key())?;

        match link.map() {
            // Junction membership is answered by the map table alone.
            Some(map) => {
                let map = self.ident(map)?;
                Ok(format!(
                    "EXISTS (SELECT 1 FROM {map} WHERE {map}.{key} = {prefix}.{pkey})"
                ))
            }
            None => {
                let foreign = self
                    .registry
                    .get_model(link.class())
                    .ok_or_else(|| format!("No such model: {}", link.class()))?;
                let ftable = self.ident(foreign.tablename())?;
                let subalias = format!("{ftable}_e");
                Ok(format!(
                    "EXISTS (SELECT 1 FROM {ftable} AS {subalias} WHERE {subalias}.{key} = {prefix}.{pkey})"
                ))
            }
        }
    }

    /// (NOT) EXISTS subquery for a related-record test.  The far table
    /// is aliased `{tablename}_r` so self-referential links correlate
    /// correctly.
    fn related_sql(
        &self,
        related: &RelatedTest,
        param_index: &mut usize,
        params: &mut Vec<Value>,
    ) -> LdbResult<String> {
        let model = self
            .registry
            .get_model(related.model())
            .ok_or_else(|| format!("No such model: {}", related.model()))?;

        let prefix = match related.alias() {
            Some(alias) => alias,
            None => model.tablename(),
        };
        let prefix = self.ident(prefix)?;

        let attribute = model.get_attribute(related.attribute()).ok_or_else(|| {
            format!(
                "No such attribute: {}.{}",
                related.model(),
                related.attribute()
            )
        })?;

        let link = attribute
            .link()
            .ok_or_else(|| format!("{} is not a linked attribute", related.attribute()))?;

        let foreign = self
            .registry
            .get_model(link.class())
            .ok_or_else(|| format!("No such model: {}", link.class()))?;

        let ftable = self.ident(foreign.tablename())?;
        let fpkey = self.ident(foreign.pkey())?;
        let key = self.ident(link.key())?;
        let pkey = self.ident(model.pkey())?;
        let subalias = format!("{ftable}_r");

        let test_sql = self.comparison_sql(related.test(), Some(&subalias), param_index, params)?;

        match link.reltype() {
            RelType::Scalar => Ok(format!(
                "EXISTS (SELECT 1 FROM {ftable} AS {subalias} WHERE {subalias}.{fpkey} = {prefix}.{key} AND {test_sql})"
            )),
            RelType::Collection => match link.map() {
                Some(map) => {
                    let map = self.ident(map)?;
                    let remote = format!("{}_id", foreign.tablename());
                    let remote = self.ident(&remote)?;
                    let mut sql = format!("EXISTS (SELECT 1 FROM {map}");
                    sql += &format!(
                        " JOIN {ftable} AS {subalias} ON ({subalias}.{fpkey} = {map}.{remote})"
                    );
                    sql += &format!(" WHERE {map}.{key} = {prefix}.{pkey} AND {test_sql})");
                    Ok(sql)
                }
                None => Ok(format!(
                    "EXISTS (SELECT 1 FROM {ftable} AS {subalias} WHERE {subalias}.{key} = {prefix}.{pkey} AND {test_sql})"
                )),
            },
        }
    }

    fn order_by_sql(&self, order_by: &OrderBy) -> LdbResult<String> {
        let model = self
            .registry
            .get_model(order_by.model())
            .ok_or_else(|| format!("No such model: {}", order_by.model()))?;

        let prefix = match order_by.alias() {
            Some(alias) => alias,
            None => model.tablename(),
        };

        let attribute = model.get_attribute(order_by.attribute()).ok_or_else(|| {
            format!(
                "No such attribute: {}.{}",
                order_by.model(),
                order_by.attribute()
            )
        })?;

        let mut sql = format!(
            " ORDER BY {}.{}",
            self.ident(prefix)?,
            self.ident(attribute.name())?
        );

        if let Some(collation) = order_by.collation() {
            sql += " COLLATE ";
            sql += collation_keyword(collation);
        }

        sql += &format!(" {}", order_by.dir());

        Ok(sql)
    }

    /// Verify the provided string may act as a valid identifier.
    fn ident<'a>(&'a self, s: &'a str) -> LdbResult<&str> {
        if is_identifier(s) {
            Ok(s)
        } else {
            Err(format!("Value is not a valid identifier: {s}").into())
        }
    }
}
