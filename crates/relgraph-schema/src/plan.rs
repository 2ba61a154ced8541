//! Select planning for root fields.
//!
//! A root field and everything selected beneath it are fetched by one
//! statement: the root table plus one `LEFT JOIN` per selected link, each
//! with its own alias. The flat rows are then folded back into nested
//! objects keyed by GraphQL response key.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::adapter::{ArgMap, SqlDialect};
use crate::error::TranslateError;
use crate::order::SortDirection;
use crate::registry::{ConnectionType, FieldDef, FieldKind, ObjectType, ScalarKind};

/// Key under which hydrated objects carry their primary key value.
pub const PK_KEY: &str = "$pk";

/// One field of a GraphQL selection, with its arguments as JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub name: String,
    pub alias: Option<String>,
    pub args: ArgMap,
    pub children: Vec<Selection>,
}

impl Selection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.args.insert(name.into(), value);
        self
    }

    pub fn child(mut self, child: Selection) -> Self {
        self.children.push(child);
        self
    }

    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSelect {
    /// Response key in the hydrated object.
    pub key: String,
    pub column: String,
    /// Column label in the result rows.
    pub label: String,
    /// Select `column IS NOT NULL` instead of the value (blob columns).
    pub presence: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Link to another table; hydrates to an array.
    Many,
    /// Annotated group of the same row; hydrates to one object.
    One,
}

#[derive(Debug)]
pub struct JoinPlan {
    pub key: String,
    pub cardinality: Cardinality,
    /// Join condition, with the child's filter folded in.
    pub on: String,
    pub plan: SelectPlan,
}

/// Columns and joins of one table occurrence in the statement.
#[derive(Debug)]
pub struct SelectPlan {
    pub alias: String,
    pub table: String,
    pub primary: Option<String>,
    /// Row identity when the table has no primary field: `(column, label)`.
    pub identity: Vec<(String, String)>,
    pub columns: Vec<ColumnSelect>,
    pub joins: Vec<JoinPlan>,
    /// Filter on this table occurrence; only rendered in WHERE for the root.
    pub where_sql: String,
    pub order_by: Vec<(String, SortDirection)>,
}

/// Plan the statement for a root field from its selection.
pub fn plan_root(field: &FieldDef, selection: &Selection) -> Result<SelectPlan, TranslateError> {
    let FieldKind::Connection(connection) = &field.kind else {
        return Err(TranslateError::InvalidSelection(format!(
            "{} is not a table field",
            field.name
        )));
    };
    let mut planner = Planner { next_alias: 0 };
    planner.plan_connection(field, connection, selection)
}

struct Planner {
    next_alias: usize,
}

impl Planner {
    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn plan_connection(
        &mut self,
        field: &FieldDef,
        connection: &ConnectionType,
        selection: &Selection,
    ) -> Result<SelectPlan, TranslateError> {
        let node = connection.node().ok_or_else(|| {
            TranslateError::InvalidSelection(format!("{} has no node type", connection.name))
        })?;

        // Node selections reached through `edges { node }` and `nodes`.
        let mut nodes = Vec::new();
        for child in &selection.children {
            match child.name.as_str() {
                "nodes" => nodes.extend(child.children.iter()),
                "edges" => {
                    for edge in &child.children {
                        if edge.name == "node" {
                            nodes.extend(edge.children.iter());
                        }
                    }
                }
                _ => {}
            }
        }

        let alias = self.alias();
        let mut plan = self.plan_object(&node, alias, nodes)?;
        plan.where_sql = (field.where_fn)(&plan.alias, &selection.args)?;
        plan.order_by = order_terms(field, &selection.args)?;
        Ok(plan)
    }

    fn plan_object<'s>(
        &mut self,
        object: &ObjectType,
        alias: String,
        selections: impl IntoIterator<Item = &'s Selection>,
    ) -> Result<SelectPlan, TranslateError> {
        let merged = merge_selections(selections);

        let identity = match &object.unique_key {
            Some(_) => Vec::new(),
            None => object
                .fields()
                .filter(|f| matches!(f.kind, FieldKind::Scalar(kind) if kind != ScalarKind::Url))
                .filter_map(|f| f.sql_column.clone())
                .enumerate()
                .map(|(i, column)| (column, format!("{alias}_k{i}")))
                .collect(),
        };

        let mut plan = SelectPlan {
            alias,
            table: object.sql_table.clone(),
            primary: object.unique_key.clone(),
            identity,
            columns: Vec::new(),
            joins: Vec::new(),
            where_sql: String::new(),
            order_by: Vec::new(),
        };

        for selection in merged {
            if selection.name.starts_with("__") {
                continue;
            }
            let field = object.field(&selection.name).ok_or_else(|| {
                TranslateError::InvalidSelection(format!(
                    "{} has no field {}",
                    object.name, selection.name
                ))
            })?;
            self.plan_field(&mut plan, field, &selection)?;
        }
        Ok(plan)
    }

    fn plan_field(
        &mut self,
        plan: &mut SelectPlan,
        field: &Arc<FieldDef>,
        selection: &Selection,
    ) -> Result<(), TranslateError> {
        let key = selection.response_key().to_string();
        match &field.kind {
            FieldKind::Scalar(kind) => {
                let Some(column) = field.sql_column.clone() else {
                    return Ok(());
                };
                let label = format!("{}_c{}", plan.alias, plan.columns.len());
                plan.columns.push(ColumnSelect {
                    key,
                    column,
                    label,
                    presence: *kind == ScalarKind::Url,
                });
            }
            FieldKind::Connection(connection) => {
                let parent = plan.alias.clone();
                let child = self.plan_connection(field, connection, selection)?;
                plan.joins.push(JoinPlan {
                    key,
                    cardinality: Cardinality::Many,
                    on: join_condition(field, &parent, &child),
                    plan: child,
                });
            }
            FieldKind::Emulated(object) => {
                let parent = plan.alias.clone();
                let alias = self.alias();
                let mut child = self.plan_object(object, alias, selection.children.iter())?;
                child.where_sql = (field.where_fn)(&child.alias, &selection.args)?;
                child.order_by = order_terms(field, &selection.args)?;
                plan.joins.push(JoinPlan {
                    key,
                    cardinality: Cardinality::One,
                    on: join_condition(field, &parent, &child),
                    plan: child,
                });
            }
        }
        Ok(())
    }
}

fn order_terms(
    field: &FieldDef,
    args: &ArgMap,
) -> Result<Vec<(String, SortDirection)>, TranslateError> {
    Ok((field.order_by)(args)?
        .map(|order| order.into_iter().collect())
        .unwrap_or_default())
}

fn join_condition(field: &FieldDef, parent: &str, child: &SelectPlan) -> String {
    let on = field
        .join
        .as_ref()
        .map(|join| join(parent, &child.alias))
        .unwrap_or_else(|| "TRUE".to_string());
    if child.where_sql.is_empty() {
        on
    } else {
        format!("{on} AND ({})", child.where_sql)
    }
}

/// Merge selections sharing a response key, keeping first-seen order.
fn merge_selections<'s>(selections: impl IntoIterator<Item = &'s Selection>) -> Vec<Selection> {
    let mut merged: IndexMap<String, Selection> = IndexMap::new();
    for selection in selections {
        match merged.get_mut(selection.response_key()) {
            Some(existing) => existing.children.extend(selection.children.iter().cloned()),
            None => {
                merged.insert(selection.response_key().to_string(), selection.clone());
            }
        }
    }
    merged.into_values().collect()
}

impl SelectPlan {
    fn pk_label(&self) -> String {
        format!("{}_pk", self.alias)
    }

    fn rid_label(&self) -> String {
        format!("{}_rid", self.alias)
    }

    /// `expr AS "label"` for every column of the statement.
    pub fn select_list(&self, dialect: &dyn SqlDialect) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_select(dialect, &mut out);
        out
    }

    fn collect_select(&self, dialect: &dyn SqlDialect, out: &mut Vec<String>) {
        if let Some(primary) = &self.primary {
            out.push(format!(
                "{}.{} AS {}",
                self.alias,
                dialect.quote(primary),
                dialect.quote(&self.pk_label())
            ));
        }
        if self.primary.is_none()
            && let Some(expr) = dialect.row_identity(&self.alias)
        {
            out.push(format!("{expr} AS {}", dialect.quote(&self.rid_label())));
        }
        for (column, label) in &self.identity {
            out.push(format!(
                "{}.{} AS {}",
                self.alias,
                dialect.quote(column),
                dialect.quote(label)
            ));
        }
        for column in &self.columns {
            let expr = format!("{}.{}", self.alias, dialect.quote(&column.column));
            let expr = if column.presence {
                format!("({expr} IS NOT NULL)")
            } else {
                expr
            };
            out.push(format!("{expr} AS {}", dialect.quote(&column.label)));
        }
        for join in &self.joins {
            join.plan.collect_select(dialect, out);
        }
    }

    /// Root table followed by every join, depth first.
    pub fn from_clause(&self, dialect: &dyn SqlDialect) -> String {
        let mut sql = format!("{} {}", dialect.table_ref(&self.table), self.alias);
        self.collect_joins(dialect, &mut sql);
        sql
    }

    fn collect_joins(&self, dialect: &dyn SqlDialect, sql: &mut String) {
        for join in &self.joins {
            sql.push_str(&format!(
                " LEFT JOIN {} {} ON {}",
                dialect.table_ref(&join.plan.table),
                join.plan.alias,
                join.on
            ));
            join.plan.collect_joins(dialect, sql);
        }
    }

    /// Root ordering first, then each join's ordering.
    pub fn order_terms(&self, dialect: &dyn SqlDialect) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_order(dialect, &mut out);
        out
    }

    fn collect_order(&self, dialect: &dyn SqlDialect, out: &mut Vec<String>) {
        for (column, direction) in &self.order_by {
            out.push(format!(
                "{}.{} {}",
                self.alias,
                dialect.quote(column),
                direction.as_sql()
            ));
        }
        for join in &self.joins {
            join.plan.collect_order(dialect, out);
        }
    }

    /// The whole statement.
    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.select_list(dialect).join(", "),
            self.from_clause(dialect)
        );
        if !self.where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_sql);
        }
        let order = self.order_terms(dialect);
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        sql
    }

    /// Fold result rows (keyed by column label) into nested objects.
    pub fn hydrate(&self, rows: &[Map<String, Value>]) -> Vec<Value> {
        let rows: Vec<&Map<String, Value>> = rows.iter().collect();
        self.hydrate_rows(&rows)
    }

    fn identity_of(&self, row: &Map<String, Value>) -> Option<String> {
        let values: Vec<&Value> = match &self.primary {
            Some(_) => vec![row.get(&self.pk_label()).unwrap_or(&Value::Null)],
            None => match row.get(&self.rid_label()) {
                Some(rid) if !rid.is_null() => vec![rid],
                _ => self
                    .identity
                    .iter()
                    .map(|(_, label)| label)
                    .chain(self.columns.iter().map(|c| &c.label))
                    .map(|label| row.get(label).unwrap_or(&Value::Null))
                    .collect(),
            },
        };
        // A LEFT JOIN without a match yields nulls only.
        if values.iter().all(|v| v.is_null()) {
            return None;
        }
        serde_json::to_string(&values).ok()
    }

    fn hydrate_rows(&self, rows: &[&Map<String, Value>]) -> Vec<Value> {
        let mut groups: IndexMap<String, Vec<&Map<String, Value>>> = IndexMap::new();
        for row in rows {
            if let Some(key) = self.identity_of(row) {
                groups.entry(key).or_default().push(*row);
            }
        }

        groups
            .into_values()
            .map(|group| {
                let first = group[0];
                let mut object = Map::new();
                if self.primary.is_some() {
                    let pk = first.get(&self.pk_label()).cloned().unwrap_or(Value::Null);
                    object.insert(PK_KEY.to_string(), pk);
                }
                for column in &self.columns {
                    let value = first.get(&column.label).cloned().unwrap_or(Value::Null);
                    object.insert(column.key.clone(), value);
                }
                for join in &self.joins {
                    let mut children = join.plan.hydrate_rows(&group);
                    let value = match join.cardinality {
                        Cardinality::Many => Value::Array(children),
                        Cardinality::One if children.is_empty() => Value::Null,
                        Cardinality::One => children.swap_remove(0),
                    };
                    object.insert(join.key.clone(), value);
                }
                Value::Object(object)
            })
            .collect()
    }
}
