use relgraph_core::{
    AnnotationRow, AnnotationsConfig, Field, FieldType, RefId, SchemaConfig, Table,
    merge_annotations, nest_annotations,
};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use crate::quote_ident;

/// One column of the introspected schema, with its key constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRow {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary: bool,
    pub foreign_table: Option<String>,
    pub foreign_column: Option<String>,
}

/// Read every base table of `config.db_schema` allowed by the include and
/// exclude lists.
pub async fn read_tables(pool: &PgPool, config: &SchemaConfig) -> anyhow::Result<Vec<Table>> {
    let recs = sqlx::query(
        r#"
        select
          c.table_name::text as table_name,
          c.column_name::text as column_name,
          c.data_type::text as data_type,
          c.is_nullable = 'YES' as nullable,
          pk.column_name is not null as is_primary,
          fk.foreign_table_name,
          fk.foreign_column_name
        from information_schema.columns c
        join information_schema.tables t
          on t.table_schema = c.table_schema
         and t.table_name = c.table_name
         and t.table_type = 'BASE TABLE'
        left join (
          select kcu.table_name, kcu.column_name
          from information_schema.table_constraints tc
          join information_schema.key_column_usage kcu
            on tc.constraint_name = kcu.constraint_name
           and tc.table_schema = kcu.table_schema
          where tc.constraint_type = 'PRIMARY KEY'
            and tc.table_schema = $1
        ) pk
          on pk.table_name = c.table_name
         and pk.column_name = c.column_name
        left join (
          select distinct on (kcu.table_name, kcu.column_name)
            kcu.table_name,
            kcu.column_name,
            ccu.table_name::text as foreign_table_name,
            ccu.column_name::text as foreign_column_name
          from information_schema.table_constraints tc
          join information_schema.key_column_usage kcu
            on tc.constraint_name = kcu.constraint_name
           and tc.table_schema = kcu.table_schema
          join information_schema.constraint_column_usage ccu
            on ccu.constraint_name = tc.constraint_name
           and ccu.table_schema = tc.table_schema
          where tc.constraint_type = 'FOREIGN KEY'
            and tc.table_schema = $1
          order by kcu.table_name, kcu.column_name, tc.constraint_name
        ) fk
          on fk.table_name = c.table_name
         and fk.column_name = c.column_name
        where c.table_schema = $1
        order by c.table_name, c.ordinal_position
        "#,
    )
    .bind(&config.db_schema)
    .fetch_all(pool)
    .await?;

    let mut columns = Vec::with_capacity(recs.len());
    for r in recs {
        columns.push(ColumnRow {
            table_name: r.try_get("table_name")?,
            column_name: r.try_get("column_name")?,
            data_type: r.try_get("data_type")?,
            nullable: r.try_get("nullable")?,
            primary: r.try_get("is_primary")?,
            foreign_table: r.try_get("foreign_table_name")?,
            foreign_column: r.try_get("foreign_column_name")?,
        });
    }

    let tables: Vec<Table> = tables_from_columns(columns)
        .into_iter()
        .filter(|t| config.allows(&t.name))
        .collect();
    debug!(schema = %config.db_schema, tables = tables.len(), "introspected tables");
    Ok(tables)
}

/// Group column rows into tables, keeping row order.
///
/// Only single-column primary keys become primary fields; rows of tables
/// with composite keys are identified by all of their columns instead.
pub fn tables_from_columns(columns: Vec<ColumnRow>) -> Vec<Table> {
    let mut tables: Vec<Table> = Vec::new();
    for column in columns {
        if tables.last().is_none_or(|t| t.name != column.table_name) {
            tables.push(Table::new(column.table_name.clone()));
        }
        let Some(table) = tables.last_mut() else {
            continue;
        };

        let mut field = Field::new(&table.name, column.column_name, map_pg_type(&column.data_type));
        field.primary = column.primary;
        field.non_null = !column.nullable || column.primary;
        field.table_name_ref = column.foreign_table;
        field.field_name_ref = column.foreign_column;
        table.fields.push(field);
    }

    for table in &mut tables {
        if table.fields.iter().filter(|f| f.primary).count() > 1 {
            for field in &mut table.fields {
                field.primary = false;
            }
        }
    }
    tables
}

pub fn map_pg_type(data_type: &str) -> FieldType {
    match data_type {
        "smallint" | "integer" | "bigint" => FieldType::Int,
        "numeric" | "decimal" | "real" | "double precision" | "money" => FieldType::Float,
        "date"
        | "timestamp without time zone"
        | "timestamp with time zone"
        | "time without time zone"
        | "time with time zone" => FieldType::Date,
        "boolean" => FieldType::Boolean,
        "bytea" => FieldType::Blob,
        _ => FieldType::String,
    }
}

/// SQL reading the flat annotation rows from the `<prefix>*` tables.
pub fn annotation_sql(config: &AnnotationsConfig) -> String {
    let t = |name: &str| {
        format!(
            "{}.{}",
            quote_ident(&config.schema),
            quote_ident(&format!("{}{}", config.table_prefix, name))
        )
    };
    format!(
        r#"
        select
          trim(tables.relation_name)::text as table_name,
          (trim(tables.relation_name) || '_' || trim(fields.field_name))::text as field_id,
          trim(replace(entities.name, ',', ''))::text as table_index,
          trim(replace(attr.name, ',', ''))::text as field_index,
          ref_type.id::bigint as ref_id,
          ref_type.description::text as ref_name,
          trim(replace(ref_type_detail.name, ',', ''))::text as ref_index
        from {tables} tables
          left join {entities} entities
            on entities.table_key = tables.id
           and trim(replace(entities.name, ',', '')) > ''
          left join {fields} fields
            on fields.table_key = tables.id
          left join {attrs} attr
            on attr.field_key = fields.id
           and trim(replace(attr.name, ',', '')) > ''
          left join {field_refs} field_ref
            on field_ref.field_key = fields.id
          left join {ref_types} ref_type
            on ref_type.id = field_ref.ref_type_key
          left join {ref_details} ref_type_detail
            on ref_type_detail.ref_type_key = ref_type.id
           and trim(replace(ref_type_detail.name, ',', '')) > ''
        "#,
        tables = t("table"),
        entities = t("tentities"),
        fields = t("field"),
        attrs = t("tentities_attr"),
        field_refs = t("field_ref"),
        ref_types = t("ref_type"),
        ref_details = t("ref_type_detail"),
    )
}

pub async fn read_annotations(
    pool: &PgPool,
    config: &AnnotationsConfig,
) -> anyhow::Result<Vec<AnnotationRow>> {
    let sql = annotation_sql(config);
    let recs = sqlx::query(&sql).fetch_all(pool).await?;

    let mut rows = Vec::with_capacity(recs.len());
    for r in recs {
        rows.push(AnnotationRow {
            table_name: r.try_get("table_name")?,
            field_id: r.try_get("field_id")?,
            table_index: r.try_get("table_index")?,
            field_index: r.try_get("field_index")?,
            ref_id: r.try_get::<Option<i64>, _>("ref_id")?.map(RefId::Number),
            ref_name: r.try_get("ref_name")?,
            ref_index: r.try_get("ref_index")?,
        });
    }
    debug!(rows = rows.len(), "read annotation rows");
    Ok(rows)
}

/// Merge annotation rows into the physical tables. A failed annotation read
/// leaves the tables as they are.
pub fn enrich_tables(
    mut tables: Vec<Table>,
    annotations: anyhow::Result<Vec<AnnotationRow>>,
    config: &AnnotationsConfig,
) -> Vec<Table> {
    match annotations {
        Ok(rows) => merge_annotations(&mut tables, nest_annotations(rows)),
        Err(e) => warn!(
            error = %e,
            schema = %config.schema,
            "failed to read annotations, continuing with bare metadata"
        ),
    }
    tables
}
