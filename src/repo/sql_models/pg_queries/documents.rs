use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Postgres, Row};

use crate::{
    query,
    repo::{self, sql_models},
};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

fn bind_values(mut q: PgQuery<'_>, values: Vec<query::SqlValue>) -> PgQuery<'_> {
    for v in values {
        match v {
            query::SqlValue::Text(v) => q = q.bind(v),
            query::SqlValue::TextArray(v) => q = q.bind(v),
        }
    }
    q
}

/// Compiles `filter` into a predicate whose placeholders start at `$2`,
/// `$1` being reserved to the collection name.
fn compile_filter(filter: &query::Filter) -> Result<(query::CompilerResult, usize), repo::Error> {
    let mut compiler = query::JsonbClauseCompiler::new("body", 2);
    let compiled = query::ClausesCompiler::new()
        .filter(filter.clone(), &mut compiler)
        .compile()?;
    Ok((compiled, compiler.next_placeholder()))
}

/// Inserts documents preserving the order of `records`.
pub async fn documents_create(
    exec: &mut impl repo::AsExec,
    records: &[sql_models::DocumentRecord],
) -> Result<u64, repo::Error> {
    if records.is_empty() {
        return Ok(0);
    }

    let uuids: Vec<uuid::Uuid> = records.iter().map(|r| r.document_uuid).collect();
    let collections: Vec<String> = records.iter().map(|r| r.collection_name.clone()).collect();
    let bodies = records
        .iter()
        .map(|r| serde_json::to_string(r.body()))
        .collect::<Result<Vec<String>, _>>()?;

    let res = sqlx::query(
        r#"INSERT INTO document_t (document_uuid, collection_name, body)
        SELECT u, c, b::jsonb
        FROM UNNEST($1::uuid[], $2::text[], $3::text[]) WITH ORDINALITY AS t(u, c, b, n)
        ORDER BY n"#,
    )
    .bind(uuids)
    .bind(collections)
    .bind(bodies)
    .execute(exec.as_exec())
    .await?;

    Ok(res.rows_affected())
}

/// Returns the documents of `collection` matching `find`, in insertion order.
pub async fn documents_find(
    exec: &mut impl repo::AsExec,
    collection: &str,
    find: &repo::FindQuery,
) -> Result<Vec<sql_models::DocumentRecord>, repo::Error> {
    let (compiled, next_placeholder) = compile_filter(&find.filter)?;

    let body = match find.projection {
        Some(_) => format!(
            "COALESCE((SELECT jsonb_object_agg(key, value) FROM jsonb_each(body) WHERE key = ANY(${next_placeholder}::text[])), '{{}}'::jsonb) AS body"
        ),
        None => "body".to_owned(),
    };
    let limit = find
        .limit
        .map(|l| format!(" LIMIT {l}"))
        .unwrap_or_default();

    let sql = format!(
        "SELECT document_uuid, collection_name, {body} FROM document_t WHERE collection_name = $1 AND {} ORDER BY document_id{limit}",
        compiled.predicate(),
    );
    log::trace!("find query: {}", sql);

    let mut q = bind_values(sqlx::query(&sql).bind(collection), compiled.values);
    if let Some(projection) = &find.projection {
        q = q.bind(projection.clone());
    }

    let rows = q.fetch_all(exec.as_exec()).await?;
    rows.into_iter()
        .map(sql_models::DocumentRecord::from_row)
        .collect()
}

pub async fn documents_count(
    exec: &mut impl repo::AsExec,
    collection: &str,
    filter: &query::Filter,
) -> Result<i64, repo::Error> {
    let (compiled, _) = compile_filter(filter)?;

    let sql = format!(
        "SELECT COUNT(*) AS n FROM document_t WHERE collection_name = $1 AND {}",
        compiled.predicate()
    );

    let row: PgRow = bind_values(sqlx::query(&sql).bind(collection), compiled.values)
        .fetch_one(exec.as_exec())
        .await?;

    Ok(row.try_get("n")?)
}

pub async fn document_find_by_uuid(
    exec: &mut impl repo::AsExec,
    collection: &str,
    uuid: &uuid::Uuid,
) -> Result<Option<sql_models::DocumentRecord>, repo::Error> {
    let row = sqlx::query(
        r#"SELECT document_uuid, collection_name, body
        FROM document_t
        WHERE collection_name = $1 AND document_uuid = $2"#,
    )
    .bind(collection)
    .bind(uuid)
    .fetch_optional(exec.as_exec())
    .await?;

    row.map(sql_models::DocumentRecord::from_row).transpose()
}

pub async fn document_update_body(
    exec: &mut impl repo::AsExec,
    collection: &str,
    uuid: &uuid::Uuid,
    body: &serde_json::Value,
) -> Result<u64, repo::Error> {
    let res = sqlx::query(
        r#"UPDATE document_t SET body = $3
        WHERE collection_name = $1 AND document_uuid = $2"#,
    )
    .bind(collection)
    .bind(uuid)
    .bind(body)
    .execute(exec.as_exec())
    .await?;

    Ok(res.rows_affected())
}

pub async fn document_delete(
    exec: &mut impl repo::AsExec,
    collection: &str,
    uuid: &uuid::Uuid,
) -> Result<u64, repo::Error> {
    let res = sqlx::query("DELETE FROM document_t WHERE collection_name = $1 AND document_uuid = $2")
        .bind(collection)
        .bind(uuid)
        .execute(exec.as_exec())
        .await?;

    Ok(res.rows_affected())
}

pub async fn collection_delete(
    exec: &mut impl repo::AsExec,
    collection: &str,
) -> Result<u64, repo::Error> {
    let res = sqlx::query("DELETE FROM document_t WHERE collection_name = $1")
        .bind(collection)
        .execute(exec.as_exec())
        .await?;

    Ok(res.rows_affected())
}

/// Number of documents holding a non null value at `field` that is not
/// shaped like a GeoJSON object.
pub async fn documents_count_invalid_geojson(
    exec: &mut impl repo::AsExec,
    collection: &str,
    field: &str,
) -> Result<i64, repo::Error> {
    let row = sqlx::query(
        r#"SELECT COUNT(*) AS n
        FROM document_t
        WHERE collection_name = $1
          AND body -> $2 IS NOT NULL
          AND jsonb_typeof(body -> $2) <> 'null'
          AND NOT (
            jsonb_typeof(body -> $2) = 'object'
            AND jsonb_typeof(body -> $2 -> 'type') = 'string'
            AND (body -> $2) ? 'coordinates'
          )"#,
    )
    .bind(collection)
    .bind(field)
    .fetch_one(exec.as_exec())
    .await?;

    Ok(row.try_get("n")?)
}
