use crate::repo::{self, sql_models};

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Statements creating the physical indexes of `record`.
///
/// Ordered keys become a single partial btree index over the collection;
/// each geospatial key gets its own GIN index since the two access methods
/// cannot be combined.
pub fn index_ddl(record: &sql_models::CollectionIndexRecord) -> Result<Vec<String>, repo::Error> {
    let spec = record.spec()?;
    let scope = format!("WHERE collection_name = {}", sql_literal(&record.collection_name));

    let mut statements = Vec::new();

    let ordered: Vec<String> = spec
        .keys
        .iter()
        .filter_map(|k| match k.order {
            repo::IndexOrder::Ascending => Some(format!("(body -> {}) ASC", sql_literal(&k.field))),
            repo::IndexOrder::Descending => Some(format!("(body -> {}) DESC", sql_literal(&k.field))),
            repo::IndexOrder::Geo => None,
        })
        .collect();

    if !ordered.is_empty() {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON document_t ({}) {}",
            record.index_name,
            ordered.join(", "),
            scope
        ));
    }

    for (i, field) in spec.geo_fields().enumerate() {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {}_geo{} ON document_t USING GIN ((body -> {})) {}",
            record.index_name,
            i,
            sql_literal(field),
            scope
        ));
    }

    Ok(statements)
}

/// Names of the physical indexes created by [`index_ddl`]
pub fn physical_index_names(record: &sql_models::CollectionIndexRecord) -> Result<Vec<String>, repo::Error> {
    let spec = record.spec()?;
    let mut names = Vec::new();

    if spec.keys.iter().any(|k| k.order != repo::IndexOrder::Geo) {
        names.push(record.index_name.clone());
    }
    for (i, _) in spec.geo_fields().enumerate() {
        names.push(format!("{}_geo{}", record.index_name, i));
    }

    Ok(names)
}

pub async fn collection_indexes(
    exec: &mut impl repo::AsExec,
    collection: &str,
) -> Result<Vec<sql_models::CollectionIndexRecord>, repo::Error> {
    let rows = sqlx::query(
        r#"SELECT index_name, collection_name, index_spec
        FROM collection_index_t
        WHERE collection_name = $1"#,
    )
    .bind(collection)
    .fetch_all(exec.as_exec())
    .await?;

    rows.into_iter()
        .map(sql_models::CollectionIndexRecord::from_row)
        .collect()
}

/// Registers the index and creates its physical counterparts
pub async fn collection_index_create(
    exec: &mut impl repo::AsExec,
    record: &sql_models::CollectionIndexRecord,
) -> Result<(), repo::Error> {
    sqlx::query(
        r#"INSERT INTO collection_index_t (index_name, collection_name, index_spec)
        VALUES ($1, $2, $3)"#,
    )
    .bind(&record.index_name)
    .bind(&record.collection_name)
    .bind(&record.index_spec)
    .execute(exec.as_exec())
    .await?;

    for ddl in index_ddl(record)? {
        log::trace!("index ddl: {}", ddl);
        sqlx::query(&ddl).execute(exec.as_exec()).await?;
    }

    Ok(())
}

/// Drops every index registered over `collection`
pub async fn collection_indexes_delete(
    exec: &mut impl repo::AsExec,
    collection: &str,
) -> Result<usize, repo::Error> {
    let records = collection_indexes(exec, collection).await?;

    for record in &records {
        for name in physical_index_names(record)? {
            sqlx::query(&format!("DROP INDEX IF EXISTS {name}"))
                .execute(exec.as_exec())
                .await?;
        }
    }

    sqlx::query("DELETE FROM collection_index_t WHERE collection_name = $1")
        .bind(collection)
        .execute(exec.as_exec())
        .await?;

    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_splits_ordered_and_geo_keys() {
        let spec = repo::IndexSpec::new(vec![
            repo::IndexKey::new("a", repo::IndexOrder::Ascending),
            repo::IndexKey::new("loc", repo::IndexOrder::Geo),
            repo::IndexKey::new("b", repo::IndexOrder::Descending),
        ]);
        let record = sql_models::CollectionIndexRecord::try_new("s.p.o'x.datastore", &spec).unwrap();

        let ddl = index_ddl(&record).unwrap();
        assert_eq!(ddl.len(), 2);
        assert!(ddl[0].contains("((body -> 'a') ASC, (body -> 'b') DESC)"));
        assert!(ddl[0].ends_with("WHERE collection_name = 's.p.o''x.datastore'"));
        assert!(ddl[1].contains("USING GIN ((body -> 'loc'))"));

        let names = physical_index_names(&record).unwrap();
        assert_eq!(names.len(), 2);
        assert!(names[1].ends_with("_geo0"));
    }
}
