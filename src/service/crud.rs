//! Generic data accessor over one entity, run through a storage session.

use crate::config::{DeletePolicy, ResolvedEntity, CREATED_AT, DELETED, DELETED_AT, UPDATED_AT};
use crate::error::AppError;
use crate::store::{now_timestamp, ListQuery, Row, Session, Window};
use serde_json::Value;
use std::sync::Arc;

/// Field exclusion and extra-field injection for create and update.
#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    /// Names dropped from both the data and the extras.
    pub exclude: Vec<String>,
    /// Values merged over the data, e.g. an owner taken from the caller.
    pub extra: Row,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

#[derive(Clone, Debug)]
pub struct CrudService {
    entity: Arc<ResolvedEntity>,
}

impl CrudService {
    pub fn new(entity: Arc<ResolvedEntity>) -> Self {
        CrudService { entity }
    }

    pub fn entity(&self) -> &Arc<ResolvedEntity> {
        &self.entity
    }

    /// Visible rows: `deleted = false` for soft-delete entities, everything otherwise.
    pub fn query(&self) -> ListQuery {
        self.query_with(Vec::<(String, Value)>::new())
    }

    /// [`query`](Self::query) plus extra filters. An extra filter on `deleted` replaces the default one.
    pub fn query_with<I>(&self, extra: I) -> ListQuery
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.entity
            .visible_filters()
            .into_iter()
            .chain(extra)
            .fold(ListQuery::new(), |q, (col, val)| q.filter(col, val))
    }

    /// Default listing order: newest first when rows carry `created_at`.
    pub fn list_query(&self) -> ListQuery {
        self.order_for_listing(self.query())
    }

    pub fn order_for_listing(&self, query: ListQuery) -> ListQuery {
        if self.entity.has_column(CREATED_AT) {
            query.order_by(CREATED_AT, true)
        } else {
            query.order_by(self.entity.pk_column.clone(), false)
        }
    }

    pub async fn get(&self, session: &mut dyn Session, id: &Value) -> Result<Row, AppError> {
        session
            .fetch_one(&self.entity, id, &self.query())
            .await?
            .ok_or_else(|| AppError::not_found(format!("{} {}", self.entity.name, id)))
    }

    pub async fn list(&self, session: &mut dyn Session, query: &ListQuery) -> Result<Vec<Row>, AppError> {
        session.fetch_many(&self.entity, query, None).await
    }

    pub async fn count(&self, session: &mut dyn Session, query: &ListQuery) -> Result<u64, AppError> {
        session.count(&self.entity, query).await
    }

    /// Rows `[offset, offset + limit)` of `query`.
    pub async fn slice(&self, session: &mut dyn Session, query: &ListQuery, window: Window) -> Result<Vec<Row>, AppError> {
        session.fetch_many(&self.entity, query, Some(window)).await
    }

    pub async fn create(&self, session: &mut dyn Session, data: Row, opts: &WriteOptions) -> Result<Row, AppError> {
        let values = self.merge(data, opts)?;
        let row = session.insert(&self.entity, &values).await?;
        tracing::debug!(entity = %self.entity.name, id = %row.get(&self.entity.pk_column).unwrap_or(&serde_json::Value::Null), "created");
        Ok(row)
    }

    pub async fn update_by_id(
        &self,
        session: &mut dyn Session,
        id: &Value,
        data: Row,
        opts: &WriteOptions,
    ) -> Result<Row, AppError> {
        let current = self.get(session, id).await?;
        self.update_entity(session, &current, data, opts).await
    }

    /// Overwrite the supplied fields of an already loaded row and stamp `updated_at`.
    pub async fn update_entity(
        &self,
        session: &mut dyn Session,
        row: &Row,
        data: Row,
        opts: &WriteOptions,
    ) -> Result<Row, AppError> {
        let id = self.key_of(row)?;
        let mut values = self.merge(data, opts)?;
        if self.entity.has_column(UPDATED_AT) {
            values.insert(UPDATED_AT.to_string(), now_timestamp());
        }
        session
            .update(&self.entity, &id, &values)
            .await?
            .ok_or_else(|| AppError::not_found(format!("{} {}", self.entity.name, id)))
    }

    pub async fn remove_by_id(&self, session: &mut dyn Session, id: &Value) -> Result<Row, AppError> {
        let current = self.get(session, id).await?;
        self.remove_entity(session, &current).await
    }

    /// Soft entities are flagged `deleted` and stamped; hard entities lose the row.
    pub async fn remove_entity(&self, session: &mut dyn Session, row: &Row) -> Result<Row, AppError> {
        let id = self.key_of(row)?;
        let removed = match self.entity.delete_policy {
            DeletePolicy::Soft => {
                let now = now_timestamp();
                let mut values = Row::new();
                values.insert(DELETED.to_string(), Value::Bool(true));
                values.insert(DELETED_AT.to_string(), now.clone());
                values.insert(UPDATED_AT.to_string(), now);
                session.update(&self.entity, &id, &values).await?
            }
            DeletePolicy::Hard => session.delete(&self.entity, &id).await?,
        };
        let removed = removed.ok_or_else(|| AppError::not_found(format!("{} {}", self.entity.name, id)))?;
        tracing::debug!(entity = %self.entity.name, %id, policy = ?self.entity.delete_policy, "removed");
        Ok(removed)
    }

    /// Apply `data` to every row matching `query`. Returns the number of rows changed.
    /// On soft-delete entities the matched rows are also restored unless `data` says otherwise.
    pub async fn update_where(&self, session: &mut dyn Session, query: &ListQuery, mut data: Row) -> Result<u64, AppError> {
        if self.entity.delete_policy == DeletePolicy::Soft {
            data.entry(DELETED).or_insert(Value::Bool(false));
            data.entry(DELETED_AT).or_insert(Value::Null);
        }
        let rows = self.list(session, query).await?;
        let opts = WriteOptions::default();
        let mut n = 0;
        for row in &rows {
            self.update_entity(session, row, data.clone(), &opts).await?;
            n += 1;
        }
        Ok(n)
    }

    /// Remove every row matching `query`. Returns the number of rows removed.
    pub async fn remove_where(&self, session: &mut dyn Session, query: &ListQuery) -> Result<u64, AppError> {
        let rows = self.list(session, query).await?;
        let mut n = 0;
        for row in &rows {
            self.remove_entity(session, row).await?;
            n += 1;
        }
        Ok(n)
    }

    fn key_of(&self, row: &Row) -> Result<Value, AppError> {
        match row.get(&self.entity.pk_column) {
            Some(v) if !v.is_null() => Ok(v.clone()),
            _ => Err(AppError::Validation(format!("{} row has no {}", self.entity.name, self.entity.pk_column))),
        }
    }

    /// `data` with `extra` merged over it, excluded names dropped. Only stored fields are accepted.
    fn merge(&self, data: Row, opts: &WriteOptions) -> Result<Row, AppError> {
        let mut values = data;
        for (k, v) in &opts.extra {
            values.insert(k.clone(), v.clone());
        }
        for name in &opts.exclude {
            values.remove(name);
        }
        if let Some(unknown) = values.keys().find(|k| !self.entity.has_column(k)) {
            return Err(AppError::Validation(format!("{} has no field '{}'", self.entity.name, unknown)));
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use crate::store::{MemoryStore, Store};
    use serde_json::json;

    fn service(soft: bool) -> CrudService {
        let config = FullConfig {
            entities: serde_json::from_str(&format!(
                r#"[{{"name": "Todo", "table": "todo", "path": "todo", "soft_delete": {}, "fields": [
                    {{"name": "id", "type": "bigint", "primary_key": true}},
                    {{"name": "name", "type": "text", "nullable": false}},
                    {{"name": "owner", "type": "text"}}
                ]}}]"#,
                soft
            ))
            .unwrap(),
            default_schema: None,
        };
        CrudService::new(resolve(&config).unwrap().entity("Todo").unwrap().clone())
    }

    fn named(name: &str) -> Row {
        let mut r = Row::new();
        r.insert("name".into(), json!(name));
        r
    }

    #[tokio::test]
    async fn create_merges_extra_and_drops_excluded() {
        let svc = service(true);
        let store = MemoryStore::new();
        let mut s = store.begin().await.unwrap();

        let mut data = named("write docs");
        data.insert("owner".into(), json!("mallory"));
        let opts = WriteOptions::new().extra("owner", json!("alice")).exclude(["id"]);
        let row = svc.create(&mut *s, data, &opts).await.unwrap();
        assert_eq!(row["name"], json!("write docs"));
        assert_eq!(row["owner"], json!("alice"));

        let mut forced = named("x");
        forced.insert("id".into(), json!(99));
        let row = svc.create(&mut *s, forced, &opts).await.unwrap();
        assert_ne!(row["id"], json!(99));

        let fetched = svc.get(&mut *s, &row["id"]).await.unwrap();
        assert_eq!(fetched["id"], row["id"]);

        let mut bad = named("y");
        bad.insert("colour".into(), json!("red"));
        assert!(matches!(svc.create(&mut *s, bad, &opts).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn excluded_name_wins_over_data_and_extra() {
        let svc = service(true);
        let store = MemoryStore::new();
        let mut s = store.begin().await.unwrap();

        let mut data = named("a");
        data.insert("owner".into(), json!("mallory"));
        let opts = WriteOptions::new().extra("owner", json!("alice")).exclude(["owner"]);
        let row = svc.create(&mut *s, data, &opts).await.unwrap();
        assert_eq!(row["owner"], Value::Null);

        let mut change = named("b");
        change.insert("owner".into(), json!("mallory"));
        let updated = svc.update_by_id(&mut *s, &row["id"], change.clone(), &opts).await.unwrap();
        assert_eq!(updated["name"], json!("b"));
        assert_eq!(updated["owner"], Value::Null);

        let stamp = WriteOptions::new().extra("owner", json!("alice")).exclude(["name"]);
        let updated = svc.update_by_id(&mut *s, &row["id"], change, &stamp).await.unwrap();
        assert_eq!(updated["name"], json!("b"));
        assert_eq!(updated["owner"], json!("alice"));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let svc = service(true);
        let store = MemoryStore::new();
        let mut s = store.begin().await.unwrap();
        assert!(matches!(svc.get(&mut *s, &json!(42)).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn soft_remove_hides_but_keeps_row() {
        let svc = service(true);
        let store = MemoryStore::new();
        let mut s = store.begin().await.unwrap();
        let row = svc.create(&mut *s, named("a"), &WriteOptions::new()).await.unwrap();
        let id = row["id"].clone();

        let removed = svc.remove_by_id(&mut *s, &id).await.unwrap();
        assert_eq!(removed["deleted"], json!(true));
        assert!(removed["deleted_at"].is_string());
        assert_eq!(removed["deleted_at"], removed["updated_at"]);

        assert!(matches!(svc.get(&mut *s, &id).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.remove_by_id(&mut *s, &id).await, Err(AppError::NotFound(_))));
        assert!(svc.list(&mut *s, &svc.query()).await.unwrap().is_empty());

        let all = svc.list(&mut *s, &svc.query_with([("deleted".to_string(), json!(true))])).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["deleted"], json!(true));
    }

    #[tokio::test]
    async fn hard_remove_deletes_row() {
        let svc = service(false);
        let store = MemoryStore::new();
        let mut s = store.begin().await.unwrap();
        let row = svc.create(&mut *s, named("a"), &WriteOptions::new()).await.unwrap();
        svc.remove_by_id(&mut *s, &row["id"]).await.unwrap();
        assert_eq!(svc.count(&mut *s, &ListQuery::new()).await.unwrap(), 0);
        assert!(matches!(svc.remove_by_id(&mut *s, &row["id"]).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_stamps_and_skips_hidden_rows() {
        let svc = service(true);
        let store = MemoryStore::new();
        let mut s = store.begin().await.unwrap();
        let row = svc.create(&mut *s, named("a"), &WriteOptions::new()).await.unwrap();
        let id = row["id"].clone();

        let updated = svc.update_by_id(&mut *s, &id, named("b"), &WriteOptions::new()).await.unwrap();
        assert_eq!(updated["name"], json!("b"));
        assert_eq!(updated["created_at"], row["created_at"]);
        assert!(updated["updated_at"].as_str() >= row["updated_at"].as_str());

        svc.remove_by_id(&mut *s, &id).await.unwrap();
        let err = svc.update_by_id(&mut *s, &id, named("c"), &WriteOptions::new()).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn bulk_operations_count_rows() {
        let svc = service(true);
        let store = MemoryStore::new();
        let mut s = store.begin().await.unwrap();
        for (name, owner) in [("a", "ann"), ("b", "ann"), ("c", "bob")] {
            let mut r = named(name);
            r.insert("owner".into(), json!(owner));
            svc.create(&mut *s, r, &WriteOptions::new()).await.unwrap();
        }
        let anns = svc.query_with([("owner".to_string(), json!("ann"))]);
        let mut done = Row::new();
        done.insert("name".into(), json!("done"));
        assert_eq!(svc.update_where(&mut *s, &anns, done).await.unwrap(), 2);
        assert_eq!(svc.remove_where(&mut *s, &anns).await.unwrap(), 2);
        assert_eq!(svc.count(&mut *s, &svc.query()).await.unwrap(), 1);

        let removed = svc.query_with([("deleted".to_string(), json!(true))]);
        assert_eq!(svc.update_where(&mut *s, &removed, Row::new()).await.unwrap(), 2);
        assert_eq!(svc.count(&mut *s, &svc.query()).await.unwrap(), 3);
    }

    #[test]
    fn listing_orders_newest_first() {
        let q = service(true).list_query();
        let order = q.order.unwrap();
        assert_eq!(order.column, "created_at");
        assert!(order.descending);
        assert_eq!(q.filters, vec![("deleted".to_string(), json!(false))]);
    }
}
