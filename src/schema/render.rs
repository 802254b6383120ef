use super::{Schema, SchemaType};
use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::store::{ListQuery, Row, Session};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;

type RenderFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, AppError>> + Send + 'a>>;

fn visible(entity: &ResolvedEntity) -> ListQuery {
    entity
        .visible_filters()
        .into_iter()
        .fold(ListQuery::new(), |q, (col, val)| q.filter(col, val))
}

/// Shape a stored row with `schema`. Nested and list fields load the related rows through
/// `session`, skipping soft-deleted ones.
pub fn render<'a>(session: &'a mut dyn Session, schema: &'a Schema, row: &'a Row) -> RenderFuture<'a> {
    Box::pin(async move {
        let mut out = Map::new();
        for field in &schema.fields {
            let value = match &field.ty {
                SchemaType::Scalar(_) => row.get(&field.name).cloned().unwrap_or(Value::Null),
                SchemaType::Nested(nested) => {
                    let key = row.get(&field.name).cloned().unwrap_or(Value::Null);
                    if key.is_null() {
                        Value::Null
                    } else {
                        match session.fetch_one(&nested.entity, &key, &visible(&nested.entity)).await? {
                            Some(related) => render(&mut *session, nested, &related).await?,
                            None => Value::Null,
                        }
                    }
                }
                SchemaType::List(item) => {
                    let Some(via) = field.relation.as_ref().and_then(|r| r.via.clone()) else {
                        continue;
                    };
                    let key = row.get(&schema.entity.pk_column).cloned().unwrap_or(Value::Null);
                    let query = visible(&item.entity)
                        .filter(via, key)
                        .order_by(item.entity.pk_column.clone(), false);
                    let related = session.fetch_many(&item.entity, &query, None).await?;
                    let mut rendered = Vec::with_capacity(related.len());
                    for r in &related {
                        rendered.push(render(&mut *session, item, r).await?);
                    }
                    Value::Array(rendered)
                }
            };
            out.insert(field.name.clone(), value);
        }
        Ok(Value::Object(out))
    })
}
