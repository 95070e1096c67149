use bson::doc;
use chrono::Utc;

use super::{PromoCode, PromoType, PromoUpdateData, RedeemError, PROMO_COLLECTION_NAME};
use crate::resp::problem::{problems, Problem};
use crate::store::{Direction, Query, Store, StoreError};
use crate::util;

pub mod problem {
    use crate::resp::problem::{problems, Problem};

    #[inline]
    pub fn not_found(id: impl ToString) -> Problem {
        problems::not_found("Promo code not found")
            .insert_str("id", id)
            .clone()
    }

    #[inline]
    pub fn duplicate(code: impl ToString) -> Problem {
        problems::conflict("A promo code with this code already exists")
            .insert_str("code", code)
            .clone()
    }
}

#[derive(Debug, Clone, Default, FromForm, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PromoFilter {
    #[field(name = "type")]
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// `1`/`0` or `true`/`false`.
    pub is_active: Option<String>,
}

impl PromoFilter {
    pub fn store_query(&self) -> Result<Query, Problem> {
        let mut query = Query::new();

        if let Some(kind) = self.kind.as_deref().filter(|it| !it.is_empty()) {
            let kind: PromoType = kind
                .parse()
                .map_err(|_| problems::bad_request("Invalid promo code type"))?;
            query = query.eq("type", kind.as_str());
        }

        match self.is_active.as_deref() {
            None | Some("") => {}
            Some("1") | Some("true") => query = query.eq("is_active", "1"),
            Some("0") | Some("false") => query = query.eq("is_active", "0"),
            Some(_) => return Err(problems::bad_request("is_active must be 0 or 1")),
        }

        Ok(query
            .order_by("created_at", Direction::Descending)
            .limit(super::PROMO_LIST_LIMIT))
    }
}

// TODO: PromoDbExt fns shouldn't be erroring with Problem
pub trait PromoDbExt {
    async fn list_promos(&self, filter: &PromoFilter) -> Result<Vec<PromoCode>, Problem>;

    async fn get_promo(&self, id: &str) -> Result<Option<PromoCode>, StoreError>;

    /// Stores the code unless another code has the same `code` (409).
    async fn create_promo(&self, promo: &PromoCode) -> Result<String, Problem>;

    async fn update_promo(&self, id: &str, update: &PromoUpdateData) -> Result<(), Problem>;

    async fn delete_promo(&self, id: &str) -> Result<bool, StoreError>;

    /// Records one use. Read then write; concurrent redemptions can exceed
    /// the limits.
    async fn redeem_promo(&self, id: &str, student_id: &str, email: &str)
        -> Result<PromoCode, Problem>;
}

impl Store {
    async fn promo_code_taken(&self, code: &str, exclude_id: Option<&str>) -> Result<bool, StoreError> {
        let mut query = Query::new().eq("code", code);
        if let Some(id) = exclude_id {
            query = query.ne("id", id);
        }
        Ok(!self.find(PROMO_COLLECTION_NAME, &query.limit(1)).await?.is_empty())
    }
}

impl PromoDbExt for Store {
    async fn list_promos(&self, filter: &PromoFilter) -> Result<Vec<PromoCode>, Problem> {
        let query = filter.store_query()?;
        Ok(self.find_as(PROMO_COLLECTION_NAME, &query).await?)
    }

    async fn get_promo(&self, id: &str) -> Result<Option<PromoCode>, StoreError> {
        self.get_as(PROMO_COLLECTION_NAME, id).await
    }

    async fn create_promo(&self, promo: &PromoCode) -> Result<String, Problem> {
        if self.promo_code_taken(&promo.code, None).await? {
            return Err(problem::duplicate(&promo.code));
        }

        let id = self.insert_as(PROMO_COLLECTION_NAME, promo).await?;
        tracing::info!("created promo code {} ({})", promo.code, id);
        Ok(id)
    }

    async fn update_promo(&self, id: &str, update: &PromoUpdateData) -> Result<(), Problem> {
        if self.get_promo(id).await?.is_none() {
            return Err(problem::not_found(id));
        }

        let mut update = update.clone();
        if let Some(code) = update.code.as_mut() {
            *code = code.trim().to_string();
            if code.is_empty() {
                return Err(problems::bad_request("Promo code is required"));
            }
            if self.promo_code_taken(code, Some(id)).await? {
                return Err(problem::duplicate(code));
            }
        }

        let mut patch = bson::to_document(&update).map_err(StoreError::from)?;
        patch.insert("updated_at", util::now_string());
        self.update(PROMO_COLLECTION_NAME, id, patch).await?;
        Ok(())
    }

    async fn delete_promo(&self, id: &str) -> Result<bool, StoreError> {
        self.delete(PROMO_COLLECTION_NAME, id).await
    }

    async fn redeem_promo(
        &self,
        id: &str,
        student_id: &str,
        email: &str,
    ) -> Result<PromoCode, Problem> {
        let mut promo = self
            .get_promo(id)
            .await?
            .ok_or_else(|| problem::not_found(id))?;

        promo.redeem(student_id, email).map_err(|e: RedeemError| {
            tracing::debug!("redeeming {} by {} refused: {}", promo.code, student_id, e);
            Problem::from(e)
        })?;
        promo.updated_at = Utc::now();

        let used_by = bson::to_bson(&promo.used_by).map_err(StoreError::from)?;
        self.update(
            PROMO_COLLECTION_NAME,
            id,
            doc! {
                "used_by": used_by,
                "current_usage": promo.current_usage as i64,
                "updated_at": util::timestamp_string(&promo.updated_at),
            },
        )
        .await?;

        Ok(promo)
    }
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;

    use super::*;
    use crate::data::promo::PromoCreateData;

    async fn seed(store: &Store, code: &str, kind: PromoType) -> String {
        let promo = PromoCreateData {
            code: Some(code.to_string()),
            kind: Some(kind),
            max_usage_times: Some(2),
            max_usage_per_user: Some(1),
            ..Default::default()
        }
        .into_promo(Utc::now())
        .unwrap();
        store.create_promo(&promo).await.unwrap()
    }

    #[rocket::async_test]
    async fn codes_are_unique() {
        let store = Store::memory();
        let first = seed(&store, "SUMMER", PromoType::Event).await;
        let other = seed(&store, "WINTER", PromoType::Event).await;

        let duplicate = PromoCreateData {
            code: Some("SUMMER".to_string()),
            ..Default::default()
        }
        .into_promo(Utc::now())
        .unwrap();
        let problem = store.create_promo(&duplicate).await.unwrap_err();
        assert_eq!(problem.status, Status::Conflict);

        let rename = PromoUpdateData {
            code: Some("WINTER".to_string()),
            ..Default::default()
        };
        let problem = store.update_promo(&first, &rename).await.unwrap_err();
        assert_eq!(problem.status, Status::Conflict);

        // Keeping its own code is fine.
        let same = PromoUpdateData {
            code: Some("WINTER".to_string()),
            discount: Some(0.5),
            ..Default::default()
        };
        store.update_promo(&other, &same).await.unwrap();
        assert_eq!(store.get_promo(&other).await.unwrap().unwrap().discount, 0.5);

        let problem = store.update_promo("missing", &same).await.unwrap_err();
        assert_eq!(problem.status, Status::NotFound);
    }

    #[rocket::async_test]
    async fn list_filters_by_type_and_activity() {
        let store = Store::memory();
        let event = seed(&store, "EVT", PromoType::Event).await;
        seed(&store, "INF", PromoType::Influencer).await;
        store
            .update_promo(
                &event,
                &PromoUpdateData {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let filter = PromoFilter {
            kind: Some("event".to_string()),
            ..Default::default()
        };
        let found = store.list_promos(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(!found[0].is_active);

        let filter = PromoFilter {
            is_active: Some("1".to_string()),
            ..Default::default()
        };
        let found = store.list_promos(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "INF");

        let filter = PromoFilter {
            is_active: Some("maybe".to_string()),
            ..Default::default()
        };
        assert!(store.list_promos(&filter).await.is_err());
    }

    #[rocket::async_test]
    async fn redemption_is_recorded_and_capped() {
        let store = Store::memory();
        let id = seed(&store, "ONCE", PromoType::Event).await;

        let promo = store.redeem_promo(&id, "s1", "s1@x.com").await.unwrap();
        assert_eq!(promo.current_usage, 1);

        let problem = store.redeem_promo(&id, "s1", "s1@x.com").await.unwrap_err();
        assert_eq!(problem.status, Status::Conflict);

        store.redeem_promo(&id, "s2", "s2@x.com").await.unwrap();
        let problem = store.redeem_promo(&id, "s3", "s3@x.com").await.unwrap_err();
        assert_eq!(problem.status, Status::Conflict);

        let stored = store.get_promo(&id).await.unwrap().unwrap();
        assert_eq!(stored.current_usage, 2);
        assert_eq!(stored.usage_of("s2"), 1);

        let problem = store.redeem_promo("missing", "s1", "x").await.unwrap_err();
        assert_eq!(problem.status, Status::NotFound);
    }
}
