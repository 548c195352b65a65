use super::schema::*;
use diesel::prelude::*;

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = push_subscriptions)]
pub struct PushSubscription {
    pub endpoint: String,
    pub subscription_json: String,
}
