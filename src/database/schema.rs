diesel::table! {
    push_subscriptions (endpoint) {
        endpoint -> Text,
        subscription_json -> Text,
    }
}
