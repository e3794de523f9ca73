// Diesel table definitions for the gateway database.

diesel::table! {
    login_tokens (token) {
        token -> Text,
        email -> Text,
        site -> Text,
        language -> Text,
        expires_at -> Text,
    }
}

diesel::table! {
    sessions (token) {
        token -> Text,
        user_id -> Text,
        email -> Text,
        is_admin -> Bool,
        created_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(login_tokens, sessions);
