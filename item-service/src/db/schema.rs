// Diesel table definitions for the item store.
// Kept in sync by hand with SCHEMA_SQL in db/mod.rs.

diesel::table! {
    items (id) {
        id -> Text,
        item_type -> Text,
        slug -> Text,
        lang -> Text,
        name -> Text,
        description -> Text,
        featured_picture -> Text,
        pictures -> Text,
        tags -> Text,
        urls -> Text,
        attrs -> Text,
        approval -> Text,
        creator -> Text,
        owner -> Text,
        ownership -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    item_tags (item_id, tag) {
        item_id -> Text,
        tag -> Text,
    }
}

diesel::table! {
    item_statistics (item_id) {
        item_id -> Text,
        rank -> Double,
        upvotes -> BigInt,
    }
}

diesel::table! {
    item_link_types (name) {
        name -> Text,
        origin_types -> Text,
        target_types -> Text,
        unique_origin -> Bool,
        ownership -> Text,
        is_inverse -> Bool,
        inverse -> Text,
    }
}

diesel::table! {
    item_links (id) {
        id -> Text,
        inverse_id -> Nullable<Text>,
        origin -> Text,
        target -> Text,
        link_type -> Text,
        owner -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    item_colls (id) {
        id -> BigInt,
        name -> Text,
        owner -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    item_colls_items (coll_id, idx) {
        coll_id -> BigInt,
        idx -> BigInt,
        item_id -> Text,
    }
}

diesel::table! {
    ownership_claims (id) {
        id -> Text,
        owner_id -> Text,
        item_id -> Text,
        status -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    events (id) {
        id -> BigInt,
        label -> Text,
        payload -> Text,
        created_at -> Text,
    }
}

diesel::joinable!(item_tags -> items (item_id));
diesel::joinable!(item_statistics -> items (item_id));
diesel::joinable!(item_colls_items -> item_colls (coll_id));
diesel::joinable!(item_colls_items -> items (item_id));
diesel::joinable!(ownership_claims -> items (item_id));

diesel::allow_tables_to_appear_in_same_query!(
    items,
    item_tags,
    item_statistics,
    item_link_types,
    item_links,
    item_colls,
    item_colls_items,
    ownership_claims,
    events,
);
