// Diesel schema for the alert core. Hand-maintained: there is no live
// database in this environment to run `diesel print-schema` against, so
// this is kept in sync by hand with `migrations/` and `src/models.rs`.
// Enum-shaped columns are stored as `Text`; conversion to/from the typed
// enums in `models.rs` happens at the repository boundary.

diesel::table! {
    sightings (id) {
        id -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        reporter_device_id -> Text,
        reporter_id -> Nullable<Uuid>,
        title -> Nullable<Text>,
        description -> Nullable<Text>,
        category -> Text,
        tags -> Jsonb,
        sensor_data -> Jsonb,
        media_info -> Jsonb,
        enrichment_data -> Jsonb,
        alert_level -> Text,
        status -> Text,
        witness_count -> Int4,
        is_public -> Bool,
    }
}

diesel::table! {
    witness_confirmations (id) {
        id -> Uuid,
        sighting_id -> Uuid,
        device_id -> Text,
        confirmed_at -> Timestamptz,
        latitude -> Nullable<Double>,
        longitude -> Nullable<Double>,
        altitude_m -> Nullable<Double>,
        accuracy_m -> Nullable<Double>,
        bearing_deg -> Nullable<Double>,
        still_visible -> Bool,
        confidence -> Text,
        description -> Nullable<Text>,
        platform -> Nullable<Text>,
        app_version -> Nullable<Text>,
        distance_km_to_sighting -> Nullable<Double>,
    }
}

diesel::table! {
    devices (id) {
        id -> Uuid,
        device_id -> Text,
        user_id -> Nullable<Uuid>,
        platform -> Text,
        push_token -> Nullable<Text>,
        push_provider -> Nullable<Text>,
        push_enabled -> Bool,
        alert_notifications -> Bool,
        chat_notifications -> Bool,
        system_notifications -> Bool,
        is_active -> Bool,
        last_seen -> Nullable<Timestamptz>,
        lat -> Nullable<Double>,
        lon -> Nullable<Double>,
        notifications_sent -> Int4,
        notifications_opened -> Int4,
    }
}

diesel::table! {
    engagement_events (id) {
        id -> Uuid,
        device_id -> Text,
        sighting_id -> Nullable<Uuid>,
        event_type -> Text,
        timestamp -> Timestamptz,
    }
}

diesel::table! {
    alert_records (id) {
        id -> Uuid,
        sighting_id -> Uuid,
        device_id -> Text,
        distance_km -> Double,
        ring -> Double,
        level -> Text,
        sent_at -> Timestamptz,
        delivered -> Bool,
        error -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    sightings,
    witness_confirmations,
    devices,
    engagement_events,
    alert_records,
);
