//! Diesel schema definitions.
//!
//! Every composite primary key leads with `user_id` per the persisted state
//! layout in the specification, enforcing per-user isolation at the storage
//! layer.

diesel::table! {
    songs (user_id, id) {
        id -> Text,
        user_id -> Text,
        title -> Text,
        artist -> Text,
        album -> Text,
        duration_seconds -> Integer,
        last_played -> Nullable<Timestamp>,
        last_skipped -> Nullable<Timestamp>,
        play_count -> BigInt,
        skip_count -> BigInt,
        cover_art_token -> Nullable<Text>,
    }
}

diesel::table! {
    play_events (id) {
        id -> Integer,
        user_id -> Text,
        song_id -> Text,
        event_type -> Text,
        timestamp -> Timestamp,
        previous_song_id -> Nullable<Text>,
    }
}

diesel::table! {
    song_transitions (user_id, from_song_id, to_song_id) {
        user_id -> Text,
        from_song_id -> Text,
        to_song_id -> Text,
        play_count -> BigInt,
        skip_count -> BigInt,
    }
}

diesel::table! {
    artist_stats (user_id, artist) {
        user_id -> Text,
        artist -> Text,
        play_count -> BigInt,
        skip_count -> BigInt,
    }
}
