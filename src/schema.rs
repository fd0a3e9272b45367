table! {
    questions (id) {
        id -> Int4,
        question_text -> Text,
        question_type -> Text,
        tag -> Nullable<Text>,
        parent_question_id -> Nullable<Int4>,
        is_locked -> Bool,
        order_index -> Nullable<Int4>,
        auto_unlock_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

table! {
    sessions (token_hash) {
        token_hash -> Bytea,
        user_id -> Int4,
        role -> Text,
        expires_at -> Timestamptz,
    }
}

table! {
    student_responses (id) {
        id -> Int4,
        student_id -> Int4,
        question_id -> Int4,
        response -> Text,
        updated_at -> Timestamptz,
    }
}

table! {
    users (id) {
        id -> Int4,
        username -> Text,
        password_hash -> Nullable<Text>,
        role -> Text,
        email -> Nullable<Text>,
        name -> Nullable<Text>,
        student_number -> Nullable<Text>,
        department -> Nullable<Text>,
        teacher_id -> Nullable<Text>,
        provider -> Nullable<Text>,
        provider_id -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

joinable!(sessions -> users (user_id));
joinable!(student_responses -> questions (question_id));
joinable!(student_responses -> users (student_id));

allow_tables_to_appear_in_same_query!(
    questions,
    sessions,
    student_responses,
    users,
);
