// Database schema definitions
diesel::table! {
    users (user_id) {
        user_id -> Int4,
        name -> Varchar,
        email -> Varchar,
        password -> Varchar,
        role -> Varchar,
        department_id -> Nullable<Int4>,
        registration_number -> Nullable<Varchar>,
        national_id -> Nullable<Varchar>,
        academic_year -> Nullable<Varchar>,
        photo -> Nullable<Varchar>,
        address -> Nullable<Varchar>,
        contact_number -> Nullable<Varchar>,
        birthday -> Nullable<Date>,
        religion -> Nullable<Varchar>,
        district -> Nullable<Varchar>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    departments (department_id) {
        department_id -> Int4,
        name -> Varchar,
    }
}

diesel::table! {
    resources (resource_id) {
        resource_id -> Int4,
        name -> Varchar,
        #[sql_name = "type"]
        type_ -> Varchar,
        location -> Varchar,
        capacity -> Nullable<Int4>,
        description -> Nullable<Text>,
        department_id -> Nullable<Int4>,
        availability -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    bookings (booking_id) {
        booking_id -> Int4,
        user_id -> Int4,
        resource_id -> Int4,
        start_time -> Timestamp,
        end_time -> Timestamp,
        status -> Varchar,
        created_at -> Timestamp,
    }
}

diesel::joinable!(users -> departments (department_id));
diesel::joinable!(resources -> departments (department_id));
diesel::joinable!(bookings -> users (user_id));
diesel::joinable!(bookings -> resources (resource_id));

diesel::allow_tables_to_appear_in_same_query!(
    users, departments, resources, bookings,
);
