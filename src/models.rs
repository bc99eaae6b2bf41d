use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text, Timestamp};
use std::fmt;
use std::str::FromStr;

/// Account roles. Stored as their snake_case string in the `users.role`
/// column and inside token claims; everything past the store boundary works
/// with this enum so role dispatch stays exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Lecturer,
    #[serde(alias = "officestaff")]
    OfficeStaff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Lecturer => "lecturer",
            Role::OfficeStaff => "office_staff",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "lecturer" => Ok(Role::Lecturer),
            // Legacy rows and older clients spell this without the underscore
            "office_staff" | "officestaff" => Ok(Role::OfficeStaff),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Lab,
    LectureHall,
    Equipment,
    Venue,
}

impl ResourceType {
    pub fn all() -> [ResourceType; 4] {
        [
            ResourceType::Lab,
            ResourceType::LectureHall,
            ResourceType::Equipment,
            ResourceType::Venue,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Lab => "lab",
            ResourceType::LectureHall => "lecture_hall",
            ResourceType::Equipment => "equipment",
            ResourceType::Venue => "venue",
        }
    }

    /// Human-readable label used by the client's type dropdown.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceType::Lab => "Laboratory",
            ResourceType::LectureHall => "Lecture Hall",
            ResourceType::Equipment => "Equipment",
            ResourceType::Venue => "Venue",
        }
    }
}

impl FromStr for ResourceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lab" => Ok(ResourceType::Lab),
            "lecture_hall" => Ok(ResourceType::LectureHall),
            "equipment" => Ok(ResourceType::Equipment),
            "venue" => Ok(ResourceType::Venue),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "approved" => Ok(BookingStatus::Approved),
            "rejected" => Ok(BookingStatus::Rejected),
            _ => Err(()),
        }
    }
}

#[derive(Queryable, Serialize, Debug)]
pub struct UserAccount {
    pub user_id: i32,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: String,
    pub department_id: Option<i32>,
    pub registration_number: Option<String>,
    pub national_id: Option<String>,
    pub academic_year: Option<String>,
    pub photo: Option<String>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub religion: Option<String>,
    pub district: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub department_id: Option<i32>,
    pub registration_number: Option<String>,
    pub national_id: Option<String>,
    pub academic_year: Option<String>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub religion: Option<String>,
    pub district: Option<String>,
}

/// The public read projection of a user. The password column is not part of
/// the select, so it cannot leak through any serialization path.
#[derive(Queryable, Serialize, Debug)]
pub struct UserProfile {
    pub user_id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
    pub department_id: Option<i32>,
    pub registration_number: Option<String>,
    pub national_id: Option<String>,
    pub academic_year: Option<String>,
    pub photo: Option<String>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub religion: Option<String>,
    pub district: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Partial profile update. Only fields present in the request body are
/// written; `None` fields are skipped by the changeset. `role` is not a
/// member on purpose: it is fixed at registration.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = crate::schema::users)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub department_id: Option<i32>,
    pub registration_number: Option<String>,
    pub national_id: Option<String>,
    pub academic_year: Option<String>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub religion: Option<String>,
    pub district: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.department_id.is_none()
            && self.registration_number.is_none()
            && self.national_id.is_none()
            && self.academic_year.is_none()
            && self.address.is_none()
            && self.contact_number.is_none()
            && self.birthday.is_none()
            && self.religion.is_none()
            && self.district.is_none()
    }
}

#[derive(Queryable, Serialize, Debug)]
pub struct Resource {
    pub resource_id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub location: String,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    pub department_id: Option<i32>,
    pub availability: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Serialize, Debug)]
pub struct ResourceWithDepartment {
    #[serde(flatten)]
    pub resource: Resource,
    pub department_name: Option<String>,
}

/// Complete resource column set, used both for inserts and for the
/// full-overwrite update (absent optional fields become NULL).
#[derive(Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::resources, treat_none_as_null = true)]
pub struct ResourceFields {
    pub name: String,
    #[diesel(column_name = type_)]
    pub resource_type: String,
    pub location: String,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    pub department_id: Option<i32>,
    pub availability: bool,
}

// DTOs
#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub department_id: Option<i32>,
    pub registration_number: Option<String>,
    pub national_id: Option<String>,
    pub academic_year: Option<String>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub religion: Option<String>,
    pub district: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct PublicUser {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
    pub department_id: Option<i32>,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub role: String,
    pub user: PublicUser,
}

/// Unknown fields (including `role`) are dropped by serde, so a client
/// cannot escalate through the profile editor.
#[derive(Deserialize, Debug, Default)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub department_id: Option<i32>,
    pub registration_number: Option<String>,
    pub national_id: Option<String>,
    pub academic_year: Option<String>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub religion: Option<String>,
    pub district: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ResourceRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    pub department_id: Option<i32>,
    pub availability: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct ResourceFilter {
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub availability: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Claims {
    pub sub: String,      // Subject (user_id)
    pub exp: usize,       // Expiration time
    pub iat: usize,       // Issued at
    pub user_id: i32,
    pub email: String,
    pub role: String,
}

// Dashboard aggregate rows (raw queries)
#[derive(QueryableByName, Debug)]
pub struct CountRow {
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

#[derive(QueryableByName, Debug)]
pub struct OwnBookingCounts {
    #[diesel(sql_type = BigInt)]
    pub total_bookings: i64,
    #[diesel(sql_type = BigInt)]
    pub pending_bookings: i64,
    #[diesel(sql_type = BigInt)]
    pub approved_bookings: i64,
}

#[derive(QueryableByName, Serialize, Debug)]
pub struct UpcomingBooking {
    #[diesel(sql_type = Integer)]
    pub booking_id: i32,
    #[diesel(sql_type = Integer)]
    pub resource_id: i32,
    #[diesel(sql_type = Timestamp)]
    pub start_time: NaiveDateTime,
    #[diesel(sql_type = Timestamp)]
    pub end_time: NaiveDateTime,
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = Text)]
    pub resource_name: String,
    #[diesel(sql_type = Text)]
    pub resource_type: String,
    #[diesel(sql_type = Text)]
    pub location: String,
}

/// Booking joined with requester and resource names, as listed on the staff
/// and admin dashboards.
#[derive(QueryableByName, Serialize, Debug)]
pub struct BookingRecord {
    #[diesel(sql_type = Integer)]
    pub booking_id: i32,
    #[diesel(sql_type = Integer)]
    pub user_id: i32,
    #[diesel(sql_type = Integer)]
    pub resource_id: i32,
    #[diesel(sql_type = Timestamp)]
    pub start_time: NaiveDateTime,
    #[diesel(sql_type = Timestamp)]
    pub end_time: NaiveDateTime,
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = Timestamp)]
    pub created_at: NaiveDateTime,
    #[diesel(sql_type = Text)]
    pub resource_name: String,
    #[diesel(sql_type = Text)]
    pub user_name: String,
}

#[derive(QueryableByName, Serialize, Debug)]
pub struct OwnBookingRecord {
    #[diesel(sql_type = Integer)]
    pub booking_id: i32,
    #[diesel(sql_type = Integer)]
    pub user_id: i32,
    #[diesel(sql_type = Integer)]
    pub resource_id: i32,
    #[diesel(sql_type = Timestamp)]
    pub start_time: NaiveDateTime,
    #[diesel(sql_type = Timestamp)]
    pub end_time: NaiveDateTime,
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = Timestamp)]
    pub created_at: NaiveDateTime,
    #[diesel(sql_type = Text)]
    pub resource_name: String,
}

#[derive(QueryableByName, Serialize, Debug)]
pub struct BookingStatusTotals {
    #[diesel(sql_type = BigInt)]
    pub total_bookings: i64,
    #[diesel(sql_type = BigInt)]
    pub pending_count: i64,
    #[diesel(sql_type = BigInt)]
    pub approved_count: i64,
    #[diesel(sql_type = BigInt)]
    pub rejected_count: i64,
}

#[derive(QueryableByName, Serialize, Debug)]
pub struct ResourceUtilization {
    #[diesel(sql_type = Text)]
    pub name: String,
    #[diesel(sql_type = Text)]
    pub resource_type: String,
    #[diesel(sql_type = BigInt)]
    pub booking_count: i64,
}

#[derive(QueryableByName, Serialize, Debug)]
pub struct SystemOverview {
    #[diesel(sql_type = BigInt)]
    pub total_users: i64,
    #[diesel(sql_type = BigInt)]
    pub total_resources: i64,
    #[diesel(sql_type = BigInt)]
    pub total_bookings: i64,
    #[diesel(sql_type = BigInt)]
    pub pending_bookings: i64,
}

#[derive(QueryableByName, Serialize, Debug)]
pub struct RoleCount {
    #[diesel(sql_type = Text)]
    pub role: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

// Dashboard payloads, one per role
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub total_bookings: i64,
    pub pending_bookings: i64,
    pub approved_bookings: i64,
    pub upcoming_bookings: Vec<UpcomingBooking>,
    pub available_resources: i64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LecturerStats {
    pub total_bookings: i64,
    pub approved_bookings: i64,
    pub upcoming_bookings: Vec<UpcomingBooking>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OfficeStaffStats {
    pub pending_approvals: Vec<BookingRecord>,
    pub booking_stats: BookingStatusTotals,
    pub resource_utilization: Vec<ResourceUtilization>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub system_overview: SystemOverview,
    pub users_by_role: Vec<RoleCount>,
    pub recent_activity: Vec<BookingRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_both_office_staff_spellings() {
        assert_eq!("office_staff".parse::<Role>(), Ok(Role::OfficeStaff));
        assert_eq!("officestaff".parse::<Role>(), Ok(Role::OfficeStaff));
    }

    #[test]
    fn role_rejects_unknown_names() {
        assert!("staff".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn role_string_form_round_trips() {
        for role in [Role::Student, Role::Lecturer, Role::OfficeStaff, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
    }

    #[test]
    fn resource_type_values_and_labels() {
        let pairs: Vec<(&str, &str)> = ResourceType::all()
            .iter()
            .map(|t| (t.as_str(), t.label()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("lab", "Laboratory"),
                ("lecture_hall", "Lecture Hall"),
                ("equipment", "Equipment"),
                ("venue", "Venue"),
            ]
        );
    }

    #[test]
    fn booking_status_parses_known_values_only() {
        assert_eq!("approved".parse::<BookingStatus>(), Ok(BookingStatus::Approved));
        assert!("cancelled".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn user_account_serialization_omits_password() {
        let account = UserAccount {
            user_id: 1,
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            password: "$2b$12$secret-hash".to_string(),
            role: "student".to_string(),
            department_id: None,
            registration_number: None,
            national_id: None,
            academic_year: None,
            photo: None,
            address: None,
            contact_number: None,
            birthday: NaiveDate::from_ymd_opt(2000, 1, 1),
            religion: None,
            district: None,
            created_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        };
        let value = serde_json::to_value(&account).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value["email"], "a@x.com");
    }

    #[test]
    fn profile_changes_default_is_empty() {
        assert!(ProfileChanges::default().is_empty());
        let changes = ProfileChanges {
            name: Some("B".to_string()),
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }

    #[test]
    fn update_request_ignores_role_field() {
        let body = serde_json::json!({ "name": "B", "role": "admin" });
        let parsed: UpdateProfileRequest = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.name.as_deref(), Some("B"));
        // No role member exists to assign through this path.
    }

    #[test]
    fn student_stats_serialize_with_camel_case_keys() {
        let stats = StudentStats {
            total_bookings: 3,
            pending_bookings: 1,
            approved_bookings: 2,
            upcoming_bookings: Vec::new(),
            available_resources: 7,
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["totalBookings"], 3);
        assert_eq!(value["pendingBookings"], 1);
        assert_eq!(value["approvedBookings"], 2);
        assert_eq!(value["availableResources"], 7);
        assert!(value["upcomingBookings"].as_array().unwrap().is_empty());
    }
}
